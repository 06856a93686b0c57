/// MIDI note number of the A4 reference pitch.
pub const A4_MIDI: i32 = 69;

/// Frequency of the A4 reference pitch in Hz.
pub const A4_HZ: f64 = 440.0;

/// Equal-tempered frequency of a MIDI note. Defined for any integer, not just 0..=127.
pub fn midi_to_frequency(note: i32) -> f64 {
    A4_HZ * 2f64.powf(f64::from(note - A4_MIDI) / 12.0)
}

/// Inverse of [`midi_to_frequency`]. Returns `None` for non-positive or non-finite input.
pub fn frequency_to_midi(frequency_hz: f64) -> Option<f64> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return None;
    }

    Some(f64::from(A4_MIDI) + 12.0 * (frequency_hz / A4_HZ).log2())
}
