// Note names use scientific pitch notation with C-1 = MIDI 0 and G9 = MIDI 127.
// Black keys are accepted with either spelling (c#4 / db4), white keys only by letter.

const SHARP_NAMES: [&str; 12] = [
    "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
];

fn pitch_class(letter: char, accidental: Option<char>) -> Option<i32> {
    let natural = match letter {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };

    match accidental {
        None => Some(natural),
        Some('#') if matches!(letter, 'c' | 'd' | 'f' | 'g' | 'a') => Some(natural + 1),
        Some('b') if matches!(letter, 'd' | 'e' | 'g' | 'a' | 'b') => Some(natural - 1),
        _ => None,
    }
}

/// MIDI number for a note letter, optional `#`/`b`, and octave. `None` when the spelling is
/// not one of the table's or the note falls outside 0..=127.
pub fn midi_for_note(letter: char, accidental: Option<char>, octave: i32) -> Option<u8> {
    let pc = pitch_class(letter.to_ascii_lowercase(), accidental)?;
    let midi = octave.checked_add(1)?.checked_mul(12)?.checked_add(pc)?;

    u8::try_from(midi).ok().filter(|m| *m <= 127)
}

/// Parse a full name such as `c#4`, `Bb3` or `c-1`.
pub fn midi_for_name(name: &str) -> Option<u8> {
    let name = name.trim().to_ascii_lowercase();
    let mut chars = name.chars();
    let letter = chars.next()?;
    let rest = chars.as_str();

    let (accidental, octave) = match rest.chars().next() {
        Some(c @ ('#' | 'b')) => (Some(c), &rest[1..]),
        _ => (None, rest),
    };

    midi_for_note(letter, accidental, octave.parse().ok()?)
}

/// Sharp-spelled name of a MIDI note, e.g. `69 -> "a4"`.
pub fn name_for_midi(midi: u8) -> String {
    let octave = i32::from(midi / 12) - 1;
    format!("{}{}", SHARP_NAMES[usize::from(midi % 12)], octave)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reference_notes() {
        assert_eq!(midi_for_name("a4"), Some(69));
        assert_eq!(midi_for_name("C-1"), Some(0));
        assert_eq!(midi_for_name("g9"), Some(127));
        assert_eq!(midi_for_name("g5"), Some(79));
        assert_eq!(midi_for_name("c6"), Some(84));
    }

    #[test]
    fn both_spellings() {
        assert_eq!(midi_for_name("c#4"), midi_for_name("db4"));
        assert_eq!(midi_for_name("a#2"), midi_for_name("bb2"));
        assert_eq!(midi_for_name("bb2"), Some(46));
    }

    #[test]
    fn rejects_unlisted_spellings() {
        assert_eq!(midi_for_name("e#4"), None);
        assert_eq!(midi_for_name("cb4"), None);
        assert_eq!(midi_for_name("h4"), None);
        assert_eq!(midi_for_name("g#9"), None);
        assert_eq!(midi_for_name("c-2"), None);
        assert_eq!(midi_for_name("c"), None);
    }

    #[test]
    fn every_midi_note_round_trips_by_name() {
        for midi in 0..=127u8 {
            assert_eq!(midi_for_name(&name_for_midi(midi)), Some(midi));
        }
    }
}
