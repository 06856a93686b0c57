use crate::engine::{AudioPin, Clock, StopFlag, ToneSynth};
use crate::model::melody::Melody;
use crate::pitch::midi_to_frequency;
use anyhow::{Result, bail};
use log::{debug, info, warn};

pub const THIRTYSECONDS_PER_QUARTER: u32 = 8;

/// Length of one 32nd-note tick at `tempo_bpm` quarter notes per minute.
pub fn tick_ms(tempo_bpm: u32) -> f64 {
    60_000.0 / f64::from(tempo_bpm) / f64::from(THIRTYSECONDS_PER_QUARTER)
}

/// Plays melodies through the tone synth at one fixed tempo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MelodyPlayer {
    tempo_bpm: u32,
    tick_ms: f64,
}

impl MelodyPlayer {
    pub fn new(tempo_bpm: u32) -> Result<Self> {
        if tempo_bpm == 0 {
            bail!("Tempo must be at least 1 BPM..!");
        }

        Ok(Self {
            tempo_bpm,
            tick_ms: tick_ms(tempo_bpm),
        })
    }

    pub fn tempo_bpm(&self) -> u32 {
        self.tempo_bpm
    }

    pub fn tick_ms(&self) -> f64 {
        self.tick_ms
    }

    /// Real-time length of a melody at this tempo.
    pub fn duration_ms(&self, melody: &Melody) -> f64 {
        melody.total_ticks() as f64 * self.tick_ms
    }

    /// Play every step once, start to end. Rests are silence; zero-tick steps are skipped.
    /// A stop request is honoured between notes, never mid-note.
    pub fn play<A: AudioPin, C: Clock>(
        &self,
        synth: &mut ToneSynth<A, C>,
        melody: &Melody,
        stop: &StopFlag,
    ) -> Result<()> {
        info!(
            "playing '{}' ({} steps, {:.1}s)",
            melody.title(),
            melody.steps.len(),
            self.duration_ms(melody) / 1000.0
        );

        for (i, step) in melody.steps.iter().enumerate() {
            if stop.is_stopped() {
                warn!("Playback of '{}' stopped at step {}..!", melody.title(), i);
                return Ok(());
            }

            if step.ticks == 0 {
                debug!("skipping zero-length step {} in '{}'", i, melody.title());
                continue;
            }

            let duration_ms = f64::from(step.ticks) * self.tick_ms;
            if step.is_rest() {
                synth.silence(duration_ms);
            } else {
                synth.tone(midi_to_frequency(i32::from(step.pitch)), duration_ms)?;
            }
        }

        Ok(())
    }
}
