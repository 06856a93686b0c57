use crate::engine::{AudioPin, Clock, ToneGenerator};
use anyhow::{Result, anyhow, bail};
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use log::trace;
use std::mem;

enum PinSlot<T, O> {
    Released,
    Output(O),
    Tone(T),
}

/// Owns the audio pin and the clock. The pin is held in exactly one of three states, so a
/// tone generator and the plain output can never be bound at the same time.
pub struct ToneSynth<A: AudioPin, C: Clock> {
    pin: A,
    clock: C,
    slot: PinSlot<A::Tone, A::Output>,
}

impl<A: AudioPin, C: Clock> ToneSynth<A, C> {
    /// Takes the pin and parks it as a plain output held low.
    pub fn new(pin: A, clock: C) -> Result<Self> {
        let mut synth = Self {
            pin,
            clock,
            slot: PinSlot::Released,
        };
        synth.tone_off()?;

        Ok(synth)
    }

    /// Start (or retune) a 50% duty square wave on the audio pin.
    pub fn tone_on(&mut self, frequency_hz: f64) -> Result<()> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            bail!("Refusing to generate a tone at {} Hz..!", frequency_hz);
        }

        match mem::replace(&mut self.slot, PinSlot::Released) {
            PinSlot::Tone(mut tone) => {
                trace!("retuning tone to {:.2} Hz", frequency_hz);
                let retuned = tone.set_frequency(frequency_hz);
                self.slot = PinSlot::Tone(tone);
                retuned
            }
            PinSlot::Output(output) => {
                drop(output);
                self.start_tone(frequency_hz)
            }
            PinSlot::Released => self.start_tone(frequency_hz),
        }
    }

    fn start_tone(&mut self, frequency_hz: f64) -> Result<()> {
        trace!("claiming tone generator at {:.2} Hz", frequency_hz);
        let mut tone = self.pin.claim_tone(frequency_hz)?;
        tone.set_duty_cycle_fraction(1, 2)
            .map_err(|e| anyhow!("Failed to set tone duty cycle: {:?}", e))?;
        self.slot = PinSlot::Tone(tone);

        Ok(())
    }

    /// Release the tone generator entirely and hold the pin low as a plain output.
    pub fn tone_off(&mut self) -> Result<()> {
        self.slot = PinSlot::Released;

        let mut output = self.pin.claim_output()?;
        output
            .set_low()
            .map_err(|e| anyhow!("Failed to drive audio pin low: {:?}", e))?;
        self.slot = PinSlot::Output(output);

        Ok(())
    }

    /// Sound a tone for `duration_ms`. The generator is released afterwards even when
    /// starting it failed.
    pub fn tone(&mut self, frequency_hz: f64, duration_ms: f64) -> Result<()> {
        let started = self.tone_on(frequency_hz);
        if started.is_ok() {
            self.clock.sleep_ms(duration_ms);
        }
        let stopped = self.tone_off();

        started.and(stopped)
    }

    /// Wait without touching the pin.
    pub fn silence(&mut self, duration_ms: f64) {
        self.clock.sleep_ms(duration_ms);
    }

    pub fn is_sounding(&self) -> bool {
        matches!(self.slot, PinSlot::Tone(_))
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::sim::{Activity, Recorder, SimAudioPin, SimClock, Span};

    fn synth(recorder: &Recorder) -> ToneSynth<SimAudioPin, SimClock> {
        ToneSynth::new(SimAudioPin::new(recorder.clone()), SimClock::new(recorder.clone())).unwrap()
    }

    #[test]
    fn starts_parked_low() {
        let recorder = Recorder::new();
        let synth = synth(&recorder);

        assert!(!synth.is_sounding());
        assert_eq!(
            recorder.activity(),
            vec![Activity::PinDriven { pin: "audio", high: false }]
        );
    }

    #[test]
    fn retunes_without_reclaiming() {
        let recorder = Recorder::new();
        let mut synth = synth(&recorder);
        recorder.clear();

        synth.tone_on(440.0).unwrap();
        synth.tone_on(880.0).unwrap();
        assert!(synth.is_sounding());

        assert_eq!(
            recorder.activity(),
            vec![
                Activity::ToneStarted { frequency_hz: 440.0 },
                Activity::DutySet { duty: 32767, max: 65535 },
                Activity::ToneRetuned { frequency_hz: 880.0 },
            ]
        );
    }

    #[test]
    fn tone_off_releases_and_parks() {
        let recorder = Recorder::new();
        let mut synth = synth(&recorder);

        synth.tone_on(523.25).unwrap();
        recorder.clear();
        synth.tone_off().unwrap();

        assert!(!synth.is_sounding());
        assert_eq!(
            recorder.activity(),
            vec![
                Activity::ToneStopped,
                Activity::PinDriven { pin: "audio", high: false },
            ]
        );
    }

    #[test]
    fn timed_tone_then_silence() {
        let recorder = Recorder::new();
        let mut synth = synth(&recorder);

        synth.tone(800.0, 100.0).unwrap();
        synth.silence(300.0);

        assert_eq!(
            recorder.spans(),
            vec![
                Span::Tone { frequency_hz: 800.0, ms: 100.0 },
                Span::Silence { ms: 300.0 },
            ]
        );
        assert_eq!(synth.clock().elapsed_ms(), 400.0);
    }

    #[test]
    fn failed_claim_still_parks_pin() {
        let recorder = Recorder::new();
        let mut synth =
            ToneSynth::new(SimAudioPin::jammed(recorder.clone()), SimClock::new(recorder.clone()))
                .unwrap();
        recorder.clear();

        assert!(synth.tone(440.0, 250.0).is_err());
        assert!(!synth.is_sounding());
        assert_eq!(synth.clock().elapsed_ms(), 0.0);
        assert_eq!(
            recorder.activity(),
            vec![Activity::PinDriven { pin: "audio", high: false }]
        );
    }

    #[test]
    fn rejects_silly_frequencies() {
        let recorder = Recorder::new();
        let mut synth = synth(&recorder);

        assert!(synth.tone_on(0.0).is_err());
        assert!(synth.tone_on(f64::INFINITY).is_err());
        assert!(!synth.is_sounding());
    }
}
