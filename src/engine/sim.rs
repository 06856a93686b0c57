//! Host-side stand-ins for the beacon hardware. The audio pin and control pins only log
//! (and optionally record) what they are asked to do, the clock can fast-forward, and the
//! serial link answers like an SA868 module.

use crate::engine::{AudioPin, Clock, ToneGenerator};
use anyhow::{Result, bail};
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use log::{debug, trace};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::io::{self, Read, Write};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Activity {
    ToneStarted { frequency_hz: f64 },
    ToneRetuned { frequency_hz: f64 },
    ToneStopped,
    DutySet { duty: u16, max: u16 },
    PinDriven { pin: &'static str, high: bool },
    Slept { ms: f64 },
}

/// What a listener would hear: a tone of some pitch, or nothing, for some time.
#[derive(Debug, Clone, PartialEq)]
pub enum Span {
    Tone { frequency_hz: f64, ms: f64 },
    Silence { ms: f64 },
}

/// Shared activity log. `Recorder::off()` (the default) records nothing.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Option<Rc<RefCell<Vec<Activity>>>>);

impl Recorder {
    pub fn new() -> Self {
        Self(Some(Rc::new(RefCell::new(Vec::new()))))
    }

    pub fn off() -> Self {
        Self(None)
    }

    pub fn record(&self, activity: Activity) {
        if let Some(log) = &self.0 {
            log.borrow_mut().push(activity);
        }
    }

    pub fn activity(&self) -> Vec<Activity> {
        self.0
            .as_ref()
            .map(|log| log.borrow().clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Some(log) = &self.0 {
            log.borrow_mut().clear();
        }
    }

    /// Fold the raw activity into a tone/silence schedule. Zero-length sleeps are dropped.
    pub fn spans(&self) -> Vec<Span> {
        let mut sounding: Option<f64> = None;
        let mut spans = Vec::new();

        for activity in self.activity() {
            match activity {
                Activity::ToneStarted { frequency_hz } | Activity::ToneRetuned { frequency_hz } => {
                    sounding = Some(frequency_hz);
                }
                Activity::ToneStopped => sounding = None,
                Activity::Slept { ms } if ms > 0.0 => match sounding {
                    Some(frequency_hz) => spans.push(Span::Tone { frequency_hz, ms }),
                    None => spans.push(Span::Silence { ms }),
                },
                _ => {}
            }
        }

        spans
    }

    /// Levels driven on a named pin, in order.
    pub fn levels(&self, pin: &str) -> Vec<bool> {
        self.activity()
            .into_iter()
            .filter_map(|activity| match activity {
                Activity::PinDriven { pin: p, high } if p == pin => Some(high),
                _ => None,
            })
            .collect()
    }
}

/// A plain digital output that logs its level changes.
#[derive(Debug)]
pub struct SimPin {
    name: &'static str,
    high: bool,
    recorder: Recorder,
    claim: Option<Rc<Cell<u32>>>,
}

impl SimPin {
    pub fn new(name: &'static str, recorder: Recorder) -> Self {
        Self {
            name,
            high: false,
            recorder,
            claim: None,
        }
    }

    pub fn is_high(&self) -> bool {
        self.high
    }

    fn drive(&mut self, high: bool) {
        debug!("{} -> {}", self.name, if high { "high" } else { "low" });
        self.high = high;
        self.recorder.record(Activity::PinDriven {
            pin: self.name,
            high,
        });
    }
}

impl Drop for SimPin {
    fn drop(&mut self) {
        if let Some(claim) = &self.claim {
            claim.set(claim.get().saturating_sub(1));
        }
    }
}

impl digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimTone {
    frequency_hz: f64,
    duty: u16,
    recorder: Recorder,
    claim: Rc<Cell<u32>>,
}

impl SimTone {
    pub const MAX_DUTY: u16 = u16::MAX;

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn duty(&self) -> u16 {
        self.duty
    }
}

impl Drop for SimTone {
    fn drop(&mut self) {
        trace!("tone generator released");
        self.claim.set(self.claim.get().saturating_sub(1));
        self.recorder.record(Activity::ToneStopped);
    }
}

impl pwm::ErrorType for SimTone {
    type Error = Infallible;
}

impl SetDutyCycle for SimTone {
    fn max_duty_cycle(&self) -> u16 {
        Self::MAX_DUTY
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.duty = duty;
        self.recorder.record(Activity::DutySet {
            duty,
            max: Self::MAX_DUTY,
        });
        Ok(())
    }
}

impl ToneGenerator for SimTone {
    fn set_frequency(&mut self, frequency_hz: f64) -> Result<()> {
        self.frequency_hz = frequency_hz;
        self.recorder.record(Activity::ToneRetuned { frequency_hz });
        Ok(())
    }
}

/// The simulated audio pin. Only one claim (tone or plain output) may be alive at a time.
#[derive(Debug)]
pub struct SimAudioPin {
    recorder: Recorder,
    claims: Rc<Cell<u32>>,
    jammed: bool,
}

impl SimAudioPin {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            claims: Rc::new(Cell::new(0)),
            jammed: false,
        }
    }

    /// A pin whose tone generator can never be claimed.
    pub fn jammed(recorder: Recorder) -> Self {
        Self {
            jammed: true,
            ..Self::new(recorder)
        }
    }

    fn take_claim(&self) -> Result<()> {
        if self.claims.get() > 0 {
            bail!("Audio pin is already claimed..!");
        }
        self.claims.set(1);
        Ok(())
    }
}

impl AudioPin for SimAudioPin {
    type Tone = SimTone;
    type Output = SimPin;

    fn claim_tone(&mut self, frequency_hz: f64) -> Result<SimTone> {
        if self.jammed {
            bail!("Tone generator unavailable..!");
        }
        self.take_claim()?;

        debug!("tone on {:.2} Hz", frequency_hz);
        self.recorder.record(Activity::ToneStarted { frequency_hz });

        Ok(SimTone {
            frequency_hz,
            duty: 0,
            recorder: self.recorder.clone(),
            claim: Rc::clone(&self.claims),
        })
    }

    fn claim_output(&mut self) -> Result<SimPin> {
        self.take_claim()?;

        Ok(SimPin {
            name: "audio",
            high: false,
            recorder: self.recorder.clone(),
            claim: Some(Rc::clone(&self.claims)),
        })
    }
}

/// Fast-forward clock: sleeping only advances a counter.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    elapsed_ms: f64,
    recorder: Recorder,
}

impl SimClock {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            elapsed_ms: 0.0,
            recorder,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }
}

impl Clock for SimClock {
    fn sleep_ms(&mut self, ms: f64) {
        self.elapsed_ms += ms;
        self.recorder.record(Activity::Slept { ms });
    }
}

/// An SA868 on the other end of a serial line. Each `\r\n`-terminated `AT+DMO...` command
/// queues an acknowledgement such as `+DMOCONNECT:0\r\n`, unless the module is silent.
#[derive(Debug, Default)]
pub struct SimSerial {
    silent: bool,
    pending: Vec<u8>,
    replies: VecDeque<u8>,
    commands: Vec<String>,
}

impl SimSerial {
    pub fn sa868() -> Self {
        Self::default()
    }

    /// A module that never answers.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Every command line received so far, without terminators.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    fn handle_line(&mut self, line: String) {
        debug!("SA868 <- '{}'", line);

        if !self.silent {
            if let Some(name) = line
                .strip_prefix("AT+")
                .map(|rest| rest.split('=').next().unwrap_or(rest))
            {
                let reply = format!("+{}:0\r\n", name);
                self.replies.extend(reply.as_bytes());
            }
        }

        self.commands.push(line);
    }
}

impl Write for SimSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);

        while let Some(end) = self.pending.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = self.pending.drain(..end + 2).take(end).collect();
            self.handle_line(String::from_utf8_lossy(&line).into_owned());
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SimSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.replies.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply from SA868"));
        }

        let n = buf.len().min(self.replies.len());
        for (slot, byte) in buf.iter_mut().zip(self.replies.drain(..n)) {
            *slot = byte;
        }

        Ok(n)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn audio_pin_is_exclusive() {
        let mut pin = SimAudioPin::new(Recorder::off());

        let output = pin.claim_output().unwrap();
        assert!(pin.claim_tone(440.0).is_err());
        drop(output);

        let tone = pin.claim_tone(440.0).unwrap();
        assert!(pin.claim_output().is_err());
        drop(tone);

        assert!(pin.claim_output().is_ok());
    }

    #[test]
    fn spans_follow_tone_state() {
        let recorder = Recorder::new();
        recorder.record(Activity::Slept { ms: 10.0 });
        recorder.record(Activity::ToneStarted { frequency_hz: 440.0 });
        recorder.record(Activity::Slept { ms: 20.0 });
        recorder.record(Activity::ToneRetuned { frequency_hz: 880.0 });
        recorder.record(Activity::Slept { ms: 30.0 });
        recorder.record(Activity::ToneStopped);
        recorder.record(Activity::Slept { ms: 0.0 });
        recorder.record(Activity::Slept { ms: 40.0 });

        assert_eq!(
            recorder.spans(),
            vec![
                Span::Silence { ms: 10.0 },
                Span::Tone { frequency_hz: 440.0, ms: 20.0 },
                Span::Tone { frequency_hz: 880.0, ms: 30.0 },
                Span::Silence { ms: 40.0 },
            ]
        );
    }

    #[test]
    fn disabled_recorder_stays_empty() {
        let recorder = Recorder::off();
        recorder.record(Activity::ToneStopped);
        assert!(recorder.activity().is_empty());
    }

    #[test]
    fn sa868_acknowledges_commands() {
        let mut serial = SimSerial::sa868();
        serial.write_all(b"AT+DMOSETVOLUME=5\r\n").unwrap();

        let mut buf = [0u8; 64];
        let n = serial.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"+DMOSETVOLUME:0\r\n");
        assert_eq!(serial.commands(), ["AT+DMOSETVOLUME=5"]);

        let err = serial.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn split_writes_are_reassembled() {
        let mut serial = SimSerial::silent();
        serial.write_all(b"AT+DMO").unwrap();
        serial.write_all(b"CONNECT\r").unwrap();
        assert!(serial.commands().is_empty());
        serial.write_all(b"\n").unwrap();

        assert_eq!(serial.commands(), ["AT+DMOCONNECT"]);
        assert!(serial.read(&mut [0u8; 8]).is_err());
    }
}
