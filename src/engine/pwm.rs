//! Audio output through the Linux sysfs PWM interface (`/sys/class/pwm/pwmchipN/pwmM`).
//!
//! The channel is the whole audio pin. As a tone generator it runs at the requested period; as
//! a plain output it is either disabled (low) or enabled at full duty (high).

use crate::engine::{AudioPin, ToneGenerator};
use anyhow::{Context, Result, bail};
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use log::{debug, trace, warn};
use std::cell::Cell;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// A failed write to a PWM attribute.
#[derive(Debug)]
pub struct SysfsError(pub io::Error);

impl fmt::Display for SysfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sysfs PWM write failed: {}", self.0)
    }
}

impl std::error::Error for SysfsError {}

impl digital::Error for SysfsError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl pwm::Error for SysfsError {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

fn write_attr(channel: &Path, name: &str, value: impl fmt::Display) -> io::Result<()> {
    trace!("{}/{} <- {}", channel.display(), name, value);
    fs::write(channel.join(name), value.to_string())
}

/// Period in nanoseconds for a tone frequency, at least 1.
fn period_ns(frequency_hz: f64) -> u64 {
    (NANOS_PER_SECOND / frequency_hz).round().max(1.0) as u64
}

fn duty_ns(period_ns: u64, duty: u16) -> u64 {
    period_ns * u64::from(duty) / u64::from(SysfsTone::MAX_DUTY)
}

/// One exported PWM channel used as the audio pin.
#[derive(Debug)]
pub struct SysfsPwmAudio {
    channel: PathBuf,
    claimed: Rc<Cell<bool>>,
}

impl SysfsPwmAudio {
    /// Export `channel` of `/sys/class/pwm/pwmchip<chip>` if needed.
    pub fn open(chip: u32, channel: u32) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_PWM_ROOT).join(format!("pwmchip{}", chip)), channel)
    }

    /// Like [`SysfsPwmAudio::open`] with an explicit chip directory.
    pub fn open_at<P: AsRef<Path>>(chip_dir: P, channel: u32) -> Result<Self> {
        let chip_dir = chip_dir.as_ref();
        let channel_dir = chip_dir.join(format!("pwm{}", channel));

        if !channel_dir.is_dir() {
            debug!("exporting PWM channel {} of {}", channel, chip_dir.display());
            write_attr(chip_dir, "export", channel)
                .with_context(|| format!("Failed to export PWM channel {} of {}", channel, chip_dir.display()))?;
        }
        if !channel_dir.is_dir() {
            bail!("PWM channel {} did not appear after export..!", channel_dir.display());
        }

        write_attr(&channel_dir, "enable", 0)
            .with_context(|| format!("Failed to reset PWM channel {}", channel_dir.display()))?;

        Ok(Self {
            channel: channel_dir,
            claimed: Rc::new(Cell::new(false)),
        })
    }

    fn take_claim(&self) -> Result<()> {
        if self.claimed.get() {
            bail!("Audio pin is already claimed..!");
        }
        self.claimed.set(true);
        Ok(())
    }
}

impl AudioPin for SysfsPwmAudio {
    type Tone = SysfsTone;
    type Output = SysfsLevel;

    fn claim_tone(&mut self, frequency_hz: f64) -> Result<SysfsTone> {
        self.take_claim()?;

        let mut tone = SysfsTone {
            channel: self.channel.clone(),
            period_ns: 0,
            duty: 0,
            claim: Rc::clone(&self.claimed),
        };
        tone.set_frequency(frequency_hz)?;
        write_attr(&tone.channel, "enable", 1)?;

        Ok(tone)
    }

    fn claim_output(&mut self) -> Result<SysfsLevel> {
        self.take_claim()?;

        Ok(SysfsLevel {
            channel: self.channel.clone(),
            claim: Rc::clone(&self.claimed),
        })
    }
}

/// The channel running as a square-wave generator. Dropping it disables the channel.
#[derive(Debug)]
pub struct SysfsTone {
    channel: PathBuf,
    period_ns: u64,
    duty: u16,
    claim: Rc<Cell<bool>>,
}

impl SysfsTone {
    pub const MAX_DUTY: u16 = u16::MAX;

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }
}

impl Drop for SysfsTone {
    fn drop(&mut self) {
        if let Err(e) = write_attr(&self.channel, "enable", 0) {
            warn!("Failed to disable PWM channel {}: {}..!", self.channel.display(), e);
        }
        self.claim.set(false);
    }
}

impl pwm::ErrorType for SysfsTone {
    type Error = SysfsError;
}

impl SetDutyCycle for SysfsTone {
    fn max_duty_cycle(&self) -> u16 {
        Self::MAX_DUTY
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        write_attr(&self.channel, "duty_cycle", duty_ns(self.period_ns, duty)).map_err(SysfsError)?;
        self.duty = duty;
        Ok(())
    }
}

impl ToneGenerator for SysfsTone {
    fn set_frequency(&mut self, frequency_hz: f64) -> Result<()> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            bail!("Refusing to generate a tone at {} Hz..!", frequency_hz);
        }

        // The kernel rejects a period shorter than the current duty cycle.
        let period = period_ns(frequency_hz);
        write_attr(&self.channel, "duty_cycle", 0)?;
        write_attr(&self.channel, "period", period)?;
        self.period_ns = period;
        write_attr(&self.channel, "duty_cycle", duty_ns(period, self.duty))?;

        Ok(())
    }
}

/// The channel used as a plain output: disabled is low, full duty is high.
#[derive(Debug)]
pub struct SysfsLevel {
    channel: PathBuf,
    claim: Rc<Cell<bool>>,
}

impl Drop for SysfsLevel {
    fn drop(&mut self) {
        self.claim.set(false);
    }
}

impl digital::ErrorType for SysfsLevel {
    type Error = SysfsError;
}

impl OutputPin for SysfsLevel {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        write_attr(&self.channel, "enable", 0).map_err(SysfsError)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let period = fs::read_to_string(self.channel.join("period")).map_err(SysfsError)?;
        write_attr(&self.channel, "duty_cycle", period.trim()).map_err(SysfsError)?;
        write_attr(&self.channel, "enable", 1).map_err(SysfsError)
    }
}
