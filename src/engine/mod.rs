use anyhow::Result;
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(all(feature = "gpio", target_os = "linux"))]
pub mod gpio;
pub mod pwm;
pub mod sim;
mod tone;

pub use tone::*;

/// The single audio output pin. It is either driving a tone or acting as a plain output,
/// never both: each claim hands out an owned handle and dropping that handle releases the pin.
pub trait AudioPin {
    type Tone: ToneGenerator;
    type Output: OutputPin;

    /// Bind a variable-frequency square-wave generator to the pin.
    fn claim_tone(&mut self, frequency_hz: f64) -> Result<Self::Tone>;

    /// Bind the pin as a plain digital output.
    fn claim_output(&mut self) -> Result<Self::Output>;
}

pub trait ToneGenerator: SetDutyCycle {
    /// Retune in place without releasing the peripheral.
    fn set_frequency(&mut self, frequency_hz: f64) -> Result<()>;
}

/// Blocking time source. Everything in the beacon waits through this.
pub trait Clock {
    fn sleep_ms(&mut self, ms: f64);
}

impl<C: Clock + ?Sized> Clock for &mut C {
    fn sleep_ms(&mut self, ms: f64) {
        (**self).sleep_ms(ms)
    }
}

/// Wall-clock sleeper backed by `spin_sleep` for millisecond-accurate Morse and note timing.
#[derive(Debug, Clone)]
pub struct SpinClock {
    sleeper: SpinSleeper,
}

impl SpinClock {
    pub fn new() -> Self {
        Self {
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
        }
    }
}

impl Default for SpinClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SpinClock {
    fn sleep_ms(&mut self, ms: f64) {
        if !(ms > 0.0) || !ms.is_finite() {
            return;
        }

        self.sleeper.sleep(Duration::from_secs_f64(ms / 1000.0));
    }
}

/// Cooperative stop request, checked between Morse characters, melody notes and cycles.
/// A tone that has already started always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
