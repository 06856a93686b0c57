//! Control lines through the Linux GPIO character device.

use anyhow::{Context, Result};
use gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::CdevPin;
use log::debug;
use std::path::Path;

/// The transceiver's digital inputs, requested as outputs at their idle levels: transmit-enable
/// high (receive), power-down high (module on), high/low low (low power).
pub struct ControlLines {
    pub ptt: CdevPin,
    pub power_down: CdevPin,
    pub high_low: CdevPin,
}

impl ControlLines {
    pub fn open<P: AsRef<Path>>(chip: P, ptt: u32, power_down: u32, high_low: u32) -> Result<Self> {
        let path = chip.as_ref();
        let mut chip = Chip::new(path)
            .with_context(|| format!("Failed to open GPIO chip {}", path.display()))?;

        Ok(Self {
            ptt: output_line(&mut chip, ptt, true, "fox-ptt")?,
            power_down: output_line(&mut chip, power_down, true, "fox-pd")?,
            high_low: output_line(&mut chip, high_low, false, "fox-hl")?,
        })
    }
}

fn output_line(chip: &mut Chip, offset: u32, high: bool, label: &str) -> Result<CdevPin> {
    debug!("requesting GPIO line {} ({}) as output, initially {}", offset, label, high);

    let handle = chip
        .get_line(offset)
        .and_then(|line| line.request(LineRequestFlags::OUTPUT, u8::from(high), label))
        .with_context(|| format!("Failed to request GPIO line {} for {}", offset, label))?;

    CdevPin::new(handle).with_context(|| format!("Failed to wrap GPIO line {}", offset))
}
