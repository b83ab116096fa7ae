//! Backlight control over the sysfs brightness files.

use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{trace, warn};

use super::sysfs;

#[derive(Debug, Clone)]
pub struct Backlight {
    brightness_path: PathBuf,
    actual_brightness_path: PathBuf,
    power_path: PathBuf,
}

impl Backlight {
    pub fn new(
        brightness_path: impl Into<PathBuf>,
        actual_brightness_path: impl Into<PathBuf>,
        power_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            brightness_path: brightness_path.into(),
            actual_brightness_path: actual_brightness_path.into(),
            power_path: power_path.into(),
        }
    }

    /// Power the panel on if the board exposes a power file at all.
    pub fn setup(&self) -> io::Result<()> {
        if sysfs::file_exists(&self.power_path) {
            sysfs::write_file(&self.power_path, "0")?;
        }
        Ok(())
    }

    pub fn set_brightness(&self, percent: u8) -> io::Result<()> {
        // Workaround: the kernel driver rejects zero, so the floor is 1.
        let percent = percent.max(1);
        sysfs::write_file(&self.brightness_path, &percent.to_string())?;
        trace!(percent, "brightness set");
        Ok(())
    }

    pub fn get_brightness(&self) -> io::Result<u8> {
        let content = sysfs::read_file(&self.actual_brightness_path)?;
        content
            .trim_end()
            .parse::<u8>()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    /// Step the brightness from `from` to `to` one percent at a time, pacing
    /// with sleeps so the whole ramp takes roughly `period`.
    pub fn ramp(&self, from: u8, to: u8, period: Duration) -> io::Result<()> {
        if from == to {
            return self.set_brightness(to);
        }
        let steps = from.abs_diff(to) as u32;
        let pause = period / steps;

        let mut level = from;
        loop {
            if let Err(err) = self.set_brightness(level) {
                warn!(%err, level, "brightness ramp aborted");
                return Err(err);
            }
            if level == to {
                return Ok(());
            }
            level = if from < to { level + 1 } else { level - 1 };
            thread::sleep(pause);
        }
    }
}
