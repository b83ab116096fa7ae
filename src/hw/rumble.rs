//! Haptic rumble trigger. Thin shim over a device attribute file; the actual
//! waveform lives in firmware.

use std::io;
use std::path::PathBuf;

use tracing::debug;

use super::sysfs;

#[derive(Debug, Clone)]
pub struct Rumble {
    trigger_path: PathBuf,
}

impl Rumble {
    pub fn new(trigger_path: impl Into<PathBuf>) -> Self {
        Self {
            trigger_path: trigger_path.into(),
        }
    }

    /// Fire one effect: `event_id` selects the motor, `strength` is 0-100,
    /// `duration_ms` the pulse length.
    pub fn trigger(&self, event_id: u32, strength: u32, duration_ms: u32) -> io::Result<()> {
        debug!(event_id, strength, duration_ms, "rumble trigger");
        sysfs::write_file(
            &self.trigger_path,
            &format!("{event_id} {strength} {duration_ms}"),
        )
    }
}
