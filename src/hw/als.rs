//! Ambient light sensor readout over sysfs/IIO.

use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use super::sysfs;

pub struct Als {
    device_dir: PathBuf,
}

impl Als {
    pub fn discover(base: impl AsRef<Path>, sensor_name: &str) -> io::Result<Self> {
        let device_dir = sysfs::find_device_path_by_name(base, "name", sensor_name)?;
        info!(device = %device_dir.display(), sensor_name, "ambient light sensor found");
        Ok(Self { device_dir })
    }

    /// Raw illuminance counts as exported by the driver.
    pub fn read_illuminance(&self) -> io::Result<u32> {
        let raw = sysfs::read_file(self.device_dir.join("in_illuminance_raw"))?;
        raw.trim_end()
            .parse::<u32>()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}
