use std::fs;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use super::{AppConfig, FileConfig};

impl AppConfig {
    /// Parse CLI arguments, fold in the optional YAML file, and validate.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        if let Some(path) = config.config.clone() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let file: FileConfig = serde_yaml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            config.apply(file);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check values the rest of the daemon assumes are well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.audio_device.is_empty() {
            bail!("--audio-device must not be empty");
        }
        if self.imu_sensor.is_empty() || self.als_sensor.is_empty() {
            bail!("sensor identifiers must not be empty");
        }
        if self.wifi_interface.is_empty()
            || !self
                .wifi_interface
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            bail!(
                "--wifi-interface must be a plain interface name, got {:?}",
                self.wifi_interface
            );
        }
        if self.prompt_sound.extension().and_then(|e| e.to_str()) != Some("wav") {
            bail!(
                "--prompt-sound must point at a .wav file, got {}",
                self.prompt_sound.display()
            );
        }
        EnvFilter::try_new(&self.log_filter)
            .with_context(|| format!("invalid --log-filter {:?}", self.log_filter))?;
        Ok(())
    }
}
