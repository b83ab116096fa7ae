//! Command-line parsing, YAML overrides, and validation.

mod validation;

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_PROMPT_SOUND: &str = "/usr/share/sounds/sound-icons/prompt.wav";
pub const DEFAULT_IIO_BASE: &str = "/sys/bus/iio/devices";

/// Daemon configuration. Every flag also has an environment fallback so the
/// init system can configure the service without a wrapper script; a YAML
/// file given with `--config` overrides the built-in defaults but loses to
/// explicit flags handled in [`AppConfig::parse_args`].
#[derive(Debug, Parser, Clone)]
#[command(about = "Embedded system-manager daemon", author, version)]
pub struct AppConfig {
    /// ALSA playback device name
    #[arg(long, env = "SYSMGRD_AUDIO_DEVICE", default_value = "default")]
    pub audio_device: String,

    /// Boot prompt sound played on audio init
    #[arg(long, env = "SYSMGRD_PROMPT_SOUND", default_value = DEFAULT_PROMPT_SOUND)]
    pub prompt_sound: PathBuf,

    /// Backlight brightness control file
    #[arg(long, default_value = "/sys/class/backlight/panel/brightness")]
    pub brightness_path: PathBuf,

    /// Backlight brightness readback file
    #[arg(long, default_value = "/sys/class/backlight/panel/actual_brightness")]
    pub actual_brightness_path: PathBuf,

    /// Backlight power control file
    #[arg(long, default_value = "/sys/class/backlight/panel/bl_power")]
    pub power_path: PathBuf,

    /// Haptic motor trigger file
    #[arg(long, default_value = "/sys/class/haptic/rumble/trigger")]
    pub rumble_path: PathBuf,

    /// Base directory scanned for IIO sensor devices
    #[arg(long, default_value = DEFAULT_IIO_BASE)]
    pub iio_base: PathBuf,

    /// IMU sensor identifier matched against each device's name attribute
    #[arg(long, default_value = "lsm6ds3")]
    pub imu_sensor: String,

    /// Ambient light sensor identifier
    #[arg(long, default_value = "apds9960")]
    pub als_sensor: String,

    /// Wireless interface probed at startup
    #[arg(long, env = "SYSMGRD_WIFI_INTERFACE", default_value = "wlan0")]
    pub wifi_interface: String,

    /// Log filter directives (tracing EnvFilter syntax)
    #[arg(long, env = "SYSMGRD_LOG", default_value = "info")]
    pub log_filter: String,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, env = "SYSMGRD_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "SYSMGRD_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Optional YAML file with overrides for any of the above
    #[arg(long, env = "SYSMGRD_CONFIG")]
    pub config: Option<PathBuf>,
}

/// YAML override file shape. Absent keys leave the CLI/default value alone.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub audio_device: Option<String>,
    pub prompt_sound: Option<PathBuf>,
    pub brightness_path: Option<PathBuf>,
    pub actual_brightness_path: Option<PathBuf>,
    pub power_path: Option<PathBuf>,
    pub rumble_path: Option<PathBuf>,
    pub iio_base: Option<PathBuf>,
    pub imu_sensor: Option<String>,
    pub als_sensor: Option<String>,
    pub wifi_interface: Option<String>,
    pub log_filter: Option<String>,
    pub log_json: Option<bool>,
    pub log_file: Option<PathBuf>,
}

impl AppConfig {
    /// Fold a YAML override file into this configuration.
    pub fn apply(&mut self, file: FileConfig) {
        macro_rules! overlay {
            ($($field:ident),+ $(,)?) => {
                $(if let Some(value) = file.$field {
                    self.$field = value;
                })+
            };
        }
        overlay!(
            audio_device,
            prompt_sound,
            brightness_path,
            actual_brightness_path,
            power_path,
            rumble_path,
            iio_base,
            imu_sensor,
            als_sensor,
            wifi_interface,
            log_filter,
            log_json,
        );
        if file.log_file.is_some() {
            self.log_file = file.log_file;
        }
    }
}
