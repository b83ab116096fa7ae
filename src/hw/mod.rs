//! Hardware shims: sysfs-backed backlight, rumble motor, and IIO sensors.

mod als;
mod backlight;
mod imu;
mod monitor;
mod rumble;
pub mod sysfs;


pub use als::Als;
pub use backlight::Backlight;
pub use imu::{IioImu, ImuAngles, ImuHandle, ImuSensor, ImuService};
pub use monitor::monitor_loop;
pub use rumble::Rumble;
