//! Periodic hardware monitor thread.
//!
//! Polls the ambient light sensor and drains streamed IMU readings on a
//! fixed cadence, publishing them as trace-level telemetry. The loop is
//! endless by design and only exits when the service-wide running flag
//! clears.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, info, trace};

use super::als::Als;
use super::imu::ImuAngles;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn monitor_loop(
    running: Arc<AtomicBool>,
    als: Option<Als>,
    imu_readings: Receiver<ImuAngles>,
) {
    info!("hardware monitor is running...");

    while running.load(Ordering::SeqCst) {
        if let Some(als) = als.as_ref() {
            match als.read_illuminance() {
                Ok(lux) => trace!(lux, "ambient light sample"),
                Err(err) => debug!(%err, "ambient light read failed"),
            }
        }

        // Drain whatever the IMU thread queued since the last tick.
        while let Ok(angles) = imu_readings.try_recv() {
            trace!(
                roll = angles.roll,
                pitch = angles.pitch,
                yaw = angles.yaw,
                "imu sample"
            );
        }

        thread::sleep(POLL_INTERVAL);
    }

    info!("hardware monitor thread exiting");
}
