//! IMU orientation streaming.
//!
//! A dedicated thread polls the sensor for the remaining service lifetime,
//! keeps the latest reading available for one-shot queries, and fans
//! readings out over a bounded channel. When the channel is full the
//! reading is dropped and counted rather than blocking the sampler.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use super::sysfs;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Sensor seam; the shipped implementation reads IIO inclination attributes,
/// tests substitute a scripted source.
pub trait ImuSensor: Send {
    fn read_angles(&mut self) -> io::Result<ImuAngles>;
}

/// IIO-backed sensor located by matching the device's `name` attribute.
pub struct IioImu {
    device_dir: PathBuf,
}

impl IioImu {
    pub fn discover(base: impl AsRef<Path>, sensor_name: &str) -> io::Result<Self> {
        let device_dir = sysfs::find_device_path_by_name(base, "name", sensor_name)?;
        info!(device = %device_dir.display(), sensor_name, "IMU device found");
        Ok(Self { device_dir })
    }

    fn read_axis(&self, attr: &str) -> io::Result<f64> {
        let raw = sysfs::read_file(self.device_dir.join(attr))?;
        raw.trim_end()
            .parse::<f64>()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

impl ImuSensor for IioImu {
    fn read_angles(&mut self) -> io::Result<ImuAngles> {
        Ok(ImuAngles {
            roll: self.read_axis("in_incli_x_raw")?,
            pitch: self.read_axis("in_incli_y_raw")?,
            yaw: self.read_axis("in_incli_z_raw")?,
        })
    }
}

/// Shared view of the stream, handed to the task dispatcher.
#[derive(Clone)]
pub struct ImuHandle {
    latest: Arc<Mutex<ImuAngles>>,
    stop: Arc<AtomicBool>,
}

impl ImuHandle {
    /// Latest reading delivered by the streaming thread.
    pub fn read(&self) -> ImuAngles {
        *self.latest.lock().expect("imu latest lock poisoned")
    }

    /// Ask the streaming thread to stop sampling.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Owns the streaming thread; joined at service shutdown.
pub struct ImuService {
    handle: ImuHandle,
    readings: Receiver<ImuAngles>,
    thread: JoinHandle<()>,
}

impl ImuService {
    /// Spawn the streaming thread. It runs until the service-wide running
    /// flag clears or [`ImuHandle::stop`] is called.
    pub fn start(
        sensor: Box<dyn ImuSensor>,
        running: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let latest = Arc::new(Mutex::new(ImuAngles::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded(CHANNEL_CAPACITY);

        let handle = ImuHandle {
            latest: latest.clone(),
            stop: stop.clone(),
        };
        let thread = thread::Builder::new()
            .name("imu-stream".into())
            .spawn(move || streaming_loop(sensor, latest, stop, running, tx))?;

        Ok(Self {
            handle,
            readings: rx,
            thread,
        })
    }

    pub fn handle(&self) -> ImuHandle {
        self.handle.clone()
    }

    pub fn readings(&self) -> Receiver<ImuAngles> {
        self.readings.clone()
    }

    pub fn join(self) {
        self.handle.stop();
        if self.thread.join().is_err() {
            warn!("imu streaming thread panicked");
        }
    }
}

fn streaming_loop(
    mut sensor: Box<dyn ImuSensor>,
    latest: Arc<Mutex<ImuAngles>>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    tx: Sender<ImuAngles>,
) {
    info!("IMU streaming is running...");
    let dropped = AtomicUsize::new(0);

    while running.load(Ordering::SeqCst) && !stop.load(Ordering::SeqCst) {
        match sensor.read_angles() {
            Ok(angles) => {
                *latest.lock().expect("imu latest lock poisoned") = angles;
                match tx.try_send(angles) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Err(err) => debug!(%err, "imu read failed"),
        }
        thread::sleep(SAMPLE_INTERVAL);
    }

    let dropped = dropped.load(Ordering::Relaxed);
    if dropped > 0 {
        warn!(dropped, "imu readings dropped on full channel");
    }
    info!("IMU streaming thread exiting");
}
