//! Daemon entrypoint: wires the configured backends into the supervisor.
//!
//! With the `dbus-backend` feature the daemon owns its well-known bus name
//! and serves the UI process; without it an in-process loopback transport is
//! used so the daemon still runs on development hosts.

use anyhow::{Context, Result};
use tracing::{info, warn};

use sysmgrd::audio::{DeviceFactory, SoundService};
use sysmgrd::config::AppConfig;
use sysmgrd::hw::{Als, IioImu, ImuAngles, ImuSensor};
use sysmgrd::net::UnavailableNetwork;
use sysmgrd::{init_tracing, service};

/// Stand-in when no IMU hardware is present; reports a level board.
struct LevelImu;

impl ImuSensor for LevelImu {
    fn read_angles(&mut self) -> std::io::Result<ImuAngles> {
        Ok(ImuAngles::default())
    }
}

#[cfg(feature = "alsa-backend")]
fn device_factory(config: &AppConfig) -> DeviceFactory {
    use sysmgrd::audio::PcmDevice;
    let name = config.audio_device.clone();
    Box::new(move || {
        sysmgrd::audio::AlsaPcm::open(&name).map(|pcm| Box::new(pcm) as Box<dyn PcmDevice>)
    })
}

#[cfg(not(feature = "alsa-backend"))]
fn device_factory(_config: &AppConfig) -> DeviceFactory {
    use sysmgrd::audio::DeviceError;
    warn!("built without the alsa backend, audio playback is unavailable");
    Box::new(|| {
        Err(DeviceError::Backend(
            "no audio backend compiled in".to_string(),
        ))
    })
}

#[cfg(feature = "dbus-backend")]
fn open_transport() -> Result<Box<dyn sysmgrd::bus::BusTransport>> {
    let transport = sysmgrd::bus::dbus::DbusTransport::connect()
        .context("connecting to the system bus")?;
    Ok(Box::new(transport))
}

#[cfg(not(feature = "dbus-backend"))]
fn open_transport() -> Result<Box<dyn sysmgrd::bus::BusTransport>> {
    warn!("built without the dbus backend, using an in-process loopback bus");
    let (transport, peer) = sysmgrd::bus::loopback::pair()
        .context("allocating the loopback transport")?;
    // The peer half stays alive for the daemon lifetime; dropping it would
    // look like a lost connection to the bridge.
    std::mem::forget(peer);
    Ok(Box::new(transport))
}

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_tracing(&config);
    info!(audio_device = %config.audio_device, "system manager starting");

    let sound = SoundService::new(device_factory(&config), &config.prompt_sound);

    let imu_sensor: Box<dyn ImuSensor> = match IioImu::discover(&config.iio_base, &config.imu_sensor)
    {
        Ok(imu) => Box::new(imu),
        Err(err) => {
            warn!(sensor = %config.imu_sensor, %err, "imu not found, reporting level angles");
            Box::new(LevelImu)
        }
    };
    let als = match Als::discover(&config.iio_base, &config.als_sensor) {
        Ok(als) => Some(als),
        Err(err) => {
            warn!(sensor = %config.als_sensor, %err, "ambient light sensor not found");
            None
        }
    };

    let collaborators = service::Collaborators {
        transport: open_transport()?,
        sound,
        network: Box::new(UnavailableNetwork),
        imu_sensor,
        als,
    };

    service::run(&config, collaborators)
}
