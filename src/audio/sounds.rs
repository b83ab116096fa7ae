//! System sound service: the daemon-facing wrapper around the engine.
//!
//! `init` opens the playback device to the canonical prompt sound's format
//! and plays it as an audible boot check; after that any WAV on disk can be
//! played through [`SoundService::play`]. `release` drops the device so the
//! path can be powered down and re-initialized later.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::engine::{AudioError, AudioManager};
use super::pcm::{DeviceError, PcmDevice};
use super::wav::WavMap;

/// Factory for playback devices, injected so init/release cycles can reopen
/// the hardware and tests can substitute a mock.
pub type DeviceFactory = Box<dyn FnMut() -> Result<Box<dyn PcmDevice>, DeviceError> + Send>;

/// Default master gain applied at init, mirroring the shipped tuning.
const DEFAULT_MASTER_GAIN: f32 = 0.8;

pub struct SoundService {
    open_device: DeviceFactory,
    prompt_path: PathBuf,
    manager: Option<AudioManager>,
}

impl SoundService {
    pub fn new(open_device: DeviceFactory, prompt_path: impl Into<PathBuf>) -> Self {
        Self {
            open_device,
            prompt_path: prompt_path.into(),
            manager: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.manager.is_some()
    }

    /// Open the device to the prompt sound's format, enable auto-reinit so
    /// later files with other formats still play, apply the default gains,
    /// and play the prompt once.
    pub fn init(&mut self) -> Result<(), AudioError> {
        if self.manager.is_some() {
            debug!("audio already initialized");
            return Ok(());
        }

        let prompt = WavMap::open(&self.prompt_path)?;
        let device = (self.open_device)()?;
        let mut manager = AudioManager::new(device, prompt.fmt().clone())?;
        manager.set_auto_reinit(true);
        manager.set_master_gain(DEFAULT_MASTER_GAIN);
        manager.play(&prompt)?;

        info!(
            channels = manager.fmt().channels,
            sample_rate = manager.fmt().sample_rate,
            "audio system initialized"
        );
        self.manager = Some(manager);
        Ok(())
    }

    /// Open → play → close one sound file. Requires a prior `init`.
    pub fn play(&mut self, path: impl AsRef<Path>) -> Result<(), AudioError> {
        let manager = self.manager.as_mut().ok_or(AudioError::NotInitialized)?;
        let wav = WavMap::open(path.as_ref())?;
        manager.play(&wav)
    }

    /// Path of the canonical prompt sound (the default for play requests
    /// that name no file).
    pub fn prompt_path(&self) -> &Path {
        &self.prompt_path
    }

    /// Drop the device handle. Idempotent.
    pub fn release(&mut self) {
        if self.manager.take().is_some() {
            info!("audio system released");
        }
    }

    /// Direct engine access for gain adjustments.
    pub fn manager_mut(&mut self) -> Option<&mut AudioManager> {
        self.manager.as_mut()
    }
}
