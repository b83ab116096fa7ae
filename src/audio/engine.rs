//! Buffered playback engine.
//!
//! Drives a [`PcmDevice`] through prepare → prime → stream → drain for one
//! mapped WAV file at a time. Underrun and suspend are recovered in place by
//! re-preparing the device and retrying the same iteration, so no frame is
//! skipped or written twice. Gain is applied as samples are handed to the
//! device; unity gain writes the mapped bytes directly.

use thiserror::Error;
use tracing::{info, warn};

use super::pcm::{AudioFormat, DeviceError, PcmDevice, SampleFormat};
use super::wav::{WavError, WavMap};

/// Upper bound on frames handed to the device per write.
pub const CHUNK_FRAMES: usize = 4096;

/// Bound on each device-readiness wait.
const WAIT_TIMEOUT_MS: i32 = 1000;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error(transparent)]
    Wav(#[from] WavError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("device format {device:?} does not match file format {file:?}")]
    FormatMismatch {
        device: AudioFormat,
        file: AudioFormat,
    },
    #[error("negotiated format has a zero frame size")]
    ZeroFrameSize,
    #[error("audio system is not initialized")]
    NotInitialized,
}

/// Owns the playback device, the negotiated format, and the gain state.
/// The device has no internal locking; whoever owns the manager serializes
/// playback (the daemon runs a single audio-capable consumer).
pub struct AudioManager {
    device: Box<dyn PcmDevice>,
    fmt: AudioFormat,
    master_gain: f32,
    channel_gains: Vec<f32>,
    auto_reinit: bool,
    skip_format_check: bool,
    manual_start: bool,
    scratch: Vec<u8>,
}

impl AudioManager {
    /// Configure `device` to `fmt` and take ownership of both.
    pub fn new(device: Box<dyn PcmDevice>, fmt: AudioFormat) -> Result<Self, AudioError> {
        let mut mgr = Self {
            device,
            channel_gains: vec![1.0; fmt.channels as usize],
            fmt,
            master_gain: 1.0,
            auto_reinit: false,
            skip_format_check: false,
            manual_start: false,
            scratch: Vec::new(),
        };
        mgr.device.configure(&mgr.fmt)?;
        Ok(mgr)
    }

    pub fn fmt(&self) -> &AudioFormat {
        &self.fmt
    }

    pub fn set_auto_reinit(&mut self, enabled: bool) {
        self.auto_reinit = enabled;
    }

    pub fn set_skip_format_check(&mut self, enabled: bool) {
        self.skip_format_check = enabled;
    }

    pub fn set_manual_start(&mut self, enabled: bool) {
        self.manual_start = enabled;
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain.max(0.0);
    }

    /// Per-channel multiplier on top of the master gain. Out-of-range channel
    /// indices are ignored with a warning.
    pub fn set_channel_gain(&mut self, channel: usize, gain: f32) {
        match self.channel_gains.get_mut(channel) {
            Some(slot) => *slot = gain.max(0.0),
            None => warn!(
                channel,
                channels = self.channel_gains.len(),
                "channel gain index out of range"
            ),
        }
    }

    /// Reconfigure the device for a new stream format. Existing channel
    /// gains are kept where the channel still exists.
    pub fn reinit(&mut self, fmt: AudioFormat) -> Result<(), AudioError> {
        self.device.configure(&fmt)?;
        self.channel_gains.resize(fmt.channels as usize, 1.0);
        self.fmt = fmt;
        Ok(())
    }

    /// Play one mapped file to completion, including format negotiation and
    /// drain. Blocks the calling thread for the duration of playback.
    pub fn play(&mut self, wav: &WavMap) -> Result<(), AudioError> {
        self.negotiate(wav.fmt())?;

        let frame_size = self.fmt.frame_size();
        if frame_size == 0 {
            return Err(AudioError::ZeroFrameSize);
        }
        let total_frames = wav.data().len() / frame_size;

        self.device.prepare()?;
        let (buffer_frames, period_frames) = self.device.hw_params()?;
        // Start threshold at the buffer size lets the hardware start itself
        // once priming crosses it; one frame past the buffer means it never
        // fires and start() must be called instead.
        let threshold = if self.manual_start {
            buffer_frames + 1
        } else {
            buffer_frames
        };
        self.device.set_sw_params(threshold, period_frames)?;

        self.stream(wav.data(), frame_size, total_frames)?;
        self.device.drain()?;
        Ok(())
    }

    /// Compare the file's format against the device configuration and
    /// reconcile per the engine flags.
    fn negotiate(&mut self, file_fmt: &AudioFormat) -> Result<(), AudioError> {
        if self.skip_format_check {
            return Ok(());
        }
        let matches = self.fmt.channels == file_fmt.channels
            && self.fmt.sample_rate == file_fmt.sample_rate
            && self.fmt.format == file_fmt.format;
        if matches {
            return Ok(());
        }
        if !self.auto_reinit {
            return Err(AudioError::FormatMismatch {
                device: self.fmt.clone(),
                file: file_fmt.clone(),
            });
        }
        info!(
            channels = file_fmt.channels,
            sample_rate = file_fmt.sample_rate,
            "format mismatch, reinitializing audio device"
        );
        self.reinit(file_fmt.clone())
    }

    fn stream(&mut self, data: &[u8], frame_size: usize, total_frames: usize) -> Result<(), AudioError> {
        let mut done = 0usize;
        let mut started = false;

        while done < total_frames {
            match self.device.wait(WAIT_TIMEOUT_MS) {
                Ok(_ready) => {}
                Err(err) if err.is_recoverable() => {
                    warn!(%err, "recovering playback device");
                    self.device.prepare()?;
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            let avail = match self.device.avail() {
                Ok(n) => n,
                Err(err) if err.is_recoverable() => {
                    warn!(%err, "recovering playback device");
                    self.device.prepare()?;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if avail == 0 {
                continue;
            }

            let want = (total_frames - done).min(avail).min(CHUNK_FRAMES);
            let src = &data[done * frame_size..(done + want) * frame_size];

            let write = if self.is_unity_gain() {
                self.device.writei(src, want)
            } else {
                self.apply_gain(src);
                self.device.writei(&self.scratch, want)
            };
            let written = match write {
                Ok(n) => n,
                Err(err) if err.is_recoverable() => {
                    warn!(%err, "recovering playback device");
                    self.device.prepare()?;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if !started && self.manual_start {
                self.device.start()?;
            }
            started = true;
            done += written;
        }
        Ok(())
    }

    fn is_unity_gain(&self) -> bool {
        (self.master_gain - 1.0).abs() < f32::EPSILON
            && self
                .channel_gains
                .iter()
                .all(|g| (g - 1.0).abs() < f32::EPSILON)
    }

    /// Scale one chunk into the scratch buffer, sample by sample, channel by
    /// channel.
    fn apply_gain(&mut self, src: &[u8]) {
        self.scratch.clear();
        self.scratch.extend_from_slice(src);

        let channels = (self.fmt.channels as usize).max(1);
        let stride = (self.fmt.frame_size() / channels).max(1);

        for (i, sample) in self.scratch.chunks_exact_mut(stride).enumerate() {
            let channel = i % channels;
            let gain =
                self.master_gain * self.channel_gains.get(channel).copied().unwrap_or(1.0);

            if self.fmt.format == SampleFormat::U8 {
                // Offset-binary: scale around the 128 midpoint.
                let centered = sample[0] as i64 - 128;
                let scaled = scale(centered, gain, -128, 127);
                sample[0] = (scaled + 128) as u8;
            } else {
                let bits = stride * 8;
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                let value = read_sample_le(sample);
                write_sample_le(sample, scale(value, gain, min, max));
            }
        }
    }
}

fn scale(value: i64, gain: f32, min: i64, max: i64) -> i64 {
    let scaled = (value as f64 * gain as f64).round() as i64;
    scaled.clamp(min, max)
}

/// Little-endian signed read of a 1-4 byte sample, sign-extended from its
/// top bit.
fn read_sample_le(bytes: &[u8]) -> i64 {
    let mut value: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= (*b as i64) << (8 * i);
    }
    let shift = 64 - bytes.len() * 8;
    (value << shift) >> shift
}

fn write_sample_le(bytes: &mut [u8], value: i64) {
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (value >> (8 * i)) as u8;
    }
}
