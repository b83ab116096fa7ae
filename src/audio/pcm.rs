//! Playback device seam.
//!
//! The engine drives any [`PcmDevice`]; the shipped hardware implementation
//! is the ALSA backend behind the `alsa-backend` feature. The trait mirrors
//! the small slice of the PCM lifecycle the engine needs: configure,
//! prepare, software-parameter setup, bounded waits, availability queries,
//! interleaved writes, and drain.

use thiserror::Error;

/// Linear PCM sample encodings the pipeline understands, keyed by bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    S16Le,
    S24Le,
    S32Le,
}

impl SampleFormat {
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(SampleFormat::U8),
            16 => Some(SampleFormat::S16Le),
            24 => Some(SampleFormat::S24Le),
            32 => Some(SampleFormat::S32Le),
            _ => None,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le => 3,
            SampleFormat::S32Le => 4,
        }
    }
}

/// Negotiated stream format. `block_align` is the frame size in bytes across
/// all channels, exactly as the container declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    pub format: SampleFormat,
    pub channels: u32,
    pub sample_rate: u32,
    pub bits_per_sample: u32,
    pub block_align: u32,
}

impl AudioFormat {
    /// Bytes per sample-frame across all channels.
    pub fn frame_size(&self) -> usize {
        self.block_align as usize
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device consumed its buffered frames before more were supplied.
    /// Transient: the engine re-prepares and retries the same iteration.
    #[error("playback underrun")]
    Underrun,
    /// The device was suspended (e.g. system sleep). Transient, handled like
    /// an underrun.
    #[error("device suspended")]
    Suspended,
    #[error("device is not configured")]
    NotConfigured,
    #[error("audio backend: {0}")]
    Backend(String),
}

impl DeviceError {
    /// Underrun/suspend are recovered in place; everything else escalates.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DeviceError::Underrun | DeviceError::Suspended)
    }
}

pub trait PcmDevice: Send {
    /// Apply a stream format to the hardware.
    fn configure(&mut self, fmt: &AudioFormat) -> Result<(), DeviceError>;

    /// Bring the device to the prepared state (also the underrun recovery
    /// path).
    fn prepare(&mut self) -> Result<(), DeviceError>;

    /// Hardware `(buffer_frames, period_frames)` currently in effect.
    fn hw_params(&self) -> Result<(usize, usize), DeviceError>;

    /// Software start threshold and minimum-wakeup watermark, in frames.
    fn set_sw_params(&mut self, start_threshold: usize, avail_min: usize)
        -> Result<(), DeviceError>;

    /// Block up to `timeout_ms` for write capacity. `Ok(false)` is a timeout.
    fn wait(&mut self, timeout_ms: i32) -> Result<bool, DeviceError>;

    /// Frame slots currently writable without blocking.
    fn avail(&mut self) -> Result<usize, DeviceError>;

    /// Write up to `frames` interleaved frames from `buf`; may write fewer.
    /// Returns the number of frames accepted.
    fn writei(&mut self, buf: &[u8], frames: usize) -> Result<usize, DeviceError>;

    /// Kick playback explicitly (manual-start mode only; with an auto-start
    /// threshold the hardware starts itself).
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Let already queued frames play out.
    fn drain(&mut self) -> Result<(), DeviceError>;
}
