//! Audio pipeline: RIFF/WAV parsing over a memory map and a buffered
//! playback loop with underrun recovery.
//!
//! Single-stream linear PCM only; there is no mixing or multi-stream
//! scheduling. The hardware backend lives behind the [`PcmDevice`] trait so
//! the engine's semantics are testable without a sound card.

mod engine;
mod pcm;
mod sounds;
mod wav;

#[cfg(feature = "alsa-backend")]
mod alsa;
#[cfg(test)]
mod tests;

#[cfg(feature = "alsa-backend")]
pub use alsa::AlsaPcm;
pub use engine::{AudioError, AudioManager, CHUNK_FRAMES};
pub use pcm::{AudioFormat, DeviceError, PcmDevice, SampleFormat};
pub use sounds::{DeviceFactory, SoundService};
pub use wav::{WavError, WavMap};
