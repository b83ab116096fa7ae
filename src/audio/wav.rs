//! RIFF/WAV container parsing over a read-only memory map.
//!
//! The whole file is mapped once and walked by chunk; the decoded sample
//! data is a zero-copy view into the mapping. Chunks may appear in any
//! order, unknown chunk ids are skipped, and payloads are padded to even
//! offsets per the RIFF rules.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;
use std::slice;

use thiserror::Error;
use tracing::debug;

use super::pcm::{AudioFormat, SampleFormat};

/// WAVE format tags this parser accepts.
const FORMAT_PCM: u16 = 0x0001;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("i/o: {0}")]
    Io(#[from] io::Error),
    #[error("file too small for a RIFF header")]
    TooSmall,
    #[error("not a RIFF/WAVE file")]
    BadMagic,
    #[error("chunk '{0}' extends past the end of the file")]
    ChunkOverrun(String),
    #[error("fmt chunk too short: {0} bytes")]
    FmtTooShort(usize),
    #[error("fmt chunk declares no channels")]
    NoChannels,
    #[error("unsupported encoding tag {0:#06x}")]
    UnsupportedEncoding(u16),
    #[error("unsupported bits per sample: {0}")]
    UnsupportedBits(u16),
    #[error("missing fmt or data chunk")]
    MissingChunks,
}

/// Read-only mapping of a whole file, unmapped on drop.
struct Mapping {
    base: *const u8,
    len: usize,
}

// SAFETY: the mapping is private, read-only, and never remapped; sharing the
// base pointer across threads is sound.
unsafe impl Send for Mapping {}

impl Mapping {
    fn map(file: &File, len: usize) -> Result<Self, WavError> {
        // SAFETY: fd is valid for the duration of the call; len matches the
        // file size checked by the caller.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(WavError::Io(io::Error::last_os_error()));
        }
        Ok(Self {
            base: base as *const u8,
            len,
        })
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: base/len describe a live read-only mapping owned by self.
        unsafe { slice::from_raw_parts(self.base, self.len) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: base/len came from a successful mmap and are unmapped once.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.len);
        }
    }
}

/// A parsed WAV file: owns the descriptor and mapping, lends out the sample
/// data. The borrowed data view cannot outlive the map.
pub struct WavMap {
    _file: File,
    map: Mapping,
    fmt: AudioFormat,
    data_off: usize,
    data_len: usize,
}

impl WavMap {
    /// Map the whole file and locate the `fmt ` and `data` chunks. On any
    /// failure the mapping and descriptor are released; no partial state
    /// escapes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WavError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < 12 {
            return Err(WavError::TooSmall);
        }

        let map = Mapping::map(&file, len)?;
        let (fmt, data_off, data_len) = parse(map.bytes())?;

        debug!(
            path = %path.display(),
            channels = fmt.channels,
            sample_rate = fmt.sample_rate,
            bits = fmt.bits_per_sample,
            data_len,
            "wav mapped"
        );

        Ok(Self {
            _file: file,
            map,
            fmt,
            data_off,
            data_len,
        })
    }

    pub fn fmt(&self) -> &AudioFormat {
        &self.fmt
    }

    /// Zero-copy view of the decoded sample data inside the mapping.
    pub fn data(&self) -> &[u8] {
        &self.map.bytes()[self.data_off..self.data_off + self.data_len]
    }
}

fn rd_u16le(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([bytes[off], bytes[off + 1]])
}

fn rd_u32le(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

/// Walk the sibling chunks and return `(fmt, data offset, data len)`.
pub(super) fn parse(bytes: &[u8]) -> Result<(AudioFormat, usize, usize), WavError> {
    if bytes.len() < 12 {
        return Err(WavError::TooSmall);
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::BadMagic);
    }

    let mut off = 12;
    let mut fmt = None;
    let mut data = None;

    while off + 8 <= bytes.len() {
        let id = &bytes[off..off + 4];
        let size = rd_u32le(bytes, off + 4) as usize;
        let payload = off + 8;
        if size > bytes.len() - payload {
            return Err(WavError::ChunkOverrun(
                String::from_utf8_lossy(id).into_owned(),
            ));
        }

        match id {
            b"fmt " => fmt = Some(parse_fmt(&bytes[payload..payload + size])?),
            b"data" => data = Some((payload, size)),
            _ => {}
        }

        // Chunks are padded to even offsets.
        off = payload + size + (size & 1);
    }

    match (fmt, data) {
        (Some(fmt), Some((data_off, data_len))) => Ok((fmt, data_off, data_len)),
        _ => Err(WavError::MissingChunks),
    }
}

fn parse_fmt(payload: &[u8]) -> Result<AudioFormat, WavError> {
    if payload.len() < 16 {
        return Err(WavError::FmtTooShort(payload.len()));
    }

    let encoding = rd_u16le(payload, 0);
    let channels = rd_u16le(payload, 2);
    let sample_rate = rd_u32le(payload, 4);
    let block_align = rd_u16le(payload, 12);
    let bits_per_sample = rd_u16le(payload, 14);

    if encoding == FORMAT_EXTENSIBLE {
        // Extensible needs a cbSize of at least 22 (valid bits, channel
        // mask, subformat GUID). The subformat is accepted as PCM without
        // checking the GUID; a non-PCM extensible file will fail later at
        // playback, not here. Known limitation, kept intentionally.
        if payload.len() < 18 {
            return Err(WavError::FmtTooShort(payload.len()));
        }
        let cb = rd_u16le(payload, 16);
        if cb < 22 || payload.len() < 16 + 2 + 22 {
            return Err(WavError::FmtTooShort(payload.len()));
        }
    } else if encoding != FORMAT_PCM {
        return Err(WavError::UnsupportedEncoding(encoding));
    }

    if channels == 0 {
        return Err(WavError::NoChannels);
    }
    let format = SampleFormat::from_bits(bits_per_sample)
        .ok_or(WavError::UnsupportedBits(bits_per_sample))?;

    Ok(AudioFormat {
        format,
        channels: channels.into(),
        sample_rate,
        bits_per_sample: bits_per_sample.into(),
        block_align: block_align.into(),
    })
}
