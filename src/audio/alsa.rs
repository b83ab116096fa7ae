//! ALSA implementation of the playback device seam.

use alsa::pcm::{Access, Format, Frames, HwParams, PCM};
use alsa::{Direction, ValueOr};

use super::pcm::{AudioFormat, DeviceError, PcmDevice, SampleFormat};

pub struct AlsaPcm {
    pcm: PCM,
}

impl AlsaPcm {
    /// Open `name` (e.g. "default" or "hw:0,0") for playback in blocking
    /// mode; the engine paces itself with wait/avail.
    pub fn open(name: &str) -> Result<Self, DeviceError> {
        let pcm = PCM::new(name, Direction::Playback, false).map_err(map_err)?;
        Ok(Self { pcm })
    }
}

fn map_err(err: alsa::Error) -> DeviceError {
    match err.errno() {
        libc::EPIPE => DeviceError::Underrun,
        libc::ESTRPIPE => DeviceError::Suspended,
        _ => DeviceError::Backend(err.to_string()),
    }
}

fn map_format(format: SampleFormat) -> Format {
    match format {
        SampleFormat::U8 => Format::U8,
        SampleFormat::S16Le => Format::S16LE,
        // WAV carries 24-bit samples packed in 3 bytes.
        SampleFormat::S24Le => Format::S243LE,
        SampleFormat::S32Le => Format::S32LE,
    }
}

impl PcmDevice for AlsaPcm {
    fn configure(&mut self, fmt: &AudioFormat) -> Result<(), DeviceError> {
        let hwp = HwParams::any(&self.pcm).map_err(map_err)?;
        hwp.set_access(Access::RWInterleaved).map_err(map_err)?;
        hwp.set_format(map_format(fmt.format)).map_err(map_err)?;
        hwp.set_channels(fmt.channels).map_err(map_err)?;
        hwp.set_rate(fmt.sample_rate, ValueOr::Nearest)
            .map_err(map_err)?;
        self.pcm.hw_params(&hwp).map_err(map_err)
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.pcm.prepare().map_err(map_err)
    }

    fn hw_params(&self) -> Result<(usize, usize), DeviceError> {
        let hwp = self.pcm.hw_params_current().map_err(map_err)?;
        let buffer = hwp.get_buffer_size().map_err(map_err)?;
        let period = hwp.get_period_size().map_err(map_err)?;
        Ok((buffer as usize, period as usize))
    }

    fn set_sw_params(
        &mut self,
        start_threshold: usize,
        avail_min: usize,
    ) -> Result<(), DeviceError> {
        let swp = self.pcm.sw_params_current().map_err(map_err)?;
        swp.set_start_threshold(start_threshold as Frames)
            .map_err(map_err)?;
        swp.set_avail_min(avail_min as Frames).map_err(map_err)?;
        self.pcm.sw_params(&swp).map_err(map_err)
    }

    fn wait(&mut self, timeout_ms: i32) -> Result<bool, DeviceError> {
        self.pcm.wait(Some(timeout_ms as u32)).map_err(map_err)
    }

    fn avail(&mut self) -> Result<usize, DeviceError> {
        let frames = self.pcm.avail_update().map_err(map_err)?;
        Ok(frames.max(0) as usize)
    }

    fn writei(&mut self, buf: &[u8], frames: usize) -> Result<usize, DeviceError> {
        let frame_size = buf.len() / frames.max(1);
        let io = self.pcm.io_bytes();
        // IO::writei reports frames accepted, not bytes.
        let written_frames = io.writei(&buf[..frames * frame_size]).map_err(map_err)?;
        Ok(written_frames)
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.pcm.start().map_err(map_err)
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.pcm.drain().map_err(map_err)
    }
}
