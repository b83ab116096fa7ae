use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use super::engine::{AudioError, AudioManager};
use super::pcm::{AudioFormat, DeviceError, PcmDevice, SampleFormat};
use super::sounds::SoundService;
use super::wav::{self, WavError, WavMap};

// WAV byte builders --------------------------------------------------------

fn riff(chunks: &[&[u8]]) -> Vec<u8> {
    let payload: usize = chunks.iter().map(|c| c.len()).sum();
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((4 + payload) as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out
}

fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(id);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0); // pad byte
    }
    out
}

fn fmt_chunk(channels: u16, sample_rate: u32, bits: u16) -> Vec<u8> {
    let block_align = channels * bits / 8;
    let mut payload = Vec::new();
    payload.extend_from_slice(&1u16.to_le_bytes()); // PCM
    payload.extend_from_slice(&channels.to_le_bytes());
    payload.extend_from_slice(&sample_rate.to_le_bytes());
    payload.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    payload.extend_from_slice(&block_align.to_le_bytes());
    payload.extend_from_slice(&bits.to_le_bytes());
    chunk(b"fmt ", &payload)
}

fn mono16(data: &[u8]) -> Vec<u8> {
    riff(&[&fmt_chunk(1, 44100, 16), &chunk(b"data", data)])
}

// Parser -------------------------------------------------------------------

#[test]
fn parses_minimal_mono_16bit_pcm() {
    let bytes = mono16(&[0u8; 100]);
    let (fmt, _data_off, data_len) = wav::parse(&bytes).expect("valid file");
    assert_eq!(fmt.channels, 1);
    assert_eq!(fmt.sample_rate, 44100);
    assert_eq!(fmt.bits_per_sample, 16);
    assert_eq!(fmt.format, SampleFormat::S16Le);
    assert_eq!(fmt.block_align, 2);
    assert_eq!(data_len, 100);
}

#[test]
fn chunk_order_does_not_matter() {
    let bytes = riff(&[&chunk(b"data", &[0u8; 8]), &fmt_chunk(2, 48000, 16)]);
    let (fmt, _, data_len) = wav::parse(&bytes).expect("data before fmt is legal");
    assert_eq!(fmt.channels, 2);
    assert_eq!(data_len, 8);
}

#[test]
fn unknown_chunks_are_skipped_with_pad_byte() {
    // LIST payload of 7 bytes forces an odd size and a pad byte.
    let bytes = riff(&[
        &chunk(b"LIST", &[0u8; 7]),
        &fmt_chunk(1, 8000, 8),
        &chunk(b"data", &[0x80; 4]),
    ]);
    let (fmt, _, data_len) = wav::parse(&bytes).expect("unknown chunk skipped");
    assert_eq!(fmt.format, SampleFormat::U8);
    assert_eq!(data_len, 4);
}

#[test]
fn rejects_truncated_header() {
    assert!(matches!(wav::parse(b"RIFF\0\0"), Err(WavError::TooSmall)));
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = mono16(&[0u8; 4]);
    bytes[8..12].copy_from_slice(b"AVI ");
    assert!(matches!(wav::parse(&bytes), Err(WavError::BadMagic)));
}

#[test]
fn rejects_chunk_past_end_of_mapping() {
    let mut bytes = riff(&[&fmt_chunk(1, 44100, 16), &chunk(b"data", &[0u8; 16])]);
    // Claim far more data than the file holds.
    let data_size_off = bytes.len() - 16 - 4;
    bytes[data_size_off..data_size_off + 4].copy_from_slice(&4096u32.to_le_bytes());
    assert!(matches!(
        wav::parse(&bytes),
        Err(WavError::ChunkOverrun(_))
    ));
}

#[test]
fn rejects_unsupported_bit_depth() {
    let bytes = riff(&[&fmt_chunk(1, 44100, 12), &chunk(b"data", &[0u8; 6])]);
    assert!(matches!(
        wav::parse(&bytes),
        Err(WavError::UnsupportedBits(12))
    ));
}

#[test]
fn accepts_extensible_format_as_pcm() {
    // 40-byte extensible fmt chunk; the subtype GUID is not validated.
    let mut payload = Vec::new();
    payload.extend_from_slice(&0xFFFEu16.to_le_bytes());
    payload.extend_from_slice(&2u16.to_le_bytes());
    payload.extend_from_slice(&48000u32.to_le_bytes());
    payload.extend_from_slice(&192_000u32.to_le_bytes());
    payload.extend_from_slice(&4u16.to_le_bytes());
    payload.extend_from_slice(&16u16.to_le_bytes());
    payload.extend_from_slice(&22u16.to_le_bytes()); // cbSize
    payload.extend_from_slice(&[0u8; 22]);
    let bytes = riff(&[&chunk(b"fmt ", &payload), &chunk(b"data", &[0u8; 8])]);

    let (fmt, _, _) = wav::parse(&bytes).expect("extensible is treated as PCM");
    assert_eq!(fmt.format, SampleFormat::S16Le);
    assert_eq!(fmt.channels, 2);
}

#[test]
fn rejects_compressed_encodings() {
    let mut bytes = riff(&[&fmt_chunk(1, 44100, 16), &chunk(b"data", &[0u8; 4])]);
    // Patch the format tag to MPEG layer 3.
    bytes[20..22].copy_from_slice(&0x0055u16.to_le_bytes());
    assert!(matches!(
        wav::parse(&bytes),
        Err(WavError::UnsupportedEncoding(0x0055))
    ));
}

#[test]
fn rejects_file_without_fmt_or_data() {
    let bytes = riff(&[&chunk(b"LIST", &[0u8; 4])]);
    assert!(matches!(wav::parse(&bytes), Err(WavError::MissingChunks)));
}

#[test]
fn wav_map_opens_and_borrows_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");
    let data: Vec<u8> = (0..100).collect();
    fs::write(&path, mono16(&data)).unwrap();

    let map = WavMap::open(&path).expect("open maps and parses");
    assert_eq!(map.fmt().sample_rate, 44100);
    assert_eq!(map.data(), &data[..]);
}

// Mock device --------------------------------------------------------------

#[derive(Default)]
struct MockState {
    configured: Vec<AudioFormat>,
    prepares: usize,
    writes: Vec<usize>,
    written_bytes: Vec<u8>,
    sw_params: Option<(usize, usize)>,
    started: usize,
    drained: usize,
    /// Errors handed out by the next writei calls, front first.
    write_faults: VecDeque<DeviceError>,
    /// Caps applied to the next avail calls, front first.
    avail_caps: VecDeque<usize>,
    /// Frame counts forced on the next successful writes (short writes).
    short_writes: VecDeque<usize>,
}

#[derive(Clone)]
struct MockPcm {
    state: Arc<Mutex<MockState>>,
    buffer_frames: usize,
    period_frames: usize,
}

impl MockPcm {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            buffer_frames: 8192,
            period_frames: 1024,
        }
    }

    fn state(&self) -> Arc<Mutex<MockState>> {
        self.state.clone()
    }
}

impl PcmDevice for MockPcm {
    fn configure(&mut self, fmt: &AudioFormat) -> Result<(), DeviceError> {
        self.state.lock().unwrap().configured.push(fmt.clone());
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.state.lock().unwrap().prepares += 1;
        Ok(())
    }

    fn hw_params(&self) -> Result<(usize, usize), DeviceError> {
        Ok((self.buffer_frames, self.period_frames))
    }

    fn set_sw_params(&mut self, start: usize, min: usize) -> Result<(), DeviceError> {
        self.state.lock().unwrap().sw_params = Some((start, min));
        Ok(())
    }

    fn wait(&mut self, _timeout_ms: i32) -> Result<bool, DeviceError> {
        Ok(true)
    }

    fn avail(&mut self) -> Result<usize, DeviceError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.avail_caps.pop_front().unwrap_or(self.buffer_frames))
    }

    fn writei(&mut self, buf: &[u8], frames: usize) -> Result<usize, DeviceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(fault) = state.write_faults.pop_front() {
            return Err(fault);
        }
        let accepted = state.short_writes.pop_front().unwrap_or(frames).min(frames);
        let frame_size = buf.len() / frames.max(1);
        state.writes.push(accepted);
        state
            .written_bytes
            .extend_from_slice(&buf[..accepted * frame_size]);
        Ok(accepted)
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.state.lock().unwrap().started += 1;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.state.lock().unwrap().drained += 1;
        Ok(())
    }
}

fn open_map(dir: &TempDir, name: &str, bytes: &[u8]) -> WavMap {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    WavMap::open(&path).unwrap()
}

fn mono16_fmt() -> AudioFormat {
    AudioFormat {
        format: SampleFormat::S16Le,
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        block_align: 2,
    }
}

// Playback loop ------------------------------------------------------------

#[test]
fn frame_accounting_is_exact_over_a_full_play() {
    let dir = TempDir::new().unwrap();
    let data = vec![0u8; 2 * 10_000]; // 10k frames of mono 16-bit
    let map = open_map(&dir, "long.wav", &mono16(&data));

    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), mono16_fmt()).unwrap();
    mgr.play(&map).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.writes.iter().sum::<usize>(), 10_000);
    assert_eq!(state.drained, 1);
}

#[test]
fn underrun_retries_same_iteration_without_losing_frames() {
    let dir = TempDir::new().unwrap();
    let data = vec![0u8; 2 * 6000];
    let map = open_map(&dir, "tone.wav", &mono16(&data));

    let device = MockPcm::new();
    let state = device.state();
    state
        .lock()
        .unwrap()
        .write_faults
        .extend([DeviceError::Underrun, DeviceError::Suspended]);

    let mut mgr = AudioManager::new(Box::new(device), mono16_fmt()).unwrap();
    mgr.play(&map).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.writes.iter().sum::<usize>(), 6000);
    // One prepare at play start plus one per recovered fault.
    assert_eq!(state.prepares, 3);
}

#[test]
fn short_writes_advance_by_accepted_frames_only() {
    let dir = TempDir::new().unwrap();
    let data = vec![0u8; 2 * 5000];
    let map = open_map(&dir, "tone.wav", &mono16(&data));

    let device = MockPcm::new();
    let state = device.state();
    state.lock().unwrap().short_writes.extend([100, 250]);

    let mut mgr = AudioManager::new(Box::new(device), mono16_fmt()).unwrap();
    mgr.play(&map).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.writes.iter().sum::<usize>(), 5000);
    assert_eq!(state.writes[0], 100);
    assert_eq!(state.writes[1], 250);
}

#[test]
fn chunking_respects_available_slots() {
    let dir = TempDir::new().unwrap();
    let data = vec![0u8; 2 * 5000];
    let map = open_map(&dir, "tone.wav", &mono16(&data));

    let device = MockPcm::new();
    let state = device.state();
    state.lock().unwrap().avail_caps.extend([64, 4096, 0]);

    let mut mgr = AudioManager::new(Box::new(device), mono16_fmt()).unwrap();
    mgr.play(&map).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.writes[0], 64);
    // min(remaining=4936, avail=4096, cap=4096)
    assert_eq!(state.writes[1], 4096);
    // The zero-avail iteration produced no write at all.
    assert_eq!(state.writes[2], 840);
    assert_eq!(state.writes.len(), 3);
}

#[test]
fn auto_start_threshold_is_the_buffer_size() {
    let dir = TempDir::new().unwrap();
    let map = open_map(&dir, "tone.wav", &mono16(&[0u8; 32]));

    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), mono16_fmt()).unwrap();
    mgr.play(&map).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.sw_params, Some((8192, 1024)));
    assert_eq!(state.started, 0);
}

#[test]
fn manual_start_disables_auto_threshold_and_kicks_once() {
    let dir = TempDir::new().unwrap();
    let map = open_map(&dir, "tone.wav", &mono16(&[0u8; 32]));

    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), mono16_fmt()).unwrap();
    mgr.set_manual_start(true);
    mgr.play(&map).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.sw_params, Some((8193, 1024)));
    assert_eq!(state.started, 1);
}

// Format negotiation -------------------------------------------------------

fn stereo48_fmt() -> AudioFormat {
    AudioFormat {
        format: SampleFormat::S16Le,
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 16,
        block_align: 4,
    }
}

#[test]
fn format_mismatch_without_auto_reinit_fails_untouched() {
    let dir = TempDir::new().unwrap();
    let map = open_map(&dir, "tone.wav", &mono16(&[0u8; 32]));

    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), stereo48_fmt()).unwrap();

    let err = mgr.play(&map).expect_err("mismatch must fail");
    assert!(matches!(err, AudioError::FormatMismatch { .. }));

    let state = state.lock().unwrap();
    // Only the constructor's configure; no frames written.
    assert_eq!(state.configured.len(), 1);
    assert!(state.writes.is_empty());
}

#[test]
fn format_mismatch_with_auto_reinit_reconfigures_before_writing() {
    let dir = TempDir::new().unwrap();
    let map = open_map(&dir, "tone.wav", &mono16(&[0u8; 32]));

    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), stereo48_fmt()).unwrap();
    mgr.set_auto_reinit(true);
    mgr.play(&map).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.configured.len(), 2);
    assert_eq!(state.configured[1], mono16_fmt());
    assert_eq!(state.writes.iter().sum::<usize>(), 16);
}

#[test]
fn skip_format_check_bypasses_negotiation() {
    let dir = TempDir::new().unwrap();
    let map = open_map(&dir, "tone.wav", &mono16(&[0u8; 32]));

    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), stereo48_fmt()).unwrap();
    mgr.set_skip_format_check(true);
    // Plays against the configured stereo format, so 32 bytes is 8 frames.
    mgr.play(&map).unwrap();
    assert_eq!(state.lock().unwrap().writes.iter().sum::<usize>(), 8);
}

// Gain ---------------------------------------------------------------------

#[test]
fn unity_gain_writes_mapped_bytes_verbatim() {
    let dir = TempDir::new().unwrap();
    let data: Vec<u8> = (0..64).collect();
    let map = open_map(&dir, "tone.wav", &mono16(&data));

    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), mono16_fmt()).unwrap();
    mgr.play(&map).unwrap();

    assert_eq!(state.lock().unwrap().written_bytes, data);
}

#[test]
fn master_gain_scales_s16_samples() {
    let dir = TempDir::new().unwrap();
    let mut data = Vec::new();
    for sample in [1000i16, -1000, i16::MAX, i16::MIN] {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    let map = open_map(&dir, "tone.wav", &mono16(&data));

    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), mono16_fmt()).unwrap();
    mgr.set_master_gain(0.5);
    mgr.play(&map).unwrap();

    let written = state.lock().unwrap().written_bytes.clone();
    let samples: Vec<i16> = written
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(samples[0], 500);
    assert_eq!(samples[1], -500);
    assert_eq!(samples[2], i16::MAX / 2 + 1); // 16383.5 rounds up
    assert_eq!(samples[3], i16::MIN / 2);
}

#[test]
fn per_channel_gain_applies_to_its_channel_only() {
    let dir = TempDir::new().unwrap();
    // Two stereo frames: L=1000, R=1000 each.
    let mut data = Vec::new();
    for _ in 0..2 {
        data.extend_from_slice(&1000i16.to_le_bytes());
        data.extend_from_slice(&1000i16.to_le_bytes());
    }
    let bytes = riff(&[&fmt_chunk(2, 48000, 16), &chunk(b"data", &data)]);
    let map = open_map(&dir, "tone.wav", &bytes);

    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), stereo48_fmt()).unwrap();
    mgr.set_channel_gain(1, 0.25);
    mgr.play(&map).unwrap();

    let written = state.lock().unwrap().written_bytes.clone();
    let samples: Vec<i16> = written
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(samples, vec![1000, 250, 1000, 250]);
}

#[test]
fn u8_gain_scales_around_the_midpoint() {
    let dir = TempDir::new().unwrap();
    let bytes = riff(&[
        &fmt_chunk(1, 8000, 8),
        &chunk(b"data", &[128, 228, 28, 255]),
    ]);
    let map = open_map(&dir, "tone.wav", &bytes);

    let fmt = AudioFormat {
        format: SampleFormat::U8,
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 8,
        block_align: 1,
    };
    let device = MockPcm::new();
    let state = device.state();
    let mut mgr = AudioManager::new(Box::new(device), fmt).unwrap();
    mgr.set_master_gain(0.5);
    mgr.play(&map).unwrap();

    assert_eq!(state.lock().unwrap().written_bytes, vec![128, 178, 78, 192]);
}

// Sound service ------------------------------------------------------------

#[test]
fn sound_service_init_plays_prompt_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let prompt = dir.path().join("prompt.wav");
    fs::write(&prompt, mono16(&[0u8; 64])).unwrap();

    let device = MockPcm::new();
    let state = device.state();
    let mut devices = Some(Box::new(device) as Box<dyn PcmDevice>);
    let mut service = SoundService::new(
        Box::new(move || devices.take().ok_or(DeviceError::NotConfigured)),
        &prompt,
    );

    service.init().expect("first init opens and plays");
    assert!(service.is_initialized());
    assert_eq!(state.lock().unwrap().writes.iter().sum::<usize>(), 32);

    // A second init must not reopen the device (the factory is exhausted).
    service.init().expect("idempotent");
}

#[test]
fn sound_service_play_requires_init() {
    let dir = TempDir::new().unwrap();
    let prompt = dir.path().join("prompt.wav");
    fs::write(&prompt, mono16(&[0u8; 16])).unwrap();

    let mut service = SoundService::new(
        Box::new(|| Ok(Box::new(MockPcm::new()) as Box<dyn PcmDevice>)),
        &prompt,
    );
    let err = service.play(&prompt).expect_err("not initialized yet");
    assert!(matches!(err, AudioError::NotInitialized));
}

#[test]
fn sound_service_release_allows_reinit() {
    let dir = TempDir::new().unwrap();
    let prompt = dir.path().join("prompt.wav");
    fs::write(&prompt, mono16(&[0u8; 16])).unwrap();

    let mut service = SoundService::new(
        Box::new(|| Ok(Box::new(MockPcm::new()) as Box<dyn PcmDevice>)),
        &prompt,
    );
    service.init().unwrap();
    service.release();
    assert!(!service.is_initialized());
    service.init().expect("reopens through the factory");
}
