use std::fs;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use crate::audio::{AudioFormat, DeviceError, PcmDevice, SoundService};
use crate::bus::Command;
use crate::hw::{Backlight, ImuAngles, ImuSensor, ImuService, Rumble};

use super::{Opcode, TaskError, TaskExecutor, WorkItem, WorkQueue};

#[test]
fn push_then_pop_across_threads_returns_same_item() {
    let queue = Arc::new(WorkQueue::new());
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.pop_blocking())
    };

    queue.push(41_i32).expect("queue is open");
    assert_eq!(consumer.join().unwrap(), Some(41));
    assert!(queue.is_empty());
}

#[test]
fn single_producer_order_is_fifo() {
    let queue = WorkQueue::new();
    for n in 0..10 {
        queue.push(n).unwrap();
    }
    queue.close();
    let drained: Vec<i32> = std::iter::from_fn(|| queue.pop_blocking()).collect();
    assert_eq!(drained, (0..10).collect::<Vec<_>>());
}

#[test]
fn close_wakes_blocked_consumers() {
    let queue: Arc<WorkQueue<i32>> = Arc::new(WorkQueue::new());
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_blocking())
        })
        .collect();

    // Give the consumers a moment to block on the condvar.
    thread::sleep(Duration::from_millis(50));
    queue.close();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), None);
    }
}

#[test]
fn push_after_close_returns_the_item() {
    let queue = WorkQueue::new();
    queue.close();
    let rejected = queue.push(7_i32).expect_err("queue is closed");
    assert_eq!(rejected.0, 7);
}

#[test]
fn queued_items_survive_close_until_drained() {
    let queue = WorkQueue::new();
    queue.push("pending").unwrap();
    queue.close();
    assert_eq!(queue.pop_blocking(), Some("pending"));
    assert_eq!(queue.pop_blocking(), None);
}

// Dispatcher fixtures ------------------------------------------------------

struct IdlePcm;

impl PcmDevice for IdlePcm {
    fn configure(&mut self, _fmt: &AudioFormat) -> Result<(), DeviceError> {
        Ok(())
    }
    fn prepare(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
    fn hw_params(&self) -> Result<(usize, usize), DeviceError> {
        Ok((8192, 1024))
    }
    fn set_sw_params(&mut self, _start: usize, _min: usize) -> Result<(), DeviceError> {
        Ok(())
    }
    fn wait(&mut self, _timeout_ms: i32) -> Result<bool, DeviceError> {
        Ok(true)
    }
    fn avail(&mut self) -> Result<usize, DeviceError> {
        Ok(8192)
    }
    fn writei(&mut self, _buf: &[u8], frames: usize) -> Result<usize, DeviceError> {
        Ok(frames)
    }
    fn start(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
    fn drain(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

struct StillImu;

impl ImuSensor for StillImu {
    fn read_angles(&mut self) -> io::Result<ImuAngles> {
        Ok(ImuAngles::default())
    }
}

fn mono16_wav(data_bytes: usize) -> Vec<u8> {
    let mut wav = Vec::new();
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&((36 + data_bytes) as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // channels
    wav.extend_from_slice(&44100u32.to_le_bytes());
    wav.extend_from_slice(&88200u32.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_bytes as u32).to_le_bytes());
    wav.extend_from_slice(&vec![0u8; data_bytes]);
    wav
}

struct Fixture {
    executor: TaskExecutor,
    dir: TempDir,
    imu: ImuService,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let brightness = dir.path().join("brightness");
    let actual = dir.path().join("actual_brightness");
    let trigger = dir.path().join("trigger");
    fs::write(&brightness, "0").unwrap();
    fs::write(&actual, "0").unwrap();
    fs::write(&trigger, "").unwrap();
    let prompt = dir.path().join("prompt.wav");
    fs::write(&prompt, mono16_wav(64)).unwrap();

    let backlight = Backlight::new(&brightness, &actual, dir.path().join("power"));
    let rumble = Rumble::new(&trigger);
    let sound = SoundService::new(Box::new(|| Ok(Box::new(IdlePcm) as Box<dyn PcmDevice>)), prompt);

    let running = Arc::new(AtomicBool::new(true));
    let imu = ImuService::start(Box::new(StillImu), running).unwrap();

    Fixture {
        executor: TaskExecutor::new(backlight, rumble, sound, imu.handle()),
        dir,
        imu,
    }
}

impl Fixture {
    fn finish(self) {
        self.imu.join();
    }
}

#[test]
fn unknown_opcode_is_rejected_not_fatal() {
    let mut fx = fixture();
    let cmd = Command::new("ui", 1, 0x7f);
    let err = fx
        .executor
        .dispatch(WorkItem::Remote(cmd))
        .expect_err("opcode 0x7f is not mapped");
    assert!(matches!(err, TaskError::UnknownOpcode(0x7f)));
    fx.finish();
}

#[test]
fn bad_payload_aborts_only_that_command() {
    let mut fx = fixture();

    // SetBrightness without its positional argument.
    let cmd = Command::new("ui", 1, Opcode::SetBrightness as i32);
    let err = fx
        .executor
        .dispatch(WorkItem::Remote(cmd))
        .expect_err("entry 1 is missing");
    assert!(matches!(err, TaskError::Payload(_)));

    // The executor still handles a well-formed item afterwards.
    fx.executor
        .dispatch(WorkItem::Local {
            opcode: Opcode::SetBrightness,
            arg: Some(60),
        })
        .expect("inline argument works");
    assert_eq!(
        fs::read_to_string(fx.dir.path().join("brightness")).unwrap(),
        "60"
    );
    fx.finish();
}

#[test]
fn endless_classification_names_the_boot_services() {
    for opcode in [Opcode::StartDbus, Opcode::StartHwMonitor, Opcode::StartImu] {
        assert!(opcode.is_endless());
    }
    for opcode in [Opcode::BacklightOn, Opcode::ReadImu, Opcode::SoundPlay] {
        assert!(!opcode.is_endless());
    }
}

#[test]
fn endless_opcodes_are_not_dispatchable() {
    let mut fx = fixture();
    for opcode in [Opcode::StartDbus, Opcode::StartHwMonitor, Opcode::StartImu] {
        let err = fx
            .executor
            .dispatch(WorkItem::Local { opcode, arg: None })
            .expect_err("endless services start at boot");
        assert!(matches!(err, TaskError::Endless(rejected) if rejected == opcode));
    }

    // Same answer when the request arrives over the bus.
    let err = fx
        .executor
        .dispatch(WorkItem::Remote(Command::new(
            "ui",
            1,
            Opcode::StartImu as i32,
        )))
        .expect_err("endless services start at boot");
    assert!(matches!(err, TaskError::Endless(Opcode::StartImu)));
    fx.finish();
}

#[test]
fn vibrator_opcodes_select_their_motor() {
    let mut fx = fixture();
    fx.executor
        .dispatch(WorkItem::Local {
            opcode: Opcode::LeftVibrator,
            arg: None,
        })
        .unwrap();
    assert_eq!(
        fs::read_to_string(fx.dir.path().join("trigger")).unwrap(),
        "2 80 150"
    );
    fx.executor
        .dispatch(WorkItem::Local {
            opcode: Opcode::RightVibrator,
            arg: None,
        })
        .unwrap();
    assert_eq!(
        fs::read_to_string(fx.dir.path().join("trigger")).unwrap(),
        "3 80 150"
    );
    fx.finish();
}

#[test]
fn audio_init_then_play_uses_prompt_fallback() {
    let mut fx = fixture();
    fx.executor
        .dispatch(WorkItem::Local {
            opcode: Opcode::AudioInit,
            arg: None,
        })
        .expect("init plays the prompt");
    fx.executor
        .dispatch(WorkItem::Remote(Command::new(
            "ui",
            1,
            Opcode::SoundPlay as i32,
        )))
        .expect_err("play without a path entry fails");

    // With an explicit path entry the file plays.
    let cmd = Command::new("ui", 1, Opcode::SoundPlay as i32).with_entry(
        "path",
        crate::bus::PayloadValue::Str(
            fx.dir.path().join("prompt.wav").to_string_lossy().into_owned(),
        ),
    );
    fx.executor.dispatch(WorkItem::Remote(cmd)).unwrap();
    fx.finish();
}
