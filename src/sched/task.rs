//! Opcode dispatch.
//!
//! Bounded opcodes run to completion on the worker thread. Endless opcodes
//! name services that own a thread for the rest of the process lifetime;
//! those are started once by the supervisor during startup and rejected
//! here if a work item asks for them again.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::audio::{AudioError, SoundService};
use crate::bus::{Command, CommandError};
use crate::hw::{Backlight, ImuHandle, Rumble};

use super::WorkItem;

const RAMP_PERIOD: Duration = Duration::from_millis(500);
const RUMBLE_STRENGTH: u32 = 80;
const RUMBLE_DURATION_MS: u32 = 150;

/// Integer opcode namespace shared with the UI process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Opcode {
    StartDbus = 0x01,
    StartHwMonitor = 0x02,
    StartImu = 0x03,
    BacklightOn = 0x10,
    BacklightOff = 0x11,
    SetBrightness = 0x12,
    GetBrightness = 0x13,
    LeftVibrator = 0x20,
    RightVibrator = 0x21,
    StopImu = 0x30,
    ReadImu = 0x31,
    AudioInit = 0x40,
    AudioRelease = 0x41,
    SoundPlay = 0x42,
}

impl Opcode {
    /// Endless opcodes take over a thread for the service lifetime and are
    /// started by the supervisor, never by a popped work item.
    pub fn is_endless(self) -> bool {
        matches!(
            self,
            Opcode::StartDbus | Opcode::StartHwMonitor | Opcode::StartImu
        )
    }
}

impl TryFrom<i32> for Opcode {
    type Error = TaskError;

    fn try_from(raw: i32) -> Result<Self, TaskError> {
        Ok(match raw {
            0x01 => Opcode::StartDbus,
            0x02 => Opcode::StartHwMonitor,
            0x03 => Opcode::StartImu,
            0x10 => Opcode::BacklightOn,
            0x11 => Opcode::BacklightOff,
            0x12 => Opcode::SetBrightness,
            0x13 => Opcode::GetBrightness,
            0x20 => Opcode::LeftVibrator,
            0x21 => Opcode::RightVibrator,
            0x30 => Opcode::StopImu,
            0x31 => Opcode::ReadImu,
            0x40 => Opcode::AudioInit,
            0x41 => Opcode::AudioRelease,
            0x42 => Opcode::SoundPlay,
            other => return Err(TaskError::UnknownOpcode(other)),
        })
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(i32),
    #[error("opcode {0:?} is an endless service, started at boot only")]
    Endless(Opcode),
    #[error(transparent)]
    Payload(#[from] CommandError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Holds every collaborator a bounded handler may touch. One executor per
/// worker thread also serializes audio access.
pub struct TaskExecutor {
    backlight: Backlight,
    rumble: Rumble,
    sound: SoundService,
    imu: ImuHandle,
}

impl TaskExecutor {
    pub fn new(
        backlight: Backlight,
        rumble: Rumble,
        sound: SoundService,
        imu: ImuHandle,
    ) -> Self {
        Self {
            backlight,
            rumble,
            sound,
            imu,
        }
    }

    pub fn dispatch(&mut self, item: WorkItem) -> Result<(), TaskError> {
        match item {
            WorkItem::Local { opcode, arg } => self.run(opcode, arg, None),
            WorkItem::Remote(cmd) => {
                let opcode = Opcode::try_from(cmd.opcode)?;
                self.run(opcode, None, Some(&cmd))
            }
        }
    }

    fn run(&mut self, opcode: Opcode, arg: Option<i32>, cmd: Option<&Command>) -> Result<(), TaskError> {
        match opcode {
            Opcode::BacklightOn => {
                self.backlight.setup()?;
                self.backlight.ramp(0, 100, RAMP_PERIOD)?;
            }
            Opcode::BacklightOff => {
                self.backlight.ramp(100, 0, RAMP_PERIOD)?;
            }
            Opcode::SetBrightness => {
                // Target percent lives at entry 1; entry 0 names the panel.
                let percent = match (arg, cmd) {
                    (Some(value), _) => value,
                    (None, Some(cmd)) => cmd.entry_i32(1)?,
                    (None, None) => return Err(CommandError::Missing(1).into()),
                };
                self.backlight.set_brightness(percent.clamp(0, 100) as u8)?;
            }
            Opcode::GetBrightness => {
                let percent = self.backlight.get_brightness()?;
                info!(percent, "brightness query");
            }
            Opcode::LeftVibrator => {
                self.rumble.trigger(2, RUMBLE_STRENGTH, RUMBLE_DURATION_MS)?;
            }
            Opcode::RightVibrator => {
                self.rumble.trigger(3, RUMBLE_STRENGTH, RUMBLE_DURATION_MS)?;
            }
            Opcode::StopImu => {
                self.imu.stop();
                info!("imu streaming stop requested");
            }
            Opcode::ReadImu => {
                let angles = self.imu.read();
                info!(
                    roll = angles.roll,
                    pitch = angles.pitch,
                    yaw = angles.yaw,
                    "imu one-shot read"
                );
            }
            Opcode::AudioInit => {
                self.sound.init()?;
            }
            Opcode::AudioRelease => {
                self.sound.release();
            }
            Opcode::SoundPlay => {
                let path: std::path::PathBuf = match cmd {
                    Some(cmd) => cmd.entry_str(0)?.into(),
                    None => self.sound.prompt_path().to_path_buf(),
                };
                self.sound.play(&path)?;
            }
            Opcode::StartDbus | Opcode::StartHwMonitor | Opcode::StartImu => {
                return Err(TaskError::Endless(opcode));
            }
        }
        Ok(())
    }
}

/// Consumer loop: pops until the queue closes and drains, isolating each
/// item's failure to a log line.
pub fn run_worker(queue: &crate::sched::WorkQueue<WorkItem>, executor: &mut TaskExecutor) {
    info!("task worker is running...");
    while let Some(item) = queue.pop_blocking() {
        if let Err(err) = executor.dispatch(item) {
            match err {
                TaskError::UnknownOpcode(_) | TaskError::Payload(_) => {
                    warn!(%err, "work item rejected")
                }
                other => error!(%other, "work item handler failed"),
            }
        }
    }
    info!("task worker exiting");
}
