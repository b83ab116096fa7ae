//! Process supervisor: startup ordering, signal handling, the main service
//! loop, and the reverse-order shutdown sequence.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use std::os::unix::io::AsRawFd;
use tracing::{error, info, warn};

use crate::audio::SoundService;
use crate::bus::{BusTransport, TransportBridge};
use crate::config::AppConfig;
use crate::event::{self, EventFd};
use crate::hw::{Als, Backlight, ImuSensor, ImuService, Rumble};
use crate::net::NetworkClient;
use crate::sched::{run_worker, Opcode, TaskExecutor, WorkItem, WorkQueue};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// Signal-handler state. The handler itself only stores a flag and writes the
// wake eventfd; everything else happens on ordinary threads.
static RUNNING: AtomicBool = AtomicBool::new(true);
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

unsafe extern "C" fn on_signal(signo: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let _ = event::signal_raw(fd, signo as u64);
    }
}

fn install_signal_handlers() -> io::Result<()> {
    // SAFETY: the handler is async-signal-safe (atomic store plus one
    // write(2)); sigaction is given a zeroed struct with only the handler
    // and an empty mask filled in.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as usize;
        libc::sigemptyset(&mut action.sa_mask);
        for signal in [libc::SIGINT, libc::SIGTERM] {
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

/// External collaborators the daemon is wired to at startup. The binaries
/// decide the concrete backends; [`run`] owns everything from here on.
pub struct Collaborators {
    pub transport: Box<dyn BusTransport>,
    pub sound: SoundService,
    pub network: Box<dyn NetworkClient>,
    pub imu_sensor: Box<dyn ImuSensor>,
    pub als: Option<Als>,
}

/// Run the daemon until SIGINT/SIGTERM or loss of the bus connection.
///
/// Only two failures are fatal before the loop even starts: allocating the
/// shutdown descriptor and spawning the bridge thread. Everything else
/// degrades with a warning.
pub fn run(config: &AppConfig, collab: Collaborators) -> Result<()> {
    let shutdown =
        Arc::new(EventFd::new().context("allocating the shutdown notification descriptor")?);
    WAKE_FD.store(shutdown.as_raw_fd(), Ordering::SeqCst);
    RUNNING.store(true, Ordering::SeqCst);
    install_signal_handlers().context("installing signal handlers")?;

    let running = Arc::new(AtomicBool::new(true));
    let queue: Arc<WorkQueue<WorkItem>> = Arc::new(WorkQueue::new());

    // Bus bridge thread. Method calls are acknowledged synchronously and
    // queued like signals, so the UI gets one reply per call.
    let bridge = {
        let responder_queue = queue.clone();
        let bridge = TransportBridge::new(
            collab.transport,
            queue.clone(),
            Box::new(move |cmd| {
                match responder_queue.push(WorkItem::Remote(cmd.clone())) {
                    Ok(()) => format!("ok:{:#x}", cmd.opcode),
                    Err(_) => "rejected:shutting-down".to_string(),
                }
            }),
            shutdown.clone(),
        );
        thread::Builder::new()
            .name("bus-bridge".into())
            .spawn(move || bridge.run())
            .context("spawning the bus bridge thread")?
    };

    let imu = ImuService::start(collab.imu_sensor, running.clone())
        .context("spawning the imu streaming thread")?;

    let monitor = {
        let running = running.clone();
        let als = collab.als;
        let readings = imu.readings();
        thread::Builder::new()
            .name("hw-monitor".into())
            .spawn(move || crate::hw::monitor_loop(running, als, readings))
            .context("spawning the hardware monitor thread")?
    };

    let worker = {
        let queue = queue.clone();
        let backlight = Backlight::new(
            &config.brightness_path,
            &config.actual_brightness_path,
            &config.power_path,
        );
        if let Err(err) = backlight.setup() {
            warn!(%err, "backlight power-on failed");
        }
        let rumble = Rumble::new(&config.rumble_path);
        let mut executor = TaskExecutor::new(backlight, rumble, collab.sound, imu.handle());
        thread::Builder::new()
            .name("task-worker".into())
            .spawn(move || run_worker(&queue, &mut executor))
            .context("spawning the task worker thread")?
    };

    // Bring the audio path up through the normal work path so init failures
    // are logged the same way as any other task.
    let _ = queue.push(WorkItem::Local {
        opcode: Opcode::AudioInit,
        arg: None,
    });

    let mut network = collab.network;
    if let Err(err) = network.device_by_interface(&config.wifi_interface) {
        warn!(interface = %config.wifi_interface, %err, "wireless interface unavailable");
    }

    info!("system manager is running...");
    while RUNNING.load(Ordering::SeqCst) {
        if bridge.is_finished() {
            warn!("bus bridge exited, shutting down");
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    // Shutdown: release audio through the queue, drain, close, stop the
    // endless threads, then join everything.
    info!("shutting down");
    let _ = queue.push(WorkItem::Local {
        opcode: Opcode::AudioRelease,
        arg: None,
    });
    let drain_start = Instant::now();
    while !queue.is_empty() && drain_start.elapsed() < DRAIN_TIMEOUT {
        thread::sleep(Duration::from_millis(10));
    }
    queue.close();
    running.store(false, Ordering::SeqCst);
    shutdown
        .signal(1)
        .context("waking the bus bridge for shutdown")?;

    if worker.join().is_err() {
        error!("task worker thread panicked");
    }
    if monitor.join().is_err() {
        error!("hardware monitor thread panicked");
    }
    imu.join();
    match bridge.join() {
        Ok(Ok(())) => info!("bus bridge exited cleanly"),
        Ok(Err(err)) => error!(%err, "bus bridge exited with an error"),
        Err(_) => error!("bus bridge thread panicked"),
    }
    WAKE_FD.store(-1, Ordering::SeqCst);

    info!("system manager stopped");
    Ok(())
}
