//! Embedded system-manager daemon.
//!
//! Owns the board's hardware resources (backlight, haptic rumble,
//! ambient-light and IMU sensors), an audio output path, and a Wi-Fi network
//! client, and exposes them to a separate UI process over an inter-process
//! bus. A single epoll-driven bridge thread turns bus traffic into work
//! items; a task-handler thread consumes them and drives the hardware.

pub mod audio;
pub mod bus;
pub mod config;
pub mod event;
pub mod hw;
pub mod net;
pub mod sched;
pub mod service;
mod telemetry;

pub use telemetry::init_tracing;
