//! Work scheduling: the thread-safe FIFO queue and the opcode dispatcher
//! its consumer threads run.

mod task;
mod workqueue;

#[cfg(test)]
mod tests;

pub use task::{run_worker, Opcode, TaskError, TaskExecutor};
pub use workqueue::{QueueClosed, WorkQueue};

use crate::bus::Command;

/// One unit of work. `Local` items are produced inside the process with an
/// opcode and optional inline argument; `Remote` items carry a full decoded
/// bus command.
#[derive(Debug)]
pub enum WorkItem {
    Local { opcode: Opcode, arg: Option<i32> },
    Remote(Command),
}
