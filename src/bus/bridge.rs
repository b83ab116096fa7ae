//! Transport bridge event loop.
//!
//! One thread blocks on an epoll over exactly two descriptors: the bus
//! transport's readiness fd and the service's shutdown eventfd. Pending bus
//! traffic is drained non-blockingly; method calls are answered in place,
//! signals become queued work, anything else is dropped. The only way out of
//! the loop is the shutdown eventfd or losing the connection.

use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::event::{Epoll, EventFd};
use crate::sched::{WorkItem, WorkQueue};

use super::codec;
use super::transport::{BusTransport, Incoming, TransportError};

/// Synchronous handler for method calls; its string return becomes the
/// reply body.
pub type MethodResponder = Box<dyn FnMut(&crate::bus::Command) -> String + Send>;

pub struct TransportBridge {
    transport: Box<dyn BusTransport>,
    queue: Arc<WorkQueue<WorkItem>>,
    responder: MethodResponder,
    shutdown: Arc<EventFd>,
}

impl TransportBridge {
    pub fn new(
        transport: Box<dyn BusTransport>,
        queue: Arc<WorkQueue<WorkItem>>,
        responder: MethodResponder,
        shutdown: Arc<EventFd>,
    ) -> Self {
        Self {
            transport,
            queue,
            responder,
            shutdown,
        }
    }

    /// Run until the shutdown eventfd fires (`Ok`) or the connection drops
    /// (`Err`). Intended to own its thread; the supervisor joins it and
    /// inspects the result.
    pub fn run(mut self) -> Result<(), TransportError> {
        let epoll = Epoll::new()?;
        let bus_fd = self.transport.ready_fd();
        let shutdown_fd = self.shutdown.as_raw_fd();
        epoll.add(bus_fd)?;
        epoll.add(shutdown_fd)?;

        info!("transport bridge is running...");
        loop {
            let ready = epoll.wait(-1)?;
            if ready.contains(&shutdown_fd) {
                let code = self.shutdown.take().unwrap_or(0);
                info!(code, "transport bridge shutting down");
                return Ok(());
            }
            if ready.contains(&bus_fd) {
                self.drain()?;
            }
        }
    }

    /// Pull every currently pending message. Malformed messages are logged
    /// and skipped; a lost connection propagates.
    fn drain(&mut self) -> Result<(), TransportError> {
        loop {
            match self.transport.next_message() {
                Ok(Some(Incoming::Call { serial, body })) => {
                    let cmd = codec::decode(body);
                    let reply = (self.responder)(&cmd);
                    self.transport.send_reply(serial, &reply)?;
                }
                Ok(Some(Incoming::Signal(body))) => {
                    let cmd = codec::decode(body);
                    if let Err(rejected) = self.queue.push(WorkItem::Remote(cmd)) {
                        warn!(item = ?rejected.0, "work queue closed, dropping signal");
                    }
                }
                Ok(Some(Incoming::Ignored)) => debug!("ignoring unrelated bus traffic"),
                Ok(None) => return Ok(()),
                Err(TransportError::Malformed(reason)) => {
                    warn!(reason, "dropping malformed bus message");
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }
}
