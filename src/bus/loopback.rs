//! In-process transport pair.
//!
//! Carries [`Incoming`] traffic between two halves of the same process over
//! an eventfd readiness descriptor. Used by the test suite and by daemon
//! builds that have no platform bus backend compiled in: the daemon runs
//! stand-alone and the peer half can drive it from another thread.

use std::collections::VecDeque;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::event::EventFd;

use super::transport::{BusBody, BusTransport, Incoming, TransportError};

struct Shared {
    inbound: Mutex<VecDeque<Incoming>>,
    replies: Mutex<Vec<(u32, String)>>,
    signals: Mutex<Vec<BusBody>>,
    peer_alive: AtomicBool,
}

/// Build a connected transport/peer pair.
pub fn pair() -> std::io::Result<(LoopbackTransport, LoopbackPeer)> {
    let notify = Arc::new(EventFd::new()?);
    let shared = Arc::new(Shared {
        inbound: Mutex::new(VecDeque::new()),
        replies: Mutex::new(Vec::new()),
        signals: Mutex::new(Vec::new()),
        peer_alive: AtomicBool::new(true),
    });
    Ok((
        LoopbackTransport {
            shared: shared.clone(),
            notify: notify.clone(),
        },
        LoopbackPeer { shared, notify },
    ))
}

/// Daemon-side half, handed to the transport bridge.
pub struct LoopbackTransport {
    shared: Arc<Shared>,
    notify: Arc<EventFd>,
}

impl BusTransport for LoopbackTransport {
    fn ready_fd(&self) -> RawFd {
        self.notify.as_raw_fd()
    }

    fn next_message(&mut self) -> Result<Option<Incoming>, TransportError> {
        // Clear the readiness counter first so the level-triggered wait goes
        // back to sleep once the queue is drained.
        let _ = self.notify.take();
        let msg = self
            .shared
            .inbound
            .lock()
            .expect("loopback inbound lock poisoned")
            .pop_front();
        match msg {
            Some(msg) => Ok(Some(msg)),
            None if !self.shared.peer_alive.load(Ordering::SeqCst) => {
                Err(TransportError::Disconnected)
            }
            None => Ok(None),
        }
    }

    fn send_reply(&mut self, serial: u32, text: &str) -> Result<(), TransportError> {
        self.shared
            .replies
            .lock()
            .expect("loopback reply lock poisoned")
            .push((serial, text.to_string()));
        Ok(())
    }

    fn send_signal(&mut self, body: &BusBody) -> Result<(), TransportError> {
        self.shared
            .signals
            .lock()
            .expect("loopback signal lock poisoned")
            .push(body.clone());
        Ok(())
    }
}

/// UI-side half: injects traffic and observes replies.
pub struct LoopbackPeer {
    shared: Arc<Shared>,
    notify: Arc<EventFd>,
}

impl LoopbackPeer {
    pub fn send_signal(&self, body: BusBody) {
        self.push(Incoming::Signal(body));
    }

    pub fn send_call(&self, serial: u32, body: BusBody) {
        self.push(Incoming::Call { serial, body });
    }

    /// Inject traffic the daemon is not subscribed to.
    pub fn send_unrelated(&self) {
        self.push(Incoming::Ignored);
    }

    fn push(&self, msg: Incoming) {
        self.shared
            .inbound
            .lock()
            .expect("loopback inbound lock poisoned")
            .push_back(msg);
        let _ = self.notify.signal(1);
    }

    /// Take every method reply recorded so far.
    pub fn take_replies(&self) -> Vec<(u32, String)> {
        std::mem::take(
            &mut *self
                .shared
                .replies
                .lock()
                .expect("loopback reply lock poisoned"),
        )
    }

    /// Take every signal the daemon emitted so far.
    pub fn take_signals(&self) -> Vec<BusBody> {
        std::mem::take(
            &mut *self
                .shared
                .signals
                .lock()
                .expect("loopback signal lock poisoned"),
        )
    }
}

impl Drop for LoopbackPeer {
    fn drop(&mut self) {
        self.shared.peer_alive.store(false, Ordering::SeqCst);
        // Wake the bridge so it observes the disconnect instead of blocking.
        let _ = self.notify.signal(1);
    }
}
