//! Transport seam between the bridge and whatever carries bus messages.
//!
//! The concrete bus library is an external collaborator; the bridge only
//! needs a readiness descriptor, a non-blocking message pump, and reply /
//! signal sends. Message bodies cross the seam as [`BusBody`], the
//! transport-neutral shape of the `(s, i, i, a(siiv))` wire contract.

use std::os::unix::io::RawFd;
use thiserror::Error;

/// One basic value inside a payload entry's variant slot.
#[derive(Debug, Clone, PartialEq)]
pub enum BusValue {
    Str(String),
    I32(i32),
    U32(u32),
    F64(f64),
}

/// One `(key, type_tag, declared_length, variant)` struct off the wire.
///
/// `value` is `None` when the transport saw a type tag it does not carry a
/// representation for; the codec substitutes a safe default and warns.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEntry {
    pub key: String,
    pub type_tag: i32,
    pub declared_len: i32,
    pub value: Option<BusValue>,
}

/// Transport-neutral message body: the three header scalars plus the entry
/// array, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct BusBody {
    pub component_id: String,
    pub topic_id: i32,
    pub opcode: i32,
    pub entries: Vec<BusEntry>,
}

/// A classified incoming message.
#[derive(Debug)]
pub enum Incoming {
    /// Method call matching the system-manager method; must be answered with
    /// a string reply addressed by `serial`.
    Call { serial: u32, body: BusBody },
    /// UI signal carrying a command body; queued as remote work.
    Signal(BusBody),
    /// Traffic for somebody else; dropped without effect.
    Ignored,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying connection is gone. Fatal to the bridge thread.
    #[error("bus connection lost")]
    Disconnected,
    /// One message could not be shaped into a [`BusBody`]. The message is
    /// dropped; the connection stays open.
    #[error("malformed bus message: {0}")]
    Malformed(String),
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),
}

pub trait BusTransport: Send {
    /// Descriptor that becomes readable when messages may be pending.
    fn ready_fd(&self) -> RawFd;

    /// Pull the next pending message without blocking. `Ok(None)` means the
    /// transport is drained for now.
    fn next_message(&mut self) -> Result<Option<Incoming>, TransportError>;

    /// Answer a method call with a single string.
    fn send_reply(&mut self, serial: u32, text: &str) -> Result<(), TransportError>;

    /// Emit a command body as a signal on the daemon's own interface.
    fn send_signal(&mut self, body: &BusBody) -> Result<(), TransportError>;
}
