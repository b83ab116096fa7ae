//! Inter-process bus surface: command model, wire codec, transports, and the
//! epoll-driven bridge thread that feeds decoded traffic into the work queue.

mod bridge;
mod codec;
mod command;
pub mod loopback;
mod transport;

#[cfg(feature = "dbus-backend")]
pub mod dbus;


pub use bridge::{MethodResponder, TransportBridge};
pub use codec::{decode, encode};
pub use command::{Command, CommandError, PayloadEntry, PayloadValue, MAX_ENTRIES};
pub use transport::{BusBody, BusEntry, BusTransport, BusValue, Incoming, TransportError};

/// Well-known bus identity of the daemon.
pub const SERVICE_NAME: &str = "com.SystemManager.Service";
pub const OBJECT_PATH: &str = "/com/SystemManager/Obj/SysCmd";
pub const INTERFACE_NAME: &str = "com.SystemManager.Interface";
/// Method exposed to the UI process; replies with a single string.
pub const METHOD_NAME: &str = "SysMeth";

/// UI-side identity whose signals the daemon subscribes to.
pub const UI_SERVICE_NAME: &str = "com.SystemManager.UI";
pub const UI_OBJECT_PATH: &str = "/com/SystemManager/UI/Obj";
pub const UI_INTERFACE_NAME: &str = "com.SystemManager.UI.Interface";
pub const UI_SIGNAL_NAME: &str = "UISig";
