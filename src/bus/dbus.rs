//! System-bus transport backed by the `dbus` crate.
//!
//! The connection is polled from the bridge's epoll loop: `ready_fd` exposes
//! the libdbus watch descriptor, `next_message` does a zero-timeout
//! read/write pass and pops one message. Method calls are held by serial
//! until the bridge answers them.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

use dbus::arg::messageitem::{MessageItem, MessageItemArray};
use dbus::blocking::Connection;
use dbus::{Message, MessageType, Signature};
use tracing::{debug, info};

use super::transport::{BusBody, BusEntry, BusTransport, BusValue, Incoming, TransportError};
use super::{
    INTERFACE_NAME, METHOD_NAME, SERVICE_NAME, UI_INTERFACE_NAME, UI_SIGNAL_NAME, UI_SERVICE_NAME,
    OBJECT_PATH,
};

const ENTRY_SIGNATURE: &str = "(siiv)";

pub struct DbusTransport {
    conn: Connection,
    /// Method calls awaiting their reply, by serial.
    pending: HashMap<u32, Message>,
}

impl DbusTransport {
    /// Connect to the system bus, claim the daemon's well-known name, and
    /// subscribe to the UI signal.
    pub fn connect() -> Result<Self, TransportError> {
        let conn = Connection::new_system().map_err(to_transport_err)?;
        conn.request_name(SERVICE_NAME, false, true, false)
            .map_err(to_transport_err)?;
        let rule = format!(
            "type='signal',sender='{UI_SERVICE_NAME}',interface='{UI_INTERFACE_NAME}',member='{UI_SIGNAL_NAME}'"
        );
        conn.add_match_no_cb(&rule).map_err(to_transport_err)?;
        info!(name = SERVICE_NAME, "connected to the system bus");
        Ok(Self {
            conn,
            pending: HashMap::new(),
        })
    }

    fn classify(&mut self, msg: Message) -> Result<Incoming, TransportError> {
        let interface = msg.interface().map(|i| i.to_string());
        let member = msg.member().map(|m| m.to_string());
        match msg.msg_type() {
            MessageType::MethodCall
                if interface.as_deref() == Some(INTERFACE_NAME)
                    && member.as_deref() == Some(METHOD_NAME) =>
            {
                let serial = msg.get_serial();
                let body = decode_body(&msg)?;
                self.pending.insert(serial, msg);
                Ok(Incoming::Call { serial, body })
            }
            MessageType::Signal
                if interface.as_deref() == Some(UI_INTERFACE_NAME)
                    && member.as_deref() == Some(UI_SIGNAL_NAME) =>
            {
                Ok(Incoming::Signal(decode_body(&msg)?))
            }
            _ => {
                debug!(?interface, ?member, "unrelated bus message");
                Ok(Incoming::Ignored)
            }
        }
    }
}

impl BusTransport for DbusTransport {
    fn ready_fd(&self) -> RawFd {
        self.conn.channel().watch().fd
    }

    fn next_message(&mut self) -> Result<Option<Incoming>, TransportError> {
        self.conn
            .channel()
            .read_write(Some(Duration::ZERO))
            .map_err(|_| TransportError::Disconnected)?;
        match self.conn.channel().pop_message() {
            Some(msg) => self.classify(msg).map(Some),
            None => Ok(None),
        }
    }

    fn send_reply(&mut self, serial: u32, text: &str) -> Result<(), TransportError> {
        let call = self.pending.remove(&serial).ok_or_else(|| {
            TransportError::Malformed(format!("no pending call with serial {serial}"))
        })?;
        let reply = call.method_return().append1(text);
        self.conn
            .channel()
            .send(reply)
            .map_err(|()| TransportError::Disconnected)?;
        Ok(())
    }

    fn send_signal(&mut self, body: &BusBody) -> Result<(), TransportError> {
        let mut msg = Message::new_signal(OBJECT_PATH, INTERFACE_NAME, UI_SIGNAL_NAME)
            .map_err(TransportError::Malformed)?;
        msg.append_items(&encode_body(body)?);
        self.conn
            .channel()
            .send(msg)
            .map_err(|()| TransportError::Disconnected)?;
        Ok(())
    }
}

fn to_transport_err(err: dbus::Error) -> TransportError {
    TransportError::Malformed(err.to_string())
}

/// Shape a command body into the `(s, i, i, a(siiv))` argument list.
pub fn encode_body(body: &BusBody) -> Result<Vec<MessageItem>, TransportError> {
    let entries: Vec<MessageItem> = body
        .entries
        .iter()
        .map(|entry| {
            let value = match &entry.value {
                Some(BusValue::Str(s)) => MessageItem::Str(s.clone()),
                Some(BusValue::I32(v)) => MessageItem::Int32(*v),
                Some(BusValue::U32(v)) => MessageItem::UInt32(*v),
                Some(BusValue::F64(v)) => MessageItem::Double(*v),
                // The sending side never produces a tag it cannot carry.
                None => MessageItem::Int32(0),
            };
            MessageItem::Struct(vec![
                MessageItem::Str(entry.key.clone()),
                MessageItem::Int32(entry.type_tag),
                MessageItem::Int32(entry.declared_len),
                MessageItem::Variant(Box::new(value)),
            ])
        })
        .collect();
    let signature = Signature::new(format!("a{ENTRY_SIGNATURE}"))
        .map_err(TransportError::Malformed)?;
    let array = MessageItemArray::new(entries, signature)
        .map_err(|err| TransportError::Malformed(format!("building entry array: {err:?}")))?;
    Ok(vec![
        MessageItem::Str(body.component_id.clone()),
        MessageItem::Int32(body.topic_id),
        MessageItem::Int32(body.opcode),
        MessageItem::Array(array),
    ])
}

/// Read the `(s, i, i, a(siiv))` arguments back out of a message.
fn decode_body(msg: &Message) -> Result<BusBody, TransportError> {
    let items = msg.get_items();
    let mut it = items.into_iter();
    let component_id = match it.next() {
        Some(MessageItem::Str(s)) => s,
        other => return Err(malformed("component id", &other)),
    };
    let topic_id = match it.next() {
        Some(MessageItem::Int32(v)) => v,
        other => return Err(malformed("topic id", &other)),
    };
    let opcode = match it.next() {
        Some(MessageItem::Int32(v)) => v,
        other => return Err(malformed("opcode", &other)),
    };
    let entries = match it.next() {
        Some(MessageItem::Array(array)) => array
            .into_vec()
            .into_iter()
            .map(decode_entry)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
        other => return Err(malformed("entry array", &other)),
    };

    Ok(BusBody {
        component_id,
        topic_id,
        opcode,
        entries,
    })
}

fn decode_entry(item: MessageItem) -> Result<BusEntry, TransportError> {
    let MessageItem::Struct(fields) = item else {
        return Err(TransportError::Malformed(
            "payload entry is not a struct".to_string(),
        ));
    };
    let mut it = fields.into_iter();
    let key = match it.next() {
        Some(MessageItem::Str(s)) => s,
        other => return Err(malformed("entry key", &other)),
    };
    let type_tag = match it.next() {
        Some(MessageItem::Int32(v)) => v,
        other => return Err(malformed("entry type tag", &other)),
    };
    let declared_len = match it.next() {
        Some(MessageItem::Int32(v)) => v,
        other => return Err(malformed("entry length", &other)),
    };
    let value = match it.next() {
        Some(MessageItem::Variant(inner)) => match *inner {
            MessageItem::Str(s) => Some(BusValue::Str(s)),
            MessageItem::Int32(v) => Some(BusValue::I32(v)),
            MessageItem::UInt32(v) => Some(BusValue::U32(v)),
            MessageItem::Double(v) => Some(BusValue::F64(v)),
            _ => None,
        },
        other => return Err(malformed("entry variant", &other)),
    };

    Ok(BusEntry {
        key,
        type_tag,
        declared_len,
        value,
    })
}

fn malformed(what: &str, got: &Option<MessageItem>) -> TransportError {
    TransportError::Malformed(match got {
        Some(item) => format!("unexpected {what}: {item:?}"),
        None => format!("message body ends before the {what}"),
    })
}
