//! Structured command frames exchanged with the UI process.
//!
//! A [`Command`] is addressed by component/topic/opcode and carries an
//! ordered list of typed key/value entries. Entry order is significant:
//! opcode handlers read their parameters positionally.

use thiserror::Error;

/// Decoding cap on the entries array. Extra elements present on the wire are
/// not read; this is a defined truncation, not an error.
pub const MAX_ENTRIES: usize = 32;

/// Typed payload value. The wire type tag is derived from the active variant
/// (see [`PayloadValue::type_tag`]), so a tag/value mismatch cannot be
/// constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Str(String),
    I32(i32),
    U32(u32),
    F64(f64),
}

impl PayloadValue {
    /// Wire type tag: the D-Bus basic-type ASCII codes.
    pub fn type_tag(&self) -> i32 {
        match self {
            PayloadValue::Str(_) => b's' as i32,
            PayloadValue::I32(_) => b'i' as i32,
            PayloadValue::U32(_) => b'u' as i32,
            PayloadValue::F64(_) => b'd' as i32,
        }
    }

    /// Declared length field carried next to the value on the wire.
    pub fn declared_len(&self) -> i32 {
        match self {
            PayloadValue::Str(s) => s.len() as i32,
            PayloadValue::I32(_) | PayloadValue::U32(_) => 4,
            PayloadValue::F64(_) => 8,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            PayloadValue::Str(_) => "string",
            PayloadValue::I32(_) => "int32",
            PayloadValue::U32(_) => "uint32",
            PayloadValue::F64(_) => "double",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadEntry {
    pub key: String,
    pub value: PayloadValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub component_id: String,
    pub topic_id: i32,
    pub opcode: i32,
    pub entries: Vec<PayloadEntry>,
}

/// Positional payload extraction failure. Aborts only the command it belongs
/// to; handlers log it and the consumer loop moves on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("payload entry {0} is missing")]
    Missing(usize),
    #[error("payload entry {index} is {found}, expected {expected}")]
    Type {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
}

impl Command {
    pub fn new(component_id: impl Into<String>, topic_id: i32, opcode: i32) -> Self {
        Self {
            component_id: component_id.into(),
            topic_id,
            opcode,
            entries: Vec::new(),
        }
    }

    /// Builder-style entry append, used by senders; order is preserved.
    pub fn with_entry(mut self, key: impl Into<String>, value: PayloadValue) -> Self {
        self.entries.push(PayloadEntry {
            key: key.into(),
            value,
        });
        self
    }

    fn entry(&self, index: usize) -> Result<&PayloadEntry, CommandError> {
        self.entries.get(index).ok_or(CommandError::Missing(index))
    }

    pub fn entry_str(&self, index: usize) -> Result<&str, CommandError> {
        match &self.entry(index)?.value {
            PayloadValue::Str(s) => Ok(s),
            other => Err(CommandError::Type {
                index,
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    pub fn entry_i32(&self, index: usize) -> Result<i32, CommandError> {
        match &self.entry(index)?.value {
            PayloadValue::I32(v) => Ok(*v),
            other => Err(CommandError::Type {
                index,
                expected: "int32",
                found: other.type_name(),
            }),
        }
    }

    pub fn entry_u32(&self, index: usize) -> Result<u32, CommandError> {
        match &self.entry(index)?.value {
            PayloadValue::U32(v) => Ok(*v),
            other => Err(CommandError::Type {
                index,
                expected: "uint32",
                found: other.type_name(),
            }),
        }
    }

    pub fn entry_f64(&self, index: usize) -> Result<f64, CommandError> {
        match &self.entry(index)?.value {
            PayloadValue::F64(v) => Ok(*v),
            other => Err(CommandError::Type {
                index,
                expected: "double",
                found: other.type_name(),
            }),
        }
    }
}
