//! Conversion between [`Command`] and the transport's argument representation.

use tracing::warn;

use super::command::{Command, PayloadEntry, PayloadValue, MAX_ENTRIES};
use super::transport::{BusBody, BusEntry, BusValue};

/// Encode a command into wire arguments.
///
/// Every [`PayloadValue`] variant has a wire representation, so encoding is
/// total; an unsupported tag cannot reach this point.
pub fn encode(cmd: &Command) -> BusBody {
    BusBody {
        component_id: cmd.component_id.clone(),
        topic_id: cmd.topic_id,
        opcode: cmd.opcode,
        entries: cmd
            .entries
            .iter()
            .map(|entry| BusEntry {
                key: entry.key.clone(),
                type_tag: entry.value.type_tag(),
                declared_len: entry.value.declared_len(),
                value: Some(match &entry.value {
                    PayloadValue::Str(s) => BusValue::Str(s.clone()),
                    PayloadValue::I32(v) => BusValue::I32(*v),
                    PayloadValue::U32(v) => BusValue::U32(*v),
                    PayloadValue::F64(v) => BusValue::F64(*v),
                }),
            })
            .collect(),
    }
}

/// Decode wire arguments into a command.
///
/// At most [`MAX_ENTRIES`] entries are read; anything beyond the cap is left
/// on the floor by design. An entry whose type tag has no known
/// representation keeps its key but falls back to a zero int32 value — the
/// structural fields were consumed, so decoding of the rest continues.
pub fn decode(body: BusBody) -> Command {
    let total = body.entries.len();
    if total > MAX_ENTRIES {
        warn!(
            total,
            cap = MAX_ENTRIES,
            "payload entry array exceeds cap, truncating"
        );
    }

    let entries = body
        .entries
        .into_iter()
        .take(MAX_ENTRIES)
        .enumerate()
        .map(|(index, entry)| {
            let value = match entry.value {
                Some(BusValue::Str(s)) => PayloadValue::Str(s),
                Some(BusValue::I32(v)) => PayloadValue::I32(v),
                Some(BusValue::U32(v)) => PayloadValue::U32(v),
                Some(BusValue::F64(v)) => PayloadValue::F64(v),
                None => {
                    warn!(
                        index,
                        key = %entry.key,
                        type_tag = entry.type_tag,
                        "unknown payload entry type, using default value"
                    );
                    PayloadValue::I32(0)
                }
            };
            PayloadEntry {
                key: entry.key,
                value,
            }
        })
        .collect();

    Command {
        component_id: body.component_id,
        topic_id: body.topic_id,
        opcode: body.opcode,
        entries,
    }
}
