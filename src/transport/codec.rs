//! Stream encoding
//!
//! Each message written to an event stream is one unit: the JSON object
//! followed by a blank line.

use bytes::{BufMut, Bytes, BytesMut};

use crate::broker::message::Message;
use crate::utils::HubError;

pub const UNIT_SEPARATOR: &[u8] = b"\n\n";

/// Encode one message as a stream unit.
pub fn encode_unit(message: &Message) -> Result<Bytes, HubError> {
    let json = serde_json::to_vec(message)?;
    let mut unit = BytesMut::with_capacity(json.len() + UNIT_SEPARATOR.len());
    unit.put_slice(&json);
    unit.put_slice(UNIT_SEPARATOR);
    Ok(unit.freeze())
}
