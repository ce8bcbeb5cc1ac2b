//! MessagePack serialisation helpers.

use rmp_serde::Serializer;
use serde::Serialize;

use super::{CodecError, varint};
use crate::event::LogEvent;

/// Serialise an event into a MessagePack body with named fields.
pub fn encode_event(event: &LogEvent) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(256);
    event.serialize(&mut Serializer::new(&mut buf).with_struct_map())?;
    Ok(buf)
}

/// Serialise an event and prefix it with its varint length.
pub fn frame_event(event: &LogEvent) -> Result<Vec<u8>, CodecError> {
    let body = encode_event(event)?;
    let len = body.len() as u64;
    let mut framed = Vec::with_capacity(varint::encoded_len(len) + body.len());
    varint::encode(len, &mut framed);
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Decode a MessagePack body produced by [`encode_event`].
pub fn decode_event(body: &[u8]) -> Result<LogEvent, CodecError> {
    Ok(rmp_serde::from_slice(body)?)
}
