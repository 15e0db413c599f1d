//! Wire framing: one UTF-8 JSON object per line, `\n` terminated.

use serde_json::Value;

use super::protocol::{ClientMessage, ServerMessage};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unknown message type {found:?}")]
    UnknownMessageType { found: String },
}

/// Encodes a message as a single JSON object followed by one newline byte.
/// Compact JSON never embeds raw newlines inside the object.
pub fn encode(message: &ClientMessage) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes one complete line from the server. The caller is responsible for
/// framing (see [`FrameBuffer`]); this only sees whole lines.
pub fn decode_server(line: &str) -> Result<ServerMessage, ProtocolError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|err| ProtocolError::MalformedMessage(err.to_string()))?;
    if !value.is_object() {
        return Err(ProtocolError::MalformedMessage(
            "not a JSON object".to_string(),
        ));
    }
    let message_type = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned);
    match message_type.as_deref() {
        Some("response") | Some("authoritative") => serde_json::from_value(value)
            .map_err(|err| ProtocolError::MalformedMessage(err.to_string())),
        Some(other) => Err(ProtocolError::UnknownMessageType {
            found: other.to_string(),
        }),
        None => Err(ProtocolError::UnknownMessageType {
            found: "(absent)".to_string(),
        }),
    }
}

/// Reassembles newline-delimited frames from partial socket reads. Bytes
/// after the last newline are retained until the rest of the line arrives.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pops the next complete line, without its terminator. Returns `None`
    /// while no full line is buffered; partial data is never consumed.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line[..pos]).into_owned())
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
