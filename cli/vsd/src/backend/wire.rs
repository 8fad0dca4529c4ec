//! Framing and JSON-RPC 2.0 messages exchanged with the editor server.
//!
//! Every message is a UTF-8 JSON document preceded by its length as a
//! 4-byte big-endian integer.

use std::io::{self, Read, Write};

use serde_json::{json, Value};

/// Largest frame accepted from the editor.
pub const MAX_FRAME: usize = 64 << 20;

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code for malformed parameters.
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// `type` of a handler result: success.
pub const RESULT_OK: u8 = 0;
/// `type` of a handler result: failure.
pub const RESULT_ERROR: u8 = 1;

/// Read one frame. `None` when the peer closed the connection between frames.
pub fn read_frame(reader: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the {MAX_FRAME} byte limit"),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// A message received from the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A call expecting a response with the same id.
    Request { id: Value, method: String, params: Value },
    /// A call without an id; nothing is sent back.
    Notification { method: String, params: Value },
    /// The answer to one of our own requests.
    Response { id: Value },
}

impl Incoming {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let mut message: Value = serde_json::from_slice(payload)?;
        let params = message.get_mut("params").map(Value::take).unwrap_or(Value::Null);
        let id = message.get_mut("id").map(Value::take).filter(|id| !id.is_null());
        Ok(match (message.get("method").and_then(Value::as_str), id) {
            (Some(method), Some(id)) => Incoming::Request {
                id,
                method: method.to_string(),
                params,
            },
            (Some(method), None) => Incoming::Notification {
                method: method.to_string(),
                params,
            },
            (None, id) => Incoming::Response {
                id: id.unwrap_or(Value::Null),
            },
        })
    }
}

pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub fn response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

pub fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

/// Handler result in the shape the editor displays.
pub fn ok(content: impl Into<Value>) -> Value {
    json!({"type": RESULT_OK, "content": content.into()})
}

pub fn failed(content: impl Into<Value>) -> Value {
    json!({"type": RESULT_ERROR, "content": content.into()})
}
