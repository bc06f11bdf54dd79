//! Client half of the transport
//!
//! Sends one JSON payload, half-closes the write side to mark the
//! message boundary, then reads the response until EOF.

use serde_json::Value;
use std::io::{Read, Write};

use super::{ClientStream, Endpoint};
use crate::{EngineError, Result};

/// Environment variable the client injects as the `secret` field
pub const SECRET_ENV: &str = "DEIMOS_IPC_SECRET";

/// Send one request and return the parsed response.
///
/// When `DEIMOS_IPC_SECRET` is set and the payload carries no `secret`
/// field, the secret is injected automatically.
pub fn send_request(endpoint: &Endpoint, payload: Value) -> Result<Value> {
    let mut payload = payload;
    if let Ok(secret) = std::env::var(SECRET_ENV) {
        if let Value::Object(map) = &mut payload {
            map.entry("secret".to_string())
                .or_insert_with(|| Value::String(secret));
        }
    }

    let mut stream = ClientStream::connect(endpoint)?;
    let bytes = serde_json::to_vec(&payload)?;
    stream
        .write_all(&bytes)
        .and_then(|_| stream.flush())
        .and_then(|_| stream.finish_write())
        .map_err(|e| EngineError::Transport(format!("send failed: {}", e)))?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .map_err(|e| EngineError::Transport(format!("receive failed: {}", e)))?;

    if response.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(&response)
        .map_err(|e| EngineError::Transport(format!("bad response: {}", e)))
}
