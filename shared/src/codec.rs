//! JSON encoding of the protocol.
//!
//! The in-process host passes [`Request`] / [`WorkerMessage`] values directly; this codec is
//! for transports that only carry text (a child process over stdio, a browser worker).

use crate::error::ProtocolError;
use crate::protocol::{Request, WorkerMessage};

pub fn decode_request(text: &str) -> Result<Request, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
}

pub fn encode_request(request: &Request) -> Result<String, ProtocolError> {
    serde_json::to_string(request).map_err(|e| ProtocolError::Encode(e.to_string()))
}

pub fn decode_message(text: &str) -> Result<WorkerMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
}

pub fn encode_message(message: &WorkerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes a newline-delimited stream of requests, one per non-blank line.
///
/// Decoding stops at the first malformed line; earlier requests are still returned so a
/// caller can apply them in order before reporting the failure.
pub fn decode_request_lines(text: &str) -> (Vec<Request>, Option<ProtocolError>) {
    let mut requests = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match decode_request(line) {
            Ok(request) => requests.push(request),
            Err(err) => return (requests, Some(err)),
        }
    }
    (requests, None)
}
