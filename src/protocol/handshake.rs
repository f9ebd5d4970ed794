//! Device identification on connect.
//!
//! After the port opens, each board announces itself with one debug-tagged
//! frame whose text reads `My name is <NAME>`.

use std::io::BufRead;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::frame::receive_frame;
use super::DEBUG_TAG;
use crate::error::{hex_tail, FrameError, HandshakeError};

pub const HELLO_PREFIX: &str = "My name is ";

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Waiting,
    Identified(String),
    /// Holds a description of the offending frame
    Failed(String),
}

impl HandshakeState {
    /// Advance the state machine by one received frame.
    ///
    /// Only `Waiting` consumes frames; terminal states are returned as-is.
    pub fn on_frame(self, payload: &[u8]) -> Self {
        match self {
            HandshakeState::Waiting => match parse_hello(payload) {
                Some(name) => HandshakeState::Identified(name),
                None => HandshakeState::Failed(describe(payload)),
            },
            terminal => terminal,
        }
    }
}

/// Extract the device name from a hello payload.
pub fn parse_hello(payload: &[u8]) -> Option<String> {
    let text = payload.strip_prefix(&DEBUG_TAG[..])?;
    let text = std::str::from_utf8(text).ok()?;
    let name = text
        .strip_prefix(HELLO_PREFIX)?
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn describe(payload: &[u8]) -> String {
    match payload.strip_prefix(&DEBUG_TAG[..]) {
        Some(text) => format!("debug message {:?}", String::from_utf8_lossy(text)),
        None => format!("{} bytes: {}", payload.len(), hex_tail(payload, 16)),
    }
}

/// Wait up to `timeout` for the hello frame on `reader` and return the device name.
///
/// Exactly one frame is consumed on success or on an unexpected message.
/// Garbled bytes are skipped while waiting.
pub fn handshake<R: BufRead>(
    reader: &mut R,
    port: &str,
    timeout: Duration,
) -> Result<String, HandshakeError> {
    let started = Instant::now();
    let mut state = HandshakeState::Waiting;
    debug!("waiting for hello on {}", port);

    while started.elapsed() < timeout {
        match receive_frame(reader) {
            Ok(payload) => state = state.on_frame(&payload),
            Err(FrameError::Idle) => continue,
            Err(e) if e.is_resyncable() => {
                warn!("garbled data from {} during handshake: {}", port, e);
                continue;
            }
            Err(source) => {
                return Err(HandshakeError::Frame {
                    port: port.to_string(),
                    source,
                })
            }
        }

        match state {
            HandshakeState::Waiting => {}
            HandshakeState::Identified(name) => {
                info!("hello from {} on {}", name, port);
                return Ok(name);
            }
            HandshakeState::Failed(detail) => {
                return Err(HandshakeError::UnexpectedMessage {
                    port: port.to_string(),
                    detail,
                })
            }
        }
    }

    Err(HandshakeError::Timeout {
        port: port.to_string(),
        waited: timeout,
    })
}
