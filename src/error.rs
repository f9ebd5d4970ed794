//! Error types for each layer of the link.

use std::time::Duration;

use thiserror::Error;

/// Render up to the last `max` bytes of `bytes` as hex, for error context.
pub fn hex_tail(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    let hex: Vec<String> = bytes[start..].iter().map(|b| format!("{:02x}", b)).collect();
    if start > 0 {
        format!(".. {}", hex.join(" "))
    } else {
        hex.join(" ")
    }
}

/// Transport-level failures while reading or writing a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("escape byte at offset {offset} has no following byte")]
    TruncatedEscape { offset: usize },

    #[error("no start marker in {read} bytes (last bytes: {tail})")]
    NoStartMarker { read: usize, tail: String },

    #[error("no end marker after {read} bytes (last bytes: {tail})")]
    NoEndMarker { read: usize, tail: String },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Nothing arrived before the channel's read timeout.
    #[error("no data received")]
    Idle,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Framing errors a reader can recover from by scanning for the next start marker.
    pub fn is_resyncable(&self) -> bool {
        matches!(
            self,
            FrameError::TruncatedEscape { .. }
                | FrameError::NoStartMarker { .. }
                | FrameError::NoEndMarker { .. }
                | FrameError::PayloadTooLarge { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("no hello from {port} within {waited:?}")]
    Timeout { port: String, waited: Duration },

    #[error("unexpected message from {port} while waiting for hello: {detail}")]
    UnexpectedMessage { port: String, detail: String },

    #[error("transport failure on {port}: {source}")]
    Frame {
        port: String,
        #[source]
        source: FrameError,
    },
}

/// Caller-input errors raised before any bytes are produced.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid command shape: {0}")]
    InvalidCommandShape(String),

    #[error("packet of {size} bytes exceeds maximum of {max}")]
    PacketTooLarge { size: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid LED index {index} (display has {total} LEDs)")]
    InvalidLedIndex { index: u32, total: usize },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("board names do not match configuration (expected {expected:?}, found {found:?})")]
    BoardNameMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("board {board} still has a command awaiting acknowledgment")]
    Busy { board: String },

    #[error("transport failure on board {board}: {source}")]
    Frame {
        board: String,
        #[source]
        source: FrameError,
    },

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("board {board} has no command awaiting acknowledgment")]
    NothingPending { board: String },

    #[error("session is not connected")]
    NotConnected,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
