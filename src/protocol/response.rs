//! Acknowledgment checking.
//!
//! A board answers every packet with six bytes: the packet length as a
//! big-endian u16 followed by the wrapping byte sum as a big-endian u32.

use std::io::BufRead;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::frame::receive_frame;
use super::DEBUG_TAG;
use crate::error::{hex_tail, FrameError};

pub type ExpectedResponse = [u8; 6];

/// Compute the acknowledgment a board sends back for `packet`.
pub fn expected_response(packet: &[u8]) -> ExpectedResponse {
    let len = packet.len() as u16;
    let sum = packet
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(b as u32));
    let mut out = [0u8; 6];
    out[..2].copy_from_slice(&len.to_be_bytes());
    out[2..].copy_from_slice(&sum.to_be_bytes());
    out
}

/// How a single received frame relates to the outstanding packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack,
    DebugMessage(String),
    Mismatch {
        received: Vec<u8>,
        expected: ExpectedResponse,
    },
}

pub fn classify(frame: &[u8], expected: &ExpectedResponse) -> Response {
    if frame == expected {
        Response::Ack
    } else if let Some(text) = frame.strip_prefix(&DEBUG_TAG[..]) {
        Response::DebugMessage(String::from_utf8_lossy(text).into_owned())
    } else {
        Response::Mismatch {
            received: frame.to_vec(),
            expected: *expected,
        }
    }
}

/// Final outcome of waiting for one acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckStatus {
    Ack,
    Mismatch {
        received: Vec<u8>,
        expected: ExpectedResponse,
    },
    Timeout,
    /// Reading from the board failed outright
    LinkError {
        detail: String,
    },
}

impl AckStatus {
    pub fn is_ack(&self) -> bool {
        matches!(self, AckStatus::Ack)
    }
}

/// Outcome plus any debug messages the board sent while we waited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub status: AckStatus,
    pub debug_messages: Vec<String>,
}

/// Read frames from `reader` until the acknowledgment for `expected` is
/// classified or `deadline` passes. Debug messages are collected and do
/// not end the wait. Only hard I/O failures are returned as errors.
pub fn await_response<R: BufRead>(
    reader: &mut R,
    board: &str,
    expected: &ExpectedResponse,
    deadline: Instant,
) -> Result<Verification, FrameError> {
    let mut debug_messages = Vec::new();

    while Instant::now() < deadline {
        let frame = match receive_frame(reader) {
            Ok(frame) => frame,
            Err(FrameError::Idle) => continue,
            Err(e) if e.is_resyncable() => {
                warn!("garbled data from {}: {}", board, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        match classify(&frame, expected) {
            Response::Ack => {
                debug!("ack from {}", board);
                return Ok(Verification {
                    status: AckStatus::Ack,
                    debug_messages,
                });
            }
            Response::DebugMessage(text) => {
                info!("debug message from {}: {}", board, text);
                debug_messages.push(text);
            }
            Response::Mismatch { received, expected } => {
                warn!(
                    "bad ack from {}: got [{}], expected [{}]",
                    board,
                    hex_tail(&received, 16),
                    hex_tail(&expected, 6)
                );
                return Ok(Verification {
                    status: AckStatus::Mismatch { received, expected },
                    debug_messages,
                });
            }
        }
    }

    warn!("no ack from {} before deadline", board);
    Ok(Verification {
        status: AckStatus::Timeout,
        debug_messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::send_frame;
    use std::time::Duration;

    #[test]
    fn test_expected_response_lc() {
        assert_eq!(expected_response(b"LC"), [0, 2, 0, 0, 0, 143]);
    }

    #[test]
    fn test_expected_response_large() {
        let packet = vec![255u8; 1000];
        // 255_000 = 0x0003_E418
        assert_eq!(expected_response(&packet), [0x03, 0xe8, 0x00, 0x03, 0xe4, 0x18]);
    }

    #[test]
    fn test_classify() {
        let expected = expected_response(b"SN");
        assert_eq!(classify(&expected, &expected), Response::Ack);
        assert_eq!(
            classify(b"\x00\x00strip 3 ok", &expected),
            Response::DebugMessage("strip 3 ok".to_string())
        );
        assert!(matches!(
            classify(&[0, 2, 0, 0, 0, 1], &expected),
            Response::Mismatch { .. }
        ));
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_millis(100)
    }

    #[test]
    fn test_await_skips_debug_messages() {
        let packet = b"LC";
        let mut bytes = Vec::new();
        send_frame(&mut bytes, b"\x00\x00cleared").unwrap();
        send_frame(&mut bytes, &expected_response(packet)).unwrap();
        let mut reader = &bytes[..];
        let result = await_response(&mut reader, "TEENSY1", &expected_response(packet), deadline()).unwrap();
        assert_eq!(result.status, AckStatus::Ack);
        assert_eq!(result.debug_messages, vec!["cleared".to_string()]);
    }

    #[test]
    fn test_await_mismatch() {
        let mut bytes = Vec::new();
        send_frame(&mut bytes, &[0, 2, 0, 0, 0, 144]).unwrap();
        let mut reader = &bytes[..];
        let result = await_response(&mut reader, "TEENSY1", &expected_response(b"LC"), deadline()).unwrap();
        assert_eq!(
            result.status,
            AckStatus::Mismatch {
                received: vec![0, 2, 0, 0, 0, 144],
                expected: [0, 2, 0, 0, 0, 143],
            }
        );
    }

    #[test]
    fn test_await_timeout() {
        let mut reader: &[u8] = &[];
        let result = await_response(&mut reader, "TEENSY2", &expected_response(b"LC"), deadline()).unwrap();
        assert_eq!(result.status, AckStatus::Timeout);
    }
}
