//! Wire protocol spoken with the LED controller boards.
//!
//! A transmitted unit is `START_MARKER || stuffed(payload) || END_MARKER`.
//! Any payload byte at or above `SPECIAL_BYTE` is escaped, so the marker
//! values never appear inside a frame.

pub mod commands;
pub mod frame;
pub mod handshake;
pub mod response;
pub mod stuffing;

pub const START_MARKER: u8 = 254;
pub const END_MARKER: u8 = 255;
pub const SPECIAL_BYTE: u8 = 253;

/// Largest decoded payload accepted in either direction.
pub const MAX_PACKAGE_LEN: usize = 8192;

/// Read limit while scanning for a marker: every payload byte may be escaped.
pub const MAX_FRAME_SCAN: usize = 2 * MAX_PACKAGE_LEN + 1;

/// Leading bytes of a device debug message (and of the hello message).
pub const DEBUG_TAG: [u8; 2] = [0, 0];

pub use commands::Command;
pub use frame::{receive_frame, receive_frame_limited, send_frame};
pub use handshake::{handshake, HandshakeState};
pub use response::{await_response, expected_response, AckStatus, Response, Verification};
pub use stuffing::{decode, encode};
