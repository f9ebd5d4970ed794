//! Host side of the serial link to a multi-board LED display.
//!
//! Each board speaks a framed, byte-stuffed protocol over its own serial
//! port, announces its name on connect and acknowledges every packet with
//! a length and checksum. [`Session`] ties the boards together behind one
//! global LED index space.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod router;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{CommandError, ConfigError, FrameError, HandshakeError, RouteError, SessionError};
pub use protocol::commands::{Command, Rgb};
pub use protocol::response::AckStatus;
pub use router::{BoardMap, BoardSpec};
pub use session::{BoardResponse, Session};
