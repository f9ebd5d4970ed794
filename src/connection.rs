use std::io::{self, BufReader, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, info, trace, warn};

use crate::error::{hex_tail, HandshakeError, SessionError};
use crate::protocol::frame::send_frame;
use crate::protocol::handshake::handshake;
use crate::protocol::response::{await_response, expected_response, ExpectedResponse, Verification};

/// Open a serial port the way the boards expect: 8N1, no flow control, DTR set.
pub fn open_serial_port(
    path: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> io::Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(path, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(read_timeout)
        .open()?;

    if let Err(e) = port.write_data_terminal_ready(true) {
        warn!("failed to set DTR on {}: {}", path, e);
    }

    // Allow device to initialize
    thread::sleep(Duration::from_millis(100));

    info!("opened {} at {} baud", path, baud_rate);
    Ok(port)
}

/// One identified board link. At most one packet may await its
/// acknowledgment at a time.
pub struct Connection<P: Read + Write> {
    name: String,
    port: String,
    channel: BufReader<P>,
    pending: Option<ExpectedResponse>,
}

impl<P: Read + Write> Connection<P> {
    /// Run the handshake on a freshly opened channel.
    pub fn identify(port: &str, channel: P, timeout: Duration) -> Result<Self, HandshakeError> {
        let mut channel = BufReader::new(channel);
        let name = handshake(&mut channel, port, timeout)?;
        Ok(Connection {
            name,
            port: port.to_string(),
            channel,
            pending: None,
        })
    }

    /// Device name reported during the handshake.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Frame and write `packet`, remembering the acknowledgment it should produce.
    pub fn send(&mut self, packet: &[u8]) -> Result<(), SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::Busy {
                board: self.name.clone(),
            });
        }
        debug!(
            "sending {} ({} bytes) to {}",
            String::from_utf8_lossy(&packet[..packet.len().min(2)]),
            packet.len(),
            self.name
        );
        trace!("packet for {}: {}", self.name, hex_tail(packet, packet.len()));
        send_frame(self.channel.get_mut(), packet).map_err(|source| SessionError::Frame {
            board: self.name.clone(),
            source,
        })?;
        self.pending = Some(expected_response(packet));
        Ok(())
    }

    /// Wait for the outstanding packet's acknowledgment until `deadline`.
    ///
    /// The outstanding slot is cleared whatever the outcome, so a timed-out
    /// board can be sent the next command.
    pub fn await_response(&mut self, deadline: Instant) -> Result<Verification, SessionError> {
        let expected = self.pending.take().ok_or_else(|| SessionError::NothingPending {
            board: self.name.clone(),
        })?;
        await_response(&mut self.channel, &self.name, &expected, deadline).map_err(|source| {
            SessionError::Frame {
                board: self.name.clone(),
                source,
            }
        })
    }

    /// Close the link, returning the underlying channel.
    pub fn close(self) -> P {
        if self.pending.is_some() {
            warn!("closing {} with an unacknowledged command", self.name);
        }
        info!("closed connection to {} ({})", self.name, self.port);
        self.channel.into_inner()
    }
}
