use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::{open_serial_port, Connection};
use crate::error::{CommandError, SessionError};
use crate::protocol::commands::{self, Command};
use crate::protocol::response::AckStatus;
use crate::router::BoardMap;

/// Outcome of one command on one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardResponse {
    pub board: String,
    pub status: AckStatus,
    /// Debug messages the board sent while we waited for its ack
    pub debug_messages: Vec<String>,
}

/// Owns one connection per board and spreads display commands across them.
pub struct Session<P: Read + Write + Send = Box<dyn SerialPort>> {
    board_map: BoardMap,
    /// Indexed by board order, not port order
    connections: Vec<Connection<P>>,
    response_timeout: Duration,
}

impl Session<Box<dyn SerialPort>> {
    /// Open every configured serial port and identify the boards behind them.
    pub fn connect(config: &Config) -> Result<Self, SessionError> {
        let baud_rate = config.baud_rate;
        let read_timeout = config.read_timeout();
        Self::connect_with(config, |path| {
            open_serial_port(path, baud_rate, read_timeout)
        })
    }
}

impl<P: Read + Write + Send> Session<P> {
    /// Like [`Session::connect`], opening channels with `open`.
    pub fn connect_with<F>(config: &Config, mut open: F) -> Result<Self, SessionError>
    where
        F: FnMut(&str) -> io::Result<P>,
    {
        config.validate()?;
        let board_map = config.board_map();

        let mut found = Vec::with_capacity(config.ports.len());
        for path in &config.ports {
            let channel = open(path).map_err(|source| SessionError::Open {
                port: path.clone(),
                source,
            })?;
            found.push(Connection::identify(path, channel, config.handshake_timeout())?);
        }

        let found_names: Vec<String> = found.iter().map(|c| c.name().to_string()).collect();
        let mismatch = || SessionError::BoardNameMismatch {
            expected: board_map.boards().iter().map(|b| b.name.clone()).collect(),
            found: found_names.clone(),
        };

        // Re-order by board so connection k serves board k
        let mut connections = Vec::with_capacity(board_map.len());
        for board in board_map.boards() {
            let pos = found
                .iter()
                .position(|c| c.name() == board.name)
                .ok_or_else(mismatch)?;
            connections.push(found.swap_remove(pos));
        }
        if !found.is_empty() {
            return Err(mismatch());
        }

        for (k, conn) in connections.iter().enumerate() {
            let range = board_map.range(k);
            info!(
                "board {} on {} drives LEDs {}..{}",
                conn.name(),
                conn.port(),
                range.start,
                range.end
            );
        }

        Ok(Session {
            board_map,
            connections,
            response_timeout: config.response_timeout(),
        })
    }

    pub fn board_map(&self) -> &BoardMap {
        &self.board_map
    }

    /// Names of the connected boards, in board order.
    pub fn board_names(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.name()).collect()
    }

    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }

    /// Send `command` to every board it touches, then collect their acks.
    ///
    /// All packets are built before anything is written, so bad input
    /// never reaches the wire. Mismatched or missing acks are reported per
    /// board and do not affect the other boards, nor does a link that
    /// fails while we wait.
    pub fn dispatch(&mut self, command: &Command) -> Result<Vec<BoardResponse>, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let packets = self.build_packets(command)?;
        debug!("dispatching {} to {} board(s)", command.name(), packets.len());

        let mut send_error = None;
        for (k, packet) in &packets {
            if let Err(e) = self.connections[*k].send(packet) {
                send_error = Some(e);
                break;
            }
        }

        let deadline = Instant::now() + self.response_timeout;
        let responses = self.collect_responses(deadline);

        // Boards that were sent to have been drained before reporting the failure
        if let Some(e) = send_error {
            return Err(e);
        }
        Ok(responses)
    }

    /// Wait on every busy connection in parallel, all bounded by `deadline`.
    fn collect_responses(&mut self, deadline: Instant) -> Vec<BoardResponse> {
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .connections
                .iter_mut()
                .filter(|conn| conn.is_busy())
                .map(|conn| {
                    scope.spawn(move || {
                        let result = conn.await_response(deadline);
                        (conn.name().to_string(), result)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });

        // A dead link is reported against its board only
        let mut responses = Vec::with_capacity(results.len());
        for (board, result) in results {
            let (status, debug_messages) = match result {
                Ok(verification) => (verification.status, verification.debug_messages),
                Err(e) => (AckStatus::LinkError { detail: e.to_string() }, Vec::new()),
            };
            if !status.is_ack() {
                warn!("{}: {:?}", board, status);
            }
            responses.push(BoardResponse {
                board,
                status,
                debug_messages,
            });
        }
        responses
    }

    /// Encode `command` into (board, packet) pairs.
    fn build_packets(&self, command: &Command) -> Result<Vec<(usize, Vec<u8>)>, SessionError> {
        let map = &self.board_map;
        let broadcast = |packet: Vec<u8>| -> Vec<(usize, Vec<u8>)> {
            (0..map.len()).map(|k| (k, packet.clone())).collect()
        };

        let packets = match command {
            Command::ClearAll => broadcast(commands::clear_all()),
            Command::ShowNow => broadcast(commands::show_now()),
            Command::SetAllLedsOneColour { rgb } => {
                broadcast(commands::set_all_leds_one_colour(*rgb))
            }
            Command::SetLed { index, rgb } => {
                let route = map.locate(*index)?;
                vec![(route.board, commands::set_led(route.local, *rgb)?)]
            }
            Command::SetLeds { indices, rgbs } => {
                if indices.len() != rgbs.len() {
                    return Err(CommandError::InvalidCommandShape(format!(
                        "{} indices but {} colours",
                        indices.len(),
                        rgbs.len()
                    ))
                    .into());
                }
                let batches = map.partition(indices, rgbs)?;
                let mut packets = Vec::new();
                for (k, batch) in batches.iter().enumerate() {
                    if !batch.is_empty() {
                        packets.push((k, commands::set_leds(&batch.indices, &batch.values)?));
                    }
                }
                packets
            }
            Command::SetLedsOneColour { indices, rgb } => {
                let batches = map.partition_indices(indices)?;
                let mut packets = Vec::new();
                for (k, batch) in batches.iter().enumerate() {
                    if !batch.is_empty() {
                        packets.push((k, commands::set_leds_one_colour(batch, *rgb)?));
                    }
                }
                packets
            }
            Command::SetAllLeds { rgbs } => {
                if rgbs.len() != map.total_leds() {
                    return Err(CommandError::InvalidCommandShape(format!(
                        "{} colours for a display of {} LEDs",
                        rgbs.len(),
                        map.total_leds()
                    ))
                    .into());
                }
                let mut packets = Vec::with_capacity(map.len());
                for (k, part) in map.split(rgbs).into_iter().enumerate() {
                    packets.push((k, commands::set_all_leds(part, map.boards()[k].led_count)?));
                }
                packets
            }
        };
        Ok(packets)
    }

    /// Close every connection.
    pub fn disconnect(&mut self) {
        for conn in self.connections.drain(..) {
            drop(conn.close());
        }
    }
}

impl<P: Read + Write + Send> Drop for Session<P> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
