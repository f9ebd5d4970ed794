//! In-memory stand-in for a controller board, used by the unit tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::protocol::frame::build_frame;
use crate::protocol::handshake::HELLO_PREFIX;
use crate::protocol::response::expected_response;
use crate::protocol::stuffing::decode;
use crate::protocol::{DEBUG_TAG, END_MARKER, START_MARKER};

#[derive(Default)]
struct BoardState {
    to_host: VecDeque<u8>,
    from_host: Vec<u8>,
    packets: Vec<Vec<u8>>,
    silent: bool,
    corrupt_acks: bool,
    chatter: Option<String>,
    unplugged: bool,
}

/// A board that greets the host and acknowledges every frame it receives.
/// Clones share state, so a test can keep a handle after the session takes one.
#[derive(Clone, Default)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    pub fn new(name: &str) -> Self {
        let mut greeting = DEBUG_TAG.to_vec();
        greeting.extend_from_slice(HELLO_PREFIX.as_bytes());
        greeting.extend_from_slice(name.as_bytes());
        Self::with_greeting(&greeting)
    }

    /// A board whose first frame is `payload` instead of a proper hello.
    pub fn with_greeting(payload: &[u8]) -> Self {
        let board = SimulatedBoard::default();
        board.push_frame(payload);
        board
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_frame(&self, payload: &[u8]) {
        self.lock().to_host.extend(build_frame(payload));
    }

    pub fn push_raw(&self, bytes: &[u8]) {
        self.lock().to_host.extend(bytes.iter().copied());
    }

    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    pub fn set_corrupt_acks(&self, corrupt: bool) {
        self.lock().corrupt_acks = corrupt;
    }

    /// Fail every later read, as a board pulled off the bus would.
    pub fn set_unplugged(&self, unplugged: bool) {
        self.lock().unplugged = unplugged;
    }

    /// Send a debug message ahead of every acknowledgment.
    pub fn set_chatter(&self, text: Option<&str>) {
        self.lock().chatter = text.map(str::to_string);
    }

    /// Packets decoded from everything the host has written.
    pub fn received_packets(&self) -> Vec<Vec<u8>> {
        self.lock().packets.clone()
    }
}

impl BoardState {
    fn process_host_bytes(&mut self) {
        while let Some(end) = self.from_host.iter().position(|&b| b == END_MARKER) {
            let chunk: Vec<u8> = self.from_host.drain(..=end).collect();
            let Some(start) = chunk.iter().rposition(|&b| b == START_MARKER) else {
                continue;
            };
            let Ok(packet) = decode(&chunk[start + 1..chunk.len() - 1]) else {
                continue;
            };
            if !self.silent {
                if let Some(text) = &self.chatter {
                    let mut message = DEBUG_TAG.to_vec();
                    message.extend_from_slice(text.as_bytes());
                    self.to_host.extend(build_frame(&message));
                }
                let mut ack = expected_response(&packet);
                if self.corrupt_acks {
                    ack[5] = ack[5].wrapping_add(1);
                }
                self.to_host.extend(build_frame(&ack));
            }
            self.packets.push(packet);
        }
    }
}

impl Read for SimulatedBoard {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "board unplugged"));
        }
        if state.to_host.is_empty() {
            drop(state);
            // Behave like a serial port read timeout
            thread::sleep(Duration::from_millis(1));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }
        let n = buf.len().min(state.to_host.len());
        for (slot, byte) in buf.iter_mut().zip(state.to_host.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedBoard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        state.from_host.extend_from_slice(buf);
        state.process_host_bytes();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
