//! In-band retune commands
//!
//! Clients steer the receiver over the same connection that carries the
//! spectrum frames:
//! - `0x00` clears the pending command
//! - ASCII digits accumulate a center frequency in Hz
//! - `0xFF` commits the pending frequency (ignored when nothing is pending)

use std::io::{self, ErrorKind};

use thiserror::Error;
use tracing::debug;

use crate::transport::Transport;

pub const RESET: u8 = 0x00;
pub const COMMIT: u8 = 0xFF;

/// Pending command capacity, sized for any decimal u32 with room to spare
pub const DEFAULT_CAPACITY: usize = 32;

/// Committed request to move the center frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuneCommand {
    pub freq_hz: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command longer than {capacity} bytes, discarded")]
    Overflow { capacity: usize },

    #[error("malformed frequency {0:?}")]
    Malformed(String),
}

/// Incremental parser for the command byte stream with a bounded buffer
#[derive(Debug)]
pub struct CommandParser {
    buf: Vec<u8>,
    capacity: usize,
    /// Set after an overflow: bytes are dropped until the next reset or commit
    discarding: bool,
}

impl CommandParser {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            discarding: false,
        }
    }

    pub fn feed(&mut self, byte: u8) -> Result<Option<TuneCommand>, CommandError> {
        match byte {
            RESET => {
                self.buf.clear();
                self.discarding = false;
                Ok(None)
            }
            COMMIT if self.discarding => {
                self.discarding = false;
                Ok(None)
            }
            COMMIT if self.buf.is_empty() => Ok(None),
            COMMIT => {
                let parsed = parse_frequency(&self.buf);
                self.buf.clear();
                parsed.map(|freq_hz| Some(TuneCommand { freq_hz }))
            }
            _ if self.discarding => Ok(None),
            _ if self.buf.len() >= self.capacity => {
                self.buf.clear();
                self.discarding = true;
                Err(CommandError::Overflow {
                    capacity: self.capacity,
                })
            }
            _ => {
                self.buf.push(byte);
                Ok(None)
            }
        }
    }

    pub fn pending(&self) -> &[u8] {
        &self.buf
    }
}

fn parse_frequency(digits: &[u8]) -> Result<u32, CommandError> {
    let malformed = || CommandError::Malformed(String::from_utf8_lossy(digits).into_owned());

    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }

    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(malformed)
}

/// Everything read from the connection in one drain
#[derive(Debug, Default)]
pub struct Drained {
    pub commands: Vec<TuneCommand>,
    pub errors: Vec<CommandError>,
    pub bytes: usize,
    /// End of stream was read. A half-closed client (`shutdown(SHUT_WR)`)
    /// looks the same as a disconnected one, and both end the session.
    pub peer_closed: bool,
}

/// Per-session reader of control bytes
#[derive(Debug)]
pub struct ControlChannel {
    parser: CommandParser,
    read_buf: [u8; 64],
}

impl ControlChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            parser: CommandParser::new(capacity),
            read_buf: [0u8; 64],
        }
    }

    /// Read everything currently available without blocking, then put the
    /// connection back into blocking mode.
    pub fn drain<T: Transport>(&mut self, conn: &mut T) -> io::Result<Drained> {
        conn.set_nonblocking(true)?;
        let result = self.read_available(conn);
        let restored = conn.set_nonblocking(false);
        let drained = result?;
        restored?;
        Ok(drained)
    }

    fn read_available<T: Transport>(&mut self, conn: &mut T) -> io::Result<Drained> {
        let mut drained = Drained::default();

        loop {
            match conn.read(&mut self.read_buf) {
                Ok(0) => {
                    drained.peer_closed = true;
                    break;
                }
                Ok(n) => {
                    let bytes = &self.read_buf[..n];
                    debug!("Control bytes: {}", hex::encode(bytes));
                    drained.bytes += n;

                    for &byte in bytes {
                        match self.parser.feed(byte) {
                            Ok(Some(cmd)) => drained.commands.push(cmd),
                            Ok(None) => {}
                            Err(e) => drained.errors.push(e),
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if !self.parser.pending().is_empty() {
            debug!("{} command byte(s) pending", self.parser.pending().len());
        }
        Ok(drained)
    }
}
