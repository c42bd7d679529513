//! Synchronous command/acknowledgement protocol with the actuator.
//!
//! The firmware has no request ids, so the link enforces strict
//! alternation: a command is written, then the caller blocks until the
//! acknowledgement line arrives, times out, or mismatches. Nothing else is
//! sent in between.

use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::command::DeviceCommand;

/// The only acknowledgement token the firmware sends on success.
pub const ACK_TOKEN: &str = "received";

/// Default time to wait for an acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// No command sent yet, or the link was reset.
    Idle,
    /// A command was written and its acknowledgement is pending.
    AwaitingAck,
    /// The last command was acknowledged.
    Acked,
    /// No acknowledgement arrived in time.
    TimedOut,
    /// The acknowledgement did not match the expected token.
    Mismatched,
    /// Reading or writing the underlying port failed.
    Faulted,
}

impl LinkState {
    /// Whether a new command may be written in this state.
    pub fn is_ready(self) -> bool {
        matches!(self, LinkState::Idle | LinkState::Acked)
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("serial I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("no '{expected}' acknowledgement within {timeout:?}")]
    Timeout { expected: String, timeout: Duration },
    #[error("unexpected response: '{got}' (expected '{expected}')")]
    Protocol { expected: String, got: String },
    #[error("previous command is still awaiting its acknowledgement")]
    Busy,
    #[error("link is desynchronized ({0:?}); reset before sending")]
    Desynchronized(LinkState),
    #[error("no command is awaiting an acknowledgement")]
    NoPendingCommand,
    #[error("device closed the link")]
    Closed,
    #[error("invalid command payload: {0}")]
    InvalidPayload(String),
}

/// The actuator's reply to a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAck(String);

impl DeviceAck {
    #[allow(dead_code)]
    pub fn token(&self) -> &str {
        &self.0
    }
}

/// High-level physical actions, each one blocking round trip.
pub trait InputDevice {
    fn fast_click(&mut self) -> Result<(), DeviceError>;
    fn click(&mut self, x: i32, y: i32) -> Result<(), DeviceError>;
    fn scroll_down(&mut self, amount: u32) -> Result<(), DeviceError>;
    fn scroll_up(&mut self, amount: u32) -> Result<(), DeviceError>;
    /// Brings the device back to a sendable state after a failed session.
    fn reset(&mut self);
}

/// Owns the serial port exclusively and runs the handshake.
pub struct DeviceLink<T> {
    port: T,
    state: LinkState,
    ack_timeout: Duration,
    pending: Vec<u8>,
}

impl<T: Read + Write> DeviceLink<T> {
    pub fn new(port: T, ack_timeout: Duration) -> Self {
        Self {
            port,
            state: LinkState::Idle,
            ack_timeout,
            pending: Vec::new(),
        }
    }

    /// Writes one command. The link must be `Idle` or `Acked`.
    pub fn send(&mut self, cmd: &DeviceCommand) -> Result<(), DeviceError> {
        match self.state {
            LinkState::AwaitingAck => return Err(DeviceError::Busy),
            state if !state.is_ready() => return Err(DeviceError::Desynchronized(state)),
            _ => {}
        }
        cmd.validate()?;

        // Nothing read before this command can belong to its reply.
        self.pending.clear();
        let wire = cmd.encode();
        if let Err(e) = self
            .port
            .write_all(wire.as_bytes())
            .and_then(|_| self.port.flush())
        {
            self.state = LinkState::Faulted;
            return Err(e.into());
        }
        self.state = LinkState::AwaitingAck;
        Ok(())
    }

    /// Blocks until a full line arrives and compares it to `expected`.
    ///
    /// Bytes accumulate until `\n`; the line is trimmed of surrounding
    /// whitespace and must equal `expected` exactly. Anything received after
    /// the terminator is an extra reply and counts as a mismatch. A mismatch
    /// is never retried: resending after an unexpected reply risks a
    /// duplicate physical action.
    pub fn await_ack(&mut self, expected: &str, timeout: Duration) -> Result<DeviceAck, DeviceError> {
        if self.state != LinkState::AwaitingAck {
            return Err(DeviceError::NoPendingCommand);
        }

        let line = match self.read_line(timeout) {
            Ok(Some(line)) => line,
            Ok(None) => {
                self.state = LinkState::TimedOut;
                return Err(DeviceError::Timeout {
                    expected: expected.to_string(),
                    timeout,
                });
            }
            Err(e) => {
                self.state = LinkState::Faulted;
                return Err(e);
            }
        };

        if line == expected && self.pending.is_empty() {
            self.state = LinkState::Acked;
            return Ok(DeviceAck(line));
        }

        let mut got = line;
        if !self.pending.is_empty() {
            got.push_str(&format!(
                " followed by {:?}",
                String::from_utf8_lossy(&self.pending)
            ));
            self.pending.clear();
        }
        self.state = LinkState::Mismatched;
        Err(DeviceError::Protocol {
            expected: expected.to_string(),
            got,
        })
    }

    /// Sends a command and waits for the standard acknowledgement.
    pub fn execute(&mut self, cmd: &DeviceCommand) -> Result<(), DeviceError> {
        self.send(cmd)?;
        self.await_ack(ACK_TOKEN, self.ack_timeout)?;
        Ok(())
    }

    /// Returns to `Idle` and discards any partially read reply.
    pub fn reset(&mut self) {
        if self.state != LinkState::Idle {
            crate::log(&format!("Device link reset from {:?}", self.state));
        }
        self.pending.clear();
        self.state = LinkState::Idle;
    }

    /// Reads one `\n`-terminated line; `Ok(None)` on timeout.
    ///
    /// Per-read timeouts reported by the port are polled against the overall
    /// deadline. Bytes after the terminator are left in `pending`.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, DeviceError> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 128];

        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line[..pos]);
                return Ok(Some(text.trim().to_string()));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            match self.port.read(&mut buf) {
                Ok(0) => return Err(DeviceError::Closed),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// Keyboard and clipboard actions; the capture loop only clicks and scrolls.
#[allow(dead_code)]
impl<T: Read + Write> DeviceLink<T> {
    pub fn key_down(&mut self, key: &str) -> Result<(), DeviceError> {
        self.execute(&DeviceCommand::KeyDown(key.to_string()))
    }

    pub fn key_up(&mut self, key: &str) -> Result<(), DeviceError> {
        self.execute(&DeviceCommand::KeyUp(key.to_string()))
    }

    /// Types `text` by loading the clipboard and pasting it.
    pub fn paste_text(&mut self, text: &str) -> Result<(), DeviceError> {
        self.execute(&DeviceCommand::PasteText(text.to_string()))?;
        self.execute(&DeviceCommand::Paste)
    }

    pub fn function_key(&mut self, n: u8) -> Result<(), DeviceError> {
        self.execute(&DeviceCommand::FunctionKey(n))
    }
}

impl<T: Read + Write> InputDevice for DeviceLink<T> {
    fn fast_click(&mut self) -> Result<(), DeviceError> {
        self.execute(&DeviceCommand::FastClick)
    }

    fn click(&mut self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.execute(&DeviceCommand::Click { x, y })
    }

    fn scroll_down(&mut self, amount: u32) -> Result<(), DeviceError> {
        self.execute(&DeviceCommand::ScrollDown(amount))
    }

    fn scroll_up(&mut self, amount: u32) -> Result<(), DeviceError> {
        self.execute(&DeviceCommand::ScrollUp(amount))
    }

    fn reset(&mut self) {
        DeviceLink::reset(self);
    }
}
