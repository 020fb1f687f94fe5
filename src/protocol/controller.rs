//! Command/response logic for the PIC board
//!
//! Gate selection is fire-and-forget: the firmware defines no reply for
//! it, so a successful write is treated as accepted. The LED toggle is the
//! only request with an acknowledgement and is read back exactly once.

use super::command::{Command, Gate, READY_SIGNAL, RESPONSE_OK};
use crate::serial::Transport;
use std::fmt;
use std::time::Duration;

/// Outcome of a single LED toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedAck {
    /// Device replied with `'O'`
    Acknowledged,
    NotConnected,
    /// The command byte could not be written; no read was attempted
    SendFailed,
    /// Nothing arrived within the read timeout, or the read failed
    NoResponse,
    /// A reply arrived but was not the acknowledgement byte
    Unexpected(u8),
}

impl LedAck {
    pub fn is_acknowledged(self) -> bool {
        self == LedAck::Acknowledged
    }
}

impl fmt::Display for LedAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedAck::Acknowledged => write!(f, "LED toggled"),
            LedAck::NotConnected => write!(f, "not connected to device"),
            LedAck::SendFailed => write!(f, "failed to send toggle command"),
            LedAck::NoResponse => write!(f, "no response from device"),
            LedAck::Unexpected(b) => write!(f, "unexpected response 0x{:02X}", b),
        }
    }
}

/// What the firmware said right after the link was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    Other(u8),
    Silent,
    NotConnected,
}

/// Result of a series of LED toggles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlinkReport {
    pub attempts: Vec<LedAck>,
}

impl BlinkReport {
    pub fn acknowledged(&self) -> usize {
        self.attempts.iter().filter(|a| a.is_acknowledged()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempts.len() - self.acknowledged()
    }

    pub fn all_acknowledged(&self) -> bool {
        !self.attempts.is_empty() && self.failed() == 0
    }
}

/// Translates operator intents into wire bytes on an owned transport
pub struct PicController<T: Transport> {
    transport: T,
}

impl<T: Transport> PicController<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Switch the board to `gate`. `true` means the byte was written.
    pub fn select_gate(&mut self, gate: Gate) -> bool {
        if !self.transport.is_connected() {
            return false;
        }

        let sent = self.transport.send(&[gate.command().byte()]);
        if sent {
            log::info!("{} gate selected", gate);
        } else {
            log::warn!("Failed to send {} command", gate);
        }
        sent
    }

    /// Toggle the LED; `true` only when the device acknowledged with `'O'`
    pub fn toggle_led(&mut self) -> bool {
        self.toggle_led_detailed().is_acknowledged()
    }

    /// Toggle the LED and report why it did or did not succeed
    pub fn toggle_led_detailed(&mut self) -> LedAck {
        if !self.transport.is_connected() {
            return LedAck::NotConnected;
        }

        if !self.transport.send(&[Command::ToggleLed.byte()]) {
            return LedAck::SendFailed;
        }

        let ack = match self.transport.receive(1).as_deref() {
            Some([RESPONSE_OK]) => LedAck::Acknowledged,
            Some([other]) => LedAck::Unexpected(*other),
            _ => LedAck::NoResponse,
        };
        log::debug!("LED toggle: {}", ack);
        ack
    }

    /// Read the one byte the firmware may send after it starts.
    ///
    /// Also clears a stale startup byte so it is not mistaken for the
    /// reply to the first command.
    pub fn await_ready(&mut self) -> ReadyState {
        if !self.transport.is_connected() {
            return ReadyState::NotConnected;
        }

        match self.transport.receive(1).as_deref() {
            Some([READY_SIGNAL]) => ReadyState::Ready,
            Some([other]) => {
                log::debug!("Unexpected startup byte 0x{:02X}", other);
                ReadyState::Other(*other)
            }
            _ => ReadyState::Silent,
        }
    }

    /// Toggle the LED `count` times, calling `sleep(delay)` between attempts
    pub fn blink<F>(&mut self, count: u32, delay: Duration, mut sleep: F) -> BlinkReport
    where
        F: FnMut(Duration),
    {
        let mut report = BlinkReport::default();

        for i in 0..count {
            if i > 0 {
                sleep(delay);
            }
            let ack = self.toggle_led_detailed();
            report.attempts.push(ack);
            if ack == LedAck::NotConnected {
                break;
            }
        }

        report
    }
}
