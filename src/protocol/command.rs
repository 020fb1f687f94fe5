//! Wire bytes exchanged with the PIC firmware
//!
//! | Direction   | Byte   | Meaning                        |
//! |-------------|--------|--------------------------------|
//! | host→device | `0x41` | select AND gate                |
//! | host→device | `0x4F` | select OR gate                 |
//! | host→device | `0xA1` | toggle LED                     |
//! | device→host | `0x4F` | LED toggle acknowledged        |
//! | device→host | `0x52` | firmware ready (after reset)   |

use std::fmt;
use std::str::FromStr;

/// Acknowledgement the firmware sends after toggling the LED
pub const RESPONSE_OK: u8 = b'O';

/// Byte the firmware may emit once after it starts up
pub const READY_SIGNAL: u8 = b'R';

/// A single-byte host→device command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectAnd,
    SelectOr,
    ToggleLed,
}

impl Command {
    pub const fn byte(self) -> u8 {
        match self {
            Command::SelectAnd => b'A',
            Command::SelectOr => b'O',
            Command::ToggleLed => 0xA1,
        }
    }
}

/// Logic gate the board can be switched to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    And,
    Or,
}

impl Gate {
    pub const fn command(self) -> Command {
        match self {
            Gate::And => Command::SelectAnd,
            Gate::Or => Command::SelectOr,
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::And => write!(f, "AND"),
            Gate::Or => write!(f, "OR"),
        }
    }
}

impl FromStr for Gate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "and" => Ok(Gate::And),
            "or" => Ok(Gate::Or),
            other => Err(format!("unknown gate '{}', expected 'and' or 'or'", other)),
        }
    }
}
