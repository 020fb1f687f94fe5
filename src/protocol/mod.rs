//! Single-byte command protocol spoken by the PIC firmware

pub mod command;
pub mod controller;

pub use command::Gate;
pub use controller::{BlinkReport, LedAck, PicController, ReadyState};
