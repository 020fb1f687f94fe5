//! Serial transport for the PIC board
//!
//! This module provides functionality for:
//! - Listing available serial ports (USB-to-serial adapters)
//! - Opening and closing the single link at a fixed 8-N-1 configuration
//! - Raw byte writes and timeout-bounded reads

pub mod port;
pub mod transport;

pub use port::{print_ports, PortBackend, PortDescriptor, DEFAULT_BAUD, DEFAULT_TIMEOUT};
pub use transport::{SerialTransport, Transport};
