//! Serial port configuration, discovery and the open-handle abstraction
//!
//! Handles USB serial port discovery and opening the link to the PIC board.

use crate::error::ConnectError;
use colored::Colorize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Baud rate the PIC firmware runs its UART at
pub const DEFAULT_BAUD: u32 = 9600;

/// Fixed read timeout for every receive on the link
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for serial port connection
#[derive(Debug, Clone, PartialEq)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB0, COM4)
    pub port_path: String,
    /// Baud rate (default: 9600)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::new(),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PortConfig {
    /// Create a new 8-N-1 configuration at 9600 baud
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open byte-level handle to a device
///
/// Reads block for at most the configured timeout. A read that times out
/// returns `Ok(0)`.
pub trait Link: Send {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize>;
    fn is_open(&self) -> bool;
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Source of port listings and open links
pub trait PortBackend: Send {
    fn enumerate(&self) -> serialport::Result<Vec<PortDescriptor>>;
    fn open(&self, config: &PortConfig) -> Result<Box<dyn Link>, ConnectError>;
}

/// Link backed by an OS serial port
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl Link for SerialLink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn is_open(&self) -> bool {
        // The handle is closed by dropping it, so a live handle is open.
        true
    }

    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.port.flush()
    }
}

/// The operating system's serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortBackend for SystemPorts {
    fn enumerate(&self) -> serialport::Result<Vec<PortDescriptor>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(PortDescriptor::from).collect())
    }

    fn open(&self, config: &PortConfig) -> Result<Box<dyn Link>, ConnectError> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .map_err(|e| ConnectError::new(&config.port_path, e.description))?;

        Ok(Box::new(SerialLink { port }))
    }
}

/// Information about a detected serial port
#[derive(Debug, Clone, PartialEq)]
pub struct PortDescriptor {
    /// Identifier passed to `connect` (e.g., /dev/ttyUSB0, COM4)
    pub device: String,
    /// Human-readable description
    pub description: String,
    pub manufacturer: Option<String>,
    pub port_type: PortType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<serialport::SerialPortInfo> for PortDescriptor {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let (port_type, product, manufacturer) = match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                (PortType::UsbSerial, usb.product, usb.manufacturer)
            }
            serialport::SerialPortType::PciPort => (PortType::PciSerial, None, None),
            serialport::SerialPortType::BluetoothPort => (PortType::Bluetooth, None, None),
            serialport::SerialPortType::Unknown => (PortType::Unknown, None, None),
        };

        Self {
            device: info.port_name,
            description: product.unwrap_or_else(|| port_type.to_string()),
            manufacturer,
            port_type,
        }
    }
}

impl std::fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.device, self.description)
    }
}

/// Snapshot the ports a backend reports; enumeration failures yield an empty list
pub fn list_ports_with(backend: &dyn PortBackend) -> Vec<PortDescriptor> {
    match backend.enumerate() {
        Ok(ports) => {
            log::debug!("Enumerated {} serial port(s)", ports.len());
            ports
        }
        Err(e) => {
            log::warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

/// Print formatted list of serial ports
pub fn print_ports(ports: &[PortDescriptor]) {
    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Connect the PIC board's USB-to-serial cable");
        println!("  2. Check if the device is recognized: ls -la /dev/ttyUSB* /dev/ttyACM*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        println!("  4. On Windows, check Device Manager under 'Ports (COM & LPT)'");
        return;
    }

    println!("{}", "Available Serial Ports:".green().bold());
    println!("{}", "=".repeat(60));

    for port in ports {
        println!("\n{}: {}", "Port".cyan(), port.device.white().bold());
        println!("  Description: {}", port.description);
        println!("  Type: {}", port.port_type);

        if let Some(ref mfg) = port.manufacturer {
            println!("  Manufacturer: {}", mfg);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "{}",
        "Use: pic-control led -p <PORT> to test the connection".yellow()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    impl PortBackend for FailingBackend {
        fn enumerate(&self) -> serialport::Result<Vec<PortDescriptor>> {
            Err(serialport::Error::new(
                serialport::ErrorKind::Unknown,
                "registry unavailable",
            ))
        }

        fn open(&self, config: &PortConfig) -> Result<Box<dyn Link>, ConnectError> {
            Err(ConnectError::new(&config.port_path, "unsupported"))
        }
    }

    #[test]
    fn test_default_config() {
        let config = PortConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
    }

    #[test]
    fn test_config_builder() {
        let config = PortConfig::new("COM4")
            .with_baud_rate(19200)
            .with_timeout(Duration::from_millis(250));

        assert_eq!(config.port_path, "COM4");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_enumeration_failure_is_empty() {
        assert!(list_ports_with(&FailingBackend).is_empty());
    }

    #[test]
    fn test_descriptor_from_usb_port() {
        let info = serialport::SerialPortInfo {
            port_name: "/dev/ttyUSB0".to_string(),
            port_type: serialport::SerialPortType::UsbPort(serialport::UsbPortInfo {
                vid: 0x0403,
                pid: 0x6001,
                serial_number: None,
                manufacturer: Some("FTDI".to_string()),
                product: Some("FT232R USB UART".to_string()),
            }),
        };

        let port = PortDescriptor::from(info);
        assert_eq!(port.device, "/dev/ttyUSB0");
        assert_eq!(port.description, "FT232R USB UART");
        assert_eq!(port.manufacturer.as_deref(), Some("FTDI"));
        assert_eq!(port.port_type, PortType::UsbSerial);
        assert_eq!(port.to_string(), "/dev/ttyUSB0 - FT232R USB UART");
    }

    #[test]
    fn test_descriptor_without_product_uses_type() {
        let info = serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: serialport::SerialPortType::PciPort,
        };

        let port = PortDescriptor::from(info);
        assert_eq!(port.description, "PCI Serial");
        assert_eq!(port.manufacturer, None);
    }
}
