//! Connection lifecycle and raw byte I/O for the single serial link
//!
//! `SerialTransport` owns at most one open link. It is "connected" only
//! while a link exists and the link reports itself open. Every I/O failure
//! is logged and collapsed into `false` / `None`; nothing here is fatal.

use super::port::{list_ports_with, Link, PortBackend, PortConfig, PortDescriptor, SystemPorts};
use crate::error::{ConnectError, TransportError};
use std::time::Duration;

/// Byte-level surface the command protocol is built on
pub trait Transport {
    /// True iff a link exists and reports itself open
    fn is_connected(&self) -> bool;

    /// Write bytes to the link. `false` when not connected or the write fails.
    fn send(&mut self, data: &[u8]) -> bool;

    /// Read up to `max_bytes`, blocking for at most the read timeout.
    ///
    /// `None` when not connected or the read fails. A timeout is a short
    /// (possibly empty) payload, not an error.
    fn receive(&mut self, max_bytes: usize) -> Option<Vec<u8>>;
}

/// Serial transport with an explicit connect/disconnect lifecycle
pub struct SerialTransport<B: PortBackend = SystemPorts> {
    backend: B,
    link: Option<Box<dyn Link>>,
    config: Option<PortConfig>,
    timeout: Duration,
}

impl SerialTransport<SystemPorts> {
    /// Transport over the operating system's serial ports
    pub fn new() -> Self {
        Self::with_backend(SystemPorts)
    }
}

impl Default for SerialTransport<SystemPorts> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: PortBackend> SerialTransport<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            link: None,
            config: None,
            timeout: super::port::DEFAULT_TIMEOUT,
        }
    }

    /// Override the read timeout used by subsequent connects
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fresh snapshot of the ports the backend can see
    pub fn list_available_ports(&self) -> Vec<PortDescriptor> {
        list_ports_with(&self.backend)
    }

    /// Open `port` at `baud_rate`.
    ///
    /// Calling this while connected closes the current link first and
    /// re-opens; the result of the new open alone decides the state. On
    /// failure the transport is left disconnected.
    pub fn connect(&mut self, port: &str, baud_rate: u32) -> Result<(), ConnectError> {
        if self.link.is_some() {
            log::info!("Re-opening: closing current link before connecting to {}", port);
            self.disconnect();
        }

        let config = PortConfig::new(port)
            .with_baud_rate(baud_rate)
            .with_timeout(self.timeout);

        match self.backend.open(&config) {
            Ok(link) => {
                log::info!("Connected to {} at {} baud", port, baud_rate);
                self.link = Some(link);
                self.config = Some(config);
                Ok(())
            }
            Err(e) => {
                log::warn!("{}", e);
                Err(e)
            }
        }
    }

    /// Close the link if one is open. Idempotent; close errors are logged and dropped.
    pub fn disconnect(&mut self) {
        let port = self.port_name().unwrap_or_default().to_string();
        self.config = None;

        if let Some(link) = self.link.take() {
            if let Err(source) = link.close() {
                let err = TransportError::Close { port: port.clone(), source };
                log::warn!("{}", err);
            }
            log::info!("Disconnected from {}", port);
        }
    }

    /// Port identifier of the current connection
    pub fn port_name(&self) -> Option<&str> {
        self.config.as_ref().map(|c| c.port_path.as_str())
    }

    /// Baud rate of the current connection
    pub fn baud_rate(&self) -> Option<u32> {
        self.config.as_ref().map(|c| c.baud_rate)
    }

    fn port_label(&self) -> String {
        self.port_name().unwrap_or("<none>").to_string()
    }
}

impl<B: PortBackend> Transport for SerialTransport<B> {
    fn is_connected(&self) -> bool {
        self.link.as_ref().map_or(false, |link| link.is_open())
    }

    fn send(&mut self, data: &[u8]) -> bool {
        if !self.is_connected() {
            log::debug!("send skipped: not connected");
            return false;
        }

        let port = self.port_label();
        let Some(link) = self.link.as_mut() else {
            return false;
        };

        match link.write_all(data) {
            Ok(()) => {
                log::trace!("TX {} {:02x?}", port, data);
                true
            }
            Err(source) => {
                log::warn!("{}", TransportError::Write { port, source });
                false
            }
        }
    }

    fn receive(&mut self, max_bytes: usize) -> Option<Vec<u8>> {
        if !self.is_connected() {
            log::debug!("receive skipped: not connected");
            return None;
        }

        let port = self.port_label();
        let link = self.link.as_mut()?;
        let mut buffer = vec![0u8; max_bytes];

        match link.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                log::trace!("RX {} {:02x?}", port, buffer);
                Some(buffer)
            }
            Err(source) => {
                log::warn!("{}", TransportError::Read { port, source });
                None
            }
        }
    }
}

impl<B: PortBackend> Drop for SerialTransport<B> {
    fn drop(&mut self) {
        self.disconnect();
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::FakeBackend;
    use super::*;
    use std::io;

    fn transport(ports: &[&str]) -> (SerialTransport<FakeBackend>, FakeBackend) {
        let backend = FakeBackend::with_ports(ports);
        (SerialTransport::with_backend(backend.clone()), backend)
    }

    #[test]
    fn test_connect_then_disconnect() {
        let (mut t, backend) = transport(&["COM4"]);

        assert!(t.connect("COM4", 9600).is_ok());
        assert!(t.is_connected());
        assert_eq!(t.port_name(), Some("COM4"));
        assert_eq!(t.baud_rate(), Some(9600));

        let opened = backend.opened.lock().unwrap();
        assert_eq!(opened[0].timeout, Duration::from_secs(1));
        drop(opened);

        t.disconnect();
        assert!(!t.is_connected());
        assert_eq!(t.port_name(), None);
    }

    #[test]
    fn test_connect_nonexistent_port() {
        let (mut t, _) = transport(&["COM4"]);

        let err = t.connect("COM99", 9600).unwrap_err();
        assert_eq!(err.port, "COM99");
        assert!(!t.is_connected());
        assert_eq!(t.port_name(), None);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (mut t, backend) = transport(&["COM4"]);

        t.disconnect();
        t.connect("COM4", 9600).unwrap();
        t.disconnect();
        t.disconnect();

        assert!(!t.is_connected());
        assert_eq!(backend.wire.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_close_error_is_swallowed() {
        let (mut t, backend) = transport(&["COM4"]);
        t.connect("COM4", 9600).unwrap();
        backend.wire.lock().unwrap().fail_close = true;

        t.disconnect();
        assert!(!t.is_connected());
        assert_eq!(t.port_name(), None);
    }

    #[test]
    fn test_reconnect_reopens() {
        let (mut t, backend) = transport(&["COM4", "COM5"]);

        t.connect("COM4", 9600).unwrap();
        t.connect("COM5", 19200).unwrap();

        assert!(t.is_connected());
        assert_eq!(t.port_name(), Some("COM5"));
        assert_eq!(t.baud_rate(), Some(19200));
        assert_eq!(backend.wire.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_failed_reconnect_leaves_disconnected() {
        let (mut t, _) = transport(&["COM4"]);

        t.connect("COM4", 9600).unwrap();
        assert!(t.connect("COM99", 9600).is_err());
        assert!(!t.is_connected());
    }

    #[test]
    fn test_state_follows_last_call() {
        let (mut t, _) = transport(&["COM4"]);
        let steps: &[(&str, bool)] = &[
            ("connect COM4", true),
            ("disconnect", false),
            ("connect COM99", false),
            ("connect COM4", true),
            ("connect COM4", true),
            ("disconnect", false),
            ("disconnect", false),
        ];

        for (step, expected) in steps {
            match *step {
                "disconnect" => t.disconnect(),
                s => {
                    let port = s.trim_start_matches("connect ");
                    let _ = t.connect(port, 9600);
                }
            }
            assert_eq!(t.is_connected(), *expected, "after {}", step);
        }
    }

    #[test]
    fn test_handle_reporting_closed_is_not_connected() {
        let (mut t, backend) = transport(&["COM4"]);
        t.connect("COM4", 9600).unwrap();

        backend.wire.lock().unwrap().open = false;
        assert!(!t.is_connected());
        assert!(!t.send(b"A"));
    }

    #[test]
    fn test_io_while_disconnected() {
        let (mut t, backend) = transport(&["COM4"]);

        assert!(!t.send(&[0xA1]));
        assert_eq!(t.receive(1), None);

        let wire = backend.wire.lock().unwrap();
        assert_eq!(wire.write_calls, 0);
        assert_eq!(wire.read_calls, 0);
    }

    #[test]
    fn test_send_and_receive() {
        let (mut t, backend) = transport(&["COM4"]);
        t.connect("COM4", 9600).unwrap();
        backend
            .wire
            .lock()
            .unwrap()
            .replies
            .push_back(Ok(b"OK".to_vec()));

        assert!(t.send(&[0xA1]));
        assert_eq!(t.receive(1), Some(b"O".to_vec()));
        assert_eq!(backend.wire.lock().unwrap().written, vec![0xA1]);
    }

    #[test]
    fn test_receive_timeout_is_empty_payload() {
        let (mut t, _) = transport(&["COM4"]);
        t.connect("COM4", 9600).unwrap();

        assert_eq!(t.receive(4), Some(Vec::new()));
    }

    #[test]
    fn test_io_errors_keep_connection() {
        let (mut t, backend) = transport(&["COM4"]);
        t.connect("COM4", 9600).unwrap();
        {
            let mut wire = backend.wire.lock().unwrap();
            wire.fail_writes = true;
            wire.replies
                .push_back(Err(io::Error::new(io::ErrorKind::Other, "framing error")));
        }

        assert!(!t.send(b"A"));
        assert_eq!(t.receive(1), None);
        assert!(t.is_connected());
    }

    #[test]
    fn test_list_ports_is_snapshot() {
        let (t, _) = transport(&[]);
        assert!(t.list_available_ports().is_empty());

        let (t, _) = transport(&["/dev/ttyUSB0", "/dev/ttyACM0"]);
        let ports = t.list_available_ports();
        assert_eq!(ports.len(), 2);
        assert!(ports.iter().any(|p| p.device == "/dev/ttyACM0"));
    }
}
