//! Device worker: runs the blocking serial protocol off the caller's thread
//!
//! The worker thread owns the one `PicController`. Callers hold a cloneable
//! `DeviceHandle`, send a request over a channel and await the reply, so an
//! event loop never blocks for the read timeout. Requests are handled one at
//! a time in arrival order, which keeps at most one connection open no
//! matter how many handles exist.

use crate::error::ConnectError;
use crate::protocol::{BlinkReport, Gate, LedAck, PicController, ReadyState};
use crate::serial::{PortBackend, PortDescriptor, SerialTransport, Transport};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

enum Request {
    ListPorts(oneshot::Sender<Vec<PortDescriptor>>),
    Connect {
        port: String,
        baud_rate: u32,
        reply: oneshot::Sender<Result<(), ConnectError>>,
    },
    Disconnect(oneshot::Sender<()>),
    IsConnected(oneshot::Sender<bool>),
    SelectGate(Gate, oneshot::Sender<bool>),
    ToggleLed(oneshot::Sender<LedAck>),
    AwaitReady(oneshot::Sender<ReadyState>),
    Blink {
        count: u32,
        delay: Duration,
        reply: oneshot::Sender<BlinkReport>,
    },
    Shutdown,
}

/// Cloneable handle to the device worker
#[derive(Clone)]
pub struct DeviceHandle {
    tx: mpsc::UnboundedSender<Request>,
}

/// Start the worker thread that owns `transport`
pub fn spawn<B>(transport: SerialTransport<B>) -> std::io::Result<(DeviceHandle, JoinHandle<()>)>
where
    B: PortBackend + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let thread = thread::Builder::new()
        .name("pic-device".to_string())
        .spawn(move || run(PicController::new(transport), rx))?;

    Ok((DeviceHandle { tx }, thread))
}

fn run<B: PortBackend>(
    mut pic: PicController<SerialTransport<B>>,
    mut rx: mpsc::UnboundedReceiver<Request>,
) {
    log::debug!("Device worker started");

    // Replies are dropped silently if the caller stopped waiting.
    while let Some(request) = rx.blocking_recv() {
        match request {
            Request::ListPorts(reply) => {
                let _ = reply.send(pic.transport().list_available_ports());
            }
            Request::Connect {
                port,
                baud_rate,
                reply,
            } => {
                let _ = reply.send(pic.transport_mut().connect(&port, baud_rate));
            }
            Request::Disconnect(reply) => {
                pic.transport_mut().disconnect();
                let _ = reply.send(());
            }
            Request::IsConnected(reply) => {
                let _ = reply.send(pic.transport().is_connected());
            }
            Request::SelectGate(gate, reply) => {
                let _ = reply.send(pic.select_gate(gate));
            }
            Request::ToggleLed(reply) => {
                let _ = reply.send(pic.toggle_led_detailed());
            }
            Request::AwaitReady(reply) => {
                let _ = reply.send(pic.await_ready());
            }
            Request::Blink {
                count,
                delay,
                reply,
            } => {
                let _ = reply.send(pic.blink(count, delay, thread::sleep));
            }
            Request::Shutdown => break,
        }
    }

    pic.transport_mut().disconnect();
    log::debug!("Device worker stopped");
}

impl DeviceHandle {
    async fn call<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Request) -> Option<R> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(make(reply)).is_err() {
            log::warn!("Device worker is not running");
            return None;
        }
        rx.await.ok()
    }

    pub async fn list_ports(&self) -> Vec<PortDescriptor> {
        self.call(Request::ListPorts).await.unwrap_or_default()
    }

    pub async fn connect(&self, port: &str, baud_rate: u32) -> Result<(), ConnectError> {
        let port = port.to_string();
        let requested = port.clone();
        self.call(|reply| Request::Connect {
            port,
            baud_rate,
            reply,
        })
        .await
        .unwrap_or_else(|| Err(ConnectError::new(&requested, "device worker stopped")))
    }

    pub async fn disconnect(&self) {
        self.call(Request::Disconnect).await;
    }

    pub async fn is_connected(&self) -> bool {
        self.call(Request::IsConnected).await.unwrap_or(false)
    }

    pub async fn select_gate(&self, gate: Gate) -> bool {
        self.call(|reply| Request::SelectGate(gate, reply))
            .await
            .unwrap_or(false)
    }

    pub async fn toggle_led(&self) -> LedAck {
        self.call(Request::ToggleLed)
            .await
            .unwrap_or(LedAck::NotConnected)
    }

    pub async fn await_ready(&self) -> ReadyState {
        self.call(Request::AwaitReady)
            .await
            .unwrap_or(ReadyState::NotConnected)
    }

    /// Toggle the LED `count` times on the worker, `delay` apart
    pub async fn blink(&self, count: u32, delay: Duration) -> BlinkReport {
        self.call(|reply| Request::Blink {
            count,
            delay,
            reply,
        })
        .await
        .unwrap_or_default()
    }

    /// Ask the worker to close the link and exit
    pub fn shutdown(&self) {
        let _ = self.tx.send(Request::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::transport::fakes::FakeBackend;

    #[tokio::test]
    async fn test_round_trip_through_worker() {
        let backend = FakeBackend::with_ports(&["COM4"]);
        backend
            .wire
            .lock()
            .unwrap()
            .replies
            .push_back(Ok(b"O".to_vec()));

        let (device, thread) = spawn(SerialTransport::with_backend(backend.clone())).unwrap();

        assert_eq!(device.list_ports().await.len(), 1);
        assert!(!device.is_connected().await);
        assert_eq!(device.toggle_led().await, LedAck::NotConnected);

        device.connect("COM4", 9600).await.unwrap();
        assert!(device.is_connected().await);
        assert!(device.select_gate(Gate::Or).await);
        assert_eq!(device.toggle_led().await, LedAck::Acknowledged);

        let report = device.blink(2, Duration::ZERO).await;
        assert_eq!(report.attempts, vec![LedAck::NoResponse; 2]);

        device.disconnect().await;
        assert!(!device.is_connected().await);

        device.shutdown();
        thread.join().unwrap();

        assert_eq!(backend.wire.lock().unwrap().written, vec![b'O', 0xA1, 0xA1, 0xA1]);
    }

    #[tokio::test]
    async fn test_connect_failure_through_worker() {
        let (device, _thread) =
            spawn(SerialTransport::with_backend(FakeBackend::default())).unwrap();

        let err = device.connect("COM99", 9600).await.unwrap_err();
        assert_eq!(err.port, "COM99");
        assert!(!device.is_connected().await);
        device.shutdown();
    }

    #[tokio::test]
    async fn test_handles_after_shutdown() {
        let backend = FakeBackend::with_ports(&["COM4"]);
        let (device, thread) = spawn(SerialTransport::with_backend(backend.clone())).unwrap();
        device.connect("COM4", 9600).await.unwrap();

        let other = device.clone();
        device.shutdown();
        thread.join().unwrap();

        assert_eq!(backend.wire.lock().unwrap().closes, 1);
        assert!(!other.is_connected().await);
        assert!(!other.select_gate(Gate::And).await);
        assert!(other.list_ports().await.is_empty());
        assert!(other.connect("COM4", 9600).await.is_err());
    }
}
