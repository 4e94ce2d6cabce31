//! In-memory transports for testing.
//!
//! Two flavours, matching the two delivery models real sockets have:
//!
//! - [`ChannelTransport`] is evented: a test controller decides when the
//!   handshake "completes" and what frames arrive, which makes the
//!   two-phase connect contract directly observable.
//! - [`QueueTransport`] requires manual pumping: everything it wants to say
//!   sits in an internal queue until [`crate::Transport::pump`] runs,
//!   exercising the periodic-tick path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::{Transport, TransportError, TransportEvent};

// ---------------------------------------------------------------------------
// ChannelTransport

struct ChannelShared {
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    sent_tx: mpsc::UnboundedSender<String>,
    last_connect: Mutex<Option<(String, String)>>,
    open: AtomicBool,
}

impl ChannelShared {
    fn emit(&self, event: TransportEvent) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }
}

/// Evented in-memory transport, scripted from the test side.
pub struct ChannelTransport {
    shared: Arc<ChannelShared>,
}

/// Test-side handle for a [`ChannelTransport`].
pub struct ChannelController {
    shared: Arc<ChannelShared>,
    sent_rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    /// Create a connected transport/controller pair.
    pub fn pair() -> (Self, ChannelController) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ChannelShared {
            events: Mutex::new(None),
            sent_tx,
            last_connect: Mutex::new(None),
            open: AtomicBool::new(false),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            ChannelController { shared, sent_rx },
        )
    }
}

impl Transport for ChannelTransport {
    async fn connect(
        &mut self,
        address: &str,
        credential: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError> {
        *self.shared.events.lock().unwrap() = Some(events);
        *self.shared.last_connect.lock().unwrap() =
            Some((address.to_string(), credential.to_string()));
        self.shared.open.store(true, Ordering::SeqCst);
        // Opened is NOT emitted here; the controller decides when the
        // handshake finishes.
        Ok(())
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.shared.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.shared
            .sent_tx
            .send(text)
            .map_err(|_| TransportError::TaskStopped)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if !self.shared.open.swap(false, Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.shared.emit(TransportEvent::Closed);
        Ok(())
    }
}

impl ChannelController {
    /// Complete the handshake: emit `Opened`.
    pub fn open(&self) {
        self.shared.emit(TransportEvent::Opened);
    }

    /// Deliver one incoming frame.
    pub fn deliver(&self, text: impl Into<String>) {
        self.shared.emit(TransportEvent::Message(text.into()));
    }

    /// Surface a socket-level error.
    pub fn fail(&self, description: impl Into<String>) {
        self.shared.emit(TransportEvent::Error(description.into()));
    }

    /// Close the socket from the remote side.
    pub fn close(&self) {
        self.shared.open.store(false, Ordering::SeqCst);
        self.shared.emit(TransportEvent::Closed);
    }

    /// Await the next frame the transport was asked to send.
    pub async fn sent(&mut self) -> Option<String> {
        self.sent_rx.recv().await
    }

    /// The `(address, credential)` of the most recent connect.
    pub fn last_connect(&self) -> Option<(String, String)> {
        self.shared.last_connect.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// QueueTransport

struct QueueShared {
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    queue: Mutex<VecDeque<TransportEvent>>,
    sent: Mutex<Vec<String>>,
    open: AtomicBool,
}

/// Manual-pump in-memory transport. Events only leave the internal queue
/// when `pump` runs.
pub struct QueueTransport {
    shared: Arc<QueueShared>,
}

/// Test-side handle for a [`QueueTransport`].
#[derive(Clone)]
pub struct QueueController {
    shared: Arc<QueueShared>,
}

impl QueueTransport {
    /// Create a connected transport/controller pair.
    pub fn pair() -> (Self, QueueController) {
        let shared = Arc::new(QueueShared {
            events: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            QueueController { shared },
        )
    }
}

impl Transport for QueueTransport {
    fn requires_manual_pump(&self) -> bool {
        true
    }

    async fn connect(
        &mut self,
        _address: &str,
        _credential: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(), TransportError> {
        *self.shared.events.lock().unwrap() = Some(events);
        self.shared.open.store(true, Ordering::SeqCst);
        // Even Opened waits for the next tick, like a socket library whose
        // callbacks only run inside its dispatch call.
        self.shared
            .queue
            .lock()
            .unwrap()
            .push_back(TransportEvent::Opened);
        Ok(())
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.shared.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.shared.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if !self.shared.open.swap(false, Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.shared
            .queue
            .lock()
            .unwrap()
            .push_back(TransportEvent::Closed);
        Ok(())
    }

    fn pump(&mut self) {
        // Drain whatever accumulated since the last tick, delivering
        // synchronously within the tick.
        let drained: Vec<_> = self.shared.queue.lock().unwrap().drain(..).collect();
        if drained.is_empty() {
            return;
        }
        let events = self.shared.events.lock().unwrap();
        if let Some(tx) = events.as_ref() {
            for event in drained {
                let _ = tx.send(event);
            }
        }
    }
}

impl QueueController {
    /// Queue one incoming frame for the next pump.
    pub fn push_frame(&self, text: impl Into<String>) {
        self.shared
            .queue
            .lock()
            .unwrap()
            .push_back(TransportEvent::Message(text.into()));
    }

    /// Queue a socket-level error for the next pump.
    pub fn push_error(&self, description: impl Into<String>) {
        self.shared
            .queue
            .lock()
            .unwrap()
            .push_back(TransportEvent::Error(description.into()));
    }

    /// Queue a remote close for the next pump.
    pub fn push_closed(&self) {
        self.shared.open.store(false, Ordering::SeqCst);
        self.shared
            .queue
            .lock()
            .unwrap()
            .push_back(TransportEvent::Closed);
    }

    /// Frames the transport was asked to send so far.
    pub fn sent(&self) -> Vec<String> {
        self.shared.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_transport_routes_frames_both_ways() {
        let (mut transport, mut controller) = ChannelTransport::pair();
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.connect("mem://test", "cred", tx).await.unwrap();
        assert_eq!(
            controller.last_connect(),
            Some(("mem://test".to_string(), "cred".to_string()))
        );

        controller.open();
        assert_eq!(rx.recv().await, Some(TransportEvent::Opened));

        transport.send("out".to_string()).await.unwrap();
        assert_eq!(controller.sent().await, Some("out".to_string()));

        controller.deliver("in");
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Message("in".to_string()))
        );
    }

    #[tokio::test]
    async fn queue_transport_holds_events_until_pumped() {
        let (mut transport, controller) = QueueTransport::pair();
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.connect("mem://queue", "cred", tx).await.unwrap();
        controller.push_frame("queued");

        // Nothing delivered yet.
        assert!(rx.try_recv().is_err());

        transport.pump();
        assert_eq!(rx.try_recv(), Ok(TransportEvent::Opened));
        assert_eq!(
            rx.try_recv(),
            Ok(TransportEvent::Message("queued".to_string()))
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn queue_transport_disconnect_queues_closed() {
        let (mut transport, _controller) = QueueTransport::pair();
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.connect("mem://queue", "cred", tx).await.unwrap();
        transport.disconnect().await.unwrap();
        transport.pump();

        assert_eq!(rx.try_recv(), Ok(TransportEvent::Opened));
        assert_eq!(rx.try_recv(), Ok(TransportEvent::Closed));

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }
}
