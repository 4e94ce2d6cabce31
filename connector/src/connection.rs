//! The connection facade: one socket, many callers.
//!
//! A [`Connection`] wires a [`Transport`] to the pending-request table and
//! the topic dispatcher. Any number of tasks may send requests and manage
//! subscriptions concurrently; exactly one processor task consumes transport
//! events, so the receive path is serialized by construction.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use transport::{Transport, TransportError, TransportEvent};
use wire::{RequestId, RoutingKey};

use crate::diagnostics::{Diagnostic, DiagnosticSink, frame_preview, tracing_sink};
use crate::dispatcher::{SubscriptionHandle, TopicDispatcher};
use crate::error::{ConnectError, RequestError, SendError};
use crate::event::{ConnectionEvent, ConnectionEvents};
use crate::pending::PendingRequests;
use crate::session::CredentialSource;

/// Where the connection is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Never connected.
    Idle,
    /// Connect issued, handshake outcome not yet observed.
    Connecting,
    /// Socket usable.
    Open,
    /// Disconnect issued, close handshake not yet observed.
    Closing,
    /// Socket gone. A new connect is allowed.
    Closed,
}

/// Tunables for a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Interval of the pump tick for transports that require manual
    /// pumping. Ignored for evented transports.
    pub pump_interval: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            pump_interval: Duration::from_millis(50),
        }
    }
}

struct Inner<T> {
    transport: tokio::sync::Mutex<T>,
    pending: Arc<PendingRequests>,
    dispatcher: TopicDispatcher,
    credentials: Box<dyn CredentialSource>,
    diagnostics: DiagnosticSink,
    state: Mutex<LifecycleState>,
    next_id: AtomicI64,
    options: ConnectionOptions,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
}

/// One logical session against the gateway.
pub struct Connection<T: Transport> {
    inner: Arc<Inner<T>>,
    events: Mutex<Option<ConnectionEvents>>,
    cancel: CancellationToken,
}

/// Builder for a [`Connection`].
pub struct ConnectionBuilder<T: Transport> {
    transport: T,
    credentials: Box<dyn CredentialSource>,
    diagnostics: DiagnosticSink,
    options: ConnectionOptions,
}

impl<T: Transport> ConnectionBuilder<T> {
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the default tracing-backed diagnostic sink.
    pub fn diagnostics(mut self, sink: DiagnosticSink) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn build(self) -> Connection<T> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Connection {
            inner: Arc::new(Inner {
                transport: tokio::sync::Mutex::new(self.transport),
                pending: Arc::new(PendingRequests::new()),
                dispatcher: TopicDispatcher::new(),
                credentials: self.credentials,
                diagnostics: self.diagnostics,
                state: Mutex::new(LifecycleState::Idle),
                next_id: AtomicI64::new(0),
                options: self.options,
                event_tx,
            }),
            events: Mutex::new(Some(ConnectionEvents::new(event_rx))),
            cancel: CancellationToken::new(),
        }
    }
}

impl<T: Transport> Connection<T> {
    pub fn builder(
        transport: T,
        credentials: impl CredentialSource + 'static,
    ) -> ConnectionBuilder<T> {
        ConnectionBuilder {
            transport,
            credentials: Box::new(credentials),
            diagnostics: tracing_sink(),
            options: ConnectionOptions::default(),
        }
    }

    pub fn new(transport: T, credentials: impl CredentialSource + 'static) -> Self {
        Self::builder(transport, credentials).build()
    }

    /// Take the lifecycle event receiver. Yields `Some` exactly once.
    pub fn events(&self) -> Option<ConnectionEvents> {
        self.events.lock().unwrap().take()
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock().unwrap()
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Issue a connect to `address`.
    ///
    /// Resolves as soon as the attempt is underway; the handshake outcome
    /// arrives as [`ConnectionEvent::Opened`] (or a `TransportError`
    /// followed by `Closed`). Waiting on this future therefore does NOT
    /// mean the socket is open; watch the events for that.
    ///
    /// The credential source is consulted exactly once per call, so a
    /// rotated credential takes effect here and only here.
    pub async fn connect(&self, address: &str) -> Result<(), ConnectError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                LifecycleState::Idle | LifecycleState::Closed => {
                    *state = LifecycleState::Connecting;
                }
                _ => return Err(ConnectError::AlreadyActive),
            }
        }

        let credential = self.inner.credentials.current_credential();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manual_pump = {
            let mut transport = self.inner.transport.lock().await;
            if let Err(error) = transport.connect(address, &credential, event_tx).await {
                *self.inner.state.lock().unwrap() = LifecycleState::Idle;
                return Err(error.into());
            }
            transport.requires_manual_pump()
        };

        tracing::debug!(address, manual_pump, "connect issued");

        // One token per connect: the processor cancels it when this socket
        // ends, which also stops the pump tick.
        let session = self.cancel.child_token();
        tokio::spawn(run_processor(
            Arc::clone(&self.inner),
            event_rx,
            session.clone(),
        ));
        if manual_pump {
            tokio::spawn(run_pump(Arc::clone(&self.inner), session));
        }

        Ok(())
    }

    /// Request socket closure. Resolves once the close handshake completes.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                LifecycleState::Connecting | LifecycleState::Open => {
                    *state = LifecycleState::Closing;
                }
                _ => return Err(TransportError::NotConnected),
            }
        }

        let result = self.inner.transport.lock().await.disconnect().await;
        if result.is_err() {
            *self.inner.state.lock().unwrap() = LifecycleState::Closed;
        }
        result
    }

    /// Send a request and get a handle to its eventual response.
    ///
    /// The pending entry is registered before the frame reaches the
    /// transport, so a response can never outrun its registration. Dropping
    /// the returned handle cancels the request: the entry is removed and a
    /// late response is dropped with a diagnostic, not an error.
    pub async fn send<R, P, F>(&self, payload: &P, parse: F) -> Result<ResponseHandle<R>, SendError>
    where
        R: Send + 'static,
        P: Serialize + ?Sized,
        F: FnOnce(&str) -> eyre::Result<R> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let text = wire::encode_request(id, payload)?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(
            id,
            Box::new(move |raw: &RawValue| match parse(raw.get()) {
                Ok(value) => {
                    let _ = tx.send(Ok(value));
                    None
                }
                Err(error) => {
                    let description = format!("{error:#}");
                    let _ = tx.send(Err(RequestError::Parse(error)));
                    Some(description)
                }
            }),
        );

        let sent = self.inner.transport.lock().await.send(text).await;
        if let Err(error) = sent {
            self.inner.pending.cancel(id);
            return Err(error.into());
        }

        Ok(ResponseHandle {
            id,
            pending: Arc::clone(&self.inner.pending),
            rx: Some(rx),
            finished: false,
        })
    }

    /// [`Connection::send`] with the default JSON parser.
    pub async fn request<R, P>(&self, payload: &P) -> Result<ResponseHandle<R>, SendError>
    where
        R: DeserializeOwned + Send + 'static,
        P: Serialize + ?Sized,
    {
        self.send(payload, |raw| {
            serde_json::from_str::<R>(raw).map_err(eyre::Report::from)
        })
        .await
    }

    /// Subscribe `callback` to server-pushed events on `topic`.
    ///
    /// Subscriptions are independent of any single socket: they survive
    /// disconnects and reconnects until explicitly unsubscribed.
    pub fn subscribe<E, F>(&self, topic: &str, callback: F) -> SubscriptionHandle
    where
        E: DeserializeOwned + Send + Sync + 'static,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(topic, callback)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.inner.dispatcher.unsubscribe(handle)
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Handle to one in-flight request.
pub struct ResponseHandle<R> {
    id: RequestId,
    pending: Arc<PendingRequests>,
    rx: Option<oneshot::Receiver<Result<R, RequestError>>>,
    finished: bool,
}

impl<R> ResponseHandle<R> {
    /// The correlation id of this request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Suspend until the response resolves, one way or the other.
    ///
    /// Cancellation is cooperative: wrap this future in your own timeout
    /// and drop it to abandon the request. The connector imposes no
    /// timeout of its own.
    pub async fn recv(mut self) -> Result<R, RequestError> {
        let Some(rx) = self.rx.take() else {
            return Err(RequestError::ConnectionDropped);
        };
        let outcome = rx.await;
        self.finished = true;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(RequestError::ConnectionDropped),
        }
    }
}

impl<R> Drop for ResponseHandle<R> {
    fn drop(&mut self) {
        if !self.finished && self.pending.cancel(self.id) {
            tracing::trace!(id = self.id, "request cancelled by caller");
        }
    }
}

impl<R> std::fmt::Debug for ResponseHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<T> Inner<T> {
    /// Route one raw incoming frame. Runs only on the processor task.
    fn on_frame(&self, raw: &str) {
        let envelope = match wire::decode(raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                (self.diagnostics)(Diagnostic::Decode {
                    error,
                    frame: frame_preview(raw),
                });
                return;
            }
        };

        match envelope.context {
            // Integer contexts always belong to the correlator; a miss is a
            // replay or a cancelled request, reported and dropped.
            RoutingKey::Request(id) => match self.pending.take(id) {
                Some(entry) => {
                    if let Some(error) = entry.complete(&envelope.payload) {
                        (self.diagnostics)(Diagnostic::Parse { id, error });
                    }
                }
                None => (self.diagnostics)(Diagnostic::UnmatchedResponse { id }),
            },
            RoutingKey::Topic(topic) => {
                self.dispatcher
                    .dispatch(&topic, &envelope.payload, &self.diagnostics)
            }
        }
    }
}

/// Processor task: the single consumer of transport events for one socket.
async fn run_processor<T: Transport>(
    inner: Arc<Inner<T>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    session: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = session.cancelled() => break,
            event = events.recv() => match event {
                Some(TransportEvent::Opened) => {
                    *inner.state.lock().unwrap() = LifecycleState::Open;
                    let _ = inner.event_tx.send(ConnectionEvent::Opened);
                }
                Some(TransportEvent::Message(raw)) => inner.on_frame(&raw),
                Some(TransportEvent::Error(description)) => {
                    tracing::debug!(description = %description, "transport error");
                    let _ = inner.event_tx.send(ConnectionEvent::TransportError(description));
                }
                Some(TransportEvent::Closed) => {
                    *inner.state.lock().unwrap() = LifecycleState::Closed;
                    let _ = inner.event_tx.send(ConnectionEvent::Closed);
                    break;
                }
                None => break,
            },
        }
    }
    // Terminal for this socket; stops the pump tick as well.
    session.cancel();
}

/// Pump task: periodic tick for transports without a native event loop.
async fn run_pump<T: Transport>(inner: Arc<Inner<T>>, session: CancellationToken) {
    let mut tick = tokio::time::interval(inner.options.pump_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = session.cancelled() => break,
            _ = tick.tick() => inner.transport.lock().await.pump(),
        }
    }
    tracing::trace!("pump tick stopped");
}
