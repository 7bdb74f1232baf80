//! MSMP client implementation

use crate::config::{MsmpConfig, PendingPolicy};
use crate::container::{CorrelationError, MapMessageContainer, MessageContainer};
use crate::error::{MsmpError, Result};
use crate::handler::{
    logging_handler, logging_notification_handler, DefaultHandler, NotificationHandler,
};
use crate::messages::{
    Frame, Request, RequestId, Response, ServerNotification, NOTIFICATION_ID,
};
use crate::transport::{Connector, Transport, WebSocketConnector};

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live transport
    Disconnected,
    /// Connected and ready
    Connected,
}

/// Mutable connection state, guarded by one lock. Never held across an await.
struct Session {
    state: ConnectionState,
    auto_reconnect: bool,
    transport: Option<Arc<dyn Transport>>,

    // Bumped on every successful connect; lets a read loop tell whether it is current
    generation: u64,

    // One token per logical session, shared by both loops and every parked call
    shutdown: CancellationToken,
    session_id: u64,

    // Session whose reconnect loop is running, if any
    reconnect_loop: Option<u64>,
}

/// What a caller needs from the session to put one frame on the wire
struct Link {
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
    generation: u64,
}

/// Internal client state
struct ClientInner {
    config: MsmpConfig,
    connector: Arc<dyn Connector>,
    container: Arc<dyn MessageContainer>,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    next_id: AtomicU64,
    default_handler: DefaultHandler,
    notification_handler: Mutex<NotificationHandler>,
}

/// Builder for an [`MsmpClient`] with non-default collaborators
pub struct MsmpClientBuilder {
    config: MsmpConfig,
    connector: Option<Arc<dyn Connector>>,
    container: Option<Arc<dyn MessageContainer>>,
    default_handler: Option<DefaultHandler>,
    notification_handler: Option<NotificationHandler>,
}

impl MsmpClientBuilder {
    /// Dial through a custom connector instead of WebSocket
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom correlation container
    pub fn container(mut self, container: Arc<dyn MessageContainer>) -> Self {
        self.container = Some(container);
        self
    }

    /// Handler for responses nobody is waiting on. Also installed in the
    /// default container when no custom container is given.
    pub fn default_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Option<&Request>, &Response) + Send + Sync + 'static,
    {
        self.default_handler = Some(Arc::new(handler));
        self
    }

    /// Handler for server-pushed notifications
    ///
    /// Called in arrival order on a task separate from the read loop, so a
    /// slow handler delays later notifications but not responses.
    pub fn notification_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ServerNotification) + Send + Sync + 'static,
    {
        self.notification_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> MsmpClient {
        let default_handler = self.default_handler.unwrap_or_else(logging_handler);
        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(WebSocketConnector::new(
                self.config.url.clone(),
                self.config.secret.clone(),
            ))
        });
        let container = self.container.unwrap_or_else(|| {
            Arc::new(MapMessageContainer::with_default_handler(
                default_handler.clone(),
            ))
        });
        let notification_handler = self
            .notification_handler
            .unwrap_or_else(logging_notification_handler);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let session = Session {
            state: ConnectionState::Disconnected,
            auto_reconnect: self.config.auto_reconnect,
            transport: None,
            generation: 0,
            shutdown: CancellationToken::new(),
            session_id: 0,
            reconnect_loop: None,
        };

        let inner = Arc::new(ClientInner {
            config: self.config,
            connector,
            container,
            session: Mutex::new(session),
            state_tx,
            state_rx,
            next_id: AtomicU64::new(0),
            default_handler,
            notification_handler: Mutex::new(notification_handler),
        });

        MsmpClient { inner }
    }
}

/// MSMP JSON-RPC client
///
/// Many tasks may issue calls concurrently over the one connection; responses
/// are matched to calls by id. This struct is cheaply cloneable as it uses an
/// internal Arc.
#[derive(Clone)]
pub struct MsmpClient {
    inner: Arc<ClientInner>,
}

impl MsmpClient {
    /// Create a new client that dials `config.url` over WebSocket
    pub fn new(config: MsmpConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: MsmpConfig) -> MsmpClientBuilder {
        MsmpClientBuilder {
            config,
            connector: None,
            container: None,
            default_handler: None,
            notification_handler: None,
        }
    }

    /// Get the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Get a receiver for connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().state == ConnectionState::Connected
    }

    /// Enable or disable automatic reconnection. A reconnect loop is started
    /// by the next successful `connect` if none is running.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.session.lock().auto_reconnect = enabled;
    }

    /// Replace the handler for server-pushed notifications
    pub fn on_notification<F>(&self, handler: F)
    where
        F: Fn(&ServerNotification) + Send + Sync + 'static,
    {
        *self.inner.notification_handler.lock() = Arc::new(handler);
    }

    /// Number of calls still waiting for a response
    pub fn pending_count(&self) -> usize {
        self.inner.container.waiting_count()
    }

    /// Snapshot of calls still waiting for a response
    pub fn pending_requests(&self) -> Vec<Request> {
        self.inner.container.list_waiting()
    }

    /// Connect to the server
    pub async fn connect(&self) -> Result<()> {
        self.inner.establish(None).await
    }

    /// Disconnect from the server
    ///
    /// Ends the session: both background loops stop and every parked call
    /// returns [`MsmpError::Disconnected`]. Returns `NotConnected` if no
    /// connection was live, after still stopping any pending reconnect.
    pub async fn disconnect(&self) -> Result<()> {
        let (was_connected, transport) = {
            let mut session = self.inner.session.lock();
            session.shutdown.cancel();
            let was_connected = session.state == ConnectionState::Connected;
            session.state = ConnectionState::Disconnected;
            self.inner.set_state(ConnectionState::Disconnected);
            (was_connected, session.transport.take())
        };

        if !was_connected {
            return Err(MsmpError::NotConnected);
        }

        info!(url = %self.inner.config.url, "Disconnected");
        match transport {
            Some(transport) => self.inner.close_transport(transport).await,
            None => Ok(()),
        }
    }

    /// Send a request and wait for its response
    ///
    /// Resolves with whichever comes first: the response, the call timeout
    /// ([`MsmpError::Timeout`]), or the end of the session
    /// ([`MsmpError::Disconnected`]). A server-side failure is returned as
    /// `Ok(Response::Failure { .. })`. The timeout covers writing the
    /// frame as well as waiting for the reply.
    pub async fn call(&self, method: &str, params: Value) -> Result<Response> {
        let link = self.inner.live_link()?;
        let deadline = Instant::now() + self.inner.config.call_timeout;
        let id = self.inner.allocate_id();
        let request = Request::new(id, method, params);
        let frame = request.to_frame()?;

        let mut rx = self.inner.container.register(request)?;
        self.inner.write_registered(&link, id, frame, deadline).await?;
        debug!(id, method, "Request sent");

        let outcome = tokio::select! {
            biased;
            response = &mut rx => {
                return response.map_err(|_| MsmpError::Disconnected);
            }
            _ = sleep_until(deadline) => MsmpError::Timeout,
            _ = link.shutdown.cancelled() => MsmpError::Disconnected,
        };

        // Lost the race against resolve: the entry is gone and its sender
        // either delivers or drops without blocking
        if let Err(CorrelationError::NotFound(_)) = self.inner.container.cancel(id) {
            if let Ok(response) = rx.await {
                return Ok(response);
            }
        }

        debug!(id, method, error = %outcome, "Request abandoned");
        Err(outcome)
    }

    /// Send a request and deserialize its result
    ///
    /// A server-side failure becomes [`MsmpError::Server`].
    pub async fn request<P, T>(&self, method: &str, params: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.call(method, params).await?.into_result()?;
        Ok(serde_json::from_value(result)?)
    }

    /// Send a request whose response is delivered to `callback`
    ///
    /// Returns the allocated id once the frame is written. The callback runs
    /// on a spawned task; it never runs if the entry is cancelled. Only the
    /// write is bounded by the call timeout; waiting for the reply is not.
    pub async fn call_with_callback<F>(
        &self,
        method: &str,
        params: Value,
        callback: F,
    ) -> Result<RequestId>
    where
        F: FnOnce(Request, Response) + Send + 'static,
    {
        let link = self.inner.live_link()?;
        let deadline = Instant::now() + self.inner.config.call_timeout;
        let id = self.inner.allocate_id();
        let request = Request::new(id, method, params);
        let frame = request.to_frame()?;

        self.inner
            .container
            .register_with_callback(request, Box::new(callback))?;
        self.inner.write_registered(&link, id, frame, deadline).await?;
        debug!(id, method, "Request sent with callback");
        Ok(id)
    }

    /// Send a notification. Never registered, never waits for a reply.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let link = self.inner.live_link()?;
        let deadline = Instant::now() + self.inner.config.call_timeout;
        let frame = Request::notification(method, params).to_frame()?;

        self.inner.write_frame(&link, frame, deadline).await?;
        debug!(method, "Notification sent");
        Ok(())
    }

    /// Cancel a pending call. A callback registered for it will not fire.
    pub fn cancel(&self, id: RequestId) -> Result<Request> {
        Ok(self.inner.container.cancel(id)?)
    }
}

impl ClientInner {
    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }

    fn allocate_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn live_link(&self) -> Result<Link> {
        let session = self.session.lock();
        match (&session.state, &session.transport) {
            (ConnectionState::Connected, Some(transport)) => Ok(Link {
                transport: transport.clone(),
                shutdown: session.shutdown.clone(),
                generation: session.generation,
            }),
            _ => Err(MsmpError::NotConnected),
        }
    }

    /// Write one frame, giving up at `deadline` or when the session ends.
    /// A failed write means the connection is broken and is handled as a drop.
    async fn write_frame(&self, link: &Link, frame: String, deadline: Instant) -> Result<()> {
        let written = tokio::select! {
            biased;
            _ = link.shutdown.cancelled() => return Err(MsmpError::Disconnected),
            _ = sleep_until(deadline) => return Err(MsmpError::Timeout),
            written = link.transport.write(frame) => written,
        };

        if let Err(e) = written {
            self.handle_drop(link.generation).await;
            return Err(MsmpError::Send(e.to_string()));
        }
        Ok(())
    }

    /// Write a frame whose id is already registered, rolling the entry back on failure
    async fn write_registered(
        &self,
        link: &Link,
        id: RequestId,
        frame: String,
        deadline: Instant,
    ) -> Result<()> {
        if let Err(e) = self.write_frame(link, frame, deadline).await {
            let _ = self.container.cancel(id);
            warn!(id, error = %e, "Failed to send request");
            return Err(e);
        }
        Ok(())
    }

    /// Close a transport without letting a wedged peer hold the caller
    async fn close_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        timeout(self.config.call_timeout, transport.close())
            .await
            .unwrap_or_else(|_| Err(MsmpError::Transport("close timed out".into())))
    }

    /// Dial and install a new transport.
    ///
    /// `reconnect_session` is set when called from the reconnect loop: the
    /// attempt is abandoned if that session has ended. A user connect after
    /// `disconnect` starts a new session.
    async fn establish(self: &Arc<Self>, reconnect_session: Option<u64>) -> Result<()> {
        {
            let session = self.session.lock();
            if session.state == ConnectionState::Connected {
                return Err(MsmpError::AlreadyConnected);
            }
            if let Some(id) = reconnect_session {
                if id != session.session_id || session.shutdown.is_cancelled() {
                    return Err(MsmpError::Disconnected);
                }
            }
        }

        let transport = self.connector.connect().await?;

        let rejected = {
            let mut session = self.session.lock();
            if session.state == ConnectionState::Connected {
                Some(MsmpError::AlreadyConnected)
            } else if reconnect_session.is_some_and(|id| {
                id != session.session_id || session.shutdown.is_cancelled()
            }) {
                Some(MsmpError::Disconnected)
            } else {
                if session.shutdown.is_cancelled() {
                    session.shutdown = CancellationToken::new();
                    session.session_id += 1;
                }

                session.generation += 1;
                session.transport = Some(transport.clone());
                session.state = ConnectionState::Connected;
                self.set_state(ConnectionState::Connected);

                let generation = session.generation;
                let shutdown = session.shutdown.clone();
                tokio::spawn(read_loop(
                    self.clone(),
                    transport.clone(),
                    generation,
                    shutdown.clone(),
                ));

                if session.auto_reconnect && session.reconnect_loop != Some(session.session_id) {
                    session.reconnect_loop = Some(session.session_id);
                    tokio::spawn(reconnect_loop(self.clone(), session.session_id, shutdown));
                }

                info!(url = %self.config.url, generation, "Connected");
                None
            }
        };

        match rejected {
            Some(e) => {
                let _ = self.close_transport(transport).await;
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Mark a dropped connection as disconnected if it is still the current one
    async fn handle_drop(&self, generation: u64) {
        let transport = {
            let mut session = self.session.lock();
            if session.generation != generation || session.state != ConnectionState::Connected {
                return;
            }
            session.state = ConnectionState::Disconnected;
            self.set_state(ConnectionState::Disconnected);
            session.transport.take()
        };

        warn!(url = %self.config.url, generation, "Connection lost");

        if self.config.pending_policy == PendingPolicy::FailOnDisconnect {
            let failed = self.container.cancel_all();
            if !failed.is_empty() {
                warn!(count = failed.len(), "Failed pending requests after connection loss");
            }
        }

        if let Some(transport) = transport {
            let _ = self.close_transport(transport).await;
        }
    }

    fn handle_frame(&self, text: &str, notifications: &mpsc::UnboundedSender<ServerNotification>) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to parse frame: {}", e);
                return;
            }
        };

        match frame {
            Frame::Notification(notification) => {
                let _ = notifications.send(notification);
            }
            Frame::Response(response) => {
                let id = response.id();
                if id == NOTIFICATION_ID {
                    debug!("Dropping reply addressed to notification id");
                    return;
                }

                let unmatched = response.clone();
                if let Err(e) = self.container.resolve(response) {
                    warn!(id, "Unroutable response: {}", e);
                    (self.default_handler)(None, &unmatched);
                }
            }
        }
    }
}

/// Reads frames until the session ends or the transport fails
async fn read_loop(
    inner: Arc<ClientInner>,
    transport: Arc<dyn Transport>,
    generation: u64,
    shutdown: CancellationToken,
) {
    let read_timeout = inner.config.read_timeout;
    let notifications = spawn_notification_dispatch(inner.clone());

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(generation, "Read loop stopped");
                return;
            }
            read = timeout(read_timeout, transport.read()) => match read {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => {
                    error!(generation, "Error reading frame: {}", e);
                    break;
                }
                Err(_) => {
                    warn!(generation, "No frame within {:?}, assuming dead peer", read_timeout);
                    break;
                }
            }
        };

        inner.handle_frame(&frame, &notifications);
    }

    inner.handle_drop(generation).await;
}

/// Runs the notification handler in order, off the read loop. Ends when the
/// read loop drops the sender.
fn spawn_notification_dispatch(
    inner: Arc<ClientInner>,
) -> mpsc::UnboundedSender<ServerNotification> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerNotification>();
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let handler = inner.notification_handler.lock().clone();
            handler(&notification);
        }
    });
    tx
}

/// Re-establishes dropped connections until the session ends
///
/// Boxed because it awaits `establish`, which spawns it.
fn reconnect_loop(
    inner: Arc<ClientInner>,
    session_id: u64,
    shutdown: CancellationToken,
) -> BoxFuture<'static, ()> {
    async move { run_reconnect_loop(inner, session_id, shutdown).await }.boxed()
}

async fn run_reconnect_loop(inner: Arc<ClientInner>, session_id: u64, shutdown: CancellationToken) {
    let poll = inner.config.reconnect_poll_interval;
    let backoff = inner.config.reconnect_interval;

    while !shutdown.is_cancelled() {
        let needs_reconnect = {
            let session = inner.session.lock();
            session.state == ConnectionState::Disconnected && session.auto_reconnect
        };

        let mut delay = poll;
        if needs_reconnect {
            info!("Attempting to reconnect to {}", inner.config.url);
            match inner.establish(Some(session_id)).await {
                Ok(()) => info!("Reconnected successfully to {}", inner.config.url),
                Err(MsmpError::AlreadyConnected) | Err(MsmpError::Disconnected) => {}
                Err(e) => {
                    warn!("Reconnect failed: {}", e);
                    delay = backoff;
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let mut session = inner.session.lock();
    if session.reconnect_loop == Some(session_id) {
        session.reconnect_loop = None;
    }
    debug!(session_id, "Reconnect loop stopped");
}
