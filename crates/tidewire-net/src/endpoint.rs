//! The lifecycle shared by clients and sessions.
//!
//! An [`Endpoint`] binds one socket to an [`EndpointHandler`] and enforces the
//! callback contract:
//!
//! - teardown runs exactly once, no matter how many threads request it
//! - a client's connect attempt ends in exactly one `on_connect`
//! - a connected endpoint ends in exactly one `on_error`
//! - no hook runs concurrently with teardown or after it
//!
//! Hooks run under a per-endpoint re-entrant lock, so a hook may call
//! [`Endpoint::shutdown`] on its own endpoint.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex};
use tidewire_core::logging::targets;
use tidewire_core::{log_debug, log_warn};
use tokio::net::TcpStream;
use tokio::task::AbortHandle;

use crate::config::EndpointConfig;
use crate::error::{NetError, Result, SockError};
use crate::poller::{EventPoller, Timer};
use crate::socket::{Socket, SocketEvents};
use crate::state::{EndpointId, EndpointKind, EndpointState, GuardState, ShutdownGuard};

/// Callback hooks of an endpoint.
///
/// Every hook defaults to a no-op. Reactor-driven hooks (`on_connect`,
/// `on_recv`, `on_flush`, `on_manager`) run on the endpoint's poller thread;
/// `on_error` runs on whichever thread performed the teardown.
pub trait EndpointHandler: Send + Sync + Sized + 'static {
    /// A client's connect attempt finished. Called exactly once per client.
    fn on_connect(&self, endpoint: &Endpoint<Self>, result: std::result::Result<(), &SockError>) {
        let _ = (endpoint, result);
    }

    /// Data arrived. No framing is applied.
    fn on_recv(&self, endpoint: &Endpoint<Self>, data: Bytes) {
        let _ = (endpoint, data);
    }

    /// Everything queued with `send` has been written.
    fn on_flush(&self, endpoint: &Endpoint<Self>) {
        let _ = endpoint;
    }

    /// The connection ended. Called exactly once per connected endpoint.
    fn on_error(&self, endpoint: &Endpoint<Self>, err: &SockError) {
        let _ = (endpoint, err);
    }

    /// Periodic health check while connected.
    fn on_manager(&self, endpoint: &Endpoint<Self>) {
        let _ = endpoint;
    }
}

pub(crate) type CloseNotifier = Box<dyn FnOnce(EndpointId) + Send>;

/// Shared state of a client or session.
///
/// Handlers receive `&Endpoint<H>` in every hook; applications reach it
/// through [`TcpClient`](crate::TcpClient) or [`Session`](crate::Session).
pub struct Endpoint<H: EndpointHandler> {
    id: EndpointId,
    this: Weak<Endpoint<H>>,
    poller: Weak<EventPoller>,
    config: EndpointConfig,
    guard: ShutdownGuard,
    state: Mutex<EndpointState>,
    socket: Mutex<Option<Socket>>,
    manager_timer: Mutex<Option<Timer>>,
    connect_timer: Mutex<Option<Timer>>,
    connect_task: Mutex<Option<AbortHandle>>,
    close_notifier: Mutex<Option<CloseNotifier>>,
    callbacks: ReentrantMutex<()>,
    handler: H,
}

impl<H: EndpointHandler> Endpoint<H> {
    pub(crate) fn new(
        kind: EndpointKind,
        state: EndpointState,
        poller: &Arc<EventPoller>,
        config: EndpointConfig,
        handler: H,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: EndpointId::next(kind),
            this: this.clone(),
            poller: Arc::downgrade(poller),
            config,
            guard: ShutdownGuard::new(),
            state: Mutex::new(state),
            socket: Mutex::new(None),
            manager_timer: Mutex::new(None),
            connect_timer: Mutex::new(None),
            connect_task: Mutex::new(None),
            close_notifier: Mutex::new(None),
            callbacks: ReentrantMutex::new(()),
            handler,
        })
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Stable, process-unique identifier, e.g. `"session-12"`.
    pub fn identifier(&self) -> String {
        self.id.to_string()
    }

    pub fn kind(&self) -> EndpointKind {
        self.id.kind()
    }

    pub fn state(&self) -> EndpointState {
        *self.state.lock()
    }

    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    /// True only while connected with a socket installed and not shutting down.
    pub fn alive(&self) -> bool {
        self.guard.is_active() && self.state() == EndpointState::Connected && self.socket.lock().is_some()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// The poller this endpoint runs on, if it is still alive.
    pub fn poller(&self) -> Option<Arc<EventPoller>> {
        self.poller.upgrade()
    }

    /// Queue data for sending.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        if !self.guard.is_active() {
            return Err(NetError::NotConnected);
        }
        match self.socket.lock().as_ref() {
            Some(socket) => socket.send(data),
            None => Err(NetError::NotConnected),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.lock().as_ref().map(Socket::local_addr)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.socket.lock().as_ref().map(Socket::peer_addr)
    }

    pub fn local_ip(&self) -> Option<IpAddr> {
        self.local_addr().map(|a| a.ip())
    }

    pub fn local_port(&self) -> Option<u16> {
        self.local_addr().map(|a| a.port())
    }

    pub fn peer_ip(&self) -> Option<IpAddr> {
        self.peer_addr().map(|a| a.ip())
    }

    pub fn peer_port(&self) -> Option<u16> {
        self.peer_addr().map(|a| a.port())
    }

    /// Tear the endpoint down.
    ///
    /// The first caller cancels the timers, closes the socket and delivers the
    /// terminal notification: `on_connect(Err)` while connecting, `on_error`
    /// once connected, nothing if a client never started. Every other call is
    /// a no-op.
    pub fn shutdown(&self, err: SockError) {
        if !self.guard.try_begin() {
            return;
        }
        let callbacks = self.callbacks.lock();

        self.manager_timer.lock().take();
        self.connect_timer.lock().take();
        if let Some(task) = self.connect_task.lock().take() {
            task.abort();
        }
        if let Some(socket) = self.socket.lock().take() {
            socket.close();
        }

        let prior = std::mem::replace(&mut *self.state.lock(), EndpointState::Closed);
        tracing::trace!(target: targets::ENDPOINT, endpoint = %self.id, from = %prior, reason = %err, "endpoint teardown");

        match prior {
            EndpointState::Connecting => {
                log_warn!("{} connect failed: {}", self.id, err);
                self.handler.on_connect(self, Err(&err));
            }
            EndpointState::Connected => {
                log_debug!("{} closed: {}", self.id, err);
                self.handler.on_error(self, &err);
            }
            EndpointState::Idle | EndpointState::Closed => {}
        }

        self.guard.finish();
        drop(callbacks);

        let notifier = self.close_notifier.lock().take();
        if let Some(notify) = notifier {
            notify(self.id);
        }
    }

    /// Run a hook unless teardown has begun.
    pub(crate) fn dispatch(&self, hook: impl FnOnce(&H, &Self)) {
        let _callbacks = self.callbacks.lock();
        if self.guard.is_active() {
            hook(&self.handler, self);
        }
    }

    pub(crate) fn set_close_notifier(&self, notifier: CloseNotifier) {
        *self.close_notifier.lock() = Some(notifier);
    }

    pub(crate) fn set_connect_timer(&self, timer: Timer) {
        *self.connect_timer.lock() = Some(timer);
    }

    pub(crate) fn set_connect_task(&self, task: AbortHandle) {
        *self.connect_task.lock() = Some(task);
    }

    /// Move `Idle -> Connecting`. Fails if the endpoint was used before.
    pub(crate) fn begin_connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != EndpointState::Idle || !self.guard.is_active() {
            return Err(NetError::AlreadyStarted);
        }
        *state = EndpointState::Connecting;
        Ok(())
    }

    /// Bind a freshly connected stream to this endpoint and start its I/O.
    ///
    /// For clients this completes the connect attempt and fires
    /// `on_connect(Ok)`. Must run on the endpoint's poller thread.
    pub(crate) fn install_stream(&self, stream: TcpStream) {
        let _callbacks = self.callbacks.lock();
        if !self.guard.is_active() {
            return;
        }
        let (Some(this), Some(poller)) = (self.this.upgrade(), self.poller.upgrade()) else {
            self.shutdown(SockError::shutdown("poller stopped"));
            return;
        };

        if let Err(err) = stream.set_nodelay(self.config.no_delay) {
            log_warn!("{} failed to set TCP_NODELAY: {}", self.id, err);
        }
        let events: Arc<dyn SocketEvents> = this;
        let socket = match Socket::open(&poller, stream, self.config.read_buffer_size, events) {
            Ok(socket) => socket,
            Err(err) => {
                self.shutdown(SockError::from(&err));
                return;
            }
        };
        *self.socket.lock() = Some(socket);

        let was_connecting = {
            let mut state = self.state.lock();
            let prior = *state;
            *state = EndpointState::Connected;
            prior == EndpointState::Connecting
        };
        self.connect_timer.lock().take();
        self.connect_task.lock().take();
        self.start_manager(&poller);

        tracing::trace!(target: targets::ENDPOINT, endpoint = %self.id, "endpoint connected");
        if was_connecting {
            self.handler.on_connect(self, Ok(()));
        }
    }

    fn start_manager(&self, poller: &EventPoller) {
        let weak = self.this.clone();
        let timer = poller.run_every(self.config.manager_interval, move || {
            let Some(endpoint) = weak.upgrade() else {
                return false;
            };
            endpoint.dispatch(|handler, endpoint| handler.on_manager(endpoint));
            endpoint.guard.is_active()
        });
        *self.manager_timer.lock() = Some(timer);
    }
}

impl<H: EndpointHandler> SocketEvents for Endpoint<H> {
    fn on_read(&self, data: Bytes) {
        self.dispatch(|handler, endpoint| handler.on_recv(endpoint, data));
    }

    fn on_flushed(&self) {
        self.dispatch(|handler, endpoint| handler.on_flush(endpoint));
    }

    fn on_closed(&self, err: SockError) {
        self.shutdown(err);
    }
}

impl<H: EndpointHandler> std::fmt::Debug for Endpoint<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("guard", &self.guard_state())
            .finish()
    }
}
