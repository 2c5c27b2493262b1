//! TCP acceptor producing [`Session`]s.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tidewire_core::logging::targets;
use tidewire_core::{log_error, log_info, log_warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::AbortHandle;

use crate::config::TcpServerConfig;
use crate::endpoint::{CloseNotifier, EndpointHandler};
use crate::error::{NetError, Result, SockError};
use crate::poller::{EventPoller, EventPollerPool};
use crate::session::Session;
use crate::state::{EndpointId, GuardState};

/// What a session factory knows about the server that accepted the session.
#[derive(Debug, Clone)]
pub struct ServerContext {
    config: TcpServerConfig,
    local_addr: SocketAddr,
}

impl ServerContext {
    pub fn config(&self) -> &TcpServerConfig {
        &self.config
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

type SessionFactory<H> = dyn Fn(&ServerContext) -> H + Send + Sync;

struct ServerShared<H: EndpointHandler> {
    sessions: Mutex<HashMap<EndpointId, Session<H>>>,
    factory: Box<SessionFactory<H>>,
    workers: Vec<Arc<EventPoller>>,
    next: AtomicUsize,
}

impl<H: EndpointHandler> ServerShared<H> {
    fn next_worker(&self) -> Option<Arc<EventPoller>> {
        let running: Vec<_> = self.workers.iter().filter(|p| p.is_running()).collect();
        if running.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % running.len();
        Some(running[index].clone())
    }

    fn accept(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr, context: &ServerContext) {
        let stream = match stream.into_std() {
            Ok(stream) => stream,
            Err(err) => {
                log_warn!("failed to detach accepted stream from {}: {}", peer, err);
                return;
            }
        };
        let Some(worker) = self.next_worker() else {
            log_error!("no running poller for session from {}", peer);
            return;
        };

        let handler = (self.factory)(context);
        let weak: Weak<Self> = Arc::downgrade(self);
        let notifier: CloseNotifier = Box::new(move |id| {
            if let Some(shared) = weak.upgrade() {
                shared.sessions.lock().remove(&id);
            }
        });

        let session = match Session::attach_with_notifier(
            &worker,
            stream,
            handler,
            context.config.endpoint.clone(),
            Some(notifier),
        ) {
            Ok(session) => session,
            Err(err) => {
                log_warn!("failed to attach session from {}: {}", peer, err);
                return;
            }
        };

        let id = session.id();
        tracing::debug!(target: targets::ENDPOINT, session = %id, %peer, poller = worker.name(), "session accepted");
        self.sessions.lock().insert(id, session.clone());
        // A session torn down before registration already ran its notifier.
        if session.endpoint().guard_state() == GuardState::Closed {
            self.sessions.lock().remove(&id);
        }
    }
}

/// A TCP server that turns every accepted connection into a [`Session`].
///
/// The listener runs on one poller; sessions are spread over the worker
/// pollers round-robin. The server keeps every session until its `on_error`
/// has completed.
///
/// # Example
///
/// ```no_run
/// use tidewire_net::{Endpoint, EndpointHandler, TcpServer, TcpServerConfig};
///
/// struct Echo;
///
/// impl EndpointHandler for Echo {
///     fn on_recv(&self, endpoint: &Endpoint<Self>, data: bytes::Bytes) {
///         let _ = endpoint.send(data);
///     }
/// }
///
/// let server = TcpServer::new(TcpServerConfig::new("0.0.0.0", 9000), |_| Echo).unwrap();
/// let addr = server.start().unwrap();
/// println!("listening on {addr}");
/// ```
pub struct TcpServer<H: EndpointHandler> {
    config: TcpServerConfig,
    acceptor: Arc<EventPoller>,
    shared: Arc<ServerShared<H>>,
    accept_task: Mutex<Option<AbortHandle>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl<H: EndpointHandler> TcpServer<H> {
    /// Create a server using the global poller pool.
    pub fn new<F>(config: TcpServerConfig, factory: F) -> Result<Self>
    where
        F: Fn(&ServerContext) -> H + Send + Sync + 'static,
    {
        let pool = EventPollerPool::instance();
        let acceptor = pool.get_poller()?;
        Ok(Self::build(config, acceptor, pool.pollers().to_vec(), Box::new(factory)))
    }

    /// Create a server that accepts and runs all sessions on one poller.
    pub fn with_poller<F>(poller: &Arc<EventPoller>, config: TcpServerConfig, factory: F) -> Self
    where
        F: Fn(&ServerContext) -> H + Send + Sync + 'static,
    {
        Self::build(config, poller.clone(), vec![poller.clone()], Box::new(factory))
    }

    fn build(
        config: TcpServerConfig,
        acceptor: Arc<EventPoller>,
        workers: Vec<Arc<EventPoller>>,
        factory: Box<SessionFactory<H>>,
    ) -> Self {
        Self {
            config,
            acceptor,
            shared: Arc::new(ServerShared {
                sessions: Mutex::new(HashMap::new()),
                factory,
                workers,
                next: AtomicUsize::new(0),
            }),
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Bind the listener and start accepting.
    ///
    /// Returns the bound address, which carries the chosen port when the
    /// configured port is `0`.
    pub fn start(&self) -> Result<SocketAddr> {
        let mut accept_task = self.accept_task.lock();
        if accept_task.is_some() {
            return Err(NetError::AlreadyStarted);
        }
        if !self.acceptor.is_running() {
            return Err(NetError::PollerGone);
        }

        let addr = self.config.bind_addr();
        let listener = std::net::TcpListener::bind(&addr).map_err(|err| NetError::bind(addr.clone(), err))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let context = ServerContext {
            config: self.config.clone(),
            local_addr,
        };
        let shared = self.shared.clone();
        let task = self.acceptor.spawn(async move {
            let listener = match TcpListener::from_std(listener) {
                Ok(listener) => listener,
                Err(err) => {
                    log_error!("failed to register listener on {}: {}", local_addr, err);
                    return;
                }
            };
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => shared.accept(stream, peer, &context),
                    Err(err) => {
                        log_warn!("accept on {} failed: {}", local_addr, err);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });

        *accept_task = Some(task.abort_handle());
        *self.local_addr.lock() = Some(local_addr);
        log_info!("server listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop accepting and shut down every session.
    pub fn stop(&self) {
        let Some(task) = self.accept_task.lock().take() else {
            return;
        };
        task.abort();

        let sessions: Vec<_> = self.shared.sessions.lock().values().cloned().collect();
        for session in sessions {
            session.shutdown(SockError::shutdown("server stopped"));
        }
        tracing::debug!(target: targets::ENDPOINT, addr = ?*self.local_addr.lock(), "server stopped");
    }

    pub fn is_listening(&self) -> bool {
        self.accept_task.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn config(&self) -> &TcpServerConfig {
        &self.config
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.shared.sessions.lock().len()
    }

    /// IDs of all live sessions.
    pub fn sessions(&self) -> Vec<EndpointId> {
        self.shared.sessions.lock().keys().copied().collect()
    }

    pub fn get_session(&self, id: EndpointId) -> Option<Session<H>> {
        self.shared.sessions.lock().get(&id).cloned()
    }
}

impl<H: EndpointHandler> Drop for TcpServer<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<H: EndpointHandler> std::fmt::Debug for TcpServer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("bind_addr", &self.config.bind_addr())
            .field("local_addr", &self.local_addr())
            .field("sessions", &self.session_count())
            .finish()
    }
}
