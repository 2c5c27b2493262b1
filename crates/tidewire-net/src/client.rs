//! Connection-initiating endpoints.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tidewire_core::log_debug;
use tidewire_core::logging::targets;
use tokio::net::{TcpSocket, TcpStream};

use crate::config::EndpointConfig;
use crate::endpoint::{Endpoint, EndpointHandler};
use crate::error::{NetError, Result, SockError};
use crate::poller::{EventPoller, EventPollerPool};
use crate::resolver::{Resolver, SystemResolver};
use crate::state::{EndpointId, EndpointKind, EndpointState};

/// A TCP client driven by an event poller.
///
/// A client makes at most one connect attempt. Its outcome is reported once
/// through [`EndpointHandler::on_connect`]; after a successful connect the
/// connection's end is reported once through [`EndpointHandler::on_error`].
/// To reconnect, create a new client.
///
/// Dropping the client shuts it down.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use tidewire_net::{Endpoint, EndpointHandler, SockError, TcpClient};
///
/// struct Greeter;
///
/// impl EndpointHandler for Greeter {
///     fn on_connect(&self, endpoint: &Endpoint<Self>, result: Result<(), &SockError>) {
///         if result.is_ok() {
///             let _ = endpoint.send("hello");
///         }
///     }
/// }
///
/// let client = TcpClient::new(Greeter).unwrap();
/// client.start_connect("example.com", 7, Duration::from_secs(5)).unwrap();
/// ```
pub struct TcpClient<H: EndpointHandler> {
    endpoint: Arc<Endpoint<H>>,
    resolver: Arc<dyn Resolver>,
    adapter: Mutex<Option<IpAddr>>,
    target: Mutex<Option<(String, u16)>>,
}

impl<H: EndpointHandler> TcpClient<H> {
    /// Create a client on a poller from the global pool.
    pub fn new(handler: H) -> Result<Self> {
        let poller = EventPollerPool::instance().get_poller()?;
        Ok(Self::with_poller(&poller, handler, EndpointConfig::default()))
    }

    /// Create a client on a specific poller.
    pub fn with_poller(poller: &Arc<EventPoller>, handler: H, config: EndpointConfig) -> Self {
        Self {
            endpoint: Endpoint::new(EndpointKind::Client, EndpointState::Idle, poller, config, handler),
            resolver: Arc::new(SystemResolver),
            adapter: Mutex::new(None),
            target: Mutex::new(None),
        }
    }

    /// Use a custom resolver for host names.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Bind outgoing connections to a local interface address.
    ///
    /// Only takes effect for a later [`start_connect`](Self::start_connect).
    /// The address is ignored for targets of the other IP family.
    pub fn set_net_adapter(&self, local_ip: &str) -> Result<()> {
        let ip = local_ip
            .parse::<IpAddr>()
            .map_err(|_| NetError::InvalidAdapter(local_ip.to_string()))?;
        *self.adapter.lock() = Some(ip);
        Ok(())
    }

    /// Begin connecting to `host:port`.
    ///
    /// Returns once the attempt is scheduled. The outcome arrives through
    /// `on_connect`: success, or an error of kind `ConnectTimeout` if
    /// `timeout` elapses first, `ResolveFailure` if the host cannot be
    /// resolved, `ConnectRefused` or `Io` otherwise.
    ///
    /// Fails with [`NetError::AlreadyStarted`] on a second call.
    pub fn start_connect(&self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        let poller = self
            .endpoint
            .poller()
            .filter(|poller| poller.is_running())
            .ok_or(NetError::PollerGone)?;
        self.endpoint.begin_connect()?;
        *self.target.lock() = Some((host.to_string(), port));

        tracing::debug!(target: targets::ENDPOINT, endpoint = %self.endpoint.id(), host, port, "connecting");

        let weak = Arc::downgrade(&self.endpoint);
        let deadline = poller.run_after(timeout, move || {
            if let Some(endpoint) = weak.upgrade() {
                endpoint.shutdown(SockError::timeout());
            }
        });
        self.endpoint.set_connect_timer(deadline);

        let endpoint = self.endpoint.clone();
        let resolver = self.resolver.clone();
        let adapter = *self.adapter.lock();
        let host = host.to_string();
        let task = poller.spawn(async move {
            match connect(resolver.as_ref(), &host, port, adapter).await {
                Ok(stream) => endpoint.install_stream(stream),
                Err(err) => endpoint.shutdown(err),
            }
        });
        self.endpoint.set_connect_task(task.abort_handle());
        Ok(())
    }

    /// Tear the client down. Later calls are no-ops.
    pub fn shutdown(&self, err: SockError) {
        self.endpoint.shutdown(err);
    }

    pub fn alive(&self) -> bool {
        self.endpoint.alive()
    }

    pub fn state(&self) -> EndpointState {
        self.endpoint.state()
    }

    pub fn id(&self) -> EndpointId {
        self.endpoint.id()
    }

    pub fn identifier(&self) -> String {
        self.endpoint.identifier()
    }

    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        self.endpoint.send(data)
    }

    /// Host and port of the last connect attempt.
    pub fn target(&self) -> Option<(String, u16)> {
        self.target.lock().clone()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.endpoint.peer_addr()
    }

    pub fn endpoint(&self) -> &Arc<Endpoint<H>> {
        &self.endpoint
    }

    pub fn handler(&self) -> &H {
        self.endpoint.handler()
    }
}

impl<H: EndpointHandler> Drop for TcpClient<H> {
    fn drop(&mut self) {
        self.endpoint.shutdown(SockError::shutdown("client dropped"));
    }
}

impl<H: EndpointHandler> std::fmt::Debug for TcpClient<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("id", &self.endpoint.id())
            .field("target", &*self.target.lock())
            .field("state", &self.state())
            .finish()
    }
}

/// Resolve `host` and try each address in turn.
async fn connect(
    resolver: &dyn Resolver,
    host: &str,
    port: u16,
    adapter: Option<IpAddr>,
) -> std::result::Result<TcpStream, SockError> {
    let addrs = resolver
        .resolve(host, port)
        .await
        .map_err(|err| SockError::resolve(format!("{host}: {err}")))?;

    let mut last_error = None;
    for addr in addrs {
        match connect_addr(addr, adapter).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                log_debug!("connect to {} failed: {}", addr, err);
                last_error = Some(SockError::from(&err));
            }
        }
    }
    Err(last_error.unwrap_or_else(|| SockError::resolve(format!("{host}: no usable address"))))
}

async fn connect_addr(addr: SocketAddr, adapter: Option<IpAddr>) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Some(local) = adapter
        && local.is_ipv4() == addr.is_ipv4()
    {
        socket.bind(SocketAddr::new(local, 0))?;
    }
    socket.connect(addr).await
}
