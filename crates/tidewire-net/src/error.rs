//! Error types for the networking module.
//!
//! Two kinds of failure exist. [`NetError`] is an ordinary `Result` error for
//! API misuse and resource failures (binding, starting a poller, sending on a
//! closed endpoint). [`SockError`] describes why a connection ended; it is
//! never returned from a call but delivered as a value to
//! [`EndpointHandler::on_connect`](crate::EndpointHandler::on_connect) or
//! [`EndpointHandler::on_error`](crate::EndpointHandler::on_error).

use std::fmt;
use std::io;

/// Result type alias for networking operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors returned by networking APIs.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The event poller's runtime or thread could not be created.
    #[error("Failed to start event poller: {0}")]
    Runtime(#[source] io::Error),

    /// The endpoint has no open socket.
    #[error("Not connected")]
    NotConnected,

    /// The operation can only be performed once.
    #[error("Already started")]
    AlreadyStarted,

    /// The event poller backing this object has shut down.
    #[error("Event poller is no longer running")]
    PollerGone,

    /// Binding a listener failed.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The local adapter address could not be parsed.
    #[error("Invalid network adapter address '{0}'")]
    InvalidAdapter(String),

    /// Generic I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl NetError {
    /// Create a bind error.
    pub fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}

/// Why a connection attempt failed or a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SockErrorKind {
    /// The connect deadline elapsed first.
    ConnectTimeout,
    /// The remote host refused the connection.
    ConnectRefused,
    /// The host name could not be resolved.
    ResolveFailure,
    /// The remote side closed the stream.
    PeerClosed,
    /// Any other transport error; see [`SockError::code`].
    Io,
    /// The application closed the endpoint.
    ShutdownRequested,
}

impl fmt::Display for SockErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectTimeout => "connect timeout",
            Self::ConnectRefused => "connect refused",
            Self::ResolveFailure => "resolve failure",
            Self::PeerClosed => "peer closed",
            Self::Io => "io error",
            Self::ShutdownRequested => "shutdown",
        };
        f.write_str(name)
    }
}

/// A transport failure delivered to endpoint hooks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SockError {
    kind: SockErrorKind,
    code: i32,
    message: String,
}

impl SockError {
    pub fn new(kind: SockErrorKind, code: i32, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// The connect deadline elapsed.
    pub fn timeout() -> Self {
        Self::new(SockErrorKind::ConnectTimeout, 0, "connect timeout")
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::new(SockErrorKind::ConnectRefused, 0, message)
    }

    pub fn resolve(message: impl Into<String>) -> Self {
        Self::new(SockErrorKind::ResolveFailure, 0, message)
    }

    pub fn peer_closed() -> Self {
        Self::new(SockErrorKind::PeerClosed, 0, "end of file")
    }

    /// A transport error with an OS error code (`-1` when unknown).
    pub fn io(code: i32, message: impl Into<String>) -> Self {
        Self::new(SockErrorKind::Io, code, message)
    }

    /// A close requested by the application.
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::new(SockErrorKind::ShutdownRequested, 0, message)
    }

    pub fn kind(&self) -> SockErrorKind {
        self.kind
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&io::Error> for SockError {
    fn from(err: &io::Error) -> Self {
        let code = err.raw_os_error().unwrap_or(-1);
        let kind = match err.kind() {
            io::ErrorKind::ConnectionRefused => SockErrorKind::ConnectRefused,
            io::ErrorKind::TimedOut => SockErrorKind::ConnectTimeout,
            io::ErrorKind::UnexpectedEof => SockErrorKind::PeerClosed,
            _ => SockErrorKind::Io,
        };
        Self::new(kind, code, err.to_string())
    }
}

impl From<io::Error> for SockError {
    fn from(err: io::Error) -> Self {
        Self::from(&err)
    }
}
