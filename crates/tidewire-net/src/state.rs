//! Endpoint identity and lifecycle state.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Which side opened the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Accepted by a server.
    Session,
    /// Initiated locally.
    Client,
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Process-unique endpoint identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EndpointId {
    kind: EndpointKind,
    seq: u64,
}

impl EndpointId {
    pub(crate) fn next(kind: EndpointKind) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self {
            kind,
            seq: COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Get the raw sequence number.
    pub fn as_u64(&self) -> u64 {
        self.seq
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.kind, self.seq)
    }
}

/// Connection phase of an endpoint.
///
/// Clients move `Idle -> Connecting -> Connected -> Closed`; sessions start
/// at `Connected`. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EndpointState {
    /// Created, no connect attempt yet.
    #[default]
    Idle,
    /// Resolving and connecting.
    Connecting,
    /// Connected and ready to send/receive data.
    Connected,
    /// Torn down.
    Closed,
}

impl std::fmt::Display for EndpointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Phase of the one-time teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GuardState {
    Active = 0,
    ShuttingDown = 1,
    Closed = 2,
}

/// Admits exactly one teardown executor.
#[derive(Debug)]
pub struct ShutdownGuard {
    state: AtomicU8,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(GuardState::Active as u8),
        }
    }

    /// Claim the teardown. Only the first caller gets `true`.
    pub fn try_begin(&self) -> bool {
        self.state
            .compare_exchange(
                GuardState::Active as u8,
                GuardState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Mark the teardown complete.
    pub fn finish(&self) {
        self.state.store(GuardState::Closed as u8, Ordering::Release);
    }

    pub fn state(&self) -> GuardState {
        match self.state.load(Ordering::Acquire) {
            0 => GuardState::Active,
            1 => GuardState::ShuttingDown,
            _ => GuardState::Closed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == GuardState::Active
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}
