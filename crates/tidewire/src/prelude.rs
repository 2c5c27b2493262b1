//! Prelude module for Tidewire.
//!
//! This module re-exports the most commonly used types for convenient importing:
//!
//! ```ignore
//! use tidewire::prelude::*;
//! ```
//!
//! This provides access to:
//! - Logging (`Logger`, `LogLevel`, the built-in channels and the `log_*!` macros)
//! - The async dispatcher (`AsyncDispatcher`, `DispatchSink`)
//! - Endpoints (`EndpointHandler`, `TcpClient`, `Session`, `TcpServer`)

// ============================================================================
// Logging
// ============================================================================

pub use tidewire_core::logger::{
    ConsoleChannel, FileChannel, LogChannel, LogEntry, LogLevel, Logger, MemoryChannel, TracingChannel,
    default_logger, shutdown_default_logger,
};
pub use tidewire_core::{log_debug, log_error, log_info, log_trace, log_warn};

// ============================================================================
// Dispatch and Time
// ============================================================================

pub use tidewire_core::{AsyncDispatcher, ClockService, DispatchSink, DispatcherConfig};

// ============================================================================
// Networking
// ============================================================================

#[cfg(feature = "networking")]
pub use tidewire_net::{
    Endpoint, EndpointConfig, EndpointHandler, EventPoller, EventPollerPool, Session, SockError,
    SockErrorKind, TcpClient, TcpServer, TcpServerConfig,
};
