//! Core systems for Tidewire.
//!
//! This crate provides the thread-level building blocks the networking layer
//! is built on:
//!
//! - **Clock**: a process-wide sampler publishing elapsed and wall time
//! - **Semaphore**: the counting wait primitive behind the dispatcher
//! - **Dispatcher**: a batching producer/single-consumer queue with fan-out to sinks
//! - **Logger**: named, level-filtered channels with optional async delivery
//!
//! # Dispatcher Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use tidewire_core::AsyncDispatcher;
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let dispatcher = AsyncDispatcher::<&'static str>::new().unwrap();
//!
//! let sink = seen.clone();
//! dispatcher.add_sink(Arc::new(move |item: &&'static str| sink.lock().push(*item)));
//!
//! dispatcher.submit("a");
//! dispatcher.submit("b");
//! dispatcher.shutdown();
//!
//! assert_eq!(*seen.lock(), vec!["a", "b"]);
//! ```
//!
//! # Logger Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tidewire_core::logger::{default_logger, shutdown_default_logger, FileChannel, LogLevel};
//! use tidewire_core::log_info;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let logger = default_logger();
//!     logger.add(Arc::new(FileChannel::open("file", "logs/app.log", LogLevel::Debug)?));
//!     logger.enable_async()?;
//!
//!     log_info!("service started");
//!
//!     shutdown_default_logger();
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod dispatcher;
mod error;
pub mod logger;
pub mod logging;
pub mod semaphore;

pub use clock::{ClockConfig, ClockService, current_micros, current_millis};
pub use dispatcher::{AsyncDispatcher, DispatchSink, DispatcherConfig};
pub use error::{CoreError, Result, SinkError, SinkResult};
pub use logger::{
    AsyncLogWriter, LogBuilder, LogChannel, LogEntry, LogLevel, LogWriter, Logger, SourceLocation,
    default_logger, shutdown_default_logger,
};
pub use semaphore::Semaphore;

static_assertions::assert_impl_all!(ClockService: Send, Sync);
static_assertions::assert_impl_all!(Semaphore: Send, Sync);
