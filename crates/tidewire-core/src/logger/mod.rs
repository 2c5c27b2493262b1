//! Application-facing logger with named, level-filtered channels.
//!
//! A [`Logger`] owns a set of [`LogChannel`]s keyed by name and an optional
//! [`LogWriter`]. Entries are built with the `log_*!` macros (or a
//! [`LogBuilder`] directly) and written exactly once when the builder goes out
//! of scope. Without a writer, entries are delivered to the channels on the
//! calling thread. With an [`AsyncLogWriter`] installed they are delivered on
//! the writer's thread, in submission order per producer.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tidewire_core::logger::{LogLevel, Logger, MemoryChannel};
//! use tidewire_core::{log_info, log_warn};
//!
//! let logger = Logger::new("service");
//! let memory = Arc::new(MemoryChannel::new("memory", LogLevel::Trace));
//! logger.add(memory.clone());
//! logger.enable_async().unwrap();
//!
//! log_info!(logger: &logger, "listening on {}", 9000);
//! logger.set_level(LogLevel::Warn);
//! log_info!(logger: &logger, "dropped");
//! log_warn!(logger: &logger, "kept");
//!
//! logger.shutdown();
//! assert_eq!(memory.len(), 2);
//! ```
//!
//! # Default Logger
//!
//! [`default_logger`] returns a process-wide logger, created on first use with
//! a single [`ConsoleChannel`] at [`LogLevel::Info`]. The macros target it
//! unless given `logger: <expr>,`. Call [`shutdown_default_logger`] before the
//! process exits when an async writer was installed on it, so queued entries
//! are flushed.

mod channel;
pub mod channels;
mod entry;
mod format;
mod level;
mod macros;
mod writer;

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

pub use channel::{ChannelBase, ChannelRegistry, LogChannel};
pub use channels::{ConsoleChannel, FileChannel, MemoryChannel, TracingChannel};
#[cfg(unix)]
pub use channels::SyslogChannel;
pub use entry::{LogBuilder, LogEntry, SourceLocation};
pub use format::LogFormat;
pub use level::{LogLevel, ParseLevelError};
pub use writer::{AsyncLogWriter, LogWriter};

use crate::error::Result;
use crate::logging::targets;

/// A named log router.
pub struct Logger {
    name: String,
    registry: Arc<ChannelRegistry>,
    writer: RwLock<Option<Arc<dyn LogWriter>>>,
}

impl Logger {
    /// Create a logger with no channels and no writer.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            registry: Arc::new(ChannelRegistry::new(name.clone())),
            name,
            writer: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a channel, replacing any existing channel with the same name.
    pub fn add(&self, channel: Arc<dyn LogChannel>) {
        if let Some(previous) = self.registry.add(channel) {
            tracing::debug!(target: targets::LOGGER, logger = %self.name, channel = previous.name(), "log channel replaced");
        }
    }

    /// Remove a channel by name.
    pub fn del(&self, name: &str) -> Option<Arc<dyn LogChannel>> {
        self.registry.remove(name)
    }

    /// Look up a channel by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LogChannel>> {
        self.registry.get(name)
    }

    /// Names of the registered channels, in registration order.
    pub fn channel_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Set the threshold of every registered channel.
    pub fn set_level(&self, level: LogLevel) {
        self.registry.set_level(level);
    }

    /// The channel registry shared with the writer.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Install or remove the writer. A replaced writer is shut down first, so
    /// its queued entries are delivered before this returns.
    pub fn set_writer(&self, writer: Option<Arc<dyn LogWriter>>) {
        let previous = std::mem::replace(&mut *self.writer.write(), writer);
        if let Some(previous) = previous {
            previous.shutdown();
        }
    }

    /// Install an [`AsyncLogWriter`] delivering into this logger's channels.
    pub fn enable_async(&self) -> Result<()> {
        let writer = AsyncLogWriter::new(self.registry.clone())?;
        self.set_writer(Some(Arc::new(writer)));
        Ok(())
    }

    /// Check whether a writer is installed.
    pub fn has_writer(&self) -> bool {
        self.writer.read().is_some()
    }

    /// Route a finalized entry through the writer, or to the channels directly.
    pub fn write(&self, entry: LogEntry) {
        let writer = self.writer.read().clone();
        match writer {
            Some(writer) => {
                let entry = Arc::new(entry);
                if !writer.write(entry.clone()) {
                    self.registry.dispatch(&entry);
                }
            }
            None => self.registry.dispatch(&entry),
        }
    }

    /// Deliver an entry to the channels on the calling thread, bypassing the writer.
    pub fn write_channels(&self, entry: &LogEntry) {
        self.registry.dispatch(entry);
    }

    /// Detach the writer and deliver everything it still holds.
    pub fn shutdown(&self) {
        self.set_writer(None);
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("channels", &self.channel_names())
            .field("async", &self.has_writer())
            .finish()
    }
}

static DEFAULT_LOGGER: OnceLock<Logger> = OnceLock::new();

/// The process-wide logger used by the `log_*!` macros.
pub fn default_logger() -> &'static Logger {
    DEFAULT_LOGGER.get_or_init(|| {
        let logger = Logger::new(process_name());
        logger.add(Arc::new(ConsoleChannel::new("console", LogLevel::Info)));
        logger
    })
}

/// Flush and detach the default logger's writer, if it was ever created.
///
/// Intended as the last step before process exit.
pub fn shutdown_default_logger() {
    if let Some(logger) = DEFAULT_LOGGER.get() {
        logger.shutdown();
    }
}

fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "tidewire".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_write_reaches_channels() {
        let logger = Logger::new("sync");
        let memory = Arc::new(MemoryChannel::new("memory", LogLevel::Trace).detail(false));
        logger.add(memory.clone());

        crate::log_debug!(logger: &logger, "hello {}", "world");
        assert_eq!(memory.len(), 1);
        assert!(memory.lines()[0].ends_with("D hello world"));
    }

    #[test]
    fn test_set_writer_replacement_drains_previous() {
        let logger = Logger::new("swap");
        let memory = Arc::new(MemoryChannel::new("memory", LogLevel::Trace));
        logger.add(memory.clone());
        logger.enable_async().unwrap();

        for i in 0..50 {
            crate::log_info!(logger: &logger, "{i}");
        }
        logger.set_writer(None);

        assert_eq!(memory.len(), 50);
        assert!(!logger.has_writer());
    }

    #[test]
    fn test_del_and_get() {
        let logger = Logger::new("registry");
        logger.add(Arc::new(MemoryChannel::new("a", LogLevel::Info)));
        assert!(logger.get("a").is_some());
        assert!(logger.del("a").is_some());
        assert!(logger.get("a").is_none());
        assert!(logger.channel_names().is_empty());
    }

    #[test]
    fn test_default_logger_has_console() {
        assert_eq!(default_logger().channel_names(), vec!["console".to_string()]);
    }

    static_assertions::assert_impl_all!(Logger: Send, Sync);
}
