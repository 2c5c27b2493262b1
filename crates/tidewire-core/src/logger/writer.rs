use std::sync::Arc;

use super::{ChannelRegistry, LogEntry};
use crate::dispatcher::{AsyncDispatcher, DispatcherConfig};
use crate::error::Result;

/// Hands finalized entries to a logger's channels, possibly on another thread.
pub trait LogWriter: Send + Sync {
    /// Accept an entry for delivery. Returns `false` if the writer no longer
    /// accepts entries; the logger then delivers synchronously.
    fn write(&self, entry: Arc<LogEntry>) -> bool;

    /// Deliver everything accepted so far and stop accepting.
    fn shutdown(&self) {}
}

/// Delivers entries on a dedicated thread through an [`AsyncDispatcher`].
#[derive(Debug)]
pub struct AsyncLogWriter {
    dispatcher: AsyncDispatcher<Arc<LogEntry>>,
}

impl AsyncLogWriter {
    /// Create a writer delivering into `registry`.
    pub fn new(registry: Arc<ChannelRegistry>) -> Result<Self> {
        let name = format!("log-{}", registry.logger_name());
        Self::with_config(registry, DispatcherConfig::with_name(name))
    }

    /// Create a writer with a custom consumer thread configuration.
    pub fn with_config(registry: Arc<ChannelRegistry>, config: DispatcherConfig) -> Result<Self> {
        let dispatcher = AsyncDispatcher::with_config(config)?;
        dispatcher.add_sink(registry);
        Ok(Self { dispatcher })
    }

    /// Entries accepted but not yet delivered.
    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }
}

impl LogWriter for AsyncLogWriter {
    fn write(&self, entry: Arc<LogEntry>) -> bool {
        self.dispatcher.submit(entry)
    }

    fn shutdown(&self) {
        self.dispatcher.shutdown();
    }
}
