use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;

use super::{LogEntry, LogLevel};
use crate::dispatcher::DispatchSink;
use crate::error::SinkResult;
use crate::logging::targets;

/// Name and threshold shared by every channel implementation.
#[derive(Debug)]
pub struct ChannelBase {
    name: String,
    level: AtomicU8,
}

impl ChannelBase {
    pub fn new(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            name: name.into(),
            level: AtomicU8::new(level as u8),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }
}

/// A named, level-filtered log destination.
///
/// Implementors only provide [`base`](Self::base) and [`write`](Self::write);
/// the registry calls [`enabled`](Self::enabled) before `write`, so `write`
/// never sees an entry below the channel's threshold.
pub trait LogChannel: Send + Sync {
    /// Shared name/threshold state.
    fn base(&self) -> &ChannelBase;

    /// Write one entry produced by the logger called `logger_name`.
    fn write(&self, logger_name: &str, entry: &LogEntry) -> SinkResult;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn level(&self) -> LogLevel {
        self.base().level()
    }

    fn set_level(&self, level: LogLevel) {
        self.base().set_level(level);
    }

    /// Check whether an entry of `level` passes this channel's threshold.
    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }
}

/// The name-to-channel mapping owned by a [`Logger`](super::Logger).
///
/// Channels receive entries in registration order. Re-adding a name replaces
/// the channel in its original slot. The registry is reference counted so an async writer can deliver into it
/// without holding the logger itself.
pub struct ChannelRegistry {
    logger_name: String,
    channels: RwLock<Vec<Arc<dyn LogChannel>>>,
}

impl ChannelRegistry {
    pub fn new(logger_name: impl Into<String>) -> Self {
        Self {
            logger_name: logger_name.into(),
            channels: RwLock::new(Vec::new()),
        }
    }

    /// Name of the owning logger.
    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    /// Insert a channel under its own name, returning any channel it replaced.
    pub fn add(&self, channel: Arc<dyn LogChannel>) -> Option<Arc<dyn LogChannel>> {
        let mut channels = self.channels.write();
        match channels.iter_mut().find(|c| c.name() == channel.name()) {
            Some(slot) => Some(std::mem::replace(slot, channel)),
            None => {
                channels.push(channel);
                None
            }
        }
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn LogChannel>> {
        let mut channels = self.channels.write();
        let index = channels.iter().position(|c| c.name() == name)?;
        Some(channels.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LogChannel>> {
        self.channels.read().iter().find(|c| c.name() == name).cloned()
    }

    /// Registered channel names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.channels.read().iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Set every registered channel's threshold.
    pub fn set_level(&self, level: LogLevel) {
        for channel in self.channels.read().iter() {
            channel.set_level(level);
        }
    }

    /// Deliver an entry to every channel whose threshold admits it.
    ///
    /// A failing channel is reported and skipped.
    pub fn dispatch(&self, entry: &LogEntry) {
        let channels: Vec<Arc<dyn LogChannel>> = self.channels.read().clone();
        for channel in channels {
            if !channel.enabled(entry.level()) {
                continue;
            }
            if let Err(err) = channel.write(&self.logger_name, entry) {
                tracing::warn!(
                    target: targets::LOGGER,
                    logger = %self.logger_name,
                    channel = channel.name(),
                    error = %err,
                    "log channel write failed"
                );
            }
        }
    }
}

impl DispatchSink<Arc<LogEntry>> for ChannelRegistry {
    fn deliver(&self, item: &Arc<LogEntry>) -> SinkResult {
        self.dispatch(item);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.logger_name
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("logger_name", &self.logger_name)
            .field("channels", &self.names())
            .finish()
    }
}
