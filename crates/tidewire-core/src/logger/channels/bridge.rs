use crate::error::SinkResult;
use crate::logger::{ChannelBase, LogChannel, LogEntry, LogLevel};
use crate::logging::targets;

/// Forwards entries to `tracing` under the `tidewire::logger` target.
///
/// Install this channel when the application already runs a tracing
/// subscriber and wants logger output to flow through it.
#[derive(Debug)]
pub struct TracingChannel {
    base: ChannelBase,
}

impl TracingChannel {
    pub fn new(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            base: ChannelBase::new(name, level),
        }
    }
}

impl LogChannel for TracingChannel {
    fn base(&self) -> &ChannelBase {
        &self.base
    }

    fn write(&self, logger_name: &str, entry: &LogEntry) -> SinkResult {
        let loc = entry.location();
        let (file, line, function, message) = (loc.file(), loc.line(), loc.function(), entry.message());
        match entry.level() {
            LogLevel::Trace => {
                tracing::trace!(target: targets::LOGGER, logger = logger_name, file, line, function, "{message}")
            }
            LogLevel::Debug => {
                tracing::debug!(target: targets::LOGGER, logger = logger_name, file, line, function, "{message}")
            }
            LogLevel::Info => {
                tracing::info!(target: targets::LOGGER, logger = logger_name, file, line, function, "{message}")
            }
            LogLevel::Warn => {
                tracing::warn!(target: targets::LOGGER, logger = logger_name, file, line, function, "{message}")
            }
            LogLevel::Error => {
                tracing::error!(target: targets::LOGGER, logger = logger_name, file, line, function, "{message}")
            }
        }
        Ok(())
    }
}
