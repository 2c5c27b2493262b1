use parking_lot::Mutex;

use crate::error::SinkResult;
use crate::logger::{ChannelBase, LogChannel, LogEntry, LogFormat, LogLevel};

/// Keeps formatted lines in memory.
///
/// Useful for capturing output in tests or for embedding applications that
/// render logs themselves.
#[derive(Debug)]
pub struct MemoryChannel {
    base: ChannelBase,
    lines: Mutex<Vec<String>>,
    detail: bool,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            base: ChannelBase::new(name, level),
            lines: Mutex::new(Vec::new()),
            detail: true,
        }
    }

    /// Include logger name and source location in each line.
    pub fn detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }

    /// Snapshot of the captured lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Remove and return the captured lines.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl LogChannel for MemoryChannel {
    fn base(&self) -> &ChannelBase {
        &self.base
    }

    fn write(&self, logger_name: &str, entry: &LogEntry) -> SinkResult {
        if let Some(line) = LogFormat::format(logger_name, entry, false, self.detail) {
            self.lines.lock().push(line);
        }
        Ok(())
    }
}
