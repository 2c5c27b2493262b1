use std::io::{self, IsTerminal, Write};

use crate::error::SinkResult;
use crate::logger::{ChannelBase, LogChannel, LogEntry, LogFormat, LogLevel};

/// Writes formatted lines to standard output.
///
/// Color is enabled by default when stdout is a terminal.
#[derive(Debug)]
pub struct ConsoleChannel {
    base: ChannelBase,
    color: bool,
    detail: bool,
}

impl ConsoleChannel {
    pub fn new(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            base: ChannelBase::new(name, level),
            color: io::stdout().is_terminal(),
            detail: true,
        }
    }

    /// Enable or disable ANSI colors.
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Include logger name and source location in each line.
    pub fn detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new("console", LogLevel::Trace)
    }
}

impl LogChannel for ConsoleChannel {
    fn base(&self) -> &ChannelBase {
        &self.base
    }

    fn write(&self, logger_name: &str, entry: &LogEntry) -> SinkResult {
        if let Some(line) = LogFormat::format(logger_name, entry, self.color, self.detail) {
            let mut out = io::stdout().lock();
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}
