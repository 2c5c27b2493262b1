use std::fmt::{self, Write as _};

use super::{LogLevel, Logger};
use crate::clock::ClockService;

/// Shortened origin of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    file: &'static str,
    function: &'static str,
    line: u32,
}

impl SourceLocation {
    /// Build a location, keeping only the last path segment of `file` and
    /// the last path component of `function`.
    ///
    /// Closure suffixes such as `::{{closure}}` are stripped from the
    /// function path before it is shortened.
    pub fn new(file: &'static str, function: &'static str, line: u32) -> Self {
        let file = file.rsplit(['/', '\\']).next().unwrap_or(file);

        let mut function = function;
        while let Some(stripped) = function.strip_suffix("::{{closure}}") {
            function = stripped;
        }
        let function = function.rsplit("::").next().unwrap_or(function);

        Self { file, function, line }
    }

    /// File name without directories.
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Function name without its module path.
    pub fn function(&self) -> &'static str {
        self.function
    }

    /// Line number.
    pub fn line(&self) -> u32 {
        self.line
    }
}

/// A finalized log record.
///
/// Entries are immutable once a [`LogBuilder`] hands them to a [`Logger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    level: LogLevel,
    location: SourceLocation,
    elapsed_micros: u64,
    wall_micros: u64,
    message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current global clock readings.
    pub fn new(level: LogLevel, location: SourceLocation, message: impl Into<String>) -> Self {
        let clock = ClockService::global();
        Self {
            level,
            location,
            elapsed_micros: clock.elapsed_micros(),
            wall_micros: clock.wall_micros(),
            message: message.into(),
        }
    }

    /// Create an entry with explicit timestamps.
    pub fn with_timestamps(
        level: LogLevel,
        location: SourceLocation,
        elapsed_micros: u64,
        wall_micros: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            location,
            elapsed_micros,
            wall_micros,
            message: message.into(),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Elapsed clock reading when the entry was created.
    pub fn elapsed_micros(&self) -> u64 {
        self.elapsed_micros
    }

    /// Wall clock reading when the entry was created.
    pub fn wall_micros(&self) -> u64 {
        self.wall_micros
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Accumulates one log entry and hands it to a [`Logger`] exactly once.
///
/// The entry is created on the first [`append`](Self::append), which also
/// captures its timestamps. It is written when [`finish`](Self::finish) is
/// called or when the builder is dropped, whichever comes first. Appends after
/// that are ignored. A builder that was never appended to writes nothing.
///
/// The `log_*!` macros return a builder, so further content can be streamed in:
///
/// ```
/// use std::sync::Arc;
/// use tidewire_core::logger::{LogLevel, Logger, MemoryChannel};
///
/// let logger = Logger::new("demo");
/// let memory = Arc::new(MemoryChannel::new("memory", LogLevel::Trace).detail(false));
/// logger.add(memory.clone());
///
/// {
///     let mut builder = tidewire_core::log_info!(logger: &logger, "answer");
///     builder.append(" = ").append(42);
/// }
///
/// assert!(memory.lines()[0].ends_with("I answer = 42"));
/// ```
pub struct LogBuilder<'a> {
    logger: &'a Logger,
    level: LogLevel,
    location: SourceLocation,
    entry: Option<LogEntry>,
    finished: bool,
}

impl<'a> LogBuilder<'a> {
    /// Start a builder targeting `logger`.
    pub fn new(logger: &'a Logger, level: LogLevel, location: SourceLocation) -> Self {
        Self {
            logger,
            level,
            location,
            entry: None,
            finished: false,
        }
    }

    /// Append displayable content to the message.
    pub fn append(&mut self, value: impl fmt::Display) -> &mut Self {
        if self.finished {
            return self;
        }
        let entry = self
            .entry
            .get_or_insert_with(|| LogEntry::new(self.level, self.location, String::new()));
        // Writing into a String cannot fail.
        let _ = write!(entry.message, "{value}");
        self
    }

    /// Write the entry now. Later calls and appends do nothing.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(entry) = self.entry.take() {
            self.logger.write(entry);
        }
    }

    /// Discard the accumulated entry without writing it.
    pub fn clear(&mut self) {
        self.finished = true;
        self.entry = None;
    }

    /// Check whether the builder has already been finalized.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl fmt::Write for LogBuilder<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append(s);
        Ok(())
    }
}

impl Drop for LogBuilder<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for LogBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuilder")
            .field("logger", &self.logger.name())
            .field("level", &self.level)
            .field("location", &self.location)
            .field("finished", &self.finished)
            .finish()
    }
}
