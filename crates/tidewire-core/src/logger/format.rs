use std::fmt::Write as _;

use super::{LogEntry, LogLevel};
use crate::clock::format_wall_time;

const CLEAR_COLOR: &str = "\x1b[0m";

/// Formats log entries into text lines.
///
/// Detail mode:
/// `<timestamp> <letter> <logger><file>:<line> <function> | <message>`
///
/// Terse mode:
/// `<timestamp> <letter> <message>`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFormat;

impl LogFormat {
    /// ANSI color prefix for a level.
    pub fn color_code(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Trace => "\x1b[34m",
            LogLevel::Debug => "\x1b[32m",
            LogLevel::Info => "\x1b[36m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
        }
    }

    /// Format one entry without a trailing newline.
    ///
    /// Returns `None` in terse mode when the message is empty, since there is
    /// nothing to print.
    pub fn format(logger_name: &str, entry: &LogEntry, color: bool, detail: bool) -> Option<String> {
        if !detail && entry.message().is_empty() {
            return None;
        }

        let mut line = String::with_capacity(64 + entry.message().len());
        if color {
            line.push_str(Self::color_code(entry.level()));
        }

        line.push_str(&format_wall_time(entry.wall_micros()));
        line.push(' ');
        line.push(entry.level().letter());
        line.push(' ');

        if detail {
            let loc = entry.location();
            let _ = write!(
                line,
                "{logger_name}{}:{} {} | ",
                loc.file(),
                loc.line(),
                loc.function()
            );
        }

        line.push_str(entry.message());

        if color {
            line.push_str(CLEAR_COLOR);
        }
        Some(line)
    }
}
