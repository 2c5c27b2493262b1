//! Logging macros.
//!
//! Each macro expands to a [`LogBuilder`](crate::logger::LogBuilder) that
//! carries the call site's file, function and line. The builder is returned,
//! so it is written when the statement ends, or later if it is bound to a
//! variable and appended to.

/// Name of the enclosing function, as a full path.
#[doc(hidden)]
#[macro_export]
macro_rules! function_name {
    () => {{
        fn __tidewire_here() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(__tidewire_here);
        name.strip_suffix("::__tidewire_here").unwrap_or(name)
    }};
}

/// Build a log entry at an explicit level.
///
/// ```
/// use tidewire_core::logger::LogLevel;
///
/// tidewire_core::log_at!(LogLevel::Debug, "value = {}", 3);
/// ```
#[macro_export]
macro_rules! log_at {
    (logger: $logger:expr, $level:expr) => {
        $crate::logger::LogBuilder::new(
            $logger,
            $level,
            $crate::logger::SourceLocation::new(file!(), $crate::function_name!(), line!()),
        )
    };
    (logger: $logger:expr, $level:expr, $($arg:tt)+) => {{
        let mut builder = $crate::log_at!(logger: $logger, $level);
        builder.append(format_args!($($arg)+));
        builder
    }};
    ($level:expr) => {
        $crate::log_at!(logger: $crate::logger::default_logger(), $level)
    };
    ($level:expr, $($arg:tt)+) => {
        $crate::log_at!(logger: $crate::logger::default_logger(), $level, $($arg)+)
    };
}

/// Log at trace level.
#[macro_export]
macro_rules! log_trace {
    (logger: $logger:expr) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Trace) };
    (logger: $logger:expr, $($arg:tt)+) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Trace, $($arg)+) };
    () => { $crate::log_at!($crate::logger::LogLevel::Trace) };
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::LogLevel::Trace, $($arg)+) };
}

/// Log at debug level.
#[macro_export]
macro_rules! log_debug {
    (logger: $logger:expr) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Debug) };
    (logger: $logger:expr, $($arg:tt)+) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Debug, $($arg)+) };
    () => { $crate::log_at!($crate::logger::LogLevel::Debug) };
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::LogLevel::Debug, $($arg)+) };
}

/// Log at info level.
#[macro_export]
macro_rules! log_info {
    (logger: $logger:expr) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Info) };
    (logger: $logger:expr, $($arg:tt)+) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Info, $($arg)+) };
    () => { $crate::log_at!($crate::logger::LogLevel::Info) };
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::LogLevel::Info, $($arg)+) };
}

/// Log at warn level.
#[macro_export]
macro_rules! log_warn {
    (logger: $logger:expr) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Warn) };
    (logger: $logger:expr, $($arg:tt)+) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Warn, $($arg)+) };
    () => { $crate::log_at!($crate::logger::LogLevel::Warn) };
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::LogLevel::Warn, $($arg)+) };
}

/// Log at error level.
#[macro_export]
macro_rules! log_error {
    (logger: $logger:expr) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Error) };
    (logger: $logger:expr, $($arg:tt)+) => { $crate::log_at!(logger: $logger, $crate::logger::LogLevel::Error, $($arg)+) };
    () => { $crate::log_at!($crate::logger::LogLevel::Error) };
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::LogLevel::Error, $($arg)+) };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::logger::{LogLevel, Logger, MemoryChannel};

    #[test]
    fn test_function_name() {
        let name = crate::function_name!();
        assert!(name.ends_with("test_function_name"));
    }

    #[test]
    fn test_macro_captures_location() {
        let logger = Logger::new("");
        let memory = Arc::new(MemoryChannel::new("memory", LogLevel::Trace));
        logger.add(memory.clone());

        crate::log_error!(logger: &logger, "failed: {}", 5);

        let line = memory.take().remove(0);
        assert!(line.contains(" E macros.rs:"));
        assert!(line.contains(" test_macro_captures_location | failed: 5"));
    }

    #[test]
    fn test_bare_macro_writes_nothing() {
        let logger = Logger::new("bare");
        let memory = Arc::new(MemoryChannel::new("memory", LogLevel::Trace));
        logger.add(memory.clone());

        crate::log_info!(logger: &logger);
        assert!(memory.is_empty());

        crate::log_info!(logger: &logger).append("streamed");
        assert_eq!(memory.len(), 1);
    }
}
