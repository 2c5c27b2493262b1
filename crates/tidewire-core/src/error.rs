//! Error types for Tidewire core systems.

use std::io;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The main error type for core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A background thread (dispatcher consumer, clock sampler) could not be spawned.
    #[error("Failed to spawn thread '{name}': {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A sink refused or failed to deliver an item.
    #[error("Sink '{sink}' failed: {source}")]
    Sink {
        sink: String,
        #[source]
        source: SinkError,
    },

    /// Generic I/O failure (opening a log file, connecting to syslog).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Create a thread spawn error.
    pub fn thread_spawn(name: impl Into<String>, source: io::Error) -> Self {
        Self::ThreadSpawn {
            name: name.into(),
            source,
        }
    }

    /// Wrap a sink failure with the name of the sink that produced it.
    pub fn sink(sink: impl Into<String>, source: SinkError) -> Self {
        Self::Sink {
            sink: sink.into(),
            source,
        }
    }
}

/// Error returned by a sink for a single delivery.
///
/// A failing delivery never stops a dispatcher or a logger: the error is
/// reported and the next sink / item proceeds.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing to the underlying destination failed.
    #[error("write failed: {0}")]
    Io(#[from] io::Error),

    /// The sink rejected the item.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl SinkError {
    /// Create a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Result of delivering one item to one sink.
pub type SinkResult = std::result::Result<(), SinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::rejected("queue closed");
        assert_eq!(err.to_string(), "rejected: queue closed");

        let wrapped = CoreError::sink("console", err);
        assert_eq!(wrapped.to_string(), "Sink 'console' failed: rejected: queue closed");
    }

    #[test]
    fn test_io_conversion() {
        let err: SinkError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, SinkError::Io(_)));
    }
}
