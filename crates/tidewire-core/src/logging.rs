//! Framework instrumentation for Tidewire.
//!
//! Tidewire has two diagnostic layers. Application-facing log lines go through
//! the [`Logger`](crate::logger::Logger) and its channels. Low-level framework
//! events (a dispatcher batch drained, a timer fired, a poller thread started)
//! are emitted as `tracing` events under the targets listed here, so they stay
//! silent unless the application installs a subscriber:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("tidewire::endpoint=trace")
//!         .init();
//! }
//! ```

/// Target names for `tracing` filtering.
///
/// Use these with `tracing` directives to filter events by subsystem.
pub mod targets {
    /// Async dispatcher target (batch drains, sink failures).
    pub const DISPATCHER: &str = "tidewire::dispatcher";
    /// Clock service target.
    pub const CLOCK: &str = "tidewire::clock";
    /// Logger target (entries bridged by `TracingChannel`).
    pub const LOGGER: &str = "tidewire::logger";
    /// Event poller target (thread lifecycle, timers).
    pub const POLLER: &str = "tidewire::poller";
    /// Endpoint lifecycle target (connect, teardown, callbacks).
    pub const ENDPOINT: &str = "tidewire::endpoint";
}
