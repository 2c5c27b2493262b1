//! Built-in log channels.

mod bridge;
mod console;
mod file;
mod memory;
#[cfg(unix)]
mod syslog;

pub use bridge::TracingChannel;
pub use console::ConsoleChannel;
pub use file::FileChannel;
pub use memory::MemoryChannel;
#[cfg(unix)]
pub use syslog::SyslogChannel;
