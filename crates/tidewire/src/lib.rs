//! Tidewire - callback-driven TCP endpoints and an asynchronous logging pipeline.
//!
//! This is the main umbrella crate that re-exports all public APIs.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tidewire::prelude::*;
//!
//! struct Pinger;
//!
//! impl EndpointHandler for Pinger {
//!     fn on_connect(&self, endpoint: &Endpoint<Self>, result: std::result::Result<(), &SockError>) {
//!         match result {
//!             Ok(()) => {
//!                 log_info!("{} connected to {:?}", endpoint.identifier(), endpoint.peer_addr());
//!             }
//!             Err(err) => {
//!                 log_warn!("{} failed: {}", endpoint.identifier(), err);
//!             }
//!         }
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     default_logger().enable_async()?;
//!
//!     let client = TcpClient::new(Pinger)?;
//!     client.start_connect("localhost", 9000, Duration::from_secs(3))?;
//!     std::thread::sleep(Duration::from_secs(1));
//!
//!     drop(client);
//!     shutdown_default_logger();
//!     Ok(())
//! }
//! ```

pub use tidewire_core::*;

/// Networking module.
#[cfg(feature = "networking")]
pub mod net {
    pub use tidewire_net::*;
}

pub mod prelude;
