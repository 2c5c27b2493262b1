//! Networking module for Tidewire.
//!
//! This crate provides callback-driven TCP endpoints on top of event pollers:
//!
//! - **EventPoller**: a single-threaded reactor with one-shot and repeating timers
//! - **TcpClient**: a one-shot connecting endpoint with a connect deadline
//! - **Session**: an endpoint built from an accepted stream
//! - **TcpServer**: an acceptor that spreads sessions over a poller pool
//!
//! Every endpoint delivers its events to an [`EndpointHandler`]. The
//! lifecycle contract is the same for clients and sessions: teardown runs
//! once however many threads request it, `on_error` fires at most once, and
//! no hook runs after teardown.
//!
//! # Echo Server
//!
//! ```no_run
//! use bytes::Bytes;
//! use tidewire_net::{Endpoint, EndpointHandler, SockError, TcpServer, TcpServerConfig};
//!
//! struct Echo;
//!
//! impl EndpointHandler for Echo {
//!     fn on_recv(&self, endpoint: &Endpoint<Self>, data: Bytes) {
//!         let _ = endpoint.send(data);
//!     }
//!
//!     fn on_error(&self, endpoint: &Endpoint<Self>, err: &SockError) {
//!         println!("{} closed: {}", endpoint.identifier(), err);
//!     }
//! }
//!
//! let server = TcpServer::new(TcpServerConfig::new("127.0.0.1", 9000), |_| Echo).unwrap();
//! server.start().unwrap();
//! ```
//!
//! # Client
//!
//! ```no_run
//! use std::time::Duration;
//! use tidewire_net::{Endpoint, EndpointHandler, SockError, TcpClient};
//!
//! struct Pinger;
//!
//! impl EndpointHandler for Pinger {
//!     fn on_connect(&self, endpoint: &Endpoint<Self>, result: Result<(), &SockError>) {
//!         match result {
//!             Ok(()) => println!("{} connected", endpoint.identifier()),
//!             Err(err) => println!("{} failed: {}", endpoint.identifier(), err),
//!         }
//!     }
//!
//!     fn on_manager(&self, endpoint: &Endpoint<Self>) {
//!         let _ = endpoint.send("ping\n");
//!     }
//! }
//!
//! let client = TcpClient::new(Pinger).unwrap();
//! client.set_net_adapter("0.0.0.0").unwrap();
//! client.start_connect("localhost", 9000, Duration::from_secs(3)).unwrap();
//! ```

pub mod client;
pub mod config;
pub mod endpoint;
mod error;
pub mod poller;
pub mod resolver;
pub mod server;
pub mod session;
pub mod socket;
pub mod state;

pub use client::TcpClient;
pub use config::{EndpointConfig, MIN_MANAGER_INTERVAL, TcpServerConfig};
pub use endpoint::{Endpoint, EndpointHandler};
pub use error::{NetError, Result, SockError, SockErrorKind};
pub use poller::{EventPoller, EventPollerPool, PollerConfig, Timer, TimerId};
pub use resolver::{ResolveFuture, Resolver, SystemResolver};
pub use server::{ServerContext, TcpServer};
pub use session::Session;
pub use socket::Socket;
pub use state::{EndpointId, EndpointKind, EndpointState, GuardState, ShutdownGuard};

static_assertions::assert_impl_all!(EventPoller: Send, Sync);
static_assertions::assert_impl_all!(EventPollerPool: Send, Sync);
static_assertions::assert_impl_all!(Socket: Send, Sync);
static_assertions::assert_impl_all!(ShutdownGuard: Send, Sync);
