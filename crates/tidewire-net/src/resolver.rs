//! Host name resolution used by [`TcpClient`](crate::TcpClient).

use std::io;
use std::net::{IpAddr, SocketAddr};

use futures_util::future::BoxFuture;

/// Future returned by a [`Resolver`].
pub type ResolveFuture = BoxFuture<'static, io::Result<Vec<SocketAddr>>>;

/// Turns a host and port into candidate socket addresses.
pub trait Resolver: Send + Sync + 'static {
    fn resolve(&self, host: &str, port: u16) -> ResolveFuture;
}

/// Resolves through the operating system (`getaddrinfo`).
///
/// Literal IP addresses are returned without a lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> ResolveFuture {
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        Box::pin(async move {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return Ok(vec![SocketAddr::new(ip, port)]);
            }
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port)).await?.collect();
            if addrs.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses found for {host}"),
                ));
            }
            Ok(addrs)
        })
    }
}
