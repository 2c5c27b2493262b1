//! End-to-end test: endpoints reporting through an async logger.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Sender, unbounded};
use tidewire::net::{EndpointKind, EventPoller, PollerConfig};
use tidewire::prelude::*;

struct Journaled {
    logger: Arc<Logger>,
    done: Sender<SockErrorKind>,
}

impl EndpointHandler for Journaled {
    fn on_connect(&self, endpoint: &Endpoint<Self>, result: std::result::Result<(), &SockError>) {
        if result.is_ok() {
            log_info!(logger: &self.logger, "{} connected", endpoint.kind());
            let _ = endpoint.send("hello");
        }
    }

    fn on_recv(&self, endpoint: &Endpoint<Self>, data: Bytes) {
        log_debug!(logger: &self.logger, "{} received {} bytes", endpoint.kind(), data.len());
        if endpoint.kind() == EndpointKind::Session {
            let _ = endpoint.send(data);
        } else {
            endpoint.shutdown(SockError::shutdown("reply received"));
        }
    }

    fn on_error(&self, endpoint: &Endpoint<Self>, err: &SockError) {
        log_warn!(logger: &self.logger, "{} closed: {}", endpoint.kind(), err);
        let _ = self.done.send(err.kind());
    }
}

#[test]
fn test_client_server_conversation_is_logged() {
    let logger = Arc::new(Logger::new("integration"));
    let memory = Arc::new(MemoryChannel::new("memory", LogLevel::Debug).detail(false));
    logger.add(memory.clone());
    logger.enable_async().unwrap();

    let poller = EventPoller::new(PollerConfig::with_name("integration")).unwrap();
    let (done_tx, done_rx) = unbounded();

    let server_logger = logger.clone();
    let server_done = done_tx.clone();
    let server = TcpServer::with_poller(&poller, TcpServerConfig::new("127.0.0.1", 0), move |_| Journaled {
        logger: server_logger.clone(),
        done: server_done.clone(),
    });
    let addr = server.start().unwrap();

    let client = TcpClient::with_poller(
        &poller,
        Journaled {
            logger: logger.clone(),
            done: done_tx,
        },
        EndpointConfig::default(),
    );
    client.start_connect("127.0.0.1", addr.port(), Duration::from_secs(2)).unwrap();

    let kinds = [
        done_rx.recv_timeout(Duration::from_secs(3)).unwrap(),
        done_rx.recv_timeout(Duration::from_secs(3)).unwrap(),
    ];
    assert!(kinds.contains(&SockErrorKind::ShutdownRequested));
    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

    drop(client);
    drop(server);
    logger.shutdown();

    let lines = memory.take();
    assert!(lines.iter().any(|line| line.ends_with("client connected")));
    assert!(lines.iter().any(|line| line.contains("session received")));
    assert!(lines.iter().any(|line| line.ends_with("client closed: shutdown: reply received")));
    assert!(lines.iter().any(|line| line.contains(" W session closed: ")));
}
