//! Tests for TCP clients, sessions and servers over loopback.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};
use tidewire_net::{
    Endpoint, EndpointConfig, EndpointHandler, EndpointState, EventPoller, NetError, PollerConfig,
    ResolveFuture, Resolver, Session, SockError, SockErrorKind, TcpClient, TcpServer, TcpServerConfig,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Connect(Option<SockErrorKind>),
    Recv(Bytes),
    Flush,
    Error(SockErrorKind),
    Manager,
}

struct Recorder {
    tx: Sender<Event>,
}

impl Recorder {
    fn new() -> (Self, Receiver<Event>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl EndpointHandler for Recorder {
    fn on_connect(&self, _endpoint: &Endpoint<Self>, result: Result<(), &SockError>) {
        let _ = self.tx.send(Event::Connect(result.err().map(SockError::kind)));
    }

    fn on_recv(&self, _endpoint: &Endpoint<Self>, data: Bytes) {
        let _ = self.tx.send(Event::Recv(data));
    }

    fn on_flush(&self, _endpoint: &Endpoint<Self>) {
        let _ = self.tx.send(Event::Flush);
    }

    fn on_error(&self, _endpoint: &Endpoint<Self>, err: &SockError) {
        let _ = self.tx.send(Event::Error(err.kind()));
    }

    fn on_manager(&self, _endpoint: &Endpoint<Self>) {
        let _ = self.tx.send(Event::Manager);
    }
}

/// Echoes data back and counts terminal notifications.
struct Echo {
    errors: Arc<AtomicUsize>,
    kinds: Sender<SockErrorKind>,
}

impl EndpointHandler for Echo {
    fn on_recv(&self, endpoint: &Endpoint<Self>, data: Bytes) {
        let _ = endpoint.send(data);
    }

    fn on_error(&self, _endpoint: &Endpoint<Self>, err: &SockError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let _ = self.kinds.send(err.kind());
    }
}

/// Closes its own session from inside `on_recv`.
struct CloseOnRecv {
    kinds: Sender<SockErrorKind>,
}

impl EndpointHandler for CloseOnRecv {
    fn on_recv(&self, endpoint: &Endpoint<Self>, _data: Bytes) {
        endpoint.shutdown(SockError::shutdown("bye"));
        assert!(!endpoint.alive());
    }

    fn on_error(&self, _endpoint: &Endpoint<Self>, err: &SockError) {
        let _ = self.kinds.send(err.kind());
    }
}

struct PendingResolver;

impl Resolver for PendingResolver {
    fn resolve(&self, _host: &str, _port: u16) -> ResolveFuture {
        Box::pin(futures_util::future::pending::<io::Result<Vec<SocketAddr>>>())
    }
}

fn poller(name: &str) -> Arc<EventPoller> {
    EventPoller::new(PollerConfig::with_name(name)).unwrap()
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn echo_server(poller: &Arc<EventPoller>) -> (TcpServer<Echo>, SocketAddr, Arc<AtomicUsize>, Receiver<SockErrorKind>) {
    let errors = Arc::new(AtomicUsize::new(0));
    let (kinds_tx, kinds_rx) = unbounded();
    let counter = errors.clone();
    let server = TcpServer::with_poller(poller, TcpServerConfig::new("127.0.0.1", 0), move |_| Echo {
        errors: counter.clone(),
        kinds: kinds_tx.clone(),
    });
    let addr = server.start().unwrap();
    (server, addr, errors, kinds_rx)
}

fn connected_client(
    poller: &Arc<EventPoller>,
    addr: SocketAddr,
    config: EndpointConfig,
) -> (TcpClient<Recorder>, Receiver<Event>) {
    let (recorder, rx) = Recorder::new();
    let client = TcpClient::with_poller(poller, recorder, config);
    client
        .start_connect(&addr.ip().to_string(), addr.port(), Duration::from_secs(2))
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Event::Connect(None));
    (client, rx)
}

#[test]
fn test_config_builders() {
    let endpoint = EndpointConfig::new()
        .manager_interval(Duration::from_millis(250))
        .read_buffer_size(1024)
        .no_delay(true);
    assert_eq!(endpoint.manager_interval, Duration::from_millis(250));
    assert_eq!(endpoint.read_buffer_size, 1024);
    assert!(endpoint.no_delay);

    let server = TcpServerConfig::new("0.0.0.0", 9000)
        .endpoint(endpoint)
        .manager_interval(Duration::from_secs(5));
    assert_eq!(server.bind_addr(), "0.0.0.0:9000");
    assert_eq!(server.endpoint.manager_interval, Duration::from_secs(5));
    assert!(server.endpoint.no_delay);
}

#[test]
fn test_identifiers_are_unique() {
    let poller = poller("ids");
    let (a, _) = Recorder::new();
    let (b, _) = Recorder::new();
    let first = TcpClient::with_poller(&poller, a, EndpointConfig::default());
    let second = TcpClient::with_poller(&poller, b, EndpointConfig::default());

    assert_ne!(first.identifier(), second.identifier());
    assert!(first.identifier().starts_with("client-"));
    assert_eq!(first.state(), EndpointState::Idle);
    assert!(!first.alive());
}

#[test]
fn test_session_identifiers_are_unique() {
    let poller = poller("session-ids");
    let (server, addr, _errors, _kinds) = echo_server(&poller);
    let (_first, _) = connected_client(&poller, addr, EndpointConfig::default());
    let (_second, _) = connected_client(&poller, addr, EndpointConfig::default());
    assert!(wait_until(Duration::from_secs(2), || server.session_count() == 2));

    let sessions: Vec<_> = server
        .sessions()
        .into_iter()
        .filter_map(|id| server.get_session(id))
        .collect();
    assert_eq!(sessions.len(), 2);
    assert!(wait_until(Duration::from_secs(2), || sessions.iter().all(Session::alive)));

    let identifiers: Vec<String> = sessions.iter().map(Session::identifier).collect();
    assert_ne!(identifiers[0], identifiers[1]);
    assert!(identifiers.iter().all(|id| id.starts_with("session-")));
    assert_ne!(sessions[0].peer_addr(), sessions[1].peer_addr());
}

#[test]
fn test_connect_timeout_with_unresolvable_host() {
    let poller = poller("timeout");
    let (recorder, rx) = Recorder::new();
    let client = TcpClient::with_poller(&poller, recorder, EndpointConfig::default())
        .with_resolver(Arc::new(PendingResolver));

    let started = Instant::now();
    client
        .start_connect("never.resolves.test", 80, Duration::from_secs(1))
        .unwrap();
    assert_eq!(client.state(), EndpointState::Connecting);

    let event = rx.recv_timeout(Duration::from_secs(3)).unwrap();
    let elapsed = started.elapsed();
    assert_eq!(event, Event::Connect(Some(SockErrorKind::ConnectTimeout)));
    assert!(elapsed >= Duration::from_millis(950), "fired after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1800), "fired after {elapsed:?}");

    assert!(!client.alive());
    assert_eq!(client.state(), EndpointState::Closed);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_connect_refused_through_adapter() {
    let poller = poller("refused");
    let port = closed_port();
    let (recorder, rx) = Recorder::new();
    let client = TcpClient::with_poller(&poller, recorder, EndpointConfig::default());
    client.set_net_adapter("127.0.0.1").unwrap();

    client.start_connect("127.0.0.1", port, Duration::from_secs(5)).unwrap();
    let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event, Event::Connect(Some(SockErrorKind::ConnectRefused)));
    assert!(!client.alive());

    // Already torn down: nothing more is delivered.
    client.shutdown(SockError::shutdown("again"));
    assert!(matches!(
        client.start_connect("127.0.0.1", port, Duration::from_secs(1)),
        Err(NetError::AlreadyStarted)
    ));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_invalid_adapter() {
    let poller = poller("adapter");
    let (recorder, _rx) = Recorder::new();
    let client = TcpClient::with_poller(&poller, recorder, EndpointConfig::default());
    assert!(matches!(
        client.set_net_adapter("eth0"),
        Err(NetError::InvalidAdapter(name)) if name == "eth0"
    ));
}

#[test]
fn test_idle_shutdown_is_silent() {
    let poller = poller("idle");
    let (recorder, rx) = Recorder::new();
    let client = TcpClient::with_poller(&poller, recorder, EndpointConfig::default());

    client.shutdown(SockError::shutdown("never started"));
    assert_eq!(client.state(), EndpointState::Closed);
    assert!(client.send("x").is_err());
    drop(client);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_echo_round_trip() {
    let poller = poller("echo");
    let (server, addr, errors, kinds) = echo_server(&poller);
    let (client, rx) = connected_client(&poller, addr, EndpointConfig::default());

    assert!(client.alive());
    assert_eq!(client.peer_addr(), Some(addr));
    client.send("hello").unwrap();

    let mut echoed = Vec::new();
    while echoed.len() < 5 {
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            Event::Recv(data) => echoed.extend_from_slice(&data),
            Event::Flush | Event::Manager => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(echoed, b"hello");
    assert_eq!(server.session_count(), 1);

    drop(client);
    assert_eq!(kinds.recv_timeout(Duration::from_secs(2)).unwrap(), SockErrorKind::PeerClosed);
    assert!(wait_until(Duration::from_secs(2), || server.session_count() == 0));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[test]
fn test_flush_after_send() {
    let poller = poller("flush");
    let (_server, addr, _errors, _kinds) = echo_server(&poller);
    let (client, rx) = connected_client(&poller, addr, EndpointConfig::default());

    client.send(Bytes::from_static(b"ping")).unwrap();
    let flushed = (0..10).any(|_| matches!(rx.recv_timeout(Duration::from_secs(1)), Ok(Event::Flush)));
    assert!(flushed);
}

#[test]
fn test_manager_fires_while_connected() {
    let poller = poller("manager");
    let (_server, addr, _errors, _kinds) = echo_server(&poller);
    let config = EndpointConfig::new().manager_interval(Duration::from_millis(50));
    let (client, rx) = connected_client(&poller, addr, config);

    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Event::Manager);
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Event::Manager);

    client.shutdown(SockError::shutdown("done"));
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        Event::Error(SockErrorKind::ShutdownRequested)
    );
    // No hook runs after teardown.
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_concurrent_safe_shutdown_fires_once() {
    let poller = poller("safe-shutdown");
    let (server, addr, errors, kinds) = echo_server(&poller);
    let (_client, _rx) = connected_client(&poller, addr, EndpointConfig::default());

    assert!(wait_until(Duration::from_secs(2), || server.session_count() == 1));
    let id = server.sessions()[0];
    let session = server.get_session(id).unwrap();
    assert!(session.identifier().starts_with("session-"));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let session = session.clone();
            thread::spawn(move || {
                if i % 2 == 0 {
                    session.safe_shutdown(SockError::shutdown(format!("worker {i}")));
                } else {
                    session.shutdown(SockError::shutdown(format!("worker {i}")));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(kinds.recv_timeout(Duration::from_secs(2)).unwrap(), SockErrorKind::ShutdownRequested);
    assert!(wait_until(Duration::from_secs(2), || server.session_count() == 0));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert!(!session.alive());
}

#[test]
fn test_hook_may_shut_down_its_own_endpoint() {
    let poller = poller("reentrant");
    let (kinds_tx, kinds_rx) = unbounded();
    let server = TcpServer::with_poller(&poller, TcpServerConfig::new("127.0.0.1", 0), move |_| CloseOnRecv {
        kinds: kinds_tx.clone(),
    });
    let addr = server.start().unwrap();
    let (client, rx) = connected_client(&poller, addr, EndpointConfig::default());

    client.send("trigger").unwrap();
    assert_eq!(kinds_rx.recv_timeout(Duration::from_secs(2)).unwrap(), SockErrorKind::ShutdownRequested);
    assert!(kinds_rx.recv_timeout(Duration::from_millis(100)).is_err());

    let closed = (0..10).any(|_| matches!(rx.recv_timeout(Duration::from_secs(1)), Ok(Event::Error(_))));
    assert!(closed);
}

#[test]
fn test_server_stop_shuts_down_sessions() {
    let poller = poller("stop");
    let (server, addr, errors, kinds) = echo_server(&poller);
    let (_client, rx) = connected_client(&poller, addr, EndpointConfig::default());
    assert!(wait_until(Duration::from_secs(2), || server.session_count() == 1));

    server.stop();
    assert!(!server.is_listening());
    assert_eq!(kinds.recv_timeout(Duration::from_secs(2)).unwrap(), SockErrorKind::ShutdownRequested);
    assert_eq!(server.session_count(), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    let peer_closed = (0..10).any(|_| {
        matches!(
            rx.recv_timeout(Duration::from_secs(1)),
            Ok(Event::Error(SockErrorKind::PeerClosed))
        )
    });
    assert!(peer_closed);
}

#[test]
fn test_server_start_twice() {
    let poller = poller("twice");
    let (server, addr, _errors, _kinds) = echo_server(&poller);
    assert_eq!(server.local_addr(), Some(addr));
    assert!(matches!(server.start(), Err(NetError::AlreadyStarted)));
}
