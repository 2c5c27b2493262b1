//! Server-side endpoints.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::net::TcpStream;

use crate::config::EndpointConfig;
use crate::endpoint::{CloseNotifier, Endpoint, EndpointHandler};
use crate::error::{NetError, Result, SockError};
use crate::poller::EventPoller;
use crate::state::{EndpointId, EndpointKind, EndpointState};

/// An endpoint created from an already-connected stream.
///
/// A session starts in the `Connected` state, so it never receives
/// `on_connect`, but it is not [`alive`](Self::alive) until its stream has
/// been installed on the poller thread. Clones share the same endpoint.
pub struct Session<H: EndpointHandler> {
    endpoint: Arc<Endpoint<H>>,
}

impl<H: EndpointHandler> Clone for Session<H> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
        }
    }
}

impl<H: EndpointHandler> Session<H> {
    /// Bind an accepted stream to `poller`.
    ///
    /// I/O starts on the poller thread; `on_recv` and `on_manager` follow
    /// from there.
    pub fn attach(
        poller: &Arc<EventPoller>,
        stream: std::net::TcpStream,
        handler: H,
        config: EndpointConfig,
    ) -> Result<Self> {
        Self::attach_with_notifier(poller, stream, handler, config, None)
    }

    pub(crate) fn attach_with_notifier(
        poller: &Arc<EventPoller>,
        stream: std::net::TcpStream,
        handler: H,
        config: EndpointConfig,
        notifier: Option<CloseNotifier>,
    ) -> Result<Self> {
        if !poller.is_running() {
            return Err(NetError::PollerGone);
        }
        stream.set_nonblocking(true)?;

        let endpoint = Endpoint::new(EndpointKind::Session, EndpointState::Connected, poller, config, handler);
        if let Some(notifier) = notifier {
            endpoint.set_close_notifier(notifier);
        }

        let pending = PendingStream {
            endpoint: endpoint.clone(),
            stream: Some(stream),
        };
        let queued = poller.async_task(move || pending.install(), true);
        if !queued {
            return Err(NetError::PollerGone);
        }

        Ok(Self { endpoint })
    }

    pub fn id(&self) -> EndpointId {
        self.endpoint.id()
    }

    pub fn identifier(&self) -> String {
        self.endpoint.identifier()
    }

    pub fn alive(&self) -> bool {
        self.endpoint.alive()
    }

    pub fn state(&self) -> EndpointState {
        self.endpoint.state()
    }

    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        self.endpoint.send(data)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.endpoint.peer_addr()
    }

    pub fn endpoint(&self) -> &Arc<Endpoint<H>> {
        &self.endpoint
    }

    pub fn handler(&self) -> &H {
        self.endpoint.handler()
    }

    /// Tear the session down on the calling thread.
    pub fn shutdown(&self, err: SockError) {
        self.endpoint.shutdown(err);
    }

    /// Tear the session down on its poller thread.
    ///
    /// Only a weak reference travels to the poller, so a session released in
    /// the meantime is not kept alive. Runs inline when already on the poller
    /// thread or when the poller has stopped.
    pub fn safe_shutdown(&self, err: SockError) {
        let Some(poller) = self.endpoint.poller() else {
            self.endpoint.shutdown(err);
            return;
        };
        if poller.is_current_thread() || !poller.is_running() {
            self.endpoint.shutdown(err);
            return;
        }

        let weak: Weak<Endpoint<H>> = Arc::downgrade(&self.endpoint);
        let pending = err.clone();
        let queued = poller.async_task(
            move || {
                if let Some(endpoint) = weak.upgrade() {
                    endpoint.shutdown(pending);
                }
            },
            false,
        );
        if !queued {
            self.endpoint.shutdown(err);
        }
    }
}

/// An accepted stream on its way to the poller thread.
///
/// The session is not alive until the stream is installed. If the poller stops
/// before the install runs, dropping this tears the session down so its
/// `on_error` still fires and a server registry releases it.
struct PendingStream<H: EndpointHandler> {
    endpoint: Arc<Endpoint<H>>,
    stream: Option<std::net::TcpStream>,
}

impl<H: EndpointHandler> PendingStream<H> {
    fn install(mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        match TcpStream::from_std(stream) {
            Ok(stream) => self.endpoint.install_stream(stream),
            Err(err) => self.endpoint.shutdown(SockError::from(&err)),
        }
    }
}

impl<H: EndpointHandler> Drop for PendingStream<H> {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            self.endpoint.shutdown(SockError::shutdown("poller stopped before the session started"));
        }
    }
}

impl<H: EndpointHandler> std::fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Session").field(&self.endpoint).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::poller::PollerConfig;

    struct Counting {
        errors: Arc<AtomicUsize>,
    }

    impl EndpointHandler for Counting {
        fn on_error(&self, _endpoint: &Endpoint<Self>, _err: &SockError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stream_pair() -> (std::net::TcpStream, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        (client, accepted)
    }

    fn session_endpoint(poller: &Arc<EventPoller>, errors: &Arc<AtomicUsize>) -> Arc<Endpoint<Counting>> {
        let handler = Counting { errors: errors.clone() };
        Endpoint::new(EndpointKind::Session, EndpointState::Connected, poller, EndpointConfig::default(), handler)
    }

    #[test]
    fn test_not_alive_before_stream_installed() {
        let poller = EventPoller::new(PollerConfig::with_name("session-idle")).unwrap();
        let errors = Arc::new(AtomicUsize::new(0));
        let endpoint = session_endpoint(&poller, &errors);

        assert_eq!(endpoint.state(), EndpointState::Connected);
        assert!(!endpoint.alive());
        assert!(endpoint.send("x").is_err());
    }

    #[test]
    fn test_uninstalled_stream_tears_session_down() {
        let poller = EventPoller::new(PollerConfig::with_name("session-dropped")).unwrap();
        let errors = Arc::new(AtomicUsize::new(0));
        let endpoint = session_endpoint(&poller, &errors);
        let (released_tx, released_rx) = crossbeam_channel::bounded(1);
        endpoint.set_close_notifier(Box::new(move |id| {
            let _ = released_tx.send(id);
        }));

        let (_peer, stream) = stream_pair();
        drop(PendingStream {
            endpoint: endpoint.clone(),
            stream: Some(stream),
        });

        assert_eq!(released_rx.try_recv().unwrap(), endpoint.id());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(endpoint.state(), EndpointState::Closed);
        assert!(!endpoint.alive());
    }

    #[test]
    fn test_attach_becomes_alive_on_poller() {
        let poller = EventPoller::new(PollerConfig::with_name("session-attach")).unwrap();
        let errors = Arc::new(AtomicUsize::new(0));
        let (_peer, stream) = stream_pair();
        let session = Session::attach(&poller, stream, Counting { errors: errors.clone() }, EndpointConfig::default()).unwrap();

        // The install was queued first, so it has run once this round-trip returns.
        assert_eq!(poller.sync_task(|| ()), Some(()));
        assert!(session.alive());
        assert!(session.peer_addr().is_some());

        session.shutdown(SockError::shutdown("done"));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
