//! The connected-stream half of an endpoint.
//!
//! A [`Socket`] owns the I/O task of one connected TCP stream on an event
//! poller. Reads, completed flushes and the reason the stream ended are
//! reported to a [`SocketEvents`] receiver; the receiver (an endpoint) holds
//! the lifecycle logic.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tidewire_core::logging::targets;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::{NetError, Result, SockError};
use crate::poller::EventPoller;

/// Receiver of socket events. Called on the socket's poller thread.
pub(crate) trait SocketEvents: Send + Sync + 'static {
    /// Data arrived.
    fn on_read(&self, data: Bytes);

    /// The send queue has been fully written.
    fn on_flushed(&self);

    /// The stream ended or failed. Not called after [`Socket::close`].
    fn on_closed(&self, err: SockError);
}

/// A connected TCP stream driven by an [`EventPoller`].
///
/// `send` may be called from any thread concurrently with `close`.
pub struct Socket {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    command_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    task: AbortHandle,
    closed: AtomicBool,
}

impl Socket {
    /// Start the I/O task for `stream` on `poller`.
    ///
    /// Must be called from within the poller's runtime, since the stream is
    /// registered with it.
    pub(crate) fn open(
        poller: &EventPoller,
        stream: TcpStream,
        read_buffer_size: usize,
        events: Arc<dyn SocketEvents>,
    ) -> std::io::Result<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (command_tx, command_rx) = mpsc::unbounded_channel::<Bytes>();

        let task = poller.spawn(io_loop(stream, command_rx, read_buffer_size.max(1), events));

        Ok(Self {
            local_addr,
            peer_addr,
            command_tx: Mutex::new(Some(command_tx)),
            task: task.abort_handle(),
            closed: AtomicBool::new(false),
        })
    }

    /// Queue data for sending.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let tx = self.command_tx.lock();
        match tx.as_ref() {
            Some(tx) => tx.send(data.into()).map_err(|_| NetError::NotConnected),
            None => Err(NetError::NotConnected),
        }
    }

    /// Close the stream immediately, discarding unsent data.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.command_tx.lock().take();
        self.task.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_ip(&self) -> IpAddr {
        self.local_addr.ip()
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn peer_ip(&self) -> IpAddr {
        self.peer_addr.ip()
    }

    pub fn peer_port(&self) -> u16 {
        self.peer_addr.port()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn io_loop(
    stream: TcpStream,
    mut command_rx: mpsc::UnboundedReceiver<Bytes>,
    read_buffer_size: usize,
    events: Arc<dyn SocketEvents>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = BytesMut::with_capacity(read_buffer_size);

    let reason = loop {
        buffer.reserve(read_buffer_size);
        tokio::select! {
            cmd = command_rx.recv() => {
                let Some(data) = cmd else {
                    break SockError::shutdown("socket closed");
                };
                if let Err(err) = writer.write_all(&data).await {
                    break SockError::from(&err);
                }
                // Drain whatever queued up meanwhile before reporting the flush.
                let mut failed = None;
                while let Ok(more) = command_rx.try_recv() {
                    if let Err(err) = writer.write_all(&more).await {
                        failed = Some(SockError::from(&err));
                        break;
                    }
                }
                if let Some(err) = failed {
                    break err;
                }
                events.on_flushed();
            }

            result = reader.read_buf(&mut buffer) => {
                match result {
                    Ok(0) => break SockError::peer_closed(),
                    Ok(n) => {
                        tracing::trace!(target: targets::ENDPOINT, bytes = n, "socket read");
                        events.on_read(buffer.split().freeze());
                    }
                    Err(err) => break SockError::from(&err),
                }
            }
        }
    };

    tracing::trace!(target: targets::ENDPOINT, reason = %reason, "socket loop ended");
    events.on_closed(reason);
}
