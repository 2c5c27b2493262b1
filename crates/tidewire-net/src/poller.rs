//! Event pollers: single-threaded reactors driving endpoints and timers.
//!
//! Each [`EventPoller`] owns a dedicated thread running a current-thread Tokio
//! runtime. Every socket an endpoint opens is bound to one poller, so all of
//! that endpoint's I/O callbacks and timers run on the same thread.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tidewire_net::poller::{EventPoller, PollerConfig};
//!
//! let poller = EventPoller::new(PollerConfig::with_name("doc-poller")).unwrap();
//!
//! // Round-trip a closure through the poller thread.
//! let on_poller = poller.sync_task({
//!     let poller = poller.clone();
//!     move || poller.is_current_thread()
//! });
//! assert_eq!(on_poller, Some(true));
//!
//! let (tx, rx) = crossbeam_channel::bounded(1);
//! let _timer = poller.run_after(Duration::from_millis(10), move || {
//!     let _ = tx.send(());
//! });
//! rx.recv_timeout(Duration::from_secs(1)).unwrap();
//!
//! poller.shutdown();
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};
use tidewire_core::logging::targets;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{NetError, Result};

new_key_type! {
    /// A unique identifier for a timer within one poller.
    pub struct TimerId;
}

type TimerTable = Mutex<SlotMap<TimerId, Option<AbortHandle>>>;

/// Configuration for creating an [`EventPoller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Name for the poller thread.
    pub thread_name: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            thread_name: "tidewire-poller".to_string(),
        }
    }
}

impl PollerConfig {
    /// Create a new configuration with the given thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            thread_name: name.into(),
        }
    }
}

/// A single-threaded reactor.
pub struct EventPoller {
    name: String,
    handle: Handle,
    thread_id: ThreadId,
    running: AtomicBool,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    timers: Arc<TimerTable>,
}

impl EventPoller {
    /// Start a poller thread.
    pub fn new(config: PollerConfig) -> Result<Arc<Self>> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread_name = config.thread_name.clone();
        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_io().enable_time().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(runtime.handle().clone()));

                tracing::trace!(target: targets::POLLER, poller = %thread_name, "poller started");
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                tracing::trace!(target: targets::POLLER, poller = %thread_name, "poller stopped");
            })
            .map_err(NetError::Runtime)?;

        let handle = match ready_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => return Err(NetError::Runtime(err)),
            Err(_) => return Err(NetError::PollerGone),
        };
        let thread_id = thread.thread().id();

        Ok(Arc::new(Self {
            name: config.thread_name,
            handle,
            thread_id,
            running: AtomicBool::new(true),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
            timers: Arc::new(Mutex::new(SlotMap::with_key())),
        }))
    }

    /// Name of the poller thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether the poller still accepts work.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check whether the caller is running on this poller's thread.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Spawn a future onto the poller.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run `task` on the poller thread.
    ///
    /// With `may_inline` set and the caller already on the poller thread, the
    /// task runs immediately. Returns `false` if the poller has shut down, in
    /// which case `task` is dropped without running.
    pub fn async_task<F>(&self, task: F, may_inline: bool) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_running() {
            return false;
        }
        if may_inline && self.is_current_thread() {
            task();
            return true;
        }
        self.handle.spawn(async move { task() });
        true
    }

    /// Run `task` on the poller thread and wait for its result.
    ///
    /// Runs inline when called from the poller thread. Returns `None` if the
    /// poller shut down before the task completed.
    pub fn sync_task<F, R>(&self, task: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current_thread() {
            return Some(task());
        }
        if !self.is_running() {
            return None;
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.handle.spawn(async move {
            let _ = tx.send(task());
        });
        rx.recv().ok()
    }

    /// Run `task` once after `delay`.
    pub fn run_after<F>(&self, delay: Duration, task: F) -> Timer
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(move |cancelled, timers, id| async move {
            tokio::time::sleep(delay).await;
            if !cancelled.load(Ordering::Acquire) {
                tracing::trace!(target: targets::POLLER, ?id, "one-shot timer fired");
                task();
            }
            timers.lock().remove(id);
        })
    }

    /// Run `task` every `interval` until it returns `false` or the timer is cancelled.
    ///
    /// The first run happens one interval from now. A zero interval is
    /// treated as one millisecond.
    pub fn run_every<F>(&self, interval: Duration, mut task: F) -> Timer
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        self.schedule(move |cancelled, timers, id| async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if cancelled.load(Ordering::Acquire) || !task() {
                    break;
                }
            }
            timers.lock().remove(id);
        })
    }

    fn schedule<F, Fut>(&self, make: F) -> Timer
    where
        F: FnOnce(Arc<AtomicBool>, Arc<TimerTable>, TimerId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let id = self.timers.lock().insert(None);

        let future = make(cancelled.clone(), self.timers.clone(), id);
        let task = self.handle.spawn(future);
        if let Some(slot) = self.timers.lock().get_mut(id) {
            *slot = Some(task.abort_handle());
        }

        Timer {
            id,
            cancelled,
            timers: Arc::downgrade(&self.timers),
        }
    }

    /// Number of timers that have not yet completed or been cancelled.
    pub fn active_timers(&self) -> usize {
        self.timers.lock().len()
    }

    /// Stop the poller thread.
    ///
    /// Pending tasks and timers are dropped. Blocks until the thread exits,
    /// unless called from the poller thread itself.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        if self.is_current_thread() {
            return;
        }
        if let Some(thread) = self.thread.lock().take()
            && thread.join().is_err()
        {
            tracing::warn!(target: targets::POLLER, poller = %self.name, "poller thread panicked");
        }
    }
}

impl Drop for EventPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPoller")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("active_timers", &self.active_timers())
            .finish()
    }
}

/// Handle to a scheduled one-shot or repeating task.
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct Timer {
    id: TimerId,
    cancelled: Arc<AtomicBool>,
    timers: Weak<TimerTable>,
}

impl Timer {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancel the timer. A cancelled timer never runs its task again, even if
    /// its wake-up is already queued on the poller.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(timers) = self.timers.upgrade()
            && let Some(Some(abort)) = timers.lock().remove(self.id)
        {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A fixed set of pollers handed out round-robin.
#[derive(Debug)]
pub struct EventPollerPool {
    pollers: Vec<Arc<EventPoller>>,
    next: AtomicUsize,
}

static GLOBAL_POOL: OnceLock<EventPollerPool> = OnceLock::new();

impl EventPollerPool {
    /// The process-wide pool, one poller per available CPU.
    ///
    /// Pollers that fail to start are skipped; see [`get_poller`](Self::get_poller).
    pub fn instance() -> &'static EventPollerPool {
        GLOBAL_POOL.get_or_init(|| {
            let size = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            let pollers = (0..size)
                .filter_map(|i| match EventPoller::new(PollerConfig::with_name(format!("tidewire-poller-{i}"))) {
                    Ok(poller) => Some(poller),
                    Err(err) => {
                        tracing::error!(target: targets::POLLER, error = %err, "failed to start pooled poller");
                        None
                    }
                })
                .collect();
            Self {
                pollers,
                next: AtomicUsize::new(0),
            }
        })
    }

    /// Create a private pool of `size` pollers.
    pub fn with_size(size: usize, name_prefix: &str) -> Result<Self> {
        let pollers = (0..size.max(1))
            .map(|i| EventPoller::new(PollerConfig::with_name(format!("{name_prefix}-{i}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            pollers,
            next: AtomicUsize::new(0),
        })
    }

    pub fn size(&self) -> usize {
        self.pollers.len()
    }

    /// Pick a poller.
    ///
    /// Called from one of the pool's own threads this returns that thread's
    /// poller; otherwise pollers are handed out round-robin.
    pub fn get_poller(&self) -> Result<Arc<EventPoller>> {
        if let Some(current) = self.pollers.iter().find(|p| p.is_current_thread()) {
            return Ok(current.clone());
        }
        if self.pollers.is_empty() {
            return Err(NetError::PollerGone);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.pollers.len();
        Ok(self.pollers[index].clone())
    }

    /// All pollers in the pool.
    pub fn pollers(&self) -> &[Arc<EventPoller>] {
        &self.pollers
    }
}
