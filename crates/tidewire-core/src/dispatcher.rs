//! Semaphore-gated asynchronous dispatcher.
//!
//! [`AsyncDispatcher`] decouples any number of producer threads from a single
//! dedicated consumer thread. Producers append to a pending list under a
//! short-held lock and post the semaphore; the consumer wakes, swaps the whole
//! pending list out in one critical section, and delivers the batch in FIFO
//! order to every registered sink in registration order.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use tidewire_core::dispatcher::AsyncDispatcher;
//!
//! let dispatcher = AsyncDispatcher::<u32>::new().unwrap();
//! let total = Arc::new(AtomicUsize::new(0));
//!
//! let total_clone = total.clone();
//! dispatcher.add_sink(Arc::new(move |value: &u32| {
//!     total_clone.fetch_add(*value as usize, Ordering::SeqCst);
//! }));
//!
//! dispatcher.submit(1);
//! dispatcher.submit_batch([2, 3]);
//!
//! // Everything submitted before shutdown is delivered before it returns.
//! dispatcher.shutdown();
//! assert_eq!(total.load(Ordering::SeqCst), 6);
//! ```

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Mutex, RwLock};

use crate::error::{CoreError, Result, SinkResult};
use crate::logging::targets;
use crate::semaphore::Semaphore;

/// A consumer of dispatched items.
pub trait DispatchSink<T>: Send + Sync {
    /// Deliver one item.
    fn deliver(&self, item: &T) -> SinkResult;

    /// Name used when reporting delivery failures.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<T, F> DispatchSink<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn deliver(&self, item: &T) -> SinkResult {
        self(item);
        Ok(())
    }
}

/// Configuration for creating an [`AsyncDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Name for the consumer thread.
    pub thread_name: String,
    /// Stack size for the consumer thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name: "tidewire-dispatch".to_string(),
            stack_size: None,
        }
    }
}

impl DispatcherConfig {
    /// Create a new configuration with the given thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            thread_name: name.into(),
            ..Default::default()
        }
    }

    /// Set the stack size of the consumer thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

/// State shared between the dispatcher handle and its consumer thread.
struct DispatchShared<T> {
    /// Items submitted since the last drain, plus the accepting flag.
    pending: Mutex<PendingList<T>>,
    sem: Semaphore,
    sinks: RwLock<Vec<Arc<dyn DispatchSink<T>>>>,
    exit: AtomicBool,
}

struct PendingList<T> {
    items: Vec<T>,
    accepting: bool,
}

impl<T> DispatchShared<T> {
    /// Swap out the pending list and deliver it. Returns the number of items drained.
    fn drain(&self) -> usize {
        let batch = {
            let mut pending = self.pending.lock();
            mem::take(&mut pending.items)
        };
        if batch.is_empty() {
            return 0;
        }

        let sinks: Vec<Arc<dyn DispatchSink<T>>> = self.sinks.read().clone();
        let count = batch.len();
        for item in &batch {
            for sink in &sinks {
                deliver_isolated(sink.as_ref(), item);
            }
        }

        tracing::trace!(target: targets::DISPATCHER, items = count, sinks = sinks.len(), "drained batch");
        count
    }
}

/// Deliver one item to one sink without letting a failure escape.
fn deliver_isolated<T>(sink: &dyn DispatchSink<T>, item: &T) {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(item))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(target: targets::DISPATCHER, sink = sink.name(), error = %err, "sink delivery failed");
        }
        Err(_) => {
            tracing::warn!(target: targets::DISPATCHER, sink = sink.name(), "sink panicked during delivery");
        }
    }
}

/// A producer/single-consumer batching queue.
///
/// # Thread Safety
///
/// `AsyncDispatcher<T>` is `Send + Sync`; any number of threads may submit
/// concurrently. Submission never waits on consumer progress.
pub struct AsyncDispatcher<T: Send + 'static> {
    shared: Arc<DispatchShared<T>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    consumer: ThreadId,
}

impl<T: Send + 'static> AsyncDispatcher<T> {
    /// Create a dispatcher with the default configuration and start its consumer.
    pub fn new() -> Result<Self> {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a dispatcher with a custom configuration and start its consumer.
    pub fn with_config(config: DispatcherConfig) -> Result<Self> {
        let shared = Arc::new(DispatchShared {
            pending: Mutex::new(PendingList {
                items: Vec::new(),
                accepting: true,
            }),
            sem: Semaphore::new(0),
            sinks: RwLock::new(Vec::new()),
            exit: AtomicBool::new(false),
        });

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread_shared = shared.clone();
        let handle = builder
            .spawn(move || consumer_loop(&thread_shared))
            .map_err(|e| CoreError::thread_spawn(config.thread_name, e))?;
        let consumer = handle.thread().id();

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
            consumer,
        })
    }

    /// Register a sink. Sinks receive every item in registration order.
    pub fn add_sink(&self, sink: Arc<dyn DispatchSink<T>>) {
        self.shared.sinks.write().push(sink);
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.shared.sinks.read().len()
    }

    /// Submit a single item.
    ///
    /// Returns `false` if the dispatcher has been shut down; the item is dropped.
    pub fn submit(&self, item: T) -> bool {
        {
            let mut pending = self.shared.pending.lock();
            if !pending.accepting {
                return false;
            }
            pending.items.push(item);
        }
        self.shared.sem.post(1);
        true
    }

    /// Submit several items in one critical section.
    ///
    /// Returns how many items were accepted (zero after shutdown).
    pub fn submit_batch<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let accepted = {
            let mut pending = self.shared.pending.lock();
            if !pending.accepting {
                return 0;
            }
            let before = pending.items.len();
            pending.items.extend(items);
            pending.items.len() - before
        };
        self.shared.sem.post(accepted);
        accepted
    }

    /// Number of items submitted but not yet drained.
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().items.len()
    }

    /// Check whether the dispatcher still accepts submissions.
    pub fn is_running(&self) -> bool {
        self.shared.pending.lock().accepting
    }

    /// Stop the consumer and deliver everything submitted so far.
    ///
    /// Idempotent. When called from the consumer thread itself (from inside a
    /// sink) the stop is requested but not awaited; the consumer still
    /// delivers everything accepted before it exits.
    pub fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };

        self.shared.pending.lock().accepting = false;
        self.shared.exit.store(true, Ordering::Release);
        self.shared.sem.post(1);

        if thread::current().id() == self.consumer {
            return;
        }
        if handle.join().is_err() {
            tracing::warn!(target: targets::DISPATCHER, "dispatcher consumer thread panicked");
        }
        self.shared.drain();
    }
}

impl<T: Send + 'static> Drop for AsyncDispatcher<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Send + 'static> std::fmt::Debug for AsyncDispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncDispatcher")
            .field("pending", &self.pending())
            .field("sinks", &self.sink_count())
            .field("running", &self.is_running())
            .finish()
    }
}

/// The consumer loop: wait, drain, repeat until told to stop.
fn consumer_loop<T>(shared: &DispatchShared<T>) {
    while !shared.exit.load(Ordering::Acquire) {
        shared.sem.wait();
        shared.drain();
    }
    // Admission is closed once `exit` is set, so this drain is the last.
    shared.drain();
}

static_assertions::assert_impl_all!(AsyncDispatcher<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::error::SinkError;

    fn recording_sink(log: &Arc<Mutex<Vec<u32>>>) -> Arc<dyn DispatchSink<u32>> {
        let log = log.clone();
        Arc::new(move |value: &u32| log.lock().push(*value))
    }

    #[test]
    fn test_shutdown_delivers_in_order_to_every_sink() {
        let dispatcher = AsyncDispatcher::<u32>::new().unwrap();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        dispatcher.add_sink(recording_sink(&first));
        dispatcher.add_sink(recording_sink(&second));

        dispatcher.submit(1);
        dispatcher.submit(2);
        dispatcher.submit(3);
        dispatcher.shutdown();

        assert_eq!(*first.lock(), vec![1, 2, 3]);
        assert_eq!(*second.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let dispatcher = AsyncDispatcher::<u32>::new().unwrap();
        dispatcher.shutdown();

        assert!(!dispatcher.is_running());
        assert!(!dispatcher.submit(7));
        assert_eq!(dispatcher.submit_batch([1, 2]), 0);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let dispatcher = AsyncDispatcher::<u32>::new().unwrap();
        dispatcher.shutdown();
        dispatcher.shutdown();
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        struct Failing;
        impl DispatchSink<u32> for Failing {
            fn deliver(&self, _item: &u32) -> SinkResult {
                Err(SinkError::rejected("always"))
            }
            fn name(&self) -> &str {
                "failing"
            }
        }

        let dispatcher = AsyncDispatcher::<u32>::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.add_sink(Arc::new(Failing));
        dispatcher.add_sink(Arc::new(|value: &u32| {
            if *value == 2 {
                panic!("boom");
            }
        }));
        dispatcher.add_sink(recording_sink(&log));

        dispatcher.submit_batch([1, 2, 3]);
        dispatcher.shutdown();

        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_delivery_happens_on_consumer_thread() {
        let dispatcher = AsyncDispatcher::<u32>::with_config(DispatcherConfig::with_name("dispatch-test")).unwrap();
        let names = Arc::new(Mutex::new(Vec::new()));
        let names_clone = names.clone();
        dispatcher.add_sink(Arc::new(move |_: &u32| {
            names_clone
                .lock()
                .push(thread::current().name().map(str::to_string));
        }));

        dispatcher.submit(1);
        for _ in 0..100 {
            if !names.lock().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(names.lock().first().cloned().flatten().as_deref(), Some("dispatch-test"));
        dispatcher.shutdown();
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        let dispatcher = Arc::new(AsyncDispatcher::<(usize, usize)>::new().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        dispatcher.add_sink(Arc::new(move |item: &(usize, usize)| seen_clone.lock().push(*item)));

        let handles: Vec<_> = (0..4)
            .map(|producer| {
                let dispatcher = dispatcher.clone();
                thread::spawn(move || {
                    for seq in 0..250 {
                        dispatcher.submit((producer, seq));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        dispatcher.shutdown();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1000);
        for producer in 0..4 {
            let sequence: Vec<usize> = seen
                .iter()
                .filter(|(p, _)| *p == producer)
                .map(|(_, s)| *s)
                .collect();
            assert_eq!(sequence, (0..250).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_drop_flushes_pending_items() {
        let delivered = Arc::new(AtomicUsize::new(0));
        {
            let dispatcher = AsyncDispatcher::<u32>::new().unwrap();
            let delivered = delivered.clone();
            dispatcher.add_sink(Arc::new(move |_: &u32| {
                delivered.fetch_add(1, Ordering::SeqCst);
            }));
            dispatcher.submit_batch(0..10);
        }
        assert_eq!(delivered.load(Ordering::SeqCst), 10);
    }
}
