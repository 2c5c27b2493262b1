//! Process-wide clock service.
//!
//! A background thread samples the OS wall clock every
//! [`ClockConfig::sample_interval`] and publishes two readings that any thread
//! can load without blocking:
//!
//! - an **elapsed** counter that only moves forward, and only by plausible
//!   deltas (a stalled sampler or a stepped OS clock is reported and skipped)
//! - the raw **wall** clock as of the last sample, which may jump
//!
//! The global service starts lazily on first read through
//! [`ClockService::global`]. Its sampler thread is detached and runs until the
//! process exits; it is never joined, the same way any process-scoped
//! singleton lives for the whole program.
//!
//! # Example
//!
//! ```
//! use tidewire_core::clock::{self, ClockService};
//!
//! let clock = ClockService::global();
//! let before = clock.elapsed_micros();
//! std::thread::sleep(std::time::Duration::from_millis(5));
//! assert!(clock.elapsed_micros() >= before);
//!
//! let stamp = clock::format_wall_time(clock.wall_micros());
//! assert_eq!(stamp.len(), "2024-01-01 00:00:00.000".len());
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};

use crate::error::{CoreError, Result};
use crate::logging::targets;

/// Configuration for a [`ClockService`].
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// How often the sampler reads the OS clock.
    pub sample_interval: Duration,
    /// Deltas at or above this are treated as implausible.
    pub max_plausible_delta: Duration,
    /// Name of the sampler thread.
    pub thread_name: String,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_micros(500),
            max_plausible_delta: Duration::from_secs(1),
            thread_name: "tidewire-clock".to_string(),
        }
    }
}

impl ClockConfig {
    /// Set the sampling interval.
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Set the largest delta that is still applied to the elapsed counter.
    pub fn max_plausible_delta(mut self, delta: Duration) -> Self {
        self.max_plausible_delta = delta;
        self
    }
}

/// Outcome of feeding one wall-clock sample to an [`ElapsedTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// The delta was plausible and was added to the elapsed counter.
    Applied(u64),
    /// The clock did not move since the previous sample.
    Unchanged,
    /// The clock moved backwards or jumped too far; nothing was applied.
    Implausible(i64),
}

/// Accumulates elapsed time from successive wall-clock samples.
#[derive(Debug, Clone)]
pub struct ElapsedTracker {
    last: u64,
    elapsed: u64,
    max_delta: u64,
}

impl ElapsedTracker {
    /// Create a tracker whose first reference sample is `start_micros`.
    pub fn new(start_micros: u64, max_delta: Duration) -> Self {
        Self {
            last: start_micros,
            elapsed: 0,
            max_delta: u64::try_from(max_delta.as_micros()).unwrap_or(u64::MAX),
        }
    }

    /// Feed a new wall-clock sample.
    ///
    /// Only `0 < delta < max_delta` advances the counter. The reference
    /// sample always moves to `now_micros`.
    pub fn sample(&mut self, now_micros: u64) -> Sample {
        let delta = now_micros as i64 - self.last as i64;
        self.last = now_micros;

        if delta > 0 && (delta as u64) < self.max_delta {
            self.elapsed += delta as u64;
            Sample::Applied(delta as u64)
        } else if delta == 0 {
            Sample::Unchanged
        } else {
            Sample::Implausible(delta)
        }
    }

    /// Total elapsed microseconds accumulated so far.
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }
}

struct ClockState {
    elapsed: AtomicU64,
    wall: AtomicU64,
    sampling: AtomicBool,
    started: Instant,
}

/// Background clock sampler publishing elapsed and wall readings.
pub struct ClockService {
    state: Arc<ClockState>,
}

static GLOBAL_CLOCK: OnceLock<ClockService> = OnceLock::new();

impl ClockService {
    /// The process-wide clock, started on first use.
    ///
    /// If the sampler thread cannot be spawned the service still answers
    /// reads by querying the OS directly.
    pub fn global() -> &'static ClockService {
        GLOBAL_CLOCK.get_or_init(|| {
            let state = Arc::new(ClockState::new());
            if let Err(err) = spawn_sampler(&state, ClockConfig::default()) {
                tracing::error!(target: targets::CLOCK, error = %err, "clock sampler unavailable, reading OS clock directly");
            }
            ClockService { state }
        })
    }

    /// Start a private clock service with its own sampler thread.
    ///
    /// The sampler exits once the service is dropped.
    pub fn with_config(config: ClockConfig) -> Result<Self> {
        let state = Arc::new(ClockState::new());
        spawn_sampler(&state, config)?;
        Ok(Self { state })
    }

    /// Elapsed microseconds since the service started.
    pub fn elapsed_micros(&self) -> u64 {
        if self.state.sampling.load(Ordering::Acquire) {
            self.state.elapsed.load(Ordering::Acquire)
        } else {
            u64::try_from(self.state.started.elapsed().as_micros()).unwrap_or(u64::MAX)
        }
    }

    /// Elapsed milliseconds since the service started.
    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed_micros() / 1000
    }

    /// Wall clock (microseconds since the Unix epoch) as of the last sample.
    pub fn wall_micros(&self) -> u64 {
        if self.state.sampling.load(Ordering::Acquire) {
            self.state.wall.load(Ordering::Acquire)
        } else {
            system_micros()
        }
    }

    /// Wall clock in milliseconds since the Unix epoch.
    pub fn wall_millis(&self) -> u64 {
        self.wall_micros() / 1000
    }
}

impl std::fmt::Debug for ClockService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockService")
            .field("elapsed_micros", &self.elapsed_micros())
            .field("wall_micros", &self.wall_micros())
            .finish()
    }
}

impl ClockState {
    fn new() -> Self {
        Self {
            elapsed: AtomicU64::new(0),
            wall: AtomicU64::new(system_micros()),
            sampling: AtomicBool::new(false),
            started: Instant::now(),
        }
    }
}

fn spawn_sampler(state: &Arc<ClockState>, config: ClockConfig) -> Result<()> {
    let weak = Arc::downgrade(state);
    let start = state.wall.load(Ordering::Acquire);
    let name = config.thread_name.clone();

    // Detached: the handle is dropped on purpose.
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || sample_loop(weak, start, config))
        .map_err(|e| CoreError::thread_spawn(name, e))?;

    state.sampling.store(true, Ordering::Release);
    Ok(())
}

fn sample_loop(state: Weak<ClockState>, start: u64, config: ClockConfig) {
    let mut tracker = ElapsedTracker::new(start, config.max_plausible_delta);
    tracing::trace!(target: targets::CLOCK, interval = ?config.sample_interval, "clock sampler started");

    loop {
        let Some(state) = state.upgrade() else {
            break;
        };

        let now = system_micros();
        state.wall.store(now, Ordering::Release);
        if let Sample::Implausible(delta) = tracker.sample(now) {
            crate::log_warn!("Stamp expired is abnormal: {delta}us");
        }
        state.elapsed.store(tracker.elapsed(), Ordering::Release);
        drop(state);

        thread::sleep(config.sample_interval);
    }

    tracing::trace!(target: targets::CLOCK, "clock sampler stopped");
}

fn system_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Current time in microseconds from the global clock.
///
/// With `system` set this is the wall clock since the Unix epoch, otherwise
/// the elapsed time since the clock started.
pub fn current_micros(system: bool) -> u64 {
    let clock = ClockService::global();
    if system {
        clock.wall_micros()
    } else {
        clock.elapsed_micros()
    }
}

/// Current time in milliseconds from the global clock. See [`current_micros`].
pub fn current_millis(system: bool) -> u64 {
    current_micros(system) / 1000
}

/// Format a wall-clock reading as local `YYYY-MM-DD HH:MM:SS.mmm`.
pub fn format_wall_time(micros: u64) -> String {
    let utc = DateTime::from_timestamp_micros(i64::try_from(micros).unwrap_or(i64::MAX)).unwrap_or_default();
    utc.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}
