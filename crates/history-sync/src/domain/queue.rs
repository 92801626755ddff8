//! # Backpressure Queue
//!
//! Bounded hand-off buffer between ledger threads (producers) and the single
//! consumer worker.
//!
//! ## Backpressure
//!
//! `enqueue` never rejects. Once the depth exceeds `max_queue_size` each
//! producer sleeps for a delay step that grows by `delay_increment` per
//! over-limit insert and shrinks by the same amount per in-bounds insert.
//! The step has no upper bound; past `stuck_threshold` it is logged.
//!
//! ```text
//! depth > max ──→ delay += step ──→ wake consumer ──→ unlock, sleep(delay) ──→ insert
//! depth ≤ max ──→ delay = max(0, delay - step) ─────────────────────────────→ insert
//! ```
//!
//! ## Shutdown
//!
//! The `done` flag and the buffer live under the same mutex, so the drain
//! that observes shutdown also observes every record enqueued before it.
//! `reopen` clears the flag for the next consumer; records that arrived in
//! between stay buffered for it.

use crate::metrics;
use parking_lot::{Condvar, Mutex, MutexGuard};
use shared_types::ActionHistoryRecord;
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

/// Throttling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressureConfig {
    /// Depth above which producers are delayed.
    pub max_queue_size: usize,
    /// Growth and shrink step of the producer delay.
    pub delay_increment: Duration,
    /// Delay past which the queue is reported as stuck.
    pub stuck_threshold: Duration,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1024,
            delay_increment: Duration::from_millis(10),
            stuck_threshold: Duration::from_millis(1000),
        }
    }
}

/// Result of one drain.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Drained {
    /// Records in enqueue order.
    pub records: Vec<ActionHistoryRecord>,
    /// Shutdown had been requested when the buffer was swapped out.
    pub shutdown_requested: bool,
}

impl Drained {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct QueueState {
    buffer: VecDeque<ActionHistoryRecord>,
    delay: Duration,
    done: bool,
}

/// Mutex + condvar queue with batch swap and adaptive producer delay.
pub struct BackpressureQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
    config: BackpressureConfig,
}

impl BackpressureQueue {
    pub fn new(config: BackpressureConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                buffer: VecDeque::new(),
                delay: Duration::ZERO,
                done: false,
            }),
            wake: Condvar::new(),
            config,
        }
    }

    pub fn config(&self) -> &BackpressureConfig {
        &self.config
    }

    /// Append a record, throttling the caller when the queue is over its mark.
    pub fn enqueue(&self, record: ActionHistoryRecord) {
        let mut state = self.state.lock();

        if state.buffer.len() > self.config.max_queue_size {
            state.delay += self.config.delay_increment;
            let delay = state.delay;
            let depth = state.buffer.len();
            metrics::set_backpressure_delay(delay);

            if delay > self.config.stuck_threshold {
                tracing::warn!(
                    queue_depth = depth,
                    delay_ms = delay.as_millis() as u64,
                    "[history-sync] Queue is stuck, producers are being throttled"
                );
            }

            self.wake.notify_one();
            MutexGuard::unlocked(&mut state, || thread::sleep(delay));
        } else if !state.delay.is_zero() {
            state.delay = state.delay.saturating_sub(self.config.delay_increment);
            metrics::set_backpressure_delay(state.delay);
        }

        state.buffer.push_back(record);
        let depth = state.buffer.len();
        drop(state);

        self.wake.notify_one();
        metrics::record_enqueued();
        metrics::set_queue_depth(depth);
    }

    /// Swap the whole buffer out without waiting.
    pub fn drain_all(&self) -> Vec<ActionHistoryRecord> {
        let mut state = self.state.lock();
        let records = Vec::from(std::mem::take(&mut state.buffer));
        drop(state);
        metrics::set_queue_depth(0);
        records
    }

    /// Block until the queue is non-empty or shutdown was requested, then
    /// swap the buffer out.
    ///
    /// With a `timeout` the wait gives up at the deadline and may return an
    /// empty batch.
    pub fn wait_and_drain(&self, timeout: Option<Duration>) -> Drained {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();

        while state.buffer.is_empty() && !state.done {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.wake.wait(&mut state),
            }
        }

        let drained = Drained {
            records: Vec::from(std::mem::take(&mut state.buffer)),
            shutdown_requested: state.done,
        };
        drop(state);

        metrics::set_queue_depth(0);
        drained
    }

    /// Request shutdown and wake the consumer.
    pub fn shutdown(&self) {
        self.state.lock().done = true;
        self.wake.notify_one();
    }

    /// Clear a previous shutdown request so a new consumer can wait again.
    pub fn reopen(&self) {
        self.state.lock().done = false;
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().done
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().buffer.is_empty()
    }

    /// Delay step the next over-limit producer will add to.
    pub fn current_delay(&self) -> Duration {
        self.state.lock().delay
    }
}

impl Default for BackpressureQueue {
    fn default() -> Self {
        Self::new(BackpressureConfig::default())
    }
}
