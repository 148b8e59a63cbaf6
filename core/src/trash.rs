//! Double-buffered queue of deferred destruction closures.
//!
//! Resource objects can be dropped on any thread, but GPU handles may only be
//! deleted on the graphics thread. Destructors therefore enqueue a closure
//! that performs the deletion, and the graphics thread drains the queue once
//! per frame.
//!
//! ```text
//!   any thread:     push(closure) ──► front buffer
//!
//!   graphics thread, collect():
//!     1. set `collecting` (no-op if already set)
//!     2. swap front <-> back under the lock
//!     3. run every closure in back, outside the front lock
//!     4. bump the running counter, clear `collecting`
//! ```
//!
//! Closures pushed while a drain is running land in the new front buffer and
//! run on the next [`TrashQueue::collect`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::retry::RetryPolicy;

/// A deferred destruction closure.
pub type TrashItem = Box<dyn FnOnce() + Send + 'static>;

/// Executed-closure count after which a compaction is signalled.
pub const DEFAULT_COMPACT_THRESHOLD: usize = 256;

/// Result of one [`TrashQueue::collect`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Number of closures executed by this call.
    pub executed: usize,
    /// The running counter crossed the compaction threshold and was reset.
    pub compact_due: bool,
}

/// Queue of destruction closures drained by the graphics thread.
pub struct TrashQueue {
    front: Mutex<Vec<TrashItem>>,
    back: Mutex<Vec<TrashItem>>,
    collecting: AtomicBool,
    since_compact: AtomicUsize,
    total_executed: AtomicU64,
    compact_threshold: usize,
    policy: RetryPolicy,
}

impl TrashQueue {
    /// Create a queue with the default compaction threshold and retry policy.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_COMPACT_THRESHOLD, RetryPolicy::default())
    }

    /// Create a queue with a custom compaction threshold and retry policy.
    pub fn with_config(compact_threshold: usize, policy: RetryPolicy) -> Self {
        Self {
            front: Mutex::new(Vec::new()),
            back: Mutex::new(Vec::new()),
            collecting: AtomicBool::new(false),
            since_compact: AtomicUsize::new(0),
            total_executed: AtomicU64::new(0),
            compact_threshold,
            policy,
        }
    }

    /// Enqueue a closure to run on the next [`collect`](Self::collect).
    ///
    /// Never blocks beyond the retry budget. If the front buffer lock cannot
    /// be acquired the closure is dropped without running and `false` is
    /// returned.
    pub fn push(&self, item: TrashItem) -> bool {
        match self.policy.retry(|wait| self.front.try_lock_for(wait)) {
            Some(mut front) => {
                front.push(item);
                true
            }
            None => {
                log::warn!(
                    "TrashQueue: front buffer busy for {:?}, dropping trash item",
                    self.policy.budget()
                );
                false
            }
        }
    }

    /// Convenience wrapper around [`push`](Self::push) for unboxed closures.
    pub fn trash(&self, item: impl FnOnce() + Send + 'static) -> bool {
        self.push(Box::new(item))
    }

    /// Drain the queue, running every closure enqueued before the swap.
    ///
    /// Returns immediately with empty stats if a drain is already running,
    /// including a reentrant call from inside a closure.
    ///
    /// # Panics
    ///
    /// A panicking closure does not stop the drain. Every other closure still
    /// runs and the counters are updated, then the first panic is resumed.
    pub fn collect(&self) -> CollectStats {
        if self
            .collecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("TrashQueue: collect already running, skipping");
            return CollectStats::default();
        }
        let _reset = CollectingReset(&self.collecting);

        let mut drained = std::mem::take(&mut *self.back.lock());
        std::mem::swap(&mut *self.front.lock(), &mut drained);

        let executed = drained.len();
        let mut first_panic = None;
        for item in drained.drain(..) {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(item)) {
                log::error!("TrashQueue: trash item panicked, continuing drain");
                first_panic.get_or_insert(payload);
            }
        }

        // Hand the allocation back for the next swap.
        {
            let mut back = self.back.lock();
            if back.capacity() < drained.capacity() {
                *back = drained;
            }
        }

        self.total_executed
            .fetch_add(executed as u64, Ordering::Relaxed);
        let running = self.since_compact.fetch_add(executed, Ordering::AcqRel) + executed;
        let compact_due = running > self.compact_threshold;
        if compact_due {
            self.since_compact.store(0, Ordering::Release);
        }

        if executed > 0 {
            log::trace!("TrashQueue: executed {} trash items", executed);
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        CollectStats {
            executed,
            compact_due,
        }
    }

    /// Number of closures waiting for the next collect.
    pub fn pending(&self) -> usize {
        self.front.lock().len()
    }

    /// Total closures executed over the queue's lifetime.
    pub fn total_executed(&self) -> u64 {
        self.total_executed.load(Ordering::Relaxed)
    }

    /// Returns `true` while a collect is draining.
    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Acquire)
    }

    /// The compaction threshold.
    pub fn compact_threshold(&self) -> usize {
        self.compact_threshold
    }
}

impl Default for TrashQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrashQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrashQueue")
            .field("pending", &self.front.try_lock().map(|front| front.len()))
            .field("collecting", &self.is_collecting())
            .field("total_executed", &self.total_executed())
            .field("compact_threshold", &self.compact_threshold)
            .finish()
    }
}

/// Clears the collecting flag even if a closure panics.
struct CollectingReset<'a>(&'a AtomicBool);

impl Drop for CollectingReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

static_assertions::assert_impl_all!(TrashQueue: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn counter_item(counter: &Arc<AtomicUsize>) -> TrashItem {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_items_run_only_on_collect() {
        let queue = TrashQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));

        assert!(queue.push(counter_item(&counter)));
        assert!(queue.push(counter_item(&counter)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 2);

        let stats = queue.collect();
        assert_eq!(stats.executed, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_each_item_runs_exactly_once() {
        let queue = TrashQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        queue.push(counter_item(&counter));

        queue.collect();
        queue.collect();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(queue.total_executed(), 1);
    }

    #[test]
    fn test_panicking_item_does_not_drop_the_rest() {
        let queue = TrashQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        queue.push(counter_item(&counter));
        queue.trash(|| panic!("deletion failed"));
        queue.push(counter_item(&counter));

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| queue.collect()));
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(queue.total_executed(), 3);
        assert!(!queue.is_collecting());

        // Nothing runs twice and the queue keeps working.
        queue.push(counter_item(&counter));
        assert_eq!(queue.collect().executed, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_empty_collect_is_noop() {
        let queue = TrashQueue::new();
        assert_eq!(queue.collect(), CollectStats::default());
    }

    #[test]
    fn test_item_trashed_during_collect_runs_next_time() {
        let queue = Arc::new(TrashQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_queue = Arc::clone(&queue);
        let inner_counter = counter.clone();
        queue.trash(move || {
            inner_queue.push(counter_item(&inner_counter));
        });

        assert_eq!(queue.collect().executed, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 1);

        assert_eq!(queue.collect().executed, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_collect_is_noop() {
        let queue = Arc::new(TrashQueue::new());
        let nested = Arc::new(parking_lot::Mutex::new(None));

        let inner_queue = Arc::clone(&queue);
        let inner_nested = nested.clone();
        queue.trash(move || {
            *inner_nested.lock() = Some(inner_queue.collect());
        });

        assert_eq!(queue.collect().executed, 1);
        assert_eq!(*nested.lock(), Some(CollectStats::default()));
        assert!(!queue.is_collecting());
    }

    #[test]
    fn test_compaction_signalled_past_threshold() {
        let queue = TrashQueue::with_config(3, RetryPolicy::default());
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            queue.push(counter_item(&counter));
        }
        assert!(!queue.collect().compact_due);

        queue.push(counter_item(&counter));
        assert!(queue.collect().compact_due);

        // Counter was reset.
        queue.push(counter_item(&counter));
        assert!(!queue.collect().compact_due);
    }

    #[test]
    fn test_push_gives_up_when_front_is_held() {
        let queue = TrashQueue::with_config(
            DEFAULT_COMPACT_THRESHOLD,
            RetryPolicy::new(2, std::time::Duration::from_millis(1)),
        );
        let counter = Arc::new(AtomicUsize::new(0));

        let front = queue.front.lock();
        let pushed = thread::scope(|scope| {
            scope
                .spawn(|| queue.push(counter_item(&counter)))
                .join()
                .unwrap()
        });
        drop(front);

        assert!(!pushed);
        assert_eq!(queue.collect().executed, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(TrashQueue::with_config(
            DEFAULT_COMPACT_THRESHOLD,
            RetryPolicy::new(1000, std::time::Duration::from_millis(5)),
        ));
        let counter = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        assert!(queue.push(counter_item(&counter)));
                    }
                })
            })
            .collect();

        let mut executed = 0;
        while producers.iter().any(|p| !p.is_finished()) {
            executed += queue.collect().executed;
        }
        for producer in producers {
            producer.join().unwrap();
        }
        executed += queue.collect().executed;

        assert_eq!(executed, 1000);
        assert_eq!(counter.load(Ordering::SeqCst), 1000);
    }
}
