//! Safe back-references from created objects to their owner.
//!
//! A long-lived owner (a resource manager, a texture atlas) hands out
//! [`WeakBackRef`]s to the objects it creates so they can call back into it,
//! for example to enqueue their own GPU deletion. The owner's state lives
//! inside a shared [`BackRef`] cell:
//!
//! ```text
//!   owner ──Arc──► BackRef { RwLock<Option<T>> } ◄──Weak── created objects
//!                      │
//!   use:    read lock  ─┤  Some(&T) while the owner is alive, None after
//!   delete: write lock ─┘  owner's Drop takes T out exactly once
//! ```
//!
//! A caller that obtains `Some(&T)` from [`BackRefHold::get`] is guaranteed the
//! owner cannot finish deleting until the hold is dropped: the deletion
//! notification needs the write lock, which is not granted while any read
//! hold is alive.
//!
//! Lock acquisition is bounded by a [`RetryPolicy`]. A reader that cannot get
//! the lock within the budget receives a null hold and proceeds as if the
//! owner were gone. The deletion notification falls back to a blocking write
//! once its budget is spent, so the target is never cleared while a reader
//! still uses it.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::retry::RetryPolicy;

/// Shared cell holding an owner's state until the owner is deleted.
///
/// The owner keeps an `Arc<BackRef<T>>` and must call
/// [`notify_target_deleted`](Self::notify_target_deleted) from its `Drop`.
/// Created objects keep a [`WeakBackRef`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ember_core::{BackRef, WeakBackRef};
///
/// let guard = Arc::new(BackRef::new(String::from("owner state")));
/// let weak = WeakBackRef::new(&guard);
///
/// assert_eq!(weak.with(|s| s.len()), Some(11));
///
/// let detached = guard.notify_target_deleted();
/// assert_eq!(detached.as_deref(), Some("owner state"));
/// assert_eq!(weak.with(|s| s.len()), None);
/// ```
pub struct BackRef<T> {
    target: RwLock<Option<T>>,
    policy: RetryPolicy,
}

impl<T> BackRef<T> {
    /// Wrap `target` with the default retry policy.
    pub fn new(target: T) -> Self {
        Self::with_policy(target, RetryPolicy::default())
    }

    /// Wrap `target` with a custom retry policy.
    pub fn with_policy(target: T, policy: RetryPolicy) -> Self {
        Self {
            target: RwLock::new(Some(target)),
            policy,
        }
    }

    /// The retry policy used for lock acquisition.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Acquire a read hold on the target.
    ///
    /// Recursive read acquisition is used, so a thread that already holds a
    /// hold can take another one without deadlocking against a queued
    /// deletion. If the lock cannot be acquired within the retry budget the
    /// returned hold is null.
    pub fn lock_target(&self) -> BackRefHold<'_, T> {
        let guard = self
            .policy
            .retry(|wait| self.target.try_read_recursive_for(wait));
        if guard.is_none() {
            log::warn!(
                "BackRef: read lock not acquired after {} attempts, treating target as gone",
                self.policy.attempts.max(1)
            );
        }
        BackRefHold { guard }
    }

    /// Clear the target, returning it to the caller.
    ///
    /// Called exactly once, from the owner's destructor. Blocks until no read
    /// hold is active. Subsequent calls return `None`.
    pub fn notify_target_deleted(&self) -> Option<T> {
        let mut guard = match self.policy.retry(|wait| self.target.try_write_for(wait)) {
            Some(guard) => guard,
            None => {
                log::warn!(
                    "BackRef: write lock not acquired within {:?}, waiting for readers to finish",
                    self.policy.budget()
                );
                self.target.write()
            }
        };
        guard.take()
    }

    /// Returns `true` while the owner has not notified deletion.
    pub fn is_target_alive(&self) -> bool {
        self.lock_target().get().is_some()
    }
}

impl<T> fmt::Debug for BackRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.target.try_read_recursive() {
            Some(guard) if guard.is_some() => "alive",
            Some(_) => "deleted",
            None => "<locked>",
        };
        f.debug_struct("BackRef")
            .field("target", &state)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Scope-bound read hold on a [`BackRef`] target.
///
/// Releasing the hold releases the read lock.
pub struct BackRefHold<'a, T> {
    guard: Option<RwLockReadGuard<'a, Option<T>>>,
}

impl<T> BackRefHold<'_, T> {
    /// The target, or `None` if the owner already notified deletion (or the
    /// lock could not be acquired).
    pub fn get(&self) -> Option<&T> {
        self.guard.as_ref().and_then(|guard| guard.as_ref())
    }

    /// Returns `true` if no target is available through this hold.
    pub fn is_null(&self) -> bool {
        self.get().is_none()
    }
}

impl<T> fmt::Debug for BackRefHold<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackRefHold")
            .field("null", &self.is_null())
            .finish()
    }
}

/// Weak handle to a [`BackRef`], held by objects created under an owner.
///
/// Never keeps the owner's state alive.
pub struct WeakBackRef<T>(Weak<BackRef<T>>);

impl<T> WeakBackRef<T> {
    /// Create a weak handle from the owner's strong one.
    pub fn new(back_ref: &Arc<BackRef<T>>) -> Self {
        Self(Arc::downgrade(back_ref))
    }

    /// Create a handle from an existing weak pointer.
    ///
    /// Useful with [`Arc::new_cyclic`] when the owner's state needs a handle
    /// to its own cell.
    pub fn from_weak(weak: Weak<BackRef<T>>) -> Self {
        Self(weak)
    }

    /// A handle that never resolves.
    pub fn dangling() -> Self {
        Self(Weak::new())
    }

    /// Run `f` against the target while holding a read lock.
    ///
    /// Returns `None` if the owner is gone.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let back_ref = self.0.upgrade()?;
        let hold = back_ref.lock_target();
        hold.get().map(f)
    }

    /// Returns `true` while the owner is alive.
    pub fn is_alive(&self) -> bool {
        self.0
            .upgrade()
            .is_some_and(|back_ref| back_ref.is_target_alive())
    }
}

impl<T> Clone for WeakBackRef<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for WeakBackRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakBackRef")
            .field("alive", &self.is_alive())
            .finish()
    }
}

static_assertions::assert_impl_all!(BackRef<Vec<u8>>: Send, Sync);
static_assertions::assert_impl_all!(WeakBackRef<Vec<u8>>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Owner state that records its own destruction.
    struct Tracked {
        destroyed: Arc<AtomicBool>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.destroyed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_lock_target_returns_object() {
        let guard = BackRef::new(7_u32);
        let hold = guard.lock_target();
        assert_eq!(hold.get(), Some(&7));
        assert!(!hold.is_null());
    }

    #[test]
    fn test_notify_clears_target_permanently() {
        let guard = BackRef::new(7_u32);
        assert_eq!(guard.notify_target_deleted(), Some(7));
        assert!(guard.lock_target().is_null());
        assert_eq!(guard.notify_target_deleted(), None);
        assert!(!guard.is_target_alive());
    }

    #[test]
    fn test_weak_handle_follows_owner() {
        let guard = Arc::new(BackRef::new(vec![1, 2, 3]));
        let weak = WeakBackRef::new(&guard);
        assert!(weak.is_alive());
        assert_eq!(weak.with(|v| v.len()), Some(3));

        guard.notify_target_deleted();
        assert!(!weak.is_alive());
        assert_eq!(weak.with(|v| v.len()), None);

        drop(guard);
        assert_eq!(weak.with(|v| v.len()), None);
        assert!(WeakBackRef::<u8>::dangling().with(|_| ()).is_none());
    }

    #[test]
    fn test_nested_holds_do_not_deadlock() {
        let guard = BackRef::new(1_u8);
        let outer = guard.lock_target();
        let inner = guard.lock_target();
        assert_eq!(outer.get(), inner.get());
    }

    #[test]
    fn test_notify_waits_for_active_reader() {
        let destroyed = Arc::new(AtomicBool::new(false));
        let guard = Arc::new(BackRef::with_policy(
            Tracked {
                destroyed: destroyed.clone(),
            },
            RetryPolicy::new(2, Duration::from_millis(1)),
        ));
        let reader_done = Arc::new(AtomicBool::new(false));
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();

        let reader = {
            let guard = guard.clone();
            let reader_done = reader_done.clone();
            thread::spawn(move || {
                let hold = guard.lock_target();
                let target = hold.get().expect("owner alive");
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                assert!(!target.destroyed.load(Ordering::SeqCst));
                reader_done.store(true, Ordering::SeqCst);
            })
        };

        locked_rx.recv().unwrap();
        drop(guard.notify_target_deleted());
        assert!(reader_done.load(Ordering::SeqCst));
        assert!(destroyed.load(Ordering::SeqCst));
        reader.join().unwrap();
    }

    #[test]
    fn test_concurrent_lockers_never_observe_destroyed_owner() {
        for _round in 0..20 {
            let destroyed = Arc::new(AtomicBool::new(false));
            let guard = Arc::new(BackRef::new(Tracked {
                destroyed: destroyed.clone(),
            }));
            let observed = Arc::new(AtomicUsize::new(0));

            let lockers: Vec<_> = (0..8)
                .map(|_| {
                    let weak = WeakBackRef::new(&guard);
                    let observed = observed.clone();
                    thread::spawn(move || {
                        for _ in 0..200 {
                            let seen = weak.with(|target| {
                                assert!(!target.destroyed.load(Ordering::SeqCst));
                                thread::yield_now();
                                assert!(!target.destroyed.load(Ordering::SeqCst));
                            });
                            if seen.is_some() {
                                observed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    })
                })
                .collect();

            thread::sleep(Duration::from_micros(200));
            drop(guard.notify_target_deleted());
            assert!(destroyed.load(Ordering::SeqCst));

            for locker in lockers {
                locker.join().unwrap();
            }
            assert!(observed.load(Ordering::Relaxed) <= 8 * 200);
        }
    }
}
