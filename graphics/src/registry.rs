//! Weak registry of context-dependent resources.
//!
//! Every resource the manager creates is recorded here as a weak reference.
//! After a context loss the registry walks the live entries, asks each one
//! whether its GPU object survived, and restores those that did not.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::resources::Restorable;

/// Outcome of one [`ResourceRegistry::check_and_restore`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Live entries inspected.
    pub checked: usize,
    /// Entries that reported themselves invalid.
    pub invalid: usize,
    /// Invalid entries whose restore succeeded.
    pub restored: usize,
    /// Invalid entries whose restore failed; they are retried on the next pass.
    pub failed: usize,
}

impl RestoreReport {
    /// Returns true if every invalid entry was restored.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Ordered list of weak references to restorable resources.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: Mutex<Vec<Weak<dyn Restorable>>>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource.
    pub fn register(&self, resource: Weak<dyn Restorable>) {
        self.entries.lock().push(resource);
    }

    /// Remove entries whose resource has been dropped. Returns how many were
    /// removed.
    pub fn compact(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|w| w.strong_count() > 0);
        before - entries.len()
    }

    /// Number of entries, including expired ones not yet compacted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of entries whose resource is still alive.
    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Restore every live resource that reports itself invalid.
    ///
    /// The registry lock is only held while taking the snapshot; validity
    /// checks and restores run outside it, so resources may be created or
    /// dropped concurrently. Must be called on the graphics thread.
    pub fn check_and_restore(&self) -> RestoreReport {
        let snapshot: Vec<Arc<dyn Restorable>> =
            self.entries.lock().iter().filter_map(Weak::upgrade).collect();

        let mut report = RestoreReport {
            checked: snapshot.len(),
            ..Default::default()
        };

        let invalid: Vec<_> = snapshot
            .into_iter()
            .filter(|resource| !resource.is_valid())
            .collect();
        report.invalid = invalid.len();

        for resource in &invalid {
            if resource.restore() {
                report.restored += 1;
                log::trace!("ResourceRegistry: restored {}", resource.label());
            } else {
                report.failed += 1;
                log::error!(
                    "ResourceRegistry: {} could not be restored, will retry next pass",
                    resource.label()
                );
            }
        }
        drop(invalid);

        self.compact();
        report
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(ResourceRegistry: Send, Sync);
