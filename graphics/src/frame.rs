//! Per-frame driving of the GC and restore cycle.
//!
//! The [`FrameDriver`] is the piece of the render loop that keeps resources
//! healthy. At the start of each frame it checks whether the GPU context was
//! recreated and, if so, restores every resource before rendering resumes.
//! It then collects the deletions queued since the previous frame.
//!
//! ```text
//!   begin_frame()
//!     │
//!     ├─ context recreated? ──yes──► check_and_restore_resources()
//!     │                              atlases.check_and_restore()
//!     │
//!     └─ collect()  ──►  FrameReport
//! ```
//!
//! A recreation is detected either from an explicit
//! [`notify_context_recreated`](FrameDriver::notify_context_recreated) call,
//! typically from the windowing layer's event handler, or from a change of
//! [`GpuBackend::context_generation`](crate::GpuBackend::context_generation).
//! If a pass leaves anything unrestored, the next frame runs it again.

use std::sync::atomic::{AtomicBool, Ordering};

use ember_core::CollectStats;

use crate::atlas::{AtlasRestoreReport, TextureAtlasManager};
use crate::manager::ResourceManager;
use crate::registry::RestoreReport;

/// What happened during one [`FrameDriver::begin_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Index of the frame that was started.
    pub frame_index: u64,
    /// Registry pass, if a context recreation was handled this frame.
    pub restore: Option<RestoreReport>,
    /// Atlas pass, if a context recreation was handled this frame.
    pub atlas_restore: Option<AtlasRestoreReport>,
    /// Deferred deletions run this frame.
    pub collected: CollectStats,
}

impl FrameReport {
    /// Returns true if a restore pass ran and left resources invalid.
    pub fn restore_incomplete(&self) -> bool {
        self.restore.is_some_and(|r| !r.is_complete())
            || self.atlas_restore.is_some_and(|r| !r.is_complete())
    }
}

/// Owns the resource and atlas managers and runs their per-frame cycle.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ember_graphics::{DummyBackend, FrameDriver, ResourceManager, ResourceManagerConfig};
///
/// let backend = Arc::new(DummyBackend::new());
/// let mut driver = FrameDriver::new(ResourceManager::new(backend.clone(), ResourceManagerConfig::default()));
///
/// let report = driver.begin_frame();
/// assert!(report.restore.is_none());
///
/// backend.lose_context();
/// let report = driver.begin_frame();
/// assert!(report.restore.is_some());
/// ```
pub struct FrameDriver {
    // Declared before the manager so atlases drop first and their textures'
    // deletions reach the manager's final collect.
    atlases: TextureAtlasManager,
    manager: ResourceManager,
    last_generation: u64,
    pending_recreate: AtomicBool,
    frame_index: u64,
}

impl FrameDriver {
    /// Take ownership of a manager and create its atlas manager.
    pub fn new(manager: ResourceManager) -> Self {
        let atlases = TextureAtlasManager::new(&manager);
        let last_generation = manager.backend().context_generation();
        Self {
            atlases,
            manager,
            last_generation,
            pending_recreate: AtomicBool::new(false),
            frame_index: 0,
        }
    }

    /// The resource manager.
    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    /// The atlas manager.
    pub fn atlases(&self) -> &TextureAtlasManager {
        &self.atlases
    }

    /// Number of frames started so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Request a restore pass at the start of the next frame.
    pub fn notify_context_recreated(&self) {
        self.pending_recreate.store(true, Ordering::Release);
    }

    /// Returns true if the next frame will run a restore pass.
    pub fn restore_pending(&self) -> bool {
        self.pending_recreate.load(Ordering::Acquire)
            || self.manager.backend().context_generation() != self.last_generation
    }

    /// Start a frame: restore after a context recreation, then collect.
    ///
    /// Must be called on the graphics thread before any rendering of the
    /// frame.
    pub fn begin_frame(&mut self) -> FrameReport {
        let mut report = FrameReport {
            frame_index: self.frame_index,
            ..Default::default()
        };
        self.frame_index += 1;

        let generation = self.manager.backend().context_generation();
        let requested = self.pending_recreate.swap(false, Ordering::AcqRel);
        if requested || generation != self.last_generation {
            log::info!(
                "FrameDriver: context recreated (generation {} -> {}), restoring resources",
                self.last_generation,
                generation
            );
            self.last_generation = generation;

            let restore = self.manager.check_and_restore_resources();
            let atlas_restore = self.atlases.check_and_restore();
            if !restore.is_complete() || !atlas_restore.is_complete() {
                log::warn!(
                    "FrameDriver: {} resources and {} atlases still invalid, retrying next frame",
                    restore.failed,
                    atlas_restore.failed
                );
                self.pending_recreate.store(true, Ordering::Release);
            }
            report.restore = Some(restore);
            report.atlas_restore = Some(atlas_restore);
        }

        report.collected = self.manager.collect();
        report
    }
}

impl std::fmt::Debug for FrameDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDriver")
            .field("frame_index", &self.frame_index)
            .field("last_generation", &self.last_generation)
            .field("restore_pending", &self.restore_pending())
            .field("manager", &self.manager)
            .field("atlases", &self.atlases)
            .finish()
    }
}
