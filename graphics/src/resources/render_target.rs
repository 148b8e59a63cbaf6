//! Offscreen render target resource.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, RenderTargetHandle};
use crate::manager::ManagerRef;
use crate::types::{Extent3d, RenderTargetDescriptor};

use super::{InvalidationObserver, Observers, Restorable};

/// An offscreen render target.
///
/// Restoring recreates the storage from the descriptor. Rendered content is
/// not preserved; observers registered with
/// [`on_invalidated`](Self::on_invalidated) are the place to schedule a
/// re-render.
pub struct RenderTarget {
    descriptor: RenderTargetDescriptor,
    backend: Arc<dyn GpuBackend>,
    manager: ManagerRef,
    handle: Mutex<Option<RenderTargetHandle>>,
    observers: Observers,
}

impl RenderTarget {
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        manager: ManagerRef,
        descriptor: RenderTargetDescriptor,
        handle: RenderTargetHandle,
    ) -> Self {
        Self {
            descriptor,
            backend,
            manager,
            handle: Mutex::new(Some(handle)),
            observers: Observers::default(),
        }
    }

    /// The render target descriptor.
    pub fn descriptor(&self) -> &RenderTargetDescriptor {
        &self.descriptor
    }

    /// Size of the color attachment.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Current GPU handle, if the target has not been invalidated.
    pub fn handle(&self) -> Option<RenderTargetHandle> {
        *self.handle.lock()
    }

    /// Register a callback run once per valid-to-invalid transition.
    pub fn on_invalidated(&self, observer: impl Fn() + Send + Sync + 'static) {
        let observer: InvalidationObserver = Arc::new(observer);
        self.observers.add(observer);
    }
}

impl Restorable for RenderTarget {
    fn is_valid(&self) -> bool {
        let lost = {
            let mut handle = self.handle.lock();
            match *handle {
                Some(h) if self.backend.is_render_target_live(h) => return true,
                Some(_) => {
                    *handle = None;
                    true
                }
                None => false,
            }
        };
        if lost {
            log::debug!(
                "RenderTarget: {:?} lost its GPU object",
                self.descriptor.label
            );
            self.observers.notify();
        }
        false
    }

    fn restore(&self) -> bool {
        if self.is_valid() {
            return true;
        }
        let mut handle = self.handle.lock();
        if let Some(h) = *handle
            && self.backend.is_render_target_live(h)
        {
            return true;
        }
        match self.backend.create_render_target(&self.descriptor) {
            Ok(h) => {
                *handle = Some(h);
                true
            }
            Err(e) => {
                log::error!(
                    "RenderTarget: failed to recreate {:?}: {}",
                    self.descriptor.label,
                    e
                );
                false
            }
        }
    }

    fn label(&self) -> &str {
        self.descriptor
            .label
            .as_deref()
            .unwrap_or("<unnamed render target>")
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        let Some(handle) = self.handle.get_mut().take() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.manager.with(|shared| {
            shared.trash.trash(move || {
                if backend.is_render_target_live(handle) {
                    backend.delete_render_target(handle);
                }
            })
        });
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("size", &self.descriptor.size)
            .field("color_format", &self.descriptor.color_format)
            .field("depth_format", &self.descriptor.depth_format)
            .field("label", &self.descriptor.label)
            .field("handle", &self.handle())
            .finish()
    }
}

static_assertions::assert_impl_all!(RenderTarget: Send, Sync);
