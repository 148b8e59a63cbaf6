//! Context-dependent GPU resources.
//!
//! This module contains the resource types created by [`ResourceManager`]:
//! - [`Texture`] - sampled or writable texture with retained pixel source
//! - [`ShaderProgram`] - linked program with retained source text
//! - [`RenderTarget`] - offscreen render target
//!
//! Resources are reference-counted with [`Arc`] and can be shared across
//! threads. Each one keeps the parameters it was created with so it can
//! recreate its GPU object after a context loss, and implements
//! [`Restorable`] so the manager's registry can find and restore it.
//!
//! Dropping the last reference never deletes the GPU object directly: the
//! deletion is queued on the manager's trash and runs on the graphics thread
//! during the next collect.
//!
//! [`ResourceManager`]: crate::ResourceManager
//! [`Arc`]: std::sync::Arc

mod program;
mod render_target;
mod texture;

use std::sync::Arc;

use parking_lot::Mutex;

pub use program::ShaderProgram;
pub use render_target::RenderTarget;
pub use texture::{Texture, TextureSource};

pub(crate) use texture::create_storage;

/// A resource whose GPU state can be lost and recreated.
pub trait Restorable: Send + Sync {
    /// Check the underlying GPU object.
    ///
    /// If the object is gone the resource flips to its invalidated state and
    /// notifies its observers before returning `false`.
    fn is_valid(&self) -> bool;

    /// Recreate the GPU object from the retained creation parameters.
    ///
    /// Returns `true` if the resource is valid afterwards. Calling this on a
    /// valid resource is a no-op.
    fn restore(&self) -> bool;

    /// Debug label used in logs.
    fn label(&self) -> &str {
        "<unnamed>"
    }
}

/// Callback run when a resource detects that its GPU object is gone.
pub type InvalidationObserver = Arc<dyn Fn() + Send + Sync>;

/// Observer list shared by the resource types.
#[derive(Default)]
pub(crate) struct Observers {
    list: Mutex<Vec<InvalidationObserver>>,
}

impl Observers {
    pub(crate) fn add(&self, observer: InvalidationObserver) {
        self.list.lock().push(observer);
    }

    /// Run every observer outside the list lock.
    pub(crate) fn notify(&self) {
        let snapshot: Vec<_> = self.list.lock().clone();
        for observer in snapshot {
            observer();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.list.lock().len()
    }
}
