//! Linked shader program resource.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, ProgramHandle};
use crate::manager::ManagerRef;
use crate::types::ProgramSource;

use super::{InvalidationObserver, Observers, Restorable};

/// A linked shader program.
///
/// Keeps its vertex and fragment source so it can be recompiled after a
/// context loss.
pub struct ShaderProgram {
    source: ProgramSource,
    backend: Arc<dyn GpuBackend>,
    manager: ManagerRef,
    handle: Mutex<Option<ProgramHandle>>,
    observers: Observers,
}

impl ShaderProgram {
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        manager: ManagerRef,
        source: ProgramSource,
        handle: ProgramHandle,
    ) -> Self {
        Self {
            source,
            backend,
            manager,
            handle: Mutex::new(Some(handle)),
            observers: Observers::default(),
        }
    }

    /// The retained source text.
    pub fn source(&self) -> &ProgramSource {
        &self.source
    }

    /// Current GPU handle, if the program has not been invalidated.
    pub fn handle(&self) -> Option<ProgramHandle> {
        *self.handle.lock()
    }

    /// Register a callback run once per valid-to-invalid transition.
    pub fn on_invalidated(&self, observer: impl Fn() + Send + Sync + 'static) {
        let observer: InvalidationObserver = Arc::new(observer);
        self.observers.add(observer);
    }
}

impl Restorable for ShaderProgram {
    fn is_valid(&self) -> bool {
        let lost = {
            let mut handle = self.handle.lock();
            match *handle {
                Some(h) if self.backend.is_program_live(h) => return true,
                Some(_) => {
                    *handle = None;
                    true
                }
                None => false,
            }
        };
        if lost {
            log::debug!("ShaderProgram: {:?} lost its GPU object", self.source.label);
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
            && self.backend.is_program_live(h)
        {
            return true;
        }
        match self.backend.create_program(&self.source) {
            Ok(h) => {
                *handle = Some(h);
                log::trace!("ShaderProgram: recompiled {:?}", self.source.label);
                true
            }
            Err(e) => {
                log::error!(
                    "ShaderProgram: failed to recompile {:?}: {}",
                    self.source.label,
                    e
                );
                false
            }
        }
    }

    fn label(&self) -> &str {
        self.source.label.as_deref().unwrap_or("<unnamed program>")
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        let Some(handle) = self.handle.get_mut().take() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.manager.with(|shared| {
            shared.trash.trash(move || {
                if backend.is_program_live(handle) {
                    backend.delete_program(handle);
                }
            })
        });
    }
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("label", &self.source.label)
            .field("handle", &self.handle())
            .finish()
    }
}

static_assertions::assert_impl_all!(ShaderProgram: Send, Sync);
