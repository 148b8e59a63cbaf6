//! Resource manager.
//!
//! The [`ResourceManager`] is the entry point for creating context-dependent
//! GPU resources. It owns the two pieces of engine-wide mutable state of the
//! lifecycle layer:
//!
//! - the trash queue, which defers GPU deletions to the graphics thread
//! - the resource registry, which finds and restores resources after a
//!   context loss
//!
//! ```text
//!   ResourceManager ──Arc──► BackRef<Arc<ManagerShared>>
//!        │                         ▲
//!        │ creates                 │ WeakBackRef (ManagerRef)
//!        ▼                         │
//!   Texture / ShaderProgram / RenderTarget / TextureAtlas
//!        │ Drop
//!        └──► trash.push(delete closure) ──► collect() on the graphics thread
//! ```
//!
//! Resources reach the manager only through a [`WeakBackRef`], so a resource
//! that outlives its manager drops its GPU handle silently instead of touching
//! freed state.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use ember_core::{BackRef, CollectStats, RetryPolicy, TrashQueue, WeakBackRef};

use crate::assets::{AssetBundle, ImageDecoder, ImageFormat, StandardImageDecoder};
use crate::backend::GpuBackend;
use crate::error::{GraphicsError, GraphicsResult};
use crate::registry::{ResourceRegistry, RestoreReport};
use crate::resources::{
    RenderTarget, Restorable, ShaderProgram, Texture, TextureSource, create_storage,
};
use crate::types::{
    ProgramSource, RenderTargetDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
};

/// Configuration for a [`ResourceManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceManagerConfig {
    /// Executed trash closures after which the registry is compacted.
    pub compact_threshold: usize,
    /// Retry policy for the manager's back-reference and trash locks.
    pub lock_retry: RetryPolicy,
}

impl ResourceManagerConfig {
    /// Set the compaction threshold.
    pub fn with_compact_threshold(mut self, threshold: usize) -> Self {
        self.compact_threshold = threshold;
        self
    }

    /// Set the lock retry policy.
    pub fn with_lock_retry(mut self, policy: RetryPolicy) -> Self {
        self.lock_retry = policy;
        self
    }
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            compact_threshold: ember_core::trash::DEFAULT_COMPACT_THRESHOLD,
            lock_retry: RetryPolicy::default(),
        }
    }
}

/// State shared between the manager and the objects it creates.
pub(crate) struct ManagerShared {
    pub(crate) backend: Arc<dyn GpuBackend>,
    pub(crate) trash: TrashQueue,
    pub(crate) registry: ResourceRegistry,
    pub(crate) decoder: Arc<dyn ImageDecoder>,
    pub(crate) config: ResourceManagerConfig,
}

/// Weak handle from a created object back to its manager.
pub(crate) type ManagerRef = WeakBackRef<Arc<ManagerShared>>;

impl ManagerShared {
    fn validate_size(&self, width: u32, height: u32) -> GraphicsResult<()> {
        let max_dim = self.backend.max_texture_dimension();
        if width > max_dim || height > max_dim {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimension exceeds maximum {max_dim}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn register<R: Restorable + 'static>(&self, resource: &Arc<R>) {
        let weak = Arc::downgrade(resource);
        self.registry.register(weak);
    }

    pub(crate) fn create_texture(
        &self,
        owner: &ManagerRef,
        descriptor: TextureDescriptor,
        source: TextureSource,
    ) -> GraphicsResult<Arc<Texture>> {
        self.validate_size(descriptor.size.width, descriptor.size.height)?;
        let handle = create_storage(self.backend.as_ref(), &descriptor, &source)?;
        let texture = Arc::new(Texture::new(
            Arc::clone(&self.backend),
            owner.clone(),
            descriptor,
            source,
            handle,
        ));
        self.register(&texture);

        log::trace!(
            "ResourceManager: created texture {:?}, size={}x{}",
            texture.descriptor().label,
            texture.width(),
            texture.height()
        );
        Ok(texture)
    }
}

/// Creates context-dependent resources and drives the per-frame GC and
/// restore cycle.
///
/// The thread that creates the manager is recorded as the graphics thread.
/// [`collect`](Self::collect) and
/// [`check_and_restore_resources`](Self::check_and_restore_resources) must be
/// called on it; creation calls are expected there too since they issue GPU
/// commands.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ember_graphics::{DummyBackend, ResourceManager, ResourceManagerConfig};
/// use ember_graphics::types::ProgramSource;
///
/// let manager = ResourceManager::new(Arc::new(DummyBackend::new()), ResourceManagerConfig::default());
/// let program = manager
///     .create_program(ProgramSource::new("void main() {}", "void main() {}"))
///     .unwrap();
/// drop(program);
///
/// // The GPU deletion runs on the next collect.
/// assert_eq!(manager.pending_trash(), 1);
/// assert_eq!(manager.collect().executed, 1);
/// ```
pub struct ResourceManager {
    shared: Arc<ManagerShared>,
    guard: Arc<BackRef<Arc<ManagerShared>>>,
    graphics_thread: ThreadId,
}

impl ResourceManager {
    /// Create a manager using the standard image decoder.
    pub fn new(backend: Arc<dyn GpuBackend>, config: ResourceManagerConfig) -> Self {
        Self::with_decoder(backend, config, Arc::new(StandardImageDecoder))
    }

    /// Create a manager with a custom image decoder.
    pub fn with_decoder(
        backend: Arc<dyn GpuBackend>,
        config: ResourceManagerConfig,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        log::info!("ResourceManager: created on {}", backend.name());
        let shared = Arc::new(ManagerShared {
            backend,
            trash: TrashQueue::with_config(config.compact_threshold, config.lock_retry),
            registry: ResourceRegistry::new(),
            decoder,
            config,
        });
        let guard = Arc::new(BackRef::with_policy(Arc::clone(&shared), config.lock_retry));
        Self {
            shared,
            guard,
            graphics_thread: thread::current().id(),
        }
    }

    /// Weak handle handed to created objects.
    pub(crate) fn manager_ref(&self) -> ManagerRef {
        WeakBackRef::new(&self.guard)
    }

    fn debug_assert_graphics_thread(&self, operation: &str) {
        debug_assert_eq!(
            thread::current().id(),
            self.graphics_thread,
            "ResourceManager::{operation} must run on the graphics thread"
        );
    }

    /// The GPU backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.shared.backend
    }

    /// The manager configuration.
    pub fn config(&self) -> &ResourceManagerConfig {
        &self.shared.config
    }

    /// Largest texture width or height the backend accepts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.shared.backend.max_texture_dimension()
    }

    // ========================================================================
    // Resource creation
    // ========================================================================

    /// Create a texture from tightly packed pixels.
    ///
    /// The pixels are retained and re-uploaded if the texture has to be
    /// restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensions are zero or exceed the backend
    /// limit, if the pixel data has the wrong size, or if creation fails.
    pub fn create_texture(
        &self,
        descriptor: TextureDescriptor,
        pixels: impl Into<Arc<[u8]>>,
    ) -> GraphicsResult<Arc<Texture>> {
        self.shared.create_texture(
            &self.manager_ref(),
            descriptor,
            TextureSource::Pixels(pixels.into()),
        )
    }

    /// Create a zero-filled texture meant for sub-image uploads.
    ///
    /// [`TextureUsage::COPY_DST`] is added to the descriptor's usage.
    pub fn create_writable_texture(
        &self,
        mut descriptor: TextureDescriptor,
    ) -> GraphicsResult<Arc<Texture>> {
        descriptor.usage |= TextureUsage::COPY_DST;
        self.shared
            .create_texture(&self.manager_ref(), descriptor, TextureSource::Blank)
    }

    /// Load and decode an image from a bundle.
    ///
    /// The texture remembers the bundle and path and decodes the asset again
    /// when it has to be restored.
    pub fn load_texture(
        &self,
        bundle: Arc<dyn AssetBundle>,
        path: &str,
    ) -> GraphicsResult<Arc<Texture>> {
        let bytes = bundle.read_all(path)?;
        let image = self
            .shared
            .decoder
            .decode(&bytes, ImageFormat::from_path(path))?;
        self.shared.validate_size(image.width, image.height)?;

        let descriptor = TextureDescriptor::new_2d(
            image.width,
            image.height,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        )
        .with_label(path);
        let handle = self
            .shared
            .backend
            .create_texture(&descriptor, Some(image.pixels.as_slice()))?;
        let source = TextureSource::Bundle {
            bundle,
            path: path.to_owned(),
            decoder: Arc::clone(&self.shared.decoder),
        };
        let texture = Arc::new(Texture::new(
            Arc::clone(&self.shared.backend),
            self.manager_ref(),
            descriptor,
            source,
            handle,
        ));
        self.shared.register(&texture);

        log::trace!(
            "ResourceManager: loaded texture {} ({}x{}, alpha: {})",
            path,
            image.width,
            image.height,
            image.has_alpha
        );
        Ok(texture)
    }

    /// Compile and link a shader program.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::ShaderCompilationFailed`] if the backend
    /// rejects the source.
    pub fn create_program(&self, source: ProgramSource) -> GraphicsResult<Arc<ShaderProgram>> {
        let handle = self.shared.backend.create_program(&source)?;
        let program = Arc::new(ShaderProgram::new(
            Arc::clone(&self.shared.backend),
            self.manager_ref(),
            source,
            handle,
        ));
        self.shared.register(&program);
        log::trace!(
            "ResourceManager: created program {:?}",
            program.source().label
        );
        Ok(program)
    }

    /// Read vertex and fragment sources from a bundle and link them.
    pub fn load_program(
        &self,
        bundle: &dyn AssetBundle,
        vertex_path: &str,
        fragment_path: &str,
    ) -> GraphicsResult<Arc<ShaderProgram>> {
        let vertex = bundle.read_to_string(vertex_path)?;
        let fragment = bundle.read_to_string(fragment_path)?;
        self.create_program(
            ProgramSource::new(vertex, fragment).with_label(format!("{vertex_path}+{fragment_path}")),
        )
    }

    /// Create an offscreen render target.
    pub fn create_render_target(
        &self,
        descriptor: RenderTargetDescriptor,
    ) -> GraphicsResult<Arc<RenderTarget>> {
        self.shared
            .validate_size(descriptor.size.width, descriptor.size.height)?;
        let handle = self.shared.backend.create_render_target(&descriptor)?;
        let target = Arc::new(RenderTarget::new(
            Arc::clone(&self.shared.backend),
            self.manager_ref(),
            descriptor,
            handle,
        ));
        self.shared.register(&target);
        Ok(target)
    }

    /// Add an externally created resource to the restore registry.
    pub fn register_resource<R: Restorable + 'static>(&self, resource: &Arc<R>) {
        self.shared.register(resource);
    }

    // ========================================================================
    // GC and restore cycle
    // ========================================================================

    /// Queue a closure for the next [`collect`](Self::collect).
    ///
    /// Safe from any thread. Returns `false` if the closure was dropped
    /// because the queue stayed busy past the retry budget.
    pub fn trash(&self, item: impl FnOnce() + Send + 'static) -> bool {
        self.shared.trash.trash(item)
    }

    /// Run all queued deletions. Call once per frame on the graphics thread.
    ///
    /// Compacts the registry whenever enough closures have run since the
    /// previous compaction.
    pub fn collect(&self) -> CollectStats {
        self.debug_assert_graphics_thread("collect");
        let stats = self.shared.trash.collect();
        if stats.compact_due {
            let removed = self.shared.registry.compact();
            log::debug!(
                "ResourceManager: compacted registry, removed {} expired entries",
                removed
            );
        }
        stats
    }

    /// Remove registry entries whose resource has been dropped.
    pub fn compact_registry(&self) -> usize {
        self.shared.registry.compact()
    }

    /// Restore every registered resource that lost its GPU object.
    ///
    /// Call on the graphics thread after a context-recreate event, before
    /// rendering resumes.
    pub fn check_and_restore_resources(&self) -> RestoreReport {
        self.debug_assert_graphics_thread("check_and_restore_resources");
        let report = self.shared.registry.check_and_restore();
        log::info!(
            "ResourceManager: restore pass checked {}, restored {}/{} invalid",
            report.checked,
            report.restored,
            report.invalid
        );
        report
    }

    /// Number of registry entries, including expired ones not yet compacted.
    pub fn registered_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Number of closures waiting for the next collect.
    pub fn pending_trash(&self) -> usize {
        self.shared.trash.pending()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        // Nothing can be queued once the target is cleared, so the final
        // collect sees every pending deletion.
        drop(self.guard.notify_target_deleted());
        let stats = self.shared.trash.collect();
        log::info!(
            "ResourceManager: destroyed, ran {} final trash items",
            stats.executed
        );
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("backend", &self.shared.backend.name())
            .field("registry", &self.shared.registry)
            .field("trash", &self.shared.trash)
            .field("config", &self.shared.config)
            .finish()
    }
}

// Ensure ResourceManager is Send + Sync
static_assertions::assert_impl_all!(ResourceManager: Send, Sync);
