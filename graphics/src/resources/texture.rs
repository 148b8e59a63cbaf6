//! GPU texture resource.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::assets::{AssetBundle, ImageDecoder, ImageFormat};
use crate::backend::{GpuBackend, TextureHandle};
use crate::error::{GraphicsError, GraphicsResult};
use crate::manager::ManagerRef;
use crate::types::{Extent3d, Rect, TextureDescriptor, TextureFormat, TextureUsage};

use super::{InvalidationObserver, Observers, Restorable};

/// Where a texture's pixels come from when its storage has to be recreated.
#[derive(Clone)]
pub enum TextureSource {
    /// Tightly packed pixels kept in memory.
    Pixels(Arc<[u8]>),
    /// Encoded image re-read from a bundle and decoded again.
    Bundle {
        /// Bundle holding the encoded image.
        bundle: Arc<dyn AssetBundle>,
        /// Bundle-relative path.
        path: String,
        /// Decoder for the encoded bytes.
        decoder: Arc<dyn ImageDecoder>,
    },
    /// Zero-filled storage; content is owned by whoever writes into it.
    Blank,
}

impl std::fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pixels(pixels) => write!(f, "TextureSource::Pixels({} bytes)", pixels.len()),
            Self::Bundle { path, .. } => f
                .debug_struct("TextureSource::Bundle")
                .field("path", path)
                .finish_non_exhaustive(),
            Self::Blank => write!(f, "TextureSource::Blank"),
        }
    }
}

/// Create texture storage from a retained source.
pub(crate) fn create_storage(
    backend: &dyn GpuBackend,
    descriptor: &TextureDescriptor,
    source: &TextureSource,
) -> GraphicsResult<TextureHandle> {
    match source {
        TextureSource::Pixels(pixels) => backend.create_texture(descriptor, Some(pixels.as_ref())),
        TextureSource::Blank => backend.create_texture(descriptor, None),
        TextureSource::Bundle {
            bundle,
            path,
            decoder,
        } => {
            let bytes = bundle.read_all(path)?;
            let image = decoder.decode(&bytes, ImageFormat::from_path(path))?;
            if image.width != descriptor.size.width || image.height != descriptor.size.height {
                return Err(GraphicsError::ResourceCreationFailed(format!(
                    "{path} is now {}x{}, texture was created as {}x{}",
                    image.width, image.height, descriptor.size.width, descriptor.size.height
                )));
            }
            backend.create_texture(descriptor, Some(image.pixels.as_slice()))
        }
    }
}

/// A GPU texture resource.
///
/// Textures are created by [`ResourceManager`](crate::ResourceManager) and are
/// reference-counted. The texture keeps its descriptor and pixel source, so
/// [`Restorable::restore`] can recreate identical storage after a context
/// loss. Content written later through [`write_region`](Self::write_region)
/// is not retained.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ember_graphics::{DummyBackend, ResourceManager, ResourceManagerConfig, Restorable};
/// use ember_graphics::types::{TextureDescriptor, TextureFormat, TextureUsage};
///
/// let manager = ResourceManager::new(Arc::new(DummyBackend::new()), ResourceManagerConfig::default());
/// let texture = manager
///     .create_writable_texture(TextureDescriptor::new_2d(
///         64,
///         64,
///         TextureFormat::Rgba8Unorm,
///         TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
///     ))
///     .unwrap();
/// assert_eq!(texture.width(), 64);
/// assert!(texture.is_valid());
/// ```
pub struct Texture {
    descriptor: TextureDescriptor,
    source: TextureSource,
    backend: Arc<dyn GpuBackend>,
    manager: ManagerRef,
    handle: Mutex<Option<TextureHandle>>,
    generation: AtomicU64,
    observers: Observers,
}

impl Texture {
    /// Wrap freshly created storage (called by the resource manager).
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        manager: ManagerRef,
        descriptor: TextureDescriptor,
        source: TextureSource,
        handle: TextureHandle,
    ) -> Self {
        Self {
            descriptor,
            source,
            backend,
            manager,
            handle: Mutex::new(Some(handle)),
            generation: AtomicU64::new(0),
            observers: Observers::default(),
        }
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the retained pixel source.
    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.size.height
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Current GPU handle, if the texture has not been invalidated.
    ///
    /// Does not query the backend; use [`Restorable::is_valid`] for that.
    pub fn handle(&self) -> Option<TextureHandle> {
        *self.handle.lock()
    }

    /// Number of times the storage has been recreated.
    ///
    /// Content written into the previous storage is gone whenever this
    /// changes.
    pub fn content_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Register a callback run once per valid-to-invalid transition.
    pub fn on_invalidated(&self, observer: impl Fn() + Send + Sync + 'static) {
        let observer: InvalidationObserver = Arc::new(observer);
        self.observers.add(observer);
    }

    /// Upload tightly packed bytes into `region`.
    ///
    /// # Errors
    ///
    /// Fails if the texture was not created with [`TextureUsage::COPY_DST`],
    /// if its GPU object is gone, or if the region or data size is wrong.
    pub fn write_region(&self, region: Rect, data: &[u8]) -> GraphicsResult<()> {
        if !self.descriptor.usage.contains(TextureUsage::COPY_DST) {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?} is not writable",
                self.descriptor.label
            )));
        }
        let handle = self.handle().ok_or_else(|| {
            GraphicsError::ContextLost(format!("texture {:?} is invalid", self.descriptor.label))
        })?;
        self.backend.write_texture(handle, region, data)
    }

    /// Upload typed pixels into `region`.
    pub fn write_pixels<P: bytemuck::Pod>(&self, region: Rect, pixels: &[P]) -> GraphicsResult<()> {
        self.write_region(region, bytemuck::cast_slice(pixels))
    }
}

impl Restorable for Texture {
    fn is_valid(&self) -> bool {
        let lost = {
            let mut handle = self.handle.lock();
            match *handle {
                Some(h) if self.backend.is_texture_live(h) => return true,
                Some(_) => {
                    *handle = None;
                    true
                }
                None => false,
            }
        };
        if lost {
            log::debug!("Texture: {:?} lost its GPU object", self.descriptor.label);
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
            && self.backend.is_texture_live(h)
        {
            return true;
        }
        match create_storage(self.backend.as_ref(), &self.descriptor, &self.source) {
            Ok(h) => {
                *handle = Some(h);
                self.generation.fetch_add(1, Ordering::AcqRel);
                log::trace!(
                    "Texture: restored {:?} as #{}",
                    self.descriptor.label,
                    h.raw()
                );
                true
            }
            Err(e) => {
                log::error!(
                    "Texture: failed to restore {:?}: {}",
                    self.descriptor.label,
                    e
                );
                false
            }
        }
    }

    fn label(&self) -> &str {
        self.descriptor.label.as_deref().unwrap_or("<unnamed texture>")
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let Some(handle) = self.handle.get_mut().take() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        let queued = self.manager.with(|shared| {
            shared.trash.trash(move || {
                if backend.is_texture_live(handle) {
                    backend.delete_texture(handle);
                }
            })
        });
        if queued.is_none() {
            log::trace!(
                "Texture: manager gone, not deleting {:?}",
                self.descriptor.label
            );
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .field("handle", &self.handle())
            .field("source", &self.source)
            .field("observers", &self.observers.len())
            .finish()
    }
}

// Ensure Texture is Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::manager::{ResourceManager, ResourceManagerConfig};
    use std::sync::atomic::AtomicUsize;

    fn create_test_manager() -> (Arc<DummyBackend>, ResourceManager) {
        let backend = Arc::new(DummyBackend::new());
        let manager = ResourceManager::new(backend.clone(), ResourceManagerConfig::default());
        (backend, manager)
    }

    fn writable_desc(width: u32, height: u32) -> TextureDescriptor {
        TextureDescriptor::new_2d(
            width,
            height,
            TextureFormat::Rgba8Unorm,
            TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
        )
        .with_label("test")
    }

    #[test]
    fn test_texture_debug() {
        let (_backend, manager) = create_test_manager();
        let texture = manager.create_writable_texture(writable_desc(8, 8)).unwrap();
        let debug = format!("{:?}", texture);
        assert!(debug.contains("Texture"));
        assert!(debug.contains("Blank"));
    }

    #[test]
    fn test_invalidation_observed_once() {
        let (backend, manager) = create_test_manager();
        let texture = manager.create_writable_texture(writable_desc(8, 8)).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        texture.on_invalidated(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(texture.is_valid());
        backend.lose_context();
        assert!(!texture.is_valid());
        assert!(!texture.is_valid());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(texture.handle().is_none());
    }

    #[test]
    fn test_restore_reuploads_pixels() {
        let (backend, manager) = create_test_manager();
        let pixels: Vec<u8> = (0..16).collect();
        let texture = manager
            .create_texture(
                TextureDescriptor::new_2d(2, 2, TextureFormat::Rgba8Unorm, TextureUsage::default()),
                pixels.clone(),
            )
            .unwrap();
        let before = texture.handle().unwrap();

        backend.lose_context();
        assert!(texture.restore());
        let after = texture.handle().unwrap();
        assert_ne!(before, after);
        assert_eq!(texture.content_generation(), 1);
        assert_eq!(backend.read_texture(after).unwrap(), pixels);

        // Already valid: no new storage.
        assert!(texture.restore());
        assert_eq!(texture.handle(), Some(after));
        assert_eq!(texture.content_generation(), 1);
    }

    #[test]
    fn test_restore_failure_keeps_invalid() {
        let (backend, manager) = create_test_manager();
        let texture = manager.create_writable_texture(writable_desc(4, 4)).unwrap();
        backend.lose_context();
        backend.set_fail_creation(true);
        assert!(!texture.restore());
        assert!(!texture.is_valid());

        backend.set_fail_creation(false);
        assert!(texture.restore());
        assert!(texture.is_valid());
    }

    #[test]
    fn test_write_region() {
        let (backend, manager) = create_test_manager();
        let texture = manager.create_writable_texture(writable_desc(4, 4)).unwrap();
        let pixel: [u8; 4] = [9, 8, 7, 6];
        texture
            .write_pixels(Rect::new(3, 3, 1, 1), &[pixel])
            .unwrap();
        assert_eq!(
            backend
                .read_region(texture.handle().unwrap(), Rect::new(3, 3, 1, 1))
                .unwrap(),
            pixel.to_vec()
        );

        backend.lose_context();
        texture.is_valid();
        assert!(matches!(
            texture.write_pixels(Rect::new(0, 0, 1, 1), &[pixel]),
            Err(GraphicsError::ContextLost(_))
        ));
    }

    #[test]
    fn test_write_region_far_outside_bounds() {
        let (_backend, manager) = create_test_manager();
        let texture = manager.create_writable_texture(writable_desc(4, 4)).unwrap();
        assert!(matches!(
            texture.write_region(Rect::new(u32::MAX, 0, 2, 1), &[0; 8]),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_read_only_texture_rejects_writes() {
        let (_backend, manager) = create_test_manager();
        let texture = manager
            .create_texture(
                TextureDescriptor::new_2d(1, 1, TextureFormat::Rgba8Unorm, TextureUsage::TEXTURE_BINDING),
                vec![0; 4],
            )
            .unwrap();
        assert!(matches!(
            texture.write_region(Rect::new(0, 0, 1, 1), &[0; 4]),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_drop_defers_deletion_to_collect() {
        let (backend, manager) = create_test_manager();
        let texture = manager.create_writable_texture(writable_desc(4, 4)).unwrap();
        let handle = texture.handle().unwrap();

        drop(texture);
        assert!(backend.is_texture_live(handle));
        assert_eq!(manager.pending_trash(), 1);

        manager.collect();
        assert!(!backend.is_texture_live(handle));
        assert_eq!(backend.stats().textures_deleted, 1);
    }

    #[test]
    fn test_texture_outliving_manager() {
        let (backend, manager) = create_test_manager();
        let texture = manager.create_writable_texture(writable_desc(4, 4)).unwrap();
        drop(manager);
        assert!(texture.is_valid());
        drop(texture);
        assert_eq!(backend.stats().textures_deleted, 0);
    }
}
