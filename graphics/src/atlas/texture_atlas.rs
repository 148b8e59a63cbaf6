//! A single texture atlas and its entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ember_core::{BackRef, RetryPolicy, WeakBackRef};
use parking_lot::Mutex;

use crate::error::{GraphicsError, GraphicsResult};
use crate::manager::{ManagerRef, ResourceManager};
use crate::resources::{Restorable, Texture, TextureSource};
use crate::types::{Rect, TextureDescriptor, TextureFormat, TextureUsage};

use super::packer::GuillotinePacker;

/// Callback that re-uploads an entry's pixels after the atlas texture has
/// been recreated.
///
/// Receives the restored texture and the entry's rectangle. Returns `true`
/// if the content was written.
pub type AtlasRestorer = Arc<dyn Fn(&Texture, Rect) -> bool + Send + Sync>;

struct EntrySlot {
    rect: Rect,
    restorer: Option<AtlasRestorer>,
    generation: Arc<AtomicU64>,
}

struct AtlasState {
    packer: GuillotinePacker,
    slots: HashMap<u32, EntrySlot>,
}

/// Shared part of an atlas, reachable from its entries through a back
/// reference and from the manager's registry.
pub(crate) struct AtlasCore {
    texture: Arc<Texture>,
    padding: u32,
    policy: RetryPolicy,
    state: Mutex<AtlasState>,
    /// Texture content generation whose entries have been restored.
    restored_generation: AtomicU64,
    restore_lock: Mutex<()>,
    losses: Arc<AtomicU64>,
}

impl AtlasCore {
    fn lock_state(&self) -> GraphicsResult<parking_lot::MutexGuard<'_, AtlasState>> {
        self.policy
            .retry(|wait| self.state.try_lock_for(wait))
            .ok_or(GraphicsError::LockContention("texture atlas"))
    }

    /// Largest sub-image this atlas can hold once padding is added.
    fn max_sub_image(&self) -> (u32, u32) {
        (
            self.texture.width().saturating_sub(self.padding),
            self.texture.height().saturating_sub(self.padding),
        )
    }

    fn reserve(
        &self,
        width: u32,
        height: u32,
        restorer: Option<AtlasRestorer>,
    ) -> GraphicsResult<(u32, Rect, Arc<AtomicU64>)> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(
                "sub-image dimensions cannot be zero".to_string(),
            ));
        }
        let (max_width, max_height) = self.max_sub_image();
        if width > max_width || height > max_height {
            return Err(GraphicsError::SubImageTooLarge {
                width,
                height,
                max_width,
                max_height,
            });
        }

        let mut state = self.lock_state()?;
        let cell = state
            .packer
            .allocate(width + self.padding, height + self.padding)
            .ok_or(GraphicsError::AtlasFull { width, height })?;

        let half = self.padding / 2;
        let rect = Rect::new(cell.rect.x + half, cell.rect.y + half, width, height);
        let generation = Arc::new(AtomicU64::new(self.texture.content_generation()));
        state.slots.insert(
            cell.id,
            EntrySlot {
                rect,
                restorer,
                generation: Arc::clone(&generation),
            },
        );
        Ok((cell.id, rect, generation))
    }

    fn release(&self, id: u32) {
        let mut state = self.state.lock();
        state.slots.remove(&id);
        if state.packer.release(id) {
            log::trace!("TextureAtlas: released entry {}", id);
        } else {
            log::warn!("TextureAtlas: release of unknown entry {}", id);
        }
    }

    fn entries_valid(&self) -> bool {
        self.restored_generation.load(Ordering::Acquire) == self.texture.content_generation()
    }

    /// Restore the backing texture, then run every entry's restorer once per
    /// recreated storage.
    fn restore_texture(&self) -> bool {
        let _restoring = self.restore_lock.lock();

        if !self.texture.restore() {
            log::warn!(
                "TextureAtlas: backing texture {} not restored, retrying next pass",
                self.texture.label()
            );
            return false;
        }
        let generation = self.texture.content_generation();
        if self.restored_generation.load(Ordering::Acquire) == generation {
            return true;
        }

        let snapshot: Vec<(Rect, Option<AtlasRestorer>, Arc<AtomicU64>)> = match self.lock_state() {
            Ok(state) => state
                .slots
                .values()
                .map(|slot| (slot.rect, slot.restorer.clone(), Arc::clone(&slot.generation)))
                .collect(),
            Err(e) => {
                log::warn!("TextureAtlas: entries not restored: {}", e);
                return false;
            }
        };

        let mut restored = 0usize;
        let mut failed = 0usize;
        let mut unrestorable = 0usize;
        for (rect, restorer, entry_generation) in snapshot {
            match restorer {
                Some(restorer) if restorer(&self.texture, rect) => {
                    entry_generation.store(generation, Ordering::Release);
                    restored += 1;
                }
                Some(_) => failed += 1,
                None => unrestorable += 1,
            }
        }

        self.restored_generation.store(generation, Ordering::Release);
        log::info!(
            "TextureAtlas: {} restored, {} entries restored, {} failed, {} without restorer",
            self.texture.label(),
            restored,
            failed,
            unrestorable
        );
        true
    }
}

impl Restorable for AtlasCore {
    fn is_valid(&self) -> bool {
        self.texture.is_valid() && self.entries_valid()
    }

    fn restore(&self) -> bool {
        self.restore_texture()
    }

    fn label(&self) -> &str {
        self.texture.label()
    }
}

/// One large writable texture subdivided into sub-images.
///
/// Space is handed out by a [`GuillotinePacker`](super::GuillotinePacker)
/// behind a single mutex. Each allocation returns an [`AtlasEntry`]; dropping
/// the entry gives the space back. The atlas registers itself with the
/// resource manager, so the generic restore pass also recreates its texture
/// and re-uploads every entry that has a restorer.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ember_graphics::{DummyBackend, ResourceManager, ResourceManagerConfig, TextureAtlas};
/// use ember_graphics::types::{Rect, TextureFormat};
///
/// let manager = ResourceManager::new(Arc::new(DummyBackend::new()), ResourceManagerConfig::default());
/// let atlas = TextureAtlas::new(&manager, 256, 256, 0, TextureFormat::Rgba8Unorm).unwrap();
///
/// let entry = atlas.allocate_sub_texture(64, 64, None).unwrap();
/// assert_eq!(entry.rect(), Rect::new(0, 0, 64, 64));
/// assert_eq!(atlas.entry_count(), 1);
///
/// drop(entry);
/// assert_eq!(atlas.entry_count(), 0);
/// ```
pub struct TextureAtlas {
    core: Arc<AtlasCore>,
    guard: Arc<BackRef<Arc<AtlasCore>>>,
}

impl TextureAtlas {
    /// Create an atlas with a `width` x `height` backing texture.
    ///
    /// `padding` pixels are reserved around every sub-image (half on each
    /// side) to keep filtering from bleeding between neighbors.
    pub fn new(
        manager: &ResourceManager,
        width: u32,
        height: u32,
        padding: u32,
        format: TextureFormat,
    ) -> GraphicsResult<Self> {
        Self::with_owner(&manager.manager_ref(), width, height, padding, format)
    }

    pub(crate) fn with_owner(
        owner: &ManagerRef,
        width: u32,
        height: u32,
        padding: u32,
        format: TextureFormat,
    ) -> GraphicsResult<Self> {
        let descriptor = TextureDescriptor::new_2d(
            width,
            height,
            format,
            TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING,
        )
        .with_label(format!("atlas {width}x{height}"));

        let core = owner
            .with(|shared| -> GraphicsResult<Arc<AtlasCore>> {
                let texture = shared.create_texture(owner, descriptor, TextureSource::Blank)?;
                let core = Arc::new(AtlasCore {
                    padding,
                    policy: shared.config.lock_retry,
                    state: Mutex::new(AtlasState {
                        packer: GuillotinePacker::new(width, height),
                        slots: HashMap::new(),
                    }),
                    restored_generation: AtomicU64::new(texture.content_generation()),
                    restore_lock: Mutex::new(()),
                    losses: Arc::new(AtomicU64::new(0)),
                    texture,
                });
                shared.register(&core);
                Ok(core)
            })
            .ok_or(GraphicsError::ManagerDestroyed)??;

        let losses = Arc::clone(&core.losses);
        let label = core.texture.label().to_owned();
        core.texture.on_invalidated(move || {
            losses.fetch_add(1, Ordering::Relaxed);
            log::debug!("TextureAtlas: {} lost its contents", label);
        });

        log::debug!(
            "TextureAtlas: created {}x{} {:?}, padding {}",
            width,
            height,
            format,
            padding
        );
        let guard = Arc::new(BackRef::with_policy(Arc::clone(&core), core.policy));
        Ok(Self { core, guard })
    }

    /// Reserve a `width` x `height` sub-image.
    ///
    /// `restorer` is invoked after a context loss to re-upload the entry's
    /// pixels; entries without one stay invalid until rewritten through
    /// [`AtlasEntry::write_pixels`].
    ///
    /// # Errors
    ///
    /// - [`GraphicsError::InvalidParameter`] for a zero-sized request
    /// - [`GraphicsError::SubImageTooLarge`] if the padded request exceeds the
    ///   atlas dimensions
    /// - [`GraphicsError::AtlasFull`] if no free region fits
    /// - [`GraphicsError::LockContention`] if the atlas stayed busy
    pub fn allocate_sub_texture(
        &self,
        width: u32,
        height: u32,
        restorer: Option<AtlasRestorer>,
    ) -> GraphicsResult<AtlasEntry> {
        let (id, rect, generation) = self.core.reserve(width, height, restorer.clone())?;
        log::trace!("TextureAtlas: allocated entry {} at {:?}", id, rect);
        Ok(AtlasEntry {
            id,
            rect,
            texture: Arc::clone(&self.core.texture),
            atlas: WeakBackRef::new(&self.guard),
            generation,
            restorer,
        })
    }

    /// Reserve a sub-image and upload `pixels` into it.
    ///
    /// The space is released again if the upload fails.
    pub fn insert_sub_texture(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        restorer: Option<AtlasRestorer>,
    ) -> GraphicsResult<AtlasEntry> {
        let entry = self.allocate_sub_texture(width, height, restorer)?;
        entry.write_pixels(pixels)?;
        Ok(entry)
    }

    /// Restore the backing texture and re-upload entries.
    ///
    /// Returns `false` if the texture could not be recreated; the atlas stays
    /// invalid and the call can be repeated on the next pass. Each restorer
    /// runs once per recreated texture, however often this is called.
    pub fn restore_texture(&self) -> bool {
        self.core.restore_texture()
    }

    /// Returns true if the backing texture is live and entry contents have
    /// been restored since it was last recreated.
    pub fn is_valid(&self) -> bool {
        self.core.is_valid()
    }

    /// The backing texture.
    pub fn texture(&self) -> &Arc<Texture> {
        &self.core.texture
    }

    /// Pixels reserved around each sub-image.
    pub fn padding(&self) -> u32 {
        self.core.padding
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> usize {
        self.core.state.lock().slots.len()
    }

    /// Unallocated area in pixels.
    pub fn free_area(&self) -> u64 {
        self.core.state.lock().packer.free_area()
    }

    /// Times the backing texture has been observed losing its storage.
    pub fn loss_count(&self) -> u64 {
        self.core.losses.load(Ordering::Relaxed)
    }

    /// Check the packer's structural invariants.
    pub fn validate(&self) -> Result<(), String> {
        self.core.state.lock().packer.validate()
    }

    /// Keep the atlas busy until the returned guard is dropped.
    #[cfg(test)]
    pub(crate) fn hold_state_lock(&self) -> impl Drop + '_ {
        self.core.state.lock()
    }
}

impl Drop for TextureAtlas {
    fn drop(&mut self) {
        // Entries outliving the atlas keep their texture but stop releasing
        // space into it.
        drop(self.guard.notify_target_deleted());
    }
}

impl std::fmt::Debug for TextureAtlas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureAtlas")
            .field("size", &self.core.texture.size())
            .field("padding", &self.core.padding)
            .field("entries", &self.entry_count())
            .finish()
    }
}

/// A sub-image reserved in a [`TextureAtlas`].
///
/// Holds the atlas texture alive. Dropping the entry releases its space back
/// to the atlas, if the atlas still exists.
pub struct AtlasEntry {
    id: u32,
    rect: Rect,
    texture: Arc<Texture>,
    atlas: WeakBackRef<Arc<AtlasCore>>,
    generation: Arc<AtomicU64>,
    restorer: Option<AtlasRestorer>,
}

impl AtlasEntry {
    /// Entry id, unique within its atlas.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Pixel rectangle inside the atlas texture.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// The atlas texture.
    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    /// Normalized texture coordinates as `[u0, v0, u1, v1]`.
    pub fn uv_rect(&self) -> [f32; 4] {
        let w = self.texture.width() as f32;
        let h = self.texture.height() as f32;
        [
            self.rect.x as f32 / w,
            self.rect.y as f32 / h,
            self.rect.right() as f32 / w,
            self.rect.bottom() as f32 / h,
        ]
    }

    /// Returns true if the texture is live and holds this entry's content.
    pub fn is_valid(&self) -> bool {
        self.texture.is_valid()
            && self.generation.load(Ordering::Acquire) == self.texture.content_generation()
    }

    /// Run this entry's restorer again.
    ///
    /// Only succeeds once the atlas texture itself has been restored.
    pub fn try_restore(&self) -> bool {
        if self.is_valid() {
            return true;
        }
        if !self.texture.is_valid() {
            return false;
        }
        let Some(restorer) = &self.restorer else {
            return false;
        };
        let generation = self.texture.content_generation();
        if restorer(&self.texture, self.rect) {
            self.generation.store(generation, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Upload tightly packed pixels covering the whole entry.
    ///
    /// A successful write makes the entry valid again.
    pub fn write_pixels<P: bytemuck::Pod>(&self, pixels: &[P]) -> GraphicsResult<()> {
        let generation = self.texture.content_generation();
        self.texture.write_pixels(self.rect, pixels)?;
        self.generation.store(generation, Ordering::Release);
        Ok(())
    }
}

impl Drop for AtlasEntry {
    fn drop(&mut self) {
        let id = self.id;
        if self.atlas.with(|core| core.release(id)).is_none() {
            log::trace!("TextureAtlas: atlas gone, entry {} not released", id);
        }
    }
}

impl std::fmt::Debug for AtlasEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasEntry")
            .field("id", &self.id)
            .field("rect", &self.rect)
            .field("restorable", &self.restorer.is_some())
            .finish()
    }
}

// Ensure atlas types are Send + Sync
static_assertions::assert_impl_all!(TextureAtlas: Send, Sync);
static_assertions::assert_impl_all!(AtlasEntry: Send, Sync);
