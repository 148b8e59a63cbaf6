//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. It keeps texture pixels in memory so
//! uploads can be read back, counts every creation and deletion, and can
//! simulate a context loss that invalidates every handle at once.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{ProgramSource, Rect, RenderTargetDescriptor, TextureDescriptor};

use super::{GpuBackend, ProgramHandle, RenderTargetHandle, TextureHandle};

/// Default maximum texture dimension reported by the dummy backend.
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 16384;

/// Snapshot of the dummy backend's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DummyStats {
    /// Textures created since the backend was made.
    pub textures_created: u64,
    /// Textures explicitly deleted.
    pub textures_deleted: u64,
    /// Sub-image uploads performed.
    pub texture_writes: u64,
    /// Programs created.
    pub programs_created: u64,
    /// Programs explicitly deleted.
    pub programs_deleted: u64,
    /// Render targets created.
    pub render_targets_created: u64,
    /// Render targets explicitly deleted.
    pub render_targets_deleted: u64,
    /// Textures currently live.
    pub live_textures: usize,
    /// Programs currently live.
    pub live_programs: usize,
    /// Render targets currently live.
    pub live_render_targets: usize,
}

struct DummyTexture {
    descriptor: TextureDescriptor,
    pixels: Vec<u8>,
}

#[derive(Default)]
struct DummyState {
    textures: HashMap<u64, DummyTexture>,
    programs: HashSet<u64>,
    render_targets: HashSet<u64>,
    stats: DummyStats,
}

/// Dummy GPU backend.
pub struct DummyBackend {
    state: Mutex<DummyState>,
    next_handle: AtomicU64,
    generation: AtomicU64,
    fail_creation: AtomicBool,
    max_texture_dimension: u32,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DummyState::default()),
            next_handle: AtomicU64::new(1),
            generation: AtomicU64::new(0),
            fail_creation: AtomicBool::new(false),
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
        }
    }

    /// Report a different maximum texture dimension.
    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.max_texture_dimension = max;
        self
    }

    /// Make every subsequent creation call fail until reset.
    pub fn set_fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::Release);
    }

    /// Simulate a context loss: every handle becomes dead and the context
    /// generation is bumped.
    pub fn lose_context(&self) {
        let mut state = self.state.lock();
        let lost = state.textures.len() + state.programs.len() + state.render_targets.len();
        state.textures.clear();
        state.programs.clear();
        state.render_targets.clear();
        state.stats.live_textures = 0;
        state.stats.live_programs = 0;
        state.stats.live_render_targets = 0;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        log::info!(
            "DummyBackend: context lost ({} objects), generation {}",
            lost,
            generation
        );
    }

    /// Counter snapshot.
    pub fn stats(&self) -> DummyStats {
        self.state.lock().stats
    }

    /// Copy of a texture's whole pixel store.
    pub fn read_texture(&self, texture: TextureHandle) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state.textures.get(&texture.raw()).map(|t| t.pixels.clone())
    }

    /// Copy of one region of a texture, tightly packed.
    pub fn read_region(&self, texture: TextureHandle, region: Rect) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let tex = state.textures.get(&texture.raw())?;
        if !texture_bounds(&tex.descriptor).contains_rect(&region) {
            return None;
        }
        let bpp = tex.descriptor.format.block_size() as usize;
        let pitch = tex.descriptor.size.width as usize * bpp;
        let row_len = region.width as usize * bpp;
        let mut out = Vec::with_capacity(row_len * region.height as usize);
        for row in 0..region.height as usize {
            let start = (region.y as usize + row) * pitch + region.x as usize * bpp;
            out.extend_from_slice(&tex.pixels[start..start + row_len]);
        }
        Some(out)
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn check_creation(&self, what: &str) -> GraphicsResult<()> {
        if self.fail_creation.load(Ordering::Acquire) {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "{what} creation disabled on dummy backend"
            )));
        }
        Ok(())
    }

    fn check_size(&self, width: u32, height: u32) -> GraphicsResult<()> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }
        let max_dim = self.max_texture_dimension;
        if width > max_dim || height > max_dim {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimension exceeds maximum {max_dim}"
            )));
        }
        Ok(())
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("max_texture_dimension", &self.max_texture_dimension)
            .field("stats", &self.stats())
            .finish()
    }
}

fn texture_bounds(descriptor: &TextureDescriptor) -> Rect {
    Rect::from_size(descriptor.size.width, descriptor.size.height)
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn context_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> GraphicsResult<TextureHandle> {
        self.check_creation("texture")?;
        self.check_size(descriptor.size.width, descriptor.size.height)?;

        let expected = descriptor.byte_size() as usize;
        let pixels = match data {
            Some(bytes) if bytes.len() != expected => {
                return Err(GraphicsError::InvalidParameter(format!(
                    "initial data is {} bytes, texture needs {expected}",
                    bytes.len()
                )));
            }
            Some(bytes) => bytes.to_vec(),
            None => vec![0; expected],
        };

        let raw = self.next_handle();
        let mut state = self.state.lock();
        state.textures.insert(
            raw,
            DummyTexture {
                descriptor: descriptor.clone(),
                pixels,
            },
        );
        state.stats.textures_created += 1;
        state.stats.live_textures = state.textures.len();
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}) -> #{}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            raw
        );
        Ok(TextureHandle::from_raw(raw))
    }

    fn write_texture(
        &self,
        texture: TextureHandle,
        region: Rect,
        data: &[u8],
    ) -> GraphicsResult<()> {
        let mut state = self.state.lock();
        let tex = state.textures.get_mut(&texture.raw()).ok_or_else(|| {
            GraphicsError::ContextLost(format!("texture #{} is not live", texture.raw()))
        })?;

        if !texture_bounds(&tex.descriptor).contains_rect(&region) {
            return Err(GraphicsError::InvalidParameter(format!(
                "region {region:?} outside texture {}x{}",
                tex.descriptor.size.width, tex.descriptor.size.height
            )));
        }
        let bpp = tex.descriptor.format.block_size() as usize;
        let row_len = region.width as usize * bpp;
        if data.len() != row_len * region.height as usize {
            return Err(GraphicsError::InvalidParameter(format!(
                "upload is {} bytes, region needs {}",
                data.len(),
                row_len * region.height as usize
            )));
        }

        let pitch = tex.descriptor.size.width as usize * bpp;
        for (row, src) in data.chunks_exact(row_len.max(1)).enumerate() {
            let start = (region.y as usize + row) * pitch + region.x as usize * bpp;
            tex.pixels[start..start + row_len].copy_from_slice(src);
        }
        state.stats.texture_writes += 1;
        Ok(())
    }

    fn delete_texture(&self, texture: TextureHandle) {
        let mut state = self.state.lock();
        if state.textures.remove(&texture.raw()).is_some() {
            state.stats.textures_deleted += 1;
            state.stats.live_textures = state.textures.len();
            log::trace!("DummyBackend: deleted texture #{}", texture.raw());
        }
    }

    fn is_texture_live(&self, texture: TextureHandle) -> bool {
        self.state.lock().textures.contains_key(&texture.raw())
    }

    fn create_program(&self, source: &ProgramSource) -> GraphicsResult<ProgramHandle> {
        self.check_creation("program")?;
        for (stage, text) in [("vertex", &source.vertex), ("fragment", &source.fragment)] {
            if text.trim().is_empty() {
                return Err(GraphicsError::ShaderCompilationFailed(format!(
                    "{stage} stage of {:?} is empty",
                    source.label
                )));
            }
            if text.contains("#error") {
                return Err(GraphicsError::ShaderCompilationFailed(format!(
                    "{stage} stage of {:?} hit #error",
                    source.label
                )));
            }
        }

        let raw = self.next_handle();
        let mut state = self.state.lock();
        state.programs.insert(raw);
        state.stats.programs_created += 1;
        state.stats.live_programs = state.programs.len();
        log::trace!("DummyBackend: linked program {:?} -> #{}", source.label, raw);
        Ok(ProgramHandle::from_raw(raw))
    }

    fn delete_program(&self, program: ProgramHandle) {
        let mut state = self.state.lock();
        if state.programs.remove(&program.raw()) {
            state.stats.programs_deleted += 1;
            state.stats.live_programs = state.programs.len();
        }
    }

    fn is_program_live(&self, program: ProgramHandle) -> bool {
        self.state.lock().programs.contains(&program.raw())
    }

    fn create_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
    ) -> GraphicsResult<RenderTargetHandle> {
        self.check_creation("render target")?;
        self.check_size(descriptor.size.width, descriptor.size.height)?;

        let raw = self.next_handle();
        let mut state = self.state.lock();
        state.render_targets.insert(raw);
        state.stats.render_targets_created += 1;
        state.stats.live_render_targets = state.render_targets.len();
        log::trace!(
            "DummyBackend: creating render target {:?} -> #{}",
            descriptor.label,
            raw
        );
        Ok(RenderTargetHandle::from_raw(raw))
    }

    fn delete_render_target(&self, target: RenderTargetHandle) {
        let mut state = self.state.lock();
        if state.render_targets.remove(&target.raw()) {
            state.stats.render_targets_deleted += 1;
            state.stats.live_render_targets = state.render_targets.len();
        }
    }

    fn is_render_target_live(&self, target: RenderTargetHandle) -> bool {
        self.state.lock().render_targets.contains(&target.raw())
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);
