//! GPU API boundary.
//!
//! The lifecycle layer never talks to a graphics API directly. Everything it
//! needs goes through the [`GpuBackend`] trait: handle creation, sub-image
//! upload, deletion, and the two queries the recovery logic depends on
//! ("is this handle still a live GPU object" and "what is the largest texture
//! the device accepts").
//!
//! # Available Backends
//!
//! - [`DummyBackend`]: headless backend that keeps texture pixels in memory
//!   and can simulate context loss. Used by tests and tools.
//!
//! # Handles
//!
//! Handles are opaque `u64` values minted by the backend. A backend never
//! reuses a handle value, so a stale handle held by a resource after a
//! context loss can always be detected with the `is_*_live` queries.

pub mod dummy;

use crate::error::GraphicsResult;
use crate::types::{ProgramSource, Rect, RenderTargetDescriptor, TextureDescriptor};

pub use dummy::{DummyBackend, DummyStats};

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw backend value.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw backend value.
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

gpu_handle!(
    /// Handle to a GPU texture.
    TextureHandle
);
gpu_handle!(
    /// Handle to a linked shader program.
    ProgramHandle
);
gpu_handle!(
    /// Handle to an offscreen render target.
    RenderTargetHandle
);

/// GPU backend trait for abstracting different GPU APIs.
///
/// All creation, upload and deletion calls must be made on the graphics
/// thread. The `is_*_live` queries are cheap and side-effect free.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Largest width or height accepted for a texture.
    fn max_texture_dimension(&self) -> u32;

    /// Counter bumped every time the context is lost and recreated.
    fn context_generation(&self) -> u64;

    /// Create a texture, optionally uploading tightly packed initial pixels.
    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> GraphicsResult<TextureHandle>;

    /// Upload tightly packed pixels into `region` of a texture.
    fn write_texture(&self, texture: TextureHandle, region: Rect, data: &[u8])
    -> GraphicsResult<()>;

    /// Delete a texture. Deleting a handle that is no longer live is a no-op.
    fn delete_texture(&self, texture: TextureHandle);

    /// Returns true if the handle still names a live texture.
    fn is_texture_live(&self, texture: TextureHandle) -> bool;

    /// Compile and link a shader program.
    fn create_program(&self, source: &ProgramSource) -> GraphicsResult<ProgramHandle>;

    /// Delete a program. Deleting a handle that is no longer live is a no-op.
    fn delete_program(&self, program: ProgramHandle);

    /// Returns true if the handle still names a live program.
    fn is_program_live(&self, program: ProgramHandle) -> bool;

    /// Create render target storage.
    fn create_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
    ) -> GraphicsResult<RenderTargetHandle>;

    /// Delete a render target. Deleting a handle that is no longer live is a no-op.
    fn delete_render_target(&self, target: RenderTargetHandle);

    /// Returns true if the handle still names a live render target.
    fn is_render_target_live(&self, target: RenderTargetHandle) -> bool;
}
