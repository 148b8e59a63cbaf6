//! Texture atlases.
//!
//! An atlas packs many small images into one large texture so they can be
//! drawn without rebinding. This module provides:
//!
//! - [`GuillotinePacker`] - GPU-free rectangle packer with coalescing release
//! - [`TextureAtlas`] - one packed texture plus its [`AtlasEntry`] handles
//! - [`TextureAtlasManager`] - named groups of atlases that grow on demand
//!
//! Atlas contents are written by the application, so a context loss cannot be
//! undone by recreating the texture alone. Entries carry an
//! [`AtlasRestorer`] that re-uploads their pixels once the texture is back.

mod manager;
mod packer;
mod texture_atlas;

pub use manager::{AtlasGroupConfig, AtlasRestoreReport, DEFAULT_GROUP, TextureAtlasManager};
pub use packer::{GuillotinePacker, PackedRect};
pub use texture_atlas::{AtlasEntry, AtlasRestorer, TextureAtlas};
