//! # Ember Graphics
//!
//! GPU resource lifecycle layer: creation, deferred deletion and recovery
//! after a lost GPU context.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`ResourceManager`] - Creates textures, shader programs and render
//!   targets, queues their deletion onto the graphics thread and restores
//!   them after a context loss
//! - [`Restorable`] - Capability every context-dependent resource implements
//! - [`atlas`] - Guillotine-packed texture atlases with per-entry restorers
//! - [`FrameDriver`] - Per-frame restore and collect cycle
//! - [`GpuBackend`] - Boundary to the GPU API, with a [`DummyBackend`] for
//!   tests and headless use
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use ember_graphics::{DummyBackend, FrameDriver, ResourceManager, ResourceManagerConfig, Restorable};
//! use ember_graphics::types::{TextureDescriptor, TextureFormat, TextureUsage};
//!
//! let backend = Arc::new(DummyBackend::new());
//! let mut driver = FrameDriver::new(ResourceManager::new(backend.clone(), ResourceManagerConfig::default()));
//!
//! let texture = driver
//!     .manager()
//!     .create_texture(
//!         TextureDescriptor::new_2d(1, 1, TextureFormat::Rgba8Unorm, TextureUsage::TEXTURE_BINDING),
//!         vec![255u8; 4],
//!     )
//!     .unwrap();
//!
//! // The context goes away; the next frame brings the texture back.
//! backend.lose_context();
//! driver.begin_frame();
//! assert!(texture.is_valid());
//! ```

pub mod assets;
pub mod atlas;
pub mod backend;
pub mod error;
pub mod frame;
pub mod manager;
pub mod registry;
pub mod resources;
pub mod types;

// Re-export main types for convenience
pub use atlas::{
    AtlasEntry, AtlasGroupConfig, AtlasRestorer, GuillotinePacker, TextureAtlas,
    TextureAtlasManager,
};
pub use backend::{DummyBackend, GpuBackend};
pub use error::{GraphicsError, GraphicsResult};
pub use frame::{FrameDriver, FrameReport};
pub use manager::{ResourceManager, ResourceManagerConfig};
pub use registry::{ResourceRegistry, RestoreReport};
pub use resources::{RenderTarget, Restorable, ShaderProgram, Texture, TextureSource};
pub use types::{Rect, TextureDescriptor, TextureFormat, TextureUsage};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
