//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, geometry helpers and the
//! descriptor structs that resources retain for restoration.

mod common;
mod shader;
mod texture;

pub use common::{Extent3d, Rect};
pub use shader::ProgramSource;
pub use texture::{RenderTargetDescriptor, TextureDescriptor, TextureFormat, TextureUsage};
