//! Texture types and descriptors.

use super::Extent3d;
use bitflags::bitflags;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit depth, float.
    Depth32Float,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32Float)
    }

    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rg8Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Depth24PlusStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float => 8,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be written by sub-image uploads.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 2;
        /// Texture can be used as a render attachment.
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::TEXTURE_BINDING
    }
}

/// Descriptor for creating a texture.
///
/// Retained by the texture so the same storage can be recreated after a
/// context loss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub size: Extent3d,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Bytes needed for a tightly packed copy of the whole texture.
    pub fn byte_size(&self) -> u64 {
        self.size.texel_count() * self.format.block_size() as u64
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::default(),
            format: TextureFormat::default(),
            usage: TextureUsage::default(),
        }
    }
}

/// Descriptor for creating an offscreen render target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTargetDescriptor {
    /// Debug label for the render target.
    pub label: Option<String>,
    /// Size of the color attachment.
    pub size: Extent3d,
    /// Color attachment format.
    pub color_format: TextureFormat,
    /// Optional depth attachment format.
    pub depth_format: Option<TextureFormat>,
}

impl RenderTargetDescriptor {
    /// Create a color-only render target descriptor.
    pub fn new(width: u32, height: u32, color_format: TextureFormat) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            color_format,
            depth_format: None,
        }
    }

    /// Attach a depth buffer.
    pub fn with_depth(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_byte_size() {
        let desc = TextureDescriptor::new_2d(16, 8, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST);
        assert_eq!(desc.byte_size(), 16 * 8 * 4);
        assert_eq!(desc.with_label("atlas").label.as_deref(), Some("atlas"));
    }

    #[test]
    fn test_depth_formats() {
        assert!(TextureFormat::Depth32Float.is_depth_stencil());
        assert!(!TextureFormat::Rgba8Unorm.is_depth_stencil());
    }

    #[test]
    fn test_render_target_descriptor() {
        let desc = RenderTargetDescriptor::new(320, 240, TextureFormat::Bgra8Unorm)
            .with_depth(TextureFormat::Depth24PlusStencil8)
            .with_label("shadow");
        assert_eq!(desc.size, Extent3d::new_2d(320, 240));
        assert_eq!(desc.depth_format, Some(TextureFormat::Depth24PlusStencil8));
    }
}
