use image::GenericImageView;

use crate::error::{GraphicsError, GraphicsResult};

/// Encoded image container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    /// PNG.
    Png,
    /// JPEG.
    Jpeg,
    /// Detect from the leading bytes.
    #[default]
    Guess,
}

impl ImageFormat {
    /// Pick a format from a path's extension, falling back to [`ImageFormat::Guess`].
    pub fn from_path(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            _ => Self::Guess,
        }
    }
}

/// Decoded image as tightly packed RGBA8 rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// RGBA8 pixels, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Whether the source carried an alpha channel.
    pub has_alpha: bool,
}

/// Turns encoded image bytes into pixels.
pub trait ImageDecoder: Send + Sync {
    /// Decode `bytes` stored in `format`.
    fn decode(&self, bytes: &[u8], format: ImageFormat) -> GraphicsResult<DecodedImage>;
}

/// Decoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardImageDecoder;

impl ImageDecoder for StandardImageDecoder {
    fn decode(&self, bytes: &[u8], format: ImageFormat) -> GraphicsResult<DecodedImage> {
        let img = match format {
            ImageFormat::Png => image::load_from_memory_with_format(bytes, image::ImageFormat::Png),
            ImageFormat::Jpeg => {
                image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
            }
            ImageFormat::Guess => image::load_from_memory(bytes),
        }
        .map_err(|e| GraphicsError::ImageDecode(e.to_string()))?;

        let (width, height) = img.dimensions();
        let has_alpha = img.color().has_alpha();
        let pixels = img.to_rgba8().into_raw();
        log::trace!(
            "StandardImageDecoder: decoded {}x{} image (alpha: {})",
            width,
            height,
            has_alpha
        );

        Ok(DecodedImage {
            pixels,
            width,
            height,
            has_alpha,
        })
    }
}
