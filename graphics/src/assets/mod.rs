//! Asset collaborators consumed when loading resources.
//!
//! - [`AssetBundle`] - read-only access to packaged bytes (shader sources,
//!   encoded images)
//! - [`ImageDecoder`] - turns encoded image bytes into RGBA8 pixels
//!
//! Both are traits so hosts can plug in their own packaging and codecs. The
//! default implementations cover in-memory bundles, directory bundles and
//! PNG/JPEG decoding through the `image` crate.

mod bundle;
mod decoder;

pub use bundle::{AssetBundle, DirectoryBundle, MemoryBundle, normalize_path};
pub use decoder::{DecodedImage, ImageDecoder, ImageFormat, StandardImageDecoder};
