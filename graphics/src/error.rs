//! Graphics error types.

use thiserror::Error;

/// Errors that can occur in the graphics resource layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// The GPU API failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A shader program failed to compile or link.
    #[error("shader compilation failed: {0}")]
    ShaderCompilationFailed(String),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The resource's GPU object is gone and has not been restored yet.
    #[error("GPU context lost: {0}")]
    ContextLost(String),
    /// The resource manager that owned this object has been dropped.
    #[error("resource manager destroyed")]
    ManagerDestroyed,
    /// A bundle does not contain the requested asset.
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    /// A bundle failed to read an asset.
    #[error("failed to read asset {path}: {message}")]
    AssetRead {
        /// Bundle-relative path.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Image bytes could not be decoded.
    #[error("image decoding failed: {0}")]
    ImageDecode(String),
    /// A sub-image request exceeds what any atlas of the group can hold.
    #[error("sub-image {width}x{height} exceeds the atlas limit {max_width}x{max_height}")]
    SubImageTooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Largest usable width.
        max_width: u32,
        /// Largest usable height.
        max_height: u32,
    },
    /// No free region of an atlas can hold the request.
    #[error("atlas has no room for a {width}x{height} sub-image")]
    AtlasFull {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// A lock could not be acquired within the retry budget.
    #[error("lock contention: {0}")]
    LockContention(&'static str),
    /// The atlas group has not been registered.
    #[error("unknown atlas group: {0}")]
    UnknownAtlasGroup(String),
}

/// Result alias for graphics operations.
pub type GraphicsResult<T> = Result<T, GraphicsError>;
