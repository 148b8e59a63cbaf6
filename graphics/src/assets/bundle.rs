use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{GraphicsError, GraphicsResult};

/// Read-only source of packaged asset bytes.
///
/// Paths are bundle-relative and use forward slashes.
pub trait AssetBundle: Send + Sync {
    /// Returns true if the bundle contains `path`.
    fn exists(&self, path: &str) -> bool;

    /// Read the whole asset at `path`.
    fn read_all(&self, path: &str) -> GraphicsResult<Vec<u8>>;

    /// Read the asset at `path` as UTF-8 text.
    fn read_to_string(&self, path: &str) -> GraphicsResult<String> {
        let bytes = self.read_all(path)?;
        String::from_utf8(bytes).map_err(|e| GraphicsError::AssetRead {
            path: path.to_owned(),
            message: e.to_string(),
        })
    }
}

/// Normalize a bundle path: unify separators, drop `.` segments, and reject
/// `..` segments, absolute paths and empty paths.
pub fn normalize_path(path: &str) -> GraphicsResult<String> {
    let replaced = path.replace('\\', "/");
    if replaced.starts_with('/') {
        return Err(GraphicsError::InvalidParameter(format!(
            "absolute asset path not allowed: {path}"
        )));
    }

    let mut segments = Vec::new();
    for segment in replaced.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(GraphicsError::InvalidParameter(format!(
                "path traversal (..) not allowed: {path}"
            )));
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        return Err(GraphicsError::InvalidParameter("empty asset path".into()));
    }
    Ok(segments.join("/"))
}

/// In-memory bundle for tests and embedded assets.
///
/// Cloning shares the same storage, so assets inserted after the bundle was
/// handed to a resource are visible to later restores.
///
/// # Example
///
/// ```
/// use ember_graphics::assets::{AssetBundle, MemoryBundle};
///
/// let bundle = MemoryBundle::new();
/// bundle.insert("shaders/sprite.vert", b"void main() {}".to_vec());
/// assert!(bundle.exists("shaders/sprite.vert"));
/// assert!(!bundle.exists("shaders/missing.frag"));
/// ```
#[derive(Clone, Default)]
pub struct MemoryBundle {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an asset.
    pub fn insert(&self, path: impl Into<String>, data: Vec<u8>) {
        self.files.write().insert(path.into(), data);
    }

    /// Remove an asset, returning its bytes if it existed.
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.files.write().remove(path)
    }

    /// Number of stored assets.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Returns true if the bundle holds no assets.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl AssetBundle for MemoryBundle {
    fn exists(&self, path: &str) -> bool {
        normalize_path(path).is_ok_and(|path| self.files.read().contains_key(&path))
    }

    fn read_all(&self, path: &str) -> GraphicsResult<Vec<u8>> {
        let normalized = normalize_path(path)?;
        self.files
            .read()
            .get(&normalized)
            .cloned()
            .ok_or(GraphicsError::AssetNotFound(normalized))
    }
}

impl std::fmt::Debug for MemoryBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBundle")
            .field("assets", &self.len())
            .finish()
    }
}

/// Bundle backed by a directory on disk.
///
/// The directory does not need to exist yet; it is checked at read time.
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    /// Create a bundle rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> GraphicsResult<PathBuf> {
        Ok(self.root.join(normalize_path(path)?))
    }
}

impl AssetBundle for DirectoryBundle {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|full| full.is_file())
    }

    fn read_all(&self, path: &str) -> GraphicsResult<Vec<u8>> {
        let full_path = self.resolve(path)?;
        std::fs::read(&full_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GraphicsError::AssetNotFound(path.to_owned())
            } else {
                GraphicsError::AssetRead {
                    path: path.to_owned(),
                    message: e.to_string(),
                }
            }
        })
    }
}

static_assertions::assert_impl_all!(MemoryBundle: Send, Sync);
static_assertions::assert_impl_all!(DirectoryBundle: Send, Sync);
