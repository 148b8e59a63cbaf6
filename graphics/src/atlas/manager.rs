//! Named groups of texture atlases.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{GraphicsError, GraphicsResult};
use crate::manager::{ManagerRef, ResourceManager};
use crate::types::TextureFormat;

use super::texture_atlas::{AtlasEntry, AtlasRestorer, TextureAtlas};

/// Name of the group every manager starts with.
pub const DEFAULT_GROUP: &str = "default";

/// Parameters shared by every atlas of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasGroupConfig {
    /// Pixels reserved around each sub-image.
    pub padding: u32,
    /// Width of newly created atlases.
    pub max_width: u32,
    /// Height of newly created atlases.
    pub max_height: u32,
    /// Texture format of the atlases.
    pub format: TextureFormat,
}

impl AtlasGroupConfig {
    /// Set the padding.
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Set the atlas dimensions.
    pub fn with_max_size(mut self, width: u32, height: u32) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    /// Set the texture format.
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    fn clamped(mut self, max_dimension: u32) -> Self {
        self.max_width = self.max_width.min(max_dimension);
        self.max_height = self.max_height.min(max_dimension);
        self
    }
}

impl Default for AtlasGroupConfig {
    fn default() -> Self {
        Self {
            padding: 2,
            max_width: 1024,
            max_height: 1024,
            format: TextureFormat::Rgba8Unorm,
        }
    }
}

/// Summary of one [`TextureAtlasManager::check_and_restore`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtlasRestoreReport {
    /// Atlases inspected.
    pub checked: usize,
    /// Atlases that needed restoring.
    pub invalid: usize,
    /// Atlases whose texture could not be recreated.
    pub failed: usize,
}

impl AtlasRestoreReport {
    /// Returns true if every atlas is valid after the pass.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Atlas list of a group, shared by every configuration of that group.
type AtlasList = Arc<RwLock<Vec<Arc<TextureAtlas>>>>;

struct AtlasGroup {
    config: AtlasGroupConfig,
    atlases: AtlasList,
}

impl AtlasGroup {
    fn new(config: AtlasGroupConfig) -> Self {
        Self {
            config,
            atlases: AtlasList::default(),
        }
    }
}

/// Hands out sub-images from named groups of atlases, creating atlases on
/// demand.
///
/// Allocation tries every existing atlas of the group in creation order and
/// takes the first one with room. Only when all of them are full is a new
/// atlas created.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ember_graphics::{DummyBackend, ResourceManager, ResourceManagerConfig};
/// use ember_graphics::atlas::{AtlasGroupConfig, DEFAULT_GROUP, TextureAtlasManager};
///
/// let manager = ResourceManager::new(Arc::new(DummyBackend::new()), ResourceManagerConfig::default());
/// let atlases = TextureAtlasManager::new(&manager);
/// atlases.register_group("glyphs", AtlasGroupConfig::default().with_max_size(256, 256));
///
/// let glyph = atlases.allocate_sub_texture("glyphs", 12, 16, None).unwrap();
/// assert_eq!(atlases.atlas_count("glyphs"), 1);
/// assert_eq!(atlases.atlas_count(DEFAULT_GROUP), 0);
/// # drop(glyph);
/// ```
pub struct TextureAtlasManager {
    owner: ManagerRef,
    max_dimension: u32,
    groups: RwLock<HashMap<String, Arc<AtlasGroup>>>,
}

impl TextureAtlasManager {
    /// Create a manager with an empty default group.
    pub fn new(manager: &ResourceManager) -> Self {
        let max_dimension = manager.max_texture_dimension();
        let mut groups = HashMap::new();
        groups.insert(
            DEFAULT_GROUP.to_string(),
            Arc::new(AtlasGroup::new(
                AtlasGroupConfig::default().clamped(max_dimension),
            )),
        );
        Self {
            owner: manager.manager_ref(),
            max_dimension,
            groups: RwLock::new(groups),
        }
    }

    /// Register or reconfigure a group.
    ///
    /// Reconfiguring a group keeps its existing atlases; the new dimensions
    /// apply to atlases created afterwards. Allocations still running against
    /// the old configuration add their atlases to the same list.
    pub fn register_group(&self, name: impl Into<String>, config: AtlasGroupConfig) {
        let name = name.into();
        let config = config.clamped(self.max_dimension);
        let mut groups = self.groups.write();
        let atlases = groups
            .get(&name)
            .map(|group| Arc::clone(&group.atlases))
            .unwrap_or_default();
        log::debug!(
            "TextureAtlasManager: group {} uses {}x{} atlases, padding {}",
            name,
            config.max_width,
            config.max_height,
            config.padding
        );
        groups.insert(
            name,
            Arc::new(AtlasGroup { config, atlases }),
        );
    }

    /// Configuration of a group, after clamping to the backend limit.
    pub fn group_config(&self, group: &str) -> Option<AtlasGroupConfig> {
        self.groups.read().get(group).map(|g| g.config)
    }

    /// Number of atlases in a group; zero for unknown groups.
    pub fn atlas_count(&self, group: &str) -> usize {
        self.groups
            .read()
            .get(group)
            .map_or(0, |g| g.atlases.read().len())
    }

    /// Atlases of a group in creation order.
    pub fn atlases(&self, group: &str) -> Vec<Arc<TextureAtlas>> {
        self.groups
            .read()
            .get(group)
            .map(|g| g.atlases.read().clone())
            .unwrap_or_default()
    }

    fn group(&self, name: &str) -> GraphicsResult<Arc<AtlasGroup>> {
        self.groups
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GraphicsError::UnknownAtlasGroup(name.to_string()))
    }

    /// Reserve a sub-image in `group`.
    ///
    /// # Errors
    ///
    /// - [`GraphicsError::UnknownAtlasGroup`] if the group is not registered
    /// - [`GraphicsError::SubImageTooLarge`] if no atlas of the group could
    ///   ever hold the request; no atlas is created in that case
    /// - [`GraphicsError::LockContention`] if an existing atlas stayed busy;
    ///   the group does not grow in that case
    /// - any error from creating a new atlas
    pub fn allocate_sub_texture(
        &self,
        group: &str,
        width: u32,
        height: u32,
        restorer: Option<AtlasRestorer>,
    ) -> GraphicsResult<AtlasEntry> {
        let atlas_group = self.group(group)?;
        self.allocate_in(&atlas_group, group, width, height, restorer)
    }

    fn allocate_in(
        &self,
        atlas_group: &AtlasGroup,
        group: &str,
        width: u32,
        height: u32,
        restorer: Option<AtlasRestorer>,
    ) -> GraphicsResult<AtlasEntry> {
        let config = atlas_group.config;

        let max_width = config.max_width.saturating_sub(config.padding);
        let max_height = config.max_height.saturating_sub(config.padding);
        if width > max_width || height > max_height {
            log::warn!(
                "TextureAtlasManager: {}x{} does not fit group {} ({}x{})",
                width,
                height,
                group,
                max_width,
                max_height
            );
            return Err(GraphicsError::SubImageTooLarge {
                width,
                height,
                max_width,
                max_height,
            });
        }

        let snapshot = atlas_group.atlases.read().clone();
        for atlas in &snapshot {
            match atlas.allocate_sub_texture(width, height, restorer.clone()) {
                Ok(entry) => return Ok(entry),
                Err(GraphicsError::AtlasFull { .. }) => {}
                Err(e @ GraphicsError::LockContention(_)) => {
                    log::warn!(
                        "TextureAtlasManager: atlas of group {} busy, {}x{} not allocated",
                        group,
                        width,
                        height
                    );
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        let atlas = Arc::new(TextureAtlas::with_owner(
            &self.owner,
            config.max_width,
            config.max_height,
            config.padding,
            config.format,
        )?);
        let entry = atlas.allocate_sub_texture(width, height, restorer)?;
        let count = {
            let mut atlases = atlas_group.atlases.write();
            atlases.push(atlas);
            atlases.len()
        };
        log::debug!(
            "TextureAtlasManager: group {} grew to {} atlases",
            group,
            count
        );
        Ok(entry)
    }

    /// Reserve a sub-image in `group` and upload `pixels` into it.
    pub fn insert_sub_texture(
        &self,
        group: &str,
        pixels: &[u8],
        width: u32,
        height: u32,
        restorer: Option<AtlasRestorer>,
    ) -> GraphicsResult<AtlasEntry> {
        let entry = self.allocate_sub_texture(group, width, height, restorer)?;
        entry.write_pixels(pixels)?;
        Ok(entry)
    }

    /// Restore every invalid atlas of every group.
    ///
    /// Call on the graphics thread after a context-recreate event, alongside
    /// [`ResourceManager::check_and_restore_resources`].
    pub fn check_and_restore(&self) -> AtlasRestoreReport {
        let groups: Vec<_> = self.groups.read().values().cloned().collect();
        let mut report = AtlasRestoreReport::default();
        for group in groups {
            let atlases = group.atlases.read().clone();
            for atlas in atlases {
                report.checked += 1;
                if atlas.is_valid() {
                    continue;
                }
                report.invalid += 1;
                if !atlas.restore_texture() {
                    report.failed += 1;
                }
            }
        }
        if report.invalid > 0 {
            log::info!(
                "TextureAtlasManager: restored {}/{} invalid atlases",
                report.invalid - report.failed,
                report.invalid
            );
        }
        report
    }
}

impl std::fmt::Debug for TextureAtlasManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups = self.groups.read();
        let mut map = f.debug_map();
        for (name, group) in groups.iter() {
            map.entry(name, &group.atlases.read().len());
        }
        map.finish()
    }
}

// Ensure TextureAtlasManager is Send + Sync
static_assertions::assert_impl_all!(TextureAtlasManager: Send, Sync);
