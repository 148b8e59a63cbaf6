//! Common utilities for resource lifecycle integration tests.
//!
//! This module provides shared test infrastructure: a dummy-backed test
//! context, pixel pattern generators and restorer helpers.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ember_graphics::atlas::AtlasRestorer;
use ember_graphics::types::Rect;
use ember_graphics::{DummyBackend, ResourceManager, ResourceManagerConfig, Texture};

// ============================================================================
// Test Context
// ============================================================================

/// Test context owning a dummy backend and a manager on the test thread.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub manager: ResourceManager,
}

impl TestContext {
    /// Create a context with the default manager configuration.
    pub fn new() -> Self {
        Self::with_config(ResourceManagerConfig::default())
    }

    /// Create a context with a custom manager configuration.
    pub fn with_config(config: ResourceManagerConfig) -> Self {
        init_logging();
        let backend = Arc::new(DummyBackend::new());
        let manager = ResourceManager::new(backend.clone(), config);
        Self { backend, manager }
    }

    /// Read back a region of a texture's current storage.
    pub fn read_region(&self, texture: &Texture, region: Rect) -> Vec<u8> {
        let handle = texture.handle().expect("texture has no GPU object");
        self.backend
            .read_region(handle, region)
            .expect("texture is not live")
    }
}

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Pixel Helpers
// ============================================================================

/// Generate a recognizable RGBA8 pattern for a `width` x `height` image.
pub fn generate_test_pattern(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x as u8).wrapping_add(seed));
            data.push((y as u8).wrapping_mul(3));
            data.push(seed);
            data.push(255);
        }
    }
    data
}

/// Encode a solid-color PNG.
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(color));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .expect("PNG encoding failed");
    bytes
}

// ============================================================================
// Restorer Helpers
// ============================================================================

/// Restorer that re-uploads `pixels` and counts its invocations.
pub fn counting_restorer(pixels: Vec<u8>, calls: &Arc<AtomicUsize>) -> AtlasRestorer {
    let calls = calls.clone();
    Arc::new(move |texture: &Texture, rect: Rect| {
        calls.fetch_add(1, Ordering::SeqCst);
        texture.write_region(rect, &pixels).is_ok()
    })
}

/// Restorer that always fails and counts its invocations.
pub fn failing_restorer(calls: &Arc<AtomicUsize>) -> AtlasRestorer {
    let calls = calls.clone();
    Arc::new(move |_texture: &Texture, _rect: Rect| {
        calls.fetch_add(1, Ordering::SeqCst);
        false
    })
}
