//! Context-loss recovery tests.
//!
//! These tests drive whole scenarios through the public API: resources are
//! created, the dummy backend drops every GPU object, and the restore pass
//! has to bring everything back before rendering resumes.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p ember-graphics --test context_loss
//! ```

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use rstest::rstest;

use common::{TestContext, counting_restorer, failing_restorer, generate_test_pattern, png_bytes};
use ember_graphics::assets::MemoryBundle;
use ember_graphics::atlas::{AtlasGroupConfig, TextureAtlasManager};
use ember_graphics::types::{ProgramSource, RenderTargetDescriptor, Rect};
use ember_graphics::{
    FrameDriver, GraphicsError, Restorable, ResourceManagerConfig, TextureDescriptor,
    TextureFormat, TextureUsage,
};

// ============================================================================
// Registry Recovery
// ============================================================================

/// Every kind of resource comes back after a single restore pass.
#[test]
fn test_all_resource_kinds_restored() {
    let ctx = TestContext::new();
    let pattern = generate_test_pattern(8, 8, 7);
    let texture = ctx
        .manager
        .create_texture(
            TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::TEXTURE_BINDING),
            pattern.clone(),
        )
        .unwrap();
    let program = ctx
        .manager
        .create_program(ProgramSource::new("void main() {}", "void main() {}"))
        .unwrap();
    let target = ctx
        .manager
        .create_render_target(
            RenderTargetDescriptor::new(32, 32, TextureFormat::Rgba8Unorm)
                .with_depth(TextureFormat::Depth24PlusStencil8),
        )
        .unwrap();

    ctx.backend.lose_context();
    assert!(!texture.is_valid());
    assert!(!program.is_valid());
    assert!(!target.is_valid());

    let report = ctx.manager.check_and_restore_resources();
    assert_eq!(report.checked, 3);
    assert_eq!(report.restored, 3);
    assert!(report.is_complete());

    assert!(texture.is_valid());
    assert!(program.is_valid());
    assert!(target.is_valid());
    assert_eq!(ctx.read_region(&texture, Rect::from_size(8, 8)), pattern);
}

/// Dropped resources neither get restored nor linger in the registry.
#[test]
fn test_dropped_resources_are_skipped() {
    let ctx = TestContext::new();
    let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::default());
    let kept = ctx.manager.create_writable_texture(desc.clone()).unwrap();
    let dropped = ctx.manager.create_writable_texture(desc).unwrap();
    drop(dropped);

    ctx.backend.lose_context();
    let report = ctx.manager.check_and_restore_resources();
    assert_eq!(report.checked, 1);
    assert_eq!(ctx.manager.registered_count(), 1);
    assert!(kept.is_valid());
}

/// A restore that fails stays failed until a later pass succeeds.
#[rstest]
#[case::one_retry(1)]
#[case::several_retries(3)]
fn test_restore_retried_until_success(#[case] failing_passes: usize) {
    let ctx = TestContext::new();
    let bundle = MemoryBundle::new();
    bundle.insert("tiles/grass.png", png_bytes(4, 4, [10, 200, 10, 255]));
    let texture = ctx
        .manager
        .load_texture(Arc::new(bundle.clone()), "tiles/grass.png")
        .unwrap();

    ctx.backend.lose_context();
    ctx.backend.set_fail_creation(true);
    for _ in 0..failing_passes {
        let report = ctx.manager.check_and_restore_resources();
        assert_eq!(report.failed, 1);
        assert!(!texture.is_valid());
    }

    ctx.backend.set_fail_creation(false);
    assert_eq!(ctx.manager.check_and_restore_resources().restored, 1);
    assert_eq!(
        &ctx.read_region(&texture, Rect::new(3, 3, 1, 1)),
        &[10, 200, 10, 255]
    );
}

/// Resources dropped on worker threads while the context is lost are still
/// cleaned up by the graphics thread.
#[test]
fn test_worker_drops_during_loss() {
    let ctx = TestContext::new();
    let textures: Vec<_> = (0..8)
        .map(|_| {
            ctx.manager
                .create_writable_texture(TextureDescriptor::new_2d(
                    2,
                    2,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::default(),
                ))
                .unwrap()
        })
        .collect();

    ctx.backend.lose_context();
    thread::scope(|scope| {
        for texture in textures {
            scope.spawn(move || drop(texture));
        }
    });

    assert_eq!(ctx.manager.pending_trash(), 8);
    assert_eq!(ctx.manager.collect().executed, 8);
    // Lost objects are not deleted a second time.
    assert_eq!(ctx.backend.stats().textures_deleted, 0);
    assert_eq!(ctx.manager.check_and_restore_resources().checked, 0);
}

// ============================================================================
// Atlas Recovery
// ============================================================================

/// Each restorer runs exactly once per loss, however many passes look at the
/// atlas.
#[test]
fn test_atlas_restorer_invoked_exactly_once() {
    let ctx = TestContext::new();
    let atlases = TextureAtlasManager::new(&ctx.manager);
    atlases.register_group(
        "icons",
        AtlasGroupConfig::default().with_padding(0).with_max_size(64, 64),
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let pixels = generate_test_pattern(4, 4, 1);
    let entry = atlases
        .insert_sub_texture("icons", &pixels, 4, 4, Some(counting_restorer(pixels.clone(), &calls)))
        .unwrap();

    ctx.backend.lose_context();
    assert!(!entry.is_valid());

    ctx.manager.check_and_restore_resources();
    atlases.check_and_restore();
    ctx.manager.check_and_restore_resources();

    assert!(entry.is_valid());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.read_region(entry.texture(), entry.rect()), pixels);

    // A second loss runs the restorer once more.
    ctx.backend.lose_context();
    atlases.check_and_restore();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Failing restorers leave only their own entry invalid.
#[test]
fn test_atlas_failing_restorer_isolated() {
    let ctx = TestContext::new();
    let atlases = TextureAtlasManager::new(&ctx.manager);
    atlases.register_group("ui", AtlasGroupConfig::default().with_max_size(128, 128));

    let good_calls = Arc::new(AtomicUsize::new(0));
    let bad_calls = Arc::new(AtomicUsize::new(0));
    let good_pixels = generate_test_pattern(8, 8, 2);
    let good = atlases
        .insert_sub_texture("ui", &good_pixels, 8, 8, Some(counting_restorer(good_pixels.clone(), &good_calls)))
        .unwrap();
    let bad = atlases
        .allocate_sub_texture("ui", 8, 8, Some(failing_restorer(&bad_calls)))
        .unwrap();

    ctx.backend.lose_context();
    let report = atlases.check_and_restore();
    assert!(report.is_complete());
    assert!(good.is_valid());
    assert!(!bad.is_valid());
    assert!(!bad.try_restore());
    assert_eq!(bad_calls.load(Ordering::SeqCst), 2);

    bad.write_pixels(&generate_test_pattern(8, 8, 3)).unwrap();
    assert!(bad.is_valid());
}

/// The frame driver restores atlases before the frame renders.
#[test]
fn test_frame_driver_recovers_everything() {
    let ctx = TestContext::with_config(ResourceManagerConfig::default().with_compact_threshold(4));
    let backend = ctx.backend.clone();
    let mut driver = FrameDriver::new(ctx.manager);
    driver
        .atlases()
        .register_group("glyphs", AtlasGroupConfig::default().with_max_size(256, 256));

    let calls = Arc::new(AtomicUsize::new(0));
    let glyphs: Vec<_> = (0..16u8)
        .map(|i| {
            let pixels = generate_test_pattern(12, 16, i);
            driver
                .atlases()
                .insert_sub_texture("glyphs", &pixels, 12, 16, Some(counting_restorer(pixels.clone(), &calls)))
                .unwrap()
        })
        .collect();
    assert_eq!(driver.atlases().atlas_count("glyphs"), 1);

    driver.begin_frame();
    backend.lose_context();
    let report = driver.begin_frame();
    assert!(!report.restore_incomplete());
    assert!(glyphs.iter().all(|g| g.is_valid()));
    assert_eq!(calls.load(Ordering::SeqCst), 16);

    drop(glyphs);
    drop(driver);
    assert_eq!(backend.stats().live_textures, 0);
}

/// Allocation after the manager is gone reports it instead of panicking.
#[test]
fn test_atlas_manager_outliving_resource_manager() {
    let ctx = TestContext::new();
    let atlases = TextureAtlasManager::new(&ctx.manager);
    drop(ctx.manager);
    assert_eq!(
        atlases
            .allocate_sub_texture(ember_graphics::atlas::DEFAULT_GROUP, 8, 8, None)
            .unwrap_err(),
        GraphicsError::ManagerDestroyed
    );
}
