//! Unit tests for config.rs

use crate::config::*;
use crate::device::{Extent2D, SampleCount};
use crate::error::Error;

#[test]
fn test_defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.max_frames_in_flight, 2);
    assert_eq!(config.enable_validation, cfg!(debug_assertions));
    assert!(config.offscreen_viewport);
    assert!(config.validate().is_ok());
}

#[test]
fn test_builder_helpers() {
    let config = EngineConfig::default()
        .with_window(640, 480, "demo")
        .with_max_frames_in_flight(3)
        .with_shadow_map_size(2048)
        .with_offscreen_viewport(false)
        .with_shader_dir("shaders");

    assert_eq!(config.window.title, "demo");
    assert_eq!(config.max_frames_in_flight, 3);
    assert_eq!(config.shadow_map_size, 2048);
    assert!(!config.offscreen_viewport);
    assert_eq!(config.shader_path("shadow.vert.spv"), std::path::PathBuf::from("shaders/shadow.vert.spv"));
}

#[test]
fn test_sample_count_is_clamped_to_device() {
    let config = EngineConfig::default().with_msaa(SampleCount::S8);
    assert_eq!(config.sample_count(SampleCount::S4), SampleCount::S4);
    assert_eq!(EngineConfig::default().sample_count(SampleCount::S4), SampleCount::S4);
    let low = EngineConfig::default().with_msaa(SampleCount::S2);
    assert_eq!(low.sample_count(SampleCount::S8), SampleCount::S2);
}

#[test]
fn test_validate_rejects_zero_frames() {
    let config = EngineConfig::default().with_max_frames_in_flight(0);
    assert!(matches!(config.validate(), Err(Error::InitializationFailed(_))));
}

#[test]
fn test_validate_rejects_bad_shadow_map_size() {
    let config = EngineConfig::default().with_shadow_map_size(1000);
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_docking_without_viewport() {
    let config = EngineConfig::default().with_docking(DockingLayout { left: 0.5, right: 0.5, bottom: 0.1 });
    assert!(config.validate().is_err());
}

#[test]
fn test_docking_viewport_extent() {
    let docking = DockingLayout { left: 0.25, right: 0.25, bottom: 0.5 };
    assert_eq!(docking.viewport_extent(Extent2D::new(800, 600)), Extent2D::new(400, 300));
    assert!(docking.viewport_extent(Extent2D::ZERO).is_zero_area());
}

#[test]
fn test_validation_stats_total() {
    let stats = ValidationStats { errors: 1, warnings: 2, info: 3, verbose: 4 };
    assert_eq!(stats.total(), 10);
    assert_eq!(ValidationStats::default().total(), 0);
}
