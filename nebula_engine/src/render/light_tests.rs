//! Unit tests for light.rs

use glam::{Mat4, Vec3, Vec4};

use crate::render::{Light, PointLight, SpotLight, CUBE_VIEW_MASK};

#[test]
fn test_point_light_uses_cube_multiview() {
    let light = Light::Point(PointLight::new(Vec3::new(0.0, 3.0, 0.0)).with_shadows(512));
    assert!(light.casts_shadows());
    assert!(light.is_cube());
    assert_eq!(light.shadow_map_size(), 512);
    assert_eq!(light.face_count(), 6);
    assert_eq!(light.view_mask(), CUBE_VIEW_MASK);
}

#[test]
fn test_spot_light_single_face() {
    let light = Light::Spot(SpotLight::new(Vec3::ZERO, Vec3::NEG_Y));
    assert!(!light.casts_shadows());
    assert_eq!(light.face_count(), 1);
    assert_eq!(light.view_mask(), 0);

    let matrices = light.view_projections();
    assert_ne!(matrices[0], Mat4::IDENTITY);
    assert!(matrices[1..].iter().all(|m| *m == Mat4::IDENTITY));
}

#[test]
fn test_cube_faces_see_points_along_their_axis() {
    let light = Light::Point(PointLight::new(Vec3::ZERO));
    let matrices = light.view_projections();
    let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

    for (matrix, axis) in matrices.iter().zip(axes) {
        let clip = *matrix * Vec4::from((axis * 5.0, 1.0));
        let ndc = clip / clip.w;
        assert!(clip.w > 0.0);
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!((0.0..=1.0).contains(&ndc.z));
    }
}

#[test]
fn test_light_view_carries_slot_and_range() {
    let light = Light::Point(PointLight { range: 40.0, ..PointLight::new(Vec3::ONE) });
    let view = light.light_view(3);
    assert_eq!(view.slot, 3);
    assert_eq!(view.far, 40.0);
    assert_eq!(view.position, Vec3::ONE);
}
