//! Unit tests for render_requests.rs

use glam::{Vec3, Vec4};
use slotmap::SlotMap;

use crate::pipeline::PipelineType;
use crate::render::*;

fn keys(count: usize) -> Vec<ObjectKey> {
    let mut map: SlotMap<ObjectKey, ()> = SlotMap::with_key();
    (0..count).map(|_| map.insert(())).collect()
}

#[test]
fn test_objects_grouped_by_pipeline_type_in_order() {
    let keys = keys(3);
    let mut requests = RenderRequests::new();
    requests.register_object(PipelineType::Custom("lit"), keys[0]);
    requests.register_object(PipelineType::Custom("unlit"), keys[1]);
    requests.register_object(PipelineType::Custom("lit"), keys[2]);
    requests.register_object(PipelineType::Custom("lit"), keys[0]);

    assert_eq!(
        requests.pipeline_types(),
        &[PipelineType::Custom("lit"), PipelineType::Custom("unlit")]
    );
    assert_eq!(requests.objects(PipelineType::Custom("lit")), &[keys[0], keys[2]]);
    assert!(requests.objects(PipelineType::Lines).is_empty());
}

#[test]
fn test_unique_objects_across_types() {
    let keys = keys(2);
    let mut requests = RenderRequests::new();
    requests.register_object(PipelineType::Custom("a"), keys[0]);
    requests.register_object(PipelineType::Custom("b"), keys[0]);
    requests.register_object(PipelineType::Custom("b"), keys[1]);

    assert_eq!(requests.unique_objects(), vec![keys[0], keys[1]]);

    requests.remove_object(keys[0]);
    assert_eq!(requests.unique_objects(), vec![keys[1]]);
}

#[test]
fn test_remove_pipeline_type_keeps_other_types() {
    let keys = keys(2);
    let mut requests = RenderRequests::new();
    requests.register_object(PipelineType::Custom("a"), keys[0]);
    requests.register_object(PipelineType::Custom("b"), keys[1]);

    requests.remove_pipeline_type(PipelineType::Custom("a"));
    requests.remove_pipeline_type(PipelineType::Custom("missing"));

    assert_eq!(requests.pipeline_types(), &[PipelineType::Custom("b")]);
    assert!(requests.objects(PipelineType::Custom("a")).is_empty());
    assert_eq!(requests.unique_objects(), vec![keys[1]]);
}

#[test]
fn test_clear_drops_everything() {
    let keys = keys(1);
    let mut requests = RenderRequests::new();
    requests.register_object(PipelineType::Custom("a"), keys[0]);
    requests.register_light(Light::Point(PointLight::new(Vec3::ZERO).with_shadows(256)));
    requests.register_line(Line::new(Vec3::ZERO, Vec3::X, Vec4::ONE));
    assert!(!requests.is_empty());

    requests.clear();

    assert!(requests.is_empty());
    assert!(requests.pipeline_types().is_empty());
    assert_eq!(requests.shadow_casting_lights().count(), 0);
}

#[test]
fn test_only_shadow_casters_are_listed() {
    let mut requests = RenderRequests::new();
    requests.register_light(Light::Point(PointLight::new(Vec3::ZERO)));
    requests.register_light(Light::Spot(SpotLight::new(Vec3::Y, Vec3::NEG_Y).with_shadows(512)));

    let casters: Vec<_> = requests.shadow_casting_lights().collect();
    assert_eq!(casters.len(), 1);
    assert!(!casters[0].is_cube());
}

#[test]
fn test_line_vertex_pair() {
    let line = Line::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0), Vec4::new(1.0, 0.0, 0.0, 1.0));
    let [a, b] = LineVertex::pair(&line);
    assert_eq!(a.position, [0.0, 0.0, 0.0]);
    assert_eq!(b.position, [1.0, 2.0, 3.0]);
    assert_eq!(b.color, [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(LineVertex::layout().stride as usize, std::mem::size_of::<LineVertex>());
}
