// Interactive session: caching, invalidation and supersession

use std::sync::Arc;

use ndarray::Array2;

use relight_engine::buffer::{DepthBuffer, PixelBuffer};
use relight_engine::error::RelightError;
use relight_engine::geometry::{Segment, SegmentationResult};
use relight_engine::pipeline::{EngineConfig, FrameInputs, RelightSession, compute_frame};
use relight_engine::scene::{Light, LightId, MaterialTable};
use relight_engine::shade::Quality;

const W: usize = 40;
const H: usize = 30;

fn scene_depth() -> DepthBuffer {
    // A near box standing on a receding floor
    let data = (0..W * H)
        .map(|i| {
            let (x, y) = (i % W, i / W);
            if (14..26).contains(&x) && (8..20).contains(&y) { 0.25 } else { 0.9 - y as f32 / H as f32 * 0.5 }
        })
        .collect();
    DepthBuffer::new(W, H, data).unwrap()
}

fn scene_segmentation() -> SegmentationResult {
    let floor = Array2::from_shape_fn((H, W), |(r, _)| if r >= H / 2 { 1.0 } else { 0.0 });
    let sky = Array2::from_shape_fn((H, W), |(r, _)| if r < 4 { 1.0 } else { 0.0 });
    SegmentationResult::new(vec![Segment::new("floor", 1, floor, 0.9), Segment::new("sky", 2, sky, 0.95)])
}

fn session() -> RelightSession {
    let mut s = RelightSession::new(Arc::new(MaterialTable::builtin()), EngineConfig::default());
    s.set_image(PixelBuffer::filled(W, H, [180, 150, 120, 255]));
    s.set_depth(scene_depth());
    s.set_segmentation(Some(scene_segmentation()));
    s
}

#[test_log::test]
fn drag_session_matches_pure_compute() {
    let mut s = session();
    let key = s.add_light(Light::point(0.2, 0.2, 0.4, 1.2));
    let fill = s.add_light(Light::directional(-1.0, 0.3, 0.5));

    // Drag in preview, then settle at full quality
    s.set_quality(Quality::Preview);
    let path: Vec<f32> = (0..4).map(|step| 0.2 + step as f32 * 0.1).collect();
    for (step, &x) in path.iter().enumerate() {
        s.move_light(key, x, 0.3, 0.4).unwrap();
        let frame = s.compute_frame().unwrap();
        if step > 0 {
            assert_eq!(frame.stats.shadows_recomputed, vec![key]);
            assert_eq!(frame.stats.shadows_reused, vec![fill]);
            assert!(!frame.stats.ao_recomputed);
        }
    }
    s.set_quality(Quality::Full);
    let settled = s.compute_frame().unwrap();
    assert!(!settled.stats.geometry_recomputed);
    assert!(settled.stats.ao_recomputed);

    let lights = [(key, Light::point(path[3], 0.3, 0.4, 1.2)), (fill, Light::directional(-1.0, 0.3, 0.5))];
    let albedo = PixelBuffer::filled(W, H, [180, 150, 120, 255]);
    let depth = scene_depth();
    let seg = scene_segmentation();
    let pure = compute_frame(&FrameInputs {
        albedo: &albedo,
        depth: Some(&depth),
        segmentation: Some(&seg),
        lights: &lights,
        params: s.params(),
        config: s.config(),
        materials: s.material_table(),
    })
    .unwrap();

    assert_eq!(settled.image, pure.image);
    assert_eq!(*settled.refined_depth, *pure.refined_depth);
}

#[test]
fn fused_session_pins_sky() {
    let mut s = session();
    let frame = s.compute_frame().unwrap();
    assert!(frame.materials.is_some());
    for x in 0..W {
        for y in 0..4 {
            assert_eq!(frame.refined_depth.data[y * W + x], 1.0);
        }
    }
    // Sky is background: never occluded
    assert!(frame.ao.data[..4 * W].iter().all(|&v| v == 1.0));
}

#[test_log::test]
fn clearing_segmentation_falls_back_to_depth_normals() {
    let mut s = session();
    let fused = s.compute_frame().unwrap();
    assert!(fused.materials.is_some());

    s.set_segmentation(None);
    let plain = s.compute_frame().unwrap();
    assert!(plain.stats.geometry_recomputed);
    assert!(plain.materials.is_none());
    assert_eq!(*plain.refined_depth, scene_depth());

    s.set_segmentation(Some(SegmentationResult::default()));
    let broken = s.compute_frame().unwrap();
    assert!(broken.materials.is_none());
    assert!(broken.fusion_error.is_some());
}

#[test]
fn lighting_params_only_recomposite() {
    let mut s = session();
    let id = s.add_light(Light::point(0.5, 0.5, 0.5, 1.0));
    let before = s.compute_frame().unwrap();

    s.params_mut().brightness = 1.3;
    s.params_mut().color_temperature = 3500.0;
    let after = s.compute_frame().unwrap();
    assert!(!after.stats.geometry_recomputed);
    assert!(!after.stats.ao_recomputed);
    assert_eq!(after.stats.shadows_reused, vec![id]);
    assert_ne!(before.image, after.image);

    // Softness shapes the shadow buffer itself
    s.params_mut().shadow_softness = 5.0;
    let softer = s.compute_frame().unwrap();
    assert_eq!(softer.stats.shadows_recomputed, vec![id]);
}

#[test]
fn new_material_table_invalidates_geometry() {
    let mut s = session();
    s.compute_frame().unwrap();
    let v = s.depth_version();

    let table = MaterialTable::from_json(r#"{"_default": {"roughness": 0.5}, "floor": {"roughness": 0.7, "forceDepth": 0.6}}"#).unwrap();
    s.set_material_table(Arc::new(table));
    assert_eq!(s.depth_version(), v + 1);

    let frame = s.compute_frame().unwrap();
    assert!(frame.stats.geometry_recomputed);
    assert_eq!(frame.refined_depth.data[(H - 1) * W], 0.6);
}

#[test]
fn stale_request_never_yields_a_frame() {
    let mut s = session();
    s.add_light(Light::point(0.5, 0.5, 0.5, 1.0));
    let queue = s.render_queue();

    let stale = queue.next();
    let current = queue.next();
    assert!(matches!(s.compute_frame_with(&stale), Err(RelightError::Superseded)));
    assert!(s.compute_frame_with(&current).is_ok());
}

#[test]
fn unknown_light_is_an_error() {
    let mut s = session();
    assert!(matches!(s.move_light(LightId(42), 0.1, 0.1, 0.1), Err(RelightError::UnknownLight(LightId(42)))));
    assert!(matches!(s.remove_light(LightId(42)), Err(RelightError::UnknownLight(_))));
}
