use cgmath::{Matrix4, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

use synthgen_engine::{
    Engine, HeadlessEngine, PhysicsParams, PlacementStage, RenderSettings, SceneManager,
    SceneObject, SurfaceStyle,
};

#[test]
fn full_scene_cycle_smoke() -> Result<(), Box<dyn std::error::Error>> {
    let mut scene = SceneManager::new(HeadlessEngine::new(160, 120));
    scene.initialize(&RenderSettings::default(), true)?;
    assert!(!scene.has_gpu(), "headless backend reports CPU only");

    let mut rng = StdRng::seed_from_u64(99);
    let surface = scene.create_surface(&SurfaceStyle::default(), &mut rng)?;

    let mut objects = Vec::new();
    for (i, path) in ["models/awl/a.obj", "models/blade/b.obj"].iter().enumerate() {
        let handle = scene.engine_mut().load_model(Path::new(path))?[0];
        objects.push(SceneObject::new(handle, "smoke", 0, i as u32 + 2, 1.0));
    }

    let stage = PlacementStage::new(PhysicsParams::default());
    stage.settle(scene.engine_mut(), &objects, surface, &mut rng)?;

    scene
        .engine_mut()
        .set_camera_pose(Matrix4::from_translation(Vector3::new(0.0, 0.0, 1.2)))?;
    scene.engine_mut().enable_segmentation_output();
    let data = scene.engine_mut().render()?;

    // Surface fills the frame; both objects should have carved out ids.
    let mut present: Vec<u32> = data.instances.iter().copied().collect();
    present.sort_unstable();
    present.dedup();
    assert!(present.contains(&1), "surface instance missing");

    let (width, height) = data.color.dimensions();
    assert_eq!((width, height), (160, 120));

    scene.clear_scene();
    assert_eq!(scene.engine().instance_id(surface), None);
    Ok(())
}
