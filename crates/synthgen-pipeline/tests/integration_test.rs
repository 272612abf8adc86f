//! Integration tests for the full generation pipeline, driven end to end
//! against the headless engine backend.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cgmath::{Matrix4, Vector3};
use synthgen_engine::{
    Aabb, DeviceInfo, Engine, HeadlessEngine, LightHandle, LightSpec, ObjectHandle, RenderData,
    RenderSettings, RigidBodyParams, SimulationWindow,
};
use synthgen_pipeline::{GenerationConfig, Generator};
use tempfile::tempdir;

fn model_tree(dir: &Path, classes: &[(&str, &[&str])]) {
    for (class, files) in classes {
        let class_dir = dir.join(class);
        std::fs::create_dir_all(&class_dir).unwrap();
        for file in *files {
            std::fs::write(class_dir.join(file), b"").unwrap();
        }
    }
}

fn small_config(model_dir: &Path, output_dir: &Path) -> GenerationConfig {
    let mut config = GenerationConfig::new(model_dir, output_dir);
    config.camera.resolution = (320, 240);
    // Wide lens so the whole spawn region is always in frame.
    config.camera.focal_length = 24.0;
    config.physics.enabled = false;
    config.models.min_per_scene = 1;
    config.models.max_per_scene = 1;
    config.random_seed = Some(7);
    config
}

fn jpg_count(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("jpg"))
            .count(),
        Err(_) => 0,
    }
}

#[test]
fn end_to_end_train_only_run() {
    let dir = tempdir().unwrap();
    let models = dir.path().join("models");
    let output = dir.path().join("output");
    model_tree(&models, &[("awl", &["f1.obj"]), ("blade", &["f2.obj"])]);

    let mut config = small_config(&models, &output);
    config.num_images = 3;
    config.dataset.train_split = 1.0;
    config.dataset.val_split = 0.0;
    config.dataset.test_split = 0.0;

    let mut generator = Generator::new(config, HeadlessEngine::new(320, 240)).unwrap();
    let summary = generator.generate(None).unwrap();

    assert_eq!(summary.train_images, 3);
    assert_eq!(summary.failed_images, 0);
    assert_eq!(jpg_count(&output.join("train/images")), 3);
    assert_eq!(jpg_count(&output.join("val/images")), 0);
    assert_eq!(jpg_count(&output.join("test/images")), 0);

    // Exactly one object per scene, so one annotation line each.
    for i in 0..3 {
        let label = output.join(format!("train/labels/train_{i:06}.txt"));
        let text = std::fs::read_to_string(&label).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines.len(), 1, "label {i} should hold one record");

        let fields: Vec<&str> = lines[0].split_whitespace().collect();
        assert_eq!(fields.len(), 5);
        let class_id: u32 = fields[0].parse().unwrap();
        assert!(class_id <= 1);
        for coord in &fields[1..] {
            let value: f32 = coord.parse().unwrap();
            assert!((0.0..=1.0).contains(&value), "{value} out of range");
        }
    }

    let classes = std::fs::read_to_string(output.join("classes.txt")).unwrap();
    assert_eq!(classes, "awl\nblade");
    assert!(output.join("config.yaml").is_file());
}

#[test]
fn reruns_append_after_existing_indices() {
    let dir = tempdir().unwrap();
    let models = dir.path().join("models");
    let output = dir.path().join("output");
    model_tree(&models, &[("awl", &["f1.obj"])]);

    // A previous run left train_000000 .. train_000004 behind.
    let images = output.join("train/images");
    std::fs::create_dir_all(&images).unwrap();
    for i in 0..5 {
        std::fs::write(images.join(format!("train_{i:06}.jpg")), b"").unwrap();
    }

    let mut config = small_config(&models, &output);
    config.num_images = 2;
    config.dataset.train_split = 1.0;
    config.dataset.val_split = 0.0;
    config.dataset.test_split = 0.0;

    let mut generator = Generator::new(config, HeadlessEngine::new(320, 240)).unwrap();
    generator.generate(None).unwrap();

    assert!(images.join("train_000005.jpg").is_file());
    assert!(images.join("train_000006.jpg").is_file());
    assert!(!images.join("train_000007.jpg").exists());
}

#[test]
fn split_sizing_matches_ratios_on_disk() {
    let dir = tempdir().unwrap();
    let models = dir.path().join("models");
    let output = dir.path().join("output");
    model_tree(&models, &[("awl", &["f1.obj"]), ("blade", &["f2.obj"])]);

    let mut config = small_config(&models, &output);
    config.num_images = 10;

    let mut generator = Generator::new(config, HeadlessEngine::new(320, 240)).unwrap();
    let summary = generator.generate(None).unwrap();

    assert_eq!(summary.train_images, 7);
    assert_eq!(summary.val_images, 1);
    assert_eq!(summary.test_images, 2);
    assert_eq!(jpg_count(&output.join("train/images")), 7);
    assert_eq!(jpg_count(&output.join("val/images")), 1);
    assert_eq!(jpg_count(&output.join("test/images")), 2);
}

#[test]
fn visualizations_cover_every_image() {
    let dir = tempdir().unwrap();
    let models = dir.path().join("models");
    let output = dir.path().join("output");
    model_tree(&models, &[("awl", &["f1.obj"])]);

    let mut config = small_config(&models, &output);
    config.num_images = 2;
    config.dataset.train_split = 1.0;
    config.dataset.val_split = 0.0;
    config.dataset.test_split = 0.0;
    config.create_visualizations = true;

    let mut generator = Generator::new(config, HeadlessEngine::new(320, 240)).unwrap();
    generator.generate(None).unwrap();

    assert!(output
        .join("visualizations/train/train_000000_annotated.jpg")
        .is_file());
    assert!(output
        .join("visualizations/train/train_000001_annotated.jpg")
        .is_file());
}

/// Engine wrapper whose segmentation output is always empty, so every
/// attempt ends in an annotation failure.
struct BlindEngine {
    inner: HeadlessEngine,
    renders: Arc<AtomicU32>,
}

impl Engine for BlindEngine {
    fn initialize(&mut self, settings: &RenderSettings, prefer_gpu: bool) -> synthgen_engine::Result<DeviceInfo> {
        self.inner.initialize(settings, prefer_gpu)
    }
    fn set_camera_intrinsics(&mut self, w: u32, h: u32, focal_mm: f32) -> synthgen_engine::Result<()> {
        self.inner.set_camera_intrinsics(w, h, focal_mm)
    }
    fn set_camera_pose(&mut self, pose: Matrix4<f32>) -> synthgen_engine::Result<()> {
        self.inner.set_camera_pose(pose)
    }
    fn load_model(&mut self, path: &Path) -> synthgen_engine::Result<Vec<ObjectHandle>> {
        self.inner.load_model(path)
    }
    fn create_plane(&mut self, scale: f32, location: Vector3<f32>) -> synthgen_engine::Result<ObjectHandle> {
        self.inner.create_plane(scale, location)
    }
    fn set_material(&mut self, obj: ObjectHandle, base_color: [f32; 4], roughness: f32) {
        self.inner.set_material(obj, base_color, roughness)
    }
    fn set_location(&mut self, obj: ObjectHandle, position: Vector3<f32>) {
        self.inner.set_location(obj, position)
    }
    fn location(&self, obj: ObjectHandle) -> Vector3<f32> {
        self.inner.location(obj)
    }
    fn set_rotation_euler(&mut self, obj: ObjectHandle, rotation: Vector3<f32>) {
        self.inner.set_rotation_euler(obj, rotation)
    }
    fn set_scale(&mut self, obj: ObjectHandle, scale: f32) {
        self.inner.set_scale(obj, scale)
    }
    fn aabb(&self, obj: ObjectHandle) -> Aabb {
        self.inner.aabb(obj)
    }
    fn enable_rigidbody(&mut self, obj: ObjectHandle, params: &RigidBodyParams) -> synthgen_engine::Result<()> {
        self.inner.enable_rigidbody(obj, params)
    }
    fn simulate_physics(&mut self, window: &SimulationWindow) -> synthgen_engine::Result<()> {
        self.inner.simulate_physics(window)
    }
    fn add_light(&mut self, spec: &LightSpec) -> LightHandle {
        self.inner.add_light(spec)
    }
    fn remove_light(&mut self, light: LightHandle) {
        self.inner.remove_light(light)
    }
    fn enable_segmentation_output(&mut self) {
        self.inner.enable_segmentation_output()
    }
    fn render(&mut self) -> synthgen_engine::Result<RenderData> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        let mut data = self.inner.render()?;
        data.instances.fill(0);
        Ok(data)
    }
    fn instance_id(&self, obj: ObjectHandle) -> Option<u32> {
        self.inner.instance_id(obj)
    }
    fn delete_object(&mut self, obj: ObjectHandle) {
        self.inner.delete_object(obj)
    }
    fn clear_objects(&mut self) {
        self.inner.clear_objects()
    }
    fn purge_orphans(&mut self) {
        self.inner.purge_orphans()
    }
}

#[test]
fn retry_budget_is_exactly_five_attempts() {
    let dir = tempdir().unwrap();
    let models = dir.path().join("models");
    let output = dir.path().join("output");
    model_tree(&models, &[("awl", &["f1.obj"])]);

    let config = small_config(&models, &output);
    let renders = Arc::new(AtomicU32::new(0));
    let engine = BlindEngine {
        inner: HeadlessEngine::new(320, 240),
        renders: renders.clone(),
    };

    let mut generator = Generator::new(config, engine).unwrap();
    generator.preview(1).unwrap();

    assert_eq!(renders.load(Ordering::SeqCst), 5, "one render per attempt");
    assert_eq!(generator.failed_images(), 1);
    assert_eq!(jpg_count(&output.join("preview/images")), 0);
    assert!(!output.join("preview/labels/preview_000.txt").exists());
}

#[test]
fn totally_failing_split_is_an_error() {
    let dir = tempdir().unwrap();
    let models = dir.path().join("models");
    let output = dir.path().join("output");
    model_tree(&models, &[("awl", &["f1.obj"])]);

    let mut config = small_config(&models, &output);
    config.num_images = 1;
    config.dataset.train_split = 1.0;
    config.dataset.val_split = 0.0;
    config.dataset.test_split = 0.0;

    let engine = BlindEngine {
        inner: HeadlessEngine::new(320, 240),
        renders: Arc::new(AtomicU32::new(0)),
    };
    let mut generator = Generator::new(config, engine).unwrap();
    assert!(generator.generate(None).is_err());
}
