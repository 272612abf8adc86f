//! Generation orchestrator: the per-image compose → settle → validate →
//! render → annotate → persist state machine, plus the split-wise batch
//! loop around it.
//!
//! Failure containment is the whole design: a single bad draw (corrupt
//! mesh, everything rolling off the surface, nothing visible in frame)
//! costs at most one retry, and an exhausted retry budget costs exactly one
//! missing image — never the batch.

use anyhow::{bail, Context};
use cgmath::Vector3;
use image::codecs::jpeg::JpegEncoder;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

use synthgen_annotate::{from_segmentation, render_annotated, save_annotations};
use synthgen_engine::{
    physics::within_surface_bounds, scene::scene_bounds, Engine, PlacementStage, RenderData,
    SceneManager, SceneObject,
};
use synthgen_rig::{CameraOrbit, LightRig};

use crate::catalog::ModelCatalog;
use crate::config::GenerationConfig;
use crate::dataset::{next_index, split_counts, OutputLayout, Split};
use crate::report::RunSummary;

/// Full-scene retries per image before the index is abandoned.
const MAX_ATTEMPTS: u32 = 5;

const JPEG_QUALITY: u8 = 95;

/// Nominal aim point for lights and camera: just above the surface, where
/// the objects are.
fn scene_center() -> Vector3<f32> {
    Vector3::new(0.0, 0.0, 0.05)
}

pub struct Generator<E: Engine> {
    config: GenerationConfig,
    scene: SceneManager<E>,
    camera: CameraOrbit,
    lights: LightRig,
    placement: PlacementStage,
    catalog: ModelCatalog,
    layout: OutputLayout,
    rng: StdRng,
    failed_images: u32,
}

impl<E: Engine> Generator<E> {
    /// Validates the configuration, discovers the model catalog, and
    /// prepares the output structure. Everything fatal happens here.
    pub fn new(config: GenerationConfig, engine: E) -> anyhow::Result<Self> {
        config.validate()?;

        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut catalog = ModelCatalog::new(&config);
        catalog.discover()?;

        let layout = OutputLayout::new(&config.output_dir);
        layout.ensure_structure()?;

        let camera = CameraOrbit::new(config.camera_params());
        let lights = LightRig::new(config.lighting_params());
        let placement = PlacementStage::new(config.physics_params());

        Ok(Self {
            config,
            scene: SceneManager::new(engine),
            camera,
            lights,
            placement,
            catalog,
            layout,
            rng,
            failed_images: 0,
        })
    }

    /// Runs the full batch: every split sequentially, indices continuing
    /// from whatever already exists in the output directory.
    pub fn generate(&mut self, log_dir: Option<&Path>) -> anyhow::Result<RunSummary> {
        let start = Instant::now();
        info!(
            "Starting generation: {} images into {}",
            self.config.num_images,
            self.layout.root().display()
        );

        self.startup()?;
        info!("Rendering mode: {}", self.scene.device()?.kind());

        let counts = split_counts(
            self.config.num_images,
            self.config.dataset.train_split,
            self.config.dataset.val_split,
        );
        info!(
            "Dataset split - train: {}, val: {}, test: {}",
            counts.train, counts.val, counts.test
        );

        let mut dead_splits = Vec::new();
        for split in Split::ALL {
            let count = counts.get(split);
            let succeeded = self.generate_split(split, count)?;
            if count > 0 && succeeded == 0 {
                dead_splits.push(split);
            }
        }

        self.save_class_names()?;
        self.config
            .to_yaml(&self.layout.config_path())
            .context("saving config snapshot")?;

        if self.config.create_visualizations {
            self.create_visualizations()?;
        }

        let elapsed = start.elapsed().as_secs_f64();
        let summary = RunSummary {
            total_images: self.config.num_images,
            train_images: counts.train,
            val_images: counts.val,
            test_images: counts.test,
            failed_images: self.failed_images,
            num_classes: self.catalog.num_classes(),
            class_names: self.catalog.class_names().to_vec(),
            elapsed_seconds: elapsed,
            avg_seconds_per_image: elapsed / self.config.num_images as f64,
            device_type: self.scene.device()?.kind().to_string(),
            output_directory: self.layout.root().display().to_string(),
        };
        info!(
            "Generation complete in {:.2}s ({:.2}s per image), {} unrecoverable",
            summary.elapsed_seconds, summary.avg_seconds_per_image, summary.failed_images
        );

        if let Some(log_dir) = log_dir {
            summary.save(&log_dir.join("generation_summary.json"))?;
        }

        // Partial failures are tolerated; a split with zero output is not.
        if let Some(split) = dead_splits.first() {
            bail!("every image in the {split} split failed");
        }
        Ok(summary)
    }

    /// Small preview batch outside the split bookkeeping, for eyeballing
    /// settings before committing to a long run.
    pub fn preview(&mut self, num_images: u32) -> anyhow::Result<()> {
        self.startup()?;
        info!("Rendering mode: {}", self.scene.device()?.kind());

        let preview = self.layout.preview_dir();
        let images_dir = preview.join("images");
        let labels_dir = preview.join("labels");
        std::fs::create_dir_all(&images_dir)?;
        std::fs::create_dir_all(&labels_dir)?;

        for i in 0..num_images {
            let name = format!("preview_{i:03}");
            if !self.generate_single_image(&name, &images_dir, &labels_dir) {
                self.failed_images += 1;
            }
        }
        info!("Preview images saved to {}", preview.display());
        Ok(())
    }

    fn startup(&mut self) -> anyhow::Result<()> {
        self.scene
            .initialize(&self.config.render_settings(), self.config.rendering.use_gpu)?;
        self.camera.setup_intrinsics(self.scene.engine_mut())?;
        Ok(())
    }

    /// Returns how many images this split actually produced.
    fn generate_split(&mut self, split: Split, count: u32) -> anyhow::Result<u32> {
        if count == 0 {
            return Ok(0);
        }
        let images_dir = self.layout.images_dir(split);
        let labels_dir = self.layout.labels_dir(split);
        let start_index = next_index(&images_dir, split);
        info!("Generating {count} images for {split} split (from index {start_index})");

        let mut succeeded = 0u32;
        for i in 0..count {
            let name = format!("{}_{:06}", split, start_index + i);
            if self.generate_single_image(&name, &images_dir, &labels_dir) {
                succeeded += 1;
            } else {
                self.failed_images += 1;
            }
        }
        Ok(succeeded)
    }

    /// Bounded-retry wrapper: each attempt is a fresh scene with fresh
    /// draws. Returns whether the image was persisted.
    fn generate_single_image(&mut self, name: &str, images_dir: &Path, labels_dir: &Path) -> bool {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt_image(name, images_dir, labels_dir) {
                Ok(true) => return true,
                Ok(false) => {
                    warn!("Attempt {attempt}/{MAX_ATTEMPTS} for {name}: no valid annotations, retrying");
                }
                Err(e) => {
                    error!("Attempt {attempt}/{MAX_ATTEMPTS} for {name} failed: {e:#}");
                }
            }
        }
        error!("Failed to generate {name} after {MAX_ATTEMPTS} attempts, skipping");
        false
    }

    /// One pass through the per-image state machine. `Ok(false)` means a
    /// clean soft failure (retryable); `Err` means the engine choked.
    fn attempt_image(
        &mut self,
        name: &str,
        images_dir: &Path,
        labels_dir: &Path,
    ) -> anyhow::Result<bool> {
        // Compose: previous scene down, fresh surface and objects up.
        self.scene.clear_scene();
        self.lights.clear(self.scene.engine_mut());
        let surface = self
            .scene
            .create_surface(&self.config.surface_style(), &mut self.rng)?;

        self.catalog.reset_instance_counter();
        let objects = self
            .catalog
            .sample_scene(self.scene.engine_mut(), &mut self.rng, None);
        if objects.is_empty() {
            warn!("No objects could be loaded for this scene");
            return Ok(false);
        }
        info!("Loaded {} objects for {name}", objects.len());

        // Settle.
        self.placement
            .settle(self.scene.engine_mut(), &objects, surface, &mut self.rng)?;

        // Validate: discard anything that rolled off or sank.
        let objects = self.validate_objects(objects);
        if objects.is_empty() {
            warn!("No objects remained on the surface after settling");
            return Ok(false);
        }
        let (centroid, radius) = scene_bounds(self.scene.engine(), &objects);
        debug!(
            "{} objects settled around ({:.2}, {:.2}, {:.2}), radius {:.2}",
            objects.len(),
            centroid.x,
            centroid.y,
            centroid.z,
            radius
        );

        // Render environment around the nominal center.
        let center = scene_center();
        self.lights
            .generate(self.scene.engine_mut(), center, &mut self.rng);
        self.camera.generate_orbit(center, &mut self.rng);
        self.camera
            .pick_random_pose(self.scene.engine_mut(), &mut self.rng)?;

        // The instance mapping depends on scene contents, so segmentation
        // must be re-enabled now, after the objects exist.
        self.scene.engine_mut().enable_segmentation_output();
        let RenderData {
            color, instances, ..
        } = self.scene.engine_mut().render()?;

        // Annotate.
        let annotations = from_segmentation(&instances, &objects);
        if annotations.is_empty() {
            warn!("Render succeeded but no object was visible in {name}");
            return Ok(false);
        }
        // The segmentation map is done; release it before encoding so at
        // most one large buffer is alive at a time.
        drop(instances);

        let image_path = images_dir.join(format!("{name}.jpg"));
        let file = File::create(&image_path)
            .with_context(|| format!("creating {}", image_path.display()))?;
        let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
        encoder
            .encode_image(&color.into_rgb8())
            .with_context(|| format!("encoding {}", image_path.display()))?;

        save_annotations(&annotations, &labels_dir.join(format!("{name}.txt")))?;

        info!("Generated {name} with {} annotations", annotations.len());
        Ok(true)
    }

    /// Applies the position-bound rule and deletes invalid objects from the
    /// scene. Survivors are re-stamped with contiguous instance ids, since
    /// engine deletions shift every later instance down.
    fn validate_objects(&mut self, objects: Vec<SceneObject>) -> Vec<SceneObject> {
        let engine = self.scene.engine_mut();
        let mut valid = Vec::with_capacity(objects.len());
        for obj in objects {
            let location = engine.location(obj.handle);
            if within_surface_bounds(location) {
                valid.push(obj);
            } else {
                warn!(
                    "{} fell off the surface at ({:.2}, {:.2}, {:.2}), removing",
                    obj.class_name, location.x, location.y, location.z
                );
                engine.delete_object(obj.handle);
            }
        }

        for (idx, obj) in valid.iter_mut().enumerate() {
            obj.instance_id = idx as u32 + 2;
            let reported = engine.instance_id(obj.handle);
            if reported != Some(obj.instance_id) {
                warn!(
                    "Engine reports instance {:?} for {} where {} was expected; \
                     annotations may mismatch",
                    reported, obj.class_name, obj.instance_id
                );
            }
        }
        valid
    }

    fn save_class_names(&self) -> anyhow::Result<()> {
        let path = self.layout.classes_path();
        std::fs::write(&path, self.catalog.class_names().join("\n"))
            .with_context(|| format!("writing {}", path.display()))?;
        info!(
            "Saved {} class names to {}",
            self.catalog.num_classes(),
            path.display()
        );
        Ok(())
    }

    /// Draws decoded label files back over every generated image.
    pub fn create_visualizations(&self) -> anyhow::Result<()> {
        visualize_dataset(&self.layout, Some(self.catalog.class_names()))
    }

    pub fn failed_images(&self) -> u32 {
        self.failed_images
    }

    pub fn class_names(&self) -> &[String] {
        self.catalog.class_names()
    }
}

/// Walks every split of an existing output layout and writes annotated
/// copies under `visualizations/{split}/`. Usable without a generator so
/// finished datasets can be inspected after the fact.
pub fn visualize_dataset(layout: &OutputLayout, class_names: Option<&[String]>) -> anyhow::Result<()> {
    for split in Split::ALL {
        let images_dir = layout.images_dir(split);
        if !images_dir.is_dir() {
            continue;
        }
        let mut images: Vec<_> = std::fs::read_dir(&images_dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("jpg"))
            .collect();
        images.sort();
        if images.is_empty() {
            continue;
        }

        let vis_dir = layout.visualizations_dir(split);
        info!(
            "Creating {} visualizations for the {split} split",
            images.len()
        );
        for image_path in images {
            let Some(stem) = image_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let label_path = layout.labels_dir(split).join(format!("{stem}.txt"));
            let output_path = vis_dir.join(format!("{stem}_annotated.jpg"));
            render_annotated(&image_path, &label_path, &output_path, class_names)?;
        }
    }
    Ok(())
}
