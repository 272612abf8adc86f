//! Model catalog: class discovery and per-scene random sampling.
//!
//! The model directory holds one subdirectory per class; every recognized
//! 3D file inside is a candidate. Class ids are the indices of the sorted
//! class-name list, so they are stable across runs against the same
//! directory.

use log::{info, warn};
use rand::Rng;
use std::collections::BTreeMap;
use std::path::PathBuf;

use synthgen_engine::{Engine, SceneObject};

use crate::config::{ConfigError, GenerationConfig, Result};

const MODEL_EXTENSIONS: [&str; 6] = ["obj", "glb", "gltf", "ply", "stl", "fbx"];

/// Instance ids start here: 0 is background, 1 the surface plane.
const FIRST_OBJECT_INSTANCE: u32 = 2;

pub struct ModelCatalog {
    model_dir: PathBuf,
    min_per_scene: u32,
    max_per_scene: u32,
    scale_range: (f32, f32),
    /// BTreeMap keeps classes sorted, which fixes the class_id assignment.
    class_models: BTreeMap<String, Vec<PathBuf>>,
    class_names: Vec<String>,
    next_instance: u32,
}

impl ModelCatalog {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            model_dir: config.model_dir.clone(),
            min_per_scene: config.models.min_per_scene,
            max_per_scene: config.models.max_per_scene,
            scale_range: config.models.scale_range,
            class_models: BTreeMap::new(),
            class_names: Vec::new(),
            next_instance: FIRST_OBJECT_INSTANCE,
        }
    }

    /// Scans the model directory. Fails when no class yields any model —
    /// generation cannot proceed without content.
    pub fn discover(&mut self) -> Result<()> {
        self.class_models.clear();

        let entries = std::fs::read_dir(&self.model_dir).map_err(|source| ConfigError::Io {
            path: self.model_dir.display().to_string(),
            source,
        })?;

        for entry in entries.flatten() {
            let class_dir = entry.path();
            if !class_dir.is_dir() {
                continue;
            }
            let class_name = match class_dir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let mut models: Vec<PathBuf> = std::fs::read_dir(&class_dir)
                .map_err(|source| ConfigError::Io {
                    path: class_dir.display().to_string(),
                    source,
                })?
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| MODEL_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                        .unwrap_or(false)
                })
                .collect();
            models.sort();

            if !models.is_empty() {
                self.class_models.insert(class_name, models);
            }
        }

        self.class_names = self.class_models.keys().cloned().collect();
        if self.class_names.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "no model classes found in {}",
                self.model_dir.display()
            )));
        }
        info!(
            "Discovered {} classes ({} models total)",
            self.class_names.len(),
            self.class_models.values().map(Vec::len).sum::<usize>()
        );
        Ok(())
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Rewinds the per-scene instance counter. Must run before each scene's
    /// loads so ids stay contiguous from 2 in load order.
    pub fn reset_instance_counter(&mut self) {
        self.next_instance = FIRST_OBJECT_INSTANCE;
    }

    /// Loads a random object set into the scene. Individual import failures
    /// are logged and skipped; the scene simply ends up smaller.
    pub fn sample_scene<E: Engine>(
        &mut self,
        engine: &mut E,
        rng: &mut impl Rng,
        count: Option<u32>,
    ) -> Vec<SceneObject> {
        let count = count.unwrap_or_else(|| {
            rng.gen_range(self.min_per_scene..=self.max_per_scene)
        });

        let mut objects = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let class_idx = rng.gen_range(0..self.class_names.len());
            let class_name = &self.class_names[class_idx];
            let models = &self.class_models[class_name];
            let model_path = &models[rng.gen_range(0..models.len())];

            let handles = match engine.load_model(model_path) {
                Ok(handles) => handles,
                Err(e) => {
                    warn!("Skipping draw: {e}");
                    continue;
                }
            };
            if handles.is_empty() {
                warn!("No mesh objects loaded from {}", model_path.display());
                continue;
            }

            for handle in handles {
                let scale = if self.scale_range != (1.0, 1.0) {
                    rng.gen_range(self.scale_range.0..=self.scale_range.1)
                } else {
                    1.0
                };
                engine.set_scale(handle, scale);

                let instance_id = self.next_instance;
                self.next_instance += 1;

                // Cross-check the positional convention against the engine
                // instead of trusting it blindly.
                if engine.instance_id(handle) != Some(instance_id) {
                    warn!(
                        "Engine assigned instance {:?} to {} where {} was expected",
                        engine.instance_id(handle),
                        model_path.display(),
                        instance_id
                    );
                }

                objects.push(SceneObject::new(
                    handle,
                    class_name.clone(),
                    class_idx as u32,
                    instance_id,
                    scale,
                ));
            }
        }
        objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use synthgen_engine::HeadlessEngine;
    use tempfile::tempdir;

    fn model_tree(classes: &[(&str, &[&str])]) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for (class, files) in classes {
            let class_dir = dir.path().join("models").join(class);
            std::fs::create_dir_all(&class_dir).unwrap();
            for file in *files {
                std::fs::write(class_dir.join(file), b"").unwrap();
            }
        }
        std::fs::create_dir_all(dir.path().join("out")).unwrap();
        dir
    }

    fn catalog_for(dir: &tempfile::TempDir) -> ModelCatalog {
        let config = GenerationConfig::new(dir.path().join("models"), dir.path().join("out"));
        ModelCatalog::new(&config)
    }

    #[test]
    fn discovery_sorts_classes_and_ignores_junk() {
        let dir = model_tree(&[
            ("blade", &["b.obj", "a.obj"]),
            ("awl", &["x.glb", "notes.txt"]),
        ]);
        let mut catalog = catalog_for(&dir);
        catalog.discover().unwrap();

        assert_eq!(catalog.class_names(), ["awl", "blade"]);
        assert_eq!(catalog.num_classes(), 2);
    }

    #[test]
    fn empty_model_dir_is_a_config_error() {
        let dir = model_tree(&[]);
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        let mut catalog = catalog_for(&dir);
        assert!(matches!(catalog.discover(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn sampled_objects_get_contiguous_instance_ids() {
        let dir = model_tree(&[("awl", &["a.obj"]), ("blade", &["b.obj"])]);
        let mut catalog = catalog_for(&dir);
        catalog.discover().unwrap();

        let mut engine = HeadlessEngine::new(64, 64);
        // Surface occupies instance 1 before any object loads.
        engine
            .create_plane(3.0, cgmath::Vector3::new(0.0, 0.0, -0.01))
            .unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        catalog.reset_instance_counter();
        let objects = catalog.sample_scene(&mut engine, &mut rng, Some(4));

        assert_eq!(objects.len(), 4);
        for (i, obj) in objects.iter().enumerate() {
            assert_eq!(obj.instance_id, i as u32 + 2);
            assert_eq!(obj.category_id, obj.class_id + 1);
        }
    }

    #[test]
    fn class_ids_index_sorted_names() {
        let dir = model_tree(&[("blade", &["b.obj"]), ("awl", &["a.obj"])]);
        let mut catalog = catalog_for(&dir);
        catalog.discover().unwrap();

        let mut engine = HeadlessEngine::new(64, 64);
        engine
            .create_plane(3.0, cgmath::Vector3::new(0.0, 0.0, -0.01))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        catalog.reset_instance_counter();

        for obj in catalog.sample_scene(&mut engine, &mut rng, Some(16)) {
            let expected = catalog.class_names()[obj.class_id as usize].clone();
            assert_eq!(obj.class_name, expected);
        }
    }
}
