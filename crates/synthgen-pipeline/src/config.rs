//! Configuration tree for a generation run.
//!
//! Loaded from YAML (or built in code), validated once up front, then
//! treated as immutable. Validation failures are the only errors allowed to
//! abort a run before any image is attempted.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

use synthgen_engine::{PhysicsParams, RenderSettings, SpawnRegion, SurfaceStyle};
use synthgen_rig::{CameraParams, LightingParams};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Camera sampling for nadir/near-nadir overhead shots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Tilt from vertical in degrees; 0 is pure nadir.
    pub nadir_angle_range: (f32, f32),
    /// Camera positions generated around the scene per batch.
    pub orbit_angles: u32,
    /// Distance from the scene center in meters.
    pub distance_range: (f32, f32),
    pub resolution: (u32, u32),
    /// Focal length in millimeters.
    pub focal_length: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            nadir_angle_range: (0.0, 15.0),
            orbit_angles: 8,
            distance_range: (0.8, 1.5),
            resolution: (1920, 1080),
            focal_length: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub enabled: bool,
    /// Drop height in meters.
    pub drop_height: f32,
    pub gravity: (f32, f32, f32),
    pub friction: f32,
    /// Bounciness in [0,1].
    pub restitution: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drop_height: 0.3,
            gravity: (0.0, 0.0, -9.81),
            friction: 0.5,
            restitution: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub num_lights: (u32, u32),
    /// Watts.
    pub intensity_range: (f32, f32),
    /// Kelvin.
    pub color_temp_range: (f32, f32),
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            num_lights: (2, 4),
            intensity_range: (30.0, 100.0),
            color_temp_range: (3000.0, 6500.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub base_color: (f32, f32, f32),
    pub randomize_color: bool,
    pub color_variation: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            base_color: (0.5, 0.48, 0.45),
            randomize_color: true,
            color_variation: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderEngineKind {
    #[serde(rename = "CYCLES")]
    Cycles,
    #[serde(rename = "EEVEE")]
    Eevee,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub engine: RenderEngineKind,
    pub samples: u32,
    pub max_bounces: u32,
    pub use_denoising: bool,
    /// Prefer GPU; falls back to CPU when none is detected.
    pub use_gpu: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            engine: RenderEngineKind::Cycles,
            samples: 128,
            max_bounces: 4,
            use_denoising: true,
            use_gpu: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub min_per_scene: u32,
    pub max_per_scene: u32,
    pub scale_range: (f32, f32),
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            min_per_scene: 1,
            max_per_scene: 5,
            scale_range: (0.8, 1.2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    // f64 so ratio-times-count arithmetic floors the way the ratios read:
    // 10 images at 0.7 must yield 7, not 6.999... truncated.
    pub train_split: f64,
    pub val_split: f64,
    pub test_split: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            train_split: 0.7,
            val_split: 0.15,
            test_split: 0.15,
        }
    }
}

/// Root configuration for one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Directory of 3D models, one subdirectory per class.
    pub model_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default = "default_num_images")]
    pub num_images: u32,
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub create_visualizations: bool,

    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub lighting: LightingConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub rendering: RenderConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
}

fn default_num_images() -> u32 {
    100
}

fn check_range(name: &str, range: (f32, f32)) -> Result<()> {
    if range.0 >= range.1 {
        return Err(ConfigError::Invalid(format!(
            "{name} minimum must be less than maximum, got ({}, {})",
            range.0, range.1
        )));
    }
    Ok(())
}

impl GenerationConfig {
    pub fn new(model_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            output_dir: output_dir.into(),
            num_images: default_num_images(),
            random_seed: None,
            create_visualizations: false,
            camera: CameraConfig::default(),
            physics: PhysicsConfig::default(),
            lighting: LightingConfig::default(),
            background: BackgroundConfig::default(),
            rendering: RenderConfig::default(),
            models: ModelsConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }

    /// Checks every invariant the pipeline depends on. Must pass before any
    /// generation work starts; nothing downstream re-validates.
    pub fn validate(&self) -> Result<()> {
        if !self.model_dir.exists() {
            return Err(ConfigError::Invalid(format!(
                "model directory does not exist: {}",
                self.model_dir.display()
            )));
        }
        if !self.model_dir.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "model path is not a directory: {}",
                self.model_dir.display()
            )));
        }
        if self.num_images == 0 {
            return Err(ConfigError::Invalid("num_images must be at least 1".into()));
        }

        check_range("camera.nadir_angle_range", self.camera.nadir_angle_range)?;
        check_range("camera.distance_range", self.camera.distance_range)?;
        if self.camera.orbit_angles == 0 {
            return Err(ConfigError::Invalid(
                "camera.orbit_angles must be at least 1".into(),
            ));
        }
        if self.camera.focal_length <= 0.0 {
            return Err(ConfigError::Invalid(
                "camera.focal_length must be positive".into(),
            ));
        }

        if self.models.min_per_scene == 0 {
            return Err(ConfigError::Invalid(
                "models.min_per_scene must be at least 1".into(),
            ));
        }
        if self.models.min_per_scene > self.models.max_per_scene {
            return Err(ConfigError::Invalid(format!(
                "models.min_per_scene ({}) must be <= max_per_scene ({})",
                self.models.min_per_scene, self.models.max_per_scene
            )));
        }
        if self.models.scale_range.0 > self.models.scale_range.1 {
            return Err(ConfigError::Invalid(
                "models.scale_range minimum must be <= maximum".into(),
            ));
        }

        check_range("lighting.intensity_range", self.lighting.intensity_range)?;
        check_range("lighting.color_temp_range", self.lighting.color_temp_range)?;

        let total =
            self.dataset.train_split + self.dataset.val_split + self.dataset.test_split;
        if !(0.99..=1.01).contains(&total) {
            return Err(ConfigError::Invalid(format!(
                "dataset splits must sum to 1.0, got {total:.3}"
            )));
        }
        Ok(())
    }

    pub fn from_yaml(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn to_yaml(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    // Projections onto the stage-level parameter structs.

    pub fn camera_params(&self) -> CameraParams {
        CameraParams {
            nadir_angle_range: self.camera.nadir_angle_range,
            orbit_angles: self.camera.orbit_angles,
            distance_range: self.camera.distance_range,
            resolution: self.camera.resolution,
            focal_length: self.camera.focal_length,
        }
    }

    pub fn physics_params(&self) -> PhysicsParams {
        PhysicsParams {
            enabled: self.physics.enabled,
            drop_height: self.physics.drop_height,
            friction: self.physics.friction,
            restitution: self.physics.restitution,
            spawn_region: SpawnRegion::default(),
        }
    }

    pub fn lighting_params(&self) -> LightingParams {
        LightingParams {
            num_lights: self.lighting.num_lights,
            intensity_range: self.lighting.intensity_range,
            color_temp_range: self.lighting.color_temp_range,
        }
    }

    pub fn surface_style(&self) -> SurfaceStyle {
        SurfaceStyle {
            base_color: [
                self.background.base_color.0,
                self.background.base_color.1,
                self.background.base_color.2,
            ],
            randomize_color: self.background.randomize_color,
            color_variation: self.background.color_variation,
        }
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            samples: self.rendering.samples,
            max_bounces: self.rendering.max_bounces,
            denoise: self.rendering.use_denoising,
        }
    }
}
