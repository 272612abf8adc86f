//! Scene lifecycle: teardown/rebuild between images, surface creation,
//! device bookkeeping, and leak mitigation.
//!
//! The engine's scene graph is global mutable state with manual cleanup, so
//! exactly one [`SceneManager`] owns the engine. Every other component
//! borrows the engine through it and must not hold handles across a
//! [`SceneManager::clear_scene`] call.

use cgmath::{InnerSpace, Vector3};
use log::{debug, info};
use rand::Rng;

use crate::{DeviceInfo, Engine, EngineError, ObjectHandle, RenderSettings, Result};

/// How many scenes may pass between aggressive orphan purges. Per-scene
/// teardown alone does not bound memory over runs of thousands of images
/// because the engine's data-block reference counting leaks on rebuild.
const DEEP_PURGE_INTERVAL: u32 = 10;

/// One placed model instance, tracked from load until the next teardown.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub handle: ObjectHandle,
    pub class_name: String,
    /// 0-based index into the discovered class list.
    pub class_id: u32,
    /// `class_id + 1`; 0 is reserved for the background surface.
    pub category_id: u32,
    /// Engine instance id recorded at load time: contiguous from 2 in load
    /// order (1 is the surface).
    pub instance_id: u32,
    pub scale: f32,
}

impl SceneObject {
    pub fn new(
        handle: ObjectHandle,
        class_name: impl Into<String>,
        class_id: u32,
        instance_id: u32,
        scale: f32,
    ) -> Self {
        Self {
            handle,
            class_name: class_name.into(),
            class_id,
            category_id: class_id + 1,
            instance_id,
            scale,
        }
    }
}

/// Appearance of the surface plane objects land on.
#[derive(Debug, Clone)]
pub struct SurfaceStyle {
    pub base_color: [f32; 3],
    pub randomize_color: bool,
    pub color_variation: f32,
}

impl Default for SurfaceStyle {
    fn default() -> Self {
        Self {
            base_color: [0.5, 0.48, 0.45],
            randomize_color: true,
            color_variation: 0.2,
        }
    }
}

/// Owns the engine instance and the per-image scene lifecycle.
pub struct SceneManager<E: Engine> {
    engine: E,
    device: Option<DeviceInfo>,
    scenes_since_purge: u32,
}

impl<E: Engine> SceneManager<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            device: None,
            scenes_since_purge: 0,
        }
    }

    /// Brings the engine up and selects a device. Idempotent.
    pub fn initialize(&mut self, settings: &RenderSettings, prefer_gpu: bool) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let device = self.engine.initialize(settings, prefer_gpu)?;
        info!(
            "Rendering on {} ({} samples, {} bounces)",
            device.name, settings.samples, settings.max_bounces
        );
        self.device = Some(device);
        Ok(())
    }

    pub fn device(&self) -> Result<&DeviceInfo> {
        self.device
            .as_ref()
            .ok_or_else(|| EngineError::Init("scene manager not initialized".into()))
    }

    pub fn has_gpu(&self) -> bool {
        self.device.as_ref().map(|d| d.has_gpu).unwrap_or(false)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Tears down the previous scene: deletes every mesh object and purges
    /// orphaned engine data. Runs a deeper purge every few scenes to keep
    /// peak memory bounded over long runs.
    pub fn clear_scene(&mut self) {
        self.engine.clear_objects();
        self.engine.purge_orphans();

        self.scenes_since_purge += 1;
        if self.scenes_since_purge >= DEEP_PURGE_INTERVAL {
            debug!("Deep purge after {} scenes", self.scenes_since_purge);
            self.engine.purge_orphans();
            self.scenes_since_purge = 0;
        }
    }

    /// Rebuilds the surface plane, slightly below the origin so dropped
    /// objects come to rest at z ~ 0. Always the first mesh in the scene,
    /// which makes it engine instance 1.
    pub fn create_surface(&mut self, style: &SurfaceStyle, rng: &mut impl Rng) -> Result<ObjectHandle> {
        let plane = self
            .engine
            .create_plane(3.0, Vector3::new(0.0, 0.0, -0.01))?;

        let color = if style.randomize_color && style.color_variation > 0.0 {
            let v = style.color_variation;
            let mut c = style.base_color;
            for ch in c.iter_mut() {
                *ch = (*ch + rng.gen_range(-v..v)).clamp(0.0, 1.0);
            }
            c
        } else {
            style.base_color
        };
        let roughness = rng.gen_range(0.5..0.8);
        self.engine
            .set_material(plane, [color[0], color[1], color[2], 1.0], roughness);

        Ok(plane)
    }
}

/// Centroid and bounding radius of the settled objects, for aiming and
/// framing diagnostics. Falls back to the nominal scene center when the
/// object list is empty.
pub fn scene_bounds<E: Engine>(engine: &E, objects: &[SceneObject]) -> (Vector3<f32>, f32) {
    if objects.is_empty() {
        return (Vector3::new(0.0, 0.0, 0.15), 0.5);
    }

    let mut corners = Vec::with_capacity(objects.len() * 8);
    for obj in objects {
        corners.extend(engine.aabb(obj.handle).corners());
    }

    let mut centroid = Vector3::new(0.0, 0.0, 0.0);
    for corner in &corners {
        centroid += *corner;
    }
    centroid /= corners.len() as f32;

    let radius = corners
        .iter()
        .map(|c| (*c - centroid).magnitude())
        .fold(0.0f32, f32::max);

    (centroid, radius)
}
