//! Placement & physics stage: drop objects onto the surface and let them
//! settle, or fall back to deterministic flat placement.

use cgmath::Vector3;
use log::info;
use rand::Rng;
use std::f32::consts::TAU;

use crate::{
    CollisionShape, Engine, ObjectHandle, Result, RigidBodyParams, SceneObject, SimulationWindow,
};

/// Resting heights below this are treated as "sank through the surface".
const SINK_EPSILON: f32 = 0.015;
/// Corrected height for sunk objects. A pragmatic clamp, not physics.
const SINK_CORRECTION: f32 = 0.02;

/// Horizontal region objects spawn in, centered on the scene origin.
#[derive(Debug, Clone)]
pub struct SpawnRegion {
    pub x: (f32, f32),
    pub y: (f32, f32),
}

impl Default for SpawnRegion {
    fn default() -> Self {
        Self {
            x: (-0.4, 0.4),
            y: (-0.4, 0.4),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhysicsParams {
    pub enabled: bool,
    /// Height objects are released from when physics is on.
    pub drop_height: f32,
    pub friction: f32,
    pub restitution: f32,
    pub spawn_region: SpawnRegion,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            enabled: true,
            drop_height: 0.3,
            friction: 0.5,
            restitution: 0.3,
            spawn_region: SpawnRegion::default(),
        }
    }
}

/// Positions a scene's objects on the surface, with or without physics.
pub struct PlacementStage {
    params: PhysicsParams,
}

impl PlacementStage {
    pub fn new(params: PhysicsParams) -> Self {
        Self { params }
    }

    /// Settles `objects` onto `surface`. With physics enabled this marks the
    /// surface static, drops every object as a dynamic rigid body, and runs
    /// the solver for a bounded window; otherwise objects are laid flat at
    /// random positions with a random yaw.
    pub fn settle<E: Engine>(
        &self,
        engine: &mut E,
        objects: &[SceneObject],
        surface: ObjectHandle,
        rng: &mut impl Rng,
    ) -> Result<()> {
        if !self.params.enabled {
            self.place_flat(engine, objects, rng);
            return Ok(());
        }

        engine.enable_rigidbody(
            surface,
            &RigidBodyParams {
                active: false,
                shape: CollisionShape::Mesh,
                // Small margin so thin objects cannot tunnel through.
                collision_margin: 0.001,
                ..Default::default()
            },
        )?;

        for obj in objects {
            let x = rng.gen_range(self.params.spawn_region.x.0..self.params.spawn_region.x.1);
            let y = rng.gen_range(self.params.spawn_region.y.0..self.params.spawn_region.y.1);
            engine.set_location(obj.handle, Vector3::new(x, y, self.params.drop_height));
            engine.set_rotation_euler(
                obj.handle,
                Vector3::new(
                    rng.gen_range(0.0..TAU),
                    rng.gen_range(0.0..TAU),
                    rng.gen_range(0.0..TAU),
                ),
            );
            engine.enable_rigidbody(
                obj.handle,
                &RigidBodyParams {
                    active: true,
                    shape: CollisionShape::ConvexHull,
                    friction: self.params.friction,
                    restitution: self.params.restitution,
                    ..Default::default()
                },
            )?;
        }

        engine.simulate_physics(&SimulationWindow::default())?;

        for obj in objects {
            let loc = engine.location(obj.handle);
            if loc.z < SINK_EPSILON {
                engine.set_location(obj.handle, Vector3::new(loc.x, loc.y, SINK_CORRECTION));
                info!(
                    "{} rested at z={:.4}, corrected to {}",
                    obj.class_name, loc.z, SINK_CORRECTION
                );
            }
        }
        Ok(())
    }

    /// Deterministic fallback: bottom of each object's box on the z=0 plane,
    /// random position and yaw only.
    fn place_flat<E: Engine>(&self, engine: &mut E, objects: &[SceneObject], rng: &mut impl Rng) {
        for obj in objects {
            engine.set_rotation_euler(
                obj.handle,
                Vector3::new(0.0, 0.0, rng.gen_range(0.0..TAU)),
            );

            let x = rng.gen_range(self.params.spawn_region.x.0..self.params.spawn_region.x.1);
            let y = rng.gen_range(self.params.spawn_region.y.0..self.params.spawn_region.y.1);
            // Offset so the lowest vertex sits exactly on the surface plane.
            engine.set_location(obj.handle, Vector3::new(x, y, 0.0));
            let z_min = engine.aabb(obj.handle).min.z;
            engine.set_location(obj.handle, Vector3::new(x, y, -z_min));
        }
    }

    pub fn params(&self) -> &PhysicsParams {
        &self.params
    }
}

/// Post-settle validity rule: positive height and both horizontal
/// coordinates within one unit of the origin. Checked by the orchestrator
/// after [`PlacementStage::settle`] returns.
pub fn within_surface_bounds(location: Vector3<f32>) -> bool {
    location.z > 0.0 && location.x.abs() < 1.0 && location.y.abs() < 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeadlessEngine, RenderSettings, SceneManager, SurfaceStyle};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scene_with_objects(n: usize) -> (SceneManager<HeadlessEngine>, Vec<SceneObject>, ObjectHandle) {
        let mut scene = SceneManager::new(HeadlessEngine::new(64, 64));
        scene
            .initialize(&RenderSettings::default(), false)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let surface = scene
            .create_surface(&SurfaceStyle::default(), &mut rng)
            .unwrap();
        let mut objects = Vec::new();
        for i in 0..n {
            let handle = scene
                .engine_mut()
                .load_model(std::path::Path::new("models/awl/a.obj"))
                .unwrap()[0];
            objects.push(SceneObject::new(handle, "awl", 0, 2 + i as u32, 1.0));
        }
        (scene, objects, surface)
    }

    #[test]
    fn flat_placement_rests_on_surface() {
        let (mut scene, objects, surface) = scene_with_objects(3);
        let mut rng = StdRng::seed_from_u64(7);
        let stage = PlacementStage::new(PhysicsParams {
            enabled: false,
            ..Default::default()
        });
        stage
            .settle(scene.engine_mut(), &objects, surface, &mut rng)
            .unwrap();

        for obj in &objects {
            let aabb = scene.engine().aabb(obj.handle);
            assert!(aabb.min.z.abs() < 1e-5, "bottom should touch z=0");
            let loc = scene.engine().location(obj.handle);
            assert!(within_surface_bounds(loc), "object left spawn bounds: {loc:?}");
        }
    }

    #[test]
    fn physics_settle_corrects_sunk_objects() {
        let (mut scene, objects, surface) = scene_with_objects(2);
        let mut rng = StdRng::seed_from_u64(11);
        let stage = PlacementStage::new(PhysicsParams::default());
        stage
            .settle(scene.engine_mut(), &objects, surface, &mut rng)
            .unwrap();

        for obj in &objects {
            let loc = scene.engine().location(obj.handle);
            assert!(loc.z >= SINK_EPSILON || (loc.z - SINK_CORRECTION).abs() < 1e-6);
        }
    }
}
