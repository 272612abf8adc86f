// synthgen-engine/src/lib.rs
// ============================================================
// Render/physics engine boundary for synthgen
// The content-creation engine (scene graph, rigid bodies,
// renderer) is an external collaborator; this crate pins the
// narrow interface the pipeline is allowed to talk through.
// ------------------------------------------------------------
// Public API:
//   * Engine          – trait every backend implements
//   * SceneManager    – owns the engine + scene lifecycle
//   * PlacementStage  – drop/settle objects onto the surface
//   * HeadlessEngine  – pure-Rust reference backend
// ------------------------------------------------------------
// Build notes
//   * No engine process is linked here; production embeddings
//     provide their own `Engine` impl.
// ============================================================

//! synthgen – engine boundary layer
//!
//! Everything the generation pipeline needs from the 3D engine is expressed
//! as the [`Engine`] trait: load a model file, create the surface primitive,
//! move objects, run a bounded physics window, place the camera and lights,
//! and render a frame with an instance segmentation map. Object and light
//! handles are opaque ids; the engine's scene graph stays on the other side
//! of the boundary.
//!
//! [`HeadlessEngine`] is a self-contained backend that settles objects
//! analytically and rasterizes segmentation maps by projecting bounding
//! boxes, so the pipeline can run end to end without the real engine.

use cgmath::{Matrix4, Vector3};
use image::RgbImage;
use ndarray::{Array2, Array3};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod headless;
pub mod physics;
pub mod scene;

pub use headless::HeadlessEngine;
pub use physics::{PhysicsParams, PlacementStage, SpawnRegion};
pub use scene::{SceneManager, SceneObject, SurfaceStyle};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine initialization failed: {0}")]
    Init(String),
    #[error("Failed to import model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("Unknown object handle {0:?}")]
    UnknownObject(ObjectHandle),
    #[error("Physics step failed: {0}")]
    Physics(String),
    #[error("Render failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Opaque handle to a mesh object inside the engine's scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub u64);

/// Opaque handle to a light inside the engine's scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightHandle(pub u64);

/// Render device the engine ended up on after initialization.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub has_gpu: bool,
    pub name: String,
}

impl DeviceInfo {
    pub fn kind(&self) -> &'static str {
        if self.has_gpu {
            "GPU"
        } else {
            "CPU"
        }
    }
}

/// Renderer quality knobs forwarded verbatim to the backend.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub samples: u32,
    pub max_bounces: u32,
    pub denoise: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            samples: 128,
            max_bounces: 4,
            denoise: true,
        }
    }
}

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn corners(&self) -> [Vector3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vector3::new(a.x, a.y, a.z),
            Vector3::new(b.x, a.y, a.z),
            Vector3::new(a.x, b.y, a.z),
            Vector3::new(b.x, b.y, a.z),
            Vector3::new(a.x, a.y, b.z),
            Vector3::new(b.x, a.y, b.z),
            Vector3::new(a.x, b.y, b.z),
            Vector3::new(b.x, b.y, b.z),
        ]
    }

    pub fn from_points(points: impl IntoIterator<Item = Vector3<f32>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut aabb = Aabb {
            min: first,
            max: first,
        };
        for p in iter {
            aabb.min.x = aabb.min.x.min(p.x);
            aabb.min.y = aabb.min.y.min(p.y);
            aabb.min.z = aabb.min.z.min(p.z);
            aabb.max.x = aabb.max.x.max(p.x);
            aabb.max.y = aabb.max.y.max(p.y);
            aabb.max.z = aabb.max.z.max(p.z);
        }
        Some(aabb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Area,
    Directional,
}

/// Full description of one light; regenerated from scratch every scene.
#[derive(Debug, Clone)]
pub struct LightSpec {
    pub kind: LightKind,
    pub position: Vector3<f32>,
    /// Intensity in Watts.
    pub energy: f32,
    /// Linear RGB in [0,1], derived from a color temperature sample.
    pub color: [f32; 3],
    /// Euler rotation aiming the light at its target.
    pub rotation: Vector3<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionShape {
    /// Exact mesh collision; used for the static surface.
    Mesh,
    /// Convex hull; used for dropped objects.
    ConvexHull,
}

#[derive(Debug, Clone)]
pub struct RigidBodyParams {
    pub active: bool,
    pub shape: CollisionShape,
    pub collision_margin: f32,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl Default for RigidBodyParams {
    fn default() -> Self {
        Self {
            active: true,
            shape: CollisionShape::ConvexHull,
            collision_margin: 0.0,
            friction: 0.5,
            restitution: 0.3,
            linear_damping: 0.1,
            angular_damping: 0.1,
        }
    }
}

/// Bounded wall-clock window for the physics solver. The solver iterates
/// until velocities fall below its stability threshold or `max_time` is hit.
#[derive(Debug, Clone)]
pub struct SimulationWindow {
    pub min_time: f32,
    pub max_time: f32,
    pub check_interval: f32,
}

impl Default for SimulationWindow {
    fn default() -> Self {
        // Tuned window: settles reliably without burning render time.
        Self {
            min_time: 6.0,
            max_time: 10.0,
            check_interval: 0.5,
        }
    }
}

/// Color output of a render. Engines differ in whether they hand back
/// float or 8-bit buffers; conversion happens exactly once, at persist time.
#[derive(Debug, Clone)]
pub enum ColorBuffer {
    /// Channels in [0,1], shape (height, width, 3).
    F32(Array3<f32>),
    /// Channels in [0,255], shape (height, width, 3).
    U8(Array3<u8>),
}

impl ColorBuffer {
    pub fn dimensions(&self) -> (u32, u32) {
        let shape = match self {
            ColorBuffer::F32(a) => a.shape(),
            ColorBuffer::U8(a) => a.shape(),
        };
        (shape[1] as u32, shape[0] as u32)
    }

    /// Converts to an 8-bit RGB image, scaling float channels by 255.
    pub fn into_rgb8(self) -> RgbImage {
        let (width, height) = self.dimensions();
        let mut img = RgbImage::new(width, height);
        match self {
            ColorBuffer::F32(a) => {
                for (x, y, px) in img.enumerate_pixels_mut() {
                    for c in 0..3 {
                        px.0[c] = (a[[y as usize, x as usize, c]].clamp(0.0, 1.0) * 255.0) as u8;
                    }
                }
            }
            ColorBuffer::U8(a) => {
                for (x, y, px) in img.enumerate_pixels_mut() {
                    for c in 0..3 {
                        px.0[c] = a[[y as usize, x as usize, c]];
                    }
                }
            }
        }
        img
    }
}

/// One rendered frame. Depth and normal maps ride along when the backend
/// produces them; the pipeline only requires color + instance map.
#[derive(Debug)]
pub struct RenderData {
    pub color: ColorBuffer,
    /// Per-pixel engine instance ids: 0 background, 1 surface, 2+ objects.
    pub instances: Array2<u32>,
    pub depth: Option<Array2<f32>>,
    pub normals: Option<Array3<f32>>,
}

/// The narrow contract the pipeline holds against the 3D engine.
///
/// Engines assign instance ids to mesh objects by scene insertion order at
/// render time (1-based, so the first mesh — the surface — is instance 1).
/// [`Engine::instance_id`] reports the id a handle would get right now,
/// which lets callers validate the ordering assumption instead of trusting
/// it blindly.
pub trait Engine {
    /// Brings the engine up and selects a render device. Must fall back to
    /// CPU rather than fail when no GPU is present.
    fn initialize(&mut self, settings: &RenderSettings, prefer_gpu: bool) -> Result<DeviceInfo>;

    fn set_camera_intrinsics(&mut self, width: u32, height: u32, focal_mm: f32) -> Result<()>;
    fn set_camera_pose(&mut self, pose: Matrix4<f32>) -> Result<()>;

    /// Imports a model file, returning the mesh objects it produced.
    fn load_model(&mut self, path: &Path) -> Result<Vec<ObjectHandle>>;
    /// Creates the flat surface primitive at the given scale and location.
    fn create_plane(&mut self, scale: f32, location: Vector3<f32>) -> Result<ObjectHandle>;
    fn set_material(&mut self, obj: ObjectHandle, base_color: [f32; 4], roughness: f32);

    fn set_location(&mut self, obj: ObjectHandle, position: Vector3<f32>);
    fn location(&self, obj: ObjectHandle) -> Vector3<f32>;
    fn set_rotation_euler(&mut self, obj: ObjectHandle, rotation: Vector3<f32>);
    fn set_scale(&mut self, obj: ObjectHandle, scale: f32);
    /// World-space bounding box at the object's current transform.
    fn aabb(&self, obj: ObjectHandle) -> Aabb;

    fn enable_rigidbody(&mut self, obj: ObjectHandle, params: &RigidBodyParams) -> Result<()>;
    /// Runs the solver and bakes final poses back into object transforms.
    fn simulate_physics(&mut self, window: &SimulationWindow) -> Result<()>;

    fn add_light(&mut self, spec: &LightSpec) -> LightHandle;
    fn remove_light(&mut self, light: LightHandle);

    /// Must be called after the scene's objects exist: the instance mapping
    /// is built from scene contents at render time.
    fn enable_segmentation_output(&mut self);
    fn render(&mut self) -> Result<RenderData>;

    /// Instance id `obj` would receive in the next render, if it is alive.
    fn instance_id(&self, obj: ObjectHandle) -> Option<u32>;

    fn delete_object(&mut self, obj: ObjectHandle);
    /// Deletes every mesh object in the scene.
    fn clear_objects(&mut self);
    /// Releases engine-internal data orphaned by deletions. Repeated scene
    /// rebuilds leak without this; call it at teardown.
    fn purge_orphans(&mut self);
}
