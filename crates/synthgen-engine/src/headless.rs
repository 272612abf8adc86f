//! Pure-Rust reference backend.
//!
//! `HeadlessEngine` implements the [`Engine`] contract with no external
//! engine process: physics settles objects analytically onto the surface
//! plane, and rendering projects each object's bounding box through the
//! active camera to rasterize an instance segmentation map plus a flat
//! shaded color buffer. Output is crude but geometrically honest, which is
//! exactly what the pipeline and its tests need.

use cgmath::{
    EuclideanSpace, Euler, Matrix3, Matrix4, Point3, Rad, SquareMatrix, Transform, Vector3,
};
use ndarray::{Array2, Array3};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::{
    Aabb, ColorBuffer, DeviceInfo, Engine, EngineError, LightHandle, LightSpec, ObjectHandle,
    RenderData, RenderSettings, Result, RigidBodyParams, SimulationWindow,
};

/// Assumed sensor width when converting focal length to pixels, matching
/// the default 36 mm full-frame sensor of the real engine.
const SENSOR_WIDTH_MM: f32 = 36.0;

struct MeshState {
    handle: ObjectHandle,
    /// Local-space box, centered on the object origin.
    local: Aabb,
    position: Vector3<f32>,
    rotation: Vector3<f32>,
    scale: f32,
    color: [f32; 3],
    rigid: Option<RigidBodyParams>,
}

impl MeshState {
    fn world_aabb(&self) -> Aabb {
        let rot: Matrix3<f32> = Euler::new(
            Rad(self.rotation.x),
            Rad(self.rotation.y),
            Rad(self.rotation.z),
        )
        .into();
        Aabb::from_points(
            self.local
                .corners()
                .into_iter()
                .map(|c| rot * (c * self.scale) + self.position),
        )
        .expect("aabb has corners")
    }
}

/// In-process stand-in for the external content-creation engine.
pub struct HeadlessEngine {
    width: u32,
    height: u32,
    focal_mm: f32,
    camera_pose: Option<Matrix4<f32>>,
    meshes: Vec<MeshState>,
    lights: Vec<LightHandle>,
    next_id: u64,
    segmentation_enabled: bool,
    initialized: bool,
}

impl HeadlessEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            focal_mm: 50.0,
            camera_pose: None,
            meshes: Vec::new(),
            lights: Vec::new(),
            next_id: 1,
            segmentation_enabled: false,
            initialized: false,
        }
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn mesh(&self, obj: ObjectHandle) -> Option<&MeshState> {
        self.meshes.iter().find(|m| m.handle == obj)
    }

    fn mesh_mut(&mut self, obj: ObjectHandle) -> Option<&mut MeshState> {
        self.meshes.iter_mut().find(|m| m.handle == obj)
    }

    /// Projects a world point into pixel coordinates, or `None` when the
    /// point is at or behind the camera plane.
    fn project(&self, view: &Matrix4<f32>, world: Vector3<f32>) -> Option<(f32, f32)> {
        let cam = view.transform_point(Point3::from_vec(world));
        // The camera looks down its local -Z axis.
        if cam.z >= -1e-6 {
            return None;
        }
        let fx = self.focal_mm / SENSOR_WIDTH_MM * self.width as f32;
        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;
        let u = cx + fx * (cam.x / -cam.z);
        let v = cy - fx * (cam.y / -cam.z);
        Some((u, v))
    }

    /// Pixel rectangle covered by an object's projected bounding box.
    fn projected_rect(&self, view: &Matrix4<f32>, aabb: &Aabb) -> Option<(u32, u32, u32, u32)> {
        let mut min_u = f32::INFINITY;
        let mut min_v = f32::INFINITY;
        let mut max_u = f32::NEG_INFINITY;
        let mut max_v = f32::NEG_INFINITY;
        let mut visible = 0;
        for corner in aabb.corners() {
            // Corners behind the camera plane are dropped, not fatal.
            let Some((u, v)) = self.project(view, corner) else {
                continue;
            };
            visible += 1;
            min_u = min_u.min(u);
            min_v = min_v.min(v);
            max_u = max_u.max(u);
            max_v = max_v.max(v);
        }
        if visible == 0 {
            return None;
        }
        let x0 = min_u.floor().max(0.0) as u32;
        let y0 = min_v.floor().max(0.0) as u32;
        let x1 = (max_u.ceil() as i64).min(self.width as i64 - 1);
        let y1 = (max_v.ceil() as i64).min(self.height as i64 - 1);
        if x1 < x0 as i64 || y1 < y0 as i64 {
            return None;
        }
        Some((x0, y0, x1 as u32, y1 as u32))
    }
}

fn color_from_seed(seed: u64) -> [f32; 3] {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    let h = hasher.finish();
    [
        0.2 + (h & 0xff) as f32 / 255.0 * 0.8,
        0.2 + ((h >> 8) & 0xff) as f32 / 255.0 * 0.8,
        0.2 + ((h >> 16) & 0xff) as f32 / 255.0 * 0.8,
    ]
}

impl Engine for HeadlessEngine {
    fn initialize(&mut self, _settings: &RenderSettings, prefer_gpu: bool) -> Result<DeviceInfo> {
        self.initialized = true;
        if prefer_gpu {
            log::info!("Headless backend has no GPU device, falling back to CPU");
        }
        Ok(DeviceInfo {
            has_gpu: false,
            name: "headless rasterizer (CPU)".into(),
        })
    }

    fn set_camera_intrinsics(&mut self, width: u32, height: u32, focal_mm: f32) -> Result<()> {
        self.width = width;
        self.height = height;
        self.focal_mm = focal_mm;
        Ok(())
    }

    fn set_camera_pose(&mut self, pose: Matrix4<f32>) -> Result<()> {
        self.camera_pose = Some(pose);
        Ok(())
    }

    fn load_model(&mut self, path: &Path) -> Result<Vec<ObjectHandle>> {
        let ext_ok = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("obj" | "glb" | "gltf" | "ply" | "stl" | "fbx")
        );
        if !ext_ok {
            return Err(EngineError::ModelLoad {
                path: path.to_path_buf(),
                reason: "unsupported extension".into(),
            });
        }

        // Deterministic half-extents from the file name, so distinct models
        // get distinct (but stable) silhouettes.
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let h = hasher.finish();
        let hx = 0.02 + (h & 0xff) as f32 / 255.0 * 0.04;
        let hy = 0.02 + ((h >> 8) & 0xff) as f32 / 255.0 * 0.04;
        let hz = 0.01 + ((h >> 16) & 0xff) as f32 / 255.0 * 0.03;

        let handle = ObjectHandle(self.next_handle());
        self.meshes.push(MeshState {
            handle,
            local: Aabb {
                min: Vector3::new(-hx, -hy, -hz),
                max: Vector3::new(hx, hy, hz),
            },
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Vector3::new(0.0, 0.0, 0.0),
            scale: 1.0,
            color: color_from_seed(h),
            rigid: None,
        });
        Ok(vec![handle])
    }

    fn create_plane(&mut self, scale: f32, location: Vector3<f32>) -> Result<ObjectHandle> {
        let handle = ObjectHandle(self.next_handle());
        self.meshes.push(MeshState {
            handle,
            local: Aabb {
                min: Vector3::new(-scale, -scale, -0.005),
                max: Vector3::new(scale, scale, 0.005),
            },
            position: location,
            rotation: Vector3::new(0.0, 0.0, 0.0),
            scale: 1.0,
            color: [0.5, 0.48, 0.45],
            rigid: None,
        });
        Ok(handle)
    }

    fn set_material(&mut self, obj: ObjectHandle, base_color: [f32; 4], _roughness: f32) {
        if let Some(mesh) = self.mesh_mut(obj) {
            mesh.color = [base_color[0], base_color[1], base_color[2]];
        }
    }

    fn set_location(&mut self, obj: ObjectHandle, position: Vector3<f32>) {
        if let Some(mesh) = self.mesh_mut(obj) {
            mesh.position = position;
        }
    }

    fn location(&self, obj: ObjectHandle) -> Vector3<f32> {
        self.mesh(obj)
            .map(|m| m.position)
            .unwrap_or_else(|| Vector3::new(0.0, 0.0, 0.0))
    }

    fn set_rotation_euler(&mut self, obj: ObjectHandle, rotation: Vector3<f32>) {
        if let Some(mesh) = self.mesh_mut(obj) {
            mesh.rotation = rotation;
        }
    }

    fn set_scale(&mut self, obj: ObjectHandle, scale: f32) {
        if let Some(mesh) = self.mesh_mut(obj) {
            mesh.scale = scale;
        }
    }

    fn aabb(&self, obj: ObjectHandle) -> Aabb {
        self.mesh(obj).map(|m| m.world_aabb()).unwrap_or(Aabb {
            min: Vector3::new(0.0, 0.0, 0.0),
            max: Vector3::new(0.0, 0.0, 0.0),
        })
    }

    fn enable_rigidbody(&mut self, obj: ObjectHandle, params: &RigidBodyParams) -> Result<()> {
        match self.mesh_mut(obj) {
            Some(mesh) => {
                mesh.rigid = Some(params.clone());
                Ok(())
            }
            None => Err(EngineError::UnknownObject(obj)),
        }
    }

    fn simulate_physics(&mut self, _window: &SimulationWindow) -> Result<()> {
        // Analytic settle: every dynamic body falls straight down until its
        // box rests on the z=0 plane, keeping the orientation it was
        // dropped with.
        for i in 0..self.meshes.len() {
            let active = self.meshes[i]
                .rigid
                .as_ref()
                .map(|r| r.active)
                .unwrap_or(false);
            if !active {
                continue;
            }
            let world = self.meshes[i].world_aabb();
            let offset = world.min.z - self.meshes[i].position.z;
            self.meshes[i].position.z = -offset;
        }
        Ok(())
    }

    fn add_light(&mut self, _spec: &LightSpec) -> LightHandle {
        let handle = LightHandle(self.next_handle());
        self.lights.push(handle);
        handle
    }

    fn remove_light(&mut self, light: LightHandle) {
        self.lights.retain(|l| *l != light);
    }

    fn enable_segmentation_output(&mut self) {
        self.segmentation_enabled = true;
    }

    fn render(&mut self) -> Result<RenderData> {
        if !self.initialized {
            return Err(EngineError::Render("engine not initialized".into()));
        }
        let pose = self
            .camera_pose
            .ok_or_else(|| EngineError::Render("no camera pose set".into()))?;
        let view = pose
            .invert()
            .ok_or_else(|| EngineError::Render("camera pose is singular".into()))?;

        let (w, h) = (self.width as usize, self.height as usize);
        let mut instances = Array2::<u32>::zeros((h, w));
        let mut color = Array3::<f32>::from_elem((h, w, 3), 0.08);

        // Painter order = insertion order, so later objects overwrite the
        // surface exactly as they occlude it from a nadir camera.
        for (idx, mesh) in self.meshes.iter().enumerate() {
            let Some((x0, y0, x1, y1)) = self.projected_rect(&view, &mesh.world_aabb()) else {
                continue;
            };
            let id = idx as u32 + 1;
            for y in y0..=y1 {
                for x in x0..=x1 {
                    if self.segmentation_enabled {
                        instances[[y as usize, x as usize]] = id;
                    }
                    for c in 0..3 {
                        color[[y as usize, x as usize, c]] = mesh.color[c];
                    }
                }
            }
        }

        Ok(RenderData {
            color: ColorBuffer::F32(color),
            instances,
            depth: None,
            normals: None,
        })
    }

    fn instance_id(&self, obj: ObjectHandle) -> Option<u32> {
        self.meshes
            .iter()
            .position(|m| m.handle == obj)
            .map(|i| i as u32 + 1)
    }

    fn delete_object(&mut self, obj: ObjectHandle) {
        self.meshes.retain(|m| m.handle != obj);
    }

    fn clear_objects(&mut self) {
        self.meshes.clear();
    }

    fn purge_orphans(&mut self) {
        // Nothing is reference counted here; kept for contract parity.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nadir_pose(height: f32) -> Matrix4<f32> {
        // Camera straight above the origin looking down: world axes map to
        // camera right=+X, up=+Y... looking along -Z means no rotation at
        // all, just a translation up the z axis.
        Matrix4::from_translation(Vector3::new(0.0, 0.0, height))
    }

    #[test]
    fn render_marks_surface_and_object_instances() {
        let mut eng = HeadlessEngine::new(128, 128);
        eng.initialize(&RenderSettings::default(), false).unwrap();
        eng.create_plane(3.0, Vector3::new(0.0, 0.0, -0.01)).unwrap();
        let obj = eng.load_model(Path::new("models/awl/a.obj")).unwrap()[0];
        eng.set_location(obj, Vector3::new(0.0, 0.0, 0.05));
        eng.set_camera_pose(nadir_pose(1.2)).unwrap();
        eng.enable_segmentation_output();

        let data = eng.render().unwrap();
        let center = data.instances[[64, 64]];
        assert_eq!(center, 2, "object should cover the image center");
        assert!(
            data.instances.iter().any(|v| *v == 1),
            "surface should be visible around the object"
        );
    }

    #[test]
    fn settle_rests_boxes_on_plane() {
        let mut eng = HeadlessEngine::new(64, 64);
        eng.initialize(&RenderSettings::default(), false).unwrap();
        let obj = eng.load_model(Path::new("models/blade/b.obj")).unwrap()[0];
        eng.set_location(obj, Vector3::new(0.1, 0.1, 0.3));
        eng.enable_rigidbody(obj, &RigidBodyParams::default()).unwrap();
        eng.simulate_physics(&SimulationWindow::default()).unwrap();

        let aabb = eng.aabb(obj);
        assert!(aabb.min.z.abs() < 1e-5);
    }

    #[test]
    fn deleting_objects_shifts_instance_ids() {
        let mut eng = HeadlessEngine::new(64, 64);
        eng.initialize(&RenderSettings::default(), false).unwrap();
        eng.create_plane(3.0, Vector3::new(0.0, 0.0, -0.01)).unwrap();
        let a = eng.load_model(Path::new("models/awl/a.obj")).unwrap()[0];
        let b = eng.load_model(Path::new("models/blade/b.obj")).unwrap()[0];
        assert_eq!(eng.instance_id(b), Some(3));
        eng.delete_object(a);
        assert_eq!(eng.instance_id(b), Some(2));
    }
}
