//! Near-nadir orbit camera planner.
//!
//! A batch of candidate poses is generated per scene: evenly spaced
//! azimuths around the scene center, with tilt-from-vertical and distance
//! drawn independently per sample. One pose is then picked uniformly for
//! each rendered image.

use cgmath::{Matrix4, Vector3};
use log::debug;
use rand::Rng;

use synthgen_engine::{Engine, Result};

use crate::math::look_at_rotation;

/// Camera sampling bounds. Angles are in degrees, distances in scene units.
#[derive(Debug, Clone)]
pub struct CameraParams {
    /// Tilt from vertical: 0 is pure nadir.
    pub nadir_angle_range: (f32, f32),
    /// Number of azimuth stops in one orbit batch.
    pub orbit_angles: u32,
    pub distance_range: (f32, f32),
    pub resolution: (u32, u32),
    /// Focal length in millimeters.
    pub focal_length: f32,
}

impl Default for CameraParams {
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

pub struct CameraOrbit {
    params: CameraParams,
    poses: Vec<Matrix4<f32>>,
}

impl CameraOrbit {
    pub fn new(params: CameraParams) -> Self {
        Self {
            params,
            poses: Vec::new(),
        }
    }

    /// One-time device configuration: output resolution and focal length.
    pub fn setup_intrinsics<E: Engine>(&self, engine: &mut E) -> Result<()> {
        let (width, height) = self.params.resolution;
        engine.set_camera_intrinsics(width, height, self.params.focal_length)
    }

    /// Regenerates the orbit batch around `center`. Each pose keeps the
    /// target centered; positions vary by evenly spaced azimuth plus
    /// per-sample tilt and distance draws.
    pub fn generate_orbit(&mut self, center: Vector3<f32>, rng: &mut impl Rng) -> &[Matrix4<f32>] {
        self.poses.clear();

        let count = self.params.orbit_angles.max(1);
        for i in 0..count {
            let azimuth = std::f32::consts::TAU * i as f32 / count as f32;
            let distance =
                rng.gen_range(self.params.distance_range.0..self.params.distance_range.1);
            let nadir = rng
                .gen_range(self.params.nadir_angle_range.0..self.params.nadir_angle_range.1)
                .to_radians();

            let position = center
                + distance
                    * Vector3::new(
                        nadir.sin() * azimuth.cos(),
                        nadir.sin() * azimuth.sin(),
                        nadir.cos(),
                    );

            let rotation = look_at_rotation(position, center, Vector3::new(0.0, 1.0, 0.0));
            let mut pose = Matrix4::from(rotation);
            pose.w.x = position.x;
            pose.w.y = position.y;
            pose.w.z = position.z;
            self.poses.push(pose);
        }

        debug!("Generated {} orbit poses around {:?}", count, center);
        &self.poses
    }

    /// Picks one pose uniformly from the batch and applies it.
    pub fn pick_random_pose<E: Engine>(
        &mut self,
        engine: &mut E,
        rng: &mut impl Rng,
    ) -> Result<Matrix4<f32>> {
        if self.poses.is_empty() {
            self.generate_orbit(Vector3::new(0.0, 0.0, 0.15), rng);
        }
        let pose = self.poses[rng.gen_range(0..self.poses.len())];
        engine.set_camera_pose(pose)?;
        Ok(pose)
    }

    pub fn params(&self) -> &CameraParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn orbit_respects_distance_and_tilt_bounds() {
        let params = CameraParams::default();
        let mut orbit = CameraOrbit::new(params.clone());
        let mut rng = StdRng::seed_from_u64(42);
        let center = Vector3::new(0.0, 0.0, 0.05);

        for pose in orbit.generate_orbit(center, &mut rng) {
            let position = Vector3::new(pose.w.x, pose.w.y, pose.w.z);
            let offset = position - center;
            let distance = offset.magnitude();
            assert!(distance >= params.distance_range.0 && distance <= params.distance_range.1);

            // Tilt from vertical must stay inside the nadir range.
            let tilt = (offset.z / distance).acos().to_degrees();
            assert!(tilt <= params.nadir_angle_range.1 + 1e-3, "tilt {tilt}");
        }
    }

    #[test]
    fn orbit_count_matches_config() {
        let mut orbit = CameraOrbit::new(CameraParams {
            orbit_angles: 12,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            orbit
                .generate_orbit(Vector3::new(0.0, 0.0, 0.0), &mut rng)
                .len(),
            12
        );
    }

    #[test]
    fn poses_look_at_center() {
        let mut orbit = CameraOrbit::new(CameraParams::default());
        let mut rng = StdRng::seed_from_u64(9);
        let center = Vector3::new(0.0, 0.0, 0.05);

        for pose in orbit.generate_orbit(center, &mut rng) {
            let position = Vector3::new(pose.w.x, pose.w.y, pose.w.z);
            // Local -Z expressed in world space.
            let look = -Vector3::new(pose.z.x, pose.z.y, pose.z.z);
            let to_center = (center - position).normalize();
            assert!((look - to_center).magnitude() < 1e-4);
        }
    }
}
