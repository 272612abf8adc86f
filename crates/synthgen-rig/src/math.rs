//! Orientation helpers shared by the camera and light rigs.

use cgmath::{InnerSpace, Matrix3, Vector3};

/// Forward vectors shorter than this are treated as degenerate.
const EPSILON: f32 = 1e-6;

/// Rotation that makes a camera at `position` look at `target`.
///
/// The camera convention is right-handed with the view direction along the
/// local -Z axis, so the third column is the negated forward vector. When
/// `up` is nearly parallel to the view direction an alternate up vector is
/// substituted instead of dividing by a near-zero cross product.
pub fn look_at_rotation(
    position: Vector3<f32>,
    target: Vector3<f32>,
    up: Vector3<f32>,
) -> Matrix3<f32> {
    let forward = (target - position).normalize();

    let mut right = forward.cross(up);
    if right.magnitude() < EPSILON {
        let alt = if forward.z.abs() < 0.9 {
            Vector3::new(0.0, 0.0, 1.0)
        } else {
            Vector3::new(1.0, 0.0, 0.0)
        };
        right = forward.cross(alt);
    }
    let right = right.normalize();

    // Re-derive up so the basis is exactly orthogonal.
    let up = right.cross(forward).normalize();

    Matrix3::from_cols(right, up, -forward)
}

/// Euler angles that aim a light along `direction`: pitch from the vertical
/// component, yaw from the horizontal ones, no roll.
pub fn aim_euler(direction: Vector3<f32>) -> Vector3<f32> {
    let d = direction.normalize();
    let pitch = (-d.z).asin();
    let yaw = d.y.atan2(d.x);
    Vector3::new(pitch, 0.0, yaw)
}
