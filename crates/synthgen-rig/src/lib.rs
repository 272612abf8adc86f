//! synthgen – camera and lighting rig layer
//!
//! Per-scene randomization of the viewpoint and the light setup:
//!
//! - [`CameraOrbit`] samples a batch of near-nadir orbit poses around the
//!   scene center and applies one of them per image.
//! - [`LightRig`] rebuilds a key light plus a handful of randomized
//!   secondary lights every scene.
//! - [`color::kelvin_to_rgb`] maps sampled color temperatures to linear RGB.
//!
//! Both rigs talk to the engine only through the `synthgen-engine` trait and
//! hold no state that survives a scene teardown besides their parameters.

pub mod camera;
pub mod color;
pub mod lighting;
pub mod math;

pub use camera::{CameraOrbit, CameraParams};
pub use lighting::{LightRig, LightingParams};
