//! Per-scene light rig randomization.
//!
//! Every scene gets exactly one key light (bright, warm-to-neutral area
//! light at a shadow-friendly elevation) plus a randomized count of
//! secondary fill/accent lights. All lights are destroyed and rebuilt each
//! scene; none survive a teardown.

use cgmath::Vector3;
use log::debug;
use rand::Rng;
use std::f32::consts::TAU;

use synthgen_engine::{Engine, LightHandle, LightKind, LightSpec};

use crate::color::kelvin_to_rgb;
use crate::math::aim_euler;

#[derive(Debug, Clone)]
pub struct LightingParams {
    /// Secondary light count bounds, upper bound exclusive.
    pub num_lights: (u32, u32),
    /// Intensity bounds in Watts.
    pub intensity_range: (f32, f32),
    /// Color temperature bounds in Kelvin.
    pub color_temp_range: (f32, f32),
}

impl Default for LightingParams {
    fn default() -> Self {
        Self {
            num_lights: (2, 4),
            intensity_range: (30.0, 100.0),
            color_temp_range: (3000.0, 6500.0),
        }
    }
}

pub struct LightRig {
    params: LightingParams,
    lights: Vec<LightHandle>,
}

impl LightRig {
    pub fn new(params: LightingParams) -> Self {
        Self {
            params,
            lights: Vec::new(),
        }
    }

    /// Removes every light created for the previous scene.
    pub fn clear<E: Engine>(&mut self, engine: &mut E) {
        for light in self.lights.drain(..) {
            engine.remove_light(light);
        }
    }

    /// Builds the full rig for a new scene, aimed at `center`.
    pub fn generate<E: Engine>(
        &mut self,
        engine: &mut E,
        center: Vector3<f32>,
        rng: &mut impl Rng,
    ) {
        self.clear(engine);

        let key = self.key_light(center, rng);
        self.lights.push(engine.add_light(&key));

        let (lo, hi) = self.params.num_lights;
        let count = if hi > lo { rng.gen_range(lo..hi) } else { lo };
        for _ in 0..count {
            let spec = self.secondary_light(center, rng);
            self.lights.push(engine.add_light(&spec));
        }
        debug!("Light rig: 1 key + {} secondary", count);
    }

    /// Key light: area type at 35-55 degrees elevation, top slice of the
    /// intensity range, neutral-warm color temperature.
    fn key_light(&self, center: Vector3<f32>, rng: &mut impl Rng) -> LightSpec {
        let angle = rng.gen_range(0.0..TAU);
        let elevation = rng.gen_range(35.0f32..55.0).to_radians();
        let distance = rng.gen_range(1.0..1.8);

        let position = center
            + distance
                * Vector3::new(
                    angle.cos() * elevation.cos(),
                    angle.sin() * elevation.cos(),
                    elevation.sin(),
                );

        let max = self.params.intensity_range.1;
        let energy = rng.gen_range(max * 0.8..max);
        let kelvin = rng.gen_range(4500.0..5500.0);

        LightSpec {
            kind: LightKind::Area,
            position,
            energy,
            color: kelvin_to_rgb(kelvin),
            rotation: aim_euler(center - position),
        }
    }

    fn secondary_light(&self, center: Vector3<f32>, rng: &mut impl Rng) -> LightSpec {
        let kind = match rng.gen::<f32>() {
            r if r < 0.4 => LightKind::Point,
            r if r < 0.9 => LightKind::Area,
            _ => LightKind::Directional,
        };

        let position = if kind == LightKind::Directional {
            // Position is visually irrelevant for directional lights; only
            // the aim direction matters, so parameterize by angle.
            let angle = rng.gen_range(0.0..TAU);
            let elevation = rng.gen_range(30.0f32..60.0).to_radians();
            let distance = 5.0;
            center
                + distance
                    * Vector3::new(
                        angle.cos() * elevation.sin(),
                        angle.sin() * elevation.sin(),
                        elevation.cos(),
                    )
        } else {
            let angle = rng.gen_range(0.0..TAU);
            let distance = rng.gen_range(0.5..1.5);
            let height = rng.gen_range(0.5..1.5);
            center + Vector3::new(distance * angle.cos(), distance * angle.sin(), height)
        };

        // Fill lights sit well below the key light's intensity.
        let (lo, hi) = self.params.intensity_range;
        let energy = rng.gen_range(lo * 0.5..hi * 0.6);

        let kelvin = rng.gen_range(self.params.color_temp_range.0..self.params.color_temp_range.1);

        LightSpec {
            kind,
            position,
            energy,
            color: kelvin_to_rgb(kelvin),
            rotation: aim_euler(center - position),
        }
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }
}
