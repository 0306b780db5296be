//! Fractal simplex noise sampled on a lattice

use noise::{NoiseFn, OpenSimplex};
use serde::{Deserialize, Serialize};

use crate::core::types::{UVec3, Vec3};
use crate::field::ScalarField;

/// Parameters for octave-summed simplex noise.
///
/// Out-of-range values are clamped by [`NoiseSettings::validate`] rather than
/// rejected.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoiseSettings {
    /// World units per noise unit (larger = smoother features)
    pub coord_scale: f32,
    /// Number of noise octaves summed per sample
    pub num_octaves: u32,
    /// Per-octave frequency multiplier
    pub lacunarity: f32,
    /// Per-octave amplitude multiplier, 0..=1
    pub persistence: f32,
    /// Base seed; octave `i` uses `seed + i`
    pub seed: u32,
    /// Remap samples to 0..=1 over the lattice's observed range
    pub normalized: bool,
    /// Constant added after normalization
    pub norm_shift: f32,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            coord_scale: 40.0,
            num_octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            seed: 0,
            normalized: false,
            norm_shift: 0.0,
        }
    }
}

impl NoiseSettings {
    /// Clamp all parameters into their valid ranges
    pub fn validate(&mut self) {
        self.coord_scale = self.coord_scale.max(0.01);
        self.num_octaves = self.num_octaves.max(1);
        self.lacunarity = self.lacunarity.max(1.0);
        self.persistence = self.persistence.clamp(0.0, 1.0);
    }
}

/// Supplies sampled scalar values on a regular lattice.
///
/// Pure and re-entrant; implementations are called from worker threads.
pub trait ScalarFieldSource: Send + Sync {
    /// Sample a `dims` lattice whose first sample sits at `bounds_min`,
    /// spaced one world unit apart
    fn sample(&self, bounds_min: Vec3, dims: UVec3) -> ScalarField;
}

/// Octave-summed OpenSimplex noise over 3D world coordinates
pub struct NoiseFieldSource {
    settings: NoiseSettings,
}

impl NoiseFieldSource {
    pub fn new(mut settings: NoiseSettings) -> Self {
        settings.validate();
        Self { settings }
    }

    pub fn settings(&self) -> &NoiseSettings {
        &self.settings
    }
}

impl ScalarFieldSource for NoiseFieldSource {
    fn sample(&self, bounds_min: Vec3, dims: UVec3) -> ScalarField {
        sample_noise_map(dims, bounds_min, &self.settings)
    }
}

/// One generator per octave; octave `i` is seeded `seed + i`
pub fn build_octaves(settings: &NoiseSettings) -> Vec<OpenSimplex> {
    (0..settings.num_octaves)
        .map(|i| OpenSimplex::new(settings.seed.wrapping_add(i)))
        .collect()
}

/// Octave-summed noise at a single world position.
///
/// Frequency is multiplied by the lacunarity before each octave is sampled,
/// so the first octave already runs at `lacunarity / coord_scale`.
pub fn sample_noise_at(p: Vec3, octaves: &[OpenSimplex], settings: &NoiseSettings) -> f32 {
    let mut frequency = 1.0f32;
    let mut amplitude = 1.0f32;
    let mut value = 0.0f32;

    for octave in octaves {
        frequency *= settings.lacunarity;
        let s = p * frequency / settings.coord_scale;
        value += octave.get([s.x as f64, s.y as f64, s.z as f64]) as f32 * amplitude;
        amplitude *= settings.persistence;
    }

    value
}

/// Fill a lattice with octave-summed noise, one world unit between samples
pub fn sample_noise_map(dims: UVec3, offset: Vec3, settings: &NoiseSettings) -> ScalarField {
    let octaves = build_octaves(settings);

    let mut min_value = f32::MAX;
    let mut max_value = f32::MIN;

    let mut field = ScalarField::from_fn(dims, |x, y, z| {
        let p = Vec3::new(x as f32, y as f32, z as f32) + offset;
        let value = sample_noise_at(p, &octaves, settings);

        min_value = min_value.min(value);
        max_value = max_value.max(value);
        value
    });

    if settings.normalized && max_value > min_value {
        let inv_range = 1.0 / (max_value - min_value);
        let shifted = ScalarField::from_fn(dims, |x, y, z| {
            (field.get(x, y, z) - min_value) * inv_range + settings.norm_shift
        });
        field = shifted;
    }

    log::trace!(
        "sampled {}x{}x{} noise lattice at {:?}: range [{:.3}, {:.3}]",
        dims.x, dims.y, dims.z, offset, min_value, max_value
    );

    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_clamps() {
        let mut settings = NoiseSettings {
            coord_scale: -3.0,
            num_octaves: 0,
            lacunarity: 0.5,
            persistence: 1.7,
            ..NoiseSettings::default()
        };
        settings.validate();
        assert_eq!(settings.coord_scale, 0.01);
        assert_eq!(settings.num_octaves, 1);
        assert_eq!(settings.lacunarity, 1.0);
        assert_eq!(settings.persistence, 1.0);
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let settings = NoiseSettings::default();
        let dims = UVec3::splat(5);
        let a = sample_noise_map(dims, Vec3::new(10.0, -4.0, 2.0), &settings);
        let b = sample_noise_map(dims, Vec3::new(10.0, -4.0, 2.0), &settings);
        assert_eq!(a.samples(), b.samples());
    }

    #[test]
    fn test_normalized_range() {
        let settings = NoiseSettings {
            normalized: true,
            norm_shift: 0.0,
            ..NoiseSettings::default()
        };
        let field = sample_noise_map(UVec3::splat(8), Vec3::ZERO, &settings);
        for &v in field.samples() {
            assert!((-1e-5..=1.0 + 1e-5).contains(&v), "sample {v} out of range");
        }
    }

    #[test]
    fn test_source_matches_free_function() {
        let settings = NoiseSettings::default();
        let source = NoiseFieldSource::new(settings.clone());
        let dims = UVec3::splat(4);
        let offset = Vec3::new(1.0, 2.0, 3.0);
        let a = source.sample(offset, dims);
        let b = sample_noise_map(dims, offset, &settings);
        assert_eq!(a.samples(), b.samples());
    }
}
