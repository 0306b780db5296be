//! Scalar field sampling - lattices, fractal noise, the field source seam

pub mod scalar;
pub mod noise_map;

pub use scalar::ScalarField;
pub use noise_map::{
    NoiseFieldSource, NoiseSettings, ScalarFieldSource, build_octaves, sample_noise_at,
    sample_noise_map,
};
