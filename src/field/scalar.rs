//! Regular 3D lattice of scalar samples

use crate::core::types::UVec3;

/// A 3D lattice of f32 samples, x-fastest layout.
///
/// Produced once by a field source or lattice builder and treated as
/// immutable afterwards.
#[derive(Clone, Debug)]
pub struct ScalarField {
    dims: UVec3,
    samples: Vec<f32>,
}

impl ScalarField {
    /// Create a zero-filled lattice with the given dimensions
    pub fn new(dims: UVec3) -> Self {
        let len = (dims.x * dims.y * dims.z) as usize;
        Self {
            dims,
            samples: vec![0.0; len],
        }
    }

    /// Wrap an already-filled sample buffer.
    ///
    /// `samples.len()` must equal the product of the dimensions.
    pub fn from_samples(dims: UVec3, samples: Vec<f32>) -> Self {
        debug_assert_eq!(samples.len(), (dims.x * dims.y * dims.z) as usize);
        Self { dims, samples }
    }

    /// Build a lattice by evaluating `f` at every sample point
    pub fn from_fn(dims: UVec3, mut f: impl FnMut(u32, u32, u32) -> f32) -> Self {
        let mut field = Self::new(dims);
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let idx = field.index(x, y, z);
                    field.samples[idx] = f(x, y, z);
                }
            }
        }
        field
    }

    /// Lattice dimensions (number of sample points per axis)
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    #[inline]
    fn index(&self, x: u32, y: u32, z: u32) -> usize {
        (x + y * self.dims.x + z * self.dims.x * self.dims.y) as usize
    }

    /// Sample value at a lattice point
    #[inline]
    pub fn get(&self, x: u32, y: u32, z: u32) -> f32 {
        self.samples[self.index(x, y, z)]
    }

    /// Overwrite a sample (lattice construction only)
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, z: u32, value: f32) {
        let idx = self.index(x, y, z);
        self.samples[idx] = value;
    }

    /// Raw samples, x-fastest
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_layout() {
        let field = ScalarField::from_fn(UVec3::new(3, 4, 5), |x, y, z| {
            (x + y * 10 + z * 100) as f32
        });
        assert_eq!(field.get(0, 0, 0), 0.0);
        assert_eq!(field.get(2, 3, 4), 432.0);
        assert_eq!(field.samples().len(), 60);
        // x varies fastest
        assert_eq!(field.samples()[1], 1.0);
        assert_eq!(field.samples()[3], 10.0);
    }
}
