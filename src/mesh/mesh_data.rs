//! Renderer-facing mesh payload

use crate::core::types::{Vec2, Vec3};

/// A completed chunk mesh at one LOD tier.
///
/// Immutable once built; the scheduler hands these to the renderer behind an
/// `Arc` so a chunk slot and the render side can share one allocation.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uv: Vec<Vec2>,
    pub triangles: Vec<u32>,
    /// LOD tier this mesh was generated for
    pub lod: usize,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }
}
