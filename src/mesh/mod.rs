//! Isosurface extraction and mesh assembly

pub mod tables;
pub mod marching_cubes;
pub mod mesh_data;
pub mod planet;

pub use marching_cubes::{MarchingCubes, SurfaceBuffers, TopologyMode, Vertex};
pub use mesh_data::MeshData;
pub use planet::{generate_chunk_mesh, generate_preview_mesh, planet_lattice, planet_surface};
