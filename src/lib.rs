//! Lithos - procedural spherical terrain streaming engine
//!
//! Builds and streams the surface mesh of a large spherical body from a 3D
//! scalar noise field, at multiple levels of detail, around a moving viewer.
//! Three parts carry the weight:
//!
//! - [`mesh`] — marching cubes isosurface extraction with topological
//!   ambiguity resolution (crack-free, 2-manifold output)
//! - [`streaming::ChunkIndex`] — sparse fixed-depth octree over chunk
//!   coordinates
//! - [`streaming::ChunkScheduler`] — per-tick chunk lifecycle, LOD selection
//!   and background task dispatch

pub mod core;
pub mod math;
pub mod field;
pub mod mesh;
pub mod streaming;
