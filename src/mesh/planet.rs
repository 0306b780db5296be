//! Planet surface field composition and chunk meshing
//!
//! The planet body is the zero set of `|p|^2 - r^2 + r` displaced by fractal
//! noise scaled with the body radius. Chunks mesh a windowed lattice of that
//! field; the preview path meshes the whole body in one pass.

use rayon::prelude::*;

use crate::core::types::{UVec3, Vec2, Vec3};
use crate::field::{NoiseSettings, ScalarField, build_octaves, sample_noise_at};
use crate::mesh::marching_cubes::{MarchingCubes, SurfaceBuffers, TopologyMode};
use crate::mesh::mesh_data::MeshData;

/// Undisplaced body field at a world position: negative inside, positive out
#[inline]
pub fn planet_surface(p: Vec3, radius: f32) -> f32 {
    p.length_squared() - radius * radius + radius
}

/// Compose the meshing lattice for one chunk at a given vertex stride.
///
/// `noise` is the chunk's full-resolution noise lattice (`chunk_size + 1`
/// samples per axis); stride `s` reads every `s`-th sample, so one noise
/// sample pass serves every LOD tier.
pub fn planet_lattice(
    noise: &ScalarField,
    bounds_min: Vec3,
    radius: f32,
    height_scale: f32,
    stride: u32,
) -> ScalarField {
    let stride = stride.max(1);
    let src = noise.dims();
    let dims = UVec3::new(
        (src.x - 1) / stride + 1,
        (src.y - 1) / stride + 1,
        (src.z - 1) / stride + 1,
    );

    ScalarField::from_fn(dims, |x, y, z| {
        let p = bounds_min + Vec3::new(x as f32, y as f32, z as f32) * stride as f32;
        let displacement = height_scale * radius * noise.get(x * stride, y * stride, z * stride);
        planet_surface(p, radius) - displacement
    })
}

/// Mesh one chunk of the planet at a given LOD tier.
///
/// Lattice-space vertices are scaled by the stride and offset to the chunk
/// origin; uvs carry the xy of the unit direction from the planet center.
pub fn generate_chunk_mesh(
    noise: &ScalarField,
    bounds_min: Vec3,
    radius: f32,
    height_scale: f32,
    stride: u32,
    lod: usize,
    mode: TopologyMode,
) -> MeshData {
    let lattice = planet_lattice(noise, bounds_min, radius, height_scale, stride);
    let buffers = MarchingCubes::new(mode).extract(&lattice, 0.0);
    log::trace!(
        "chunk mesh at {:?} lod {}: {} verts, {} tris",
        bounds_min,
        lod,
        buffers.vertex_count(),
        buffers.triangle_count()
    );
    buffers_to_mesh(buffers, bounds_min, stride, lod)
}

/// Mesh the entire body in one lattice, for editor-style previews.
///
/// The lattice is padded so displaced terrain cannot poke through the
/// boundary, and filled in parallel one z-slice per task.
pub fn generate_preview_mesh(
    noise: &NoiseSettings,
    radius: f32,
    height_scale: f32,
    stride: u32,
    mode: TopologyMode,
) -> MeshData {
    let stride = stride.max(1);
    let margin = (((height_scale * radius * 3.0).ceil() as u32) * 2 + 2).min(59);
    let core_cells = (2.0 * radius / stride as f32).ceil() as u32;
    let cells = core_cells + margin;
    let dims = UVec3::splat(cells + 1);
    let bounds_min = Vec3::splat(-((cells * stride) as f32) * 0.5);

    let octaves = build_octaves(noise);
    let slice = (dims.x * dims.y) as usize;
    let mut samples = vec![0.0f32; slice * dims.z as usize];

    samples
        .par_chunks_exact_mut(slice)
        .enumerate()
        .for_each(|(z, plane)| {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let p = bounds_min
                        + Vec3::new(x as f32, y as f32, z as f32) * stride as f32;
                    let displacement =
                        height_scale * radius * sample_noise_at(p, &octaves, noise);
                    plane[(x + y * dims.x) as usize] = planet_surface(p, radius) - displacement;
                }
            }
        });

    let lattice = ScalarField::from_samples(dims, samples);
    let buffers = MarchingCubes::new(mode).extract(&lattice, 0.0);
    log::debug!(
        "preview mesh: {}^3 lattice, {} verts, {} tris",
        dims.x,
        buffers.vertex_count(),
        buffers.triangle_count()
    );
    buffers_to_mesh(buffers, bounds_min, stride, 0)
}

fn buffers_to_mesh(buffers: SurfaceBuffers, bounds_min: Vec3, stride: u32, lod: usize) -> MeshData {
    let mut mesh = MeshData {
        lod,
        ..MeshData::default()
    };
    mesh.vertices.reserve(buffers.vertices.len());
    mesh.normals.reserve(buffers.vertices.len());
    mesh.uv.reserve(buffers.vertices.len());

    for vertex in &buffers.vertices {
        let world = vertex.position * stride as f32 + bounds_min;
        let dir = world.normalize_or_zero();
        mesh.vertices.push(world);
        mesh.normals.push(vertex.normal);
        mesh.uv.push(Vec2::new(dir.x, dir.y));
    }

    mesh.triangles.reserve(buffers.triangles.len() * 3);
    for tri in &buffers.triangles {
        mesh.triangles.extend_from_slice(tri);
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_noise(samples_per_axis: u32) -> ScalarField {
        ScalarField::new(UVec3::splat(samples_per_axis))
    }

    #[test]
    fn test_lattice_signs_for_bare_sphere() {
        // 8-unit chunk centered on the body, radius 3
        let noise = zero_noise(9);
        let lattice = planet_lattice(&noise, Vec3::splat(-4.0), 3.0, 0.0, 1);
        assert!(lattice.get(4, 4, 4) < 0.0, "center should be inside");
        assert!(lattice.get(0, 0, 0) > 0.0, "corner should be outside");
    }

    #[test]
    fn test_stride_reduces_lattice_dims() {
        let noise = zero_noise(9);
        let fine = planet_lattice(&noise, Vec3::splat(-4.0), 3.0, 0.0, 1);
        let coarse = planet_lattice(&noise, Vec3::splat(-4.0), 3.0, 0.0, 2);
        assert_eq!(fine.dims(), UVec3::splat(9));
        assert_eq!(coarse.dims(), UVec3::splat(5));
        // coarse samples are a subsampling of the fine lattice
        assert_eq!(coarse.get(2, 2, 2), fine.get(4, 4, 4));
    }

    #[test]
    fn test_chunk_mesh_vertices_sit_on_the_surface() {
        let noise = zero_noise(9);
        let mesh = generate_chunk_mesh(
            &noise,
            Vec3::splat(-4.0),
            3.0,
            0.0,
            1,
            0,
            TopologyMode::TopologicallyControlled,
        );
        assert!(mesh.vertex_count() > 0);
        assert!(mesh.triangle_count() > 0);
        assert_eq!(mesh.vertices.len(), mesh.normals.len());
        assert_eq!(mesh.vertices.len(), mesh.uv.len());

        // zero set of |p|^2 - r^2 + r lies at |p| = sqrt(r^2 - r)
        let expected = (3.0f32 * 3.0 - 3.0).sqrt();
        for v in &mesh.vertices {
            assert!(
                (v.length() - expected).abs() < 0.25,
                "vertex {v:?} off the sphere"
            );
        }
        for &i in &mesh.triangles {
            assert!((i as usize) < mesh.vertex_count());
        }
    }

    #[test]
    fn test_chunk_mesh_carries_lod_tag() {
        let noise = zero_noise(9);
        let mesh = generate_chunk_mesh(
            &noise,
            Vec3::splat(-4.0),
            3.0,
            0.0,
            2,
            3,
            TopologyMode::TopologicallyControlled,
        );
        assert_eq!(mesh.lod, 3);
    }

    #[test]
    fn test_preview_mesh_covers_the_body() {
        let settings = NoiseSettings {
            num_octaves: 2,
            ..NoiseSettings::default()
        };
        let mesh = generate_preview_mesh(
            &settings,
            4.0,
            0.02,
            1,
            TopologyMode::TopologicallyControlled,
        );
        assert!(mesh.vertex_count() > 0);
        assert!(mesh.triangle_count() > 0);
        for &i in &mesh.triangles {
            assert!((i as usize) < mesh.vertex_count());
        }
    }
}
