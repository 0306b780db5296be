//! Per-chunk lifecycle state

use std::sync::Arc;

use crate::core::types::{IVec3, Vec3};
use crate::field::ScalarField;
use crate::math::Aabb;
use crate::mesh::MeshData;

/// Chunk position in chunk-grid units
pub type ChunkCoord = IVec3;

/// One LOD tier's mesh slot.
///
/// `requested` stays set once a mesh exists; it only rolls back when the
/// producing task fails or the chunk deactivates.
#[derive(Clone, Debug, Default)]
pub struct LodSlot {
    pub mesh: Option<Arc<MeshData>>,
    pub requested: bool,
}

/// Lifecycle state for one terrain chunk.
///
/// The noise lattice is sampled once per activation cycle and shared with
/// mesh workers behind an `Arc`; each LOD tier meshes independently from it.
/// The generation counter invalidates worker results that started before the
/// chunk last deactivated.
#[derive(Clone, Debug)]
pub struct TerrainChunk {
    pub coord: ChunkCoord,
    pub bounds: Aabb,
    pub noise: Option<Arc<ScalarField>>,
    pub noise_requested: bool,
    pub lod_slots: Vec<LodSlot>,
    pub generation: u64,
    /// Tier currently assigned as renderable, if any
    pub active_lod: Option<usize>,
}

impl TerrainChunk {
    pub fn new(coord: ChunkCoord, chunk_size: u32, tier_count: usize) -> Self {
        let min = coord.as_vec3() * chunk_size as f32;
        Self {
            coord,
            bounds: Aabb::from_min_size(min, Vec3::splat(chunk_size as f32)),
            noise: None,
            noise_requested: false,
            lod_slots: vec![LodSlot::default(); tier_count],
            generation: 0,
            active_lod: None,
        }
    }

    pub fn noise_ready(&self) -> bool {
        self.noise.is_some()
    }

    pub fn mesh_at(&self, lod: usize) -> Option<&Arc<MeshData>> {
        self.lod_slots.get(lod).and_then(|slot| slot.mesh.as_ref())
    }

    /// Leave the active set: invalidate outstanding work and clear request
    /// flags so reactivation starts a fresh cycle. Cached data stays.
    pub fn deactivate(&mut self) {
        self.generation += 1;
        self.noise_requested = false;
        self.active_lod = None;
        for slot in &mut self.lod_slots {
            slot.requested = false;
        }
    }

    /// Drop cached noise and meshes (eviction beyond the retention distance)
    pub fn evict(&mut self) {
        self.noise = None;
        for slot in &mut self.lod_slots {
            slot.mesh = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UVec3;

    #[test]
    fn test_bounds_from_coord() {
        let chunk = TerrainChunk::new(ChunkCoord::new(-1, 0, 2), 16, 5);
        assert_eq!(chunk.bounds.min, Vec3::new(-16.0, 0.0, 32.0));
        assert_eq!(chunk.bounds.size(), Vec3::splat(16.0));
        assert_eq!(chunk.lod_slots.len(), 5);
    }

    #[test]
    fn test_deactivate_bumps_generation_and_rolls_back_flags() {
        let mut chunk = TerrainChunk::new(ChunkCoord::ZERO, 16, 2);
        chunk.noise = Some(Arc::new(ScalarField::new(UVec3::splat(2))));
        chunk.noise_requested = true;
        chunk.lod_slots[0].requested = true;
        chunk.lod_slots[0].mesh = Some(Arc::new(MeshData::default()));
        chunk.active_lod = Some(0);

        chunk.deactivate();
        assert_eq!(chunk.generation, 1);
        assert!(!chunk.noise_requested);
        assert!(!chunk.lod_slots[0].requested);
        assert_eq!(chunk.active_lod, None);
        // cached data survives deactivation
        assert!(chunk.noise_ready());
        assert!(chunk.mesh_at(0).is_some());
    }

    #[test]
    fn test_evict_drops_cached_data() {
        let mut chunk = TerrainChunk::new(ChunkCoord::ZERO, 16, 2);
        chunk.noise = Some(Arc::new(ScalarField::new(UVec3::splat(2))));
        chunk.lod_slots[1].mesh = Some(Arc::new(MeshData::default()));

        chunk.evict();
        assert!(!chunk.noise_ready());
        assert!(chunk.mesh_at(1).is_none());
    }
}
