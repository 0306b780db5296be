//! Sparse fixed-depth octree over chunk coordinates
//!
//! The root covers the cube of chunks the displaced planet surface can reach.
//! Branches are allocated lazily on insert; every path from the trunk halves
//! `nodes_per_child` until a 2x2x2 leaf of chunk slots. Lookups on a missing
//! path are an absent value, not an error.

use crate::core::types::IVec3;
use crate::streaming::chunk::{ChunkCoord, TerrainChunk};
use crate::streaming::config::TerrainSettings;

struct Branch {
    /// Minimum chunk coordinate this node covers
    origin: IVec3,
    /// Chunk widths per axis covered by each of the 8 children
    nodes_per_child: i32,
    kind: NodeKind,
}

enum NodeKind {
    Branch([Option<Box<Branch>>; 8]),
    Leaf([Option<TerrainChunk>; 8]),
}

impl Branch {
    fn new(origin: IVec3, nodes_per_child: i32) -> Self {
        let kind = if nodes_per_child == 1 {
            NodeKind::Leaf(Default::default())
        } else {
            NodeKind::Branch(Default::default())
        };
        Self {
            origin,
            nodes_per_child,
            kind,
        }
    }

    /// Which octant of this node holds `coord`; valid only for coords
    /// inside the node's extent.
    fn child_slot(&self, coord: ChunkCoord) -> usize {
        let rel = coord - self.origin;
        let x = (rel.x / self.nodes_per_child).clamp(0, 1);
        let y = (rel.y / self.nodes_per_child).clamp(0, 1);
        let z = (rel.z / self.nodes_per_child).clamp(0, 1);
        (x + y * 2 + z * 4) as usize
    }

    fn child_origin(&self, slot: usize) -> IVec3 {
        let offset = IVec3::new(
            (slot & 1) as i32,
            ((slot >> 1) & 1) as i32,
            ((slot >> 2) & 1) as i32,
        );
        self.origin + offset * self.nodes_per_child
    }
}

/// Spatial index mapping chunk coordinates to [`TerrainChunk`] state.
///
/// Depth is fixed at construction from the body radius; there is no
/// rebalancing and no removal of interior nodes.
pub struct ChunkIndex {
    root_radius: i32,
    trunk: Branch,
}

impl ChunkIndex {
    pub fn new(settings: &TerrainSettings) -> Self {
        let reach = settings.radius + settings.noise_height_scale * 1.5;
        let needed = (reach / settings.chunk_size as f32).ceil().max(2.0) as u32;
        // power of two so every level halves cleanly down to 2x2x2 leaves
        let root_radius = needed.next_power_of_two() as i32;
        log::debug!(
            "chunk index covers [{}, {}) per axis",
            -root_radius,
            root_radius
        );
        Self {
            root_radius,
            trunk: Branch::new(IVec3::splat(-root_radius), root_radius),
        }
    }

    /// Root half-extent in chunk widths
    pub fn root_radius(&self) -> i32 {
        self.root_radius
    }

    /// Whether `coord` lies in the indexed domain, `[-root_radius,
    /// root_radius)` per axis
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        let r = self.root_radius;
        coord.x >= -r && coord.x < r && coord.y >= -r && coord.y < r && coord.z >= -r && coord.z < r
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<&TerrainChunk> {
        if !self.contains(coord) {
            return None;
        }
        let mut node = &self.trunk;
        loop {
            let slot = node.child_slot(coord);
            match &node.kind {
                NodeKind::Branch(children) => node = children[slot].as_deref()?,
                NodeKind::Leaf(slots) => return slots[slot].as_ref(),
            }
        }
    }

    pub fn get_mut(&mut self, coord: ChunkCoord) -> Option<&mut TerrainChunk> {
        if !self.contains(coord) {
            return None;
        }
        let mut node = &mut self.trunk;
        loop {
            let slot = node.child_slot(coord);
            match &mut node.kind {
                NodeKind::Branch(children) => node = children[slot].as_deref_mut()?,
                NodeKind::Leaf(slots) => return slots[slot].as_mut(),
            }
        }
    }

    /// Store a chunk, allocating the branch path on the way down.
    ///
    /// Returns false (and drops the chunk) when `coord` lies outside the
    /// indexed domain.
    pub fn insert(&mut self, coord: ChunkCoord, chunk: TerrainChunk) -> bool {
        if !self.contains(coord) {
            log::debug!("insert at {coord:?} outside index domain");
            return false;
        }
        let mut node = &mut self.trunk;
        loop {
            let slot = node.child_slot(coord);
            let child_origin = node.child_origin(slot);
            let half = node.nodes_per_child / 2;
            match &mut node.kind {
                NodeKind::Branch(children) => {
                    node = children[slot]
                        .get_or_insert_with(|| Box::new(Branch::new(child_origin, half)))
                        .as_mut();
                }
                NodeKind::Leaf(slots) => {
                    slots[slot] = Some(chunk);
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(chunk_size: u32, radius: f32) -> TerrainSettings {
        let mut settings = TerrainSettings {
            chunk_size,
            radius,
            noise_height_scale: 0.0,
            ..TerrainSettings::default()
        };
        settings.validate();
        settings
    }

    #[test]
    fn test_root_radius_rounds_up_to_power_of_two() {
        // ceil(24 / 16) = 2
        assert_eq!(ChunkIndex::new(&settings(16, 24.0)).root_radius(), 2);
        // ceil(40 / 16) = 3, rounded to 4
        assert_eq!(ChunkIndex::new(&settings(16, 40.0)).root_radius(), 4);
        // ceil(90 / 16) = 6, rounded to 8
        assert_eq!(ChunkIndex::new(&settings(16, 90.0)).root_radius(), 8);
    }

    #[test]
    fn test_deep_tree_keeps_coords_distinct() {
        let settings = settings(16, 90.0);
        let mut index = ChunkIndex::new(&settings);
        let a = ChunkCoord::new(5, 5, 5);
        let b = ChunkCoord::new(6, 5, 5);
        index.insert(a, TerrainChunk::new(a, 16, 5));
        assert!(index.get(b).is_none());
        index.insert(b, TerrainChunk::new(b, 16, 5));
        assert_eq!(index.get(a).map(|c| c.coord), Some(a));
        assert_eq!(index.get(b).map(|c| c.coord), Some(b));
    }

    #[test]
    fn test_contains_is_half_open() {
        let index = ChunkIndex::new(&settings(16, 24.0));
        assert_eq!(index.root_radius(), 2);
        assert!(index.contains(ChunkCoord::new(-2, -2, -2)));
        assert!(index.contains(ChunkCoord::new(1, 1, 1)));
        assert!(!index.contains(ChunkCoord::new(2, 0, 0)));
        assert!(!index.contains(ChunkCoord::new(0, -3, 0)));
    }

    #[test]
    fn test_insert_then_get_roundtrip() {
        let settings = settings(16, 40.0);
        let mut index = ChunkIndex::new(&settings);

        for coord in [
            ChunkCoord::new(0, 0, 0),
            ChunkCoord::new(-4, -4, -4),
            ChunkCoord::new(3, -2, 1),
        ] {
            assert!(index.get(coord).is_none());
            assert!(index.insert(coord, TerrainChunk::new(coord, 16, 5)));
            let found = index.get(coord).map(|c| c.coord);
            assert_eq!(found, Some(coord));
        }

        // never-set coordinate in range stays absent
        assert!(index.get(ChunkCoord::new(1, 1, 1)).is_none());
    }

    #[test]
    fn test_get_mut_mutates_in_place() {
        let settings = settings(16, 24.0);
        let mut index = ChunkIndex::new(&settings);
        let coord = ChunkCoord::new(1, 0, -1);
        index.insert(coord, TerrainChunk::new(coord, 16, 5));

        if let Some(chunk) = index.get_mut(coord) {
            chunk.generation = 7;
        }
        assert_eq!(index.get(coord).map(|c| c.generation), Some(7));
    }

    #[test]
    fn test_insert_outside_domain_is_rejected() {
        let settings = settings(16, 24.0);
        let mut index = ChunkIndex::new(&settings);
        let coord = ChunkCoord::new(10, 0, 0);
        assert!(!index.insert(coord, TerrainChunk::new(coord, 16, 5)));
        assert!(index.get(coord).is_none());
    }
}
