//! Terrain streaming settings and LOD tier configuration

use serde::{Deserialize, Serialize};

use crate::field::NoiseSettings;
use crate::mesh::TopologyMode;

/// Chunk edge lengths the meshing path supports
pub const VALID_CHUNK_SIZES: [u32; 4] = [16, 32, 48, 64];

/// Vertex strides available to LOD tiers, finest first
pub const VALID_VERTEX_STRIDES: [u32; 5] = [1, 2, 4, 8, 16];

/// One level-of-detail band: sample every `vertex_stride`-th lattice point
/// for chunks up to `max_view_dist` away.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LodTier {
    pub vertex_stride: u32,
    pub max_view_dist: f32,
}

/// What happens to a chunk's cached noise and meshes when it deactivates
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Keep everything; reactivation reuses cached data
    #[default]
    Retain,
    /// Drop noise and meshes of chunks deactivating beyond this distance
    BeyondDistance(f32),
}

/// Full streaming configuration.
///
/// [`TerrainSettings::validate`] clamps values into range rather than
/// rejecting them, logging each adjustment at debug level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TerrainSettings {
    /// Chunk edge length in world units, one of [`VALID_CHUNK_SIZES`]
    pub chunk_size: u32,
    /// Planet body radius in world units
    pub radius: f32,
    /// Noise displacement amplitude as a fraction of the radius
    pub noise_height_scale: f32,
    /// LOD bands, finest first; strides are forced onto
    /// [`VALID_VERTEX_STRIDES`] by index
    pub lod_tiers: Vec<LodTier>,
    pub topology: TopologyMode,
    /// Worker dispatches allowed per scheduler tick
    pub max_tasks_per_tick: usize,
    /// Viewer movement that triggers a chunk rescan
    pub update_move_threshold: f32,
    /// Only track chunks whose bounds can straddle the displaced surface
    pub surface_chunks_only: bool,
    pub eviction: EvictionPolicy,
    pub noise: NoiseSettings,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        let mut settings = Self {
            chunk_size: 32,
            radius: 24.0,
            noise_height_scale: 0.05,
            lod_tiers: Vec::new(),
            topology: TopologyMode::default(),
            max_tasks_per_tick: 2,
            update_move_threshold: 5.0,
            surface_chunks_only: false,
            eviction: EvictionPolicy::default(),
            noise: NoiseSettings::default(),
        };
        settings.validate();
        settings
    }
}

impl TerrainSettings {
    /// Clamp every field into its valid range
    pub fn validate(&mut self) {
        if !VALID_CHUNK_SIZES.contains(&self.chunk_size) {
            let snapped = VALID_CHUNK_SIZES
                .iter()
                .copied()
                .min_by_key(|&s| s.abs_diff(self.chunk_size))
                .unwrap_or(VALID_CHUNK_SIZES[0]);
            log::debug!("chunk_size {} snapped to {}", self.chunk_size, snapped);
            self.chunk_size = snapped;
        }

        if self.radius < 1.0 {
            log::debug!("radius {} clamped to 1", self.radius);
            self.radius = 1.0;
        }
        if self.noise_height_scale < 0.0 {
            log::debug!("noise_height_scale {} clamped to 0", self.noise_height_scale);
            self.noise_height_scale = 0.0;
        }
        if self.max_tasks_per_tick < 1 {
            log::debug!("max_tasks_per_tick raised to 1");
            self.max_tasks_per_tick = 1;
        }
        if self.update_move_threshold < 0.0 {
            self.update_move_threshold = 0.0;
        }

        if self.lod_tiers.len() != VALID_VERTEX_STRIDES.len() {
            log::debug!(
                "regenerating {} default LOD tiers (had {})",
                VALID_VERTEX_STRIDES.len(),
                self.lod_tiers.len()
            );
            self.lod_tiers = VALID_VERTEX_STRIDES
                .iter()
                .enumerate()
                .map(|(i, &stride)| LodTier {
                    vertex_stride: stride,
                    max_view_dist: (i as u32 * (self.chunk_size / 2) + self.chunk_size) as f32,
                })
                .collect();
        } else {
            for (i, tier) in self.lod_tiers.iter_mut().enumerate() {
                if tier.vertex_stride != VALID_VERTEX_STRIDES[i] {
                    log::debug!(
                        "tier {} stride {} snapped to {}",
                        i,
                        tier.vertex_stride,
                        VALID_VERTEX_STRIDES[i]
                    );
                    tier.vertex_stride = VALID_VERTEX_STRIDES[i];
                }
            }
            // distances must be a strictly increasing step function
            for i in 1..self.lod_tiers.len() {
                if self.lod_tiers[i].max_view_dist <= self.lod_tiers[i - 1].max_view_dist {
                    let bumped = self.lod_tiers[i - 1].max_view_dist + 1.0;
                    log::debug!(
                        "tier {} distance {} bumped to {}",
                        i,
                        self.lod_tiers[i].max_view_dist,
                        bumped
                    );
                    self.lod_tiers[i].max_view_dist = bumped;
                }
            }
        }

        self.noise.validate();
    }

    /// View distance of the coarsest tier; chunks beyond it are invisible
    pub fn coarsest_view_dist(&self) -> f32 {
        self.lod_tiers.last().map_or(0.0, |t| t.max_view_dist)
    }

    /// Select the finest tier whose view distance covers `sqr_dist`.
    ///
    /// Distances beyond every band fall into the coarsest tier; visibility
    /// is the caller's concern.
    pub fn select_tier(&self, sqr_dist: f32) -> usize {
        let mut tier = 0;
        for i in 0..self.lod_tiers.len().saturating_sub(1) {
            let max = self.lod_tiers[i].max_view_dist;
            if sqr_dist <= max * max {
                break;
            }
            tier += 1;
        }
        tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_snaps_chunk_size() {
        let mut settings = TerrainSettings {
            chunk_size: 20,
            ..TerrainSettings::default()
        };
        settings.validate();
        assert_eq!(settings.chunk_size, 16);

        settings.chunk_size = 60;
        settings.validate();
        assert_eq!(settings.chunk_size, 64);
    }

    #[test]
    fn test_validate_clamps_scalars() {
        let mut settings = TerrainSettings {
            radius: 0.0,
            noise_height_scale: -1.0,
            max_tasks_per_tick: 0,
            ..TerrainSettings::default()
        };
        settings.validate();
        assert_eq!(settings.radius, 1.0);
        assert_eq!(settings.noise_height_scale, 0.0);
        assert_eq!(settings.max_tasks_per_tick, 1);
    }

    #[test]
    fn test_default_tiers_follow_chunk_size() {
        let mut settings = TerrainSettings {
            chunk_size: 32,
            lod_tiers: Vec::new(),
            ..TerrainSettings::default()
        };
        settings.validate();
        assert_eq!(settings.lod_tiers.len(), VALID_VERTEX_STRIDES.len());
        assert_eq!(settings.lod_tiers[0].max_view_dist, 32.0);
        assert_eq!(settings.lod_tiers[1].max_view_dist, 48.0);
        assert_eq!(settings.lod_tiers[4].max_view_dist, 96.0);
        for (i, tier) in settings.lod_tiers.iter().enumerate() {
            assert_eq!(tier.vertex_stride, VALID_VERTEX_STRIDES[i]);
        }
    }

    #[test]
    fn test_validate_forces_monotonic_distances() {
        let mut settings = TerrainSettings::default();
        settings.lod_tiers[2].max_view_dist = settings.lod_tiers[1].max_view_dist;
        settings.validate();
        for i in 1..settings.lod_tiers.len() {
            assert!(
                settings.lod_tiers[i].max_view_dist > settings.lod_tiers[i - 1].max_view_dist
            );
        }
    }

    #[test]
    fn test_select_tier_is_monotonic_in_distance() {
        let settings = TerrainSettings::default();
        let mut last = 0;
        for d in 0..200 {
            let tier = settings.select_tier((d * d) as f32);
            assert!(tier >= last, "tier decreased at distance {d}");
            assert!(tier < settings.lod_tiers.len());
            last = tier;
        }
        assert_eq!(settings.select_tier(0.0), 0);
        assert_eq!(last, settings.lod_tiers.len() - 1);
    }
}
