//! Chunk lifecycle scheduler
//!
//! All chunk state lives on the controlling thread; workers only produce
//! noise lattices and meshes. One `tick` per frame scans chunks around the
//! viewer when it has moved far enough, walks the tracked set to request
//! noise and LOD meshes, dispatches a bounded number of worker tasks, and
//! commits at most one completed result.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::types::{IVec3, Result, UVec3, Vec3};
use crate::field::ScalarFieldSource;
use crate::mesh::{MeshData, generate_chunk_mesh, planet_surface};
use crate::streaming::chunk::{ChunkCoord, TerrainChunk};
use crate::streaming::config::{EvictionPolicy, TerrainSettings};
use crate::streaming::octree::ChunkIndex;
use crate::streaming::tasks::{TaskKind, TaskPayload, TaskQueue, TaskTag};

/// A chunk gained a renderable mesh (or switched tiers)
#[derive(Clone, Debug)]
pub struct MeshUpdate {
    pub coord: ChunkCoord,
    pub lod: usize,
    pub mesh: Arc<MeshData>,
}

/// Counters for tests and diagnostics
#[derive(Clone, Copy, Debug, Default)]
pub struct SchedulerStats {
    pub noise_tasks_scheduled: u64,
    pub mesh_tasks_scheduled: u64,
    pub stale_results_dropped: u64,
    pub failed_tasks: u64,
}

pub struct ChunkScheduler {
    settings: TerrainSettings,
    index: ChunkIndex,
    queue: TaskQueue,
    source: Arc<dyn ScalarFieldSource>,
    /// Chunks the last scan put in view range
    in_range: HashSet<ChunkCoord>,
    last_scan_pos: Option<Vec3>,
    stats: SchedulerStats,
}

impl ChunkScheduler {
    pub fn new(mut settings: TerrainSettings, source: Arc<dyn ScalarFieldSource>) -> Result<Self> {
        settings.validate();
        let index = ChunkIndex::new(&settings);
        Ok(Self {
            settings,
            index,
            queue: TaskQueue::new()?,
            source,
            in_range: HashSet::new(),
            last_scan_pos: None,
            stats: SchedulerStats::default(),
        })
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&TerrainChunk> {
        self.index.get(coord)
    }

    pub fn in_range_count(&self) -> usize {
        self.in_range.len()
    }

    /// Advance the streaming state for one frame
    pub fn tick(&mut self, viewer: Vec3) -> Vec<MeshUpdate> {
        let moved_enough = match self.last_scan_pos {
            None => true,
            Some(last) => {
                let threshold = self.settings.update_move_threshold;
                viewer.distance_squared(last) >= threshold * threshold
            }
        };
        if moved_enough {
            self.scan_around(viewer);
            self.last_scan_pos = Some(viewer);
        }

        let mut updates = Vec::new();
        self.update_tracked(viewer, &mut updates);

        self.queue.dispatch(self.settings.max_tasks_per_tick);
        if let Some((tag, result)) = self.queue.try_next_completed() {
            self.commit(tag, result, &mut updates);
        }

        updates
    }

    /// Track every octree chunk within the coarsest view distance of the
    /// viewer, creating chunks (and requesting their noise) on first sight.
    fn scan_around(&mut self, viewer: Vec3) {
        let chunk_size = self.settings.chunk_size as f32;
        let scan_radius = (self.settings.coarsest_view_dist() / chunk_size).ceil() as i32;
        let viewer_chunk = IVec3::new(
            (viewer.x / chunk_size).floor() as i32,
            (viewer.y / chunk_size).floor() as i32,
            (viewer.z / chunk_size).floor() as i32,
        );

        let mut fresh = 0;
        for z in viewer_chunk.z - scan_radius..=viewer_chunk.z + scan_radius {
            for y in viewer_chunk.y - scan_radius..=viewer_chunk.y + scan_radius {
                for x in viewer_chunk.x - scan_radius..=viewer_chunk.x + scan_radius {
                    let coord = ChunkCoord::new(x, y, z);
                    if !self.index.contains(coord) {
                        continue;
                    }
                    if self.settings.surface_chunks_only && !self.is_surface_chunk(coord) {
                        continue;
                    }
                    if self.index.get(coord).is_none() {
                        let chunk = TerrainChunk::new(
                            coord,
                            self.settings.chunk_size,
                            self.settings.lod_tiers.len(),
                        );
                        self.index.insert(coord, chunk);
                        self.request_noise(coord);
                        fresh += 1;
                    }
                    self.in_range.insert(coord);
                }
            }
        }
        log::trace!(
            "scan at {viewer:?}: {} tracked, {fresh} fresh",
            self.in_range.len()
        );
    }

    /// Whether the chunk's bounds can straddle the displaced surface
    fn is_surface_chunk(&self, coord: ChunkCoord) -> bool {
        let chunk_size = self.settings.chunk_size as f32;
        let center = coord.as_vec3() * chunk_size + Vec3::splat(chunk_size * 0.5);
        let surface = planet_surface(center, self.settings.radius);
        let band = 1.5 * self.settings.noise_height_scale * self.settings.radius
            + chunk_size * self.settings.radius;
        surface - band <= 0.0 && surface + band >= 0.0
    }

    /// Walk the tracked set: pick tiers for visible chunks and enqueue the
    /// work they are missing; deactivate chunks out of view range.
    fn update_tracked(&mut self, viewer: Vec3, updates: &mut Vec<MeshUpdate>) {
        let coarsest = self.settings.coarsest_view_dist();
        let tracked: Vec<ChunkCoord> = self.in_range.iter().copied().collect();

        for coord in tracked {
            let Some(chunk) = self.index.get_mut(coord) else {
                self.in_range.remove(&coord);
                continue;
            };
            let sqr_dist = chunk.bounds.sq_distance_to_point(viewer);

            if sqr_dist > coarsest * coarsest {
                chunk.deactivate();
                if let EvictionPolicy::BeyondDistance(dist) = self.settings.eviction {
                    if sqr_dist > dist * dist {
                        log::debug!("evicting chunk {coord:?}");
                        chunk.evict();
                    }
                }
                self.in_range.remove(&coord);
                continue;
            }

            let tier = self.settings.select_tier(sqr_dist);
            if let Some(mesh) = chunk.mesh_at(tier) {
                if chunk.active_lod != Some(tier) {
                    updates.push(MeshUpdate {
                        coord,
                        lod: tier,
                        mesh: Arc::clone(mesh),
                    });
                    chunk.active_lod = Some(tier);
                }
            } else if chunk.noise_ready() {
                if !chunk.lod_slots[tier].requested {
                    chunk.lod_slots[tier].requested = true;
                    self.request_mesh(coord, tier);
                }
            } else if !chunk.noise_requested {
                self.request_noise(coord);
            }
        }
    }

    fn request_noise(&mut self, coord: ChunkCoord) {
        let Some(chunk) = self.index.get_mut(coord) else {
            return;
        };
        chunk.noise_requested = true;

        let tag = TaskTag {
            coord,
            generation: chunk.generation,
            kind: TaskKind::Noise,
        };
        let bounds_min = chunk.bounds.min;
        let dims = UVec3::splat(self.settings.chunk_size + 1);
        let source = Arc::clone(&self.source);
        self.queue
            .submit(tag, move || Ok(TaskPayload::Noise(source.sample(bounds_min, dims))));
        self.stats.noise_tasks_scheduled += 1;
    }

    fn request_mesh(&mut self, coord: ChunkCoord, lod: usize) {
        let Some(chunk) = self.index.get(coord) else {
            return;
        };
        let Some(noise) = chunk.noise.as_ref().map(Arc::clone) else {
            return;
        };

        let tag = TaskTag {
            coord,
            generation: chunk.generation,
            kind: TaskKind::Mesh { lod },
        };
        let bounds_min = chunk.bounds.min;
        let radius = self.settings.radius;
        let height_scale = self.settings.noise_height_scale;
        let stride = self.settings.lod_tiers[lod].vertex_stride;
        let mode = self.settings.topology;
        self.queue.submit(tag, move || {
            Ok(TaskPayload::Mesh(generate_chunk_mesh(
                &noise,
                bounds_min,
                radius,
                height_scale,
                stride,
                lod,
                mode,
            )))
        });
        self.stats.mesh_tasks_scheduled += 1;
    }

    /// Apply one worker result on the controlling thread. Results from a
    /// previous activation cycle are dropped; failures roll the request flag
    /// back so the work can be retried.
    fn commit(&mut self, tag: TaskTag, result: Result<TaskPayload>, updates: &mut Vec<MeshUpdate>) {
        let Some(chunk) = self.index.get_mut(tag.coord) else {
            log::debug!("dropping result for untracked chunk {:?}", tag.coord);
            self.stats.stale_results_dropped += 1;
            return;
        };
        if chunk.generation != tag.generation {
            log::debug!(
                "dropping stale result for {:?} (generation {} != {})",
                tag.coord,
                tag.generation,
                chunk.generation
            );
            self.stats.stale_results_dropped += 1;
            return;
        }

        match (tag.kind, result) {
            (TaskKind::Noise, Ok(TaskPayload::Noise(field))) => {
                chunk.noise = Some(Arc::new(field));
            }
            (TaskKind::Mesh { lod }, Ok(TaskPayload::Mesh(mesh))) => {
                let mesh = Arc::new(mesh);
                chunk.lod_slots[lod].mesh = Some(Arc::clone(&mesh));
                chunk.active_lod = Some(lod);
                updates.push(MeshUpdate {
                    coord: tag.coord,
                    lod,
                    mesh,
                });
            }
            (kind, Err(e)) => {
                log::error!("worker task {kind:?} for {:?} failed: {e}", tag.coord);
                self.stats.failed_tasks += 1;
                match kind {
                    TaskKind::Noise => chunk.noise_requested = false,
                    TaskKind::Mesh { lod } => chunk.lod_slots[lod].requested = false,
                }
            }
            (kind, Ok(payload)) => {
                // producer shape is fixed at submit time
                log::error!(
                    "mismatched payload {payload:?} for {kind:?} task at {:?}",
                    tag.coord
                );
                self.stats.failed_tasks += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{NoiseSettings, ScalarField};
    use std::time::Duration;

    /// Deterministic stand-in field source; the short sleep keeps results
    /// from landing inside the tick that scheduled them.
    struct StubSource;

    impl ScalarFieldSource for StubSource {
        fn sample(&self, _bounds_min: Vec3, dims: UVec3) -> ScalarField {
            std::thread::sleep(Duration::from_millis(5));
            ScalarField::new(dims)
        }
    }

    fn small_settings() -> TerrainSettings {
        TerrainSettings {
            chunk_size: 16,
            radius: 8.0,
            noise_height_scale: 0.0,
            max_tasks_per_tick: 8,
            update_move_threshold: 5.0,
            noise: NoiseSettings {
                num_octaves: 1,
                ..NoiseSettings::default()
            },
            ..TerrainSettings::default()
        }
    }

    fn settle(scheduler: &mut ChunkScheduler, viewer: Vec3, ticks: usize) -> Vec<MeshUpdate> {
        let mut updates = Vec::new();
        for _ in 0..ticks {
            updates.extend(scheduler.tick(viewer));
            std::thread::sleep(Duration::from_millis(2));
        }
        updates
    }

    #[test]
    fn test_tick_schedules_each_task_exactly_once() {
        let mut scheduler =
            ChunkScheduler::new(small_settings(), Arc::new(StubSource)).unwrap();

        let updates = settle(&mut scheduler, Vec3::ZERO, 400);

        let tracked = scheduler.in_range_count() as u64;
        assert!(tracked > 0);
        let stats = scheduler.stats();
        // one noise sample and one mesh (at the selected tier) per chunk
        assert_eq!(stats.noise_tasks_scheduled, tracked);
        assert_eq!(stats.mesh_tasks_scheduled, tracked);
        assert_eq!(stats.stale_results_dropped, 0);
        assert_eq!(stats.failed_tasks, 0);
        assert_eq!(updates.len() as u64, tracked);

        // a settled scheduler is idempotent
        settle(&mut scheduler, Vec3::ZERO, 10);
        let stats = scheduler.stats();
        assert_eq!(stats.noise_tasks_scheduled, tracked);
        assert_eq!(stats.mesh_tasks_scheduled, tracked);
    }

    #[test]
    fn test_scan_covers_positive_and_negative_faces() {
        // Domain [-4, 4) per axis; the default tiers give a scan radius of 3,
        // so chunks on the +3 faces must be tracked just like the -3 ones.
        let settings = TerrainSettings {
            radius: 40.0,
            ..small_settings()
        };
        let mut scheduler = ChunkScheduler::new(settings, Arc::new(StubSource)).unwrap();
        scheduler.tick(Vec3::ZERO);

        for r in [-3, 3] {
            for coord in [
                ChunkCoord::new(r, 0, 0),
                ChunkCoord::new(0, r, 0),
                ChunkCoord::new(0, 0, r),
            ] {
                assert!(scheduler.chunk(coord).is_some(), "chunk {coord:?} untracked");
            }
        }
        assert!(scheduler.chunk(ChunkCoord::new(4, 0, 0)).is_none());
    }

    #[test]
    fn test_closest_chunks_get_the_finest_tier() {
        let mut scheduler =
            ChunkScheduler::new(small_settings(), Arc::new(StubSource)).unwrap();
        let updates = settle(&mut scheduler, Vec3::ZERO, 400);

        let origin_update = updates
            .iter()
            .find(|u| u.coord == ChunkCoord::ZERO)
            .expect("origin chunk never meshed");
        assert_eq!(origin_update.lod, 0);
        assert_eq!(origin_update.mesh.lod, 0);
    }

    #[test]
    fn test_results_after_deactivation_are_dropped() {
        let mut scheduler =
            ChunkScheduler::new(small_settings(), Arc::new(StubSource)).unwrap();

        // schedule noise, then leave before any result lands
        scheduler.tick(Vec3::ZERO);
        assert!(scheduler.stats().noise_tasks_scheduled > 0);
        settle(&mut scheduler, Vec3::splat(5000.0), 400);

        let stats = scheduler.stats();
        assert!(stats.stale_results_dropped > 0);
        assert_eq!(scheduler.in_range_count(), 0);
    }

    #[test]
    fn test_eviction_beyond_distance_drops_cached_data() {
        let settings = TerrainSettings {
            eviction: EvictionPolicy::BeyondDistance(100.0),
            ..small_settings()
        };
        let mut scheduler = ChunkScheduler::new(settings, Arc::new(StubSource)).unwrap();

        // wait for the origin chunk's noise to arrive
        for _ in 0..400 {
            scheduler.tick(Vec3::ZERO);
            if scheduler
                .chunk(ChunkCoord::ZERO)
                .is_some_and(|c| c.noise_ready())
            {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(scheduler.chunk(ChunkCoord::ZERO).unwrap().noise_ready());

        scheduler.tick(Vec3::splat(5000.0));
        let chunk = scheduler.chunk(ChunkCoord::ZERO).unwrap();
        assert!(!chunk.noise_ready());
        assert!(chunk.mesh_at(0).is_none());
        assert!(chunk.generation > 0);
    }

    #[test]
    fn test_retain_policy_keeps_cached_data() {
        let mut scheduler =
            ChunkScheduler::new(small_settings(), Arc::new(StubSource)).unwrap();
        settle(&mut scheduler, Vec3::ZERO, 400);
        assert!(scheduler.chunk(ChunkCoord::ZERO).unwrap().noise_ready());

        scheduler.tick(Vec3::splat(5000.0));
        let chunk = scheduler.chunk(ChunkCoord::ZERO).unwrap();
        assert!(chunk.noise_ready());
        assert!(chunk.mesh_at(0).is_some());
    }

    #[test]
    fn test_no_rescan_below_move_threshold() {
        let mut scheduler =
            ChunkScheduler::new(small_settings(), Arc::new(StubSource)).unwrap();
        scheduler.tick(Vec3::ZERO);
        let scheduled = scheduler.stats().noise_tasks_scheduled;
        assert!(scheduled > 0);

        // tiny move: no rescan, no new chunks
        scheduler.tick(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(scheduler.stats().noise_tasks_scheduled, scheduled);
    }
}
