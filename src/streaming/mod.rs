//! Asynchronous chunk streaming and LOD management

pub mod chunk;
pub mod config;
pub mod octree;
pub mod scheduler;
pub mod tasks;

pub use chunk::{ChunkCoord, LodSlot, TerrainChunk};
pub use config::{
    EvictionPolicy, LodTier, TerrainSettings, VALID_CHUNK_SIZES, VALID_VERTEX_STRIDES,
};
pub use octree::ChunkIndex;
pub use scheduler::{ChunkScheduler, MeshUpdate, SchedulerStats};
pub use tasks::{TaskKind, TaskPayload, TaskQueue, TaskTag};
