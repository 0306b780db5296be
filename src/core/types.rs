//! Core type aliases and re-exports

pub use glam::{IVec3, UVec3, Vec2, Vec3};

/// Standard Result type for the engine
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
