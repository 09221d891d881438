//! Error taxonomy for terrain building and runtime queries
//!
//! Build-time problems are [`ConfigError`]s and abort world construction.
//! Runtime problems are [`TerrainError`] variants returned per call; the
//! orchestrator logs and skips them so a simulation tick never aborts.

use thiserror::Error;

use crate::world::Bounds;

/// Configuration rejected at build time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero (got {value})")]
    NonPositive { field: &'static str, value: f32 },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f32 },

    #[error(
        "world {axis} extent {extent} m is not a whole number of tiles \
         ({tile_samples} samples x {resolution} m = {tile_span} m per tile)"
    )]
    ResolutionMismatch {
        axis: &'static str,
        extent: f32,
        resolution: f32,
        tile_samples: u32,
        tile_span: f32,
    },

    #[error("{field} slope limit {value} deg is outside [0, 90)")]
    SlopeLimit { field: &'static str, value: f32 },

    #[error("{field}: minimum {min} is greater than maximum {max}")]
    InvertedRange {
        field: &'static str,
        min: f32,
        max: f32,
    },

    #[error("{field} must lie in [{lo}, {hi}] (got {value})")]
    OutOfRange {
        field: &'static str,
        value: f32,
        lo: f32,
        hi: f32,
    },

    #[error(
        "tile_samples {tile_samples} must be divisible by {divisor} to build {levels} LOD levels"
    )]
    LodMismatch {
        tile_samples: u32,
        levels: u8,
        divisor: u32,
    },

    #[error("rock archetype list is empty or has no positive weight")]
    NoArchetypes,

    #[error("density map is malformed: {0}")]
    DensityMap(String),
}

/// Errors reported by terrain queries and mutations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TerrainError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("point ({x}, {y}) lies outside the world extent")]
    OutOfBounds { x: f32, y: f32 },

    #[error("contact footprint {bounds:?} does not touch any terrain tile")]
    DeformationOnInvalidTile { bounds: Bounds },

    #[error("invalid contact event: {0}")]
    InvalidContact(String),
}

pub type TerrainResult<T> = Result<T, TerrainError>;
