pub mod config;
pub mod error;
pub mod world;

pub use config::TerrainConfig;
pub use error::{ConfigError, TerrainError, TerrainResult};
pub use world::{HeightQuery, TerrainWorld};
