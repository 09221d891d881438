//! Terrain world - tiles, craters, rocks, meshes and deformation

pub mod base_terrain;
mod bounds;
pub mod craters;
pub mod deformation;
pub mod density;
pub mod mesh;
pub mod persistence;
pub mod rng;
pub mod scatter;
pub mod spatial_index;
mod tile;
pub mod tile_store;
#[allow(clippy::module_inception)]
mod world;

pub use base_terrain::BaseTerrainGenerator;
pub use bounds::Bounds;
pub use craters::{CraterId, CraterProfile, CraterRecord, CraterStamper};
pub use deformation::{
    ContactEvent, ContactOutcome, DeformationEngine, DeformationPatch, DeformationState,
    Footprint, PatchId, PatchState,
};
pub use density::DensityMap;
pub use mesh::{MeshBuildQueue, MeshBuilder, MeshLevel, MeshVertex, TileMeshSet};
pub use persistence::{WorldSnapshot, export_annotations};
pub use rng::{TerrainRng, derive_seed, stage_rng};
pub use scatter::{FeatureScatterer, PlacementShortfall, RockId, RockInstance, ScatterResult};
pub use spatial_index::{IndexEntry, SpatialIndex};
pub use tile::{DirtyRect, ElevationTile, TileCoord};
pub use tile_store::{DeltaField, HeightGrid, HeightQuery, SampleWindow, TileStore, WorldExtent};
pub use world::{
    Annotations, ContactQueue, SavedRocks, SnapshotHandle, TerrainSnapshot, TerrainWorld,
    TickReport,
};
