//! TerrainWorld - builds the terrain in stages and advances it per tick

use ahash::HashMap;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use super::base_terrain::BaseTerrainGenerator;
use super::craters::{CraterRecord, CraterStamper};
use super::deformation::{ContactEvent, DeformationEngine};
use super::mesh::{MeshBuildQueue, MeshBuilder, TileMeshSet};
use super::persistence::WorldSnapshot;
use super::scatter::{FeatureScatterer, PlacementShortfall, RockId, RockInstance};
use super::spatial_index::SpatialIndex;
use super::tile::{ElevationTile, TileCoord};
use super::tile_store::{HeightQuery, TileStore, WorldExtent, sample_tiles};
use crate::config::{RockParams, TerrainConfig};
use crate::error::TerrainResult;

/// Immutable view of the elevation field as of one tick
///
/// Tiles are shared with the live store until the next write touches them.
#[derive(Debug, Clone)]
pub struct TerrainSnapshot {
    pub tick: u64,
    extent: WorldExtent,
    tiles: Vec<Arc<ElevationTile>>,
}

impl TerrainSnapshot {
    pub fn tile(&self, coord: TileCoord) -> Option<&ElevationTile> {
        if coord.x >= self.extent.tiles_x || coord.y >= self.extent.tiles_y {
            return None;
        }
        self.tiles
            .get(coord.y as usize * self.extent.tiles_x as usize + coord.x as usize)
            .map(|t| t.as_ref())
    }
}

impl HeightQuery for TerrainSnapshot {
    fn extent(&self) -> &WorldExtent {
        &self.extent
    }

    #[inline]
    fn sample(&self, gi: usize, gj: usize) -> f32 {
        sample_tiles(&self.tiles, &self.extent, gi, gj)
    }
}

/// Cloneable reader handle to the most recently published snapshot
#[derive(Debug, Clone)]
pub struct SnapshotHandle(Arc<RwLock<Arc<TerrainSnapshot>>>);

impl SnapshotHandle {
    pub fn latest(&self) -> Arc<TerrainSnapshot> {
        Arc::clone(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, snapshot: TerrainSnapshot) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }
}

/// Contacts pushed from other threads, applied in arrival order next tick
#[derive(Debug, Default)]
pub struct ContactQueue {
    pending: Mutex<Vec<ContactEvent>>,
}

impl ContactQueue {
    pub fn push(&self, event: ContactEvent) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drain(&self) -> Vec<ContactEvent> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub contacts_applied: usize,
    /// Applied contacts that landed in an existing patch
    pub contacts_merged: usize,
    /// Rejected contacts (invalid, off-world or deformation disabled)
    pub contacts_ignored: usize,
    pub patches_active: usize,
    pub patches_retired: usize,
    pub rebuilt_tiles: usize,
}

/// Ground-truth labels for perception datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    pub seed: u64,
    pub craters: Vec<CraterRecord>,
    /// Empty while rocks are hidden
    pub rocks: Vec<RockInstance>,
}

/// Re-randomized rock field, saved as placed
///
/// The scatter that produced it saw the terrain as it was at the time,
/// deformation included, so it cannot be replayed from the seed alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRocks {
    pub seed: u64,
    pub rocks: Vec<RockInstance>,
    pub shortfall: PlacementShortfall,
}

/// Rocks plus their index, as produced by one scatter pass
struct RockField {
    rocks: BTreeMap<RockId, RockInstance>,
    index: SpatialIndex<RockId>,
    shortfall: PlacementShortfall,
}

impl RockField {
    fn scatter(params: &RockParams, seed: u64, terrain: &TileStore) -> Self {
        let mut index = SpatialIndex::new((2.0 * params.max_radius).max(0.1));
        let result = FeatureScatterer::new(params.clone()).scatter(seed, terrain, &mut index);
        Self {
            rocks: result.rocks.into_iter().map(|r| (r.id, r)).collect(),
            index,
            shortfall: result.shortfall,
        }
    }

    fn from_saved(params: &RockParams, saved: SavedRocks) -> Self {
        let mut index = SpatialIndex::new((2.0 * params.max_radius).max(0.1));
        for rock in &saved.rocks {
            index.insert(rock.id, rock.footprint_center(), rock.footprint_radius);
        }
        Self {
            rocks: saved.rocks.into_iter().map(|r| (r.id, r)).collect(),
            index,
            shortfall: saved.shortfall,
        }
    }
}

/// A complete terrain: elevation, craters, rocks, deformation and meshes
pub struct TerrainWorld {
    seed: u64,
    config: TerrainConfig,
    store: TileStore,
    craters: Vec<CraterRecord>,
    rocks: RockField,
    /// Rock seed set by `randomize_rocks`
    rock_seed: Option<u64>,
    removed_rocks: BTreeSet<RockId>,
    rocks_visible: bool,
    deformation: DeformationEngine,
    mesh_builder: MeshBuilder,
    meshes: HashMap<TileCoord, TileMeshSet>,
    mesh_updates: BTreeSet<TileCoord>,
    initial_build: MeshBuildQueue,
    contacts: Arc<ContactQueue>,
    published: SnapshotHandle,
    tick: u64,
}

impl TerrainWorld {
    /// Validate `config` and run every build stage
    ///
    /// Stages run in a fixed order: tiles, base terrain, craters, rocks,
    /// then the initial mesh build (possibly spread over later ticks).
    pub fn build(seed: u64, config: TerrainConfig) -> TerrainResult<Self> {
        config.validate()?;
        let started = Instant::now();

        let mut store = TileStore::from_params(&config.world)?;
        let extent = *store.extent();
        log::info!(
            "[BUILD] '{}' seed {}: {}x{} tiles, {:.1} x {:.1} m at {} m",
            config.name,
            seed,
            extent.tiles_x,
            extent.tiles_y,
            extent.size().x,
            extent.size().y,
            extent.resolution
        );

        if config.base.enabled {
            BaseTerrainGenerator::new(seed, config.base.clone()).fill(&mut store);
        }
        let craters = if config.craters.enabled {
            CraterStamper::new(config.craters.clone()).stamp(seed, &mut store)
        } else {
            Vec::new()
        };
        let rocks = RockField::scatter(&config.rocks, seed, &store);

        store.take_dirty();
        let initial_build = MeshBuildQueue::new(store.tile_coords(), config.mesh.initial_tiles_per_tick);
        let published = SnapshotHandle(Arc::new(RwLock::new(Arc::new(TerrainSnapshot {
            tick: 0,
            extent,
            tiles: store.snapshot(),
        }))));

        let mut world = Self {
            seed,
            deformation: DeformationEngine::new(config.deformation.clone()),
            mesh_builder: MeshBuilder::new(config.mesh.lod_levels),
            config,
            store,
            craters,
            rocks,
            rock_seed: None,
            removed_rocks: BTreeSet::new(),
            rocks_visible: true,
            meshes: HashMap::default(),
            mesh_updates: BTreeSet::new(),
            initial_build,
            contacts: Arc::new(ContactQueue::default()),
            published,
            tick: 0,
        };
        let built = world.build_meshes(BTreeSet::new());

        log::info!(
            "[BUILD] Done in {:.1} ms: {} craters, {} rocks, {} meshes built, {} pending",
            started.elapsed().as_secs_f64() * 1000.0,
            world.craters.len(),
            world.rocks.rocks.len(),
            built,
            world.initial_build.remaining()
        );
        Ok(world)
    }

    /// Replace this world with a fresh build; on error nothing changes
    ///
    /// Contact queue and snapshot handles given out earlier stay connected.
    pub fn rebuild_world(&mut self, seed: u64, config: TerrainConfig) -> TerrainResult<()> {
        let fresh = Self::build(seed, config)?;
        let contacts = Arc::clone(&self.contacts);
        let published = self.published.clone();
        *self = Self {
            contacts,
            published,
            ..fresh
        };
        self.publish();
        Ok(())
    }

    /// Apply queued and given contacts, decay patches, rebuild meshes, publish
    pub fn tick(&mut self, events: &[ContactEvent]) -> TickReport {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        let queued = self.contacts.drain();
        for event in queued.iter().chain(events) {
            if !self.config.deformation.enabled {
                report.contacts_ignored += 1;
                continue;
            }
            match self.deformation.apply_contact(&mut self.store, event) {
                Ok(outcome) => {
                    report.contacts_applied += 1;
                    if !outcome.created {
                        report.contacts_merged += 1;
                    }
                }
                Err(err) => {
                    log::warn!("[DEFORM] Tick {}: ignoring contact: {err}", self.tick);
                    report.contacts_ignored += 1;
                }
            }
        }

        report.patches_retired = self.deformation.decay().len();
        report.patches_active = self.deformation.active_count();

        let dirty: BTreeSet<TileCoord> = self.store.take_dirty().into_iter().collect();
        report.rebuilt_tiles = self.build_meshes(dirty);
        self.publish();

        if report.contacts_applied + report.contacts_ignored > 0 || report.patches_retired > 0 {
            log::debug!(
                "[DEFORM] Tick {}: {} applied ({} merged), {} ignored, {} active, {} retired, {} tiles rebuilt",
                report.tick,
                report.contacts_applied,
                report.contacts_merged,
                report.contacts_ignored,
                report.patches_active,
                report.patches_retired,
                report.rebuilt_tiles
            );
        }
        report
    }

    /// Rebuild `dirty` plus the next slice of the initial build; returns tiles built
    fn build_meshes(&mut self, mut coords: BTreeSet<TileCoord>) -> usize {
        coords.extend(self.initial_build.next_batch());
        if coords.is_empty() {
            return 0;
        }
        let coords: Vec<TileCoord> = coords.into_iter().collect();
        let built = self.mesh_builder.rebuild(&self.store, &coords);
        let count = built.len();
        for mesh in built {
            self.mesh_updates.insert(mesh.coord);
            self.meshes.insert(mesh.coord, mesh);
        }
        count
    }

    fn publish(&mut self) {
        self.published.publish(TerrainSnapshot {
            tick: self.tick,
            extent: *self.store.extent(),
            tiles: self.store.snapshot(),
        });
    }

    // Accessors

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    /// Latest published snapshot
    pub fn published(&self) -> Arc<TerrainSnapshot> {
        self.published.latest()
    }

    /// Handle for readers on other threads
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.published.clone()
    }

    /// Queue for contacts produced on other threads
    pub fn contact_queue(&self) -> Arc<ContactQueue> {
        Arc::clone(&self.contacts)
    }

    pub fn deformation(&self) -> &DeformationEngine {
        &self.deformation
    }

    pub fn freshness_at(&self, p: Vec2) -> f32 {
        self.deformation.freshness_at(&self.store, p)
    }

    // Meshes

    pub fn mesh(&self, coord: TileCoord) -> Option<&TileMeshSet> {
        self.meshes.get(&coord)
    }

    /// Tiles whose meshes changed since the last call (sorted)
    pub fn take_mesh_updates(&mut self) -> Vec<TileCoord> {
        std::mem::take(&mut self.mesh_updates).into_iter().collect()
    }

    /// Tiles still waiting for their first mesh
    pub fn pending_initial_meshes(&self) -> usize {
        self.initial_build.remaining()
    }

    // Craters and rocks

    pub fn craters(&self) -> &[CraterRecord] {
        &self.craters
    }

    /// Placed rocks in id order (removed rocks excluded)
    pub fn rocks(&self) -> impl Iterator<Item = &RockInstance> {
        self.rocks.rocks.values()
    }

    pub fn rock(&self, id: RockId) -> Option<&RockInstance> {
        self.rocks.rocks.get(&id)
    }

    pub fn rock_count(&self) -> usize {
        self.rocks.rocks.len()
    }

    /// Rocks whose footprint intersects the disk at `center`
    pub fn rocks_near(&self, center: Vec2, radius: f32) -> Vec<&RockInstance> {
        self.rocks
            .index
            .query_overlapping(center, radius)
            .into_iter()
            .filter_map(|id| self.rocks.rocks.get(&id))
            .collect()
    }

    pub fn rock_shortfall(&self) -> &PlacementShortfall {
        &self.rocks.shortfall
    }

    /// Remove one rock from the world and its index
    pub fn remove_rock(&mut self, id: RockId) -> Option<RockInstance> {
        let rock = self.rocks.rocks.remove(&id)?;
        self.rocks.index.remove(id);
        self.removed_rocks.insert(id);
        log::debug!("[SCATTER] Removed rock {}", id.0);
        Some(rock)
    }

    pub fn removed_rocks(&self) -> impl Iterator<Item = &RockId> {
        self.removed_rocks.iter()
    }

    /// Rock seed override, if rocks were re-randomized
    pub fn rock_seed(&self) -> Option<u64> {
        self.rock_seed
    }

    /// Current rock field when it no longer follows from the world seed
    pub fn saved_rocks(&self) -> Option<SavedRocks> {
        self.rock_seed.map(|seed| SavedRocks {
            seed,
            rocks: self.rocks().cloned().collect(),
            shortfall: self.rocks.shortfall.clone(),
        })
    }

    /// Scatter a new rock field with its own seed on the current terrain
    ///
    /// Craters and elevation stay as they are.
    pub fn randomize_rocks(&mut self, rock_seed: u64) {
        self.rocks = RockField::scatter(&self.config.rocks, rock_seed, &self.store);
        self.rock_seed = Some(rock_seed);
        self.removed_rocks.clear();
        log::info!(
            "[SCATTER] Re-randomized rocks with seed {rock_seed}: {} rocks",
            self.rocks.rocks.len()
        );
    }

    pub fn set_rocks_visible(&mut self, visible: bool) {
        self.rocks_visible = visible;
    }

    pub fn rocks_visible(&self) -> bool {
        self.rocks_visible
    }

    pub fn annotations(&self) -> Annotations {
        Annotations {
            seed: self.seed,
            craters: self.craters.clone(),
            rocks: if self.rocks_visible {
                self.rocks().cloned().collect()
            } else {
                Vec::new()
            },
        }
    }

    /// Reapply saved runtime state on top of a freshly built world
    pub(super) fn restore_runtime(&mut self, snapshot: &WorldSnapshot) -> TerrainResult<()> {
        self.deformation
            .restore(&mut self.store, snapshot.deformation.clone())?;
        if let Some(saved) = &snapshot.rocks {
            self.rock_seed = Some(saved.seed);
            self.rocks = RockField::from_saved(&self.config.rocks, saved.clone());
        }
        for id in &snapshot.removed_rocks {
            self.rocks.rocks.remove(id);
            self.rocks.index.remove(*id);
            self.removed_rocks.insert(*id);
        }
        self.rocks_visible = snapshot.rocks_visible;
        self.tick = snapshot.tick;
        let dirty: BTreeSet<TileCoord> = self.store.take_dirty().into_iter().collect();
        self.build_meshes(dirty);
        self.publish();
        Ok(())
    }
}

impl HeightQuery for TerrainWorld {
    fn extent(&self) -> &WorldExtent {
        self.store.extent()
    }

    #[inline]
    fn sample(&self, gi: usize, gj: usize) -> f32 {
        self.store.sample(gi, gj)
    }
}
