//! Deformation engine - wheel contacts sink the terrain and leave decaying patches
//!
//! A contact becomes a grid-aligned sink field: full depth inside the
//! footprint, eased to zero over a smoothstep edge. Contacts that overlap a
//! recent patch merge into it by per-sample maximum, so repeated or
//! overlapping contacts in a tick never double count depth. Only the
//! increment over what is already baked is applied to the tile store.
//!
//! Patch freshness decays every tick. Retiring a patch stops tracking it but
//! leaves the sunk material in place.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::Bounds;
use super::tile::TileCoord;
use super::tile_store::{DeltaField, HeightQuery, SampleWindow, TileStore};
use crate::config::DeformationParams;
use crate::error::{TerrainError, TerrainResult};

/// Ground-projected contact area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Footprint {
    Disk { center: Vec2, radius: f32 },
    /// Simple polygon, either winding
    Polygon { vertices: Vec<Vec2> },
}

impl Footprint {
    pub fn disk(center: Vec2, radius: f32) -> Self {
        Footprint::Disk { center, radius }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            Footprint::Disk { center, radius } => Some(Bounds::from_circle(*center, *radius)),
            Footprint::Polygon { vertices } => Bounds::from_points(vertices),
        }
    }

    pub fn center(&self) -> Vec2 {
        match self {
            Footprint::Disk { center, .. } => *center,
            Footprint::Polygon { vertices } => {
                vertices.iter().copied().sum::<Vec2>() / vertices.len().max(1) as f32
            }
        }
    }

    /// Characteristic half-size used to scale the soft edge
    fn half_size(&self) -> f32 {
        match self {
            Footprint::Disk { radius, .. } => *radius,
            Footprint::Polygon { .. } => self
                .bounds()
                .map_or(0.0, |b| 0.5 * b.width().min(b.height())),
        }
    }

    fn validate(&self) -> TerrainResult<()> {
        match self {
            Footprint::Disk { center, radius } => {
                if !center.is_finite() || !radius.is_finite() || *radius <= 0.0 {
                    return Err(TerrainError::InvalidContact(format!(
                        "disk footprint at {center} with radius {radius}"
                    )));
                }
            }
            Footprint::Polygon { vertices } => {
                if vertices.len() < 3 || vertices.iter().any(|v| !v.is_finite()) {
                    return Err(TerrainError::InvalidContact(format!(
                        "polygon footprint needs at least 3 finite vertices (got {})",
                        vertices.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Distance from `p` to the footprint edge, positive inside
    pub fn inset_distance(&self, p: Vec2) -> f32 {
        match self {
            Footprint::Disk { center, radius } => radius - p.distance(*center),
            Footprint::Polygon { vertices } => {
                let mut inside = false;
                let mut edge = f32::INFINITY;
                for i in 0..vertices.len() {
                    let a = vertices[i];
                    let b = vertices[(i + 1) % vertices.len()];
                    if (a.y > p.y) != (b.y > p.y) {
                        let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
                        if p.x < x {
                            inside = !inside;
                        }
                    }
                    let ab = b - a;
                    let t = ((p - a).dot(ab) / ab.length_squared().max(f32::EPSILON)).clamp(0.0, 1.0);
                    edge = edge.min(p.distance(a + ab * t));
                }
                if inside { edge } else { -edge }
            }
        }
    }
}

/// A contact reported by the physics collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactEvent {
    pub footprint: Footprint,
    /// Requested sink in meters
    pub depth_hint: f32,
    /// Simulation time in seconds
    pub timestamp: f64,
}

impl ContactEvent {
    pub fn disk(center: Vec2, radius: f32, depth_hint: f32, timestamp: f64) -> Self {
        Self {
            footprint: Footprint::disk(center, radius),
            depth_hint,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatchId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchState {
    Active,
    Merged { into: PatchId },
    Retired,
}

/// Tracked impression left by one or more contacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeformationPatch {
    pub id: PatchId,
    pub bounds: Bounds,
    /// Per-sample sink in meters (positive = lowered)
    pub sink: DeltaField,
    /// Freshness, starts at the peak sink and decays per tick
    pub magnitude: f32,
    pub created: f64,
    pub last_timestamp: f64,
    pub decay_rate: f32,
    pub state: PatchState,
}

impl DeformationPatch {
    pub fn peak_sink(&self) -> f32 {
        self.sink.values().iter().copied().fold(0.0, f32::max)
    }
}

/// What a single contact did
#[derive(Debug, Clone, PartialEq)]
pub struct ContactOutcome {
    /// Patch that now holds this contact
    pub patch: PatchId,
    /// Whether that patch was created by this contact
    pub created: bool,
    /// Patches absorbed into `patch`
    pub absorbed: Vec<PatchId>,
    /// Largest additional sink applied to any sample
    pub applied_depth: f32,
    pub changed_tiles: Vec<TileCoord>,
}

/// Deformation history of one global sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub gi: u32,
    pub gj: u32,
    /// Total sink applied
    pub sink: f32,
    /// Elevation after the most recent sink, written back as-is on restore
    pub elevation: f32,
}

/// Serializable engine state for world snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeformationState {
    pub patches: Vec<DeformationPatch>,
    pub ledger: Vec<LedgerEntry>,
    pub next_id: u64,
}

const TRANSITION_HISTORY: usize = 1024;

pub struct DeformationEngine {
    params: DeformationParams,
    active: BTreeMap<PatchId, DeformationPatch>,
    /// Recent Merged/Retired transitions for state lookups
    transitions: VecDeque<(PatchId, PatchState)>,
    /// Total sink ever applied and resulting elevation, by global sample
    ledger: BTreeMap<(u32, u32), LedgerEntry>,
    next_id: u64,
}

fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

impl DeformationEngine {
    pub fn new(params: DeformationParams) -> Self {
        Self {
            params,
            active: BTreeMap::new(),
            transitions: VecDeque::new(),
            ledger: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn params(&self) -> &DeformationParams {
        &self.params
    }

    pub fn active_patches(&self) -> impl Iterator<Item = &DeformationPatch> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn patch(&self, id: PatchId) -> Option<&DeformationPatch> {
        self.active.get(&id)
    }

    /// Lifecycle state of a patch (None for ids never issued)
    pub fn patch_state(&self, id: PatchId) -> Option<PatchState> {
        if self.active.contains_key(&id) {
            return Some(PatchState::Active);
        }
        if let Some((_, state)) = self.transitions.iter().rev().find(|(pid, _)| *pid == id) {
            return Some(*state);
        }
        // Older than the transition history
        (id.0 < self.next_id).then_some(PatchState::Retired)
    }

    fn record_transition(&mut self, id: PatchId, state: PatchState) {
        if self.transitions.len() == TRANSITION_HISTORY {
            self.transitions.pop_front();
        }
        self.transitions.push_back((id, state));
    }

    /// Bekker-style sinkage for a normal load spread over `area` m²
    pub fn depth_from_load(&self, load: f32, area: f32) -> f32 {
        if !(load > 0.0 && area > 0.0) {
            return 0.0;
        }
        let pressure = load / area;
        (pressure / self.params.soil_stiffness)
            .powf(1.0 / self.params.sinkage_exponent)
            .min(self.params.max_depth_per_contact)
    }

    fn sink_field(&self, store: &TileStore, footprint: &Footprint, window: SampleWindow, depth: f32) -> DeltaField {
        let edge = self.params.edge_fraction * footprint.half_size();
        DeltaField::from_fn(store.extent(), window, |p| {
            let d = footprint.inset_distance(p);
            if d <= 0.0 {
                0.0
            } else if edge <= 0.0 {
                depth
            } else {
                depth * smoothstep(d / edge)
            }
        })
    }

    /// Sink the terrain under a contact and record or merge its patch
    pub fn apply_contact(&mut self, store: &mut TileStore, event: &ContactEvent) -> TerrainResult<ContactOutcome> {
        event.footprint.validate()?;
        if !event.timestamp.is_finite() || !event.depth_hint.is_finite() || event.depth_hint < 0.0 {
            return Err(TerrainError::InvalidContact(format!(
                "depth {} at t={} must be finite and non-negative",
                event.depth_hint, event.timestamp
            )));
        }
        let bounds = event
            .footprint
            .bounds()
            .ok_or_else(|| TerrainError::InvalidContact("empty footprint".to_string()))?;
        let extent = *store.extent();
        let window = match extent.window(&bounds) {
            Some(window) if !store.tiles_in_bounds(&bounds).is_empty() => window,
            _ => return Err(TerrainError::DeformationOnInvalidTile { bounds }),
        };

        let depth = (event.depth_hint * self.params.sink_scale).min(self.params.max_depth_per_contact);
        let fresh = self.sink_field(store, &event.footprint, window, depth);

        // Recent overlapping patches merge into the oldest of them
        let candidates: Vec<PatchId> = self
            .active
            .values()
            .filter(|p| {
                p.bounds.intersects(&bounds)
                    && (event.timestamp - p.last_timestamp).abs() <= self.params.merge_window
            })
            .map(|p| p.id)
            .collect();
        let absorbed: Vec<PatchId> = candidates.iter().skip(1).copied().collect();
        let members: Vec<DeformationPatch> = candidates
            .iter()
            .filter_map(|id| self.active.remove(id))
            .collect();

        let mut merged_window = window;
        for m in &members {
            merged_window = merged_window.union(&m.sink.window);
        }

        // Sink already baked by members, summed since they were applied independently
        let mut combined = DeltaField::zeros(merged_window);
        let mut increment = DeltaField::zeros(merged_window);
        let mut applied_depth = 0.0f32;
        for gj in merged_window.j0..=merged_window.j1 {
            for gi in merged_window.i0..=merged_window.i1 {
                let baked: f32 = members.iter().map(|m| m.sink.get(gi, gj)).sum();
                let new = fresh.get(gi, gj);
                combined.set(gi, gj, baked.max(new));
                let extra = (new - baked).max(0.0);
                if extra > 0.0 {
                    increment.set(gi, gj, -extra);
                    applied_depth = applied_depth.max(extra);
                }
            }
        }

        let changed_tiles = store.apply_delta(&increment)?;
        for gj in merged_window.j0..=merged_window.j1 {
            for gi in merged_window.i0..=merged_window.i1 {
                let extra = -increment.get(gi, gj);
                if extra > 0.0 {
                    let (gi32, gj32) = (gi as u32, gj as u32);
                    let entry = self.ledger.entry((gi32, gj32)).or_insert(LedgerEntry {
                        gi: gi32,
                        gj: gj32,
                        sink: 0.0,
                        elevation: 0.0,
                    });
                    entry.sink += extra;
                    entry.elevation = store.sample(gi, gj);
                }
            }
        }

        let (id, created) = match candidates.first() {
            Some(id) => (*id, false),
            None => {
                let id = PatchId(self.next_id);
                self.next_id += 1;
                (id, true)
            }
        };
        let patch = DeformationPatch {
            id,
            bounds: members.iter().fold(bounds, |b, m| b.union(&m.bounds)),
            sink: combined,
            magnitude: members.iter().map(|m| m.magnitude).fold(depth, f32::max),
            created: members
                .iter()
                .map(|m| m.created)
                .fold(event.timestamp, f64::min),
            last_timestamp: members
                .iter()
                .map(|m| m.last_timestamp)
                .fold(event.timestamp, f64::max),
            decay_rate: self.params.decay_rate,
            state: PatchState::Active,
        };
        self.active.insert(id, patch);
        for other in &absorbed {
            self.record_transition(*other, PatchState::Merged { into: id });
        }

        log::debug!(
            "[DEFORM] Contact at ({:.2}, {:.2}) depth {:.3} -> patch {} ({} absorbed, {} tiles)",
            event.footprint.center().x,
            event.footprint.center().y,
            applied_depth,
            id.0,
            absorbed.len(),
            changed_tiles.len()
        );

        Ok(ContactOutcome {
            patch: id,
            created,
            absorbed,
            applied_depth,
            changed_tiles,
        })
    }

    /// Attenuate every patch's freshness; returns the patches retired this call
    pub fn decay(&mut self) -> Vec<PatchId> {
        let threshold = self.params.negligible_magnitude;
        let mut retired = Vec::new();
        for patch in self.active.values_mut() {
            patch.magnitude *= 1.0 - patch.decay_rate;
            if patch.magnitude < threshold {
                retired.push(patch.id);
            }
        }
        for id in &retired {
            self.active.remove(id);
            self.record_transition(*id, PatchState::Retired);
        }
        retired
    }

    /// Freshness of the impression at `p` (0 when untouched or fully relaxed)
    pub fn freshness_at(&self, store: &TileStore, p: Vec2) -> f32 {
        let extent = store.extent();
        let gi = (p.x / extent.resolution).round().max(0.0) as usize;
        let gj = (p.y / extent.resolution).round().max(0.0) as usize;
        self.active
            .values()
            .filter(|patch| patch.bounds.contains(p))
            .map(|patch| {
                let peak = patch.peak_sink();
                if peak > 0.0 {
                    patch.magnitude * patch.sink.get(gi, gj) / peak
                } else {
                    0.0
                }
            })
            .fold(0.0, f32::max)
    }

    /// Total sink applied so far at a global sample
    pub fn cumulative_sink(&self, gi: usize, gj: usize) -> f32 {
        self.ledger
            .get(&(gi as u32, gj as u32))
            .map_or(0.0, |e| e.sink)
    }

    pub fn export_state(&self) -> DeformationState {
        DeformationState {
            patches: self.active.values().cloned().collect(),
            ledger: self.ledger.values().copied().collect(),
            next_id: self.next_id,
        }
    }

    /// Write a saved ledger's elevations onto freshly generated terrain and restore patches
    ///
    /// Deformed samples get their recorded elevation back bit for bit, so
    /// the result does not depend on how many contacts produced it.
    pub fn restore(&mut self, store: &mut TileStore, state: DeformationState) -> TerrainResult<Vec<TileCoord>> {
        let extent = *store.extent();
        let mut changed = Vec::new();
        if let (Some(i1), Some(j1)) = (
            state.ledger.iter().map(|e| e.gi as usize).max(),
            state.ledger.iter().map(|e| e.gj as usize).max(),
        ) {
            if i1 >= extent.samples_x() || j1 >= extent.samples_y() {
                let p = extent.sample_position(i1, j1);
                return Err(TerrainError::OutOfBounds { x: p.x, y: p.y });
            }
            let window = SampleWindow {
                i0: state.ledger.iter().map(|e| e.gi as usize).min().unwrap_or(0),
                j0: state.ledger.iter().map(|e| e.gj as usize).min().unwrap_or(0),
                i1,
                j1,
            };
            let saved: BTreeMap<(u32, u32), f32> = state
                .ledger
                .iter()
                .map(|e| ((e.gi, e.gj), e.elevation))
                .collect();
            changed = store.update_samples(window, |gi, gj, old| {
                saved.get(&(gi as u32, gj as u32)).copied().unwrap_or(old)
            });
        }

        self.ledger = state.ledger.iter().map(|e| ((e.gi, e.gj), *e)).collect();
        self.active = state.patches.into_iter().map(|p| (p.id, p)).collect();
        self.next_id = state.next_id;
        self.transitions.clear();
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldParams;

    fn flat_store() -> TileStore {
        TileStore::from_params(&WorldParams {
            size_x: 10.0,
            size_y: 10.0,
            resolution: 0.05,
            tile_samples: 40,
        })
        .unwrap()
    }

    fn engine() -> DeformationEngine {
        DeformationEngine::new(DeformationParams::default())
    }

    #[test]
    fn test_contact_sinks_center() {
        let mut store = flat_store();
        let mut engine = engine();
        let center = Vec2::new(5.0, 5.0);
        let outcome = engine
            .apply_contact(&mut store, &ContactEvent::disk(center, 0.15, 0.05, 0.0))
            .unwrap();

        assert!(outcome.created);
        assert!((store.get_elevation(center).unwrap() + 0.05).abs() < 1e-4);
        // Confined to the footprint
        assert_eq!(store.get_elevation(Vec2::new(5.3, 5.0)).unwrap(), 0.0);
        assert!((engine.cumulative_sink(100, 100) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_overlapping_contacts_merge_without_double_count() {
        let mut store = flat_store();
        let mut engine = engine();
        let a = engine
            .apply_contact(&mut store, &ContactEvent::disk(Vec2::new(5.0, 5.0), 0.15, 0.05, 0.0))
            .unwrap();
        let b = engine
            .apply_contact(&mut store, &ContactEvent::disk(Vec2::new(5.05, 5.05), 0.15, 0.05, 0.0))
            .unwrap();

        assert_eq!(a.patch, b.patch);
        assert!(!b.created);
        assert_eq!(engine.active_count(), 1);

        // The overlap is no deeper than a single contact
        let mid = Vec2::new(5.025, 5.025);
        assert!(store.get_elevation(mid).unwrap() >= -0.05 - 1e-5);
        assert!(store.get_elevation(Vec2::new(5.05, 5.05)).unwrap() < -0.04);
    }

    #[test]
    fn test_distant_in_time_contacts_stay_separate() {
        let mut store = flat_store();
        let mut engine = engine();
        let c = Vec2::new(5.0, 5.0);
        let a = engine.apply_contact(&mut store, &ContactEvent::disk(c, 0.15, 0.05, 0.0)).unwrap();
        let b = engine.apply_contact(&mut store, &ContactEvent::disk(c, 0.15, 0.05, 10.0)).unwrap();
        assert_ne!(a.patch, b.patch);
        // A second pass later deepens the rut
        assert!((store.get_elevation(c).unwrap() + 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_merge_absorbs_multiple_patches() {
        let mut store = flat_store();
        let mut engine = engine();
        let a = engine
            .apply_contact(&mut store, &ContactEvent::disk(Vec2::new(4.8, 5.0), 0.1, 0.02, 0.0))
            .unwrap();
        let b = engine
            .apply_contact(&mut store, &ContactEvent::disk(Vec2::new(5.2, 5.0), 0.1, 0.02, 0.0))
            .unwrap();
        assert_ne!(a.patch, b.patch);

        // A wide contact bridges both
        let c = engine
            .apply_contact(&mut store, &ContactEvent::disk(Vec2::new(5.0, 5.0), 0.4, 0.03, 0.1))
            .unwrap();
        assert_eq!(c.patch, a.patch);
        assert_eq!(c.absorbed, vec![b.patch]);
        assert_eq!(engine.patch_state(b.patch), Some(PatchState::Merged { into: a.patch }));
        assert_eq!(engine.active_count(), 1);
        assert!(store.get_elevation(Vec2::new(4.8, 5.0)).unwrap() >= -0.03 - 1e-5);
    }

    #[test]
    fn test_decay_is_monotone_and_retires() {
        let mut store = flat_store();
        let mut engine = engine();
        let center = Vec2::new(5.0, 5.0);
        let outcome = engine
            .apply_contact(&mut store, &ContactEvent::disk(center, 0.15, 0.05, 0.0))
            .unwrap();
        let depth_before = store.get_elevation(center).unwrap();

        let r = engine.params().decay_rate;
        let mut previous = engine.patch(outcome.patch).unwrap().magnitude;
        for n in 1..=10 {
            engine.decay();
            let m = engine.patch(outcome.patch).unwrap().magnitude;
            assert!(m < previous);
            assert!((m - 0.05 * (1.0 - r).powi(n)).abs() < 1e-6);
            previous = m;
        }

        while engine.active_count() > 0 {
            engine.decay();
        }
        assert_eq!(engine.patch_state(outcome.patch), Some(PatchState::Retired));
        // The depression stays
        assert_eq!(store.get_elevation(center).unwrap(), depth_before);
        assert_eq!(engine.freshness_at(&store, center), 0.0);
    }

    #[test]
    fn test_polygon_footprint() {
        let mut store = flat_store();
        let mut engine = engine();
        let square = Footprint::Polygon {
            vertices: vec![
                Vec2::new(2.0, 2.0),
                Vec2::new(2.5, 2.0),
                Vec2::new(2.5, 2.5),
                Vec2::new(2.0, 2.5),
            ],
        };
        assert!(square.inset_distance(Vec2::new(2.25, 2.25)) > 0.2);
        assert!(square.inset_distance(Vec2::new(3.0, 2.25)) < 0.0);

        let event = ContactEvent {
            footprint: square,
            depth_hint: 0.02,
            timestamp: 1.0,
        };
        engine.apply_contact(&mut store, &event).unwrap();
        assert!((store.get_elevation(Vec2::new(2.25, 2.25)).unwrap() + 0.02).abs() < 1e-5);
        assert_eq!(store.get_elevation(Vec2::new(2.6, 2.25)).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_contacts() {
        let mut store = flat_store();
        let mut engine = engine();

        let outside = ContactEvent::disk(Vec2::new(50.0, 50.0), 0.2, 0.05, 0.0);
        assert!(matches!(
            engine.apply_contact(&mut store, &outside),
            Err(TerrainError::DeformationOnInvalidTile { .. })
        ));

        let negative = ContactEvent::disk(Vec2::new(5.0, 5.0), 0.2, -0.05, 0.0);
        assert!(matches!(
            engine.apply_contact(&mut store, &negative),
            Err(TerrainError::InvalidContact(_))
        ));

        let nan = ContactEvent::disk(Vec2::new(f32::NAN, 5.0), 0.2, 0.05, 0.0);
        assert!(engine.apply_contact(&mut store, &nan).is_err());
        assert_eq!(engine.active_count(), 0);
        assert!(!store.has_dirty());
    }

    #[test]
    fn test_contact_on_world_edge_is_clipped() {
        let mut store = flat_store();
        let mut engine = engine();
        let outcome = engine
            .apply_contact(&mut store, &ContactEvent::disk(Vec2::new(0.0, 5.0), 0.15, 0.05, 0.0))
            .unwrap();
        assert!(!outcome.changed_tiles.is_empty());
        assert!(store.get_elevation(Vec2::new(0.0, 5.0)).unwrap() < -0.04);
    }

    #[test]
    fn test_depth_from_load() {
        let engine = engine();
        assert_eq!(engine.depth_from_load(0.0, 0.01), 0.0);
        assert_eq!(engine.depth_from_load(10.0, 0.0), 0.0);
        // 50 N over 100 cm² on default soil: a few millimetres
        let z = engine.depth_from_load(50.0, 0.01);
        assert!(z > 0.001 && z < 0.02);
        assert_eq!(engine.depth_from_load(1e9, 0.01), engine.params().max_depth_per_contact);
    }

    #[test]
    fn test_restore_of_stacked_contacts_is_bit_exact() {
        let sloped = || {
            let mut store = flat_store();
            let window = store.extent().window(&store.bounds()).unwrap();
            store.update_samples(window, |gi, gj, _| {
                0.137 * (gi as f32 * 0.031).sin() + 0.0071 * gj as f32
            });
            store.take_dirty();
            store
        };
        let mut store = sloped();
        let mut engine = engine();
        let c = Vec2::new(4.03, 4.07);
        for k in 0..6 {
            let event = ContactEvent::disk(c + Vec2::splat(0.01 * k as f32), 0.2, 0.013, 10.0 * k as f64);
            engine.apply_contact(&mut store, &event).unwrap();
        }

        let mut fresh_store = sloped();
        let mut restored = DeformationEngine::new(DeformationParams::default());
        restored.restore(&mut fresh_store, engine.export_state()).unwrap();

        for (a, b) in store.tiles().zip(fresh_store.tiles()) {
            let bits_a: Vec<u32> = a.samples().iter().map(|v| v.to_bits()).collect();
            let bits_b: Vec<u32> = b.samples().iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits_a, bits_b, "tile {:?} differs", a.coord);
        }
        assert_eq!(restored.export_state(), engine.export_state());
    }

    #[test]
    fn test_state_restore_replays_ledger() {
        let mut store = flat_store();
        let mut engine = engine();
        let c = Vec2::new(3.0, 3.0);
        engine.apply_contact(&mut store, &ContactEvent::disk(c, 0.2, 0.04, 0.0)).unwrap();
        let state = engine.export_state();

        let mut fresh_store = flat_store();
        let mut restored = DeformationEngine::new(DeformationParams::default());
        restored.restore(&mut fresh_store, state.clone()).unwrap();

        assert_eq!(restored.export_state(), state);
        assert_eq!(
            fresh_store.get_elevation(c).unwrap(),
            store.get_elevation(c).unwrap()
        );
    }
}
