//! Elevation tile store - owns the tiled heightfield, answers height queries
//! and tracks which tiles changed since the last mesh rebuild

use glam::{Vec2, Vec3};
use rayon::prelude::*;
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::Bounds;
use super::tile::{ElevationTile, TileCoord};
use crate::config::WorldParams;
use crate::error::{ConfigError, TerrainError, TerrainResult};

/// Validated world layout derived from [`WorldParams`]
///
/// The world spans `[0, size.x] x [0, size.y]` with its origin at the lower
/// left corner. Global sample `(i, j)` sits at `(i, j) * resolution`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldExtent {
    pub resolution: f32,
    pub tile_intervals: usize,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl WorldExtent {
    pub fn from_params(params: &WorldParams) -> Result<Self, ConfigError> {
        params.validate()?;
        let span = params.tile_span();
        Ok(Self {
            resolution: params.resolution,
            tile_intervals: params.tile_samples as usize,
            tiles_x: (params.size_x / span).round() as u32,
            tiles_y: (params.size_y / span).round() as u32,
        })
    }

    pub fn samples_x(&self) -> usize {
        self.tiles_x as usize * self.tile_intervals + 1
    }

    pub fn samples_y(&self) -> usize {
        self.tiles_y as usize * self.tile_intervals + 1
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    pub fn tile_span(&self) -> f32 {
        self.tile_intervals as f32 * self.resolution
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(
            (self.samples_x() - 1) as f32 * self.resolution,
            (self.samples_y() - 1) as f32 * self.resolution,
        )
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(Vec2::ZERO, self.size())
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.is_finite() && self.bounds().contains(p)
    }

    /// World position of a global sample
    #[inline]
    pub fn sample_position(&self, gi: usize, gj: usize) -> Vec2 {
        Vec2::new(gi as f32, gj as f32) * self.resolution
    }

    /// Global samples covering `bounds`, clipped to the world
    pub fn window(&self, bounds: &Bounds) -> Option<SampleWindow> {
        let clipped = bounds.intersection(&self.bounds())?;
        let max_i = self.samples_x() - 1;
        let max_j = self.samples_y() - 1;
        let to_index = |v: f32, max: usize, round_up: bool| {
            let f = v / self.resolution;
            let f = if round_up { f.ceil() } else { f.floor() };
            (f.max(0.0) as usize).min(max)
        };
        Some(SampleWindow {
            i0: to_index(clipped.min.x, max_i, false),
            j0: to_index(clipped.min.y, max_j, false),
            i1: to_index(clipped.max.x, max_i, true),
            j1: to_index(clipped.max.y, max_j, true),
        })
    }

    /// Range of tile columns whose samples include global column `gi`
    fn tiles_touching(&self, g0: usize, g1: usize, tiles: u32) -> (usize, usize) {
        let n = self.tile_intervals;
        let t0 = g0.saturating_sub(1) / n;
        let t1 = (g1 / n).min(tiles as usize - 1);
        (t0, t1)
    }
}

/// Inclusive range of global sample indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleWindow {
    pub i0: usize,
    pub j0: usize,
    pub i1: usize,
    pub j1: usize,
}

impl SampleWindow {
    pub fn width(&self) -> usize {
        self.i1 - self.i0 + 1
    }

    pub fn height(&self) -> usize {
        self.j1 - self.j0 + 1
    }

    pub fn contains(&self, gi: usize, gj: usize) -> bool {
        gi >= self.i0 && gi <= self.i1 && gj >= self.j0 && gj <= self.j1
    }

    pub fn union(&self, other: &SampleWindow) -> SampleWindow {
        SampleWindow {
            i0: self.i0.min(other.i0),
            j0: self.j0.min(other.j0),
            i1: self.i1.max(other.i1),
            j1: self.j1.max(other.j1),
        }
    }

    pub fn bounds(&self, extent: &WorldExtent) -> Bounds {
        Bounds::new(
            extent.sample_position(self.i0, self.j0),
            extent.sample_position(self.i1, self.j1),
        )
    }
}

/// Read-only copy of a rectangular block of samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightGrid {
    /// World position of the first sample
    pub origin: Vec2,
    pub resolution: f32,
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl HeightGrid {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    pub fn bounds(&self) -> Bounds {
        let far = Vec2::new((self.width - 1) as f32, (self.height - 1) as f32) * self.resolution;
        Bounds::new(self.origin, self.origin + far)
    }
}

/// Grid-aligned elevation change, indexed by global sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaField {
    pub window: SampleWindow,
    values: Vec<f32>,
}

impl DeltaField {
    pub fn zeros(window: SampleWindow) -> Self {
        Self {
            window,
            values: vec![0.0; window.width() * window.height()],
        }
    }

    /// Evaluate `f(world_position)` at every sample of the window
    pub fn from_fn(extent: &WorldExtent, window: SampleWindow, f: impl Fn(Vec2) -> f32) -> Self {
        let mut field = Self::zeros(window);
        for gj in window.j0..=window.j1 {
            for gi in window.i0..=window.i1 {
                field.set(gi, gj, f(extent.sample_position(gi, gj)));
            }
        }
        field
    }

    #[inline]
    fn offset(&self, gi: usize, gj: usize) -> usize {
        (gj - self.window.j0) * self.window.width() + (gi - self.window.i0)
    }

    /// Delta at a global sample (zero outside the window)
    pub fn get(&self, gi: usize, gj: usize) -> f32 {
        if self.window.contains(gi, gj) {
            self.values[self.offset(gi, gj)]
        } else {
            0.0
        }
    }

    pub fn set(&mut self, gi: usize, gj: usize, value: f32) {
        debug_assert!(self.window.contains(gi, gj));
        let idx = self.offset(gi, gj);
        self.values[idx] = value;
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    pub fn min_value(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::min)
    }
}

/// Read access to a tiled elevation field
///
/// Implemented by the live [`TileStore`] and by published snapshots so
/// physics and rendering code can query either one.
pub trait HeightQuery {
    fn extent(&self) -> &WorldExtent;

    /// Elevation at a global sample (indices must be in range)
    fn sample(&self, gi: usize, gj: usize) -> f32;

    fn check_point(&self, p: Vec2) -> TerrainResult<()> {
        if self.extent().contains(p) {
            Ok(())
        } else {
            Err(TerrainError::OutOfBounds { x: p.x, y: p.y })
        }
    }

    /// Bilinear elevation at `p`
    fn get_elevation(&self, p: Vec2) -> TerrainResult<f32> {
        self.check_point(p)?;
        Ok(self.elevation_clamped(p))
    }

    /// Bilinear elevation with `p` clamped into the world
    fn elevation_clamped(&self, p: Vec2) -> f32 {
        let e = self.extent();
        let max_i = e.samples_x() - 1;
        let max_j = e.samples_y() - 1;
        let fx = (p.x / e.resolution).clamp(0.0, max_i as f32);
        let fy = (p.y / e.resolution).clamp(0.0, max_j as f32);
        let i0 = (fx.floor() as usize).min(max_i - 1);
        let j0 = (fy.floor() as usize).min(max_j - 1);
        let tx = fx - i0 as f32;
        let ty = fy - j0 as f32;

        let h00 = self.sample(i0, j0);
        let h10 = self.sample(i0 + 1, j0);
        let h01 = self.sample(i0, j0 + 1);
        let h11 = self.sample(i0 + 1, j0 + 1);
        let bottom = h00 + (h10 - h00) * tx;
        let top = h01 + (h11 - h01) * tx;
        bottom + (top - bottom) * ty
    }

    /// Height gradient (dz/dx, dz/dy) by central differences, one-sided at the border
    fn gradient_at(&self, p: Vec2) -> Vec2 {
        let e = self.extent();
        let step = e.resolution;
        let b = e.bounds();
        let x0 = (p.x - step).max(b.min.x);
        let x1 = (p.x + step).min(b.max.x);
        let y0 = (p.y - step).max(b.min.y);
        let y1 = (p.y + step).min(b.max.y);

        let dx = if x1 > x0 {
            (self.elevation_clamped(Vec2::new(x1, p.y)) - self.elevation_clamped(Vec2::new(x0, p.y)))
                / (x1 - x0)
        } else {
            0.0
        };
        let dy = if y1 > y0 {
            (self.elevation_clamped(Vec2::new(p.x, y1)) - self.elevation_clamped(Vec2::new(p.x, y0)))
                / (y1 - y0)
        } else {
            0.0
        };
        Vec2::new(dx, dy)
    }

    fn normal_at(&self, p: Vec2) -> TerrainResult<Vec3> {
        self.check_point(p)?;
        let g = self.gradient_at(p);
        Ok(Vec3::new(-g.x, -g.y, 1.0).normalize())
    }

    /// Local slope in degrees
    fn slope_at(&self, p: Vec2) -> TerrainResult<f32> {
        self.check_point(p)?;
        Ok(self.gradient_at(p).length().atan().to_degrees())
    }

    fn height_and_normal(&self, p: Vec2) -> TerrainResult<(f32, Vec3)> {
        Ok((self.get_elevation(p)?, self.normal_at(p)?))
    }

    /// Normal at a global sample from neighbouring samples (crosses tile seams)
    fn sample_normal(&self, gi: usize, gj: usize) -> Vec3 {
        let e = self.extent();
        let max_i = e.samples_x() - 1;
        let max_j = e.samples_y() - 1;
        let (l, r) = (gi.saturating_sub(1), (gi + 1).min(max_i));
        let (d, u) = (gj.saturating_sub(1), (gj + 1).min(max_j));
        let dx = (self.sample(r, gj) - self.sample(l, gj)) / ((r - l) as f32 * e.resolution);
        let dy = (self.sample(gi, u) - self.sample(gi, d)) / ((u - d) as f32 * e.resolution);
        Vec3::new(-dx, -dy, 1.0).normalize()
    }

    /// Copy of the samples covering `bounds` (clipped to the world)
    fn get_region(&self, bounds: &Bounds) -> TerrainResult<HeightGrid> {
        let e = *self.extent();
        let window = e.window(bounds).ok_or(TerrainError::OutOfBounds {
            x: bounds.min.x,
            y: bounds.min.y,
        })?;
        let mut values = Vec::with_capacity(window.width() * window.height());
        for gj in window.j0..=window.j1 {
            for gi in window.i0..=window.i1 {
                values.push(self.sample(gi, gj));
            }
        }
        Ok(HeightGrid {
            origin: e.sample_position(window.i0, window.j0),
            resolution: e.resolution,
            width: window.width(),
            height: window.height(),
            values,
        })
    }
}

/// Locate the tile owning a global sample and read it
#[inline]
pub(crate) fn sample_tiles(tiles: &[Arc<ElevationTile>], extent: &WorldExtent, gi: usize, gj: usize) -> f32 {
    let n = extent.tile_intervals;
    let tx = (gi / n).min(extent.tiles_x as usize - 1);
    let ty = (gj / n).min(extent.tiles_y as usize - 1);
    tiles[ty * extent.tiles_x as usize + tx].get(gi - tx * n, gj - ty * n)
}

/// Wrapper for tile bounds to implement R-tree traits
#[derive(Debug, Clone, Copy, PartialEq)]
struct TileEnvelope {
    coord: TileCoord,
    bounds: Bounds,
}

impl RTreeObject for TileEnvelope {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bounds.min.to_array(), self.bounds.max.to_array())
    }
}

/// Owns every elevation tile of a world
pub struct TileStore {
    extent: WorldExtent,

    /// Tiles, row-major by tile coordinate. `Arc` so published snapshots
    /// share untouched tiles and writers copy only what they modify.
    tiles: Vec<Arc<ElevationTile>>,

    /// Spatial index over tile envelopes for world-space region lookups
    spatial_index: RTree<TileEnvelope>,

    /// Tiles modified since the last `take_dirty`, in deterministic order
    dirty: BTreeSet<TileCoord>,
}

impl TileStore {
    /// Create a store with every sample set to `fill`
    pub fn new(extent: WorldExtent, fill: f32) -> Self {
        let n = extent.tile_intervals;
        let mut tiles = Vec::with_capacity(extent.tile_count());
        let mut envelopes = Vec::with_capacity(extent.tile_count());
        for ty in 0..extent.tiles_y {
            for tx in 0..extent.tiles_x {
                let coord = TileCoord::new(tx, ty);
                let origin = extent.sample_position(tx as usize * n, ty as usize * n);
                let tile = ElevationTile::new(coord, origin, extent.resolution, n, fill);
                envelopes.push(TileEnvelope {
                    coord,
                    bounds: tile.bounds(),
                });
                tiles.push(Arc::new(tile));
            }
        }

        log::debug!(
            "[TILES] Created {}x{} tiles ({} samples per side, {} m spacing)",
            extent.tiles_x,
            extent.tiles_y,
            n + 1,
            extent.resolution
        );

        Self {
            extent,
            tiles,
            spatial_index: RTree::bulk_load(envelopes),
            dirty: BTreeSet::new(),
        }
    }

    pub fn from_params(params: &WorldParams) -> Result<Self, ConfigError> {
        Ok(Self::new(WorldExtent::from_params(params)?, 0.0))
    }

    pub fn bounds(&self) -> Bounds {
        self.extent.bounds()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    fn index_of(&self, coord: TileCoord) -> Option<usize> {
        (coord.x < self.extent.tiles_x && coord.y < self.extent.tiles_y)
            .then(|| coord.y as usize * self.extent.tiles_x as usize + coord.x as usize)
    }

    pub fn tile(&self, coord: TileCoord) -> Option<&ElevationTile> {
        self.index_of(coord).map(|idx| self.tiles[idx].as_ref())
    }

    pub fn tiles(&self) -> impl Iterator<Item = &ElevationTile> {
        self.tiles.iter().map(|t| t.as_ref())
    }

    pub fn tile_coords(&self) -> Vec<TileCoord> {
        self.tiles.iter().map(|t| t.coord).collect()
    }

    /// Tiles whose bounds touch `bounds` (sorted)
    pub fn tiles_in_bounds(&self, bounds: &Bounds) -> Vec<TileCoord> {
        let query = AABB::from_corners(bounds.min.to_array(), bounds.max.to_array());
        let mut coords: Vec<TileCoord> = self
            .spatial_index
            .locate_in_envelope_intersecting(&query)
            .map(|entry| entry.coord)
            .collect();
        coords.sort();
        coords
    }

    /// Share the current tiles (cheap: clones `Arc`s only)
    pub fn snapshot(&self) -> Vec<Arc<ElevationTile>> {
        self.tiles.clone()
    }

    /// Rewrite samples inside `window`; `f(gi, gj, old)` returns the new value
    ///
    /// Runs in parallel across tiles. Shared boundary samples are computed
    /// from the same global index in every tile that holds a copy, so seams
    /// stay bit-identical. Returns the tiles whose samples changed.
    pub fn update_samples<F>(&mut self, window: SampleWindow, f: F) -> Vec<TileCoord>
    where
        F: Fn(usize, usize, f32) -> f32 + Sync,
    {
        let extent = self.extent;
        let n = extent.tile_intervals;
        let (tx0, tx1) = extent.tiles_touching(window.i0, window.i1, extent.tiles_x);
        let (ty0, ty1) = extent.tiles_touching(window.j0, window.j1, extent.tiles_y);

        let mut changed: Vec<TileCoord> = self
            .tiles
            .par_iter_mut()
            .filter(|tile| {
                let c = tile.coord;
                (tx0..=tx1).contains(&(c.x as usize)) && (ty0..=ty1).contains(&(c.y as usize))
            })
            .filter_map(|tile| {
                let gx0 = tile.coord.x as usize * n;
                let gy0 = tile.coord.y as usize * n;
                let lx0 = window.i0.max(gx0) - gx0;
                let lx1 = window.i1.min(gx0 + n).checked_sub(gx0)?;
                let ly0 = window.j0.max(gy0) - gy0;
                let ly1 = window.j1.min(gy0 + n).checked_sub(gy0)?;
                if lx0 > lx1 || ly0 > ly1 {
                    return None;
                }

                // Compute first so untouched tiles are never copied
                let mut updates = Vec::new();
                for ly in ly0..=ly1 {
                    for lx in lx0..=lx1 {
                        let old = tile.get(lx, ly);
                        let new = f(gx0 + lx, gy0 + ly, old);
                        if new.to_bits() != old.to_bits() {
                            updates.push((lx, ly, new));
                        }
                    }
                }
                if updates.is_empty() {
                    return None;
                }

                let tile = Arc::make_mut(tile);
                for (lx, ly, value) in updates {
                    tile.set(lx, ly, value);
                }
                Some(tile.coord)
            })
            .collect();

        changed.sort();
        self.dirty.extend(changed.iter().copied());
        changed
    }

    /// Rewrite samples covering `bounds`; `f(world_position, old)` returns the new value
    pub fn update_region<F>(&mut self, bounds: &Bounds, f: F) -> Vec<TileCoord>
    where
        F: Fn(Vec2, f32) -> f32 + Sync,
    {
        let Some(window) = self.extent.window(bounds) else {
            return Vec::new();
        };
        let extent = self.extent;
        self.update_samples(window, |gi, gj, old| f(extent.sample_position(gi, gj), old))
    }

    /// Add a grid-aligned delta field in place and mark touched tiles dirty
    pub fn apply_delta(&mut self, delta: &DeltaField) -> TerrainResult<Vec<TileCoord>> {
        let w = delta.window;
        if w.i1 >= self.extent.samples_x() || w.j1 >= self.extent.samples_y() {
            let p = self.extent.sample_position(w.i1, w.j1);
            return Err(TerrainError::OutOfBounds { x: p.x, y: p.y });
        }
        Ok(self.update_samples(w, |gi, gj, old| old + delta.get(gi, gj)))
    }

    /// Tiles modified since the last call (sorted); clears their dirty flags
    pub fn take_dirty(&mut self) -> Vec<TileCoord> {
        let coords: Vec<TileCoord> = std::mem::take(&mut self.dirty).into_iter().collect();
        for coord in &coords {
            if let Some(idx) = self.index_of(*coord) {
                Arc::make_mut(&mut self.tiles[idx]).clear_dirty();
            }
        }
        coords
    }

    pub fn dirty_tiles(&self) -> impl Iterator<Item = &TileCoord> {
        self.dirty.iter()
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn mark_all_dirty(&mut self) {
        let coords = self.tile_coords();
        self.dirty.extend(coords);
    }
}

impl HeightQuery for TileStore {
    fn extent(&self) -> &WorldExtent {
        &self.extent
    }

    #[inline]
    fn sample(&self, gi: usize, gj: usize) -> f32 {
        sample_tiles(&self.tiles, &self.extent, gi, gj)
    }
}
