//! Elevation tile - square grid of height samples

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::Bounds;

/// Tile coordinates (in tile space, not meters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Bounding rect of modified samples in tile-local indices
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirtyRect {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl DirtyRect {
    pub fn new(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// A square region of the elevation field
///
/// A tile with `n` intervals per side stores `(n + 1)²` samples. The last row
/// and column duplicate the first row and column of the neighbouring tiles;
/// the tile store keeps those copies identical.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElevationTile {
    pub coord: TileCoord,

    /// World position of sample (0, 0)
    pub origin: Vec2,

    /// Sample spacing in meters
    pub resolution: f32,

    intervals: usize,

    /// Elevation samples, row-major. Index = y * (intervals + 1) + x
    samples: Vec<f32>,

    /// Modified since the last mesh rebuild (not persisted)
    #[serde(skip)]
    pub dirty: bool,

    /// Bounding rect of modified samples (not persisted)
    #[serde(skip)]
    pub dirty_rect: Option<DirtyRect>,

    /// Bumped on every mutation so consumers can detect stale meshes
    pub revision: u64,
}

impl ElevationTile {
    pub fn new(coord: TileCoord, origin: Vec2, resolution: f32, intervals: usize, fill: f32) -> Self {
        let side = intervals + 1;
        Self {
            coord,
            origin,
            resolution,
            intervals,
            samples: vec![fill; side * side],
            dirty: false,
            dirty_rect: None,
            revision: 0,
        }
    }

    /// Number of sample intervals per side
    #[inline]
    pub fn intervals(&self) -> usize {
        self.intervals
    }

    /// Number of samples per side
    #[inline]
    pub fn side(&self) -> usize {
        self.intervals + 1
    }

    /// Get elevation at local sample indices
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        debug_assert!(x < self.side() && y < self.side());
        self.samples[y * self.side() + x]
    }

    /// Set elevation at local sample indices
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        debug_assert!(x < self.side() && y < self.side());
        let side = self.side();
        self.samples[y * side + x] = value;
        self.mark_dirty(x, y);
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// World position of a local sample
    #[inline]
    pub fn sample_position(&self, x: usize, y: usize) -> Vec2 {
        self.origin + Vec2::new(x as f32, y as f32) * self.resolution
    }

    pub fn span(&self) -> f32 {
        self.intervals as f32 * self.resolution
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.origin, self.origin + Vec2::splat(self.span()))
    }

    /// Lowest and highest sample
    pub fn min_max(&self) -> (f32, f32) {
        self.samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            })
    }

    /// Clear the dirty state after the mesh builder consumed it
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
        self.dirty_rect = None;
    }

    fn mark_dirty(&mut self, x: usize, y: usize) {
        if !self.dirty {
            self.revision += 1;
        }
        self.dirty = true;
        match &mut self.dirty_rect {
            Some(rect) => rect.expand(x, y),
            None => self.dirty_rect = Some(DirtyRect::new(x, y)),
        }
    }
}
