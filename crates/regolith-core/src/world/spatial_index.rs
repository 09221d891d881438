//! Spatial index - uniform grid over disk footprints for proximity queries
//!
//! Cells are sized to the expected footprint radius; each holds a small
//! inline list of ids. Results are always returned sorted so callers stay
//! deterministic regardless of hash iteration order.

use ahash::HashMap;
use glam::{I64Vec2, IVec2, Vec2};
use smallvec::SmallVec;
use std::hash::Hash;

/// Position and footprint radius of an indexed entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub position: Vec2,
    pub radius: f32,
}

/// Keep the closer of `best` and `(d, id)`; equal distances keep the smaller id
fn closer<Id: PartialOrd + Copy>(best: Option<(f32, Id)>, d: f32, id: Id) -> Option<(f32, Id)> {
    match best {
        Some((bd, bid)) if (bd, bid) <= (d, id) => Some((bd, bid)),
        _ => Some((d, id)),
    }
}

/// Uniform grid spatial index keyed by stable ids
#[derive(Debug, Clone)]
pub struct SpatialIndex<Id> {
    cell_size: f32,
    cells: HashMap<IVec2, SmallVec<[Id; 8]>>,
    entries: HashMap<Id, IndexEntry>,
    /// Largest footprint ever inserted (not shrunk on removal)
    max_radius: f32,
    /// Range of cell keys ever occupied, bounds the nearest-neighbour search
    cell_range: Option<(IVec2, IVec2)>,
}

impl<Id: Copy + Eq + Hash + Ord> SpatialIndex<Id> {
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            cells: HashMap::default(),
            entries: HashMap::default(),
            max_radius: 0.0,
            cell_range: None,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_radius(&self) -> f32 {
        self.max_radius
    }

    pub fn get(&self, id: Id) -> Option<&IndexEntry> {
        self.entries.get(&id)
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
        self.max_radius = 0.0;
        self.cell_range = None;
    }

    #[inline]
    fn cell_of(&self, p: Vec2) -> IVec2 {
        (p / self.cell_size).floor().as_ivec2()
    }

    /// Insert or move an entity; returns the previous entry for `id`
    pub fn insert(&mut self, id: Id, position: Vec2, radius: f32) -> Option<IndexEntry> {
        let previous = self.remove(id);
        let cell = self.cell_of(position);
        self.cells.entry(cell).or_default().push(id);
        self.entries.insert(id, IndexEntry { position, radius });
        self.max_radius = self.max_radius.max(radius);
        self.cell_range = Some(match self.cell_range {
            Some((lo, hi)) => (lo.min(cell), hi.max(cell)),
            None => (cell, cell),
        });
        previous
    }

    pub fn remove(&mut self, id: Id) -> Option<IndexEntry> {
        let entry = self.entries.remove(&id)?;
        let cell = self.cell_of(entry.position);
        if let Some(ids) = self.cells.get_mut(&cell) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.cells.remove(&cell);
            }
        }
        Some(entry)
    }

    /// Ids whose centres lie within `radius` of `center` (sorted)
    pub fn query_range(&self, center: Vec2, radius: f32) -> Vec<Id> {
        let mut hits = Vec::new();
        if self.entries.is_empty() || radius.is_nan() || radius < 0.0 {
            return hits;
        }
        let r2 = radius * radius;
        let lo = self.cell_of(center - Vec2::splat(radius));
        let hi = self.cell_of(center + Vec2::splat(radius));
        let span = (hi - lo + IVec2::ONE).as_i64vec2();
        let visited = span.x.saturating_mul(span.y);

        if (self.entries.len() as i64) < visited {
            hits.extend(
                self.entries
                    .iter()
                    .filter(|(_, e)| e.position.distance_squared(center) <= r2)
                    .map(|(id, _)| *id),
            );
        } else {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let Some(ids) = self.cells.get(&IVec2::new(x, y)) else {
                        continue;
                    };
                    for id in ids {
                        if let Some(e) = self.entries.get(id)
                            && e.position.distance_squared(center) <= r2
                        {
                            hits.push(*id);
                        }
                    }
                }
            }
        }
        hits.sort_unstable();
        hits
    }

    /// Ids whose footprint disk intersects the disk at `center` (sorted)
    pub fn query_overlapping(&self, center: Vec2, radius: f32) -> Vec<Id> {
        let mut hits = self.query_range(center, radius + self.max_radius);
        hits.retain(|id| {
            self.entries
                .get(id)
                .is_some_and(|e| e.position.distance(center) < radius + e.radius)
        });
        hits
    }

    /// Entity with the closest centre (ties go to the smaller id)
    ///
    /// Walks square rings of cells outwards from the query cell, clipped to
    /// the occupied cell range, so each occupied-range cell is visited at
    /// most once. Sparse or small indexes are scanned linearly.
    pub fn nearest(&self, point: Vec2) -> Option<Id> {
        const LINEAR_SCAN_BELOW: usize = 64;
        // Occupied-range cells per entry above which a full scan is cheaper
        const MAX_CELLS_PER_ENTRY: i64 = 4;

        let scan_all = || {
            self.entries
                .iter()
                .fold(None, |best, (id, e)| closer(best, e.position.distance_squared(point), *id))
                .map(|(_, id)| id)
        };
        if self.entries.len() < LINEAR_SCAN_BELOW {
            return scan_all();
        }
        let (lo, hi) = self.cell_range?;
        let (lo, hi) = (lo.as_i64vec2(), hi.as_i64vec2());
        let span = hi - lo + I64Vec2::ONE;
        if span.x.saturating_mul(span.y) > MAX_CELLS_PER_ENTRY * self.entries.len() as i64 {
            return scan_all();
        }

        let origin = self.cell_of(point).as_i64vec2();
        // Rings closer than the occupied range are empty, rings past it too
        let first_ring = (lo - origin).max(origin - hi).max(I64Vec2::ZERO).max_element();
        let last_ring = (origin - lo).abs().max((hi - origin).abs()).max_element();

        let mut best: Option<(f32, Id)> = None;
        for ring in first_ring..=last_ring {
            let (x0, x1) = ((origin.x - ring).max(lo.x), (origin.x + ring).min(hi.x));
            let (y0, y1) = ((origin.y - ring).max(lo.y), (origin.y + ring).min(hi.y));

            // Top and bottom rows, then the side columns without their corners
            let rows = [origin.y - ring, origin.y + ring];
            let rows = &rows[..if ring == 0 { 1 } else { 2 }];
            for &y in rows.iter().filter(|y| (lo.y..=hi.y).contains(*y)) {
                for x in x0..=x1 {
                    best = self.closest_in_cell(x, y, point, best);
                }
            }
            if ring > 0 {
                let (cy0, cy1) = (y0.max(origin.y - ring + 1), y1.min(origin.y + ring - 1));
                for x in [origin.x - ring, origin.x + ring] {
                    if !(lo.x..=hi.x).contains(&x) {
                        continue;
                    }
                    for y in cy0..=cy1 {
                        best = self.closest_in_cell(x, y, point, best);
                    }
                }
            }

            // Anything in outer rings is at least `ring` cells away
            if let Some((d2, _)) = best {
                let reach = ring as f32 * self.cell_size;
                if d2 < reach * reach {
                    break;
                }
            }
        }
        best.map(|(_, id)| id)
    }

    fn closest_in_cell(&self, x: i64, y: i64, point: Vec2, mut best: Option<(f32, Id)>) -> Option<(f32, Id)> {
        if let Some(ids) = self.cells.get(&IVec2::new(x as i32, y as i32)) {
            for id in ids {
                if let Some(e) = self.entries.get(id) {
                    best = closer(best, e.position.distance_squared(point), *id);
                }
            }
        }
        best
    }

    /// All entries in id order
    pub fn iter_sorted(&self) -> Vec<(Id, IndexEntry)> {
        let mut all: Vec<(Id, IndexEntry)> = self.entries.iter().map(|(id, e)| (*id, *e)).collect();
        all.sort_unstable_by_key(|(id, _)| *id);
        all
    }
}
