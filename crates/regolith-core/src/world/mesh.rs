//! Mesh/LOD builder - triangulates elevation tiles at several resolutions
//!
//! Level `k` samples the tile interior every `2^k` intervals, but every level
//! keeps all full-resolution samples along the tile border. Coarse cells that
//! touch the border are triangulated as a fan from their centre sample, so
//! two neighbouring tiles always agree on the shared edge whatever level each
//! one renders. Normals come from the global field and are identical on both
//! sides of a seam.

use rayon::prelude::*;
use std::collections::VecDeque;

use super::tile::TileCoord;
use super::tile_store::{HeightQuery, TileStore};

/// GPU-ready vertex
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    /// World position (x, y, elevation)
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Tile-local texture coordinates in [0, 1]
    pub uv: [f32; 2],
}

/// One level of detail of a tile
#[derive(Debug, Clone, PartialEq)]
pub struct MeshLevel {
    /// Interior sample step in intervals (1, 2, 4, ...)
    pub step: u32,
    pub vertices: Vec<MeshVertex>,
    /// Triangle list, counter-clockwise seen from above
    pub indices: Vec<u32>,
}

impl MeshLevel {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// All levels of one tile, tagged with the tile revision they were built from
#[derive(Debug, Clone, PartialEq)]
pub struct TileMeshSet {
    pub coord: TileCoord,
    pub revision: u64,
    pub levels: Vec<MeshLevel>,
}

/// Accumulates vertices for one level, deduplicating by local sample
struct LevelBuilder<'a> {
    store: &'a TileStore,
    coord: TileCoord,
    n: usize,
    lookup: Vec<u32>,
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
}

impl<'a> LevelBuilder<'a> {
    fn new(store: &'a TileStore, coord: TileCoord) -> Self {
        let n = store.extent().tile_intervals;
        Self {
            store,
            coord,
            n,
            lookup: vec![u32::MAX; (n + 1) * (n + 1)],
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    fn vertex(&mut self, x: usize, y: usize) -> u32 {
        let slot = y * (self.n + 1) + x;
        if self.lookup[slot] != u32::MAX {
            return self.lookup[slot];
        }
        let extent = self.store.extent();
        let gi = self.coord.x as usize * self.n + x;
        let gj = self.coord.y as usize * self.n + y;
        let p = extent.sample_position(gi, gj);
        let normal = self.store.sample_normal(gi, gj);

        let index = self.vertices.len() as u32;
        self.vertices.push(MeshVertex {
            position: [p.x, p.y, self.store.sample(gi, gj)],
            normal: normal.to_array(),
            uv: [x as f32 / self.n as f32, y as f32 / self.n as f32],
        });
        self.lookup[slot] = index;
        index
    }

    fn triangle(&mut self, a: (usize, usize), b: (usize, usize), c: (usize, usize)) {
        let ia = self.vertex(a.0, a.1);
        let ib = self.vertex(b.0, b.1);
        let ic = self.vertex(c.0, c.1);
        self.indices.extend_from_slice(&[ia, ib, ic]);
    }

    fn quad(&mut self, x0: usize, y0: usize, x1: usize, y1: usize) {
        self.triangle((x0, y0), (x1, y0), (x1, y1));
        self.triangle((x0, y0), (x1, y1), (x0, y1));
    }

    /// Fan from the cell centre; edges on the tile border keep every sample
    fn fan(&mut self, x0: usize, y0: usize, x1: usize, y1: usize) {
        let n = self.n;
        let center = ((x0 + x1) / 2, (y0 + y1) / 2);
        let fine = |on_border: bool| if on_border { 1 } else { x1 - x0 };

        let mut ring = Vec::new();
        let step = fine(y0 == 0);
        ring.extend((x0..x1).step_by(step).map(|x| (x, y0)));
        let step = fine(x1 == n);
        ring.extend((y0..y1).step_by(step).map(|y| (x1, y)));
        let step = fine(y1 == n);
        ring.extend((x0 + 1..=x1).rev().step_by(step).map(|x| (x, y1)));
        let step = fine(x0 == 0);
        ring.extend((y0 + 1..=y1).rev().step_by(step).map(|y| (x0, y)));

        for k in 0..ring.len() {
            let next = ring[(k + 1) % ring.len()];
            self.triangle(center, ring[k], next);
        }
    }

    fn finish(self, step: usize) -> MeshLevel {
        MeshLevel {
            step: step as u32,
            vertices: self.vertices,
            indices: self.indices,
        }
    }
}

/// Builds LOD mesh sets for tiles
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    lod_levels: u8,
}

impl MeshBuilder {
    pub fn new(lod_levels: u8) -> Self {
        Self {
            lod_levels: lod_levels.max(1),
        }
    }

    pub fn lod_levels(&self) -> u8 {
        self.lod_levels
    }

    /// Build every level of one tile (None for an unknown coordinate)
    pub fn build_tile(&self, store: &TileStore, coord: TileCoord) -> Option<TileMeshSet> {
        let tile = store.tile(coord)?;
        let n = tile.intervals();
        let levels = (0..self.lod_levels)
            .map(|k| 1usize << k)
            .filter(|step| n % step == 0)
            .map(|step| Self::build_level(store, coord, n, step))
            .collect();
        Some(TileMeshSet {
            coord,
            revision: tile.revision,
            levels,
        })
    }

    fn build_level(store: &TileStore, coord: TileCoord, n: usize, step: usize) -> MeshLevel {
        let mut level = LevelBuilder::new(store, coord);
        let cells = n / step;
        for cy in 0..cells {
            for cx in 0..cells {
                let (x0, y0) = (cx * step, cy * step);
                let (x1, y1) = (x0 + step, y0 + step);
                let on_border = cx == 0 || cy == 0 || cx + 1 == cells || cy + 1 == cells;
                if step == 1 || !on_border {
                    level.quad(x0, y0, x1, y1);
                } else {
                    level.fan(x0, y0, x1, y1);
                }
            }
        }
        level.finish(step)
    }

    /// Rebuild the given tiles in parallel (unknown coordinates are skipped)
    pub fn rebuild(&self, store: &TileStore, dirty: &[TileCoord]) -> Vec<TileMeshSet> {
        dirty
            .par_iter()
            .filter_map(|coord| self.build_tile(store, *coord))
            .collect()
    }
}

/// Time-sliced queue for the initial mesh build
#[derive(Debug, Clone, Default)]
pub struct MeshBuildQueue {
    pending: VecDeque<TileCoord>,
    per_tick: Option<usize>,
}

impl MeshBuildQueue {
    pub fn new(coords: impl IntoIterator<Item = TileCoord>, per_tick: Option<usize>) -> Self {
        Self {
            pending: coords.into_iter().collect(),
            per_tick,
        }
    }

    /// Tiles to build this tick (everything when unbudgeted)
    pub fn next_batch(&mut self) -> Vec<TileCoord> {
        let take = self
            .per_tick
            .unwrap_or(self.pending.len())
            .min(self.pending.len());
        self.pending.drain(..take).collect()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Bounds;
    use crate::world::tile_store::WorldExtent;
    use glam::{Vec2, Vec3};

    fn bumpy_store() -> TileStore {
        let mut store = TileStore::new(
            WorldExtent {
                resolution: 0.25,
                tile_intervals: 8,
                tiles_x: 2,
                tiles_y: 2,
            },
            0.0,
        );
        store.update_region(&store.bounds(), |p, _| (p.x * 1.7).sin() * (p.y * 0.9).cos());
        store
    }

    fn border_positions(level: &MeshLevel, x: f32) -> Vec<[u32; 3]> {
        let mut v: Vec<[u32; 3]> = level
            .vertices
            .iter()
            .filter(|v| v.position[0] == x)
            .map(|v| v.position.map(f32::to_bits))
            .collect();
        v.sort();
        v
    }

    fn projected_area(level: &MeshLevel) -> f32 {
        level
            .indices
            .chunks(3)
            .map(|t| {
                let p = |i: u32| Vec2::from_slice(&level.vertices[i as usize].position[..2]);
                let (a, b, c) = (p(t[0]), p(t[1]), p(t[2]));
                let area = (b - a).perp_dot(c - a) * 0.5;
                assert!(area > 0.0, "triangle is degenerate or clockwise");
                area
            })
            .sum()
    }

    #[test]
    fn test_full_resolution_level() {
        let store = bumpy_store();
        let set = MeshBuilder::new(3).build_tile(&store, TileCoord::new(0, 0)).unwrap();
        assert_eq!(set.levels.len(), 3);
        let full = &set.levels[0];
        assert_eq!(full.step, 1);
        assert_eq!(full.vertices.len(), 81);
        assert_eq!(full.triangle_count(), 128);
    }

    #[test]
    fn test_levels_cover_tile_without_gaps() {
        let store = bumpy_store();
        let set = MeshBuilder::new(4).build_tile(&store, TileCoord::new(1, 0)).unwrap();
        for level in &set.levels {
            assert!((projected_area(level) - 4.0).abs() < 1e-4);
            // All 32 border samples survive at every level
            let border = level
                .vertices
                .iter()
                .filter(|v| {
                    let (x, y) = (v.position[0], v.position[1]);
                    x == 2.0 || x == 4.0 || y == 0.0 || y == 2.0
                })
                .count();
            assert_eq!(border, 32);
        }
        assert!(set.levels[3].vertices.len() < set.levels[0].vertices.len());
    }

    #[test]
    fn test_shared_edge_matches_across_levels() {
        let store = bumpy_store();
        let builder = MeshBuilder::new(3);
        let left = builder.build_tile(&store, TileCoord::new(0, 0)).unwrap();
        let right = builder.build_tile(&store, TileCoord::new(1, 0)).unwrap();

        for a in &left.levels {
            for b in &right.levels {
                assert_eq!(border_positions(a, 2.0), border_positions(b, 2.0));
            }
        }

        // Normals on the seam agree between tiles
        let seam = |level: &MeshLevel| {
            let mut v: Vec<([u32; 3], [u32; 3])> = level
                .vertices
                .iter()
                .filter(|v| v.position[0] == 2.0)
                .map(|v| (v.position.map(f32::to_bits), v.normal.map(f32::to_bits)))
                .collect();
            v.sort();
            v
        };
        assert_eq!(seam(&left.levels[0]), seam(&right.levels[2]));
    }

    #[test]
    fn test_normals_are_unit() {
        let store = bumpy_store();
        let set = MeshBuilder::new(2).build_tile(&store, TileCoord::new(1, 1)).unwrap();
        for v in &set.levels[1].vertices {
            let n = Vec3::from_array(v.normal);
            assert!((n.length() - 1.0).abs() < 1e-5);
            assert!(n.z > 0.0);
        }
    }

    #[test]
    fn test_rebuild_tracks_revision() {
        let mut store = bumpy_store();
        let builder = MeshBuilder::new(2);
        let before = builder.build_tile(&store, TileCoord::new(0, 0)).unwrap();

        store.take_dirty();
        store.update_region(&Bounds::from_circle(Vec2::new(0.5, 0.5), 0.2), |_, h| h - 0.1);
        let dirty = store.take_dirty();
        let rebuilt = builder.rebuild(&store, &dirty);
        assert_eq!(rebuilt.len(), 1);
        assert!(rebuilt[0].revision > before.revision);
        assert!(builder.rebuild(&store, &[TileCoord::new(9, 9)]).is_empty());
    }

    #[test]
    fn test_vertices_are_pod() {
        let store = bumpy_store();
        let set = MeshBuilder::new(1).build_tile(&store, TileCoord::new(0, 1)).unwrap();
        let bytes: &[u8] = bytemuck::cast_slice(&set.levels[0].vertices);
        assert_eq!(std::mem::size_of::<MeshVertex>(), 32);
        assert_eq!(bytes.len(), set.levels[0].vertices.len() * 32);
    }

    #[test]
    fn test_build_queue_time_slices() {
        let coords: Vec<TileCoord> = (0..5).map(|x| TileCoord::new(x, 0)).collect();
        let mut queue = MeshBuildQueue::new(coords.clone(), Some(2));
        assert_eq!(queue.next_batch(), coords[..2].to_vec());
        assert_eq!(queue.remaining(), 3);
        assert_eq!(queue.next_batch().len(), 2);
        assert_eq!(queue.next_batch().len(), 1);
        assert!(queue.is_done());
        assert!(queue.next_batch().is_empty());

        let mut all = MeshBuildQueue::new(coords, None);
        assert_eq!(all.next_batch().len(), 5);
    }
}
