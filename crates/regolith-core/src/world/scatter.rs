//! Feature scatterer - places rocks with slope and non-overlap constraints
//!
//! The world is walked in fixed row-major scatter cells. Each cell draws a
//! target count from its density and then tries candidates until the target
//! is met or the per-cell attempt budget runs out. Cramped or steep cells
//! legitimately fall short; that is reported, never padded.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::Bounds;
use super::rng::{TerrainRng, stage_rng};
use super::spatial_index::SpatialIndex;
use super::tile_store::HeightQuery;
use crate::config::RockParams;

/// Stable rock identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RockId(pub u32);

/// A placed rock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RockInstance {
    pub id: RockId,
    /// Centroid in world coordinates (z is already embedded)
    pub position: Vec3,
    pub orientation: Quat,
    /// Half extents in meters; x and y never exceed the footprint radius
    pub scale: Vec3,
    pub footprint_radius: f32,
    /// Index into the configured archetype list
    pub archetype: u16,
}

impl RockInstance {
    pub fn footprint_center(&self) -> Vec2 {
        self.position.truncate()
    }

    /// Lowest point of the rock body
    pub fn base_elevation(&self) -> f32 {
        self.position.z - self.scale.z
    }
}

/// Shortfall in one scatter cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellShortfall {
    pub bounds: Bounds,
    pub target: usize,
    pub placed: usize,
}

/// Cells that could not reach their target count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementShortfall {
    pub cells: Vec<CellShortfall>,
    /// Target over the whole world
    pub target: usize,
    /// Rocks placed over the whole world
    pub placed: usize,
}

impl PlacementShortfall {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn missing(&self) -> usize {
        self.cells.iter().map(|c| c.target - c.placed).sum()
    }
}

/// Result of a scatter pass
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterResult {
    pub rocks: Vec<RockInstance>,
    pub shortfall: PlacementShortfall,
}

pub struct FeatureScatterer {
    params: RockParams,
}

impl FeatureScatterer {
    pub fn new(params: RockParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RockParams {
        &self.params
    }

    /// Place rocks over the whole terrain and insert them into `index`
    pub fn scatter<S>(&self, seed: u64, terrain: &S, index: &mut SpatialIndex<RockId>) -> ScatterResult
    where
        S: HeightQuery + ?Sized,
    {
        let p = &self.params;
        let mut result = ScatterResult {
            rocks: Vec::new(),
            shortfall: PlacementShortfall::default(),
        };
        if !p.enabled {
            return result;
        }

        let mut rng = stage_rng(seed, "rocks");
        let world = terrain.extent().bounds();
        let cells_x = (world.width() / p.cell_size).ceil().max(1.0) as usize;
        let cells_y = (world.height() / p.cell_size).ceil().max(1.0) as usize;

        for cy in 0..cells_y {
            for cx in 0..cells_x {
                let min = world.min + Vec2::new(cx as f32, cy as f32) * p.cell_size;
                let max = (min + Vec2::splat(p.cell_size)).min(world.max);
                let cell = Bounds::new(min, max);

                let target = rng.gen_count(p.density.mean_over(&cell) * cell.area());
                if target == 0 {
                    continue;
                }
                let placed = self.fill_cell(&mut rng, terrain, index, &cell, target, &mut result.rocks);

                result.shortfall.target += target;
                result.shortfall.placed += placed;
                if placed < target {
                    log::debug!(
                        "[SCATTER] Cell ({:.1}, {:.1})-({:.1}, {:.1}): {}/{} rocks",
                        cell.min.x,
                        cell.min.y,
                        cell.max.x,
                        cell.max.y,
                        placed,
                        target
                    );
                    result.shortfall.cells.push(CellShortfall {
                        bounds: cell,
                        target,
                        placed,
                    });
                }
            }
        }

        if !result.shortfall.is_empty() {
            log::warn!(
                "[SCATTER] Placed {}/{} rocks; {} cells fell short by {} rocks in total",
                result.shortfall.placed,
                result.shortfall.target,
                result.shortfall.cells.len(),
                result.shortfall.missing()
            );
        }
        log::info!("[SCATTER] Placed {} rocks", result.rocks.len());
        result
    }

    /// Try candidates in one cell; returns the number placed
    fn fill_cell<R, S>(
        &self,
        rng: &mut R,
        terrain: &S,
        index: &mut SpatialIndex<RockId>,
        cell: &Bounds,
        target: usize,
        rocks: &mut Vec<RockInstance>,
    ) -> usize
    where
        R: TerrainRng + ?Sized,
        S: HeightQuery + ?Sized,
    {
        let p = &self.params;
        let mut placed = 0;
        for _ in 0..p.max_attempts_per_cell {
            if placed >= target {
                break;
            }
            let center = Vec2::new(
                rng.gen_range_f32(cell.min.x, cell.max.x),
                rng.gen_range_f32(cell.min.y, cell.max.y),
            );
            let radius = rng.gen_power_law(p.min_radius, p.max_radius, p.size_exponent);

            let Ok(slope) = terrain.slope_at(center) else {
                continue;
            };
            if slope > p.slope_limit_deg {
                continue;
            }

            let reach = radius + index.max_radius().max(radius);
            let overlaps = index.query_range(center, reach).into_iter().any(|other| {
                index.get(other).is_some_and(|e| {
                    e.position.distance(center) < radius + e.radius - p.overlap_tolerance
                })
            });
            if overlaps {
                continue;
            }

            let Ok((ground, normal)) = terrain.height_and_normal(center) else {
                continue;
            };
            let rock = self.build_rock(rng, RockId(rocks.len() as u32), center, radius, ground, normal);
            index.insert(rock.id, center, radius);
            rocks.push(rock);
            placed += 1;
        }
        placed
    }

    fn build_rock<R: TerrainRng + ?Sized>(
        &self,
        rng: &mut R,
        id: RockId,
        center: Vec2,
        radius: f32,
        ground: f32,
        normal: Vec3,
    ) -> RockInstance {
        let p = &self.params;

        let heading = Quat::from_rotation_z(rng.gen_angle());
        let tilt_dir = rng.gen_angle();
        let tilt = rng.gen_range_f32(0.0, p.max_tilt_deg).to_radians();
        let tilt = Quat::from_axis_angle(Vec3::new(tilt_dir.cos(), tilt_dir.sin(), 0.0), tilt);
        let align = Quat::from_rotation_arc(Vec3::Z, normal);
        let orientation = (align * tilt * heading).normalize();

        let j = p.scale_jitter;
        let scale = radius
            * Vec3::new(
                1.0 - j * rng.gen_f32(),
                1.0 - j * rng.gen_f32(),
                1.0 - j * rng.gen_f32(),
            );

        // Sink the body so the embedded share of its height is below ground
        let height = 2.0 * scale.z;
        let z = ground - p.embed_fraction * height + scale.z;

        RockInstance {
            id,
            position: center.extend(z),
            orientation,
            scale,
            footprint_radius: radius,
            archetype: self.pick_archetype(rng),
        }
    }

    fn pick_archetype<R: TerrainRng + ?Sized>(&self, rng: &mut R) -> u16 {
        let archetypes = &self.params.archetypes;
        let total: f32 = archetypes.iter().map(|a| a.weight.max(0.0)).sum();
        let mut t = rng.gen_f32() * total;
        let mut last = 0;
        for (i, archetype) in archetypes.iter().enumerate() {
            let w = archetype.weight.max(0.0);
            if w <= 0.0 {
                continue;
            }
            if t < w {
                return i as u16;
            }
            t -= w;
            last = i;
        }
        last as u16
    }
}
