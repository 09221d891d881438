//! Crater stamping - seeded crater placement and closed-form profiles
//!
//! Crater profile, in normalized elliptical distance `ρ` (1 at the rim crest):
//! - inside the rim the floor rises parabolically from `-depth` at the
//!   centre (or the edge of a flat floor) to `+rim_height` at `ρ = 1`
//! - outside the rim a raised cosine falls from `rim_height` to zero over
//!   `rim_width` radii
//!
//! Age `a ∈ [0, 1]` erodes a crater: depth scales by `1 - a/2`, rim height by
//! `1 - a`, and the rim falloff widens by `1 + a`.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use super::Bounds;
use super::rng::{TerrainRng, stage_rng};
use super::tile_store::{HeightQuery, TileStore, WorldExtent};
use crate::config::{CraterParams, within};
use crate::error::ConfigError;

/// Stable crater identifier (index in stamping order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CraterId(pub u32);

/// Interior shape of a crater
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CraterProfile {
    /// Bowl: parabolic from the centre to the rim
    Parabolic,
    /// Flat floor out to `floor_ratio` of the radius, then parabolic walls
    FlatFloor { floor_ratio: f32 },
    /// Flat floor with a raised-cosine central peak of
    /// `peak_height_ratio × depth`
    CentralPeak {
        floor_ratio: f32,
        peak_height_ratio: f32,
    },
}

impl CraterProfile {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            CraterProfile::Parabolic => Ok(()),
            CraterProfile::FlatFloor { floor_ratio } => {
                within("craters.profile.floor_ratio", floor_ratio, 0.0, 0.95)
            }
            CraterProfile::CentralPeak {
                floor_ratio,
                peak_height_ratio,
            } => {
                within("craters.profile.floor_ratio", floor_ratio, 0.05, 0.95)?;
                within(
                    "craters.profile.peak_height_ratio",
                    peak_height_ratio,
                    0.0,
                    1.0,
                )
            }
        }
    }

    fn floor_ratio(&self) -> f32 {
        match *self {
            CraterProfile::Parabolic => 0.0,
            CraterProfile::FlatFloor { floor_ratio } => floor_ratio,
            CraterProfile::CentralPeak { floor_ratio, .. } => floor_ratio,
        }
    }

    /// Elevation inside the rim (`rho <= 1`)
    fn interior(&self, rho: f32, depth: f32, rim_height: f32) -> f32 {
        let floor = self.floor_ratio();
        if rho <= floor {
            let peak = match *self {
                CraterProfile::CentralPeak {
                    peak_height_ratio, ..
                } => peak_height_ratio * depth * 0.5 * (1.0 + (PI * rho / floor).cos()),
                _ => 0.0,
            };
            return -depth + peak;
        }
        let t = (rho - floor) / (1.0 - floor);
        -depth + (depth + rim_height) * t * t
    }
}

/// One stamped crater (effective, age-attenuated dimensions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraterRecord {
    pub id: CraterId,
    pub center: Vec2,
    /// Rim radius along the major axis in meters
    pub radius: f32,
    /// Floor depth below the surrounding terrain
    pub depth: f32,
    /// Rim crest height above the surrounding terrain
    pub rim_height: f32,
    /// Rim falloff width as a fraction of the radius
    pub rim_width: f32,
    /// Minor/major axis ratio
    pub xy_ratio: f32,
    /// Major axis rotation in radians
    pub rotation: f32,
    /// Erosion factor in [0, 1]
    pub age: f32,
    pub profile: CraterProfile,
    /// Index of the size band this crater was drawn from
    pub band: usize,
}

impl CraterRecord {
    /// Distance from the centre beyond which the crater has no effect
    pub fn influence_radius(&self) -> f32 {
        self.radius * (1.0 + self.rim_width)
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_circle(self.center, self.influence_radius())
    }

    /// Normalized elliptical distance (1 on the rim crest)
    fn rho(&self, p: Vec2) -> f32 {
        let d = p - self.center;
        let (sin, cos) = self.rotation.sin_cos();
        let lx = d.x * cos + d.y * sin;
        let ly = -d.x * sin + d.y * cos;
        let minor = self.radius * self.xy_ratio;
        ((lx / self.radius).powi(2) + (ly / minor).powi(2)).sqrt()
    }

    /// Elevation change this crater adds at `p`
    pub fn contribution(&self, p: Vec2) -> f32 {
        let rho = self.rho(p);
        if rho <= 1.0 {
            return self.profile.interior(rho, self.depth, self.rim_height);
        }
        let s = (rho - 1.0) / self.rim_width;
        if s >= 1.0 {
            0.0
        } else {
            self.rim_height * 0.5 * (1.0 + (PI * s).cos())
        }
    }
}

/// Draws craters from the configured size bands and stamps them into tiles
pub struct CraterStamper {
    params: CraterParams,
}

impl CraterStamper {
    pub fn new(params: CraterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CraterParams {
        &self.params
    }

    /// Draw crater records for a world (sequential, seed-derived draws)
    pub fn sample(&self, seed: u64, extent: &WorldExtent) -> Vec<CraterRecord> {
        let p = &self.params;
        if !p.enabled {
            return Vec::new();
        }

        let mut rng = stage_rng(seed, "craters");
        let world = extent.bounds();
        let area = world.area();
        let mut records = Vec::new();
        let mut dropped = 0usize;

        for (band_index, band) in p.bands.iter().enumerate() {
            let count = rng.gen_count(band.density * area);
            for _ in 0..count {
                let mut placed = None;
                for _ in 0..p.max_attempts {
                    let radius = rng.gen_power_law(band.min_radius, band.max_radius, p.size_exponent);
                    let xy_ratio = rng.gen_range_f32(p.min_xy_ratio, p.max_xy_ratio);
                    let rotation = if p.random_rotation { rng.gen_angle() } else { 0.0 };
                    let age = rng.gen_range_f32(p.min_age, p.max_age);
                    let center = match &p.density_map {
                        Some(map) => map.sample_position(&mut rng, &world, p.max_attempts),
                        None => Some(Vec2::new(
                            rng.gen_range_f32(world.min.x, world.max.x),
                            rng.gen_range_f32(world.min.y, world.max.y),
                        )),
                    };
                    let Some(center) = center else {
                        continue;
                    };

                    let depth = 2.0 * radius * p.depth_to_diameter;
                    let record = CraterRecord {
                        id: CraterId(records.len() as u32),
                        center,
                        radius,
                        depth: depth * (1.0 - 0.5 * age),
                        rim_height: depth * p.rim_height_ratio * (1.0 - age),
                        rim_width: p.rim_width * (1.0 + age),
                        xy_ratio,
                        rotation,
                        age,
                        profile: p.profile,
                        band: band_index,
                    };

                    // The rim influence must stay inside the world
                    if world.contains_bounds(&record.bounds()) {
                        placed = Some(record);
                        break;
                    }
                }
                match placed {
                    Some(record) => records.push(record),
                    None => dropped += 1,
                }
            }
        }

        if dropped > 0 {
            log::debug!(
                "[CRATERS] Dropped {} craters that did not fit after {} attempts",
                dropped,
                p.max_attempts
            );
        }
        records
    }

    /// Add crater profiles to the store
    ///
    /// Contributions at a sample are summed in list order; the total
    /// depression is clamped to `overlap_depth_limit` times the deepest single
    /// contribution.
    pub fn apply(&self, craters: &[CraterRecord], store: &mut TileStore) {
        let extent = *store.extent();
        let Some(window) = craters
            .iter()
            .filter_map(|c| extent.window(&c.bounds()))
            .reduce(|a, b| a.union(&b))
        else {
            return;
        };

        // Bucket craters by the tile that owns each sample
        let n = extent.tile_intervals;
        let tiles_x = extent.tiles_x as usize;
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); extent.tile_count()];
        for (index, crater) in craters.iter().enumerate() {
            for coord in store.tiles_in_bounds(&crater.bounds()) {
                buckets[coord.y as usize * tiles_x + coord.x as usize].push(index);
            }
        }

        let limit = self.params.overlap_depth_limit;
        store.update_samples(window, |gi, gj, old| {
            let tx = (gi / n).min(tiles_x - 1);
            let ty = (gj / n).min(extent.tiles_y as usize - 1);
            let p = extent.sample_position(gi, gj);

            let mut total = 0.0f32;
            let mut deepest = 0.0f32;
            for &index in &buckets[ty * tiles_x + tx] {
                let c = craters[index].contribution(p);
                total += c;
                deepest = deepest.min(c);
            }
            if deepest < 0.0 {
                total = total.max(limit * deepest);
            }
            old + total
        });
    }

    /// Sample and apply craters in one step
    pub fn stamp(&self, seed: u64, store: &mut TileStore) -> Vec<CraterRecord> {
        let craters = self.sample(seed, store.extent());
        self.apply(&craters, store);
        log::info!("[CRATERS] Stamped {} craters", craters.len());
        craters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CraterBand, WorldParams};
    use crate::world::TileCoord;

    fn yard() -> TileStore {
        TileStore::from_params(&WorldParams::default()).unwrap()
    }

    fn crater(center: Vec2, radius: f32) -> CraterRecord {
        CraterRecord {
            id: CraterId(0),
            center,
            radius,
            depth: 0.3,
            rim_height: 0.05,
            rim_width: 0.5,
            xy_ratio: 1.0,
            rotation: 0.0,
            age: 0.0,
            profile: CraterProfile::Parabolic,
            band: 0,
        }
    }

    #[test]
    fn test_profile_shape() {
        let c = crater(Vec2::new(10.0, 10.0), 1.0);
        assert!((c.contribution(c.center) + 0.3).abs() < 1e-6);
        // Rim crest
        assert!((c.contribution(Vec2::new(11.0, 10.0)) - 0.05).abs() < 1e-5);
        // Continuous just outside the rim
        assert!((c.contribution(Vec2::new(11.001, 10.0)) - 0.05).abs() < 1e-3);
        // No influence beyond the falloff
        assert_eq!(c.contribution(Vec2::new(11.6, 10.0)), 0.0);
    }

    #[test]
    fn test_flat_floor_and_central_peak() {
        let mut c = crater(Vec2::ZERO, 2.0);
        c.profile = CraterProfile::FlatFloor { floor_ratio: 0.5 };
        assert_eq!(c.contribution(Vec2::new(0.5, 0.0)), -0.3);
        assert_eq!(c.contribution(Vec2::ZERO), -0.3);

        c.profile = CraterProfile::CentralPeak {
            floor_ratio: 0.5,
            peak_height_ratio: 0.5,
        };
        assert!((c.contribution(Vec2::ZERO) + 0.15).abs() < 1e-6);
        assert!((c.contribution(Vec2::new(1.0, 0.0)) + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_ellipse_rotation() {
        let mut c = crater(Vec2::ZERO, 1.0);
        c.xy_ratio = 0.5;
        // Minor axis along y: rim crest at y = 0.5
        assert!((c.contribution(Vec2::new(0.0, 0.5)) - 0.05).abs() < 1e-5);
        c.rotation = std::f32::consts::FRAC_PI_2;
        // Rotated: minor axis along x
        assert!((c.contribution(Vec2::new(0.5, 0.0)) - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_sample_is_deterministic_and_inside_world() {
        let stamper = CraterStamper::new(CraterParams::default());
        let extent = *yard().extent();
        let a = stamper.sample(42, &extent);
        let b = stamper.sample(42, &extent);
        let c = stamper.sample(43, &extent);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_empty());

        let world = extent.bounds();
        for record in &a {
            assert!(world.contains_bounds(&record.bounds()));
            assert!((0.0..=1.0).contains(&record.age));
            let band = &stamper.params().bands[record.band];
            assert!(record.radius >= band.min_radius && record.radius <= band.max_radius);
        }
    }

    #[test]
    fn test_age_attenuates_profile() {
        let params = CraterParams {
            bands: vec![CraterBand {
                density: 0.01,
                min_radius: 1.0,
                max_radius: 1.0,
            }],
            min_age: 1.0,
            max_age: 1.0,
            ..CraterParams::default()
        };
        let extent = *yard().extent();
        let old = CraterStamper::new(params.clone()).sample(3, &extent);
        let fresh = CraterStamper::new(CraterParams {
            min_age: 0.0,
            max_age: 0.0,
            ..params
        })
        .sample(3, &extent);

        let (o, f) = (&old[0], &fresh[0]);
        assert!(o.depth < f.depth);
        assert_eq!(o.rim_height, 0.0);
        assert!(o.rim_width > f.rim_width);
    }

    #[test]
    fn test_overlap_clamp() {
        let mut store = yard();
        let stamper = CraterStamper::new(CraterParams::default());
        let center = Vec2::new(10.0, 10.0);
        let craters: Vec<CraterRecord> = (0..4).map(|_| crater(center, 1.0)).collect();
        stamper.apply(&craters, &mut store);

        // Four identical bowls clamp to 1.5x a single one
        let h = store.get_elevation(center).unwrap();
        assert!((h + 0.45).abs() < 1e-4);
    }

    #[test]
    fn test_stamp_keeps_seams() {
        let mut store = yard();
        let craters = CraterStamper::new(CraterParams::default()).stamp(42, &mut store);
        assert!(!craters.is_empty());

        let n = store.extent().tile_intervals;
        for tile in store.tiles() {
            let coord = tile.coord;
            if let Some(right) = store.tile(TileCoord::new(coord.x + 1, coord.y)) {
                for y in 0..=n {
                    assert_eq!(tile.get(n, y).to_bits(), right.get(0, y).to_bits());
                }
            }
        }
    }

    #[test]
    fn test_disabled_stamps_nothing() {
        let mut store = yard();
        let stamper = CraterStamper::new(CraterParams {
            enabled: false,
            ..CraterParams::default()
        });
        assert!(stamper.stamp(1, &mut store).is_empty());
        assert!(!store.has_dirty());
    }
}
