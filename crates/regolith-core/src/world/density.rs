//! Density maps - spatially varying "expected count per m²" used by crater
//! stamping and rock scattering

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::Bounds;
use super::rng::TerrainRng;
use crate::error::ConfigError;

/// Features per square meter, constant or sampled from a coarse grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DensityMap {
    Uniform(f32),
    /// Nearest-cell lookup; points outside the grid have density 0
    Grid {
        origin: Vec2,
        cell_size: f32,
        width: usize,
        height: usize,
        values: Vec<f32>,
    },
}

impl Default for DensityMap {
    fn default() -> Self {
        DensityMap::Uniform(0.0)
    }
}

impl DensityMap {
    pub fn value_at(&self, p: Vec2) -> f32 {
        match self {
            DensityMap::Uniform(d) => *d,
            DensityMap::Grid {
                origin,
                cell_size,
                width,
                height,
                values,
            } => {
                let local = (p - *origin) / *cell_size;
                if local.x < 0.0 || local.y < 0.0 {
                    return 0.0;
                }
                let (cx, cy) = (local.x as usize, local.y as usize);
                if cx >= *width || cy >= *height {
                    return 0.0;
                }
                values[cy * width + cx]
            }
        }
    }

    pub fn max_value(&self) -> f32 {
        match self {
            DensityMap::Uniform(d) => *d,
            DensityMap::Grid { values, .. } => values.iter().copied().fold(0.0, f32::max),
        }
    }

    /// Average density over `bounds`, estimated on a 4x4 lattice of cell centres
    pub fn mean_over(&self, bounds: &Bounds) -> f32 {
        match self {
            DensityMap::Uniform(d) => *d,
            DensityMap::Grid { .. } => {
                const STEPS: usize = 4;
                let step = Vec2::new(bounds.width(), bounds.height()) / STEPS as f32;
                let mut sum = 0.0;
                for j in 0..STEPS {
                    for i in 0..STEPS {
                        let p = bounds.min + step * Vec2::new(i as f32 + 0.5, j as f32 + 0.5);
                        sum += self.value_at(p);
                    }
                }
                sum / (STEPS * STEPS) as f32
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DensityMap::Uniform(d) => {
                if d.is_finite() && *d > 0.0 {
                    Ok(())
                } else {
                    Err(ConfigError::NonPositive {
                        field: "density",
                        value: *d,
                    })
                }
            }
            DensityMap::Grid {
                cell_size,
                width,
                height,
                values,
                ..
            } => {
                if !(cell_size.is_finite() && *cell_size > 0.0) {
                    return Err(ConfigError::DensityMap(format!(
                        "cell size {cell_size} must be positive"
                    )));
                }
                if values.len() != width * height {
                    return Err(ConfigError::DensityMap(format!(
                        "{} values for a {width}x{height} grid",
                        values.len()
                    )));
                }
                if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
                    return Err(ConfigError::DensityMap(format!(
                        "density {bad} is negative or not finite"
                    )));
                }
                if self.max_value() <= 0.0 {
                    return Err(ConfigError::DensityMap(
                        "every cell is zero".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Draw a position in `bounds` with probability proportional to density
    ///
    /// Rejection sampling against the map maximum; gives up after
    /// `max_attempts` draws. Uniform maps never reject.
    pub fn sample_position<R: TerrainRng + ?Sized>(
        &self,
        rng: &mut R,
        bounds: &Bounds,
        max_attempts: u32,
    ) -> Option<Vec2> {
        let peak = self.max_value();
        if peak <= 0.0 {
            return None;
        }
        for _ in 0..max_attempts.max(1) {
            let p = Vec2::new(
                rng.gen_range_f32(bounds.min.x, bounds.max.x),
                rng.gen_range_f32(bounds.min.y, bounds.max.y),
            );
            if matches!(self, DensityMap::Uniform(_)) || rng.gen_f32() * peak < self.value_at(p) {
                return Some(p);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn half_map() -> DensityMap {
        // Left column dense, right column empty
        DensityMap::Grid {
            origin: Vec2::ZERO,
            cell_size: 5.0,
            width: 2,
            height: 1,
            values: vec![1.0, 0.0],
        }
    }

    #[test]
    fn test_value_at_grid() {
        let map = half_map();
        assert_eq!(map.value_at(Vec2::new(1.0, 2.0)), 1.0);
        assert_eq!(map.value_at(Vec2::new(7.0, 2.0)), 0.0);
        assert_eq!(map.value_at(Vec2::new(-1.0, 2.0)), 0.0);
        assert_eq!(map.value_at(Vec2::new(1.0, 6.0)), 0.0);
        assert_eq!(map.max_value(), 1.0);
    }

    #[test]
    fn test_mean_over() {
        let map = half_map();
        let b = Bounds::new(Vec2::ZERO, Vec2::new(10.0, 5.0));
        assert!((map.mean_over(&b) - 0.5).abs() < 1e-6);
        assert_eq!(DensityMap::Uniform(0.3).mean_over(&b), 0.3);
    }

    #[test]
    fn test_validate() {
        assert!(DensityMap::Uniform(0.5).validate().is_ok());
        assert!(DensityMap::Uniform(-0.5).validate().is_err());
        assert!(half_map().validate().is_ok());

        let bad = DensityMap::Grid {
            origin: Vec2::ZERO,
            cell_size: 1.0,
            width: 2,
            height: 2,
            values: vec![1.0],
        };
        assert!(matches!(bad.validate(), Err(ConfigError::DensityMap(_))));
    }

    #[test]
    fn test_zero_density_rejected() {
        assert!(matches!(
            DensityMap::Uniform(0.0).validate(),
            Err(ConfigError::NonPositive { field: "density", .. })
        ));
        let empty = DensityMap::Grid {
            origin: Vec2::ZERO,
            cell_size: 1.0,
            width: 2,
            height: 1,
            values: vec![0.0, 0.0],
        };
        assert!(matches!(empty.validate(), Err(ConfigError::DensityMap(_))));
    }

    #[test]
    fn test_sample_position_respects_density() {
        let map = half_map();
        let bounds = Bounds::new(Vec2::ZERO, Vec2::new(10.0, 5.0));
        let mut rng = Xoshiro256StarStar::seed_from_u64(5);
        for _ in 0..200 {
            let p = map.sample_position(&mut rng, &bounds, 64).unwrap();
            assert!(p.x < 5.0);
        }

        let empty = DensityMap::Uniform(0.0);
        assert!(empty.sample_position(&mut rng, &bounds, 10).is_none());
    }
}
