//! Base terrain - smooth fractal elevation laid down before craters

use fastnoise_lite::FastNoiseLite;
use glam::Vec2;

use super::rng::derive_seed;
use super::tile_store::{HeightQuery, TileStore};
use crate::config::BaseTerrainParams;

/// Fills a tile store with fractal noise mapped onto [min_elevation, max_elevation]
pub struct BaseTerrainGenerator {
    params: BaseTerrainParams,
    noise: FastNoiseLite,
}

impl BaseTerrainGenerator {
    pub fn new(seed: u64, params: BaseTerrainParams) -> Self {
        let noise = params.noise.to_fastnoise(derive_seed(seed, "base"));
        Self { params, noise }
    }

    /// Elevation at a world position
    pub fn height_at(&self, p: Vec2) -> f32 {
        let lo = self.params.min_elevation;
        let hi = self.params.max_elevation;
        if !self.params.enabled || hi <= lo {
            return lo;
        }
        let n = self.noise.get_noise_2d(p.x, p.y).clamp(-1.0, 1.0);
        lo + (n + 1.0) * 0.5 * (hi - lo)
    }

    /// Overwrite every sample of the store (parallel across tiles)
    pub fn fill(&self, store: &mut TileStore) {
        let extent = *store.extent();
        let bounds = extent.bounds();
        let changed = store.update_region(&bounds, |p, _| self.height_at(p));
        log::debug!(
            "[BASE] Filled {} tiles, elevation range [{}, {}]",
            changed.len(),
            self.params.min_elevation,
            self.params.max_elevation
        );
    }
}
