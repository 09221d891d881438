//! Seeded random draws for procedural generation
//!
//! Every generation stage gets its own generator derived from the world seed
//! and a stable stage name, so adding draws to one stage never shifts the
//! sequence another stage sees.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;

/// Random number generator trait for terrain generation
pub trait TerrainRng {
    /// Generate random f32 in [0.0, 1.0)
    fn gen_f32(&mut self) -> f32;

    /// Check if random value is less than probability threshold
    fn check_probability(&mut self, probability: f32) -> bool {
        self.gen_f32() < probability
    }

    /// Uniform f32 in [min, max)
    fn gen_range_f32(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.gen_f32()
    }

    /// Uniform angle in [0, 2π)
    fn gen_angle(&mut self) -> f32 {
        self.gen_f32() * std::f32::consts::TAU
    }

    /// Draw from a power law `p(r) ∝ r^-exponent` truncated to [min, max]
    ///
    /// Larger exponents favour small values.
    fn gen_power_law(&mut self, min: f32, max: f32, exponent: f32) -> f32 {
        if max <= min {
            return min;
        }
        let u = self.gen_f32();
        let value = if (exponent - 1.0).abs() < 1e-6 {
            min * (max / min).powf(u)
        } else {
            let a = 1.0 - exponent;
            let lo = min.powf(a);
            let hi = max.powf(a);
            (lo + u * (hi - lo)).powf(1.0 / a)
        };
        value.clamp(min, max)
    }

    /// Integer count with the given expectation: floor plus a Bernoulli draw
    /// for the fractional part
    fn gen_count(&mut self, expected: f32) -> usize {
        if expected.is_nan() || expected <= 0.0 {
            return 0;
        }
        let whole = expected.floor();
        let extra = self.check_probability(expected - whole) as usize;
        whole as usize + extra
    }
}

impl<T: ?Sized + rand::Rng> TerrainRng for T {
    fn gen_f32(&mut self) -> f32 {
        rand::Rng::r#gen(self)
    }
}

/// Stable per-stage seed (FNV-1a over the stage name, mixed with SplitMix64)
pub fn derive_seed(master: u64, stage: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in stage.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    splitmix64(master ^ hash)
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Generator for one stage of world generation
pub fn stage_rng(master: u64, stage: &str) -> Xoshiro256StarStar {
    Xoshiro256StarStar::seed_from_u64(derive_seed(master, stage))
}
