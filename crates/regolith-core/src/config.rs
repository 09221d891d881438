//! Terrain configuration - serializable parameters for building a world
//!
//! A [`TerrainConfig`] captures everything except the seed: same config +
//! different seed = different world. Configs round-trip through RON so
//! presets can live on disk next to the simulation assets.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::world::craters::CraterProfile;
use crate::world::density::DensityMap;

/// Complete terrain configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    /// Display name for this configuration
    pub name: String,

    /// World extent and sampling
    pub world: WorldParams,

    /// Smooth base elevation before craters
    pub base: BaseTerrainParams,

    /// Crater size bands and profile
    pub craters: CraterParams,

    /// Rock field scattering
    pub rocks: RockParams,

    /// Wheel contact response
    pub deformation: DeformationParams,

    /// Mesh level-of-detail settings
    pub mesh: MeshParams,
}

/// World extent and sample layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldParams {
    /// World width in meters (x axis)
    pub size_x: f32,
    /// World depth in meters (y axis)
    pub size_y: f32,
    /// Sample spacing in meters
    pub resolution: f32,
    /// Sample intervals per tile side
    pub tile_samples: u32,
}

/// Base terrain noise parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseTerrainParams {
    pub enabled: bool,
    /// Elevation mapped to noise value -1
    pub min_elevation: f32,
    /// Elevation mapped to noise value +1
    pub max_elevation: f32,
    pub noise: NoiseLayerConfig,
}

/// One crater size band: expected count per m² and the radius range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraterBand {
    pub density: f32,
    pub min_radius: f32,
    pub max_radius: f32,
}

/// Crater stamping parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraterParams {
    pub enabled: bool,
    /// Size bands, stamped largest first in list order
    pub bands: Vec<CraterBand>,
    /// Power-law exponent of the radius distribution within a band
    pub size_exponent: f32,
    /// Minor/major axis ratio range of the crater ellipse (1 = circular)
    pub min_xy_ratio: f32,
    pub max_xy_ratio: f32,
    /// Rotate ellipses by a random angle
    pub random_rotation: bool,
    /// Fresh crater depth as a fraction of the diameter (default: 0.2)
    pub depth_to_diameter: f32,
    /// Fresh rim height as a fraction of the depth
    pub rim_height_ratio: f32,
    /// Rim falloff width as a fraction of the radius
    pub rim_width: f32,
    pub profile: CraterProfile,
    /// Erosion factor range (0 = fresh, 1 = heavily degraded)
    pub min_age: f32,
    pub max_age: f32,
    /// Overlapping depressions never exceed this multiple of the deepest
    /// single contribution at a sample
    pub overlap_depth_limit: f32,
    /// Redraws allowed per crater before it is dropped
    pub max_attempts: u32,
    /// Optional spatial weighting of crater centres
    pub density_map: Option<DensityMap>,
}

/// Rock scattering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RockParams {
    pub enabled: bool,
    /// Expected rocks per m²
    pub density: DensityMap,
    /// Footprint radius range in meters
    pub min_radius: f32,
    pub max_radius: f32,
    /// Power-law exponent of the radius distribution
    pub size_exponent: f32,
    /// Steepest slope a rock may rest on, in degrees
    pub slope_limit_deg: f32,
    /// Allowed footprint overlap in meters
    pub overlap_tolerance: f32,
    pub max_attempts_per_cell: u32,
    /// Scatter cell side in meters
    pub cell_size: f32,
    /// Random tilt on top of the slope alignment, in degrees
    pub max_tilt_deg: f32,
    /// Non-uniform scale jitter per axis (0 = uniform)
    pub scale_jitter: f32,
    /// Fraction of the rock height sunk below the surface
    pub embed_fraction: f32,
    pub archetypes: Vec<RockArchetype>,
}

/// Rock shape family, picked by weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RockArchetype {
    pub name: String,
    pub weight: f32,
}

/// Deformation engine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeformationParams {
    pub enabled: bool,
    /// Multiplier applied to contact depth hints
    pub sink_scale: f32,
    /// Width of the smoothstep edge as a fraction of the footprint size
    pub edge_fraction: f32,
    /// Fraction of freshness lost per tick
    pub decay_rate: f32,
    /// Patches below this freshness are retired
    pub negligible_magnitude: f32,
    /// Contacts within this many seconds of a patch merge into it
    pub merge_window: f64,
    /// Upper bound on the sink of a single contact in meters
    pub max_depth_per_contact: f32,
    /// Bekker soil modulus for load-driven sinkage (N/m^(n+2))
    pub soil_stiffness: f32,
    /// Bekker sinkage exponent n
    pub sinkage_exponent: f32,
}

/// Mesh builder parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshParams {
    /// Number of LOD levels (level k samples every 2^k intervals)
    pub lod_levels: u8,
    /// Spread the initial build over ticks (None = build everything at once)
    pub initial_tiles_per_tick: Option<usize>,
}

/// Reusable noise layer configuration
///
/// Abstracts FastNoiseLite settings for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseLayerConfig {
    /// Offset added to the stage seed for this layer
    pub seed_offset: i32,
    /// Noise algorithm type
    pub noise_type: NoiseTypeConfig,
    /// Base frequency in cycles per meter (lower = larger features)
    pub frequency: f32,
    /// Fractal combination type
    pub fractal_type: FractalTypeConfig,
    /// Number of fractal octaves (1-8)
    pub octaves: u8,
    /// Frequency multiplier per octave (default: 2.0)
    pub lacunarity: f32,
    /// Amplitude multiplier per octave / persistence (default: 0.5)
    pub gain: f32,
}

/// Noise algorithm types (maps to FastNoiseLite::NoiseType)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseTypeConfig {
    OpenSimplex2,
    OpenSimplex2S,
    Cellular,
    Perlin,
    ValueCubic,
    Value,
}

/// Fractal combination types (maps to FastNoiseLite::FractalType)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FractalTypeConfig {
    None,
    FBm,
    Ridged,
    PingPong,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            world: WorldParams::default(),
            base: BaseTerrainParams::default(),
            craters: CraterParams::default(),
            rocks: RockParams::default(),
            deformation: DeformationParams::default(),
            mesh: MeshParams::default(),
        }
    }
}

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            size_x: 20.0,
            size_y: 20.0,
            resolution: 0.1,
            tile_samples: 40,
        }
    }
}

impl Default for BaseTerrainParams {
    fn default() -> Self {
        Self {
            enabled: true,
            min_elevation: -0.5,
            max_elevation: 0.5,
            noise: NoiseLayerConfig::default(),
        }
    }
}

impl Default for CraterParams {
    fn default() -> Self {
        Self {
            enabled: true,
            bands: vec![
                CraterBand {
                    density: 0.025,
                    min_radius: 1.5,
                    max_radius: 2.5,
                },
                CraterBand {
                    density: 0.05,
                    min_radius: 0.75,
                    max_radius: 1.5,
                },
                CraterBand {
                    density: 0.5,
                    min_radius: 0.25,
                    max_radius: 0.5,
                },
            ],
            size_exponent: 2.0,
            min_xy_ratio: 0.85,
            max_xy_ratio: 1.0,
            random_rotation: true,
            depth_to_diameter: 0.15,
            rim_height_ratio: 0.25,
            rim_width: 0.5,
            profile: CraterProfile::Parabolic,
            min_age: 0.0,
            max_age: 0.8,
            overlap_depth_limit: 1.5,
            max_attempts: 20,
            density_map: None,
        }
    }
}

impl Default for RockParams {
    fn default() -> Self {
        Self {
            enabled: true,
            density: DensityMap::Uniform(0.1),
            min_radius: 0.05,
            max_radius: 0.3,
            size_exponent: 2.5,
            slope_limit_deg: 25.0,
            overlap_tolerance: 0.0,
            max_attempts_per_cell: 30,
            cell_size: 1.0,
            max_tilt_deg: 10.0,
            scale_jitter: 0.3,
            embed_fraction: 0.3,
            archetypes: vec![
                RockArchetype {
                    name: "angular".to_string(),
                    weight: 3.0,
                },
                RockArchetype {
                    name: "rounded".to_string(),
                    weight: 2.0,
                },
                RockArchetype {
                    name: "flat".to_string(),
                    weight: 1.0,
                },
            ],
        }
    }
}

impl Default for DeformationParams {
    fn default() -> Self {
        Self {
            enabled: true,
            sink_scale: 1.0,
            edge_fraction: 0.3,
            decay_rate: 0.05,
            negligible_magnitude: 0.01,
            merge_window: 0.5,
            max_depth_per_contact: 0.2,
            soil_stiffness: 8.2e5,
            sinkage_exponent: 1.0,
        }
    }
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            lod_levels: 3,
            initial_tiles_per_tick: None,
        }
    }
}

impl Default for NoiseLayerConfig {
    fn default() -> Self {
        Self {
            seed_offset: 0,
            noise_type: NoiseTypeConfig::OpenSimplex2,
            frequency: 0.08,
            fractal_type: FractalTypeConfig::FBm,
            octaves: 4,
            lacunarity: 2.0,
            gain: 0.5,
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl NoiseTypeConfig {
    /// Convert to fastnoise_lite::NoiseType
    pub fn to_fastnoise(&self) -> fastnoise_lite::NoiseType {
        match self {
            NoiseTypeConfig::OpenSimplex2 => fastnoise_lite::NoiseType::OpenSimplex2,
            NoiseTypeConfig::OpenSimplex2S => fastnoise_lite::NoiseType::OpenSimplex2S,
            NoiseTypeConfig::Cellular => fastnoise_lite::NoiseType::Cellular,
            NoiseTypeConfig::Perlin => fastnoise_lite::NoiseType::Perlin,
            NoiseTypeConfig::ValueCubic => fastnoise_lite::NoiseType::ValueCubic,
            NoiseTypeConfig::Value => fastnoise_lite::NoiseType::Value,
        }
    }
}

impl FractalTypeConfig {
    /// Convert to fastnoise_lite::FractalType
    pub fn to_fastnoise(&self) -> fastnoise_lite::FractalType {
        match self {
            FractalTypeConfig::None => fastnoise_lite::FractalType::None,
            FractalTypeConfig::FBm => fastnoise_lite::FractalType::FBm,
            FractalTypeConfig::Ridged => fastnoise_lite::FractalType::Ridged,
            FractalTypeConfig::PingPong => fastnoise_lite::FractalType::PingPong,
        }
    }
}

impl NoiseLayerConfig {
    /// Create a FastNoiseLite instance from this config
    pub fn to_fastnoise(&self, stage_seed: u64) -> fastnoise_lite::FastNoiseLite {
        let seed = (stage_seed as i32).wrapping_add(self.seed_offset);
        let mut noise = fastnoise_lite::FastNoiseLite::with_seed(seed);
        noise.set_noise_type(Some(self.noise_type.to_fastnoise()));
        noise.set_frequency(Some(self.frequency));
        noise.set_fractal_type(Some(self.fractal_type.to_fastnoise()));
        noise.set_fractal_octaves(Some(self.octaves as i32));
        noise.set_fractal_lacunarity(Some(self.lacunarity));
        noise.set_fractal_gain(Some(self.gain));
        noise
    }
}

// ============================================================================
// Validation
// ============================================================================

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn ordered(field: &'static str, min: f32, max: f32) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange { field, min, max })
    }
}

pub(crate) fn within(field: &'static str, value: f32, lo: f32, hi: f32) -> Result<(), ConfigError> {
    if value >= lo && value <= hi {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            lo,
            hi,
        })
    }
}

impl WorldParams {
    /// Tile side length in meters
    pub fn tile_span(&self) -> f32 {
        self.tile_samples as f32 * self.resolution
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("world.size_x", self.size_x)?;
        positive("world.size_y", self.size_y)?;
        positive("world.resolution", self.resolution)?;
        positive("world.tile_samples", self.tile_samples as f32)?;

        let span = self.tile_span();
        for (axis, extent) in [("x", self.size_x), ("y", self.size_y)] {
            let tiles = extent / span;
            if tiles.round() < 1.0 || (tiles - tiles.round()).abs() > 1e-3 {
                return Err(ConfigError::ResolutionMismatch {
                    axis,
                    extent,
                    resolution: self.resolution,
                    tile_samples: self.tile_samples,
                    tile_span: span,
                });
            }
        }
        Ok(())
    }
}

impl BaseTerrainParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ordered("base.elevation", self.min_elevation, self.max_elevation)?;
        positive("base.noise.frequency", self.noise.frequency)?;
        within("base.noise.octaves", self.noise.octaves as f32, 1.0, 8.0)
    }
}

impl CraterParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for band in &self.bands {
            positive("craters.bands.density", band.density)?;
            positive("craters.bands.min_radius", band.min_radius)?;
            ordered("craters.bands.radius", band.min_radius, band.max_radius)?;
        }
        non_negative("craters.size_exponent", self.size_exponent)?;
        positive("craters.min_xy_ratio", self.min_xy_ratio)?;
        within("craters.max_xy_ratio", self.max_xy_ratio, 0.0, 1.0)?;
        ordered("craters.xy_ratio", self.min_xy_ratio, self.max_xy_ratio)?;
        positive("craters.depth_to_diameter", self.depth_to_diameter)?;
        non_negative("craters.rim_height_ratio", self.rim_height_ratio)?;
        positive("craters.rim_width", self.rim_width)?;
        within("craters.min_age", self.min_age, 0.0, 1.0)?;
        within("craters.max_age", self.max_age, 0.0, 1.0)?;
        ordered("craters.age", self.min_age, self.max_age)?;
        within(
            "craters.overlap_depth_limit",
            self.overlap_depth_limit,
            1.0,
            f32::MAX,
        )?;
        positive("craters.max_attempts", self.max_attempts as f32)?;
        self.profile.validate()?;
        if let Some(map) = &self.density_map {
            map.validate()?;
        }
        Ok(())
    }
}

impl RockParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.density.validate()?;
        positive("rocks.min_radius", self.min_radius)?;
        ordered("rocks.radius", self.min_radius, self.max_radius)?;
        non_negative("rocks.size_exponent", self.size_exponent)?;
        if !(0.0..90.0).contains(&self.slope_limit_deg) {
            return Err(ConfigError::SlopeLimit {
                field: "rocks.slope_limit_deg",
                value: self.slope_limit_deg,
            });
        }
        non_negative("rocks.overlap_tolerance", self.overlap_tolerance)?;
        positive(
            "rocks.max_attempts_per_cell",
            self.max_attempts_per_cell as f32,
        )?;
        positive("rocks.cell_size", self.cell_size)?;
        if !(0.0..90.0).contains(&self.max_tilt_deg) {
            return Err(ConfigError::SlopeLimit {
                field: "rocks.max_tilt_deg",
                value: self.max_tilt_deg,
            });
        }
        within("rocks.scale_jitter", self.scale_jitter, 0.0, 0.99)?;
        within("rocks.embed_fraction", self.embed_fraction, 0.0, 1.0)?;

        let total_weight: f32 = self
            .archetypes
            .iter()
            .map(|a| a.weight.max(0.0))
            .sum();
        if self.archetypes.is_empty() || total_weight <= 0.0 {
            return Err(ConfigError::NoArchetypes);
        }
        Ok(())
    }
}

impl DeformationParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("deformation.sink_scale", self.sink_scale)?;
        within("deformation.edge_fraction", self.edge_fraction, 0.0, 1.0)?;
        positive("deformation.decay_rate", self.decay_rate)?;
        within("deformation.decay_rate", self.decay_rate, 0.0, 1.0)?;
        positive(
            "deformation.negligible_magnitude",
            self.negligible_magnitude,
        )?;
        non_negative("deformation.merge_window", self.merge_window as f32)?;
        positive(
            "deformation.max_depth_per_contact",
            self.max_depth_per_contact,
        )?;
        positive("deformation.soil_stiffness", self.soil_stiffness)?;
        positive("deformation.sinkage_exponent", self.sinkage_exponent)
    }
}

impl MeshParams {
    /// Interval divisor required by the coarsest level
    pub fn coarsest_step(&self) -> u32 {
        1u32 << self.lod_levels.saturating_sub(1).min(16)
    }

    pub fn validate(&self, world: &WorldParams) -> Result<(), ConfigError> {
        within("mesh.lod_levels", self.lod_levels as f32, 1.0, 8.0)?;
        let divisor = self.coarsest_step();
        if world.tile_samples % divisor != 0 {
            return Err(ConfigError::LodMismatch {
                tile_samples: world.tile_samples,
                levels: self.lod_levels,
                divisor,
            });
        }
        if let Some(budget) = self.initial_tiles_per_tick {
            positive("mesh.initial_tiles_per_tick", budget as f32)?;
        }
        Ok(())
    }
}

impl TerrainConfig {
    /// Check every section; the first problem found is returned
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.world.validate()?;
        if self.base.enabled {
            self.base.validate()?;
        }
        if self.craters.enabled {
            self.craters.validate()?;
        }
        if self.rocks.enabled {
            self.rocks.validate()?;
        }
        if self.deformation.enabled {
            self.deformation.validate()?;
        }
        self.mesh.validate(&self.world)
    }

    /// Load a configuration from a RON file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read terrain config {}", path.display()))?;
        ron::from_str(&text)
            .with_context(|| format!("Failed to parse terrain config {}", path.display()))
    }

    /// Write this configuration as pretty RON
    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .context("Failed to serialize terrain config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write terrain config {}", path.display()))
    }

    /// Look up a preset by name (as accepted on the command line)
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "lunaryard" => Some(Self::preset_lunaryard()),
            "flat" => Some(Self::preset_flat(10.0)),
            "default" => Some(Self::default()),
            _ => None,
        }
    }

    /// 20 m x 20 m test yard with the reference crater bands
    pub fn preset_lunaryard() -> Self {
        Self {
            name: "Lunaryard".to_string(),
            ..Self::default()
        }
    }

    /// Flat square world without base noise or craters
    ///
    /// Sampled at 5 cm in 2 m tiles; `size` is rounded to whole tiles.
    pub fn preset_flat(size: f32) -> Self {
        let world = WorldParams {
            resolution: 0.05,
            tile_samples: 40,
            ..WorldParams::default()
        };
        let tiles = (size / world.tile_span()).round().max(1.0);
        let size = tiles * world.tile_span();
        Self {
            name: "Flat".to_string(),
            world: WorldParams {
                size_x: size,
                size_y: size,
                ..world
            },
            base: BaseTerrainParams {
                enabled: false,
                min_elevation: 0.0,
                max_elevation: 0.0,
                ..BaseTerrainParams::default()
            },
            craters: CraterParams {
                enabled: false,
                ..CraterParams::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TerrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.craters.bands.len(), 3);
    }

    #[test]
    fn test_presets() {
        let yard = TerrainConfig::preset_lunaryard();
        assert_eq!(yard.name, "Lunaryard");
        assert_eq!(yard.world.size_x, 20.0);
        assert!(yard.validate().is_ok());

        let flat = TerrainConfig::preset_flat(10.0);
        assert!(!flat.base.enabled);
        assert!(!flat.craters.enabled);
        assert!(flat.validate().is_ok());
        assert!((flat.world.size_x - 10.0).abs() < 1e-4);
        // Odd sizes round to whole 2 m tiles
        assert!((TerrainConfig::preset_flat(7.2).world.size_x - 8.0).abs() < 1e-4);

        assert!(TerrainConfig::preset("lunaryard").is_some());
        assert!(TerrainConfig::preset("mars").is_none());
    }

    #[test]
    fn test_resolution_mismatch_rejected() {
        let mut config = TerrainConfig::default();
        config.world.size_x = 21.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ResolutionMismatch { axis: "x", .. })
        ));
    }

    #[test]
    fn test_non_positive_resolution_rejected() {
        let mut config = TerrainConfig::default();
        config.world.resolution = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "world.resolution",
                ..
            })
        ));
    }

    #[test]
    fn test_slope_limit_range() {
        let mut config = TerrainConfig::default();
        config.rocks.slope_limit_deg = 90.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SlopeLimit { .. })
        ));
        config.rocks.slope_limit_deg = -1.0;
        assert!(config.validate().is_err());
        config.rocks.slope_limit_deg = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_crater_band_rejected() {
        let mut config = TerrainConfig::default();
        config.craters.bands[0].min_radius = 3.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));

        // Disabled sections are not checked
        config.craters.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_density_rejected() {
        let mut config = TerrainConfig::default();
        config.rocks.density = DensityMap::Uniform(0.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { field: "density", .. })
        ));
        // No rocks is spelled `enabled: false`
        config.rocks.enabled = false;
        assert!(config.validate().is_ok());

        config.craters.bands[0].density = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "craters.bands.density",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_decay_rate_rejected() {
        let mut config = TerrainConfig::default();
        config.deformation.decay_rate = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "deformation.decay_rate",
                ..
            })
        ));
        config.deformation.decay_rate = 1.0;
        assert!(config.validate().is_ok());
        config.deformation.enabled = false;
        config.deformation.decay_rate = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lod_levels_must_divide_tile() {
        let mut config = TerrainConfig::default();
        config.mesh.lod_levels = 5; // needs multiples of 16, tile has 40
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LodMismatch { divisor: 16, .. })
        ));
    }

    #[test]
    fn test_empty_archetypes_rejected() {
        let mut config = TerrainConfig::default();
        config.rocks.archetypes.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoArchetypes));
    }

    #[test]
    fn test_noise_config_to_fastnoise() {
        let config = NoiseLayerConfig::default();
        let noise = config.to_fastnoise(42);
        let v = noise.get_noise_2d(1.5, 2.5);
        assert!((-1.0..=1.0).contains(&v));
    }

    #[test]
    fn test_ron_serialization() {
        let config = TerrainConfig::preset_lunaryard();
        let serialized = ron::to_string(&config).expect("Failed to serialize");
        let deserialized: TerrainConfig =
            ron::from_str(&serialized).expect("Failed to deserialize");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yard.ron");
        let config = TerrainConfig::preset_flat(8.0);
        config.to_file(&path).unwrap();
        let loaded = TerrainConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);

        assert!(TerrainConfig::from_file(dir.path().join("missing.ron")).is_err());
    }
}
