//! Host configuration with layered loading
//!
//! Configuration is loaded from multiple sources (lowest to highest priority):
//! 1. Compiled defaults
//! 2. `regolith.ron` file (if exists)
//! 3. Environment variables prefixed with `REGOLITH_`
//!
//! Example environment variable: `REGOLITH_DRIVE__SPEED=0.5`
//!
//! Command-line flags are applied on top in `main`.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Main host configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub world: WorldSection,

    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub drive: DriveConfig,

    #[serde(default)]
    pub output: OutputSection,
}

/// Which terrain to build
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldSection {
    /// Built-in preset: lunaryard, flat, default
    pub preset: String,
    /// RON terrain config; overrides the preset when set
    #[serde(default)]
    pub terrain_file: Option<String>,
    pub seed: u64,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            preset: "lunaryard".to_string(),
            terrain_file: None,
            seed: 42,
        }
    }
}

/// Simulation loop settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSection {
    /// Ticks to simulate after the build
    pub ticks: u64,
    /// Simulated seconds per tick
    pub tick_seconds: f64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            ticks: 0,
            tick_seconds: 0.1,
        }
    }
}

/// Scripted straight-line rover drive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriveConfig {
    pub enabled: bool,
    /// Rover centre at t = 0 (m)
    pub start_x: f32,
    pub start_y: f32,
    /// Heading, counter-clockwise from +x (degrees)
    pub heading_deg: f32,
    /// Forward speed (m/s)
    pub speed: f32,
    /// Distance between left and right wheel tracks (m)
    pub track_width: f32,
    /// Wheels per side
    pub wheels_per_side: u32,
    /// Distance between consecutive wheels on one side (m)
    pub wheel_base: f32,
    /// Radius of a wheel's ground contact patch (m)
    pub contact_radius: f32,
    /// Normal load carried by each wheel (N)
    pub wheel_load: f32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_x: 2.0,
            start_y: 10.0,
            heading_deg: 0.0,
            speed: 0.3,
            track_width: 0.6,
            wheels_per_side: 2,
            wheel_base: 0.5,
            contact_radius: 0.08,
            // 60 kg rover, 4 wheels, lunar gravity
            wheel_load: 24.3,
        }
    }
}

/// Files written after the run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OutputSection {
    /// World snapshot path (.rgs)
    #[serde(default)]
    pub save: Option<String>,
    /// Ground-truth annotations path (.ron)
    #[serde(default)]
    pub annotations: Option<String>,
}

impl AppConfig {
    /// Load configuration with layered priority:
    /// 1. Compiled defaults (lowest priority)
    /// 2. `regolith.ron` file (if exists)
    /// 3. Environment variables prefixed with `REGOLITH_` (highest priority)
    pub fn load() -> Result<Self> {
        Self::load_from("regolith")
    }

    /// Same as [`AppConfig::load`] with a different config file name
    pub fn load_from(file: &str) -> Result<Self> {
        let builder = Config::builder()
            // Layer 1: Compiled defaults
            .set_default("world.preset", "lunaryard")?
            .set_default("world.seed", 42_i64)?
            .set_default("run.ticks", 0_i64)?
            .set_default("run.tick_seconds", 0.1)?
            .set_default("drive.enabled", false)?
            .set_default("drive.start_x", 2.0)?
            .set_default("drive.start_y", 10.0)?
            .set_default("drive.heading_deg", 0.0)?
            .set_default("drive.speed", 0.3)?
            .set_default("drive.track_width", 0.6)?
            .set_default("drive.wheels_per_side", 2_i64)?
            .set_default("drive.wheel_base", 0.5)?
            .set_default("drive.contact_radius", 0.08)?
            .set_default("drive.wheel_load", 24.3)?
            // Layer 2: Config file (optional, won't error if missing)
            .add_source(
                File::with_name(file)
                    .format(config::FileFormat::Ron)
                    .required(false),
            )
            // Layer 3: Environment variables (REGOLITH_RUN__TICKS, etc.)
            .add_source(Environment::with_prefix("REGOLITH").separator("__"));

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
