mod config;
mod drive;

use anyhow::{Context, Result};
use clap::Parser;
use regolith_core::world::{TerrainWorld, WorldSnapshot, export_annotations};
use regolith_core::{HeightQuery, TerrainConfig};

use crate::config::AppConfig;
use crate::drive::ScriptedDrive;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host config file name, without the .ron extension
    #[arg(long, default_value = "regolith")]
    config: String,

    /// Terrain preset: lunaryard, flat, default
    #[arg(long)]
    preset: Option<String>,

    /// RON terrain config (overrides --preset)
    #[arg(long)]
    terrain: Option<String>,

    /// World seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of ticks to simulate
    #[arg(long)]
    ticks: Option<u64>,

    /// Drive the scripted rover track while ticking
    #[arg(long)]
    drive: bool,

    /// Restore a saved world snapshot instead of building
    #[arg(long)]
    load: Option<String>,

    /// Save a world snapshot after the run
    #[arg(long)]
    save: Option<String>,

    /// Export crater and rock annotations (RON) after the run
    #[arg(long)]
    annotations: Option<String>,

    /// Write the selected terrain config as RON and exit
    #[arg(long)]
    dump_terrain: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(preset) = &self.preset {
            config.world.preset = preset.clone();
        }
        if self.terrain.is_some() {
            config.world.terrain_file = self.terrain.clone();
        }
        if let Some(seed) = self.seed {
            config.world.seed = seed;
        }
        if let Some(ticks) = self.ticks {
            config.run.ticks = ticks;
        }
        if self.drive {
            config.drive.enabled = true;
        }
        if self.save.is_some() {
            config.output.save = self.save.clone();
        }
        if self.annotations.is_some() {
            config.output.annotations = self.annotations.clone();
        }
    }
}

fn terrain_config(app: &AppConfig) -> Result<TerrainConfig> {
    match &app.world.terrain_file {
        Some(path) => TerrainConfig::from_file(path),
        None => TerrainConfig::preset(&app.world.preset)
            .with_context(|| format!("Unknown terrain preset '{}'", app.world.preset)),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut app = AppConfig::load_from(&args.config)?;
    args.apply(&mut app);

    let terrain = terrain_config(&app)?;
    if let Some(path) = &args.dump_terrain {
        terrain.to_file(path)?;
        println!("Wrote terrain config '{}' to {}", terrain.name, path);
        return Ok(());
    }

    let mut world = match &args.load {
        Some(path) => WorldSnapshot::load(path)?.restore()?,
        None => TerrainWorld::build(app.world.seed, terrain).context("Failed to build terrain")?,
    };

    let extent = *world.extent();
    println!(
        "World '{}' seed {}: {:.1} x {:.1} m, {} tiles",
        world.config().name,
        world.seed(),
        extent.size().x,
        extent.size().y,
        extent.tile_count()
    );
    println!("  {} craters, {} rocks", world.craters().len(), world.rock_count());
    let shortfall = world.rock_shortfall();
    if !shortfall.is_empty() {
        println!(
            "  rock shortfall: {} of {} missing in {} cells",
            shortfall.missing(),
            shortfall.target,
            shortfall.cells.len()
        );
    }

    let drive = app
        .drive
        .enabled
        .then(|| ScriptedDrive::new(app.drive.clone(), world.deformation()));
    if let Some(drive) = &drive {
        log::info!("[DRIVE] Wheel sinkage {:.4} m per contact", drive.wheel_depth());
    }

    let mut applied = 0;
    let mut ignored = 0;
    let start_tick = world.tick_count();
    for i in 0..app.run.ticks {
        let t = (start_tick + i) as f64 * app.run.tick_seconds;
        let contacts = drive.as_ref().map(|d| d.contacts_at(t)).unwrap_or_default();
        let report = world.tick(&contacts);
        applied += report.contacts_applied;
        ignored += report.contacts_ignored;
    }
    if app.run.ticks > 0 {
        println!(
            "  {} ticks: {} contacts applied, {} ignored, {} patches active",
            app.run.ticks,
            applied,
            ignored,
            world.deformation().active_count()
        );
    }
    if let Some(drive) = &drive {
        let p = drive.center_at(world.tick_count() as f64 * app.run.tick_seconds);
        match world.height_and_normal(p) {
            Ok((h, n)) => println!(
                "  rover at ({:.2}, {:.2}): ground {:.4} m, tilt {:.1} deg",
                p.x,
                p.y,
                h,
                n.z.clamp(-1.0, 1.0).acos().to_degrees()
            ),
            Err(e) => println!("  rover left the terrain: {e}"),
        }
    }

    if let Some(path) = &app.output.save {
        WorldSnapshot::capture(&world).save(path)?;
        println!("Saved snapshot to {path}");
    }
    if let Some(path) = &app.output.annotations {
        export_annotations(&world, path)?;
        println!("Exported annotations to {path}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriveConfig;

    #[test]
    fn test_flags_override_layered_config() {
        let args = Args::parse_from([
            "regolith", "--preset", "flat", "--seed", "9", "--drive", "--ticks", "5",
        ]);
        let mut app = AppConfig::default();
        args.apply(&mut app);
        assert_eq!(app.world.preset, "flat");
        assert_eq!(app.world.seed, 9);
        assert_eq!(app.run.ticks, 5);
        assert!(app.drive.enabled);
        assert!(app.output.save.is_none());
    }

    #[test]
    fn test_unknown_preset_is_an_error() {
        let mut app = AppConfig::default();
        app.world.preset = "mars".to_string();
        assert!(terrain_config(&app).is_err());
    }

    #[test]
    fn test_drive_over_flat_world_leaves_ruts() {
        let mut app = AppConfig::default();
        app.world.preset = "flat".to_string();
        let mut world = TerrainWorld::build(1, terrain_config(&app).unwrap()).unwrap();
        let drive = ScriptedDrive::new(
            DriveConfig {
                start_x: 3.0,
                start_y: 5.0,
                ..DriveConfig::default()
            },
            world.deformation(),
        );
        for i in 0..10 {
            world.tick(&drive.contacts_at(i as f64 * 0.1));
        }
        let rut = drive.contacts_at(0.0)[0].footprint.center();
        assert!(world.get_elevation(rut).unwrap() < 0.0);
    }
}
