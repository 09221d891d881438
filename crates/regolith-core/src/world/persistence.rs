//! World snapshots - save and restore a terrain world, export annotations
//!
//! A snapshot stores what cannot be regenerated: the seed and configuration,
//! rock edits, a re-randomized rock field, live deformation patches and the
//! per-sample deformation ledger. Base elevation, craters and the original
//! rock field are rebuilt deterministically on load.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::deformation::DeformationState;
use super::scatter::RockId;
use super::world::{SavedRocks, TerrainWorld};
use crate::config::TerrainConfig;

pub const SNAPSHOT_VERSION: u32 = 2;

/// Everything needed to recreate a world as it was
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub version: u32,
    pub seed: u64,
    pub config: TerrainConfig,
    /// Set when rocks were re-randomized after the build
    pub rocks: Option<SavedRocks>,
    pub removed_rocks: Vec<RockId>,
    pub rocks_visible: bool,
    pub deformation: DeformationState,
    pub tick: u64,
    pub created_at: String,
}

impl WorldSnapshot {
    pub fn capture(world: &TerrainWorld) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            seed: world.seed(),
            config: world.config().clone(),
            rocks: world.saved_rocks(),
            removed_rocks: world.removed_rocks().copied().collect(),
            rocks_visible: world.rocks_visible(),
            deformation: world.deformation().export_state(),
            tick: world.tick_count(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild the world and reapply rock edits and deformation
    pub fn restore(&self) -> Result<TerrainWorld> {
        if self.version != SNAPSHOT_VERSION {
            anyhow::bail!(
                "Unsupported snapshot version {} (expected {})",
                self.version,
                SNAPSHOT_VERSION
            );
        }
        let mut world = TerrainWorld::build(self.seed, self.config.clone())
            .context("Failed to rebuild world from snapshot")?;
        world
            .restore_runtime(self)
            .context("Failed to reapply runtime state from snapshot")?;
        Ok(world)
    }

    /// Write as lz4-compressed bincode
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let serialized = bincode_next::serde::encode_to_vec(self, bincode_next::config::standard())
            .context("Failed to serialize world snapshot")?;
        let compressed = lz4_flex::compress_prepend_size(&serialized);
        let compressed_size = compressed.len();

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, compressed).context("Failed to write snapshot temp file")?;
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;

        log::info!(
            "[SAVE] World seed {} at tick {} saved to {} ({} patches, {} bytes compressed)",
            self.seed,
            self.tick,
            path.display(),
            self.deformation.patches.len(),
            compressed_size
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let compressed = std::fs::read(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let serialized = lz4_flex::decompress_size_prepended(&compressed)
            .context("Failed to decompress snapshot")?;
        let (snapshot, _): (WorldSnapshot, _) =
            bincode_next::serde::decode_from_slice(&serialized, bincode_next::config::standard())
                .map_err(|e| anyhow::anyhow!("Failed to deserialize snapshot: {:?}", e))?;
        log::info!(
            "[SAVE] Loaded snapshot of seed {} (tick {}, saved {})",
            snapshot.seed,
            snapshot.tick,
            snapshot.created_at
        );
        Ok(snapshot)
    }
}

/// Write the world's crater and rock labels as pretty RON
pub fn export_annotations(world: &TerrainWorld, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let annotations = world.annotations();
    let text = ron::ser::to_string_pretty(&annotations, ron::ser::PrettyConfig::default())
        .context("Failed to serialize annotations")?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write annotations {}", path.display()))?;
    log::info!(
        "[SAVE] Exported {} craters and {} rocks to {}",
        annotations.craters.len(),
        annotations.rocks.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::deformation::{ContactEvent, Footprint};
    use crate::world::density::DensityMap;
    use crate::world::world::Annotations;
    use glam::Vec2;

    fn yard(size: f32) -> TerrainConfig {
        let mut config = TerrainConfig::preset_lunaryard();
        config.world.size_x = size;
        config.world.size_y = size;
        config
    }

    fn assert_same_elevation(a: &TerrainWorld, b: &TerrainWorld) {
        for (ta, tb) in a.store().tiles().zip(b.store().tiles()) {
            let bits_a: Vec<u32> = ta.samples().iter().map(|v| v.to_bits()).collect();
            let bits_b: Vec<u32> = tb.samples().iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits_a, bits_b, "tile {:?} differs", ta.coord);
        }
    }

    fn round_trip(world: &TerrainWorld) -> TerrainWorld {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.rgs");
        let snapshot = WorldSnapshot::capture(world);
        snapshot.save(&path).unwrap();
        let loaded = WorldSnapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);
        loaded.restore().unwrap()
    }

    #[test]
    fn test_snapshot_round_trip_restores_world() {
        let mut world = TerrainWorld::build(21, yard(8.0)).unwrap();
        world.tick(&[ContactEvent::disk(Vec2::new(4.0, 4.0), 0.2, 0.03, 0.0)]);
        let first_rock = world.rocks().next().map(|r| r.id);
        if let Some(id) = first_rock {
            world.remove_rock(id);
        }

        let restored = round_trip(&world);
        assert_eq!(restored.annotations(), world.annotations());
        assert_eq!(restored.deformation().active_count(), world.deformation().active_count());
        assert_eq!(restored.tick_count(), world.tick_count());
        assert_same_elevation(&restored, &world);
    }

    #[test]
    fn test_stacked_contacts_restore_bit_exact() {
        let mut world = TerrainWorld::build(21, yard(8.0)).unwrap();
        for k in 0..6 {
            // 10 s apart, so every pass stacks on the last
            world.tick(&[ContactEvent::disk(Vec2::new(4.03, 4.07), 0.2, 0.01, 10.0 * k as f64)]);
        }
        let restored = round_trip(&world);
        assert_same_elevation(&restored, &world);
        assert_eq!(
            restored.deformation().export_state(),
            world.deformation().export_state()
        );
    }

    #[test]
    fn test_rocks_randomized_after_deformation_restore() {
        let mut config = TerrainConfig::preset_flat(4.0);
        config.rocks.density = DensityMap::Uniform(2.0);
        let mut world = TerrainWorld::build(3, config).unwrap();

        // A steep pit over most of the world changes where rocks may go
        let pit = ContactEvent {
            footprint: Footprint::Polygon {
                vertices: vec![
                    Vec2::new(0.3, 0.3),
                    Vec2::new(3.7, 0.3),
                    Vec2::new(3.7, 3.7),
                    Vec2::new(0.3, 3.7),
                ],
            },
            depth_hint: 0.1,
            timestamp: 0.0,
        };
        world.tick(&[pit]);
        world.randomize_rocks(77);
        let restored = round_trip(&world);

        assert_eq!(restored.rock_seed(), Some(77));
        assert_eq!(restored.annotations().rocks, world.annotations().rocks);
        assert_eq!(restored.rock_shortfall(), world.rock_shortfall());
        assert_same_elevation(&restored, &world);
    }

    #[test]
    fn test_removal_after_randomize_restores() {
        let mut config = TerrainConfig::preset_flat(4.0);
        config.rocks.density = DensityMap::Uniform(1.0);
        let mut world = TerrainWorld::build(5, config).unwrap();
        world.randomize_rocks(9);
        let id = world.rocks().next().unwrap().id;
        world.remove_rock(id);

        let mut restored = round_trip(&world);
        assert!(restored.rock(id).is_none());
        assert!(restored.removed_rocks().eq(world.removed_rocks()));
        assert_eq!(restored.annotations(), world.annotations());

        // Restored index answers like the live one
        let center = Vec2::new(2.0, 2.0);
        let near: Vec<RockId> = world.rocks_near(center, 1.0).iter().map(|r| r.id).collect();
        let restored_near: Vec<RockId> =
            restored.rocks_near(center, 1.0).iter().map(|r| r.id).collect();
        assert_eq!(near, restored_near);
        assert_eq!(restored.remove_rock(id), None);
    }

    #[test]
    fn test_hidden_rocks_stay_hidden() {
        let mut world = TerrainWorld::build(2, TerrainConfig::preset_flat(4.0)).unwrap();
        world.set_rocks_visible(false);
        let restored = round_trip(&world);
        assert!(!restored.rocks_visible());
        assert!(restored.annotations().rocks.is_empty());
        assert_eq!(restored.rock_count(), world.rock_count());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let world = TerrainWorld::build(1, TerrainConfig::preset_flat(4.0)).unwrap();
        let mut snapshot = WorldSnapshot::capture(&world);
        snapshot.version = 99;
        assert!(snapshot.restore().is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WorldSnapshot::load(dir.path().join("missing.rgs")).is_err());
    }

    #[test]
    fn test_export_annotations_as_ron() {
        let world = TerrainWorld::build(2, TerrainConfig::preset_flat(4.0)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.ron");
        export_annotations(&world, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: Annotations = ron::from_str(&text).unwrap();
        assert_eq!(parsed, world.annotations());
    }
}
