//! Scripted rover track - turns a straight drive into per-tick wheel contacts

use glam::Vec2;
use regolith_core::world::{ContactEvent, DeformationEngine};

use crate::config::DriveConfig;

pub struct ScriptedDrive {
    config: DriveConfig,
    /// Sinkage per wheel, from the engine's soil model
    wheel_depth: f32,
}

impl ScriptedDrive {
    pub fn new(config: DriveConfig, engine: &DeformationEngine) -> Self {
        let area = std::f32::consts::PI * config.contact_radius * config.contact_radius;
        let wheel_depth = engine.depth_from_load(config.wheel_load, area);
        Self { config, wheel_depth }
    }

    pub fn wheel_depth(&self) -> f32 {
        self.wheel_depth
    }

    /// Rover centre at simulation time `t`
    pub fn center_at(&self, t: f64) -> Vec2 {
        let c = &self.config;
        let heading = Vec2::from_angle(c.heading_deg.to_radians());
        Vec2::new(c.start_x, c.start_y) + heading * c.speed * t as f32
    }

    /// One contact per wheel, ordered left side first then front to back
    pub fn contacts_at(&self, t: f64) -> Vec<ContactEvent> {
        let c = &self.config;
        let forward = Vec2::from_angle(c.heading_deg.to_radians());
        let left = forward.perp();
        let center = self.center_at(t);
        let n = c.wheels_per_side;
        let mut contacts = Vec::with_capacity(2 * n as usize);
        for side in [0.5f32, -0.5] {
            for w in 0..n {
                let along = (0.5 * (n as f32 - 1.0) - w as f32) * c.wheel_base;
                let p = center + forward * along + left * side * c.track_width;
                contacts.push(ContactEvent::disk(p, c.contact_radius, self.wheel_depth, t));
            }
        }
        contacts
    }
}
