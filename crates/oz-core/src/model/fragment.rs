//! Lightweight debris particles (§3: "Fragment"). Fragments do not collide
//! with each other or with dynamics; only with static geometry and terrain.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FragClass {
    pub name: String,
    pub lifetime: f32,
    pub mass: f32,
    /// Velocity fraction kept along the impact normal on a solid hit.
    /// `0.0` (the default) means the fragment expires on its first solid
    /// hit rather than bouncing (§4.D: "bounce per class restitution or
    /// expire on first solid hit").
    #[serde(default)]
    pub restitution: f32,
}

#[derive(Debug, Clone)]
pub struct Fragment {
    pub class: Arc<FragClass>,
    pub position: Vec3,
    pub velocity: Vec3,
    pub life: f32,
}

impl Fragment {
    pub fn new(class: Arc<FragClass>, position: Vec3, velocity: Vec3) -> Self {
        let life = class.lifetime;
        Self {
            class,
            position,
            velocity,
            life,
        }
    }

    /// `true` once the fragment's lifetime has expired and it should be
    /// freed from its pool.
    pub fn tick_expired(&mut self, tick: f32) -> bool {
        self.life -= tick;
        self.life <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_expires_after_its_lifetime() {
        let class = Arc::new(FragClass {
            name: "spark".into(),
            lifetime: 0.1,
            mass: 0.01,
        });
        let mut f = Fragment::new(class, Vec3::ZERO, Vec3::ZERO);
        assert!(!f.tick_expired(1.0 / 60.0));
        assert!(f.tick_expired(1.0));
    }
}
