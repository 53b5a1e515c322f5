//! Per-step simulation parameters and their GPU uniform block.
//!
//! Every stage call takes a [`SimParams`] explicitly. The GPU backend packs
//! the same values, plus the tree shape and dispatch bookkeeping, into a
//! [`SimUniforms`] block bound as `params` in every kernel.
//!
//! # Example
//!
//! ```ignore
//! let params = SimParams::default()
//!     .with_delta_time(1.0 / 120.0)
//!     .with_physics(PhysicsConfig::default().with_bounce(0.8));
//! params.validate()?;
//! ```

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::emitter::EmitterConfig;
use crate::error::ConfigError;
use crate::spatial::SdfTree;

/// Forces and collision response.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Constant acceleration applied to every particle before mass scaling.
    pub gravity: Vec3,
    /// Reciprocal particle mass, baked into each slot at initialization.
    pub inv_mass: f32,
    /// Reflection damping coefficient.
    pub bounce: f32,
    /// Particle radius used to inflate the collision distance.
    pub radius: f32,
    /// Squared distance to a surface sample that counts as contact.
    pub collision_threshold: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            inv_mass: 1.0,
            bounce: 0.5,
            radius: 0.05,
            collision_threshold: 0.01,
        }
    }
}

impl PhysicsConfig {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_inv_mass(mut self, inv_mass: f32) -> Self {
        self.inv_mass = inv_mass;
        self
    }

    pub fn with_bounce(mut self, bounce: f32) -> Self {
        self.bounce = bounce;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_collision_threshold(mut self, threshold: f32) -> Self {
        self.collision_threshold = threshold;
        self
    }
}

/// Everything a stage needs to know about the current step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Seconds since the previous step.
    pub delta_time: f32,
    /// Step seed mixed into every particle seed.
    pub seed: u32,
    pub emitter: EmitterConfig,
    pub physics: PhysicsConfig,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            delta_time: 1.0 / 60.0,
            seed: 0,
            emitter: EmitterConfig::default(),
            physics: PhysicsConfig::default(),
        }
    }
}

impl SimParams {
    pub fn with_delta_time(mut self, delta_time: f32) -> Self {
        self.delta_time = delta_time;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_emitter(mut self, emitter: EmitterConfig) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_physics(mut self, physics: PhysicsConfig) -> Self {
        self.physics = physics;
        self
    }

    /// Check every parameter against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name, reason| Err(ConfigError::Invalid { name, reason });
        let e = &self.emitter;
        let p = &self.physics;

        if !self.delta_time.is_finite() || self.delta_time < 0.0 {
            return invalid("delta_time", "must be finite and non-negative");
        }
        if !(0.0..=1.0).contains(&e.spread) {
            return invalid("emitter.spread", "must lie in [0, 1]");
        }
        if !(0.0..=1.0).contains(&e.speed_randomness) {
            return invalid("emitter.speed_randomness", "must lie in [0, 1]");
        }
        if e.life_time.is_nan() || e.life_time <= 0.0 {
            return invalid("emitter.life_time", "must be positive");
        }
        if !e.position.is_finite() || !e.half_extents.is_finite() || !e.direction.is_finite() {
            return invalid("emitter", "vectors must be finite");
        }
        if !p.gravity.is_finite() {
            return invalid("physics.gravity", "must be finite");
        }
        if !p.inv_mass.is_finite() || p.inv_mass < 0.0 {
            return invalid("physics.inv_mass", "must be finite and non-negative");
        }
        if p.radius.is_nan() || p.radius < 0.0 {
            return invalid("physics.radius", "must be non-negative");
        }
        if p.collision_threshold.is_nan() || p.collision_threshold < 0.0 {
            return invalid("physics.collision_threshold", "must be non-negative");
        }
        Ok(())
    }
}

/// GPU uniform block. Field order follows WGSL alignment: every `vec3`
/// shares its 16-byte row with one trailing scalar.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimUniforms {
    pub emitter_position: Vec3,
    pub delta_time: f32,
    pub emitter_half_extents: Vec3,
    pub spread: f32,
    pub emitter_direction: Vec3,
    pub speed: f32,
    pub gravity: Vec3,
    pub speed_randomness: f32,
    pub life_time: f32,
    pub inv_mass: f32,
    pub bounce: f32,
    pub radius: f32,
    pub collision_threshold: f32,
    /// Node count; 0 or 1 disables collision.
    pub octree_size: u32,
    pub octree_depth: u32,
    pub capacity: u32,
    /// Invocations that should do work in the current dispatch.
    pub dispatch_count: u32,
    pub seed: u32,
    _pad0: u32,
    _pad1: u32,
}

impl SimUniforms {
    pub fn new(params: &SimParams, tree: &SdfTree, capacity: u32) -> Self {
        let e = &params.emitter;
        let p = &params.physics;
        Self {
            emitter_position: e.position,
            delta_time: params.delta_time,
            emitter_half_extents: e.half_extents,
            spread: e.spread,
            emitter_direction: e.direction,
            speed: e.speed,
            gravity: p.gravity,
            speed_randomness: e.speed_randomness,
            life_time: e.life_time,
            inv_mass: p.inv_mass,
            bounce: p.bounce,
            radius: p.radius,
            collision_threshold: p.collision_threshold,
            octree_size: tree.len() as u32,
            octree_depth: tree.depth(),
            capacity,
            dispatch_count: capacity,
            seed: params.seed,
            _pad0: 0,
            _pad1: 0,
        }
    }

    pub fn with_dispatch_count(mut self, count: u32) -> Self {
        self.dispatch_count = count;
        self
    }
}

/// WGSL struct matching [`SimUniforms`].
pub const UNIFORMS_WGSL: &str = r#"
struct SimUniforms {
    emitter_position: vec3<f32>,
    delta_time: f32,
    emitter_half_extents: vec3<f32>,
    spread: f32,
    emitter_direction: vec3<f32>,
    speed: f32,
    gravity: vec3<f32>,
    speed_randomness: f32,
    life_time: f32,
    inv_mass: f32,
    bounce: f32,
    radius: f32,
    collision_threshold: f32,
    octree_size: u32,
    octree_depth: u32,
    capacity: u32,
    dispatch_count: u32,
    seed: u32,
    _pad0: u32,
    _pad1: u32,
};
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Aabb, SdfNode};

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<SimUniforms>(), 112);
        assert_eq!(std::mem::offset_of!(SimUniforms, spread), 28);
        assert_eq!(std::mem::offset_of!(SimUniforms, gravity), 48);
        assert_eq!(std::mem::offset_of!(SimUniforms, life_time), 64);
        assert_eq!(std::mem::offset_of!(SimUniforms, octree_size), 84);
        assert_eq!(std::mem::offset_of!(SimUniforms, dispatch_count), 96);
    }

    #[test]
    fn test_defaults_are_valid() {
        SimParams::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut params = SimParams::default();
        params.emitter.spread = 1.5;
        assert!(matches!(
            params.validate(),
            Err(ConfigError::Invalid { name: "emitter.spread", .. })
        ));

        let params = SimParams::default().with_delta_time(f32::NAN);
        assert!(matches!(
            params.validate(),
            Err(ConfigError::Invalid { name: "delta_time", .. })
        ));

        let params = SimParams::default().with_physics(PhysicsConfig::default().with_radius(-1.0));
        assert!(matches!(
            params.validate(),
            Err(ConfigError::Invalid { name: "physics.radius", .. })
        ));

        let params = SimParams::default().with_emitter(EmitterConfig::default().with_life_time(0.0));
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_uniforms_carry_tree_shape() {
        let root = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let mut nodes = vec![SdfNode::branch(root, &[1])];
        nodes.push(SdfNode::leaf(root.octants()[0], Vec3::ZERO));
        let tree = SdfTree::from_nodes(nodes).unwrap();

        let params = SimParams::default().with_seed(11);
        let u = SimUniforms::new(&params, &tree, 256).with_dispatch_count(7);
        assert_eq!(u.octree_size, 2);
        assert_eq!(u.octree_depth, 1);
        assert_eq!(u.capacity, 256);
        assert_eq!(u.dispatch_count, 7);
        assert_eq!(u.seed, 11);
        assert_eq!(u.gravity, params.physics.gravity);
    }
}
