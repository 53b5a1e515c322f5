//! Emitter volume and the emission stage.
//!
//! The emission stage runs once per pending request. Each invocation pops
//! one index from the request collection and overwrites that slot with a
//! freshly spawned particle. Because a popped index belongs to exactly one
//! worker, the write never races.
//!
//! # Spawn rules
//!
//! | Quantity | Value |
//! |----------|-------|
//! | position | `position + (u3 - 0.5) * half_extents` |
//! | direction | `normalize(lerp(direction, (u3' - 0.5) * 2, spread))` |
//! | speed | `speed * (1 - u * speed_randomness)` |
//! | acceleration | `gravity * inv_mass` |
//! | life time | `life_time` |
//!
//! `u3`, `u3'` and `u` are independent uniforms drawn from the slot's seed,
//! see [`crate::shader_utils::particle_seed`].
//!
//! # Example
//!
//! ```ignore
//! // Upward fountain with a little sideways spray
//! let emitter = EmitterConfig::default()
//!     .with_position(Vec3::new(0.0, 0.5, 0.0))
//!     .with_direction(Vec3::Y)
//!     .with_spread(0.15)
//!     .with_speed(4.0);
//! ```

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::particle::Particle;
use crate::shader_utils::{particle_seed, rand, rand_vec3, SEED_DIRECTION, SEED_POSITION, SEED_SPEED};
use crate::uniforms::SimParams;

/// Where and how particles are spawned.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Center of the spawn box.
    pub position: Vec3,
    /// Half extents of the spawn box.
    pub half_extents: Vec3,
    /// Forward direction of emission. Need not be normalized.
    pub direction: Vec3,
    /// 0 = exactly `direction`, 1 = fully random within the unit cube.
    pub spread: f32,
    /// Base speed.
    pub speed: f32,
    /// Fraction of the speed that may be randomly removed, in `[0, 1]`.
    pub speed_randomness: f32,
    /// Seconds a new particle lives.
    pub life_time: f32,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            half_extents: Vec3::splat(0.1),
            direction: Vec3::Y,
            spread: 0.2,
            speed: 5.0,
            speed_randomness: 0.5,
            life_time: 4.0,
        }
    }
}

impl EmitterConfig {
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_half_extents(mut self, half_extents: Vec3) -> Self {
        self.half_extents = half_extents;
        self
    }

    pub fn with_direction(mut self, direction: Vec3) -> Self {
        self.direction = direction;
        self
    }

    /// Set the spread factor, clamped to `[0, 1]`.
    pub fn with_spread(mut self, spread: f32) -> Self {
        self.spread = spread.clamp(0.0, 1.0);
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Set the speed randomness, clamped to `[0, 1]`.
    pub fn with_speed_randomness(mut self, randomness: f32) -> Self {
        self.speed_randomness = randomness.clamp(0.0, 1.0);
        self
    }

    pub fn with_life_time(mut self, seconds: f32) -> Self {
        self.life_time = seconds;
        self
    }
}

/// Spawn a particle into slot `index`.
///
/// `slot` is the record currently stored there; only its reciprocal mass
/// survives, everything else is overwritten.
pub fn emit_particle(index: u32, slot: &Particle, params: &SimParams) -> Particle {
    let emitter = &params.emitter;
    let seed = particle_seed(index, params.seed);

    let jitter = rand_vec3(seed.wrapping_add(SEED_POSITION)) - Vec3::splat(0.5);
    let position = emitter.position + jitter * emitter.half_extents;

    let random_dir = (rand_vec3(seed.wrapping_add(SEED_DIRECTION)) - Vec3::splat(0.5)) * 2.0;
    let raw_dir = emitter.direction + (random_dir - emitter.direction) * emitter.spread;

    let speed = emitter.speed * (1.0 - rand(seed.wrapping_add(SEED_SPEED)) * emitter.speed_randomness);

    Particle {
        position,
        active: 1,
        velocity: raw_dir.normalize_or_zero() * speed,
        inv_mass: slot.inv_mass,
        acceleration: params.physics.gravity * slot.inv_mass,
        life_time: emitter.life_time,
    }
}

/// WGSL version of [`emit_particle`].
///
/// Needs `RANDOM_WGSL`, `MATH_WGSL`, `Particle` and `params` in scope.
pub fn emit_wgsl() -> String {
    format!(
        r#"
const SEED_POSITION: u32 = {SEED_POSITION}u;
const SEED_DIRECTION: u32 = {SEED_DIRECTION}u;
const SEED_SPEED: u32 = {SEED_SPEED}u;

fn emit_particle(index: u32, slot: Particle) -> Particle {{
    var p = slot;
    let seed = particle_seed(index);

    let jitter = rand_vec3(seed + SEED_POSITION) - vec3<f32>(0.5);
    p.position = params.emitter_position + jitter * params.emitter_half_extents;

    let random_dir = (rand_vec3(seed + SEED_DIRECTION) - vec3<f32>(0.5)) * 2.0;
    let raw_dir = params.emitter_direction + (random_dir - params.emitter_direction) * params.spread;

    let speed = params.speed * (1.0 - rand(seed + SEED_SPEED) * params.speed_randomness);

    p.velocity = safe_normalize(raw_dir) * speed;
    p.acceleration = params.gravity * slot.inv_mass;
    p.life_time = params.life_time;
    p.alive = 1u;
    return p;
}}
"#
    )
}
