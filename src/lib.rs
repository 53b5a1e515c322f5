//! # sdf-particles
//!
//! A fixed-capacity particle pool with octree signed-distance collision,
//! runnable on the CPU (rayon) or the GPU (wgpu compute).
//!
//! ## Quick Start
//!
//! ```ignore
//! use sdf_particles::prelude::*;
//!
//! fn main() -> sdf_particles::Result<()> {
//!     let tree = SdfTree::load("scene.sdf")?;
//!     let params = SimParams::default().with_emitter(
//!         EmitterConfig::default()
//!             .with_position(Vec3::new(0.0, 1.0, 0.0))
//!             .with_spread(0.3),
//!     );
//!
//!     let mut sim = CpuSimulation::new(50_000, tree)?;
//!     sim.initialize(&params)?;
//!     for _ in 0..600 {
//!         sim.step(200, &params)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Pool lifecycle
//!
//! Every slot cycles `free → requested → active → free`. The free and request
//! collections are lock-free multisets; no index is ever lost or duplicated.
//! See [`pool`].
//!
//! ### Stages
//!
//! | Stage | Runs | Does |
//! |-------|------|------|
//! | initialize | once | reset slots, fill the free collection |
//! | request | host, per step | move free indices to the request collection |
//! | emit | per request | spawn a particle from the emitter volume |
//! | update | per slot | expire, integrate, collide |
//!
//! ### Collision
//!
//! The spatial index is a flattened octree whose leaves carry an
//! approximate closest surface point. Particles near a leaf's sample are
//! reflected off the leaf's normal; particles that leave the volume are
//! kept above a floor plane. See [`spatial`] and [`update`].
//!
//! ## Backends
//!
//! [`CpuSimulation`] and [`GpuSimulation`] implement [`Backend`] and produce
//! the same per-index emission values for a given step seed.

pub mod config;
pub mod emitter;
pub mod error;
pub mod gpu;
pub mod particle;
pub mod pool;
pub mod shader_utils;
pub mod simulation;
pub mod spatial;
pub mod time;
pub mod uniforms;
pub mod update;

pub use bytemuck;
pub use config::SimulationConfig;
pub use emitter::{emit_particle, EmitterConfig};
pub use error::{ConfigError, GpuError, PoolError, Result, SdfError, SimulationError};
pub use glam::Vec3;
pub use gpu::GpuSimulation;
pub use particle::Particle;
pub use pool::{IndexSet, ParticlePool};
pub use simulation::{Backend, CpuSimulation, StepStats};
pub use spatial::{Aabb, Located, SdfNode, SdfTree, NO_CHILD};
pub use time::StepClock;
pub use uniforms::{PhysicsConfig, SimParams, SimUniforms};
pub use update::{update_particle, SlotOutcome};

/// Threads per compute workgroup, and the minimum rayon batch on the CPU.
pub const WORKGROUP_SIZE: u32 = 64;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sdf_particles::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::SimulationConfig;
    pub use crate::emitter::EmitterConfig;
    pub use crate::gpu::GpuSimulation;
    pub use crate::particle::Particle;
    pub use crate::simulation::{Backend, CpuSimulation, StepStats};
    pub use crate::spatial::{Aabb, SdfNode, SdfTree};
    pub use crate::time::StepClock;
    pub use crate::uniforms::{PhysicsConfig, SimParams};
    pub use crate::Vec3;
}
