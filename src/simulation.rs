//! Simulation backends and the per-step driver.
//!
//! A [`Backend`] owns the particle pool and the spatial index and exposes
//! the three stages in the order the host must call them:
//!
//! 1. [`Backend::initialize`] once,
//! 2. [`Backend::request`] + [`Backend::emit`] for new particles,
//! 3. [`Backend::update`] once per step over the whole pool.
//!
//! [`CpuSimulation`] runs the stages with rayon, one logical worker per slot.
//! `GpuSimulation` (in [`crate::gpu`]) runs the same stages as compute
//! kernels.

use rayon::prelude::*;

use crate::emitter::emit_particle;
use crate::error::Result;
use crate::particle::Particle;
use crate::pool::ParticlePool;
use crate::spatial::SdfTree;
use crate::uniforms::SimParams;
use crate::update::{update_particle, SlotOutcome};
use crate::WORKGROUP_SIZE;

/// Counts gathered over one [`Backend::step`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Indices moved from the free collection to the request collection.
    pub requested: u32,
    /// Slots spawned by the emission stage.
    pub emitted: u32,
    /// Slots that ran out of life and went back to the free collection.
    pub expired: u32,
}

/// Common interface of the CPU and GPU pipelines.
pub trait Backend {
    /// Number of particle slots.
    fn capacity(&self) -> u32;

    /// Reset every slot and fill the free collection. Must run before the
    /// first step; running it again discards all live particles.
    fn initialize(&mut self, params: &SimParams) -> Result<()>;

    /// Queue up to `count` free slots for emission. Returns how many were queued.
    fn request(&mut self, count: u32) -> Result<u32>;

    /// Spawn every pending request. Returns how many slots were spawned.
    fn emit(&mut self, params: &SimParams) -> Result<u32>;

    /// Advance the whole pool by `params.delta_time`. Returns how many
    /// slots expired.
    fn update(&mut self, params: &SimParams) -> Result<u32>;

    /// Current contents of every slot.
    fn particles(&mut self) -> Result<Vec<Particle>>;

    /// Current members of the free collection, in no particular order.
    fn free_indices(&mut self) -> Result<Vec<u32>>;

    /// Request `spawn` particles, emit them, then update the pool.
    fn step(&mut self, spawn: u32, params: &SimParams) -> Result<StepStats> {
        let requested = self.request(spawn)?;
        let emitted = self.emit(params)?;
        let expired = self.update(params)?;
        let stats = StepStats {
            requested,
            emitted,
            expired,
        };
        log::debug!("step: {stats:?}");
        Ok(stats)
    }
}

/// Multi-threaded CPU pipeline.
#[derive(Debug)]
pub struct CpuSimulation {
    pool: ParticlePool,
    tree: SdfTree,
}

impl CpuSimulation {
    pub fn new(capacity: u32, tree: SdfTree) -> Result<Self> {
        let pool = ParticlePool::new(capacity)?;
        log::info!(
            "CPU backend: {} slots, {} threads, tree of {} nodes (depth {})",
            capacity,
            rayon::current_num_threads(),
            tree.len(),
            tree.depth()
        );
        Ok(Self { pool, tree })
    }

    pub fn pool(&self) -> &ParticlePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ParticlePool {
        &mut self.pool
    }

    pub fn tree(&self) -> &SdfTree {
        &self.tree
    }

    /// Live particle count.
    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }
}

impl Backend for CpuSimulation {
    fn capacity(&self) -> u32 {
        self.pool.capacity()
    }

    fn initialize(&mut self, params: &SimParams) -> Result<()> {
        self.pool.initialize(params.physics.inv_mass);
        Ok(())
    }

    fn request(&mut self, count: u32) -> Result<u32> {
        Ok(self.pool.request(count))
    }

    fn emit(&mut self, params: &SimParams) -> Result<u32> {
        let (particles, _, requests) = self.pool.parts_mut();
        let pending = requests.len();

        // Each popped index is owned by exactly one worker, so the spawned
        // records can be scattered back without conflicts.
        let spawned: Vec<(usize, Particle)> = {
            let slots: &[Particle] = particles;
            (0..pending)
                .into_par_iter()
                .with_min_len(WORKGROUP_SIZE as usize)
                .filter_map(|_| requests.pop())
                .filter_map(|index| {
                    let slot = slots.get(index as usize)?;
                    Some((index as usize, emit_particle(index, slot, params)))
                })
                .collect()
        };

        for &(index, particle) in &spawned {
            particles[index] = particle;
        }
        Ok(spawned.len() as u32)
    }

    fn update(&mut self, params: &SimParams) -> Result<u32> {
        let (particles, free, _) = self.pool.parts_mut();
        let tree = &self.tree;

        let expired = particles
            .par_iter_mut()
            .enumerate()
            .with_min_len(WORKGROUP_SIZE as usize)
            .map(|(index, particle)| match update_particle(particle, tree, params) {
                SlotOutcome::Expired => {
                    if let Err(e) = free.push(index as u32) {
                        log::error!("update: {e}");
                    }
                    1
                }
                SlotOutcome::Idle | SlotOutcome::Simulated => 0,
            })
            .sum();
        Ok(expired)
    }

    fn particles(&mut self) -> Result<Vec<Particle>> {
        Ok(self.pool.particles().to_vec())
    }

    fn free_indices(&mut self) -> Result<Vec<u32>> {
        Ok(self.pool.free_snapshot()?)
    }
}
