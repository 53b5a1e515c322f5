//! Fixed-capacity particle pool and its lock-free index collections.
//!
//! A slot moves through one cycle, forever:
//!
//! ```text
//! free ──request──▶ pending ──emit──▶ active ──expire──▶ free
//! ```
//!
//! - The **free** collection holds indices of slots that are not simulating.
//! - The **request** collection holds indices waiting for the emission stage.
//!
//! Both are unordered multisets built on bounded lock-free MPMC queues, so
//! any number of workers can push or pop concurrently without losing or
//! duplicating an index. No FIFO/LIFO order is promised or relied upon.

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::prelude::*;

use crate::error::PoolError;
use crate::particle::Particle;
use crate::WORKGROUP_SIZE;

/// Atomic multiset of particle indices.
///
/// Push and pop are safe from many threads at once. Pop on an empty set
/// returns `None` instead of underflowing.
#[derive(Debug)]
pub struct IndexSet {
    tx: Sender<u32>,
    rx: Receiver<u32>,
    capacity: usize,
}

impl IndexSet {
    pub fn with_capacity(capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        let (tx, rx) = bounded(capacity);
        Ok(Self { tx, rx, capacity })
    }

    /// Append an index.
    ///
    /// Fails only when the set is full, which for a pool-sized set means an
    /// index was pushed twice.
    pub fn push(&self, index: u32) -> Result<(), PoolError> {
        self.tx
            .try_send(index)
            .map_err(|_| PoolError::Overflow { index })
    }

    /// Remove some index.
    pub fn pop(&self) -> Option<u32> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Current members. Needs exclusive access so nobody races the drain.
    pub fn snapshot(&mut self) -> Result<Vec<u32>, PoolError> {
        let members: Vec<u32> = self.rx.try_iter().collect();
        for &index in &members {
            self.push(index)?;
        }
        Ok(members)
    }
}

/// The particle array plus its free and request collections.
#[derive(Debug)]
pub struct ParticlePool {
    particles: Vec<Particle>,
    free: IndexSet,
    requests: IndexSet,
}

impl ParticlePool {
    /// Allocate `capacity` inactive slots. Call [`ParticlePool::initialize`]
    /// before the first step to fill the free collection.
    pub fn new(capacity: u32) -> Result<Self, PoolError> {
        let slots = capacity as usize;
        Ok(Self {
            particles: vec![Particle::default(); slots],
            free: IndexSet::with_capacity(slots)?,
            requests: IndexSet::with_capacity(slots)?,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.particles.len() as u32
    }

    /// Reset every slot to inactive at the origin and enqueue each index
    /// into the free collection exactly once.
    pub fn initialize(&mut self, inv_mass: f32) {
        self.free.clear();
        self.requests.clear();

        let free = &self.free;
        self.particles
            .par_iter_mut()
            .enumerate()
            .with_min_len(WORKGROUP_SIZE as usize)
            .for_each(|(index, particle)| {
                *particle = Particle::inactive(inv_mass);
                if let Err(e) = free.push(index as u32) {
                    log::error!("initialize: {e}");
                }
            });

        log::debug!("Pool initialized: {} free slots", self.free.len());
    }

    /// Move up to `count` indices from the free collection to the request
    /// collection. Returns how many moved.
    pub fn request(&self, count: u32) -> u32 {
        let available = count.min(self.free.len() as u32);
        let moved: u32 = (0..available)
            .into_par_iter()
            .map(|_| match self.free.pop() {
                Some(index) => match self.requests.push(index) {
                    Ok(()) => 1,
                    Err(e) => {
                        log::error!("request: {e}");
                        0
                    }
                },
                None => 0,
            })
            .sum();

        if moved < count {
            log::warn!(
                "Requested {count} particles but only {moved} slots were free"
            );
        }
        moved
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn free(&self) -> &IndexSet {
        &self.free
    }

    pub fn requests(&self) -> &IndexSet {
        &self.requests
    }

    /// Split borrow for the stages: exclusive slots, shared collections.
    pub(crate) fn parts_mut(&mut self) -> (&mut [Particle], &IndexSet, &IndexSet) {
        (&mut self.particles, &self.free, &self.requests)
    }

    pub fn active_count(&self) -> usize {
        self.particles.par_iter().filter(|p| p.is_active()).count()
    }

    pub fn free_snapshot(&mut self) -> Result<Vec<u32>, PoolError> {
        self.free.snapshot()
    }

    pub fn request_snapshot(&mut self) -> Result<Vec<u32>, PoolError> {
        self.requests.snapshot()
    }

    /// Verify that every slot is in exactly one state: active, free, or
    /// pending emission.
    pub fn check_lifecycle(&mut self) -> Result<(), PoolError> {
        let capacity = self.particles.len();
        let in_free = membership(
            self.free.snapshot()?,
            capacity,
            "duplicated in the free collection",
        )?;
        let in_requests = membership(
            self.requests.snapshot()?,
            capacity,
            "duplicated in the request collection",
        )?;

        for (index, particle) in self.particles.iter().enumerate() {
            let reason = match (particle.is_active(), in_free[index], in_requests[index]) {
                (_, true, true) => Some("present in both collections"),
                (true, true, _) => Some("active while in the free collection"),
                (true, _, true) => Some("active while pending emission"),
                (false, false, false) => Some("inactive but in neither collection"),
                _ => None,
            };
            if let Some(reason) = reason {
                return Err(PoolError::Invariant {
                    index: index as u32,
                    reason,
                });
            }
        }
        Ok(())
    }
}

fn membership(
    members: Vec<u32>,
    capacity: usize,
    duplicate: &'static str,
) -> Result<Vec<bool>, PoolError> {
    let mut seen = vec![false; capacity];
    for index in members {
        let slot = seen.get_mut(index as usize).ok_or(PoolError::Invariant {
            index,
            reason: "index out of range",
        })?;
        if std::mem::replace(slot, true) {
            return Err(PoolError::Invariant {
                index,
                reason: duplicate,
            });
        }
    }
    Ok(seen)
}
