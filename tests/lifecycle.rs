//! Pool lifecycle and physics scenarios on the CPU backend.

mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sdf_particles::prelude::*;
use sdf_particles::{emit_particle, update_particle, Located, SlotOutcome};

fn params() -> SimParams {
    SimParams::default()
        .with_delta_time(1.0 / 60.0)
        .with_emitter(
            EmitterConfig::default()
                .with_position(Vec3::new(0.0, 1.0, 0.0))
                .with_life_time(2.0),
        )
}

// ============================================================================
// Pool scenarios
// ============================================================================

#[test]
fn test_capacity_four_request_two() {
    let mut sim = CpuSimulation::new(4, SdfTree::empty()).unwrap();
    sim.initialize(&params()).unwrap();

    let mut free = sim.free_indices().unwrap();
    free.sort();
    assert_eq!(free, vec![0, 1, 2, 3]);
    assert_eq!(sim.active_count(), 0);

    assert_eq!(sim.request(2).unwrap(), 2);
    assert_eq!(sim.emit(&params()).unwrap(), 2);

    let particles = sim.particles().unwrap();
    let active: Vec<&Particle> = particles.iter().filter(|p| p.is_active()).collect();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|p| p.life_time == 2.0));
    assert_eq!(sim.free_indices().unwrap().len(), 2);
    sim.pool_mut().check_lifecycle().unwrap();
}

#[test]
fn test_expiry_returns_slot_to_free_collection() {
    let params = params()
        .with_delta_time(0.02)
        .with_emitter(EmitterConfig::default().with_life_time(0.016));
    let mut sim = CpuSimulation::new(1, SdfTree::empty()).unwrap();
    sim.initialize(&params).unwrap();
    sim.request(1).unwrap();
    sim.emit(&params).unwrap();
    assert!(sim.free_indices().unwrap().is_empty());

    assert_eq!(sim.update(&params).unwrap(), 1);

    let p = sim.particles().unwrap()[0];
    assert!(!p.is_active());
    assert_eq!(p.position, Vec3::ZERO);
    assert_eq!(sim.free_indices().unwrap(), vec![0]);

    // No further integration before re-emission
    sim.update(&params).unwrap();
    assert_eq!(sim.particles().unwrap()[0], p);
    assert_eq!(sim.free_indices().unwrap(), vec![0]);
}

#[test]
fn test_single_node_tree_is_pure_euler() {
    let params = params().with_physics(
        PhysicsConfig::default()
            .with_gravity(Vec3::new(0.0, -10.0, 0.0))
            .with_collision_threshold(100.0),
    );
    let mut sim = CpuSimulation::new(1, common::single_node_tree()).unwrap();
    sim.initialize(&params).unwrap();
    sim.request(1).unwrap();
    sim.emit(&params).unwrap();

    let before = sim.particles().unwrap()[0];
    sim.update(&params).unwrap();
    let after = sim.particles().unwrap()[0];

    let dt = params.delta_time;
    let velocity = before.velocity + before.acceleration * dt;
    let position = before.position + velocity * dt;
    assert_eq!(after.velocity, velocity);
    assert_eq!(after.position, position);
}

#[test]
fn test_lifecycle_invariant_under_random_load() {
    let mut rng = StdRng::seed_from_u64(0x5DF);
    let tree = common::ground_tree(2.0, 3, -0.5);
    let base = params().with_emitter(
        EmitterConfig::default()
            .with_position(Vec3::new(0.0, 1.0, 0.0))
            .with_spread(0.8)
            .with_life_time(0.25),
    );

    let mut sim = CpuSimulation::new(512, tree).unwrap();
    sim.initialize(&base).unwrap();

    let mut clock = StepClock::new().with_fixed_delta(Some(1.0 / 60.0));
    for _ in 0..120 {
        let params = clock.advance(base);
        let spawn = rng.gen_range(0..64);
        let stats = sim.step(spawn, &params).unwrap();

        assert!(stats.requested <= spawn);
        assert_eq!(stats.emitted, stats.requested);
        sim.pool_mut().check_lifecycle().unwrap();
        assert!(sim.pool().requests().is_empty());
    }
}

#[test]
fn test_emission_matches_pure_function() {
    let params = params().with_seed(99);
    let mut sim = CpuSimulation::new(32, SdfTree::empty()).unwrap();
    sim.initialize(&params).unwrap();
    sim.request(32).unwrap();
    sim.emit(&params).unwrap();

    let slot = Particle::inactive(params.physics.inv_mass);
    for (index, p) in sim.particles().unwrap().iter().enumerate() {
        assert_eq!(*p, emit_particle(index as u32, &slot, &params));
    }
}

// ============================================================================
// Collision scenarios
// ============================================================================

#[test]
fn test_particles_bounce_on_ground() {
    // Ground at y = -0.5 inside a [-2, 2]^3 volume. The emitter sits above
    // the center column of a leaf, so the particle passes over its sample.
    let tree = common::ground_tree(2.0, 3, -0.5);
    let params = SimParams::default()
        .with_delta_time(1.0 / 120.0)
        .with_emitter(
            EmitterConfig::default()
                .with_position(Vec3::new(0.25, 0.5, 0.25))
                .with_half_extents(Vec3::ZERO)
                .with_direction(Vec3::NEG_Y)
                .with_spread(0.0)
                .with_speed(1.0)
                .with_speed_randomness(0.0)
                .with_life_time(10.0),
        )
        .with_physics(
            PhysicsConfig::default()
                .with_gravity(Vec3::ZERO)
                .with_bounce(1.0)
                .with_radius(0.0)
                .with_collision_threshold(0.01),
        );

    let mut sim = CpuSimulation::new(1, tree).unwrap();
    sim.initialize(&params).unwrap();
    sim.step(1, &params).unwrap();

    let mut bounced = false;
    for _ in 0..240 {
        sim.step(0, &params).unwrap();
        let p = sim.particles().unwrap()[0];
        if p.velocity.y > 0.0 {
            bounced = true;
            break;
        }
    }
    assert!(bounced, "particle never reflected off the ground");
    let p = sim.particles().unwrap()[0];
    assert!(p.position.y > -0.5 - 0.1);
}

#[test]
fn test_floor_catches_particles_leaving_volume() {
    let tree = common::ground_tree(1.0, 2, -5.0);
    let params = SimParams::default()
        .with_delta_time(1.0 / 60.0)
        .with_emitter(
            EmitterConfig::default()
                .with_position(Vec3::new(0.2, 0.0, 0.2))
                .with_half_extents(Vec3::ZERO)
                .with_life_time(30.0),
        )
        .with_physics(PhysicsConfig::default().with_collision_threshold(0.0));

    let mut sim = CpuSimulation::new(16, tree).unwrap();
    sim.initialize(&params).unwrap();
    sim.step(16, &params).unwrap();
    for _ in 0..600 {
        sim.step(0, &params).unwrap();
    }

    let floor = sim.tree().floor_height().unwrap();
    for p in sim.particles().unwrap() {
        assert!(p.is_active());
        assert!(p.position.is_finite());
        assert!(p.position.y > floor - 1.0, "fell through floor: {:?}", p.position);
    }
}

// ============================================================================
// Traversal properties
// ============================================================================

#[test]
fn test_locate_finds_random_leaf_interiors() {
    let mut rng = StdRng::seed_from_u64(7);
    let tree = common::ground_tree(4.0, 3, 0.0);

    for (index, node) in tree.nodes().iter().enumerate() {
        if !node.is_leaf() {
            continue;
        }
        let bounds = node.bounds();
        let margin = bounds.size() * 0.01;
        for _ in 0..4 {
            let t = Vec3::new(rng.gen(), rng.gen(), rng.gen());
            let point = bounds.min + margin + t * (bounds.size() - 2.0 * margin);
            assert_eq!(tree.locate(point), Located::Node(index as u32));
        }
    }
}

#[test]
fn test_locate_outside_root_is_outside() {
    let mut rng = StdRng::seed_from_u64(11);
    let tree = common::ground_tree(1.0, 2, 0.0);

    for _ in 0..1_000 {
        let mut point = Vec3::new(
            rng.gen_range(-3.0..3.0),
            rng.gen_range(-3.0..3.0),
            rng.gen_range(-3.0..3.0),
        );
        // Push one axis onto or past a face
        let axis = rng.gen_range(0..3);
        let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        point[axis] = sign * rng.gen_range(1.0..3.0);
        assert_eq!(tree.locate(point), Located::Outside, "{point:?}");
    }
}

#[test]
fn test_locate_unbalanced_tree() {
    let tree = common::unbalanced_tree();
    assert_eq!(tree.depth(), 3);

    let cases = [
        // Shallow leaf
        (Vec3::new(-0.5, -0.5, -0.5), Located::Node(1), Some(1)),
        // Reached through the sentinel gap in the root
        (Vec3::splat(0.25), Located::Node(3), Some(3)),
        // Deepest leaf
        (Vec3::splat(0.6), Located::Node(5), Some(5)),
        // Inside a branch that no child covers
        (Vec3::splat(0.9), Located::Node(4), None),
        (Vec3::new(0.25, 0.75, 0.25), Located::Node(2), None),
        (Vec3::new(0.5, -0.5, 0.5), Located::Node(0), None),
    ];
    for (point, expected, leaf) in cases {
        let located = tree.locate(point);
        assert_eq!(located, expected, "{point:?}");
        assert_eq!(located.leaf(&tree), leaf, "{point:?}");
    }
}

fn collision_params() -> SimParams {
    SimParams::default().with_physics(
        PhysicsConfig::default()
            .with_gravity(Vec3::ZERO)
            .with_bounce(1.0)
            .with_radius(0.0)
            .with_collision_threshold(100.0),
    )
}

fn moving(position: Vec3, velocity: Vec3) -> Particle {
    Particle {
        position,
        active: 1,
        velocity,
        inv_mass: 1.0,
        acceleration: Vec3::ZERO,
        life_time: 10.0,
    }
}

#[test]
fn test_uncovered_interior_points_skip_collision() {
    let tree = common::unbalanced_tree();
    let params = collision_params();

    for start in [
        Vec3::new(0.25, 0.75, 0.25),
        Vec3::splat(0.9),
        Vec3::new(0.5, -0.5, 0.5),
    ] {
        let mut p = moving(start, Vec3::new(0.0, -0.1, 0.0));
        assert_eq!(update_particle(&mut p, &tree, &params), SlotOutcome::Simulated);
        assert_eq!(p.velocity, Vec3::new(0.0, -0.1, 0.0), "{start:?}");
        assert!(p.position.y < start.y);
    }
}

#[test]
fn test_leaves_at_every_depth_collide() {
    let tree = common::unbalanced_tree();
    let params = collision_params();

    for start in [
        Vec3::new(-0.5, -0.9, -0.5),
        Vec3::new(0.25, 0.1, 0.25),
        Vec3::new(0.6, 0.55, 0.6),
    ] {
        let mut p = moving(start, Vec3::NEG_Y);
        update_particle(&mut p, &tree, &params);
        assert!(p.velocity.abs_diff_eq(Vec3::Y, 1e-5), "{start:?}: {:?}", p.velocity);
    }
}
