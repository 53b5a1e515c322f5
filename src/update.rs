//! The update stage: expiry, integration and collision response.
//!
//! Runs once per slot per step. Each slot ends the step in one of three
//! states, reported as a [`SlotOutcome`]:
//!
//! - **Idle**: the slot was inactive and is left untouched.
//! - **Expired**: remaining life ran out this step. The slot is deactivated,
//!   its position zeroed, and its index must go back to the free collection.
//!   No integration happens on the expiring step.
//! - **Simulated**: forward Euler, then collision against the spatial index
//!   (only when the tree has geometry).
//!
//! Collision has two cases. Inside the volume, a particle close enough to
//! its leaf's surface sample is reflected off the leaf normal with damping.
//! Outside the volume, only a floor plane below the root box is enforced.

use glam::Vec3;

use crate::particle::Particle;
use crate::spatial::{Located, SdfTree};
use crate::uniforms::SimParams;

/// Height above the floor a sinking particle is placed at.
pub const FLOOR_EPSILON: f32 = 0.01;

/// `dot(velocity, normal)` at or below this means the particle is already
/// leaving the surface, so it is not reflected.
pub const DEPARTING_DOT: f32 = -0.25;

/// Velocity scale applied on floor contact.
pub const FLOOR_RESTITUTION: f32 = 0.5;

/// What happened to one slot during an update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotOutcome {
    Idle,
    Simulated,
    Expired,
}

/// Advance one slot by `params.delta_time`.
///
/// On [`SlotOutcome::Expired`] the caller owns returning the index to the
/// free collection.
pub fn update_particle(p: &mut Particle, tree: &SdfTree, params: &SimParams) -> SlotOutcome {
    if !p.is_active() {
        return SlotOutcome::Idle;
    }

    let dt = params.delta_time;
    if p.life_time - dt <= 0.0 {
        p.set_active(false);
        p.position = Vec3::ZERO;
        return SlotOutcome::Expired;
    }

    p.life_time -= dt;
    p.velocity += p.acceleration * dt;
    p.position += p.velocity * dt;

    if tree.has_geometry() {
        match tree.locate(p.position) {
            Located::Outside => clamp_to_floor(p, tree),
            located => match located.leaf(tree) {
                Some(leaf) => collide(p, tree, leaf, params),
                None => log::trace!("no leaf at {:?}, skipping collision", p.position),
            },
        }
    }

    SlotOutcome::Simulated
}

/// Damped reflection off the surface sample stored in `leaf`.
fn collide(p: &mut Particle, tree: &SdfTree, leaf: u32, params: &SimParams) {
    let Some(node) = tree.node(leaf) else {
        return;
    };
    let physics = &params.physics;
    let radius_sq = physics.radius * physics.radius;

    let dist_sq = p.position.distance_squared(node.point) + radius_sq;
    if dist_sq > physics.collision_threshold + radius_sq {
        return;
    }

    let Some(normal) = node.surface_normal() else {
        return;
    };
    let along = p.velocity.dot(normal);
    if along > DEPARTING_DOT {
        p.velocity -= 2.0 * along * normal * physics.bounce;
    }
}

/// Keep particles that left the volume from falling forever.
fn clamp_to_floor(p: &mut Particle, tree: &SdfTree) {
    let Some(floor) = tree.floor_height() else {
        return;
    };
    if p.position.y < floor {
        p.position.y = floor + FLOOR_EPSILON;
        p.velocity = -p.velocity * FLOOR_RESTITUTION;
    }
}

/// WGSL version of [`update_particle`].
///
/// Returns the updated record; the kernel pushes `index` to the free list
/// when it comes back inactive from an active input.
pub fn update_wgsl() -> String {
    format!(
        r#"
const FLOOR_EPSILON: f32 = {FLOOR_EPSILON:?};
const DEPARTING_DOT: f32 = {DEPARTING_DOT:?};
const FLOOR_RESTITUTION: f32 = {FLOOR_RESTITUTION:?};

fn collide(slot: Particle, leaf: u32) -> Particle {{
    var p = slot;
    let node = nodes[leaf];
    let radius_sq = params.radius * params.radius;

    let offset = p.position - node.point;
    let dist_sq = dot(offset, offset) + radius_sq;
    if dist_sq > params.collision_threshold + radius_sq {{
        return p;
    }}

    let center = (node.bounds_min + node.bounds_max) * 0.5;
    let normal = safe_normalize(node.point - center);
    if all(normal == vec3<f32>(0.0)) {{
        return p;
    }}
    let along = dot(p.velocity, normal);
    if along > DEPARTING_DOT {{
        p.velocity -= 2.0 * along * normal * params.bounce;
    }}
    return p;
}}

fn clamp_to_floor(slot: Particle) -> Particle {{
    var p = slot;
    let floor_y = 0.0 - (nodes[0].bounds_max.y - nodes[0].bounds_min.y) * 0.5;
    if p.position.y < floor_y {{
        p.position.y = floor_y + FLOOR_EPSILON;
        p.velocity = -p.velocity * FLOOR_RESTITUTION;
    }}
    return p;
}}

fn update_particle(slot: Particle) -> Particle {{
    var p = slot;
    if p.alive == 0u {{
        return p;
    }}

    let dt = params.delta_time;
    if p.life_time - dt <= 0.0 {{
        p.alive = 0u;
        p.position = vec3<f32>(0.0);
        return p;
    }}

    p.life_time -= dt;
    p.velocity += p.acceleration * dt;
    p.position += p.velocity * dt;

    if params.octree_size > 1u {{
        let located = locate(p.position);
        if located == OUTSIDE {{
            p = clamp_to_floor(p);
        }} else if is_leaf(u32(located)) {{
            p = collide(p, u32(located));
        }}
    }}
    return p;
}}
"#
    )
}
