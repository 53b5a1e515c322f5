//! Assembly of the compute module shared by all four kernels.
//!
//! | Binding | Resource | Access |
//! |---------|----------|--------|
//! | 0 | `particles: array<Particle>` | read_write |
//! | 1 | `nodes: array<SdfNode>` | read |
//! | 2 | `free_list: IndexList` | read_write |
//! | 3 | `request_list: IndexList` | read_write |
//! | 4 | `params: SimUniforms` | uniform |
//! | 5 | `counters: Counters` | read_write |
//!
//! An `IndexList` is a counter plus a slot array. Push is an `atomicAdd` on
//! the counter. Pop is a compare-exchange loop that never moves the counter
//! below zero, so popping an empty list returns -1 instead of wrapping.
//! Within one dispatch a list is only pushed or only popped.

use crate::emitter::emit_wgsl;
use crate::particle::PARTICLE_WGSL;
use crate::shader_utils::{MATH_WGSL, RANDOM_WGSL};
use crate::spatial::SDF_WGSL;
use crate::uniforms::UNIFORMS_WGSL;
use crate::update::update_wgsl;
use crate::WORKGROUP_SIZE;

pub const INITIALIZE_ENTRY: &str = "initialize_pool";
pub const REQUEST_ENTRY: &str = "request_particles";
pub const EMIT_ENTRY: &str = "emit_particles";
pub const UPDATE_ENTRY: &str = "update_particles";

/// Entry points in pipeline creation order.
pub const ENTRY_POINTS: [&str; 4] = [INITIALIZE_ENTRY, REQUEST_ENTRY, EMIT_ENTRY, UPDATE_ENTRY];

const BINDINGS_WGSL: &str = r#"
struct IndexList {
    count: atomic<u32>,
    indices: array<u32>,
};

struct Counters {
    requested: atomic<u32>,
    emitted: atomic<u32>,
    expired: atomic<u32>,
    _pad: u32,
};

@group(0) @binding(0) var<storage, read_write> particles: array<Particle>;
@group(0) @binding(1) var<storage, read> nodes: array<SdfNode>;
@group(0) @binding(2) var<storage, read_write> free_list: IndexList;
@group(0) @binding(3) var<storage, read_write> request_list: IndexList;
@group(0) @binding(4) var<uniform> params: SimUniforms;
@group(0) @binding(5) var<storage, read_write> counters: Counters;
"#;

/// Push/pop for one index list. `{name}` is the function suffix, `{list}`
/// the binding.
const INDEX_LIST_TEMPLATE: &str = r#"
fn push_{name}(index: u32) {
    let slot = atomicAdd(&{list}.count, 1u);
    {list}.indices[slot] = index;
}

fn pop_{name}() -> i32 {
    var popped = -1;
    var count = atomicLoad(&{list}.count);
    loop {
        if count == 0u {
            break;
        }
        let attempt = atomicCompareExchangeWeak(&{list}.count, count, count - 1u);
        if attempt.exchanged {
            popped = i32({list}.indices[count - 1u]);
            break;
        }
        count = attempt.old_value;
    }
    return popped;
}
"#;

fn index_list_wgsl(name: &str, list: &str) -> String {
    INDEX_LIST_TEMPLATE
        .replace("{name}", name)
        .replace("{list}", list)
}

fn kernels_wgsl() -> String {
    format!(
        r#"
@compute @workgroup_size({WORKGROUP_SIZE})
fn {INITIALIZE_ENTRY}(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    if index >= params.capacity {{
        return;
    }}
    particles[index] = Particle(vec3<f32>(0.0), 0u, vec3<f32>(0.0), params.inv_mass, vec3<f32>(0.0), 0.0);
    free_list.indices[index] = index;
    if index == 0u {{
        atomicStore(&free_list.count, params.capacity);
        atomicStore(&request_list.count, 0u);
    }}
}}

@compute @workgroup_size({WORKGROUP_SIZE})
fn {REQUEST_ENTRY}(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    if global_id.x >= params.dispatch_count {{
        return;
    }}
    let popped = pop_free();
    if popped < 0 {{
        return;
    }}
    push_request(u32(popped));
    atomicAdd(&counters.requested, 1u);
}}

@compute @workgroup_size({WORKGROUP_SIZE})
fn {EMIT_ENTRY}(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    if global_id.x >= params.dispatch_count {{
        return;
    }}
    let popped = pop_request();
    if popped < 0 {{
        return;
    }}
    let index = u32(popped);
    particles[index] = emit_particle(index, particles[index]);
    atomicAdd(&counters.emitted, 1u);
}}

@compute @workgroup_size({WORKGROUP_SIZE})
fn {UPDATE_ENTRY}(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    if index >= params.capacity {{
        return;
    }}
    let before = particles[index];
    let after = update_particle(before);
    if before.alive != 0u && after.alive == 0u {{
        push_free(index);
        atomicAdd(&counters.expired, 1u);
    }}
    particles[index] = after;
}}
"#
    )
}

/// The complete WGSL module.
pub fn generate_compute_shader() -> String {
    [
        PARTICLE_WGSL.to_string(),
        UNIFORMS_WGSL.to_string(),
        SDF_WGSL.to_string(),
        BINDINGS_WGSL.to_string(),
        RANDOM_WGSL.to_string(),
        MATH_WGSL.to_string(),
        index_list_wgsl("free", "free_list"),
        index_list_wgsl("request", "request_list"),
        emit_wgsl(),
        update_wgsl(),
        kernels_wgsl(),
    ]
    .concat()
}
