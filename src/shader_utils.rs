//! Hash-based random numbers shared by the CPU and GPU backends.
//!
//! The emission stage treats randomness as a black box that maps a `u32`
//! seed to a uniform value in `[0, 1)`. Both backends use the same integer
//! hash and the same float conversion, so a given particle index and step
//! seed produce identical spawn values on either backend (up to float
//! rounding in the downstream math).
//!
//! # Available Functions
//!
//! | Rust | WGSL | Result |
//! |------|------|--------|
//! | [`hash`] | `hash(n: u32) -> u32` | pseudo-random u32 |
//! | [`rand`] | `rand(seed: u32) -> f32` | uniform in `[0, 1)` |
//! | [`rand_vec3`] | `rand_vec3(seed: u32) -> vec3<f32>` | three uniforms in `[0, 1)` |
//! | [`particle_seed`] | `particle_seed(index: u32) -> u32` | per-particle base seed |
//! | `Vec3::normalize_or_zero` | `safe_normalize(v: vec3<f32>) -> vec3<f32>` | unit vector or zero |

use glam::Vec3;

/// Seed offset of the spawn position jitter sample.
pub const SEED_POSITION: u32 = 0;
/// Seed offset of the direction sample.
pub const SEED_DIRECTION: u32 = 3;
/// Seed offset of the speed sample.
pub const SEED_SPEED: u32 = 9;

const INV_2_POW_24: f32 = 1.0 / 16_777_216.0;

/// Hash a u32 to a pseudo-random u32.
pub fn hash(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// Uniform float in `[0, 1)`.
///
/// Only the top 24 bits of the hash are used so the conversion is exact
/// and never rounds up to `1.0`.
pub fn rand(seed: u32) -> f32 {
    (hash(seed) >> 8) as f32 * INV_2_POW_24
}

/// Three independent uniforms in `[0, 1)` drawn from `seed`, `seed + 1`, `seed + 2`.
pub fn rand_vec3(seed: u32) -> Vec3 {
    Vec3::new(
        rand(seed),
        rand(seed.wrapping_add(1)),
        rand(seed.wrapping_add(2)),
    )
}

/// Base seed for a particle slot.
///
/// Derived purely from the slot index and the step seed supplied by the
/// host. Holding `step_seed` fixed makes emission reproducible per index.
pub fn particle_seed(index: u32, step_seed: u32) -> u32 {
    hash(index.wrapping_add(hash(step_seed)))
}

/// WGSL code for random/hash functions.
///
/// `particle_seed` reads `params.seed` from the simulation uniform block.
pub const RANDOM_WGSL: &str = r#"
// Hash functions for pseudo-random number generation
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

// Random float in [0, 1)
fn rand(seed: u32) -> f32 {
    return f32(hash(seed) >> 8u) * (1.0 / 16777216.0);
}

// Three independent uniforms in [0, 1)
fn rand_vec3(seed: u32) -> vec3<f32> {
    return vec3<f32>(
        rand(seed),
        rand(seed + 1u),
        rand(seed + 2u)
    );
}

fn particle_seed(index: u32) -> u32 {
    return hash(index + hash(params.seed));
}
"#;

/// Vector helpers mirroring the glam calls used on the CPU side.
pub const MATH_WGSL: &str = r#"
// Like glam's normalize_or_zero: zero-length input stays zero
fn safe_normalize(v: vec3<f32>) -> vec3<f32> {
    let len_sq = dot(v, v);
    if len_sq > 0.0 {
        return v * inverseSqrt(len_sq);
    }
    return vec3<f32>(0.0);
}
"#;
