//! The per-slot particle record.
//!
//! One [`Particle`] lives in every pool slot for the lifetime of the
//! simulation. The struct is `#[repr(C)]` and [`Pod`] so the same bytes are
//! uploaded to and read back from the GPU particle buffer.
//!
//! | Offset | Field | WGSL type |
//! |--------|-------|-----------|
//! | 0 | `position` | `vec3<f32>` |
//! | 12 | `active` (`alive` in WGSL) | `u32` |
//! | 16 | `velocity` | `vec3<f32>` |
//! | 28 | `inv_mass` | `f32` |
//! | 32 | `acceleration` | `vec3<f32>` |
//! | 44 | `life_time` | `f32` |

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// A single particle slot.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// World-space position.
    pub position: Vec3,
    /// 1 while the slot represents a live particle, 0 otherwise.
    pub active: u32,
    /// World-space velocity.
    pub velocity: Vec3,
    /// Reciprocal mass, baked in when the pool is initialized.
    pub inv_mass: f32,
    /// Constant acceleration (gravity scaled by `inv_mass`).
    pub acceleration: Vec3,
    /// Remaining seconds before expiry.
    pub life_time: f32,
}

impl Particle {
    /// An inactive slot at the origin carrying the given reciprocal mass.
    pub fn inactive(inv_mass: f32) -> Self {
        Self {
            inv_mass,
            ..Self::default()
        }
    }

    /// Whether the slot currently simulates.
    pub fn is_active(&self) -> bool {
        self.active != 0
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = u32::from(active);
    }
}

/// Size of one particle in the GPU buffer.
pub const PARTICLE_STRIDE: usize = std::mem::size_of::<Particle>();

/// WGSL struct definition matching [`Particle`] byte for byte.
///
/// `active` is reserved in WGSL, so the flag is named `alive` there.
pub const PARTICLE_WGSL: &str = r#"
struct Particle {
    position: vec3<f32>,
    alive: u32,
    velocity: vec3<f32>,
    inv_mass: f32,
    acceleration: vec3<f32>,
    life_time: f32,
};
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_layout_matches_wgsl() {
        assert_eq!(PARTICLE_STRIDE, 48);
        assert_eq!(std::mem::offset_of!(Particle, active), 12);
        assert_eq!(std::mem::offset_of!(Particle, velocity), 16);
        assert_eq!(std::mem::offset_of!(Particle, inv_mass), 28);
        assert_eq!(std::mem::offset_of!(Particle, acceleration), 32);
        assert_eq!(std::mem::offset_of!(Particle, life_time), 44);
    }

    #[test]
    fn test_wgsl_struct_parses() {
        let module = naga::front::wgsl::parse_str(PARTICLE_WGSL)
            .unwrap_or_else(|e| panic!("{}", e.emit_to_string(PARTICLE_WGSL)));
        let (_, ty) = module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some("Particle"))
            .unwrap();
        match &ty.inner {
            naga::TypeInner::Struct { members, span } => {
                assert_eq!(*span as usize, PARTICLE_STRIDE);
                assert_eq!(members[1].name.as_deref(), Some("alive"));
                assert_eq!(members[1].offset as usize, std::mem::offset_of!(Particle, active));
            }
            other => panic!("Particle is not a struct: {other:?}"),
        }
    }

    #[test]
    fn test_inactive_particle() {
        let p = Particle::inactive(0.5);
        assert!(!p.is_active());
        assert_eq!(p.position, Vec3::ZERO);
        assert_eq!(p.inv_mass, 0.5);
    }

    #[test]
    fn test_set_active() {
        let mut p = Particle::default();
        p.set_active(true);
        assert_eq!(p.active, 1);
        p.set_active(false);
        assert_eq!(p.active, 0);
    }

    #[test]
    fn test_bytes_round_trip() {
        let p = Particle {
            position: Vec3::new(1.0, 2.0, 3.0),
            active: 1,
            velocity: Vec3::X,
            inv_mass: 2.0,
            acceleration: Vec3::NEG_Y,
            life_time: 4.0,
        };
        let bytes = bytemuck::bytes_of(&p);
        assert_eq!(bytes.len(), PARTICLE_STRIDE);
        let back: Particle = *bytemuck::from_bytes(bytes);
        assert_eq!(back, p);
    }
}
