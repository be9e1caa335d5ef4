//! Per-collider metadata packed into the engine's `user_data` slot.
//!
//! # Why this exists
//! Contact hooks only see colliders, not our body records, and they run inside the engine step
//! where the records cannot be borrowed. Everything a hook needs is therefore packed into the
//! collider's `u128` user data when the collider is built.
//!
//! # Bit layout
//! This `u128` is a packed value with the following layout (least-significant bit = bit 0):
//!
//! - bits 0..=31  : material id + 1 (`0` = no material)
//! - bit 32       : collision response disabled
//! - bits 33..=127: reserved (must be zero for now)
//!
//! # Invariants
//! - Two different `(material, response)` pairs never produce the same tag.
//! - Reserved bits stay zero.

use crate::material::MaterialId;

pub type ColliderTag = u128;

const MATERIAL_MASK: u128 = u32::MAX as u128;
const NO_RESPONSE_BIT: u128 = 1 << 32;

/// Packs a collider's material and response flag.
pub fn pack_tag(material: Option<MaterialId>, responds: bool) -> ColliderTag {
    let material = material.map_or(0, |id| id as u128 + 1) & MATERIAL_MASK;
    let response = if responds { 0 } else { NO_RESPONSE_BIT };
    material | response
}

pub fn tag_material(tag: ColliderTag) -> Option<MaterialId> {
    match (tag & MATERIAL_MASK) as u32 {
        0 => None,
        n => Some(n - 1),
    }
}

/// Whether contacts involving the collider produce a solver response.
pub fn tag_responds(tag: ColliderTag) -> bool {
    tag & NO_RESPONSE_BIT == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpacks_material_and_response() {
        let materials = [None, Some(0), Some(1), Some(42), Some(u32::MAX - 1)];
        for material in materials {
            for responds in [true, false] {
                let tag = pack_tag(material, responds);
                assert_eq!(tag_material(tag), material);
                assert_eq!(tag_responds(tag), responds);
                assert_eq!(tag >> 33, 0);
            }
        }
    }

    #[test]
    fn default_tag_is_zero() {
        assert_eq!(pack_tag(None, true), 0);
        assert!(tag_responds(0));
        assert_eq!(tag_material(0), None);
    }
}
