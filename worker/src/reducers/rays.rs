use crate::ray::RegisteredRay;
use crate::world::{PhaseHook, WorldState};
use shared::{IdentityKind, ProtocolError, RayProps};

/// Registers a ray. It is cast before every step and reports through `rayhit` events.
pub fn add_ray(world: &mut WorldState, id: &str, props: &RayProps) -> Result<(), ProtocolError> {
    if world.rays.contains_key(id) {
        return Err(ProtocolError::DuplicateIdentity {
            kind: IdentityKind::Ray,
            id: id.to_string(),
        });
    }
    if props.from.iter().chain(&props.to).any(|v| !v.is_finite()) {
        return Err(ProtocolError::invalid("ray", "endpoints must be finite"));
    }
    world.rays.insert(id.to_string(), RegisteredRay::new(id, props));
    world.register_pre_step(PhaseHook::Ray(id.to_string()));
    Ok(())
}

pub fn remove_ray(world: &mut WorldState, id: &str) -> Result<(), ProtocolError> {
    if world.rays.remove(id).is_none() {
        return Err(ProtocolError::unknown(IdentityKind::Ray, id));
    }
    world.unregister(&PhaseHook::Ray(id.to_string()));
    Ok(())
}
