use crate::spring::Spring;
use crate::world::{PhaseHook, WorldState};
use shared::{IdentityKind, ProtocolError, SpringProps};

pub fn add_spring(
    world: &mut WorldState,
    id: &str,
    props: &SpringProps,
) -> Result<(), ProtocolError> {
    if world.springs.contains_key(id) {
        return Err(ProtocolError::DuplicateIdentity {
            kind: IdentityKind::Spring,
            id: id.to_string(),
        });
    }
    let spring = Spring::new(
        id,
        props,
        world.rigid_body(&props.body_a)?,
        world.rigid_body(&props.body_b)?,
    );
    if spring.stiffness < 0.0 || spring.damping < 0.0 || spring.rest_length < 0.0 {
        return Err(ProtocolError::invalid(
            "spring",
            "stiffness, damping and rest length must not be negative",
        ));
    }
    world.springs.insert(id.to_string(), spring);
    world.register_post_step(PhaseHook::Spring(id.to_string()));
    Ok(())
}

pub fn remove_spring(world: &mut WorldState, id: &str) -> Result<(), ProtocolError> {
    if world.springs.remove(id).is_none() {
        return Err(ProtocolError::unknown(IdentityKind::Spring, id));
    }
    world.unregister(&PhaseHook::Spring(id.to_string()));
    Ok(())
}

pub fn update_spring(
    world: &mut WorldState,
    id: &str,
    change: impl FnOnce(&mut Spring),
) -> Result<(), ProtocolError> {
    let Some(spring) = world.springs.get_mut(id) else {
        return Err(ProtocolError::unknown(IdentityKind::Spring, id));
    };
    change(spring);
    Ok(())
}
