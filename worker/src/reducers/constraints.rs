use crate::constraint::{ConstraintRecord, MotorState, build_joint};
use crate::world::{PhaseHook, WorldState};
use shared::constants::DEFAULT_CONSTRAINT_MAX_FORCE;
use shared::{ConstraintKind, ConstraintProps, IdentityKind, ProtocolError};

pub fn add_constraint(
    world: &mut WorldState,
    id: &str,
    kind: ConstraintKind,
    props: &ConstraintProps,
) -> Result<(), ProtocolError> {
    if world.constraints.contains_key(id) {
        return Err(ProtocolError::DuplicateIdentity {
            kind: IdentityKind::Constraint,
            id: id.to_string(),
        });
    }
    let handle_a = world.body_handle(&props.body_a)?;
    let handle_b = world.body_handle(&props.body_b)?;
    let joint = build_joint(
        kind,
        props,
        world.rigid_body(&props.body_a)?,
        world.rigid_body(&props.body_b)?,
    )?;

    let wake = props.wake_up_bodies.unwrap_or(true);
    let handle = world.impulse_joints.insert(handle_a, handle_b, joint, wake);
    let record = ConstraintRecord {
        id: id.to_string(),
        kind,
        handle,
        body_a: props.body_a.clone(),
        body_b: props.body_b.clone(),
        max_force: props.max_force.unwrap_or(DEFAULT_CONSTRAINT_MAX_FORCE),
        max_multiplier: props.max_multiplier,
        motor: MotorState::default(),
        trips: 0,
    };
    if record.max_multiplier.is_some() {
        world.register_post_step(PhaseHook::Watchdog(id.to_string()));
    }
    world.constraints.insert(id.to_string(), record);
    log::debug!("constraint `{id}` ({kind:?}) between `{}` and `{}`", props.body_a, props.body_b);
    Ok(())
}

pub fn remove_constraint(world: &mut WorldState, id: &str) -> Result<(), ProtocolError> {
    let Some(record) = world.constraints.remove(id) else {
        return Err(ProtocolError::unknown(IdentityKind::Constraint, id));
    };
    world.impulse_joints.remove(record.handle, true);
    world.unregister(&PhaseHook::Watchdog(id.to_string()));
    Ok(())
}

/// Re-enabling also re-arms the watchdog, which only checks enabled joints.
pub fn set_constraint_enabled(
    world: &mut WorldState,
    id: &str,
    enabled: bool,
) -> Result<(), ProtocolError> {
    let Some(record) = world.constraints.get(id) else {
        return Err(ProtocolError::unknown(IdentityKind::Constraint, id));
    };
    record.set_enabled(&mut world.impulse_joints, enabled);
    Ok(())
}

pub fn update_motor(
    world: &mut WorldState,
    id: &str,
    change: impl FnOnce(&mut MotorState),
) -> Result<(), ProtocolError> {
    let Some(record) = world.constraints.get_mut(id) else {
        return Err(ProtocolError::unknown(IdentityKind::Constraint, id));
    };
    record.update_motor(&mut world.impulse_joints, change)
}
