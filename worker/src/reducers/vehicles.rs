use crate::vehicle::Vehicle;
use crate::world::{PhaseHook, WorldState};
use shared::{IdentityKind, ProtocolError, VehicleProps};

/// Registers a raycast vehicle over an existing chassis body and wheel bodies.
///
/// Suspension and friction run before each step; the wheel bodies are moved onto their
/// computed transforms after it.
pub fn add_vehicle(
    world: &mut WorldState,
    id: &str,
    props: &VehicleProps,
) -> Result<(), ProtocolError> {
    if world.vehicles.contains_key(id) {
        return Err(ProtocolError::DuplicateIdentity {
            kind: IdentityKind::Vehicle,
            id: id.to_string(),
        });
    }
    world.body(&props.chassis_body)?;
    for wheel in &props.wheels {
        world.body(wheel)?;
    }
    let vehicle = Vehicle::new(id, props)?;
    world.vehicles.insert(id.to_string(), vehicle);
    world.register_pre_step(PhaseHook::Vehicle(id.to_string()));
    world.register_post_step(PhaseHook::VehicleSync(id.to_string()));
    log::debug!(
        "vehicle `{id}` on chassis `{}` with {} wheels",
        props.chassis_body,
        props.wheels.len()
    );
    Ok(())
}

pub fn remove_vehicle(world: &mut WorldState, id: &str) -> Result<(), ProtocolError> {
    if world.vehicles.remove(id).is_none() {
        return Err(ProtocolError::unknown(IdentityKind::Vehicle, id));
    }
    world.unregister(&PhaseHook::Vehicle(id.to_string()));
    world.unregister(&PhaseHook::VehicleSync(id.to_string()));
    Ok(())
}

/// Runs a control change (engine force, steering, brake) on a registered vehicle.
pub fn with_vehicle(
    world: &mut WorldState,
    id: &str,
    change: impl FnOnce(&mut Vehicle) -> Result<(), ProtocolError>,
) -> Result<(), ProtocolError> {
    let Some(vehicle) = world.vehicles.get_mut(id) else {
        return Err(ProtocolError::unknown(IdentityKind::Vehicle, id));
    };
    change(vehicle)
}
