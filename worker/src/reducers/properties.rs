//! Per-body setters and force application.
//!
//! Configuration setters (damping, filters, factors...) go through
//! [`WorldState::update_body`], which re-derives the engine state. Pose and velocity setters
//! write straight to the engine body and wake it.

use crate::world::WorldState;
use rapier3d::prelude::*;
use shared::protocol::VectorAtPoint;
use shared::rotation::{quat_from_array, quat_from_euler_xyz};
use shared::{MaterialRef, ProtocolError, Quat, Vec3};

fn to_vector([x, y, z]: Vec3) -> Vector<f32> {
    vector![x, y, z]
}

fn to_point([x, y, z]: Vec3) -> Point<f32> {
    point![x, y, z]
}

fn finite(what: &'static str, v: &[f32]) -> Result<(), ProtocolError> {
    if v.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(ProtocolError::invalid(what, "values must be finite"))
    }
}

/// Changes the mass but not the body type. Static bodies stay massless.
pub fn set_mass(world: &mut WorldState, id: &str, mass: f32) -> Result<(), ProtocolError> {
    if !mass.is_finite() || mass < 0.0 {
        return Err(ProtocolError::invalid("mass", format!("{mass} is not a valid mass")));
    }
    world.update_body(id, |c| c.mass = mass)?;
    world.rigid_body_mut(id)?.wake_up(true);
    Ok(())
}

pub fn set_material(
    world: &mut WorldState,
    id: &str,
    material: &MaterialRef,
) -> Result<(), ProtocolError> {
    // Check first so an unknown body does not intern a material.
    world.body(id)?;
    let material = world.materials.intern(material);
    world.update_body(id, |c| c.material = Some(material))
}

pub fn set_position(world: &mut WorldState, id: &str, position: Vec3) -> Result<(), ProtocolError> {
    finite("position", &position)?;
    world.rigid_body_mut(id)?.set_translation(to_vector(position), true);
    Ok(())
}

/// Euler angles in `XYZ` order.
pub fn set_rotation(world: &mut WorldState, id: &str, rotation: Vec3) -> Result<(), ProtocolError> {
    finite("rotation", &rotation)?;
    world
        .rigid_body_mut(id)?
        .set_rotation(quat_from_euler_xyz(rotation), true);
    Ok(())
}

pub fn set_quaternion(
    world: &mut WorldState,
    id: &str,
    quaternion: Quat,
) -> Result<(), ProtocolError> {
    finite("quaternion", &quaternion)?;
    world.rigid_body_mut(id)?.set_rotation(quat_from_array(quaternion), true);
    Ok(())
}

pub fn set_velocity(world: &mut WorldState, id: &str, velocity: Vec3) -> Result<(), ProtocolError> {
    finite("velocity", &velocity)?;
    world.rigid_body_mut(id)?.set_linvel(to_vector(velocity), true);
    Ok(())
}

pub fn set_angular_velocity(
    world: &mut WorldState,
    id: &str,
    velocity: Vec3,
) -> Result<(), ProtocolError> {
    finite("angular velocity", &velocity)?;
    world.rigid_body_mut(id)?.set_angvel(to_vector(velocity), true);
    Ok(())
}

pub fn sleep(world: &mut WorldState, id: &str) -> Result<(), ProtocolError> {
    world.rigid_body_mut(id)?.sleep();
    Ok(())
}

pub fn wake_up(world: &mut WorldState, id: &str) -> Result<(), ProtocolError> {
    world.rigid_body_mut(id)?.wake_up(true);
    Ok(())
}

/// Resolves `(vector, point)` to world space. Local input is expressed in the body frame.
fn world_vector_at_point(
    body: &RigidBody,
    (vector, point): VectorAtPoint,
    local: bool,
) -> (Vector<f32>, Point<f32>) {
    let (vector, point) = (to_vector(vector), to_point(point));
    if local {
        (body.position() * vector, body.position() * point)
    } else {
        (vector, point)
    }
}

/// Adds a force for the next step only.
pub fn apply_force(
    world: &mut WorldState,
    id: &str,
    props: VectorAtPoint,
    local: bool,
) -> Result<(), ProtocolError> {
    finite("force", &[props.0, props.1].concat())?;
    let body = world.rigid_body_mut(id)?;
    let (force, point) = world_vector_at_point(body, props, local);
    body.add_force_at_point(force, point, true);
    Ok(())
}

pub fn apply_impulse(
    world: &mut WorldState,
    id: &str,
    props: VectorAtPoint,
    local: bool,
) -> Result<(), ProtocolError> {
    finite("impulse", &[props.0, props.1].concat())?;
    let body = world.rigid_body_mut(id)?;
    let (impulse, point) = world_vector_at_point(body, props, local);
    body.apply_impulse_at_point(impulse, point, true);
    Ok(())
}

pub fn apply_torque(world: &mut WorldState, id: &str, torque: Vec3) -> Result<(), ProtocolError> {
    finite("torque", &torque)?;
    world.rigid_body_mut(id)?.add_torque(to_vector(torque), true);
    Ok(())
}
