//! Request handlers, one module per operation group.
//!
//! Every handler takes the world plus the request payload and either applies the whole
//! operation or fails without side effects on the world.

pub mod bodies;
pub mod constraints;
pub mod contact_materials;
pub mod init;
pub mod properties;
pub mod rays;
pub mod springs;
pub mod step;
pub mod subscriptions;
pub mod vehicles;

use crate::settings::WorkerSettings;
use crate::world::WorldState;
use shared::{Frame, ProtocolError, Request};

/// Routes one request to its handler. Only `step` produces a frame.
pub fn dispatch(
    world: &mut WorldState,
    settings: &WorkerSettings,
    request: Request,
) -> Result<Option<Frame>, ProtocolError> {
    match request {
        Request::Init { props } => init::init(world, &props)?,
        Request::Step {
            props,
            positions,
            quaternions,
        } => return step::step(world, settings, &props, positions, quaternions).map(Some),

        Request::AddBodies { uuid, shape, props } => {
            bodies::add_bodies(world, &uuid, &shape, &props)?
        }
        Request::RemoveBodies { uuid } => bodies::remove_bodies(world, &uuid)?,

        Request::AddConstraint { uuid, kind, props } => {
            constraints::add_constraint(world, &uuid, kind, &props)?
        }
        Request::RemoveConstraint { uuid } => constraints::remove_constraint(world, &uuid)?,
        Request::EnableConstraint { uuid } => {
            constraints::set_constraint_enabled(world, &uuid, true)?
        }
        Request::DisableConstraint { uuid } => {
            constraints::set_constraint_enabled(world, &uuid, false)?
        }
        Request::EnableConstraintMotor { uuid } => {
            constraints::update_motor(world, &uuid, |m| m.enabled = true)?
        }
        Request::DisableConstraintMotor { uuid } => {
            constraints::update_motor(world, &uuid, |m| m.enabled = false)?
        }
        Request::SetConstraintMotorSpeed { uuid, props } => {
            constraints::update_motor(world, &uuid, |m| m.speed = props)?
        }
        Request::SetConstraintMotorMaxForce { uuid, props } => {
            constraints::update_motor(world, &uuid, |m| m.max_force = props)?
        }

        Request::AddSpring { uuid, props } => springs::add_spring(world, &uuid, &props)?,
        Request::RemoveSpring { uuid } => springs::remove_spring(world, &uuid)?,
        Request::SetSpringStiffness { uuid, props } => {
            springs::update_spring(world, &uuid, |s| s.stiffness = props)?
        }
        Request::SetSpringRestLength { uuid, props } => {
            springs::update_spring(world, &uuid, |s| s.rest_length = props)?
        }
        Request::SetSpringDamping { uuid, props } => {
            springs::update_spring(world, &uuid, |s| s.damping = props)?
        }

        Request::AddRay { uuid, props } => rays::add_ray(world, &uuid, &props)?,
        Request::RemoveRay { uuid } => rays::remove_ray(world, &uuid)?,

        Request::AddRaycastVehicle { uuid, props } => vehicles::add_vehicle(world, &uuid, &props)?,
        Request::RemoveRaycastVehicle { uuid } => vehicles::remove_vehicle(world, &uuid)?,
        Request::ApplyRaycastVehicleEngineForce { uuid, props: (value, wheel) } => {
            vehicles::with_vehicle(world, &uuid, |v| v.apply_engine_force(value, wheel))?
        }
        Request::SetRaycastVehicleSteeringValue { uuid, props: (value, wheel) } => {
            vehicles::with_vehicle(world, &uuid, |v| v.set_steering_value(value, wheel))?
        }
        Request::SetRaycastVehicleBrake { uuid, props: (value, wheel) } => {
            vehicles::with_vehicle(world, &uuid, |v| v.set_brake(value, wheel))?
        }

        Request::AddContactMaterial { uuid, props } => {
            contact_materials::add_contact_material(world, &uuid, &props)?
        }
        Request::RemoveContactMaterial { uuid } => {
            contact_materials::remove_contact_material(world, &uuid)?
        }

        Request::Subscribe { uuid, props } => subscriptions::subscribe(world, &uuid, &props)?,
        Request::Unsubscribe { props } => subscriptions::unsubscribe(world, props)?,

        Request::Sleep { uuid } => properties::sleep(world, &uuid)?,
        Request::WakeUp { uuid } => properties::wake_up(world, &uuid)?,

        Request::SetMass { uuid, props } => properties::set_mass(world, &uuid, props)?,
        Request::SetLinearDamping { uuid, props } => {
            world.update_body(&uuid, |c| c.linear_damping = props)?
        }
        Request::SetAngularDamping { uuid, props } => {
            world.update_body(&uuid, |c| c.angular_damping = props)?
        }
        Request::SetAllowSleep { uuid, props } => {
            world.update_body(&uuid, |c| c.allow_sleep = props)?
        }
        Request::SetSleepSpeedLimit { uuid, props } => {
            world.update_body(&uuid, |c| c.sleep_speed_limit = props)?
        }
        Request::SetSleepTimeLimit { uuid, props } => {
            world.update_body(&uuid, |c| c.sleep_time_limit = props)?
        }
        Request::SetCollisionFilterGroup { uuid, props } => {
            world.update_body(&uuid, |c| c.collision_filter_group = props.0)?
        }
        Request::SetCollisionFilterMask { uuid, props } => {
            world.update_body(&uuid, |c| c.collision_filter_mask = props.0)?
        }
        Request::SetCollisionResponse { uuid, props } => {
            world.update_body(&uuid, |c| c.collision_response = Some(props))?
        }
        Request::SetFixedRotation { uuid, props } => {
            world.update_body(&uuid, |c| c.fixed_rotation = props)?
        }
        Request::SetIsTrigger { uuid, props } => {
            world.update_body(&uuid, |c| c.is_trigger = props)?
        }
        Request::SetMaterial { uuid, props } => properties::set_material(world, &uuid, &props)?,
        Request::SetUserData { uuid, props } => world.update_body(&uuid, |c| c.user_data = props)?,

        Request::SetPosition { uuid, props } => properties::set_position(world, &uuid, props)?,
        Request::SetRotation { uuid, props } => properties::set_rotation(world, &uuid, props)?,
        Request::SetQuaternion { uuid, props } => properties::set_quaternion(world, &uuid, props)?,
        Request::SetVelocity { uuid, props } => properties::set_velocity(world, &uuid, props)?,
        Request::SetAngularVelocity { uuid, props } => {
            properties::set_angular_velocity(world, &uuid, props)?
        }
        Request::SetLinearFactor { uuid, props } => {
            world.update_body(&uuid, |c| c.linear_factor = props)?
        }
        Request::SetAngularFactor { uuid, props } => {
            world.update_body(&uuid, |c| c.angular_factor = props)?
        }

        Request::ApplyForce { uuid, props } => properties::apply_force(world, &uuid, props, false)?,
        Request::ApplyLocalForce { uuid, props } => {
            properties::apply_force(world, &uuid, props, true)?
        }
        Request::ApplyImpulse { uuid, props } => {
            properties::apply_impulse(world, &uuid, props, false)?
        }
        Request::ApplyLocalImpulse { uuid, props } => {
            properties::apply_impulse(world, &uuid, props, true)?
        }
        Request::ApplyTorque { uuid, props } => properties::apply_torque(world, &uuid, props)?,
    }
    Ok(None)
}
