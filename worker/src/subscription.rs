//! Property subscriptions, evaluated once per frame.
//!
//! A subscription is parsed into a typed property when it is registered, so an unknown
//! property name is rejected up front instead of failing every frame.

use crate::body::BodyRecord;
use crate::material::MaterialRegistry;
use crate::vehicle::Vehicle;
use rapier3d::prelude::*;
use serde_json::Value;
use shared::rotation::{euler_xyz_from_quat, quat_to_array};
use shared::{ObservedValue, ProtocolError, SubscribeProps, SubscriptionTarget};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyProperty {
    Mass,
    LinearDamping,
    AngularDamping,
    AllowSleep,
    SleepSpeedLimit,
    SleepTimeLimit,
    CollisionFilterGroup,
    CollisionFilterMask,
    CollisionResponse,
    FixedRotation,
    IsTrigger,
    Material,
    UserData,
    Position,
    Velocity,
    AngularVelocity,
    LinearFactor,
    AngularFactor,
    Quaternion,
    Rotation,
}

impl FromStr for BodyProperty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "mass" => BodyProperty::Mass,
            "linearDamping" => BodyProperty::LinearDamping,
            "angularDamping" => BodyProperty::AngularDamping,
            "allowSleep" => BodyProperty::AllowSleep,
            "sleepSpeedLimit" => BodyProperty::SleepSpeedLimit,
            "sleepTimeLimit" => BodyProperty::SleepTimeLimit,
            "collisionFilterGroup" => BodyProperty::CollisionFilterGroup,
            "collisionFilterMask" => BodyProperty::CollisionFilterMask,
            "collisionResponse" => BodyProperty::CollisionResponse,
            "fixedRotation" => BodyProperty::FixedRotation,
            "isTrigger" => BodyProperty::IsTrigger,
            "material" => BodyProperty::Material,
            "userData" => BodyProperty::UserData,
            "position" => BodyProperty::Position,
            "velocity" => BodyProperty::Velocity,
            "angularVelocity" => BodyProperty::AngularVelocity,
            "linearFactor" => BodyProperty::LinearFactor,
            "angularFactor" => BodyProperty::AngularFactor,
            "quaternion" => BodyProperty::Quaternion,
            "rotation" => BodyProperty::Rotation,
            _ => return Err(()),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleProperty {
    Sliding,
}

impl FromStr for VehicleProperty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sliding" => Ok(VehicleProperty::Sliding),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observed {
    Body(BodyProperty),
    Vehicle(VehicleProperty),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    pub target: String,
    pub property: Observed,
    /// Wire name, echoed back in each observation.
    pub name: String,
}

impl Subscription {
    pub fn new(target: &str, props: &SubscribeProps) -> Result<Self, ProtocolError> {
        let unknown = || ProtocolError::UnknownProperty {
            property: props.property.clone(),
            target: props.target.to_string(),
        };
        let property = match props.target {
            SubscriptionTarget::Bodies => {
                Observed::Body(props.property.parse().map_err(|_| unknown())?)
            }
            SubscriptionTarget::Vehicles => {
                Observed::Vehicle(props.property.parse().map_err(|_| unknown())?)
            }
        };
        Ok(Self {
            target: target.to_string(),
            property,
            name: props.property.clone(),
        })
    }
}

fn vector(v: &Vector<f32>) -> ObservedValue {
    ObservedValue::from([v.x, v.y, v.z])
}

/// Current value of a body property.
pub fn observe_body(
    property: BodyProperty,
    record: &BodyRecord,
    body: &RigidBody,
    materials: &MaterialRegistry,
) -> ObservedValue {
    let config = &record.config;
    match property {
        BodyProperty::Mass => config.effective_mass().into(),
        BodyProperty::LinearDamping => config.linear_damping.into(),
        BodyProperty::AngularDamping => config.angular_damping.into(),
        BodyProperty::AllowSleep => config.allow_sleep.into(),
        BodyProperty::SleepSpeedLimit => config.sleep_speed_limit.into(),
        BodyProperty::SleepTimeLimit => config.sleep_time_limit.into(),
        BodyProperty::CollisionFilterGroup => config.collision_filter_group.into(),
        BodyProperty::CollisionFilterMask => config.collision_filter_mask.into(),
        BodyProperty::CollisionResponse => config.responds().into(),
        BodyProperty::FixedRotation => config.fixed_rotation.into(),
        BodyProperty::IsTrigger => config.is_trigger.into(),
        BodyProperty::Material => config
            .material
            .and_then(|id| materials.get(id))
            .map_or(Value::Null, |m| m.describe())
            .into(),
        BodyProperty::UserData => config.user_data.clone().into(),
        BodyProperty::Position => vector(body.translation()),
        BodyProperty::Velocity => vector(body.linvel()),
        BodyProperty::AngularVelocity => vector(body.angvel()),
        BodyProperty::LinearFactor => config.linear_factor.into(),
        BodyProperty::AngularFactor => config.angular_factor.into(),
        BodyProperty::Quaternion => quat_to_array(body.rotation()).into(),
        BodyProperty::Rotation => euler_xyz_from_quat(body.rotation()).into(),
    }
}

pub fn observe_vehicle(property: VehicleProperty, vehicle: &Vehicle) -> ObservedValue {
    match property {
        VehicleProperty::Sliding => vehicle.sliding.into(),
    }
}
