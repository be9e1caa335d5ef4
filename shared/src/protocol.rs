//! Wire types for the caller <-> worker boundary.
//!
//! Responsibilities:
//! - One [`Request`] variant per operation, tagged by `op` (camelCase op names).
//! - Outbound [`WorkerMessage`]s: `frame`, `event` (sub-typed by `type`), `error`.
//!
//! Design notes:
//! - Only plain data crosses the boundary: identities, numbers, arrays. Nothing here refers
//!   to a live engine object.
//! - Optional request fields stay `Option` all the way to the worker so "absent" and
//!   "explicitly set" remain distinguishable (e.g. `collisionResponse` is tri-state).
//! - Transform buffers move with the `step` request and come back with the `frame`.

use crate::error::ErrorKind;
use crate::rotation::{Quat, Vec3};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Collision group or mask bits.
///
/// Callers frequently send `-1` for "all groups", so any 32-bit pattern is accepted whether it
/// arrives signed or unsigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupMask(pub u32);

impl<'de> Deserialize<'de> for GroupMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(GroupMask(raw as u32))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    #[default]
    Dynamic,
    Static,
    Kinematic,
}

/// A material given by name or by its option set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaterialRef {
    Named(String),
    Options(MaterialOptions),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialOptions {
    pub name: Option<String>,
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
}

/// One shape of a compound body, placed relative to the body origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundShape {
    #[serde(rename = "type")]
    pub shape_type: String,
    #[serde(default)]
    pub args: Value,
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub quaternion: Option<Quat>,
    pub material: Option<MaterialRef>,
}

/// Property bag for one body of an `addBodies` batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BodyProps {
    pub args: Value,
    pub mass: Option<f32>,
    #[serde(rename = "type")]
    pub body_type: Option<BodyType>,
    pub material: Option<MaterialRef>,
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub quaternion: Option<Quat>,
    pub velocity: Option<Vec3>,
    pub angular_velocity: Option<Vec3>,
    pub linear_factor: Option<Vec3>,
    pub angular_factor: Option<Vec3>,
    pub linear_damping: Option<f32>,
    pub angular_damping: Option<f32>,
    pub allow_sleep: Option<bool>,
    pub sleep_speed_limit: Option<f32>,
    pub sleep_time_limit: Option<f32>,
    pub collision_filter_group: Option<GroupMask>,
    pub collision_filter_mask: Option<GroupMask>,
    pub collision_response: Option<bool>,
    pub fixed_rotation: Option<bool>,
    pub is_trigger: Option<bool>,
    pub user_data: Value,
    /// Whether the caller registered a collide callback. The callback itself stays behind.
    pub on_collide: bool,
    /// Shapes of a `Compound` body.
    pub shapes: Vec<CompoundShape>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Broadphase {
    Naive,
    #[serde(rename = "SAP")]
    SweepAndPrune,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    #[serde(rename = "GS")]
    GaussSeidel,
    Split,
}

/// Overrides carried by a contact material (and by the world default).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContactMaterialOptions {
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
    pub contact_equation_stiffness: Option<f32>,
    pub contact_equation_relaxation: Option<f32>,
    pub friction_equation_stiffness: Option<f32>,
    pub friction_equation_relaxation: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMaterialProps {
    pub material_a: MaterialRef,
    pub material_b: MaterialRef,
    #[serde(flatten)]
    pub options: ContactMaterialOptions,
}

/// World configuration. Every field is optional; see `constants` for the defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitProps {
    pub gravity: Option<Vec3>,
    pub tolerance: Option<f32>,
    pub iterations: Option<u32>,
    pub allow_sleep: Option<bool>,
    pub broadphase: Option<Broadphase>,
    pub axis_index: Option<u8>,
    pub default_contact_material: Option<ContactMaterialOptions>,
    pub quat_normalize_fast: Option<bool>,
    pub quat_normalize_skip: Option<u32>,
    pub friction_gravity: Option<Vec3>,
    pub solver: Option<SolverKind>,
    /// Expected body count, used to pre-size buffers.
    pub size: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProps {
    pub step_size: f32,
    #[serde(default)]
    pub time_since_last_called: Option<f32>,
    #[serde(default)]
    pub max_sub_steps: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    PointToPoint,
    ConeTwist,
    Hinge,
    Distance,
    Lock,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConstraintProps {
    pub body_a: String,
    pub body_b: String,
    pub pivot_a: Option<Vec3>,
    pub pivot_b: Option<Vec3>,
    pub axis_a: Option<Vec3>,
    pub axis_b: Option<Vec3>,
    /// Cone-twist swing limit (radians).
    pub angle: Option<f32>,
    /// Cone-twist twist limit (radians).
    pub twist_angle: Option<f32>,
    /// Distance constraint target; the current separation when absent.
    pub distance: Option<f32>,
    pub max_force: Option<f32>,
    /// Auto-disable threshold on the solved constraint force.
    pub max_multiplier: Option<f32>,
    pub collide_connected: Option<bool>,
    pub wake_up_bodies: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpringProps {
    pub body_a: String,
    pub body_b: String,
    pub rest_length: Option<f32>,
    pub stiffness: Option<f32>,
    pub damping: Option<f32>,
    pub local_anchor_a: Option<Vec3>,
    pub local_anchor_b: Option<Vec3>,
    /// World-space anchors, converted to local anchors at creation.
    pub world_anchor_a: Option<Vec3>,
    pub world_anchor_b: Option<Vec3>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RayMode {
    #[default]
    Closest,
    Any,
    All,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RayProps {
    pub from: Vec3,
    pub to: Vec3,
    #[serde(default)]
    pub mode: RayMode,
    #[serde(default)]
    pub collision_filter_group: Option<GroupMask>,
    #[serde(default)]
    pub collision_filter_mask: Option<GroupMask>,
    #[serde(default)]
    pub skip_backfaces: Option<bool>,
    /// Ignore bodies that do not respond to collisions.
    #[serde(default)]
    pub check_collision_response: Option<bool>,
}

/// Per-wheel parameters. Directions and points are chassis-local.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WheelInfoProps {
    pub radius: Option<f32>,
    pub direction_local: Option<Vec3>,
    pub axle_local: Option<Vec3>,
    pub chassis_connection_point_local: Option<Vec3>,
    pub suspension_stiffness: Option<f32>,
    pub suspension_rest_length: Option<f32>,
    pub max_suspension_force: Option<f32>,
    pub max_suspension_travel: Option<f32>,
    pub damping_relaxation: Option<f32>,
    pub damping_compression: Option<f32>,
    pub friction_slip: Option<f32>,
    pub roll_influence: Option<f32>,
    pub is_front_wheel: Option<bool>,
    pub use_custom_sliding_rotational_speed: Option<bool>,
    pub custom_sliding_rotational_speed: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VehicleProps {
    pub chassis_body: String,
    /// Wheel body identities, one per entry of `wheel_infos`.
    pub wheels: Vec<String>,
    pub wheel_infos: Vec<WheelInfoProps>,
    pub index_forward_axis: Option<usize>,
    pub index_right_axis: Option<usize>,
    pub index_up_axis: Option<usize>,
}

/// `[value, wheelIndex]`.
pub type WheelValue = (f32, usize);

/// `[force or impulse, point]`.
pub type VectorAtPoint = (Vec3, Vec3);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTarget {
    #[default]
    Bodies,
    Vehicles,
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubscriptionTarget::Bodies => "body",
            SubscriptionTarget::Vehicles => "vehicle",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeProps {
    pub id: u32,
    #[serde(rename = "type")]
    pub property: String,
    #[serde(default)]
    pub target: SubscriptionTarget,
}

/// Every operation the worker understands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    Init {
        #[serde(default)]
        props: InitProps,
    },
    Step {
        props: StepProps,
        #[serde(default)]
        positions: Vec<f32>,
        #[serde(default)]
        quaternions: Vec<f32>,
    },

    AddBodies {
        uuid: Vec<String>,
        /// Shape type tag, or `Compound`.
        #[serde(rename = "type")]
        shape: String,
        props: Vec<BodyProps>,
    },
    RemoveBodies {
        uuid: Vec<String>,
    },

    AddConstraint {
        uuid: String,
        #[serde(rename = "type")]
        kind: ConstraintKind,
        props: ConstraintProps,
    },
    RemoveConstraint { uuid: String },
    EnableConstraint { uuid: String },
    DisableConstraint { uuid: String },
    EnableConstraintMotor { uuid: String },
    DisableConstraintMotor { uuid: String },
    SetConstraintMotorSpeed { uuid: String, props: f32 },
    SetConstraintMotorMaxForce { uuid: String, props: f32 },

    AddSpring { uuid: String, props: SpringProps },
    RemoveSpring { uuid: String },
    SetSpringStiffness { uuid: String, props: f32 },
    SetSpringRestLength { uuid: String, props: f32 },
    SetSpringDamping { uuid: String, props: f32 },

    AddRay { uuid: String, props: RayProps },
    RemoveRay { uuid: String },

    AddRaycastVehicle { uuid: String, props: VehicleProps },
    RemoveRaycastVehicle { uuid: String },
    ApplyRaycastVehicleEngineForce { uuid: String, props: WheelValue },
    SetRaycastVehicleSteeringValue { uuid: String, props: WheelValue },
    SetRaycastVehicleBrake { uuid: String, props: WheelValue },

    AddContactMaterial { uuid: String, props: ContactMaterialProps },
    RemoveContactMaterial { uuid: String },

    Subscribe { uuid: String, props: SubscribeProps },
    Unsubscribe { props: u32 },

    Sleep { uuid: String },
    WakeUp { uuid: String },

    SetMass { uuid: String, props: f32 },
    SetLinearDamping { uuid: String, props: f32 },
    SetAngularDamping { uuid: String, props: f32 },
    SetAllowSleep { uuid: String, props: bool },
    SetSleepSpeedLimit { uuid: String, props: f32 },
    SetSleepTimeLimit { uuid: String, props: f32 },
    SetCollisionFilterGroup { uuid: String, props: GroupMask },
    SetCollisionFilterMask { uuid: String, props: GroupMask },
    SetCollisionResponse { uuid: String, props: bool },
    SetFixedRotation { uuid: String, props: bool },
    SetIsTrigger { uuid: String, props: bool },
    SetMaterial { uuid: String, props: MaterialRef },
    SetUserData { uuid: String, props: Value },

    SetPosition { uuid: String, props: Vec3 },
    SetRotation { uuid: String, props: Vec3 },
    SetQuaternion { uuid: String, props: Quat },
    SetVelocity { uuid: String, props: Vec3 },
    SetAngularVelocity { uuid: String, props: Vec3 },
    SetLinearFactor { uuid: String, props: Vec3 },
    SetAngularFactor { uuid: String, props: Vec3 },

    ApplyForce { uuid: String, props: VectorAtPoint },
    ApplyImpulse { uuid: String, props: VectorAtPoint },
    ApplyLocalForce { uuid: String, props: VectorAtPoint },
    ApplyLocalImpulse { uuid: String, props: VectorAtPoint },
    ApplyTorque { uuid: String, props: Vec3 },
}

impl Request {
    /// Wire name of the operation, for logs and error reports.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Init { .. } => "init",
            Request::Step { .. } => "step",
            Request::AddBodies { .. } => "addBodies",
            Request::RemoveBodies { .. } => "removeBodies",
            Request::AddConstraint { .. } => "addConstraint",
            Request::RemoveConstraint { .. } => "removeConstraint",
            Request::EnableConstraint { .. } => "enableConstraint",
            Request::DisableConstraint { .. } => "disableConstraint",
            Request::EnableConstraintMotor { .. } => "enableConstraintMotor",
            Request::DisableConstraintMotor { .. } => "disableConstraintMotor",
            Request::SetConstraintMotorSpeed { .. } => "setConstraintMotorSpeed",
            Request::SetConstraintMotorMaxForce { .. } => "setConstraintMotorMaxForce",
            Request::AddSpring { .. } => "addSpring",
            Request::RemoveSpring { .. } => "removeSpring",
            Request::SetSpringStiffness { .. } => "setSpringStiffness",
            Request::SetSpringRestLength { .. } => "setSpringRestLength",
            Request::SetSpringDamping { .. } => "setSpringDamping",
            Request::AddRay { .. } => "addRay",
            Request::RemoveRay { .. } => "removeRay",
            Request::AddRaycastVehicle { .. } => "addRaycastVehicle",
            Request::RemoveRaycastVehicle { .. } => "removeRaycastVehicle",
            Request::ApplyRaycastVehicleEngineForce { .. } => "applyRaycastVehicleEngineForce",
            Request::SetRaycastVehicleSteeringValue { .. } => "setRaycastVehicleSteeringValue",
            Request::SetRaycastVehicleBrake { .. } => "setRaycastVehicleBrake",
            Request::AddContactMaterial { .. } => "addContactMaterial",
            Request::RemoveContactMaterial { .. } => "removeContactMaterial",
            Request::Subscribe { .. } => "subscribe",
            Request::Unsubscribe { .. } => "unsubscribe",
            Request::Sleep { .. } => "sleep",
            Request::WakeUp { .. } => "wakeUp",
            Request::SetMass { .. } => "setMass",
            Request::SetLinearDamping { .. } => "setLinearDamping",
            Request::SetAngularDamping { .. } => "setAngularDamping",
            Request::SetAllowSleep { .. } => "setAllowSleep",
            Request::SetSleepSpeedLimit { .. } => "setSleepSpeedLimit",
            Request::SetSleepTimeLimit { .. } => "setSleepTimeLimit",
            Request::SetCollisionFilterGroup { .. } => "setCollisionFilterGroup",
            Request::SetCollisionFilterMask { .. } => "setCollisionFilterMask",
            Request::SetCollisionResponse { .. } => "setCollisionResponse",
            Request::SetFixedRotation { .. } => "setFixedRotation",
            Request::SetIsTrigger { .. } => "setIsTrigger",
            Request::SetMaterial { .. } => "setMaterial",
            Request::SetUserData { .. } => "setUserData",
            Request::SetPosition { .. } => "setPosition",
            Request::SetRotation { .. } => "setRotation",
            Request::SetQuaternion { .. } => "setQuaternion",
            Request::SetVelocity { .. } => "setVelocity",
            Request::SetAngularVelocity { .. } => "setAngularVelocity",
            Request::SetLinearFactor { .. } => "setLinearFactor",
            Request::SetAngularFactor { .. } => "setAngularFactor",
            Request::ApplyForce { .. } => "applyForce",
            Request::ApplyImpulse { .. } => "applyImpulse",
            Request::ApplyLocalForce { .. } => "applyLocalForce",
            Request::ApplyLocalImpulse { .. } => "applyLocalImpulse",
            Request::ApplyTorque { .. } => "applyTorque",
        }
    }
}

/// A subscribed property value, flattened to plain data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservedValue {
    Bool(bool),
    Number(f32),
    Vector(Vec<f32>),
    Json(Value),
}

impl From<bool> for ObservedValue {
    fn from(v: bool) -> Self {
        ObservedValue::Bool(v)
    }
}

impl From<f32> for ObservedValue {
    fn from(v: f32) -> Self {
        ObservedValue::Number(v)
    }
}

impl From<u32> for ObservedValue {
    fn from(v: u32) -> Self {
        ObservedValue::Number(v as f32)
    }
}

impl From<Vec3> for ObservedValue {
    fn from(v: Vec3) -> Self {
        ObservedValue::Vector(v.to_vec())
    }
}

impl From<Quat> for ObservedValue {
    fn from(v: Quat) -> Self {
        ObservedValue::Vector(v.to_vec())
    }
}

impl From<Value> for ObservedValue {
    fn from(v: Value) -> Self {
        ObservedValue::Json(v)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: u32,
    pub value: ObservedValue,
    pub property: String,
}

/// One step's worth of state.
///
/// `positions` holds `x y z` and `quaternions` holds `x y z w` per body, in roster order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub positions: Vec<f32>,
    pub quaternions: Vec<f32>,
    pub observations: Vec<Observation>,
    pub active: bool,
    /// Full ordered identity roster, present only when it changed since the last frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bodies: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionFilters {
    pub body_filter_group: u32,
    pub body_filter_mask: u32,
    pub target_filter_group: u32,
    pub target_filter_mask: u32,
}

/// Contact detail of one colliding pair.
///
/// `bi`/`bj` keep the engine's pair order, so both participants see the same `ni`. Only
/// `contact_normal` is expressed relative to the event target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub bi: String,
    pub bj: String,
    /// World-space normal pointing from `bi` towards `bj`.
    pub ni: Vec3,
    /// Contact point relative to `bi`'s center of mass.
    pub ri: Vec3,
    /// Contact point relative to `bj`'s center of mass.
    pub rj: Vec3,
    pub contact_point: Vec3,
    /// Normal pointing away from the event target, towards the other body.
    pub contact_normal: Vec3,
    pub impact_velocity: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollideEvent {
    /// Body whose callback fires.
    pub target: String,
    /// The other body.
    pub body: String,
    /// `None` for sensor (trigger) overlaps.
    pub contact: Option<ContactInfo>,
    pub collision_filters: CollisionFilters,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactPairEvent {
    pub target: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RayInfo {
    pub uuid: String,
    pub from: Vec3,
    pub to: Vec3,
    pub direction: Vec3,
    pub collision_filter_group: u32,
    pub collision_filter_mask: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RayHitEvent {
    pub ray: RayInfo,
    pub has_hit: bool,
    /// Identity of the hit body; `None` on a miss.
    pub body: Option<String>,
    pub hit_point_world: Vec3,
    pub hit_normal_world: Vec3,
    pub distance: f32,
    pub should_stop: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "collide")]
    Collide(CollideEvent),
    #[serde(rename = "collideBegin")]
    CollideBegin(ContactPairEvent),
    #[serde(rename = "collideEnd")]
    CollideEnd(ContactPairEvent),
    #[serde(rename = "rayhit")]
    RayHit(RayHitEvent),
}

impl Event {
    /// Identity whose registry the event is dispatched to.
    pub fn target(&self) -> &str {
        match self {
            Event::Collide(e) => &e.target,
            Event::CollideBegin(e) | Event::CollideEnd(e) => &e.target,
            Event::RayHit(e) => &e.ray.uuid,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Op name of the request that failed. Sent as `request` since `op` tags the message.
    #[serde(rename = "request")]
    pub op: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Everything the worker sends back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum WorkerMessage {
    Frame(Frame),
    Event(Event),
    Error(ErrorReport),
}
