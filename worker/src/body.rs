//! Body factory: property bag -> rigid body + colliders, and the record kept per identity.
//!
//! Design notes:
//! - Every shape is parsed and built before anything touches the world, so a bad shape
//!   leaves the world unchanged.
//! - [`BodyConfig`] is the caller-facing view of a body (what was asked for). The engine
//!   objects are derived from it by [`BodyRecord::sync`], which every setter re-runs.
//! - Mass is split evenly over the body's colliders so the inertia tensor always follows the
//!   shapes.

use crate::material::{MaterialId, MaterialRegistry};
use crate::shape::build_shape;
use crate::tag::pack_tag;
use rapier3d::na::{Translation3, UnitQuaternion};
use rapier3d::prelude::*;
use serde_json::Value;
use shared::constants::{
    DEFAULT_ANGULAR_DAMPING, DEFAULT_COLLISION_GROUP, DEFAULT_COLLISION_MASK,
    DEFAULT_LINEAR_DAMPING, DEFAULT_SLEEP_SPEED_LIMIT, DEFAULT_SLEEP_TIME_LIMIT,
};
use shared::rotation::resolve_orientation;
use shared::{BodyProps, BodyType, ProtocolError, ShapeDesc, Vec3};

/// Shape tag of a body assembled from `props.shapes`.
pub const COMPOUND: &str = "Compound";

/// Largest damping fraction mapped onto the engine's damping coefficient.
const MAX_DAMPING: f32 = 0.999_999;

/// Everything the caller configured on a body.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyConfig {
    pub body_type: BodyType,
    /// Requested mass. See [`BodyConfig::effective_mass`].
    pub mass: f32,
    pub material: Option<MaterialId>,
    /// Per-collider material overrides (compound shapes).
    pub shape_materials: Vec<Option<MaterialId>>,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub allow_sleep: bool,
    pub sleep_speed_limit: f32,
    pub sleep_time_limit: f32,
    pub collision_filter_group: u32,
    pub collision_filter_mask: u32,
    /// Tri-state: `None` keeps the engine default (respond).
    pub collision_response: Option<bool>,
    pub fixed_rotation: bool,
    pub is_trigger: bool,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    pub user_data: Value,
    pub on_collide: bool,
}

impl BodyConfig {
    /// Static and kinematic bodies are massless regardless of what was requested.
    pub fn effective_mass(&self) -> f32 {
        match self.body_type {
            BodyType::Dynamic => self.mass.max(0.0),
            BodyType::Static | BodyType::Kinematic => 0.0,
        }
    }

    pub fn responds(&self) -> bool {
        self.collision_response.unwrap_or(true)
    }

    pub fn can_sleep(&self, world_allow_sleep: bool) -> bool {
        world_allow_sleep && self.allow_sleep
    }

    pub fn interaction_groups(&self) -> InteractionGroups {
        InteractionGroups::all()
            .with_memberships(Group::from_bits_truncate(self.collision_filter_group))
            .with_filter(Group::from_bits_truncate(self.collision_filter_mask))
    }

    fn collider_material(&self, index: usize) -> Option<MaterialId> {
        self.shape_materials.get(index).copied().flatten().or(self.material)
    }

    fn apply_to_collider(&self, index: usize, mass_share: f32, collider: &mut Collider) {
        collider.set_mass(mass_share);
        collider.set_sensor(self.is_trigger);
        collider.set_collision_groups(self.interaction_groups());
        collider.set_solver_groups(self.interaction_groups());
        collider.set_active_collision_types(if self.is_trigger {
            ActiveCollisionTypes::all()
        } else {
            ActiveCollisionTypes::default()
        });
        collider.user_data = pack_tag(self.collider_material(index), self.responds());
    }

    fn apply_to_body(&self, body: &mut RigidBody, world_allow_sleep: bool) {
        let body_type = rapier_body_type(self.body_type);
        if body.body_type() != body_type {
            body.set_body_type(body_type, true);
        }
        body.set_linear_damping(rapier_damping(self.linear_damping));
        body.set_angular_damping(rapier_damping(self.angular_damping));

        let [tx, ty, tz] = self.linear_factor.map(|f| f != 0.0);
        body.set_enabled_translations(tx, ty, tz, false);
        if self.fixed_rotation {
            body.lock_rotations(true, false);
        } else {
            let [rx, ry, rz] = self.angular_factor.map(|f| f != 0.0);
            body.set_enabled_rotations(rx, ry, rz, false);
        }

        let can_sleep = self.can_sleep(world_allow_sleep);
        let activation = body.activation_mut();
        if can_sleep {
            activation.normalized_linear_threshold = self.sleep_speed_limit;
            activation.angular_threshold = self.sleep_speed_limit;
            activation.time_until_sleep = self.sleep_time_limit;
        } else {
            activation.normalized_linear_threshold = -1.0;
            activation.angular_threshold = -1.0;
        }
        if !can_sleep && body.is_sleeping() {
            body.wake_up(true);
        }
    }
}

/// Live body registered under an identity.
#[derive(Clone, Debug)]
pub struct BodyRecord {
    pub id: String,
    pub handle: RigidBodyHandle,
    pub colliders: Vec<ColliderHandle>,
    pub config: BodyConfig,
}

impl BodyRecord {
    /// Re-derives the engine body and colliders from `config` and recomputes mass properties.
    pub fn sync(
        &self,
        bodies: &mut RigidBodySet,
        colliders: &mut ColliderSet,
        world_allow_sleep: bool,
    ) {
        let share = mass_share(self.config.effective_mass(), self.colliders.len());
        for (index, &handle) in self.colliders.iter().enumerate() {
            if let Some(collider) = colliders.get_mut(handle) {
                self.config.apply_to_collider(index, share, collider);
            }
        }
        if let Some(body) = bodies.get_mut(self.handle) {
            self.config.apply_to_body(body, world_allow_sleep);
            body.recompute_mass_properties_from_colliders(colliders);
        }
    }
}

/// A body ready to be inserted, built entirely from validated input.
pub struct BodyBlueprint {
    pub body: RigidBody,
    pub colliders: Vec<Collider>,
    pub config: BodyConfig,
}

struct PlacedShape {
    desc: ShapeDesc,
    offset: Isometry<f32>,
    material: Option<MaterialId>,
}

/// Builds the body for one identity of an `addBodies` batch.
///
/// # Errors
/// Any shape error for `shape_tag` (or for one of the compound shapes); in that case nothing
/// has been built and the world is untouched.
pub fn build_body(
    shape_tag: &str,
    props: &BodyProps,
    materials: &mut MaterialRegistry,
    world_allow_sleep: bool,
) -> Result<BodyBlueprint, ProtocolError> {
    let shapes = placed_shapes(shape_tag, props, materials)?;

    let body_type = props.body_type.unwrap_or_else(|| {
        if props.mass.unwrap_or(0.0) > 0.0 {
            BodyType::Dynamic
        } else {
            BodyType::Static
        }
    });
    let config = BodyConfig {
        body_type,
        mass: match body_type {
            BodyType::Static => 0.0,
            _ => props.mass.unwrap_or(0.0).max(0.0),
        },
        material: props.material.as_ref().map(|m| materials.intern(m)),
        shape_materials: shapes.iter().map(|s| s.material).collect(),
        linear_damping: props.linear_damping.unwrap_or(DEFAULT_LINEAR_DAMPING),
        angular_damping: props.angular_damping.unwrap_or(DEFAULT_ANGULAR_DAMPING),
        allow_sleep: props.allow_sleep.unwrap_or(true),
        sleep_speed_limit: props.sleep_speed_limit.unwrap_or(DEFAULT_SLEEP_SPEED_LIMIT),
        sleep_time_limit: props.sleep_time_limit.unwrap_or(DEFAULT_SLEEP_TIME_LIMIT),
        collision_filter_group: props
            .collision_filter_group
            .map_or(DEFAULT_COLLISION_GROUP, |g| g.0),
        collision_filter_mask: props
            .collision_filter_mask
            .map_or(DEFAULT_COLLISION_MASK, |m| m.0),
        collision_response: props.collision_response,
        fixed_rotation: props.fixed_rotation.unwrap_or(false),
        is_trigger: props.is_trigger.unwrap_or(false),
        linear_factor: props.linear_factor.unwrap_or([1.0; 3]),
        angular_factor: props.angular_factor.unwrap_or([1.0; 3]),
        user_data: props.user_data.clone(),
        on_collide: props.on_collide,
    };

    let [x, y, z] = props.position.unwrap_or_default();
    let orientation = resolve_orientation(props.quaternion, props.rotation);
    let [vx, vy, vz] = props.velocity.unwrap_or_default();
    let [wx, wy, wz] = props.angular_velocity.unwrap_or_default();
    let mut body = RigidBodyBuilder::new(rapier_body_type(body_type))
        .pose(Isometry::from_parts(Translation3::new(x, y, z), orientation))
        .linvel(vector![vx, vy, vz])
        .angvel(vector![wx, wy, wz])
        .build();
    config.apply_to_body(&mut body, world_allow_sleep);

    let share = mass_share(config.effective_mass(), shapes.len());
    let mut colliders = Vec::with_capacity(shapes.len());
    for (index, placed) in shapes.into_iter().enumerate() {
        let built = build_shape(&placed.desc)?;
        let local = placed.offset * built.offset;
        let mut collider = ColliderBuilder::new(built.shape)
            .translation(local.translation.vector)
            .rotation(local.rotation.scaled_axis())
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS | ActiveHooks::MODIFY_SOLVER_CONTACTS)
            .build();
        config.apply_to_collider(index, share, &mut collider);
        colliders.push(collider);
    }

    Ok(BodyBlueprint {
        body,
        colliders,
        config,
    })
}

fn placed_shapes(
    shape_tag: &str,
    props: &BodyProps,
    materials: &mut MaterialRegistry,
) -> Result<Vec<PlacedShape>, ProtocolError> {
    if shape_tag != COMPOUND {
        let desc = ShapeDesc::parse(shape_tag, &props.args)?;
        build_shape(&desc)?;
        return Ok(vec![PlacedShape {
            desc,
            offset: Isometry::identity(),
            material: None,
        }]);
    }

    if props.shapes.is_empty() {
        return Err(ProtocolError::invalid("compound body", "no shapes given"));
    }
    let mut placed = Vec::with_capacity(props.shapes.len());
    for shape in &props.shapes {
        let desc = ShapeDesc::parse(&shape.shape_type, &shape.args)?;
        build_shape(&desc)?;
        let [x, y, z] = shape.position.unwrap_or_default();
        let rotation: UnitQuaternion<f32> = resolve_orientation(shape.quaternion, shape.rotation);
        placed.push(PlacedShape {
            desc,
            offset: Isometry::from_parts(Translation3::new(x, y, z), rotation),
            material: None,
        });
    }
    // Interned only once every shape is known to be valid.
    for (slot, shape) in placed.iter_mut().zip(&props.shapes) {
        slot.material = shape.material.as_ref().map(|m| materials.intern(m));
    }
    Ok(placed)
}

fn mass_share(mass: f32, colliders: usize) -> f32 {
    if colliders == 0 { 0.0 } else { mass / colliders as f32 }
}

pub fn rapier_body_type(body_type: BodyType) -> RigidBodyType {
    match body_type {
        BodyType::Dynamic => RigidBodyType::Dynamic,
        BodyType::Static => RigidBodyType::Fixed,
        BodyType::Kinematic => RigidBodyType::KinematicVelocityBased,
    }
}

/// Maps a per-second velocity loss fraction onto the engine's continuous damping coefficient.
///
/// A fraction `d` leaves `(1 - d)^t` of the velocity after `t` seconds, which is the engine's
/// exponential decay with coefficient `-ln(1 - d)`.
pub fn rapier_damping(fraction: f32) -> f32 {
    -(1.0 - fraction.clamp(0.0, MAX_DAMPING)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::protocol::CompoundShape;
    use shared::{GroupMask, MaterialRef};

    fn props(value: serde_json::Value) -> BodyProps {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn static_type_zeroes_mass() {
        let mut materials = MaterialRegistry::new();
        let blueprint = build_body(
            "Box",
            &props(json!({ "type": "Static", "mass": 50.0 })),
            &mut materials,
            false,
        )
        .unwrap();
        assert_eq!(blueprint.config.body_type, BodyType::Static);
        assert_eq!(blueprint.config.effective_mass(), 0.0);
        assert_eq!(blueprint.colliders[0].mass(), 0.0);
        assert!(blueprint.body.is_fixed());
    }

    #[test]
    fn body_type_follows_mass_when_absent() {
        let mut materials = MaterialRegistry::new();
        let dynamic =
            build_body("Sphere", &props(json!({ "mass": 1.0 })), &mut materials, false).unwrap();
        assert!(dynamic.body.is_dynamic());
        let fixed = build_body("Sphere", &props(json!({})), &mut materials, false).unwrap();
        assert!(fixed.body.is_fixed());
    }

    #[test]
    fn unknown_shape_type_builds_nothing() {
        let mut materials = MaterialRegistry::new();
        let err = build_body(
            "Torus",
            &props(json!({ "mass": 1.0, "material": "steel" })),
            &mut materials,
            false,
        )
        .err()
        .unwrap();
        assert_eq!(err, ProtocolError::UnknownShapeType("Torus".into()));
        assert!(materials.get(0).is_none());
    }

    #[test]
    fn quaternion_wins_over_rotation() {
        let mut materials = MaterialRegistry::new();
        let blueprint = build_body(
            "Box",
            &props(json!({
                "mass": 1.0,
                "rotation": [1.0, 0.0, 0.0],
                "quaternion": [0.0, 0.0, 0.0, 1.0],
                "position": [1.0, 2.0, 3.0]
            })),
            &mut materials,
            false,
        )
        .unwrap();
        assert!(blueprint.body.rotation().angle() < 1.0e-6);
        assert!((blueprint.body.translation() - vector![1.0, 2.0, 3.0]).norm() < 1.0e-6);
    }

    #[test]
    fn compound_places_each_shape() {
        let mut materials = MaterialRegistry::new();
        let mut bag = props(json!({ "mass": 2.0 }));
        bag.shapes = vec![
            CompoundShape {
                shape_type: "Box".into(),
                args: json!([1, 1, 1]),
                position: Some([0.0, 1.0, 0.0]),
                rotation: None,
                quaternion: None,
                material: Some(MaterialRef::Named("rubber".into())),
            },
            CompoundShape {
                shape_type: "Sphere".into(),
                args: json!(0.5),
                position: Some([0.0, -1.0, 0.0]),
                rotation: None,
                quaternion: None,
                material: None,
            },
        ];
        let blueprint = build_body(COMPOUND, &bag, &mut materials, false).unwrap();
        assert_eq!(blueprint.colliders.len(), 2);
        assert!((blueprint.colliders[0].mass() - 1.0).abs() < 1.0e-6);
        assert_eq!(blueprint.config.shape_materials, vec![Some(0), None]);

        let (mut bodies, mut colliders) = (RigidBodySet::new(), ColliderSet::new());
        let mut body = blueprint.body;
        body.set_translation(vector![3.0, 0.0, 0.0], false);
        let parent = bodies.insert(body);
        let placed: Vec<_> = blueprint
            .colliders
            .into_iter()
            .map(|c| colliders.insert_with_parent(c, parent, &mut bodies))
            .collect();
        for (handle, y) in placed.into_iter().zip([1.0, -1.0]) {
            let collider = &colliders[handle];
            let local = collider.position_wrt_parent().unwrap().translation.vector;
            assert!((local - vector![0.0, y, 0.0]).norm() < 1.0e-6, "local offset {local:?}");
            let world = collider.position().translation.vector;
            assert!((world - vector![3.0, y, 0.0]).norm() < 1.0e-6, "world position {world:?}");
        }
    }

    #[test]
    fn empty_compound_is_rejected() {
        let mut materials = MaterialRegistry::new();
        let err = build_body(COMPOUND, &props(json!({ "mass": 1.0 })), &mut materials, false)
            .err()
            .unwrap();
        assert!(matches!(err, ProtocolError::InvalidRequest { .. }));
    }

    #[test]
    fn collision_response_is_tri_state() {
        let mut materials = MaterialRegistry::new();
        let mut bag = props(json!({ "mass": 1.0 }));
        let default = build_body("Box", &bag, &mut materials, false).unwrap();
        assert_eq!(default.config.collision_response, None);
        assert!(default.config.responds());

        bag.collision_response = Some(false);
        bag.collision_filter_group = Some(GroupMask(4));
        let silent = build_body("Box", &bag, &mut materials, false).unwrap();
        assert!(!crate::tag::tag_responds(silent.colliders[0].user_data));
        assert_eq!(silent.colliders[0].collision_groups().memberships.bits(), 4);
    }

    #[test]
    fn damping_mapping() {
        assert_eq!(rapier_damping(0.0), 0.0);
        assert!((rapier_damping(0.5) - std::f32::consts::LN_2).abs() < 1.0e-6);
        assert!(rapier_damping(1.0).is_finite());
    }
}
