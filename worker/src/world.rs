//! The single mutable simulation world plus its identity tables.
//!
//! Responsibilities:
//! - Own the engine sets (bodies, colliders, joints) and pipeline state.
//! - Map caller identities to live engine objects, and back.
//! - Keep the body roster: the ordered identity list defining buffer slots.
//! - Hold the per-step phase hooks registered by rays, vehicles, springs and watchdogs.
//!
//! Invariants:
//! - Every identity in `roster` has a record, and every record's body handle maps back to the
//!   same identity in `by_handle`.
//! - Engine bodies without an identity never appear in frames or events.

use crate::body::{BodyBlueprint, BodyConfig, BodyRecord};
use crate::constraint::ConstraintRecord;
use crate::error::StepError;
use crate::events::ContactCollector;
use crate::material::{ContactCoefficients, MaterialRegistry};
use crate::ray::RegisteredRay;
use crate::spring::Spring;
use crate::subscription::Subscription;
use crate::vehicle::Vehicle;
use rapier3d::prelude::*;
use shared::constants::{
    DEFAULT_ALLOW_SLEEP, DEFAULT_AXIS_INDEX, DEFAULT_GRAVITY, DEFAULT_SOLVER_ITERATIONS,
    DEFAULT_STEP_SIZE, DEFAULT_TOLERANCE,
};
use shared::protocol::{Broadphase, SolverKind};
use shared::{Event, IdentityKind, InitProps, ProtocolError, Vec3};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;

/// World-level parameters from `init`.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldConfig {
    pub gravity: Vec3,
    pub allow_sleep: bool,
    pub iterations: u32,
    pub tolerance: f32,
    pub default_contact: ContactCoefficients,
    // Recorded only; the engine has a single broad phase and solver.
    pub broadphase: Broadphase,
    pub axis_index: u8,
    pub solver: SolverKind,
    pub quat_normalize_fast: bool,
    pub quat_normalize_skip: u32,
    pub friction_gravity: Option<Vec3>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            allow_sleep: DEFAULT_ALLOW_SLEEP,
            iterations: DEFAULT_SOLVER_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            default_contact: ContactCoefficients::default(),
            broadphase: Broadphase::Naive,
            axis_index: DEFAULT_AXIS_INDEX,
            solver: SolverKind::GaussSeidel,
            quat_normalize_fast: false,
            quat_normalize_skip: 0,
            friction_gravity: None,
        }
    }
}

impl WorldConfig {
    /// Applies the fields present in `props` on top of the defaults.
    pub fn from_init(props: &InitProps) -> Self {
        let defaults = Self::default();
        Self {
            gravity: props.gravity.unwrap_or(defaults.gravity),
            allow_sleep: props.allow_sleep.unwrap_or(defaults.allow_sleep),
            iterations: props.iterations.unwrap_or(defaults.iterations).max(1),
            tolerance: props.tolerance.unwrap_or(defaults.tolerance),
            default_contact: props
                .default_contact_material
                .as_ref()
                .map_or(defaults.default_contact, |o| defaults.default_contact.with_options(o)),
            broadphase: props.broadphase.unwrap_or(defaults.broadphase),
            axis_index: props.axis_index.unwrap_or(defaults.axis_index),
            solver: props.solver.unwrap_or(defaults.solver),
            quat_normalize_fast: props.quat_normalize_fast.unwrap_or(defaults.quat_normalize_fast),
            quat_normalize_skip: props.quat_normalize_skip.unwrap_or(defaults.quat_normalize_skip),
            friction_gravity: props.friction_gravity,
        }
    }

    pub fn gravity_vector(&self) -> Vector<f32> {
        let [x, y, z] = self.gravity;
        vector![x, y, z]
    }
}

/// A callback slot in one of the two step phases, named by the owning identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhaseHook {
    Ray(String),
    Vehicle(String),
    Spring(String),
    Watchdog(String),
    VehicleSync(String),
}

pub struct WorldState {
    pub config: WorldConfig,
    pub(crate) params: IntegrationParameters,
    pub(crate) pipeline: PhysicsPipeline,
    pub(crate) islands: IslandManager,
    pub(crate) broad_phase: BroadPhaseBvh,
    pub(crate) narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub impulse_joints: ImpulseJointSet,
    pub(crate) multibody_joints: MultibodyJointSet,
    pub(crate) ccd: CCDSolver,
    pub materials: MaterialRegistry,

    pub(crate) records: HashMap<String, BodyRecord>,
    pub(crate) by_handle: HashMap<RigidBodyHandle, String>,
    pub(crate) roster: Vec<String>,
    pub(crate) roster_changed: bool,

    pub constraints: HashMap<String, ConstraintRecord>,
    pub springs: HashMap<String, Spring>,
    pub rays: HashMap<String, RegisteredRay>,
    pub vehicles: HashMap<String, Vehicle>,
    pub subscriptions: BTreeMap<u32, Subscription>,

    pub(crate) pre_step: Vec<PhaseHook>,
    pub(crate) post_step: Vec<PhaseHook>,
    pub(crate) accumulator: f32,
    pub(crate) outbox: Vec<Event>,
    pub(crate) collector: ContactCollector,
    /// Colliders the broad phase has not seen yet; cleared by every engine step.
    pub(crate) unindexed: Vec<ColliderHandle>,
    pub(crate) faults: Vec<StepError>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldState {
    pub fn new() -> Self {
        let mut world = Self {
            config: WorldConfig::default(),
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            materials: MaterialRegistry::new(),
            records: HashMap::new(),
            by_handle: HashMap::new(),
            roster: Vec::new(),
            roster_changed: false,
            constraints: HashMap::new(),
            springs: HashMap::new(),
            rays: HashMap::new(),
            vehicles: HashMap::new(),
            subscriptions: BTreeMap::new(),
            pre_step: Vec::new(),
            post_step: Vec::new(),
            accumulator: 0.0,
            outbox: Vec::new(),
            collector: ContactCollector::default(),
            unindexed: Vec::new(),
            faults: Vec::new(),
        };
        world.apply_config();
        world
    }

    /// Reconfigures the world in place. Existing bodies keep their state; sleep settings are
    /// re-derived since they depend on the world flag.
    pub fn configure(&mut self, config: WorldConfig) {
        self.config = config;
        self.apply_config();
        for record in self.records.values() {
            record.sync(&mut self.bodies, &mut self.colliders, self.config.allow_sleep);
        }
    }

    fn apply_config(&mut self) {
        self.params.dt = DEFAULT_STEP_SIZE;
        self.params.num_solver_iterations =
            NonZeroUsize::new(self.config.iterations as usize).unwrap_or(NonZeroUsize::MIN).get();
        self.params.normalized_allowed_linear_error = self.config.tolerance.max(f32::EPSILON);
        self.materials.set_default_contact(self.config.default_contact);
    }

    pub fn body(&self, id: &str) -> Result<&BodyRecord, ProtocolError> {
        self.records
            .get(id)
            .ok_or_else(|| ProtocolError::unknown(IdentityKind::Body, id))
    }

    pub fn contains_body(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn body_handle(&self, id: &str) -> Result<RigidBodyHandle, ProtocolError> {
        self.body(id).map(|r| r.handle)
    }

    pub fn rigid_body(&self, id: &str) -> Result<&RigidBody, ProtocolError> {
        let handle = self.body_handle(id)?;
        self.bodies
            .get(handle)
            .ok_or_else(|| ProtocolError::unknown(IdentityKind::Body, id))
    }

    pub fn rigid_body_mut(&mut self, id: &str) -> Result<&mut RigidBody, ProtocolError> {
        let handle = self.body_handle(id)?;
        self.bodies
            .get_mut(handle)
            .ok_or_else(|| ProtocolError::unknown(IdentityKind::Body, id))
    }

    /// Changes a body's configuration and re-derives its engine state.
    pub fn update_body(
        &mut self,
        id: &str,
        change: impl FnOnce(&mut BodyConfig),
    ) -> Result<(), ProtocolError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| ProtocolError::unknown(IdentityKind::Body, id))?;
        change(&mut record.config);
        record.sync(&mut self.bodies, &mut self.colliders, self.config.allow_sleep);
        Ok(())
    }

    /// Identity of the body owning `handle`, if it has one.
    pub fn identity(&self, handle: RigidBodyHandle) -> Option<&str> {
        self.by_handle.get(&handle).map(String::as_str)
    }

    pub fn record_for_collider(&self, collider: ColliderHandle) -> Option<&BodyRecord> {
        let parent = self.colliders.get(collider)?.parent()?;
        self.records.get(self.by_handle.get(&parent)?)
    }

    pub fn insert_body(&mut self, id: &str, blueprint: BodyBlueprint) -> Result<(), ProtocolError> {
        if self.records.contains_key(id) {
            return Err(ProtocolError::DuplicateIdentity {
                kind: IdentityKind::Body,
                id: id.to_string(),
            });
        }
        let handle = self.bodies.insert(blueprint.body);
        let colliders: Vec<ColliderHandle> = blueprint
            .colliders
            .into_iter()
            .map(|c| self.colliders.insert_with_parent(c, handle, &mut self.bodies))
            .collect();
        self.unindexed.extend_from_slice(&colliders);
        if let Some(body) = self.bodies.get_mut(handle) {
            body.recompute_mass_properties_from_colliders(&self.colliders);
        }
        self.records.insert(
            id.to_string(),
            BodyRecord {
                id: id.to_string(),
                handle,
                colliders,
                config: blueprint.config,
            },
        );
        self.by_handle.insert(handle, id.to_string());
        self.roster.push(id.to_string());
        self.roster_changed = true;
        Ok(())
    }

    /// Removes a body. Constraints attached to it go with it; springs and vehicles that
    /// reference it stay registered.
    pub fn remove_body(&mut self, id: &str) -> Result<(), ProtocolError> {
        let record = self
            .records
            .remove(id)
            .ok_or_else(|| ProtocolError::unknown(IdentityKind::Body, id))?;
        self.by_handle.remove(&record.handle);
        self.roster.retain(|r| r != id);
        self.roster_changed = true;
        self.bodies.remove(
            record.handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );

        let attached: Vec<String> = self
            .constraints
            .values()
            .filter(|c| c.body_a == id || c.body_b == id)
            .map(|c| c.id.clone())
            .collect();
        for constraint in attached {
            log::debug!("constraint `{constraint}` removed with body `{id}`");
            self.constraints.remove(&constraint);
            self.unregister(&PhaseHook::Watchdog(constraint));
        }
        Ok(())
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn register_pre_step(&mut self, hook: PhaseHook) {
        self.pre_step.push(hook);
    }

    pub fn register_post_step(&mut self, hook: PhaseHook) {
        self.post_step.push(hook);
    }

    pub fn unregister(&mut self, hook: &PhaseHook) {
        self.pre_step.retain(|h| h != hook);
        self.post_step.retain(|h| h != hook);
    }

    pub fn push_event(&mut self, event: Event) {
        self.outbox.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    /// Step faults that did not stop the step (bodies disabled for diverging).
    pub fn drain_faults(&mut self) -> Vec<StepError> {
        std::mem::take(&mut self.faults)
    }

    /// Whether any dynamic body with an identity is awake.
    pub fn any_awake(&self) -> bool {
        self.records.values().any(|r| {
            self.bodies
                .get(r.handle)
                .is_some_and(|b| b.is_dynamic() && !b.is_sleeping())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::build_body;
    use serde_json::json;
    use shared::BodyProps;

    fn add(world: &mut WorldState, id: &str, props: serde_json::Value) {
        let props: BodyProps = serde_json::from_value(props).unwrap();
        let blueprint =
            build_body("Box", &props, &mut world.materials, world.config.allow_sleep).unwrap();
        world.insert_body(id, blueprint).unwrap();
    }

    #[test]
    fn identities_map_both_ways() {
        let mut world = WorldState::new();
        add(&mut world, "a", json!({ "mass": 1.0 }));
        add(&mut world, "b", json!({ "mass": 1.0 }));
        let handle = world.body_handle("b").unwrap();
        assert_eq!(world.identity(handle), Some("b"));
        let collider = world.body("b").unwrap().colliders[0];
        assert_eq!(world.record_for_collider(collider).unwrap().id, "b");
        assert_eq!(world.roster(), ["a", "b"]);
    }

    #[test]
    fn duplicate_and_unknown_identities() {
        let mut world = WorldState::new();
        add(&mut world, "a", json!({ "mass": 1.0 }));
        let props = BodyProps::default();
        let blueprint = build_body("Box", &props, &mut world.materials, false).unwrap();
        let err = world.insert_body("a", blueprint).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateIdentity { .. }));

        world.remove_body("a").unwrap();
        assert!(world.remove_body("a").unwrap_err().is_unknown_identity());
        assert!(world.roster().is_empty());
        assert!(world.roster_changed);
    }

    #[test]
    fn configure_keeps_recorded_knobs() {
        let mut world = WorldState::new();
        let props: InitProps = serde_json::from_value(json!({
            "gravity": [0, -20, 0],
            "iterations": 12,
            "broadphase": "SAP",
            "axisIndex": 2,
            "defaultContactMaterial": { "friction": 0.9 }
        }))
        .unwrap();
        world.configure(WorldConfig::from_init(&props));
        assert_eq!(world.config.gravity, [0.0, -20.0, 0.0]);
        assert_eq!(world.params.num_solver_iterations, 12);
        assert_eq!(world.config.broadphase, Broadphase::SweepAndPrune);
        assert_eq!(world.config.axis_index, 2);
        assert_eq!(world.materials.default_contact().friction, 0.9);
        assert_eq!(world.materials.default_contact().restitution, 0.0);
    }

    #[test]
    fn phase_hooks_unregister_from_both_phases() {
        let mut world = WorldState::new();
        world.register_pre_step(PhaseHook::Vehicle("car".into()));
        world.register_post_step(PhaseHook::VehicleSync("car".into()));
        world.register_post_step(PhaseHook::Spring("s".into()));
        world.unregister(&PhaseHook::Vehicle("car".into()));
        world.unregister(&PhaseHook::VehicleSync("car".into()));
        assert!(world.pre_step.is_empty());
        assert_eq!(world.post_step, vec![PhaseHook::Spring("s".into())]);
    }
}
