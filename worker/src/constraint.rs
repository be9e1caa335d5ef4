//! Constraints between two bodies, and the max-multiplier watchdog.
//!
//! Mapping onto engine joints:
//! - `PointToPoint`: spherical joint between the two pivots.
//! - `ConeTwist`: spherical joint whose frame X axis is the given axis, twist limited about X
//!   and swing limited about Y/Z.
//! - `Hinge`: revolute joint about the given axes, with an optional velocity motor.
//! - `Distance`: the three linear axes coupled and limited to exactly the target distance.
//! - `Lock`: fixed joint whose frames meet at the midpoint of the two bodies.
//!
//! # Watchdog
//! When `maxMultiplier` is set, the constraint is checked after every step: once the force
//! it applied (linear impulse over the step) exceeds the threshold, the joint is disabled and
//! stays disabled until `enableConstraint`.

use rapier3d::na::{Translation3, Unit};
use rapier3d::prelude::*;
use shared::constants::{DEFAULT_CONSTRAINT_MAX_FORCE, MOTOR_DAMPING};
use shared::{ConstraintKind, ConstraintProps, ProtocolError, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorState {
    pub enabled: bool,
    pub speed: f32,
    pub max_force: f32,
}

impl Default for MotorState {
    fn default() -> Self {
        Self {
            enabled: false,
            speed: 0.0,
            max_force: DEFAULT_CONSTRAINT_MAX_FORCE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConstraintRecord {
    pub id: String,
    pub kind: ConstraintKind,
    pub handle: ImpulseJointHandle,
    pub body_a: String,
    pub body_b: String,
    /// Recorded only; the engine's joints have no per-joint force cap.
    pub max_force: f32,
    pub max_multiplier: Option<f32>,
    pub motor: MotorState,
    /// How many times the watchdog disabled this constraint.
    pub trips: u32,
}

impl ConstraintRecord {
    pub fn set_enabled(&self, joints: &mut ImpulseJointSet, enabled: bool) {
        if let Some(joint) = joints.get_mut(self.handle, true) {
            joint.data.set_enabled(enabled);
        }
    }

    pub fn is_enabled(&self, joints: &ImpulseJointSet) -> bool {
        joints.get(self.handle).is_some_and(|j| j.data.is_enabled())
    }

    /// Applies the motor state to the live joint. Only hinges have a motor.
    pub fn update_motor(
        &mut self,
        joints: &mut ImpulseJointSet,
        change: impl FnOnce(&mut MotorState),
    ) -> Result<(), ProtocolError> {
        if self.kind != ConstraintKind::Hinge {
            return Err(ProtocolError::invalid(
                "motor",
                format!("constraint `{}` is not a hinge", self.id),
            ));
        }
        change(&mut self.motor);
        if let Some(joint) = joints.get_mut(self.handle, true) {
            let max_force = if self.motor.enabled {
                self.motor.max_force
            } else {
                0.0
            };
            joint
                .data
                .set_motor_velocity(JointAxis::AngX, self.motor.speed, MOTOR_DAMPING)
                .set_motor_max_force(JointAxis::AngX, max_force);
        }
        Ok(())
    }

    /// Post-step check. Returns `true` when this call disabled the joint.
    pub fn check_watchdog(&mut self, joints: &mut ImpulseJointSet, dt: f32) -> bool {
        let Some(threshold) = self.max_multiplier else {
            return false;
        };
        let Some(joint) = joints.get_mut(self.handle, false) else {
            return false;
        };
        if !joint.data.is_enabled() || dt <= 0.0 {
            return false;
        }
        let force = joint.impulses.fixed_rows::<3>(0).norm() / dt;
        if force <= threshold {
            return false;
        }
        joint.data.set_enabled(false);
        self.trips += 1;
        log::warn!(
            "constraint `{}` disabled: force {force:.1} exceeded max multiplier {threshold}",
            self.id
        );
        true
    }
}

fn point(v: Option<Vec3>) -> Point<f32> {
    let [x, y, z] = v.unwrap_or_default();
    point![x, y, z]
}

fn axis(what: &'static str, v: Option<Vec3>) -> Result<Unit<Vector<f32>>, ProtocolError> {
    let [x, y, z] = v.unwrap_or([1.0, 0.0, 0.0]);
    Unit::try_new(vector![x, y, z], 1.0e-6)
        .ok_or_else(|| ProtocolError::invalid(what, "axis has zero length"))
}

/// Builds the engine joint for a constraint between `a` and `b` in their current poses.
pub fn build_joint(
    kind: ConstraintKind,
    props: &ConstraintProps,
    a: &RigidBody,
    b: &RigidBody,
) -> Result<GenericJoint, ProtocolError> {
    let contacts = props.collide_connected.unwrap_or(true);
    let joint = match kind {
        ConstraintKind::PointToPoint => {
            SphericalJointBuilder::new()
                .local_anchor1(point(props.pivot_a))
                .local_anchor2(point(props.pivot_b))
                .contacts_enabled(contacts)
                .build()
                .data
        }

        ConstraintKind::ConeTwist => {
            let swing = props.angle.unwrap_or(0.0).abs();
            let twist = props.twist_angle.unwrap_or(0.0).abs();
            GenericJointBuilder::new(JointAxesMask::LOCKED_SPHERICAL_AXES)
                .local_anchor1(point(props.pivot_a))
                .local_anchor2(point(props.pivot_b))
                .local_axis1(axis("cone twist", props.axis_a)?)
                .local_axis2(axis("cone twist", props.axis_b)?)
                .limits(JointAxis::AngX, [-twist, twist])
                .limits(JointAxis::AngY, [-swing, swing])
                .limits(JointAxis::AngZ, [-swing, swing])
                .contacts_enabled(contacts)
                .build()
        }

        ConstraintKind::Hinge => GenericJointBuilder::new(JointAxesMask::LOCKED_REVOLUTE_AXES)
            .local_anchor1(point(props.pivot_a))
            .local_anchor2(point(props.pivot_b))
            .local_axis1(axis("hinge", props.axis_a)?)
            .local_axis2(axis("hinge", props.axis_b)?)
            .contacts_enabled(contacts)
            .build(),

        ConstraintKind::Distance => {
            let distance = match props.distance {
                Some(d) if d >= 0.0 => d,
                Some(d) => {
                    return Err(ProtocolError::invalid(
                        "distance",
                        format!("negative distance {d}"),
                    ));
                }
                None => (a.translation() - b.translation()).norm(),
            };
            GenericJointBuilder::new(JointAxesMask::empty())
                .coupled_axes(JointAxesMask::LIN_AXES)
                .limits(JointAxis::LinX, [distance, distance])
                .contacts_enabled(contacts)
                .build()
        }

        ConstraintKind::Lock => {
            let midpoint = (a.translation() + b.translation()) * 0.5;
            let world = Isometry::from_parts(Translation3::from(midpoint), *a.rotation());
            FixedJointBuilder::new()
                .local_frame1(a.position().inv_mul(&world))
                .local_frame2(b.position().inv_mul(&world))
                .contacts_enabled(contacts)
                .build()
                .data
        }
    };
    Ok(joint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_at(x: f32) -> RigidBody {
        RigidBodyBuilder::dynamic().translation(vector![x, 0.0, 0.0]).build()
    }

    #[test]
    fn distance_defaults_to_current_separation() {
        let joint = build_joint(
            ConstraintKind::Distance,
            &ConstraintProps::default(),
            &body_at(0.0),
            &body_at(3.0),
        )
        .unwrap();
        let limits = joint.limits(JointAxis::LinX).unwrap();
        assert!((limits.min - 3.0).abs() < 1.0e-6);
        assert!((limits.max - 3.0).abs() < 1.0e-6);
    }

    #[test]
    fn zero_axis_is_rejected() {
        let props = ConstraintProps {
            axis_a: Some([0.0; 3]),
            ..ConstraintProps::default()
        };
        let err =
            build_joint(ConstraintKind::Hinge, &props, &body_at(0.0), &body_at(1.0)).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidRequest { .. }));
    }

    #[test]
    fn lock_frames_meet_at_midpoint() {
        let a = body_at(0.0);
        let b = body_at(2.0);
        let joint = build_joint(ConstraintKind::Lock, &ConstraintProps::default(), &a, &b).unwrap();
        let world1 = a.position() * joint.local_frame1;
        let world2 = b.position() * joint.local_frame2;
        assert!((world1.translation.vector - vector![1.0, 0.0, 0.0]).norm() < 1.0e-6);
        assert!((world2.translation.vector - world1.translation.vector).norm() < 1.0e-6);
    }

    #[test]
    fn motor_is_hinge_only() {
        let mut bodies = RigidBodySet::new();
        let h1 = bodies.insert(body_at(0.0));
        let h2 = bodies.insert(body_at(1.0));
        let mut joints = ImpulseJointSet::new();
        let joint = build_joint(
            ConstraintKind::PointToPoint,
            &ConstraintProps::default(),
            &bodies[h1],
            &bodies[h2],
        )
        .unwrap();
        let handle = joints.insert(h1, h2, joint, true);
        let mut record = ConstraintRecord {
            id: "p2p".into(),
            kind: ConstraintKind::PointToPoint,
            handle,
            body_a: "a".into(),
            body_b: "b".into(),
            max_force: DEFAULT_CONSTRAINT_MAX_FORCE,
            max_multiplier: None,
            motor: MotorState::default(),
            trips: 0,
        };
        assert!(record.update_motor(&mut joints, |m| m.enabled = true).is_err());
        assert!(!record.motor.enabled);
        assert!(!record.check_watchdog(&mut joints, 1.0 / 60.0));
    }
}
