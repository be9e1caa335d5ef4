//! Damped springs between two bodies, re-applied after every step.
//!
//! Force on `b` (and its opposite on `a`) at the world anchors:
//! `f = -(k * (|d| - rest) + c * dot(v_rel, u)) * u`, with `d = anchor_b - anchor_a`,
//! `u = d / |d|` and `v_rel` the relative velocity of the anchors.

use rapier3d::prelude::*;
use shared::constants::{
    DEFAULT_SPRING_DAMPING, DEFAULT_SPRING_REST_LENGTH, DEFAULT_SPRING_STIFFNESS,
};
use shared::{SpringProps, Vec3};

#[derive(Clone, Debug, PartialEq)]
pub struct Spring {
    pub id: String,
    pub body_a: String,
    pub body_b: String,
    pub rest_length: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub local_anchor_a: Point<f32>,
    pub local_anchor_b: Point<f32>,
}

fn to_point([x, y, z]: Vec3) -> Point<f32> {
    point![x, y, z]
}

impl Spring {
    /// World anchors take precedence over local ones and are converted with the bodies'
    /// current poses.
    pub fn new(id: &str, props: &SpringProps, a: &RigidBody, b: &RigidBody) -> Self {
        let anchor = |world: Option<Vec3>, local: Option<Vec3>, body: &RigidBody| {
            match (world, local) {
                (Some(world), _) => body.position().inverse_transform_point(&to_point(world)),
                (None, Some(local)) => to_point(local),
                (None, None) => Point::origin(),
            }
        };
        Self {
            id: id.to_string(),
            body_a: props.body_a.clone(),
            body_b: props.body_b.clone(),
            rest_length: props.rest_length.unwrap_or(DEFAULT_SPRING_REST_LENGTH),
            stiffness: props.stiffness.unwrap_or(DEFAULT_SPRING_STIFFNESS),
            damping: props.damping.unwrap_or(DEFAULT_SPRING_DAMPING),
            local_anchor_a: anchor(props.world_anchor_a, props.local_anchor_a, a),
            local_anchor_b: anchor(props.world_anchor_b, props.local_anchor_b, b),
        }
    }

    /// Force acting on body `b` at its anchor, plus both world anchors.
    pub fn force(&self, a: &RigidBody, b: &RigidBody) -> (Vector<f32>, Point<f32>, Point<f32>) {
        let world_a = a.position() * self.local_anchor_a;
        let world_b = b.position() * self.local_anchor_b;
        let d = world_b - world_a;
        let length = d.norm();
        if length <= f32::EPSILON {
            return (Vector::zeros(), world_a, world_b);
        }
        let u = d / length;
        let relative = b.velocity_at_point(&world_b) - a.velocity_at_point(&world_a);
        let magnitude =
            self.stiffness * (length - self.rest_length) + self.damping * relative.dot(&u);
        (-u * magnitude, world_a, world_b)
    }

    /// Adds this step's spring force to both bodies. Returns `false` when a body is gone.
    pub fn apply(&self, bodies: &mut RigidBodySet, a: RigidBodyHandle, b: RigidBodyHandle) -> bool {
        let (Some(body_a), Some(body_b)) = (bodies.get(a), bodies.get(b)) else {
            return false;
        };
        let (force, world_a, world_b) = self.force(body_a, body_b);
        if force == Vector::zeros() {
            return true;
        }
        if let Some(body) = bodies.get_mut(a) {
            body.add_force_at_point(-force, world_a, true);
        }
        if let Some(body) = bodies.get_mut(b) {
            body.add_force_at_point(force, world_b, true);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_at(x: f32) -> RigidBody {
        RigidBodyBuilder::dynamic().translation(vector![x, 0.0, 0.0]).build()
    }

    #[test]
    fn stretched_spring_pulls_together() {
        let a = body_at(0.0);
        let b = body_at(3.0);
        let spring = Spring::new(
            "s",
            &SpringProps {
                rest_length: Some(1.0),
                stiffness: Some(10.0),
                damping: Some(0.0),
                ..SpringProps::default()
            },
            &a,
            &b,
        );
        let (force, _, _) = spring.force(&a, &b);
        assert!((force - vector![-20.0, 0.0, 0.0]).norm() < 1.0e-4);
    }

    #[test]
    fn world_anchors_become_local() {
        let a = body_at(0.0);
        let b = body_at(5.0);
        let spring = Spring::new(
            "s",
            &SpringProps {
                world_anchor_a: Some([1.0, 0.0, 0.0]),
                world_anchor_b: Some([4.0, 0.0, 0.0]),
                ..SpringProps::default()
            },
            &a,
            &b,
        );
        assert!((spring.local_anchor_a - point![1.0, 0.0, 0.0]).norm() < 1.0e-6);
        assert!((spring.local_anchor_b - point![-1.0, 0.0, 0.0]).norm() < 1.0e-6);
    }

    #[test]
    fn missing_body_is_skipped() {
        let mut bodies = RigidBodySet::new();
        let a = bodies.insert(body_at(0.0));
        let spring = Spring::new("s", &SpringProps::default(), &bodies[a], &bodies[a]);
        let stale = RigidBodyHandle::from_raw_parts(7, 0);
        assert!(!spring.apply(&mut bodies, a, stale));
    }
}
