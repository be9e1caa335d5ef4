//! Raycast vehicle: one chassis body, N wheel bodies driven by per-wheel suspension rays.
//!
//! Two-phase coupling with the step loop:
//! - **pre-step** ([`Vehicle::pre_step`]): cast each wheel's suspension ray, compute spring
//!   forces, then lateral/forward friction, and apply the resulting impulses to the chassis
//!   (and the reaction to dynamic ground bodies).
//! - **post-step** ([`Vehicle::post_step`]): recompute each wheel's world transform from the
//!   chassis pose, steering, spin and suspension length, and write it onto the wheel body.
//!
//! Wheel geometry (`directionLocal`, `axleLocal`, `chassisConnectionPointLocal`) is in chassis
//! space. The wheel's spin axis is the axle; steering rotates about `-directionLocal`.

use crate::error::StepError;
use crate::ray::{QueryScene, RayQuery, cast_closest};
use rapier3d::na::{Translation3, Unit, UnitQuaternion};
use rapier3d::prelude::*;
use shared::{ProtocolError, VehicleProps, WheelInfoProps};

const SIDE_FRICTION_STIFFNESS: f32 = 1.0;
const FORWARD_FACTOR: f32 = 0.5;
const SIDE_FACTOR: f32 = 1.0;
const CONTACT_DAMPING: f32 = 0.2;
const AIRBORNE_SPIN_DAMPING: f32 = 0.99;
/// Below this `dot(hitNormal, direction)` the suspension is considered loaded.
const MIN_CONTACT_DOT: f32 = -0.1;

fn vec3([x, y, z]: [f32; 3]) -> Vector<f32> {
    vector![x, y, z]
}

fn unit_axis(index: usize) -> Vector<f32> {
    let mut v = Vector::zeros();
    v[index.min(2)] = 1.0;
    v
}

#[derive(Clone, Debug, PartialEq)]
pub struct WheelInfo {
    pub radius: f32,
    pub direction_local: Vector<f32>,
    pub axle_local: Vector<f32>,
    pub connection_local: Point<f32>,
    pub suspension_stiffness: f32,
    pub suspension_rest_length: f32,
    pub max_suspension_force: f32,
    pub max_suspension_travel: f32,
    pub damping_relaxation: f32,
    pub damping_compression: f32,
    pub friction_slip: f32,
    pub roll_influence: f32,
    pub is_front_wheel: bool,
    pub custom_sliding_rotational_speed: Option<f32>,

    pub engine_force: f32,
    pub steering: f32,
    pub brake: f32,

    pub suspension_length: f32,
    pub suspension_force: f32,
    pub suspension_relative_velocity: f32,
    pub clipped_inv_contact_dot_suspension: f32,
    pub in_contact: bool,
    pub hit_point: Point<f32>,
    pub hit_normal: Vector<f32>,
    pub ground: Option<RigidBodyHandle>,
    pub rotation: f32,
    pub delta_rotation: f32,
    pub side_impulse: f32,
    pub forward_impulse: f32,
    pub skid_info: f32,
    pub sliding: bool,

    pub connection_world: Point<f32>,
    pub direction_world: Vector<f32>,
    pub axle_world: Vector<f32>,
    pub world_transform: Isometry<f32>,
}

impl WheelInfo {
    pub fn new(props: &WheelInfoProps) -> Self {
        let rest = props.suspension_rest_length.unwrap_or(1.0);
        Self {
            radius: props.radius.unwrap_or(1.0),
            direction_local: vec3(props.direction_local.unwrap_or([0.0, -1.0, 0.0])),
            axle_local: vec3(props.axle_local.unwrap_or([-1.0, 0.0, 0.0])),
            connection_local: Point::from(vec3(
                props.chassis_connection_point_local.unwrap_or_default(),
            )),
            suspension_stiffness: props.suspension_stiffness.unwrap_or(30.0),
            suspension_rest_length: rest,
            max_suspension_force: props.max_suspension_force.unwrap_or(f32::MAX),
            max_suspension_travel: props.max_suspension_travel.unwrap_or(1.0),
            damping_relaxation: props.damping_relaxation.unwrap_or(2.3),
            damping_compression: props.damping_compression.unwrap_or(4.4),
            friction_slip: props.friction_slip.unwrap_or(10.5),
            roll_influence: props.roll_influence.unwrap_or(0.01),
            is_front_wheel: props.is_front_wheel.unwrap_or(true),
            custom_sliding_rotational_speed: match props.use_custom_sliding_rotational_speed {
                Some(true) => Some(props.custom_sliding_rotational_speed.unwrap_or(-0.1)),
                _ => None,
            },
            engine_force: 0.0,
            steering: 0.0,
            brake: 0.0,
            suspension_length: rest,
            suspension_force: 0.0,
            suspension_relative_velocity: 0.0,
            clipped_inv_contact_dot_suspension: 1.0,
            in_contact: false,
            hit_point: Point::origin(),
            hit_normal: Vector::zeros(),
            ground: None,
            rotation: 0.0,
            delta_rotation: 0.0,
            side_impulse: 0.0,
            forward_impulse: 0.0,
            skid_info: 1.0,
            sliding: false,
            connection_world: Point::origin(),
            direction_world: Vector::zeros(),
            axle_world: Vector::zeros(),
            world_transform: Isometry::identity(),
        }
    }

    fn update_world_frame(&mut self, chassis: &Isometry<f32>) {
        self.in_contact = false;
        self.connection_world = chassis * self.connection_local;
        self.direction_world = chassis * self.direction_local;
        self.axle_world = chassis * self.axle_local;
    }

    /// Recomputes `world_transform` from the chassis pose and the current wheel state.
    fn update_transform(&mut self, chassis: &Isometry<f32>) {
        self.update_world_frame(chassis);
        let up = -self.direction_local;
        let about = |axis: Vector<f32>, angle: f32| {
            Unit::try_new(axis, 1.0e-6).map_or_else(UnitQuaternion::identity, |axis| {
                UnitQuaternion::from_axis_angle(&axis, angle)
            })
        };
        let steer = about(up, self.steering);
        let spin = about(self.axle_local, self.rotation);
        let rotation = chassis.rotation * steer * spin;
        let position = self.connection_world + self.direction_world * self.suspension_length;
        self.world_transform = Isometry::from_parts(Translation3::from(position.coords), rotation);
    }
}

#[derive(Clone, Debug)]
pub struct Vehicle {
    pub id: String,
    pub chassis: String,
    pub wheel_bodies: Vec<String>,
    pub wheels: Vec<WheelInfo>,
    pub forward_axis: usize,
    pub right_axis: usize,
    pub up_axis: usize,
    /// True when any wheel exceeded its friction budget during the last pre-step.
    pub sliding: bool,
}

/// Resolved engine handles for one vehicle update.
pub struct VehicleBodies<'a> {
    pub chassis: RigidBodyHandle,
    pub wheels: &'a [RigidBodyHandle],
}

fn inv_mass(body: &RigidBody) -> f32 {
    if body.is_dynamic() && body.mass() > 0.0 { 1.0 / body.mass() } else { 0.0 }
}

/// World-space inverse inertia applied to `v`.
fn inv_inertia_mul(body: &RigidBody, v: &Vector<f32>) -> Vector<f32> {
    if !body.is_dynamic() {
        return Vector::zeros();
    }
    let props = &body.mass_properties().local_mprops;
    let frame = body.rotation() * props.principal_inertia_local_frame;
    let local = frame.inverse_transform_vector(v);
    let inertia = props.principal_inertia();
    let scaled = local.zip_map(&inertia, |a, i| if i > f32::EPSILON { a / i } else { 0.0 });
    frame * scaled
}

fn impulse_denominator(body: &RigidBody, pos: &Point<f32>, normal: &Vector<f32>) -> f32 {
    let r = pos - body.center_of_mass();
    let c = r.cross(normal);
    let v = inv_inertia_mul(body, &c).cross(&r);
    inv_mass(body) + normal.dot(&v)
}

fn rolling_friction(
    chassis: &RigidBody,
    ground: &RigidBody,
    pos: &Point<f32>,
    dir: &Vector<f32>,
    max_impulse: f32,
) -> f32 {
    let relative = chassis.velocity_at_point(pos) - ground.velocity_at_point(pos);
    let vrel = dir.dot(&relative);
    let denominator =
        impulse_denominator(chassis, pos, dir) + impulse_denominator(ground, pos, dir);
    if denominator <= f32::EPSILON {
        return 0.0;
    }
    (-vrel / denominator).clamp(-max_impulse, max_impulse)
}

fn side_friction(
    chassis: &RigidBody,
    ground: &RigidBody,
    pos: &Point<f32>,
    axle: &Vector<f32>,
) -> f32 {
    if axle.norm_squared() > 1.1 {
        return 0.0;
    }
    let relative = chassis.velocity_at_point(pos) - ground.velocity_at_point(pos);
    let inv = inv_mass(chassis) + inv_mass(ground);
    if inv <= 0.0 {
        return 0.0;
    }
    -CONTACT_DAMPING * axle.dot(&relative) / inv
}

impl Vehicle {
    pub fn new(id: &str, props: &VehicleProps) -> Result<Self, ProtocolError> {
        if props.wheels.len() != props.wheel_infos.len() {
            return Err(ProtocolError::invalid(
                "raycast vehicle",
                format!(
                    "{} wheel bodies for {} wheel infos",
                    props.wheels.len(),
                    props.wheel_infos.len()
                ),
            ));
        }
        let axis = |v: Option<usize>, default: usize| match v.unwrap_or(default) {
            i @ 0..=2 => Ok(i),
            i => Err(ProtocolError::invalid(
                "raycast vehicle",
                format!("axis index {i} out of range"),
            )),
        };
        Ok(Self {
            id: id.to_string(),
            chassis: props.chassis_body.clone(),
            wheel_bodies: props.wheels.clone(),
            wheels: props.wheel_infos.iter().map(WheelInfo::new).collect(),
            forward_axis: axis(props.index_forward_axis, 2)?,
            right_axis: axis(props.index_right_axis, 0)?,
            up_axis: axis(props.index_up_axis, 1)?,
            sliding: false,
        })
    }

    fn wheel_mut(&mut self, index: usize) -> Result<&mut WheelInfo, ProtocolError> {
        let count = self.wheels.len();
        self.wheels.get_mut(index).ok_or_else(|| {
            ProtocolError::invalid(
                "wheel index",
                format!("{index} out of range for {count} wheels"),
            )
        })
    }

    pub fn apply_engine_force(&mut self, value: f32, index: usize) -> Result<(), ProtocolError> {
        self.wheel_mut(index)?.engine_force = value;
        Ok(())
    }

    pub fn set_steering_value(&mut self, value: f32, index: usize) -> Result<(), ProtocolError> {
        self.wheel_mut(index)?.steering = value;
        Ok(())
    }

    pub fn set_brake(&mut self, value: f32, index: usize) -> Result<(), ProtocolError> {
        self.wheel_mut(index)?.brake = value;
        Ok(())
    }

    pub fn wheel_transforms(&self) -> impl Iterator<Item = &Isometry<f32>> {
        self.wheels.iter().map(|w| &w.world_transform)
    }

    /// Suspension and friction update, run before the engine step.
    pub fn pre_step(
        &mut self,
        handles: &VehicleBodies<'_>,
        bodies: &mut RigidBodySet,
        scene: &QueryScene<'_>,
        dt: f32,
    ) -> Result<(), StepError> {
        let vehicle = self.id.clone();
        let missing = || StepError::MissingChassis {
            vehicle: vehicle.clone(),
        };
        let chassis_pose = *bodies.get(handles.chassis).ok_or_else(missing)?.position();
        for wheel in &mut self.wheels {
            wheel.update_transform(&chassis_pose);
        }

        let mut exclude = Vec::with_capacity(handles.wheels.len() + 1);
        exclude.push(handles.chassis);
        exclude.extend_from_slice(handles.wheels);

        // Suspension rays.
        let bodies_view = &*bodies;
        let chassis = bodies_view.get(handles.chassis).ok_or_else(missing)?;
        let chassis_mass = chassis.mass();
        for wheel in &mut self.wheels {
            cast_wheel(wheel, chassis, scene, bodies_view, &chassis_pose, &exclude);
            wheel.suspension_force = if wheel.in_contact {
                let diff = wheel.suspension_rest_length - wheel.suspension_length;
                let mut force =
                    wheel.suspension_stiffness * diff * wheel.clipped_inv_contact_dot_suspension;
                let rel = wheel.suspension_relative_velocity;
                let damping = if rel < 0.0 {
                    wheel.damping_compression
                } else {
                    wheel.damping_relaxation
                };
                force -= damping * rel;
                (force * chassis_mass).max(0.0)
            } else {
                0.0
            };
        }

        if let Some(chassis) = bodies.get_mut(handles.chassis) {
            for wheel in &self.wheels {
                let force = wheel.suspension_force.min(wheel.max_suspension_force);
                if force > 0.0 {
                    chassis.apply_impulse_at_point(
                        wheel.hit_normal * (force * dt),
                        wheel.hit_point,
                        true,
                    );
                }
            }
        }

        self.update_friction(handles.chassis, bodies, dt)?;

        // Wheel spin from the chassis velocity at each connection point.
        let chassis = bodies.get(handles.chassis).ok_or_else(missing)?;
        let forward_world = chassis_pose.rotation * unit_axis(self.forward_axis);
        let sign = if self.up_axis == 1 { -1.0 } else { 1.0 };
        for wheel in &mut self.wheels {
            let velocity = chassis.velocity_at_point(&wheel.connection_world);
            if wheel.in_contact {
                let projected =
                    forward_world - wheel.hit_normal * forward_world.dot(&wheel.hit_normal);
                wheel.delta_rotation = sign * projected.dot(&velocity) * dt / wheel.radius;
            }
            if let Some(speed) = wheel.custom_sliding_rotational_speed {
                if (wheel.sliding || !wheel.in_contact) && wheel.engine_force != 0.0 {
                    wheel.delta_rotation = wheel.engine_force.signum() * speed * dt;
                }
            }
            if wheel.brake.abs() > wheel.engine_force.abs() {
                wheel.delta_rotation = 0.0;
            }
            wheel.rotation += wheel.delta_rotation;
            wheel.delta_rotation *= AIRBORNE_SPIN_DAMPING;
        }
        Ok(())
    }

    fn update_friction(
        &mut self,
        chassis_handle: RigidBodyHandle,
        bodies: &mut RigidBodySet,
        dt: f32,
    ) -> Result<(), StepError> {
        let chassis = bodies.get(chassis_handle).ok_or_else(|| StepError::MissingChassis {
            vehicle: self.id.clone(),
        })?;
        let count = self.wheels.len();
        let mut axles = vec![Vector::zeros(); count];
        let mut forwards = vec![Vector::zeros(); count];

        for (i, wheel) in self.wheels.iter_mut().enumerate() {
            wheel.side_impulse = 0.0;
            wheel.forward_impulse = 0.0;
            let Some(ground) = wheel.ground.and_then(|h| bodies.get(h)) else {
                continue;
            };
            let axle = wheel.world_transform.rotation * unit_axis(self.right_axis);
            let normal = wheel.hit_normal;
            let axle = axle - normal * axle.dot(&normal);
            let axle = axle.try_normalize(1.0e-6).unwrap_or(axle);
            let forward = normal.cross(&axle);
            forwards[i] = forward.try_normalize(1.0e-6).unwrap_or(forward);
            axles[i] = axle;
            wheel.side_impulse =
                side_friction(chassis, ground, &wheel.hit_point, &axle) * SIDE_FRICTION_STIFFNESS;
        }

        self.sliding = false;
        for (i, wheel) in self.wheels.iter_mut().enumerate() {
            wheel.skid_info = 1.0;
            wheel.sliding = false;
            let Some(ground) = wheel.ground.and_then(|h| bodies.get(h)) else {
                continue;
            };
            let max_rolling = if wheel.brake != 0.0 { wheel.brake } else { 0.0 };
            let rolling = rolling_friction(
                chassis,
                ground,
                &wheel.hit_point,
                &forwards[i],
                max_rolling.abs(),
            ) + wheel.engine_force * dt;

            let max_impulse = wheel.suspension_force * dt * wheel.friction_slip;
            wheel.forward_impulse = rolling;
            let x = wheel.forward_impulse * FORWARD_FACTOR;
            let y = wheel.side_impulse * SIDE_FACTOR;
            let squared = x * x + y * y;
            if squared > max_impulse * max_impulse {
                self.sliding = true;
                wheel.sliding = true;
                wheel.skid_info *= max_impulse / squared.sqrt();
            }
        }

        if self.sliding {
            for wheel in &mut self.wheels {
                if wheel.side_impulse != 0.0 && wheel.skid_info < 1.0 {
                    wheel.forward_impulse *= wheel.skid_info;
                    wheel.side_impulse *= wheel.skid_info;
                }
            }
        }

        let com = *chassis.center_of_mass();
        let chassis_rotation = *chassis.rotation();
        for (i, wheel) in self.wheels.iter().enumerate() {
            let Some(ground) = wheel.ground else {
                continue;
            };
            if wheel.forward_impulse != 0.0 {
                if let Some(chassis) = bodies.get_mut(chassis_handle) {
                    chassis.apply_impulse_at_point(
                        forwards[i] * wheel.forward_impulse,
                        wheel.hit_point,
                        true,
                    );
                }
            }
            if wheel.side_impulse != 0.0 {
                let side = axles[i] * wheel.side_impulse;
                // Roll influence scales the lever arm along the chassis up axis.
                let mut local = chassis_rotation.inverse_transform_vector(&(wheel.hit_point - com));
                local[self.up_axis] *= wheel.roll_influence;
                let at = com + chassis_rotation * local;
                if let Some(chassis) = bodies.get_mut(chassis_handle) {
                    chassis.apply_impulse_at_point(side, at, true);
                }
                if let Some(ground) = bodies.get_mut(ground).filter(|g| g.is_dynamic()) {
                    ground.apply_impulse_at_point(-side, wheel.hit_point, true);
                }
            }
        }
        Ok(())
    }

    /// Writes each wheel's world transform onto its body, run after the engine step.
    pub fn post_step(
        &mut self,
        handles: &VehicleBodies<'_>,
        bodies: &mut RigidBodySet,
    ) -> Result<(), StepError> {
        let chassis_pose = *bodies
            .get(handles.chassis)
            .ok_or_else(|| StepError::MissingChassis {
                vehicle: self.id.clone(),
            })?
            .position();
        for (index, (wheel, &handle)) in self.wheels.iter_mut().zip(handles.wheels).enumerate() {
            wheel.update_transform(&chassis_pose);
            let body = bodies.get_mut(handle).ok_or_else(|| StepError::MissingWheel {
                vehicle: self.id.clone(),
                wheel: index,
                body: self.wheel_bodies.get(index).cloned().unwrap_or_default(),
            })?;
            body.set_translation(wheel.world_transform.translation.vector, false);
            body.set_rotation(wheel.world_transform.rotation, false);
        }
        Ok(())
    }
}

fn cast_wheel(
    wheel: &mut WheelInfo,
    chassis: &RigidBody,
    scene: &QueryScene<'_>,
    bodies: &RigidBodySet,
    chassis_pose: &Isometry<f32>,
    exclude: &[RigidBodyHandle],
) {
    wheel.update_world_frame(chassis_pose);
    let length = wheel.suspension_rest_length + wheel.radius;
    let dir = wheel
        .direction_world
        .try_normalize(1.0e-6)
        .unwrap_or(wheel.direction_world);
    let query = RayQuery {
        origin: wheel.connection_world,
        dir,
        max_toi: length * wheel.direction_world.norm(),
        group: u32::MAX,
        mask: u32::MAX,
        skip_backfaces: true,
        check_response: true,
        exclude,
    };

    wheel.ground = None;
    let Some(hit) = cast_closest(scene, bodies, &query) else {
        wheel.suspension_length = wheel.suspension_rest_length;
        wheel.suspension_relative_velocity = 0.0;
        wheel.hit_normal = -wheel.direction_world;
        wheel.clipped_inv_contact_dot_suspension = 1.0;
        return;
    };

    wheel.in_contact = true;
    wheel.ground = Some(hit.body);
    wheel.hit_point = hit.point;
    wheel.hit_normal = hit.normal;
    let min = wheel.suspension_rest_length - wheel.max_suspension_travel;
    let max = wheel.suspension_rest_length + wheel.max_suspension_travel;
    wheel.suspension_length = (hit.toi - wheel.radius).clamp(min.min(max), max);

    let denominator = hit.normal.dot(&wheel.direction_world);
    let projected = hit.normal.dot(&chassis.velocity_at_point(&hit.point));
    if denominator >= MIN_CONTACT_DOT {
        wheel.suspension_relative_velocity = 0.0;
        wheel.clipped_inv_contact_dot_suspension = 1.0 / -MIN_CONTACT_DOT;
    } else {
        let inv = -1.0 / denominator;
        wheel.suspension_relative_velocity = projected * inv;
        wheel.clipped_inv_contact_dot_suspension = inv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_scene<'a>(
        colliders: &'a ColliderSet,
        broad_phase: &'a BroadPhaseBvh,
        narrow_phase: &'a NarrowPhase,
    ) -> QueryScene<'a> {
        QueryScene {
            broad_phase,
            narrow_phase,
            colliders,
            unindexed: &[],
        }
    }

    fn props(wheels: usize) -> VehicleProps {
        VehicleProps {
            chassis_body: "chassis".into(),
            wheels: (0..wheels).map(|i| format!("wheel/{i}")).collect(),
            wheel_infos: (0..wheels).map(|_| WheelInfoProps::default()).collect(),
            ..VehicleProps::default()
        }
    }

    #[test]
    fn wheel_counts_must_match() {
        let mut bad = props(2);
        bad.wheels.pop();
        assert!(Vehicle::new("car", &bad).is_err());
        assert!(Vehicle::new("car", &props(4)).is_ok());
    }

    #[test]
    fn controls_validate_wheel_index() {
        let mut vehicle = Vehicle::new("car", &props(2)).unwrap();
        vehicle.apply_engine_force(100.0, 1).unwrap();
        vehicle.set_steering_value(0.3, 0).unwrap();
        assert!(vehicle.set_brake(1.0, 2).is_err());
        assert_eq!(vehicle.wheels[1].engine_force, 100.0);
        assert_eq!(vehicle.wheels[0].steering, 0.3);
    }

    #[test]
    fn wheel_transform_follows_chassis_and_suspension() {
        let mut wheel = WheelInfo::new(&WheelInfoProps {
            chassis_connection_point_local: Some([1.0, 0.0, 2.0]),
            suspension_rest_length: Some(0.5),
            ..WheelInfoProps::default()
        });
        let chassis = Isometry::translation(0.0, 3.0, 0.0);
        wheel.update_transform(&chassis);
        let p = wheel.world_transform.translation.vector;
        assert!((p - vector![1.0, 2.5, 2.0]).norm() < 1.0e-6);
    }

    #[test]
    fn airborne_wheel_rests_at_full_extension() {
        let mut bodies = RigidBodySet::new();
        let (colliders, broad_phase, narrow_phase) =
            (ColliderSet::new(), BroadPhaseBvh::new(), NarrowPhase::new());
        let scene = empty_scene(&colliders, &broad_phase, &narrow_phase);
        let chassis = bodies.insert(
            RigidBodyBuilder::dynamic()
                .translation(vector![0.0, 10.0, 0.0])
                .build(),
        );
        let wheel_body = bodies.insert(RigidBodyBuilder::kinematic_velocity_based().build());
        let mut vehicle = Vehicle::new("car", &props(1)).unwrap();
        let wheels = [wheel_body];
        let handles = VehicleBodies {
            chassis,
            wheels: &wheels,
        };
        vehicle.pre_step(&handles, &mut bodies, &scene, 1.0 / 60.0).unwrap();
        assert!(!vehicle.wheels[0].in_contact);
        assert_eq!(vehicle.wheels[0].suspension_force, 0.0);
        vehicle.post_step(&handles, &mut bodies).unwrap();
        assert!((bodies[wheel_body].translation().y - 9.0).abs() < 1.0e-5);
    }

    #[test]
    fn missing_chassis_is_a_step_error() {
        let mut bodies = RigidBodySet::new();
        let (colliders, broad_phase, narrow_phase) =
            (ColliderSet::new(), BroadPhaseBvh::new(), NarrowPhase::new());
        let scene = empty_scene(&colliders, &broad_phase, &narrow_phase);
        let mut vehicle = Vehicle::new("car", &props(0)).unwrap();
        let handles = VehicleBodies {
            chassis: RigidBodyHandle::from_raw_parts(3, 0),
            wheels: &[],
        };
        let err = vehicle.pre_step(&handles, &mut bodies, &scene, 1.0 / 60.0).unwrap_err();
        assert_eq!(err, StepError::MissingChassis { vehicle: "car".into() });
    }
}
