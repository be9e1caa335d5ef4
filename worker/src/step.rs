//! Advancing the world and assembling frames.
//!
//! One sub-step runs, in order:
//! 1. pre-step hooks (ray casts, vehicle suspension and friction);
//! 2. the engine step, with material-aware contact rules and the contact collector;
//! 3. clearing user forces, which only last for the step they were applied in;
//! 4. post-step hooks (springs, constraint watchdogs, wheel body sync);
//! 5. translating the collected contacts into identity events;
//! 6. a finiteness check over every body with an identity.
//!
//! A vehicle whose chassis or wheel body is gone is skipped until it is removed or the body
//! comes back; the rest of the world keeps stepping. A body whose state turns non-finite is
//! disabled and parked at the origin, and the fault is queued for the caller.

use crate::body::BodyRecord;
use crate::error::StepError;
use crate::events::translate;
use crate::material::ContactRules;
use crate::ray::QueryScene;
use crate::subscription::{Observed, observe_body, observe_vehicle};
use crate::vehicle::VehicleBodies;
use crate::world::{PhaseHook, WorldState};
use rapier3d::prelude::*;
use shared::{Event, Frame, Observation, StepProps};
use std::collections::HashMap;

fn handle_of(records: &HashMap<String, BodyRecord>, id: &str) -> Option<RigidBodyHandle> {
    records.get(id).map(|r| r.handle)
}

impl WorldState {
    /// Advances the simulation. Returns how many sub-steps ran.
    ///
    /// Without `time_since_last_called` exactly one step of `step_size` runs. With it, the
    /// elapsed time is accumulated and consumed in fixed steps, at most `max_sub_steps` of
    /// them (falling back to `default_max_sub_steps`); time left over past the cap is dropped.
    pub fn advance(&mut self, props: &StepProps, default_max_sub_steps: u32) -> u32 {
        let dt = props.step_size;
        let Some(elapsed) = props.time_since_last_called else {
            self.sub_step(dt);
            return 1;
        };

        let max_sub_steps = props.max_sub_steps.unwrap_or(default_max_sub_steps);
        self.accumulator += elapsed.max(0.0);
        let mut steps = 0;
        while self.accumulator >= dt && steps < max_sub_steps {
            self.sub_step(dt);
            self.accumulator -= dt;
            steps += 1;
        }
        self.accumulator %= dt;
        steps
    }

    fn sub_step(&mut self, dt: f32) {
        self.params.dt = dt;
        self.run_pre_step(dt);

        let gravity = self.config.gravity_vector();
        let hooks = ContactRules {
            materials: &self.materials,
        };
        self.pipeline.step(
            &gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            &hooks,
            &self.collector,
        );
        self.unindexed.clear();

        for record in self.records.values() {
            if let Some(body) = self.bodies.get_mut(record.handle) {
                body.reset_forces(false);
                body.reset_torques(false);
            }
        }

        self.run_post_step(dt);
        self.collect_contacts();
        self.quarantine_non_finite();
    }

    fn run_pre_step(&mut self, dt: f32) {
        let scene = QueryScene {
            broad_phase: &self.broad_phase,
            narrow_phase: &self.narrow_phase,
            colliders: &self.colliders,
            unindexed: &self.unindexed,
        };
        for hook in &self.pre_step {
            match hook {
                PhaseHook::Ray(id) => {
                    let Some(ray) = self.rays.get(id) else {
                        continue;
                    };
                    let by_handle = &self.by_handle;
                    let hits =
                        ray.cast(&scene, &self.bodies, |h| by_handle.get(&h).map(String::as_str));
                    self.outbox.extend(hits.into_iter().map(Event::RayHit));
                }
                PhaseHook::Vehicle(id) => {
                    let Some(vehicle) = self.vehicles.get_mut(id) else {
                        continue;
                    };
                    let bodies =
                        vehicle_handles(&self.records, id, &vehicle.chassis, &vehicle.wheel_bodies);
                    let (chassis, wheels) = match bodies {
                        Ok(handles) => handles,
                        Err(err) => {
                            log::debug!("skipping vehicle pre-step: {err}");
                            continue;
                        }
                    };
                    let handles = VehicleBodies {
                        chassis,
                        wheels: &wheels,
                    };
                    if let Err(err) = vehicle.pre_step(&handles, &mut self.bodies, &scene, dt) {
                        log::debug!("skipping vehicle pre-step: {err}");
                    }
                }
                other => log::warn!("{other:?} registered as a pre-step hook"),
            }
        }
    }

    fn run_post_step(&mut self, dt: f32) {
        for hook in &self.post_step {
            match hook {
                PhaseHook::Spring(id) => {
                    let Some(spring) = self.springs.get(id) else {
                        continue;
                    };
                    let (Some(a), Some(b)) = (
                        handle_of(&self.records, &spring.body_a),
                        handle_of(&self.records, &spring.body_b),
                    ) else {
                        continue;
                    };
                    spring.apply(&mut self.bodies, a, b);
                }
                PhaseHook::Watchdog(id) => {
                    if let Some(constraint) = self.constraints.get_mut(id) {
                        constraint.check_watchdog(&mut self.impulse_joints, dt);
                    }
                }
                PhaseHook::VehicleSync(id) => {
                    let Some(vehicle) = self.vehicles.get_mut(id) else {
                        continue;
                    };
                    let bodies =
                        vehicle_handles(&self.records, id, &vehicle.chassis, &vehicle.wheel_bodies);
                    let (chassis, wheels) = match bodies {
                        Ok(handles) => handles,
                        Err(err) => {
                            log::debug!("skipping wheel sync: {err}");
                            continue;
                        }
                    };
                    let handles = VehicleBodies {
                        chassis,
                        wheels: &wheels,
                    };
                    if let Err(err) = vehicle.post_step(&handles, &mut self.bodies) {
                        log::debug!("skipping wheel sync: {err}");
                    }
                }
                other => log::warn!("{other:?} registered as a post-step hook"),
            }
        }
    }

    fn collect_contacts(&mut self) {
        let records = self.collector.drain();
        if records.is_empty() {
            return;
        }
        let (colliders, by_handle, bodies) = (&self.colliders, &self.by_handle, &self.records);
        let resolve = |collider: ColliderHandle| {
            let parent = colliders.get(collider)?.parent()?;
            bodies.get(by_handle.get(&parent)?)
        };
        for record in &records {
            translate(record, resolve, &mut self.outbox);
        }
    }

    /// Disables every body whose pose or velocity is no longer finite and parks it at the
    /// origin, so one diverging body cannot poison the frame or the rest of the world.
    fn quarantine_non_finite(&mut self) {
        for id in &self.roster {
            let Some(body) = handle_of(&self.records, id).and_then(|h| self.bodies.get_mut(h))
            else {
                continue;
            };
            let finite = body.translation().iter().all(|v| v.is_finite())
                && body.rotation().coords.iter().all(|v| v.is_finite())
                && body.linvel().iter().all(|v| v.is_finite())
                && body.angvel().iter().all(|v| v.is_finite());
            if finite {
                continue;
            }
            body.set_linvel(Vector::zeros(), false);
            body.set_angvel(Vector::zeros(), false);
            body.set_position(Isometry::identity(), false);
            body.set_enabled(false);
            let fault = StepError::NonFinite { body: id.clone() };
            log::error!("{fault}");
            self.faults.push(fault);
        }
    }

    /// Fills the transform buffers in roster order and collects observations.
    ///
    /// The buffers are resized to exactly 3 and 4 floats per body, reusing their allocation.
    /// Subscriptions whose target is gone are skipped for this frame.
    pub fn frame(&mut self, mut positions: Vec<f32>, mut quaternions: Vec<f32>) -> Frame {
        let count = self.roster.len();
        positions.clear();
        positions.resize(count * 3, 0.0);
        quaternions.clear();
        quaternions.resize(count * 4, 0.0);

        for (slot, id) in self.roster.iter().enumerate() {
            let Some(body) = handle_of(&self.records, id).and_then(|h| self.bodies.get(h)) else {
                continue;
            };
            let t = body.translation();
            positions[slot * 3..slot * 3 + 3].copy_from_slice(&[t.x, t.y, t.z]);
            let q = body.rotation();
            quaternions[slot * 4..slot * 4 + 4].copy_from_slice(&[q.i, q.j, q.k, q.w]);
        }

        let observations = self
            .subscriptions
            .iter()
            .filter_map(|(&id, subscription)| {
                let value = match subscription.property {
                    Observed::Body(property) => {
                        let record = self.records.get(&subscription.target)?;
                        let body = self.bodies.get(record.handle)?;
                        observe_body(property, record, body, &self.materials)
                    }
                    Observed::Vehicle(property) => {
                        observe_vehicle(property, self.vehicles.get(&subscription.target)?)
                    }
                };
                Some(Observation {
                    id,
                    value,
                    property: subscription.name.clone(),
                })
            })
            .collect();

        let bodies = std::mem::take(&mut self.roster_changed).then(|| self.roster.clone());
        Frame {
            positions,
            quaternions,
            observations,
            active: self.any_awake(),
            bodies,
        }
    }
}

/// Chassis and wheel handles of a vehicle, or which of its bodies is gone.
fn vehicle_handles(
    records: &HashMap<String, BodyRecord>,
    vehicle: &str,
    chassis: &str,
    wheels: &[String],
) -> Result<(RigidBodyHandle, Vec<RigidBodyHandle>), StepError> {
    let chassis = handle_of(records, chassis).ok_or_else(|| StepError::MissingChassis {
        vehicle: vehicle.to_string(),
    })?;
    let wheels = wheels
        .iter()
        .enumerate()
        .map(|(wheel, body)| {
            handle_of(records, body).ok_or_else(|| StepError::MissingWheel {
                vehicle: vehicle.to_string(),
                wheel,
                body: body.clone(),
            })
        })
        .collect::<Result<_, _>>()?;
    Ok((chassis, wheels))
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
            build_body("Sphere", &props, &mut world.materials, world.config.allow_sleep).unwrap();
        world.insert_body(id, blueprint).unwrap();
    }

    fn one_step() -> StepProps {
        StepProps {
            step_size: 1.0 / 60.0,
            time_since_last_called: None,
            max_sub_steps: None,
        }
    }

    #[test]
    fn diverging_bodies_are_disabled_and_reported() {
        let mut world = WorldState::new();
        add(&mut world, "ok", json!({ "mass": 1, "position": [5, 0, 0] }));
        add(&mut world, "bad", json!({ "mass": 1 }));
        world
            .rigid_body_mut("bad")
            .unwrap()
            .set_translation(vector![f32::NAN, 0.0, 0.0], false);

        world.quarantine_non_finite();
        assert_eq!(world.drain_faults(), vec![StepError::NonFinite { body: "bad".into() }]);
        let bad = world.rigid_body("bad").unwrap();
        assert!(!bad.is_enabled());
        assert_eq!(*bad.translation(), Vector::zeros());

        let frame = world.frame(Vec::new(), Vec::new());
        assert!(frame.positions.iter().all(|v| v.is_finite()));
        // Reported once; the parked body is finite from then on.
        world.quarantine_non_finite();
        assert!(world.drain_faults().is_empty());
    }

    #[test]
    fn engine_steps_index_new_colliders() {
        let mut world = WorldState::new();
        add(&mut world, "ball", json!({ "mass": 1 }));
        assert_eq!(world.unindexed.len(), 1);
        assert_eq!(world.advance(&one_step(), 10), 1);
        assert!(world.unindexed.is_empty());
    }
}
