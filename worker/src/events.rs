//! Engine collision callbacks -> identity-only outbound events.
//!
//! The engine reports collisions in terms of collider handles while it steps. The
//! [`ContactCollector`] captures each report together with a contact sample taken at that
//! moment (pre-solve velocities, so the impact velocity is the approach speed) and queues it.
//! After the step, [`translate`] resolves handles to identities and produces the events.
//!
//! Conventions:
//! - `bi`/`bj` keep the engine's pair order; `ni` points from `bi` to `bj`.
//! - `contactNormal` points away from the event target, so the two participants of a pair
//!   always see opposite normals.
//! - A `collide` event is produced once per pair, when the contact starts, and only for targets
//!   that registered a collide callback. Begin/end go to both participants.
//! - Pairs whose bodies are gone (or never had an identity) produce nothing.

use crate::body::BodyRecord;
use crossbeam_channel::{Receiver, Sender, unbounded};
use rapier3d::prelude::*;
use shared::protocol::{CollisionFilters, ContactInfo};
use shared::{CollideEvent, ContactPairEvent, Event};

/// Contact geometry captured when a pair starts touching.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactSample {
    /// World-space normal pointing from collider 1 towards collider 2.
    pub normal: Vector<f32>,
    pub point: Point<f32>,
    /// Contact point relative to each body's center of mass.
    pub r1: Vector<f32>,
    pub r2: Vector<f32>,
    /// Relative velocity at the contact point along `normal`. Positive when approaching.
    pub impact_velocity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactRecord {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
    pub started: bool,
    pub sensor: bool,
    pub sample: Option<ContactSample>,
}

/// Engine event handler queuing collision reports for translation after the step.
pub struct ContactCollector {
    sender: Sender<ContactRecord>,
    receiver: Receiver<ContactRecord>,
}

impl Default for ContactCollector {
    fn default() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }
}

impl ContactCollector {
    pub fn drain(&self) -> Vec<ContactRecord> {
        self.receiver.try_iter().collect()
    }
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        contact_pair: Option<&ContactPair>,
    ) {
        let sample = match contact_pair {
            Some(pair) if event.started() => sample_contact(bodies, colliders, pair),
            _ => None,
        };
        // The receiver lives as long as the collector, so this cannot fail.
        let _ = self.sender.send(ContactRecord {
            collider1: event.collider1(),
            collider2: event.collider2(),
            started: event.started(),
            sensor: event.sensor(),
            sample,
        });
    }

    fn handle_contact_force_event(
        &self,
        _dt: f32,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: f32,
    ) {
    }
}

fn sample_contact(
    bodies: &RigidBodySet,
    colliders: &ColliderSet,
    pair: &ContactPair,
) -> Option<ContactSample> {
    let manifold = pair.manifolds.iter().find(|m| !m.points.is_empty())?;
    let c1 = colliders.get(pair.collider1)?;
    let c2 = colliders.get(pair.collider2)?;
    let b1 = bodies.get(c1.parent()?)?;
    let b2 = bodies.get(c2.parent()?)?;

    let normal = manifold.data.normal;
    let point = match manifold.data.solver_contacts.first() {
        Some(contact) => contact.point,
        None => c1.position() * manifold.points[0].local_p1,
    };
    let v1 = b1.velocity_at_point(&point);
    let v2 = b2.velocity_at_point(&point);
    Some(ContactSample {
        normal,
        point,
        r1: point - b1.center_of_mass(),
        r2: point - b2.center_of_mass(),
        impact_velocity: (v1 - v2).dot(&normal),
    })
}

fn to_array(v: &Vector<f32>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

fn filters(target: &BodyRecord, other: &BodyRecord) -> CollisionFilters {
    CollisionFilters {
        body_filter_group: other.config.collision_filter_group,
        body_filter_mask: other.config.collision_filter_mask,
        target_filter_group: target.config.collision_filter_group,
        target_filter_mask: target.config.collision_filter_mask,
    }
}

/// Turns one queued report into events. `resolve` maps a collider to the record of the body
/// owning it.
pub fn translate<'a>(
    record: &ContactRecord,
    resolve: impl Fn(ColliderHandle) -> Option<&'a BodyRecord>,
    out: &mut Vec<Event>,
) {
    let (Some(first), Some(second)) = (resolve(record.collider1), resolve(record.collider2)) else {
        return;
    };
    if first.id == second.id {
        return;
    }

    if !record.started {
        out.push(Event::CollideEnd(pair_event(first, second)));
        out.push(Event::CollideEnd(pair_event(second, first)));
        return;
    }

    out.push(Event::CollideBegin(pair_event(first, second)));
    out.push(Event::CollideBegin(pair_event(second, first)));

    let sample = if record.sensor { None } else { record.sample };
    for (target, other, sign) in [(first, second, 1.0), (second, first, -1.0)] {
        if !target.config.on_collide {
            continue;
        }
        let contact = sample.map(|s| ContactInfo {
            bi: first.id.clone(),
            bj: second.id.clone(),
            ni: to_array(&s.normal),
            ri: to_array(&s.r1),
            rj: to_array(&s.r2),
            contact_point: [s.point.x, s.point.y, s.point.z],
            contact_normal: to_array(&(s.normal * sign)),
            impact_velocity: s.impact_velocity,
        });
        out.push(Event::Collide(CollideEvent {
            target: target.id.clone(),
            body: other.id.clone(),
            contact,
            collision_filters: filters(target, other),
        }));
    }
}

fn pair_event(target: &BodyRecord, other: &BodyRecord) -> ContactPairEvent {
    ContactPairEvent {
        target: target.id.clone(),
        body: other.id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyConfig;
    use serde_json::Value;
    use shared::BodyType;
    use std::collections::HashMap;

    fn record(id: &str, on_collide: bool, collider: ColliderHandle) -> BodyRecord {
        BodyRecord {
            id: id.to_string(),
            handle: RigidBodyHandle::from_raw_parts(0, 0),
            colliders: vec![collider],
            config: BodyConfig {
                body_type: BodyType::Dynamic,
                mass: 1.0,
                material: None,
                shape_materials: vec![None],
                linear_damping: 0.0,
                angular_damping: 0.0,
                allow_sleep: true,
                sleep_speed_limit: 0.1,
                sleep_time_limit: 1.0,
                collision_filter_group: if on_collide { 2 } else { 1 },
                collision_filter_mask: u32::MAX,
                collision_response: None,
                fixed_rotation: false,
                is_trigger: false,
                linear_factor: [1.0; 3],
                angular_factor: [1.0; 3],
                user_data: Value::Null,
                on_collide,
            },
        }
    }

    fn sample() -> ContactSample {
        ContactSample {
            normal: vector![0.0, 1.0, 0.0],
            point: point![0.0, 0.5, 0.0],
            r1: vector![0.0, 0.5, 0.0],
            r2: vector![0.0, -0.5, 0.0],
            impact_velocity: 3.0,
        }
    }

    fn handles() -> (ColliderHandle, ColliderHandle) {
        (ColliderHandle::from_raw_parts(0, 0), ColliderHandle::from_raw_parts(1, 0))
    }

    #[test]
    fn started_pair_reports_opposite_normals() {
        let (h1, h2) = handles();
        let records: HashMap<ColliderHandle, BodyRecord> =
            [(h1, record("a", true, h1)), (h2, record("b", true, h2))].into();
        let mut out = Vec::new();
        translate(
            &ContactRecord {
                collider1: h1,
                collider2: h2,
                started: true,
                sensor: false,
                sample: Some(sample()),
            },
            |h| records.get(&h),
            &mut out,
        );

        let collides: Vec<&CollideEvent> = out
            .iter()
            .filter_map(|e| match e {
                Event::Collide(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(collides.len(), 2);
        let a = collides[0].contact.as_ref().unwrap();
        let b = collides[1].contact.as_ref().unwrap();
        assert_eq!(collides[0].target, "a");
        assert_eq!(a.contact_normal, [0.0, 1.0, 0.0]);
        assert_eq!(b.contact_normal, [0.0, -1.0, 0.0]);
        assert_eq!(a.bi, b.bi);
        assert_eq!(a.ni, b.ni);
        assert_eq!(collides[0].collision_filters.target_filter_group, 2);

        let begins = out.iter().filter(|e| matches!(e, Event::CollideBegin(_))).count();
        assert_eq!(begins, 2);
    }

    #[test]
    fn collide_only_for_registered_targets() {
        let (h1, h2) = handles();
        let records: HashMap<ColliderHandle, BodyRecord> =
            [(h1, record("a", false, h1)), (h2, record("b", true, h2))].into();
        let mut out = Vec::new();
        translate(
            &ContactRecord {
                collider1: h1,
                collider2: h2,
                started: true,
                sensor: true,
                sample: Some(sample()),
            },
            |h| records.get(&h),
            &mut out,
        );
        let collides: Vec<&Event> = out.iter().filter(|e| matches!(e, Event::Collide(_))).collect();
        assert_eq!(collides.len(), 1);
        let Event::Collide(event) = collides[0] else {
            unreachable!()
        };
        assert_eq!(event.target, "b");
        assert!(event.contact.is_none());
    }

    #[test]
    fn stopped_pair_ends_for_both_and_unknown_bodies_are_skipped() {
        let (h1, h2) = handles();
        let records: HashMap<ColliderHandle, BodyRecord> =
            [(h1, record("a", true, h1)), (h2, record("b", true, h2))].into();
        let mut out = Vec::new();
        let stopped = ContactRecord {
            collider1: h1,
            collider2: h2,
            started: false,
            sensor: false,
            sample: None,
        };
        translate(&stopped, |h| records.get(&h), &mut out);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| matches!(e, Event::CollideEnd(_))));

        out.clear();
        translate(&stopped, |h| if h == h1 { records.get(&h) } else { None }, &mut out);
        assert!(out.is_empty());
    }
}
