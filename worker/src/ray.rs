//! Ray queries, shared by registered rays and vehicle wheels.
//!
//! Queries go through the engine's query pipeline over the broad phase. A collider is a
//! candidate when `(collider group & ray mask) != 0` and `(ray group & collider mask) != 0`.
//! Sensors are never hit. Hits are returned nearest first.

use crate::tag::tag_responds;
use rapier3d::parry::query::RayCast;
use rapier3d::prelude::*;
use shared::protocol::RayInfo;
use shared::{RayHitEvent, RayMode, RayProps, Vec3};

/// The engine structures a ray query reads.
#[derive(Clone, Copy)]
pub struct QueryScene<'a> {
    pub broad_phase: &'a BroadPhaseBvh,
    pub narrow_phase: &'a NarrowPhase,
    pub colliders: &'a ColliderSet,
    /// Colliders inserted since the broad phase last ran. The pipeline only indexes them
    /// during the next engine step, so they are tested one by one.
    pub unindexed: &'a [ColliderHandle],
}

#[derive(Clone, Debug)]
pub struct RayQuery<'a> {
    pub origin: Point<f32>,
    /// Unit direction.
    pub dir: Vector<f32>,
    pub max_toi: f32,
    pub group: u32,
    pub mask: u32,
    pub skip_backfaces: bool,
    /// Skip colliders whose collision response is disabled.
    pub check_response: bool,
    pub exclude: &'a [RigidBodyHandle],
}

impl RayQuery<'_> {
    fn groups(&self) -> InteractionGroups {
        InteractionGroups::all()
            .with_memberships(Group::from_bits_truncate(self.group))
            .with_filter(Group::from_bits_truncate(self.mask))
    }

    fn accepts(&self, collider: &Collider) -> bool {
        let groups = collider.collision_groups();
        !collider.is_sensor()
            && groups.memberships.bits() & self.mask != 0
            && self.group & groups.filter.bits() != 0
            && (!self.check_response || tag_responds(collider.user_data))
            && collider.parent().is_some_and(|body| !self.exclude.contains(&body))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub collider: ColliderHandle,
    pub body: RigidBodyHandle,
    pub point: Point<f32>,
    pub normal: Vector<f32>,
    pub toi: f32,
}

/// Every hit along the ray, nearest first.
pub fn cast_all(
    scene: &QueryScene<'_>,
    bodies: &RigidBodySet,
    query: &RayQuery<'_>,
) -> Vec<RayHit> {
    let ray = Ray::new(query.origin, query.dir);
    let accept = |_: ColliderHandle, collider: &Collider| query.accepts(collider);
    let filter = QueryFilter::default()
        .exclude_sensors()
        .groups(query.groups())
        .predicate(&accept);
    let pipeline = scene.broad_phase.as_query_pipeline(
        scene.narrow_phase.query_dispatcher(),
        bodies,
        scene.colliders,
        filter,
    );

    let indexed = pipeline.intersect_ray(ray, query.max_toi, true);
    let fresh = scene.unindexed.iter().filter_map(|&handle| {
        let collider = scene.colliders.get(handle).filter(|c| query.accepts(c))?;
        let hit = collider
            .shape()
            .cast_ray_and_get_normal(collider.position(), &ray, query.max_toi, true)?;
        Some((handle, collider, hit))
    });

    let mut hits: Vec<RayHit> = indexed
        .chain(fresh)
        .filter_map(|(handle, collider, hit)| {
            // A solid cast reports rays starting inside at toi 0; backface culling drops
            // those along with hits whose normal faces along the ray.
            if query.skip_backfaces
                && (hit.time_of_impact <= 0.0 || hit.normal.dot(&query.dir) > 0.0)
            {
                return None;
            }
            Some(RayHit {
                collider: handle,
                body: collider.parent()?,
                point: ray.point_at(hit.time_of_impact),
                normal: hit.normal,
                toi: hit.time_of_impact,
            })
        })
        .collect();
    hits.sort_by(|a, b| {
        a.toi
            .total_cmp(&b.toi)
            .then_with(|| a.collider.into_raw_parts().cmp(&b.collider.into_raw_parts()))
    });
    // A slot reused before the next step is both indexed and fresh.
    hits.dedup_by_key(|hit| hit.collider);
    hits
}

pub fn cast_closest(
    scene: &QueryScene<'_>,
    bodies: &RigidBodySet,
    query: &RayQuery<'_>,
) -> Option<RayHit> {
    cast_all(scene, bodies, query).into_iter().next()
}

/// A registered ray, re-cast before every step.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisteredRay {
    pub id: String,
    pub from: Vec3,
    pub to: Vec3,
    pub mode: RayMode,
    pub group: u32,
    pub mask: u32,
    pub skip_backfaces: bool,
    pub check_response: bool,
}

impl RegisteredRay {
    pub fn new(id: &str, props: &RayProps) -> Self {
        Self {
            id: id.to_string(),
            from: props.from,
            to: props.to,
            mode: props.mode,
            group: props.collision_filter_group.map_or(u32::MAX, |g| g.0),
            mask: props.collision_filter_mask.map_or(u32::MAX, |m| m.0),
            skip_backfaces: props.skip_backfaces.unwrap_or(false),
            check_response: props.check_collision_response.unwrap_or(true),
        }
    }

    fn info(&self, dir: &Vector<f32>) -> RayInfo {
        RayInfo {
            uuid: self.id.clone(),
            from: self.from,
            to: self.to,
            direction: [dir.x, dir.y, dir.z],
            collision_filter_group: self.group,
            collision_filter_mask: self.mask,
        }
    }

    /// Casts the ray and returns its hit events. `identity` maps a body to its identity.
    ///
    /// A miss still produces one event (with no body) so the caller can clear earlier hits.
    pub fn cast<'a>(
        &self,
        scene: &QueryScene<'_>,
        bodies: &RigidBodySet,
        identity: impl Fn(RigidBodyHandle) -> Option<&'a str>,
    ) -> Vec<RayHitEvent> {
        let from = point![self.from[0], self.from[1], self.from[2]];
        let to = point![self.to[0], self.to[1], self.to[2]];
        let delta = to - from;
        let length = delta.norm();
        let dir = if length > f32::EPSILON {
            delta / length
        } else {
            Vector::zeros()
        };
        let info = self.info(&dir);

        let miss = || RayHitEvent {
            ray: info.clone(),
            has_hit: false,
            body: None,
            hit_point_world: [0.0; 3],
            hit_normal_world: [0.0; 3],
            distance: -1.0,
            should_stop: false,
        };
        if length <= f32::EPSILON {
            return vec![miss()];
        }

        let query = RayQuery {
            origin: from,
            dir,
            max_toi: length,
            group: self.group,
            mask: self.mask,
            skip_backfaces: self.skip_backfaces,
            check_response: self.check_response,
            exclude: &[],
        };
        let hits = cast_all(scene, bodies, &query);
        let hits: Vec<(RayHit, &str)> = hits
            .into_iter()
            .filter_map(|hit| identity(hit.body).map(|id| (hit, id)))
            .collect();
        if hits.is_empty() {
            return vec![miss()];
        }

        let event = |hit: &RayHit, id: &str, should_stop: bool| RayHitEvent {
            ray: info.clone(),
            has_hit: true,
            body: Some(id.to_string()),
            hit_point_world: [hit.point.x, hit.point.y, hit.point.z],
            hit_normal_world: [hit.normal.x, hit.normal.y, hit.normal.z],
            distance: hit.toi,
            should_stop,
        };
        match self.mode {
            RayMode::Closest => vec![event(&hits[0].0, hits[0].1, false)],
            RayMode::Any => vec![event(&hits[0].0, hits[0].1, true)],
            RayMode::All => hits.iter().map(|(hit, id)| event(hit, id, false)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::pack_tag;
    use shared::GroupMask;

    struct Scene {
        bodies: RigidBodySet,
        colliders: ColliderSet,
        broad_phase: BroadPhaseBvh,
        narrow_phase: NarrowPhase,
        inserted: Vec<ColliderHandle>,
        handles: [RigidBodyHandle; 2],
    }

    impl Scene {
        /// Two balls on the +Y axis, at 2 (group 1) and 5 (group 2).
        fn new() -> Self {
            let mut bodies = RigidBodySet::new();
            let mut colliders = ColliderSet::new();
            let mut handles = [RigidBodyHandle::invalid(); 2];
            let mut inserted = Vec::new();
            for (i, y) in [2.0, 5.0].into_iter().enumerate() {
                let body = bodies.insert(
                    RigidBodyBuilder::fixed()
                        .translation(vector![0.0, y, 0.0])
                        .build(),
                );
                let group = 1 << i;
                let collider = ColliderBuilder::ball(0.5)
                    .collision_groups(
                        InteractionGroups::all()
                            .with_memberships(Group::from_bits_truncate(group))
                            .with_filter(Group::ALL),
                    )
                    .user_data(pack_tag(None, true))
                    .build();
                inserted.push(colliders.insert_with_parent(collider, body, &mut bodies));
                handles[i] = body;
            }
            Self {
                bodies,
                colliders,
                broad_phase: BroadPhaseBvh::new(),
                narrow_phase: NarrowPhase::new(),
                inserted,
                handles,
            }
        }

        /// Indexes every collider in the broad phase.
        fn indexed(mut self) -> Self {
            let mut events = Vec::new();
            self.broad_phase.update(
                &IntegrationParameters::default(),
                &self.colliders,
                &self.bodies,
                &self.inserted,
                &[],
                &mut events,
            );
            self.inserted.clear();
            self
        }

        fn cast(&self, ray: &RegisteredRay) -> Vec<RayHitEvent> {
            let scene = QueryScene {
                broad_phase: &self.broad_phase,
                narrow_phase: &self.narrow_phase,
                colliders: &self.colliders,
                unindexed: &self.inserted,
            };
            let handles = self.handles;
            ray.cast(&scene, &self.bodies, move |h| {
                if h == handles[0] {
                    Some("low")
                } else if h == handles[1] {
                    Some("high")
                } else {
                    None
                }
            })
        }
    }

    fn props(mode: RayMode) -> RayProps {
        RayProps {
            from: [0.0, 0.0, 0.0],
            to: [0.0, 10.0, 0.0],
            mode,
            collision_filter_group: None,
            collision_filter_mask: None,
            skip_backfaces: None,
            check_collision_response: None,
        }
    }

    fn ray(mode: RayMode) -> RegisteredRay {
        RegisteredRay::new("sight", &props(mode))
    }

    #[test]
    fn closest_any_and_all() {
        let scene = Scene::new().indexed();

        let closest = scene.cast(&ray(RayMode::Closest));
        assert_eq!(closest.len(), 1);
        assert_eq!(closest[0].body.as_deref(), Some("low"));
        assert!((closest[0].distance - 1.5).abs() < 1.0e-4);
        assert!((closest[0].hit_normal_world[1] + 1.0).abs() < 1.0e-4);

        let any = scene.cast(&ray(RayMode::Any));
        assert!(any[0].should_stop);

        let all = scene.cast(&ray(RayMode::All));
        let hit: Vec<_> = all.iter().map(|e| e.body.clone().unwrap()).collect();
        assert_eq!(hit, vec!["low", "high"]);
    }

    #[test]
    fn colliders_not_yet_indexed_are_still_hit() {
        let scene = Scene::new();
        let all = scene.cast(&ray(RayMode::All));
        let hit: Vec<_> = all.iter().map(|e| e.body.clone().unwrap()).collect();
        assert_eq!(hit, vec!["low", "high"]);
    }

    #[test]
    fn mask_filters_and_misses_still_report() {
        let scene = Scene::new().indexed();
        let mut props = props(RayMode::Closest);
        props.collision_filter_mask = Some(GroupMask(2));
        let events = scene.cast(&RegisteredRay::new("sight", &props));
        assert_eq!(events[0].body.as_deref(), Some("high"));

        props.to = [10.0, 0.0, 0.0];
        let events = scene.cast(&RegisteredRay::new("sight", &props));
        assert_eq!(events.len(), 1);
        assert!(!events[0].has_hit);
        assert!(events[0].body.is_none());
    }
}
