//! Caller-side callback registries.
//!
//! Events carry identities only. A handler registered for an instanced identity `base/index`
//! wins; otherwise the handler registered for `base` receives the event, so one callback can
//! serve a whole instanced collection.

use shared::{CollideEvent, ContactPairEvent, Event, ObservedValue, RayHitEvent, base_id};
use std::collections::HashMap;

pub type CollideHandler = Box<dyn FnMut(&CollideEvent)>;
pub type ContactPairHandler = Box<dyn FnMut(&ContactPairEvent)>;
pub type RayHitHandler = Box<dyn FnMut(&RayHitEvent)>;
pub type SubscriptionHandler = Box<dyn FnMut(&ObservedValue)>;

fn lookup<'a, H>(handlers: &'a mut HashMap<String, H>, target: &str) -> Option<&'a mut H> {
    if handlers.contains_key(target) {
        return handlers.get_mut(target);
    }
    handlers.get_mut(base_id(target))
}

#[derive(Default)]
pub struct EventHandlers {
    collide: HashMap<String, CollideHandler>,
    collide_begin: HashMap<String, ContactPairHandler>,
    collide_end: HashMap<String, ContactPairHandler>,
    ray_hit: HashMap<String, RayHitHandler>,
}

impl EventHandlers {
    pub fn on_collide(&mut self, id: &str, handler: impl FnMut(&CollideEvent) + 'static) {
        self.collide.insert(id.to_string(), Box::new(handler));
    }

    pub fn on_collide_begin(&mut self, id: &str, handler: impl FnMut(&ContactPairEvent) + 'static) {
        self.collide_begin.insert(id.to_string(), Box::new(handler));
    }

    pub fn on_collide_end(&mut self, id: &str, handler: impl FnMut(&ContactPairEvent) + 'static) {
        self.collide_end.insert(id.to_string(), Box::new(handler));
    }

    pub fn on_ray_hit(&mut self, id: &str, handler: impl FnMut(&RayHitEvent) + 'static) {
        self.ray_hit.insert(id.to_string(), Box::new(handler));
    }

    pub fn has_collide(&self, id: &str) -> bool {
        self.collide.contains_key(id)
    }

    /// Drops every handler registered under `id`.
    pub fn remove(&mut self, id: &str) {
        self.collide.remove(id);
        self.collide_begin.remove(id);
        self.collide_end.remove(id);
        self.ray_hit.remove(id);
    }

    /// Returns `false` when no handler took the event.
    pub fn dispatch(&mut self, event: &Event) -> bool {
        let target = event.target();
        match event {
            Event::Collide(e) => lookup(&mut self.collide, target).map(|h| h(e)).is_some(),
            Event::CollideBegin(e) => {
                lookup(&mut self.collide_begin, target).map(|h| h(e)).is_some()
            }
            Event::CollideEnd(e) => lookup(&mut self.collide_end, target).map(|h| h(e)).is_some(),
            Event::RayHit(e) => lookup(&mut self.ray_hit, target).map(|h| h(e)).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn begin(target: &str) -> Event {
        Event::CollideBegin(ContactPairEvent {
            target: target.into(),
            body: "other".into(),
        })
    }

    #[test]
    fn instances_fall_back_to_their_base() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut handlers = EventHandlers::default();
        let log = seen.clone();
        handlers.on_collide_begin("crates", move |e| {
            log.borrow_mut().push(format!("base:{}", e.target))
        });
        let log = seen.clone();
        handlers.on_collide_begin("crates/2", move |e| {
            log.borrow_mut().push(format!("own:{}", e.target))
        });

        assert!(handlers.dispatch(&begin("crates/0")));
        assert!(handlers.dispatch(&begin("crates/2")));
        assert!(!handlers.dispatch(&begin("barrels/0")));
        assert_eq!(*seen.borrow(), vec!["base:crates/0", "own:crates/2"]);
    }

    #[test]
    fn removed_handlers_stop_receiving() {
        let count = Rc::new(RefCell::new(0));
        let mut handlers = EventHandlers::default();
        let counter = count.clone();
        handlers.on_collide_begin("ball", move |_| *counter.borrow_mut() += 1);
        handlers.dispatch(&begin("ball"));
        handlers.remove("ball");
        assert!(!handlers.dispatch(&begin("ball")));
        assert_eq!(*count.borrow(), 1);
    }
}
