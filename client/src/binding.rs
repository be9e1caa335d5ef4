//! Caller-side binding over a worker thread.
//!
//! Responsibilities:
//! - Own the two transform buffers and lend them to the worker for each step.
//! - Keep `identity -> slot` in sync with the roster the worker reports.
//! - Route events and observations to the registered callbacks.

use crate::handlers::{EventHandlers, SubscriptionHandler};
use shared::protocol::ErrorReport;
use shared::{
    BodyProps, Event, Frame, InitProps, Quat, Request, StepProps, SubscribeProps,
    SubscriptionTarget, Vec3, WorkerMessage, base_id,
};
use std::collections::HashMap;
use worker::{WorkerHandle, WorkerSettings};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unable to start the physics worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("the physics worker is gone")]
    Disconnected,

    #[error("transform buffers are still with the worker")]
    BuffersLent,
}

struct Buffers {
    positions: Vec<f32>,
    quaternions: Vec<f32>,
}

pub struct PhysicsClient {
    worker: WorkerHandle,
    /// `None` while lent to the worker for a step.
    buffers: Option<Buffers>,
    slots: HashMap<String, usize>,
    pub handlers: EventHandlers,
    subscriptions: HashMap<u32, SubscriptionHandler>,
    next_subscription: u32,
    errors: Vec<ErrorReport>,
}

impl PhysicsClient {
    pub fn spawn(settings: WorkerSettings) -> Result<Self, ClientError> {
        tracing::debug!(thread = %settings.thread_name, "spawning physics worker");
        Ok(Self {
            worker: worker::spawn(settings)?,
            buffers: Some(Buffers {
                positions: Vec::new(),
                quaternions: Vec::new(),
            }),
            slots: HashMap::new(),
            handlers: EventHandlers::default(),
            subscriptions: HashMap::new(),
            next_subscription: 0,
            errors: Vec::new(),
        })
    }

    pub fn send(&self, request: Request) -> Result<(), ClientError> {
        self.worker.send(request).map_err(|_| ClientError::Disconnected)
    }

    pub fn init(&mut self, props: InitProps) -> Result<(), ClientError> {
        if let (Some(size), Some(buffers)) = (props.size, self.buffers.as_mut()) {
            buffers.positions.reserve(size * 3);
            buffers.quaternions.reserve(size * 4);
        }
        self.send(Request::Init { props })
    }

    /// Adds bodies. Bodies with a collide handler already registered (for themselves or their
    /// base identity) are flagged so the worker produces `collide` events for them.
    pub fn add_bodies(
        &self,
        shape: &str,
        uuid: Vec<String>,
        mut props: Vec<BodyProps>,
    ) -> Result<(), ClientError> {
        for (id, props) in uuid.iter().zip(props.iter_mut()) {
            props.on_collide |=
                self.handlers.has_collide(id) || self.handlers.has_collide(base_id(id));
        }
        self.send(Request::AddBodies {
            uuid,
            shape: shape.to_string(),
            props,
        })
    }

    /// Removes bodies and their callbacks.
    pub fn remove_bodies(&mut self, uuid: Vec<String>) -> Result<(), ClientError> {
        for id in &uuid {
            self.handlers.remove(id);
        }
        self.send(Request::RemoveBodies { uuid })
    }

    /// Lends the buffers to the worker and requests a step.
    pub fn step(&mut self, props: StepProps) -> Result<(), ClientError> {
        let Some(Buffers {
            positions,
            quaternions,
        }) = self.buffers.take()
        else {
            return Err(ClientError::BuffersLent);
        };
        self.send(Request::Step {
            props,
            positions,
            quaternions,
        })
    }

    pub fn buffers_lent(&self) -> bool {
        self.buffers.is_none()
    }

    /// Subscribes `handler` to a property. Returns the subscription id.
    pub fn subscribe(
        &mut self,
        id: &str,
        target: SubscriptionTarget,
        property: &str,
        handler: impl FnMut(&shared::ObservedValue) + 'static,
    ) -> Result<u32, ClientError> {
        let subscription = self.next_subscription;
        self.next_subscription += 1;
        self.subscriptions.insert(subscription, Box::new(handler));
        self.send(Request::Subscribe {
            uuid: id.to_string(),
            props: SubscribeProps {
                id: subscription,
                property: property.to_string(),
                target,
            },
        })?;
        Ok(subscription)
    }

    pub fn unsubscribe(&mut self, subscription: u32) -> Result<(), ClientError> {
        self.subscriptions.remove(&subscription);
        self.send(Request::Unsubscribe { props: subscription })
    }

    /// Handles every message available right now. Returns how many frames arrived.
    pub fn poll(&mut self) -> usize {
        let messages = self.worker.drain();
        messages.into_iter().map(|m| self.process(m)).filter(|&frame| frame).count()
    }

    /// Blocks until the outstanding step comes back, handling events on the way.
    pub fn wait_frame(&mut self) -> Result<(), ClientError> {
        while self.buffers_lent() {
            let message = self.worker.recv().map_err(|_| ClientError::Disconnected)?;
            self.process(message);
        }
        Ok(())
    }

    /// Returns `true` for a frame.
    fn process(&mut self, message: WorkerMessage) -> bool {
        match message {
            WorkerMessage::Frame(frame) => {
                self.apply_frame(frame);
                true
            }
            WorkerMessage::Event(event) => {
                self.dispatch(&event);
                false
            }
            WorkerMessage::Error(report) => {
                tracing::warn!(op = %report.op, kind = ?report.kind, "{}", report.message);
                // A failed step never returns the buffers; take them back empty.
                if report.op == "step" && self.buffers.is_none() {
                    self.buffers = Some(Buffers {
                        positions: Vec::new(),
                        quaternions: Vec::new(),
                    });
                }
                self.errors.push(report);
                false
            }
        }
    }

    fn apply_frame(&mut self, frame: Frame) {
        if let Some(roster) = &frame.bodies {
            tracing::debug!(bodies = roster.len(), "roster changed");
            self.slots = roster.iter().enumerate().map(|(slot, id)| (id.clone(), slot)).collect();
        }
        for observation in &frame.observations {
            if let Some(handler) = self.subscriptions.get_mut(&observation.id) {
                handler(&observation.value);
            }
        }
        self.buffers = Some(Buffers {
            positions: frame.positions,
            quaternions: frame.quaternions,
        });
    }

    fn dispatch(&mut self, event: &Event) {
        if !self.handlers.dispatch(event) {
            tracing::trace!(target_id = event.target(), "event without a handler");
        }
    }

    pub fn slot(&self, id: &str) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Last known position, unavailable while the buffers are lent.
    pub fn position(&self, id: &str) -> Option<Vec3> {
        let slot = self.slot(id)?;
        let v = self.buffers.as_ref()?.positions.get(slot * 3..slot * 3 + 3)?;
        Some([v[0], v[1], v[2]])
    }

    pub fn quaternion(&self, id: &str) -> Option<Quat> {
        let slot = self.slot(id)?;
        let q = self.buffers.as_ref()?.quaternions.get(slot * 4..slot * 4 + 4)?;
        Some([q[0], q[1], q[2], q[3]])
    }

    /// Error reports received so far, oldest first.
    pub fn take_errors(&mut self) -> Vec<ErrorReport> {
        std::mem::take(&mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::{ObservedValue, instance_ids};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn body(value: serde_json::Value) -> BodyProps {
        serde_json::from_value(value).unwrap()
    }

    fn step(client: &mut PhysicsClient) {
        client
            .step(StepProps {
                step_size: 1.0 / 60.0,
                time_since_last_called: None,
                max_sub_steps: None,
            })
            .unwrap();
        client.wait_frame().unwrap();
    }

    #[test]
    fn buffers_cannot_be_lent_twice() {
        let mut client = PhysicsClient::spawn(WorkerSettings::default()).unwrap();
        let props = StepProps {
            step_size: 1.0 / 60.0,
            time_since_last_called: None,
            max_sub_steps: None,
        };
        client.step(props.clone()).unwrap();
        assert!(matches!(client.step(props), Err(ClientError::BuffersLent)));
        client.wait_frame().unwrap();
        assert!(!client.buffers_lent());
    }

    #[test]
    fn positions_follow_the_roster() {
        let mut client = PhysicsClient::spawn(WorkerSettings::default()).unwrap();
        client
            .init(InitProps {
                gravity: Some([0.0, 0.0, 0.0]),
                size: Some(3),
                ..InitProps::default()
            })
            .unwrap();
        let ids = instance_ids("balls", 3);
        let props = (0..3)
            .map(|i| body(json!({ "mass": 1, "args": 0.25, "position": [i, 0, 0] })))
            .collect();
        client.add_bodies("Sphere", ids.clone(), props).unwrap();
        step(&mut client);
        assert_eq!(client.position("balls/2"), Some([2.0, 0.0, 0.0]));

        client.remove_bodies(vec![ids[0].clone()]).unwrap();
        step(&mut client);
        assert_eq!(client.slot("balls/2"), Some(1));
        assert_eq!(client.position("balls/2"), Some([2.0, 0.0, 0.0]));
        assert_eq!(client.position("balls/0"), None);
    }

    #[test]
    fn subscriptions_and_instanced_events_reach_their_callbacks() {
        let mut client = PhysicsClient::spawn(WorkerSettings::default()).unwrap();
        client.init(InitProps::default()).unwrap();
        client
            .add_bodies("Plane", vec!["ground".into()], vec![body(json!({}))])
            .unwrap();
        client
            .add_bodies(
                "Box",
                instance_ids("crates", 2),
                vec![
                    body(json!({ "mass": 1, "position": [-3, 0.6, 0] })),
                    body(json!({ "mass": 1, "position": [3, 0.6, 0] })),
                ],
            )
            .unwrap();

        let begins = Rc::new(RefCell::new(Vec::new()));
        let seen = begins.clone();
        client
            .handlers
            .on_collide_begin("crates", move |e| seen.borrow_mut().push(e.target.clone()));

        let speeds = Rc::new(RefCell::new(Vec::new()));
        let seen = speeds.clone();
        client
            .subscribe("crates/0", SubscriptionTarget::Bodies, "velocity", move |v| {
                seen.borrow_mut().push(v.clone())
            })
            .unwrap();

        for _ in 0..30 {
            step(&mut client);
        }
        let mut begins = begins.borrow().clone();
        begins.sort();
        begins.dedup();
        assert_eq!(begins, vec!["crates/0", "crates/1"]);
        assert_eq!(speeds.borrow().len(), 30);
        assert!(matches!(speeds.borrow()[0], ObservedValue::Vector(_)));
        assert!(client.take_errors().is_empty());
    }

    #[test]
    fn failed_steps_return_control_of_the_buffers() {
        let mut client = PhysicsClient::spawn(WorkerSettings::default()).unwrap();
        client
            .step(StepProps {
                step_size: -1.0,
                time_since_last_called: None,
                max_sub_steps: None,
            })
            .unwrap();
        client.wait_frame().unwrap();
        let errors = client.take_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].op, "step");
        assert!(!client.buffers_lent());
    }
}
