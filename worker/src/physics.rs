//! The worker: one world, driven by requests, answering with frames, events and errors.
//!
//! Message order for one request:
//! 1. every event queued while handling it (ray hits, collisions), in production order;
//! 2. the frame, for a successful `step`;
//! 3. an error report, if the request failed, or one per step fault (a body disabled for
//!    diverging) after the frame.
//!
//! An error never stops the worker; the next request is handled normally.

use crate::reducers;
use crate::settings::{UnknownIdentityPolicy, WorkerSettings};
use crate::world::WorldState;
use shared::codec;
use shared::protocol::ErrorReport;
use shared::{ProtocolError, Request, WorkerMessage};

pub struct PhysicsWorker {
    settings: WorkerSettings,
    world: WorldState,
}

impl Default for PhysicsWorker {
    fn default() -> Self {
        Self::new(WorkerSettings::default())
    }
}

impl PhysicsWorker {
    pub fn new(settings: WorkerSettings) -> Self {
        Self {
            settings,
            world: WorldState::new(),
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    /// Handles one request and returns the messages it produced.
    pub fn handle(&mut self, request: Request) -> Vec<WorkerMessage> {
        let op = request.op();
        log::trace!("handling `{op}`");
        let result = reducers::dispatch(&mut self.world, &self.settings, request);

        let mut messages: Vec<WorkerMessage> = self
            .world
            .drain_events()
            .into_iter()
            .map(WorkerMessage::Event)
            .collect();
        match result {
            Ok(Some(frame)) => {
                messages.push(WorkerMessage::Frame(frame));
                messages.extend(self.world.drain_faults().into_iter().map(|fault| {
                    let err = ProtocolError::from(fault);
                    WorkerMessage::Error(ErrorReport {
                        op: op.to_string(),
                        kind: err.kind(),
                        message: err.to_string(),
                    })
                }));
            }
            Ok(None) => {}
            Err(err)
                if err.is_unknown_identity()
                    && self.settings.unknown_identity == UnknownIdentityPolicy::Ignore =>
            {
                log::debug!("`{op}` ignored: {err}");
            }
            Err(err) => {
                log::warn!("`{op}` failed: {err}");
                messages.push(WorkerMessage::Error(ErrorReport {
                    op: op.to_string(),
                    kind: err.kind(),
                    message: err.to_string(),
                }));
            }
        }
        messages
    }

    /// Text transport: one JSON request in, its JSON-encoded messages out.
    ///
    /// Undecodable input yields a single `error` message with the op `decode`.
    pub fn handle_json(&mut self, text: &str) -> Vec<String> {
        let messages = match codec::decode_request(text) {
            Ok(request) => self.handle(request),
            Err(err) => {
                log::warn!("dropping undecodable request: {err}");
                vec![WorkerMessage::Error(ErrorReport {
                    op: "decode".to_string(),
                    kind: err.kind(),
                    message: err.to_string(),
                })]
            }
        };
        messages
            .iter()
            .filter_map(|message| match codec::encode_message(message) {
                Ok(text) => Some(text),
                Err(err) => {
                    log::error!("unable to encode outbound message: {err}");
                    None
                }
            })
            .collect()
    }
}
