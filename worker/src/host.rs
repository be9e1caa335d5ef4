//! Runs a [`PhysicsWorker`] on its own thread behind a pair of channels.
//!
//! Requests are handled strictly in arrival order. The worker stops when every request
//! sender is dropped; messages already produced stay readable after that.

use crate::physics::PhysicsWorker;
use crate::settings::WorkerSettings;
use crossbeam_channel::{Receiver, RecvError, SendError, Sender, TryRecvError, bounded, unbounded};
use shared::{Request, WorkerMessage};
use std::io;
use std::thread::{self, JoinHandle};

/// Caller side of a running worker.
pub struct WorkerHandle {
    requests: Option<Sender<Request>>,
    messages: Receiver<WorkerMessage>,
    thread: Option<JoinHandle<()>>,
}

/// Starts a worker thread.
pub fn spawn(settings: WorkerSettings) -> io::Result<WorkerHandle> {
    let (request_tx, request_rx) = unbounded::<Request>();
    let (message_tx, message_rx) = match settings.outbound_capacity {
        Some(capacity) => bounded(capacity),
        None => unbounded(),
    };
    let thread = thread::Builder::new()
        .name(settings.thread_name.clone())
        .spawn(move || run(PhysicsWorker::new(settings), request_rx, message_tx))?;
    Ok(WorkerHandle {
        requests: Some(request_tx),
        messages: message_rx,
        thread: Some(thread),
    })
}

fn run(mut worker: PhysicsWorker, requests: Receiver<Request>, messages: Sender<WorkerMessage>) {
    log::info!("physics worker started");
    for request in requests.iter() {
        for message in worker.handle(request) {
            if messages.send(message).is_err() {
                log::info!("message receiver dropped, stopping physics worker");
                return;
            }
        }
    }
    log::info!("physics worker stopped");
}

impl WorkerHandle {
    pub fn send(&self, request: Request) -> Result<(), SendError<Request>> {
        match &self.requests {
            Some(requests) => requests.send(request),
            None => Err(SendError(request)),
        }
    }

    /// Blocks until the next message. Fails once the worker is gone and drained.
    pub fn recv(&self) -> Result<WorkerMessage, RecvError> {
        self.messages.recv()
    }

    pub fn try_recv(&self) -> Result<WorkerMessage, TryRecvError> {
        self.messages.try_recv()
    }

    /// Every message available right now.
    pub fn drain(&self) -> Vec<WorkerMessage> {
        self.messages.try_iter().collect()
    }

    /// Stops accepting requests and waits for the worker to finish the queued ones.
    pub fn shutdown(&mut self) {
        self.requests = None;
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("physics worker thread panicked");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> Request {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn frames_come_back_in_request_order() {
        let handle = spawn(WorkerSettings::default()).unwrap();
        handle.send(request(json!({ "op": "init", "props": { "gravity": [0, -10, 0] } }))).unwrap();
        handle
            .send(request(json!({
                "op": "addBodies", "type": "Sphere", "uuid": ["ball"],
                "props": [{ "mass": 1, "position": [0, 10, 0] }]
            })))
            .unwrap();
        let mut last_y = 10.0;
        for _ in 0..3 {
            handle
                .send(request(json!({ "op": "step", "props": { "stepSize": 0.1 } })))
                .unwrap();
            let WorkerMessage::Frame(frame) = handle.recv().unwrap() else {
                panic!("expected a frame");
            };
            assert_eq!(frame.positions.len(), 3);
            assert!(frame.positions[1] < last_y);
            last_y = frame.positions[1];
        }
    }

    #[test]
    fn shutdown_finishes_queued_requests() {
        let mut handle = spawn(WorkerSettings {
            thread_name: "physics-test".into(),
            ..WorkerSettings::default()
        })
        .unwrap();
        for _ in 0..5 {
            handle
                .send(request(json!({ "op": "step", "props": { "stepSize": 0.01 } })))
                .unwrap();
        }
        handle.shutdown();
        assert_eq!(handle.drain().len(), 5);
        assert!(handle.send(request(json!({ "op": "wakeUp", "uuid": "x" }))).is_err());
    }
}
