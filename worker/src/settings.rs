//! Worker configuration.
//!
//! These are host-level knobs, fixed for the lifetime of a worker. World-level parameters
//! (gravity, solver, default contact material...) come from the `init` request instead.

use serde::{Deserialize, Serialize};
use shared::constants::DEFAULT_MAX_SUB_STEPS;

/// What to do when a request names an identity the world does not know.
///
/// Callers routinely race removal against use (an unmount followed by a queued setter), so
/// the default is to drop such requests quietly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnknownIdentityPolicy {
    /// Drop the request, logging at debug level.
    #[default]
    Ignore,
    /// Send an `error` message back to the caller.
    Report,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkerSettings {
    pub unknown_identity: UnknownIdentityPolicy,

    /// Sub-step cap used when a `step` request does not carry its own.
    pub max_sub_steps: u32,

    /// Capacity of the outbound message queue; `None` for unbounded.
    ///
    /// When bounded, a caller that stops draining messages eventually blocks the worker
    /// instead of growing memory without limit.
    pub outbound_capacity: Option<usize>,

    /// Name given to the worker thread.
    pub thread_name: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            unknown_identity: UnknownIdentityPolicy::Ignore,
            max_sub_steps: DEFAULT_MAX_SUB_STEPS,
            outbound_capacity: None,
            thread_name: "physics-worker".to_string(),
        }
    }
}
