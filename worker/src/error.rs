use shared::ProtocolError;

/// Problems met while stepping. None of them stops the step: a vehicle with a missing body is
/// skipped for that phase, and a diverging body is disabled and reported.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("vehicle `{vehicle}` lost its chassis body")]
    MissingChassis { vehicle: String },

    #[error("vehicle `{vehicle}` wheel {wheel} body `{body}` no longer exists")]
    MissingWheel {
        vehicle: String,
        wheel: usize,
        body: String,
    },

    #[error("body `{body}` diverged to a non-finite state and was disabled")]
    NonFinite { body: String },
}

impl From<StepError> for ProtocolError {
    fn from(err: StepError) -> Self {
        ProtocolError::Step(err.to_string())
    }
}
