use crate::settings::WorkerSettings;
use crate::world::WorldState;
use shared::{Frame, ProtocolError, StepProps};

/// Advances the world and returns the frame, filled into the caller's own buffers.
///
/// Only an invalid request fails. Faults found while stepping stay queued on the world and
/// are reported after the frame.
pub fn step(
    world: &mut WorldState,
    settings: &WorkerSettings,
    props: &StepProps,
    positions: Vec<f32>,
    quaternions: Vec<f32>,
) -> Result<Frame, ProtocolError> {
    if !(props.step_size.is_finite() && props.step_size > 0.0) {
        return Err(ProtocolError::invalid(
            "step",
            format!("step size {} must be positive", props.step_size),
        ));
    }
    if props.time_since_last_called.is_some_and(|t| !t.is_finite()) {
        return Err(ProtocolError::invalid("step", "timeSinceLastCalled must be finite"));
    }

    let steps = world.advance(props, settings.max_sub_steps);
    if steps > 1 {
        log::trace!("caught up with {steps} sub-steps");
    }
    Ok(world.frame(positions, quaternions))
}
