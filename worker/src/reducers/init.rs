use crate::world::{WorldConfig, WorldState};
use shared::{InitProps, ProtocolError};

/// Configures the world. Calling it again reconfigures the same world in place.
pub fn init(world: &mut WorldState, props: &InitProps) -> Result<(), ProtocolError> {
    if let Some(iterations) = props.iterations
        && iterations == 0
    {
        return Err(ProtocolError::invalid("init", "iterations must be at least 1"));
    }
    if props.gravity.is_some_and(|g| g.iter().any(|v| !v.is_finite())) {
        return Err(ProtocolError::invalid("init", "gravity must be finite"));
    }

    let config = WorldConfig::from_init(props);
    log::info!(
        "world configured: gravity {:?}, {} iterations, sleep {}",
        config.gravity,
        config.iterations,
        if config.allow_sleep { "allowed" } else { "disabled" }
    );
    world.configure(config);
    if let Some(size) = props.size {
        world.records.reserve(size.saturating_sub(world.records.len()));
    }
    Ok(())
}
