use crate::body::build_body;
use crate::world::WorldState;
use shared::{BodyProps, IdentityKind, ProtocolError};
use std::collections::HashSet;

/// Adds a batch of bodies sharing one shape tag.
///
/// The batch is all-or-nothing: every identity is checked and every body built before the
/// first one is inserted.
pub fn add_bodies(
    world: &mut WorldState,
    uuids: &[String],
    shape: &str,
    props: &[BodyProps],
) -> Result<(), ProtocolError> {
    if uuids.len() != props.len() {
        return Err(ProtocolError::invalid(
            "addBodies",
            format!("{} identities for {} property bags", uuids.len(), props.len()),
        ));
    }

    let mut seen = HashSet::with_capacity(uuids.len());
    for id in uuids {
        if world.contains_body(id) || !seen.insert(id.as_str()) {
            return Err(ProtocolError::DuplicateIdentity {
                kind: IdentityKind::Body,
                id: id.clone(),
            });
        }
    }

    let allow_sleep = world.config.allow_sleep;
    let blueprints = props
        .iter()
        .map(|p| build_body(shape, p, &mut world.materials, allow_sleep))
        .collect::<Result<Vec<_>, _>>()?;

    for (id, blueprint) in uuids.iter().zip(blueprints) {
        world.insert_body(id, blueprint)?;
    }
    log::debug!("added {} {shape} bodies", uuids.len());
    Ok(())
}

/// Removes bodies by identity. Known identities are removed even when some are unknown; the
/// first unknown one is reported.
pub fn remove_bodies(world: &mut WorldState, uuids: &[String]) -> Result<(), ProtocolError> {
    let mut first_unknown = None;
    for id in uuids {
        match world.remove_body(id) {
            Ok(()) => {}
            Err(err) if first_unknown.is_none() => first_unknown = Some(err),
            Err(_) => {}
        }
    }
    match first_unknown {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
