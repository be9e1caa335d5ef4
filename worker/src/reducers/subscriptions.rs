use crate::subscription::Subscription;
use crate::world::WorldState;
use shared::{IdentityKind, ProtocolError, SubscribeProps};

/// Subscribes to one property of a body or vehicle. The target does not have to exist yet;
/// frames simply carry no observation for it until it does.
pub fn subscribe(
    world: &mut WorldState,
    target: &str,
    props: &SubscribeProps,
) -> Result<(), ProtocolError> {
    if world.subscriptions.contains_key(&props.id) {
        return Err(ProtocolError::DuplicateSubscription(props.id));
    }
    let subscription = Subscription::new(target, props)?;
    world.subscriptions.insert(props.id, subscription);
    Ok(())
}

pub fn unsubscribe(world: &mut WorldState, id: u32) -> Result<(), ProtocolError> {
    match world.subscriptions.remove(&id) {
        Some(_) => Ok(()),
        None => Err(ProtocolError::unknown(IdentityKind::Subscription, id.to_string())),
    }
}
