use crate::world::WorldState;
use shared::{ContactMaterialProps, IdentityKind, ProtocolError};

pub fn add_contact_material(
    world: &mut WorldState,
    id: &str,
    props: &ContactMaterialProps,
) -> Result<(), ProtocolError> {
    if world.materials.has_contact_material(id) {
        return Err(ProtocolError::DuplicateIdentity {
            kind: IdentityKind::ContactMaterial,
            id: id.to_string(),
        });
    }
    let a = world.materials.intern(&props.material_a);
    let b = world.materials.intern(&props.material_b);
    world.materials.add_contact_material(id, a, b, props.options.clone())
}

pub fn remove_contact_material(world: &mut WorldState, id: &str) -> Result<(), ProtocolError> {
    world.materials.remove_contact_material(id)
}
