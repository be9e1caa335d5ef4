//! Material interning, contact materials, and the contact hooks that apply them.
//!
//! Responsibilities:
//! - Intern materials by name (or, when unnamed, by their exact option set) so repeated
//!   references resolve to one id.
//! - Keep the pairwise contact-material table keyed by canonical `(low, high)` id pairs.
//! - Resolve the friction/restitution used for a contact pair and feed it to the solver.
//!
//! Resolution order for a pair:
//! 1. a registered contact material for the two material ids;
//! 2. when both sides have materials with non-negative values, their product;
//! 3. the world's default contact material.

use crate::tag::{tag_material, tag_responds};
use rapier3d::prelude::*;
use serde_json::{Value, json};
use shared::constants::{DEFAULT_FRICTION, DEFAULT_RESTITUTION};
use shared::protocol::{ContactMaterialOptions, MaterialOptions};
use shared::{IdentityKind, MaterialRef, ProtocolError};
use std::collections::HashMap;

pub type MaterialId = u32;

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub id: MaterialId,
    pub name: Option<String>,
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
}

impl Material {
    /// Plain-data view, as sent in observations.
    pub fn describe(&self) -> Value {
        match &self.name {
            Some(name) => json!(name),
            None => json!({ "friction": self.friction, "restitution": self.restitution }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum MaterialKey {
    Named(String),
    Options {
        friction: Option<u32>,
        restitution: Option<u32>,
    },
}

/// Solver coefficients for a contact pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactCoefficients {
    pub friction: f32,
    pub restitution: f32,
}

impl Default for ContactCoefficients {
    fn default() -> Self {
        Self {
            friction: DEFAULT_FRICTION,
            restitution: DEFAULT_RESTITUTION,
        }
    }
}

impl ContactCoefficients {
    /// Applies the overrides present in `options` on top of `self`.
    pub fn with_options(self, options: &ContactMaterialOptions) -> Self {
        Self {
            friction: options.friction.unwrap_or(self.friction),
            restitution: options.restitution.unwrap_or(self.restitution),
        }
    }
}

#[derive(Clone, Debug)]
struct ContactMaterial {
    owner: String,
    coefficients: ContactCoefficients,
    /// Stiffness/relaxation overrides. The engine's solver is not spring-based per
    /// equation, so these are kept for reference only.
    options: ContactMaterialOptions,
}

fn canonical(a: MaterialId, b: MaterialId) -> (MaterialId, MaterialId) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Debug, Default)]
pub struct MaterialRegistry {
    materials: Vec<Material>,
    by_key: HashMap<MaterialKey, MaterialId>,
    pairs: HashMap<(MaterialId, MaterialId), ContactMaterial>,
    pair_by_owner: HashMap<String, (MaterialId, MaterialId)>,
    default_contact: ContactCoefficients,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default_contact(&mut self, coefficients: ContactCoefficients) {
        self.default_contact = coefficients;
    }

    pub fn default_contact(&self) -> ContactCoefficients {
        self.default_contact
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id as usize)
    }

    /// Returns the id for `material`, creating it on first use.
    ///
    /// A named reference always resolves by name: the options given the first time a name is
    /// seen stick, later option sets under the same name are ignored.
    pub fn intern(&mut self, material: &MaterialRef) -> MaterialId {
        let (key, options) = match material {
            MaterialRef::Named(name) => (
                MaterialKey::Named(name.clone()),
                MaterialOptions {
                    name: Some(name.clone()),
                    ..MaterialOptions::default()
                },
            ),
            MaterialRef::Options(options) => {
                let key = match &options.name {
                    Some(name) => MaterialKey::Named(name.clone()),
                    None => MaterialKey::Options {
                        friction: options.friction.map(f32::to_bits),
                        restitution: options.restitution.map(f32::to_bits),
                    },
                };
                (key, options.clone())
            }
        };

        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }
        let id = self.materials.len() as MaterialId;
        self.materials.push(Material {
            id,
            name: options.name,
            friction: options.friction,
            restitution: options.restitution,
        });
        self.by_key.insert(key, id);
        id
    }

    /// Registers a contact material under the caller's identity.
    ///
    /// A later registration for the same material pair replaces the coefficients; removing
    /// the earlier identity then leaves the newer pairing in place.
    pub fn add_contact_material(
        &mut self,
        owner: &str,
        a: MaterialId,
        b: MaterialId,
        options: ContactMaterialOptions,
    ) -> Result<(), ProtocolError> {
        if self.pair_by_owner.contains_key(owner) {
            return Err(ProtocolError::DuplicateIdentity {
                kind: IdentityKind::ContactMaterial,
                id: owner.to_string(),
            });
        }
        let key = canonical(a, b);
        let coefficients = self.default_contact.with_options(&options);
        self.pairs.insert(
            key,
            ContactMaterial {
                owner: owner.to_string(),
                coefficients,
                options,
            },
        );
        self.pair_by_owner.insert(owner.to_string(), key);
        Ok(())
    }

    pub fn remove_contact_material(&mut self, owner: &str) -> Result<(), ProtocolError> {
        let key = self
            .pair_by_owner
            .remove(owner)
            .ok_or_else(|| ProtocolError::unknown(IdentityKind::ContactMaterial, owner))?;
        if self.pairs.get(&key).is_some_and(|cm| cm.owner == owner) {
            self.pairs.remove(&key);
        }
        Ok(())
    }

    pub fn has_contact_material(&self, owner: &str) -> bool {
        self.pair_by_owner.contains_key(owner)
    }

    /// Stiffness/relaxation overrides of a registered pair.
    pub fn contact_options(&self, a: MaterialId, b: MaterialId) -> Option<&ContactMaterialOptions> {
        self.pairs.get(&canonical(a, b)).map(|cm| &cm.options)
    }

    pub fn coefficients(
        &self,
        a: Option<MaterialId>,
        b: Option<MaterialId>,
    ) -> ContactCoefficients {
        let (Some(a), Some(b)) = (a, b) else {
            return self.default_contact;
        };
        if let Some(cm) = self.pairs.get(&canonical(a, b)) {
            return cm.coefficients;
        }
        let (Some(ma), Some(mb)) = (self.get(a), self.get(b)) else {
            return self.default_contact;
        };
        let product = |x: Option<f32>, y: Option<f32>, fallback: f32| match (x, y) {
            (Some(x), Some(y)) if x >= 0.0 && y >= 0.0 => x * y,
            _ => fallback,
        };
        ContactCoefficients {
            friction: product(ma.friction, mb.friction, self.default_contact.friction),
            restitution: product(ma.restitution, mb.restitution, self.default_contact.restitution),
        }
    }
}

/// Engine hooks applying collision response flags and material coefficients.
pub struct ContactRules<'a> {
    pub materials: &'a MaterialRegistry,
}

impl PhysicsHooks for ContactRules<'_> {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let c1 = &context.colliders[context.collider1];
        let c2 = &context.colliders[context.collider2];
        // Non-responding pairs still produce contacts (and therefore events).
        if tag_responds(c1.user_data) && tag_responds(c2.user_data) {
            Some(SolverFlags::COMPUTE_IMPULSES)
        } else {
            Some(SolverFlags::empty())
        }
    }

    fn modify_solver_contacts(&self, context: &mut ContactModificationContext) {
        let m1 = tag_material(context.colliders[context.collider1].user_data);
        let m2 = tag_material(context.colliders[context.collider2].user_data);
        let coefficients = self.materials.coefficients(m1, m2);
        for contact in context.solver_contacts.iter_mut() {
            contact.friction = coefficients.friction;
            contact.restitution = coefficients.restitution;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(friction: f32, restitution: f32) -> MaterialRef {
        MaterialRef::Options(MaterialOptions {
            name: None,
            friction: Some(friction),
            restitution: Some(restitution),
        })
    }

    #[test]
    fn names_and_option_sets_are_interned() {
        let mut registry = MaterialRegistry::new();
        let ice = registry.intern(&MaterialRef::Named("ice".into()));
        assert_eq!(registry.intern(&MaterialRef::Named("ice".into())), ice);

        let a = registry.intern(&options(0.5, 0.1));
        let b = registry.intern(&options(0.5, 0.1));
        let c = registry.intern(&options(0.5, 0.2));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, ice);
    }

    #[test]
    fn named_options_resolve_by_name() {
        let mut registry = MaterialRegistry::new();
        let first = registry.intern(&MaterialRef::Options(MaterialOptions {
            name: Some("rubber".into()),
            friction: Some(0.9),
            restitution: None,
        }));
        let by_name = registry.intern(&MaterialRef::Named("rubber".into()));
        assert_eq!(first, by_name);
        assert_eq!(registry.get(first).unwrap().friction, Some(0.9));
    }

    #[test]
    fn pair_resolution_order() {
        let mut registry = MaterialRegistry::new();
        let a = registry.intern(&options(0.5, 0.4));
        let b = registry.intern(&options(0.2, 0.5));
        let bare = registry.intern(&MaterialRef::Named("bare".into()));

        // No material on one side: world default.
        assert_eq!(registry.coefficients(Some(a), None), ContactCoefficients::default());
        // Unset values: world default.
        assert_eq!(registry.coefficients(Some(a), Some(bare)), ContactCoefficients::default());
        // Both set: product.
        let product = registry.coefficients(Some(a), Some(b));
        assert!((product.friction - 0.1).abs() < 1.0e-6);
        assert!((product.restitution - 0.2).abs() < 1.0e-6);

        // Registered pair wins, in either order.
        registry
            .add_contact_material(
                "a-b",
                b,
                a,
                ContactMaterialOptions {
                    friction: Some(0.0),
                    restitution: Some(0.9),
                    ..ContactMaterialOptions::default()
                },
            )
            .unwrap();
        let registered = registry.coefficients(Some(a), Some(b));
        assert_eq!(registered.friction, 0.0);
        assert_eq!(registered.restitution, 0.9);

        registry.remove_contact_material("a-b").unwrap();
        assert!((registry.coefficients(Some(a), Some(b)).friction - 0.1).abs() < 1.0e-6);
    }

    #[test]
    fn contact_material_identities_are_unique() {
        let mut registry = MaterialRegistry::new();
        let a = registry.intern(&MaterialRef::Named("a".into()));
        registry
            .add_contact_material("cm", a, a, ContactMaterialOptions::default())
            .unwrap();
        let err = registry
            .add_contact_material("cm", a, a, ContactMaterialOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateIdentity { .. }));
        assert!(registry.remove_contact_material("missing").unwrap_err().is_unknown_identity());
    }

    #[test]
    fn replaced_pair_survives_removal_of_older_owner() {
        let mut registry = MaterialRegistry::new();
        let a = registry.intern(&MaterialRef::Named("a".into()));
        let b = registry.intern(&MaterialRef::Named("b".into()));
        let slippery = ContactMaterialOptions {
            friction: Some(0.01),
            ..ContactMaterialOptions::default()
        };
        let grippy = ContactMaterialOptions {
            friction: Some(2.0),
            ..ContactMaterialOptions::default()
        };
        registry.add_contact_material("old", a, b, slippery).unwrap();
        registry.add_contact_material("new", a, b, grippy).unwrap();
        registry.remove_contact_material("old").unwrap();
        assert_eq!(registry.coefficients(Some(a), Some(b)).friction, 2.0);
        assert!(registry.contact_options(a, b).is_some());
    }
}
