//! Errors that cross the protocol boundary.
//!
//! Every handler failure is a [`ProtocolError`]. The worker reports them back as an `error`
//! message carrying the op name, an [`ErrorKind`] the caller can match on, and the rendered
//! message; the error value itself never crosses the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What an identity refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentityKind {
    Body,
    Constraint,
    Spring,
    Ray,
    Vehicle,
    ContactMaterial,
    Subscription,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdentityKind::Body => "body",
            IdentityKind::Constraint => "constraint",
            IdentityKind::Spring => "spring",
            IdentityKind::Ray => "ray",
            IdentityKind::Vehicle => "vehicle",
            IdentityKind::ContactMaterial => "contact material",
            IdentityKind::Subscription => "subscription",
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unable to decode message: {0}")]
    Decode(String),

    #[error("unable to encode message: {0}")]
    Encode(String),

    #[error("unknown shape type `{0}`")]
    UnknownShapeType(String),

    #[error("invalid arguments for {shape} shape: {reason}")]
    InvalidShapeArgs { shape: &'static str, reason: String },

    #[error("degenerate {shape} geometry: {reason}")]
    DegenerateShape { shape: &'static str, reason: String },

    #[error("unknown {kind} `{id}`")]
    UnknownIdentity { kind: IdentityKind, id: String },

    #[error("{kind} `{id}` already exists")]
    DuplicateIdentity { kind: IdentityKind, id: String },

    #[error("`{property}` cannot be observed on a {target}")]
    UnknownProperty { property: String, target: String },

    #[error("subscription {0} already exists")]
    DuplicateSubscription(u32),

    #[error("invalid {what}: {reason}")]
    InvalidRequest { what: &'static str, reason: String },

    #[error("step failed: {0}")]
    Step(String),
}

impl ProtocolError {
    pub fn unknown(kind: IdentityKind, id: impl Into<String>) -> Self {
        ProtocolError::UnknownIdentity {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        ProtocolError::InvalidRequest {
            what,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Decode(_) | ProtocolError::Encode(_) => ErrorKind::Codec,
            ProtocolError::UnknownShapeType(_) => ErrorKind::UnknownShapeType,
            ProtocolError::InvalidShapeArgs { .. } | ProtocolError::DegenerateShape { .. } => {
                ErrorKind::InvalidShape
            }
            ProtocolError::UnknownIdentity { .. } => ErrorKind::UnknownIdentity,
            ProtocolError::DuplicateIdentity { .. } | ProtocolError::DuplicateSubscription(_) => {
                ErrorKind::DuplicateIdentity
            }
            ProtocolError::UnknownProperty { .. } => ErrorKind::UnknownProperty,
            ProtocolError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            ProtocolError::Step(_) => ErrorKind::Step,
        }
    }

    /// True for lookups that missed, which callers may legitimately race against removal.
    pub fn is_unknown_identity(&self) -> bool {
        matches!(self, ProtocolError::UnknownIdentity { .. })
    }
}

/// Serializable classification of a [`ProtocolError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Codec,
    UnknownShapeType,
    InvalidShape,
    UnknownIdentity,
    DuplicateIdentity,
    UnknownProperty,
    InvalidRequest,
    Step,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_identity() {
        let err = ProtocolError::unknown(IdentityKind::ContactMaterial, "ice-on-steel");
        assert_eq!(err.to_string(), "unknown contact material `ice-on-steel`");
        assert_eq!(err.kind(), ErrorKind::UnknownIdentity);
        assert!(err.is_unknown_identity());
    }

    #[test]
    fn shape_errors_share_a_kind() {
        let bad_args = ProtocolError::InvalidShapeArgs {
            shape: "Box",
            reason: "expected 3 numbers".into(),
        };
        let degenerate = ProtocolError::DegenerateShape {
            shape: "Trimesh",
            reason: "no triangles".into(),
        };
        assert_eq!(bad_args.kind(), ErrorKind::InvalidShape);
        assert_eq!(degenerate.kind(), ErrorKind::InvalidShape);
        assert!(!bad_args.is_unknown_identity());
    }
}
