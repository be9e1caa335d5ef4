//! Declarative shape descriptions.
//!
//! A shape arrives as a type tag plus a loosely-typed argument value (whatever the caller's
//! scene binding produced). [`ShapeDesc::parse`] validates it into a typed description; the
//! worker turns that into an engine collider.
//!
//! Argument conventions per tag:
//! - `Box`: `[width, height, depth]` full extents, halved here. Missing means `[1, 1, 1]`.
//! - `Sphere`: `radius` or `[radius]`. Missing means `1`; an empty list is rejected.
//! - `Cylinder`: `[radiusTop, radiusBottom, height, segments]`, each optional.
//! - `Plane`, `Particle`: no arguments.
//! - `ConvexPolyhedron`: `[vertices, faces, normals?, axes?, boundingRadius?]`.
//! - `Trimesh`: `[vertices, indices]`, flat or nested in triplets.
//! - `Heightfield`: `[data, { elementSize, minValue?, maxValue? }]`.

use crate::constants::DEFAULT_CYLINDER_SEGMENTS;
use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Box,
    Sphere,
    Cylinder,
    Plane,
    Particle,
    ConvexPolyhedron,
    Trimesh,
    Heightfield,
}

impl ShapeType {
    pub const ALL: [ShapeType; 8] = [
        ShapeType::Box,
        ShapeType::Sphere,
        ShapeType::Cylinder,
        ShapeType::Plane,
        ShapeType::Particle,
        ShapeType::ConvexPolyhedron,
        ShapeType::Trimesh,
        ShapeType::Heightfield,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeType::Box => "Box",
            ShapeType::Sphere => "Sphere",
            ShapeType::Cylinder => "Cylinder",
            ShapeType::Plane => "Plane",
            ShapeType::Particle => "Particle",
            ShapeType::ConvexPolyhedron => "ConvexPolyhedron",
            ShapeType::Trimesh => "Trimesh",
            ShapeType::Heightfield => "Heightfield",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeType {
    type Err = ProtocolError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        ShapeType::ALL
            .into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| ProtocolError::UnknownShapeType(tag.to_string()))
    }
}

/// Validated shape parameters, in meters.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeDesc {
    Box {
        half_extents: [f32; 3],
    },
    Sphere {
        radius: f32,
    },
    /// Y-aligned, centered on the local origin.
    Cylinder {
        radius_top: f32,
        radius_bottom: f32,
        height: f32,
        segments: u32,
    },
    /// Infinite half-space with outward normal local +Y.
    Plane,
    Particle,
    ConvexPolyhedron {
        vertices: Vec<[f32; 3]>,
        faces: Vec<Vec<u32>>,
        /// Accepted for compatibility; the engine derives its own.
        normals: Option<Vec<[f32; 3]>>,
        axes: Option<Vec<[f32; 3]>>,
        bounding_radius: Option<f32>,
    },
    Trimesh {
        /// Flat `x y z` triplets.
        vertices: Vec<f32>,
        /// Flat triangle index triplets.
        indices: Vec<u32>,
    },
    /// `data[i][j]` is the height at `x = i * element_size`, `z = j * element_size`.
    Heightfield {
        data: Vec<Vec<f32>>,
        element_size: f32,
        min_value: Option<f32>,
        max_value: Option<f32>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bare(f32),
    Wrapped(Vec<f32>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlatOrNested<T> {
    Flat(Vec<T>),
    Nested(Vec<[T; 3]>),
}

impl<T: Copy> FlatOrNested<T> {
    fn flatten(self) -> Vec<T> {
        match self {
            FlatOrNested::Flat(v) => v,
            FlatOrNested::Nested(v) => v.into_iter().flatten().collect(),
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeightfieldOptions {
    element_size: Option<f32>,
    min_value: Option<f32>,
    max_value: Option<f32>,
}

impl ShapeDesc {
    /// Parses a tag and its arguments.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownShapeType`] for an unrecognized tag.
    /// - [`ProtocolError::InvalidShapeArgs`] when the arguments do not fit the tag.
    /// - [`ProtocolError::DegenerateShape`] for well-formed but unusable geometry.
    pub fn parse(tag: &str, args: &Value) -> Result<Self, ProtocolError> {
        Self::from_args(tag.parse()?, args)
    }

    pub fn from_args(shape: ShapeType, args: &Value) -> Result<Self, ProtocolError> {
        let name = shape.as_str();
        let desc = match shape {
            ShapeType::Box => {
                let extents: [f32; 3] = optional(name, args)?.unwrap_or([1.0; 3]);
                ShapeDesc::Box {
                    half_extents: extents.map(|e| e * 0.5),
                }
            }
            ShapeType::Sphere => {
                let radius = match optional::<Scalar>(name, args)? {
                    None => 1.0,
                    Some(Scalar::Bare(r)) => r,
                    Some(Scalar::Wrapped(v)) => match v.as_slice() {
                        [r] => *r,
                        _ => {
                            return Err(invalid(
                                name,
                                format!("expected one radius, got {}", v.len()),
                            ));
                        }
                    },
                };
                ShapeDesc::Sphere { radius }
            }
            ShapeType::Cylinder => {
                let v: Vec<Option<f32>> = optional(name, args)?.unwrap_or_default();
                if v.len() > 4 {
                    return Err(invalid(
                        name,
                        format!("expected at most 4 numbers, got {}", v.len()),
                    ));
                }
                if v.iter().flatten().any(|x| !x.is_finite()) {
                    return Err(invalid(name, "arguments must be finite"));
                }
                let at = |i: usize, default: f32| v.get(i).copied().flatten().unwrap_or(default);
                ShapeDesc::Cylinder {
                    radius_top: at(0, 1.0),
                    radius_bottom: at(1, 1.0),
                    height: at(2, 1.0),
                    segments: at(3, DEFAULT_CYLINDER_SEGMENTS as f32).max(3.0) as u32,
                }
            }
            ShapeType::Plane => ShapeDesc::Plane,
            ShapeType::Particle => ShapeDesc::Particle,
            ShapeType::ConvexPolyhedron => {
                let parts = tuple(name, args)?;
                let vertices: Vec<[f32; 3]> = element(name, &parts, 0)?.unwrap_or_default();
                ShapeDesc::ConvexPolyhedron {
                    vertices,
                    faces: element(name, &parts, 1)?.unwrap_or_default(),
                    normals: element(name, &parts, 2)?,
                    axes: element(name, &parts, 3)?,
                    bounding_radius: element(name, &parts, 4)?,
                }
            }
            ShapeType::Trimesh => {
                let parts = tuple(name, args)?;
                let vertices = element::<FlatOrNested<f32>>(name, &parts, 0)?
                    .map(FlatOrNested::flatten)
                    .unwrap_or_default();
                let indices = element::<FlatOrNested<u32>>(name, &parts, 1)?
                    .map(FlatOrNested::flatten)
                    .unwrap_or_default();
                ShapeDesc::Trimesh { vertices, indices }
            }
            ShapeType::Heightfield => {
                let parts = tuple(name, args)?;
                let data: Vec<Vec<f32>> = element(name, &parts, 0)?.unwrap_or_default();
                let options: HeightfieldOptions = element(name, &parts, 1)?.unwrap_or_default();
                ShapeDesc::Heightfield {
                    data,
                    element_size: options.element_size.unwrap_or(1.0),
                    min_value: options.min_value,
                    max_value: options.max_value,
                }
            }
        };
        desc.validate()?;
        Ok(desc)
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            ShapeDesc::Box { .. } => ShapeType::Box,
            ShapeDesc::Sphere { .. } => ShapeType::Sphere,
            ShapeDesc::Cylinder { .. } => ShapeType::Cylinder,
            ShapeDesc::Plane => ShapeType::Plane,
            ShapeDesc::Particle => ShapeType::Particle,
            ShapeDesc::ConvexPolyhedron { .. } => ShapeType::ConvexPolyhedron,
            ShapeDesc::Trimesh { .. } => ShapeType::Trimesh,
            ShapeDesc::Heightfield { .. } => ShapeType::Heightfield,
        }
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let shape = self.shape_type().as_str();
        let degenerate = |reason: &str| {
            Err(ProtocolError::DegenerateShape {
                shape,
                reason: reason.to_string(),
            })
        };
        match self {
            ShapeDesc::Box { half_extents } => {
                if half_extents.iter().any(|e| !e.is_finite() || *e <= 0.0) {
                    return degenerate("extents must be positive");
                }
            }
            ShapeDesc::Sphere { radius } => {
                if !radius.is_finite() || *radius <= 0.0 {
                    return degenerate("radius must be positive");
                }
            }
            ShapeDesc::Cylinder {
                radius_top,
                radius_bottom,
                height,
                ..
            } => {
                if *radius_top < 0.0 || *radius_bottom < 0.0 || *height <= 0.0 {
                    return degenerate("radii must be non-negative and height positive");
                }
                if *radius_top == 0.0 && *radius_bottom == 0.0 {
                    return degenerate("both radii are zero");
                }
            }
            ShapeDesc::Plane | ShapeDesc::Particle => {}
            ShapeDesc::ConvexPolyhedron {
                vertices, faces, ..
            } => {
                if vertices.len() < 4 {
                    return degenerate("at least 4 vertices are required");
                }
                let n = vertices.len() as u32;
                if faces.iter().flatten().any(|&i| i >= n) {
                    return degenerate("face index out of range");
                }
            }
            ShapeDesc::Trimesh { vertices, indices } => {
                if vertices.len() % 3 != 0 || indices.len() % 3 != 0 {
                    return degenerate("vertex and index counts must be multiples of 3");
                }
                if indices.is_empty() {
                    return degenerate("no triangles");
                }
                let n = (vertices.len() / 3) as u32;
                if indices.iter().any(|&i| i >= n) {
                    return degenerate("triangle index out of range");
                }
            }
            ShapeDesc::Heightfield {
                data, element_size, ..
            } => {
                if data.len() < 2 || data.iter().any(|row| row.len() < 2) {
                    return degenerate("height grid must be at least 2 x 2");
                }
                if data.iter().any(|row| row.len() != data[0].len()) {
                    return degenerate("height grid rows differ in length");
                }
                if *element_size <= 0.0 {
                    return degenerate("element size must be positive");
                }
            }
        }
        Ok(())
    }
}

fn invalid(shape: &'static str, reason: impl fmt::Display) -> ProtocolError {
    ProtocolError::InvalidShapeArgs {
        shape,
        reason: reason.to_string(),
    }
}

/// `null` (or absent) means "use the defaults".
fn optional<T: DeserializeOwned>(
    shape: &'static str,
    args: &Value,
) -> Result<Option<T>, ProtocolError> {
    if args.is_null() {
        return Ok(None);
    }
    serde_json::from_value(args.clone())
        .map(Some)
        .map_err(|e| invalid(shape, e))
}

fn tuple(shape: &'static str, args: &Value) -> Result<Vec<Value>, ProtocolError> {
    match args {
        Value::Array(parts) => Ok(parts.clone()),
        Value::Null => Ok(Vec::new()),
        other => Err(invalid(shape, format!("expected an argument list, got {other}"))),
    }
}

fn element<T: DeserializeOwned>(
    shape: &'static str,
    parts: &[Value],
    index: usize,
) -> Result<Option<T>, ProtocolError> {
    match parts.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| invalid(shape, format!("argument {index}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn box_extents_are_halved() {
        let desc = ShapeDesc::parse("Box", &json!([2.0, 4.0, 1.0])).unwrap();
        assert_eq!(
            desc,
            ShapeDesc::Box {
                half_extents: [1.0, 2.0, 0.5]
            }
        );
        let unit = ShapeDesc::parse("Box", &Value::Null).unwrap();
        assert_eq!(
            unit,
            ShapeDesc::Box {
                half_extents: [0.5; 3]
            }
        );
    }

    #[test]
    fn sphere_accepts_bare_and_wrapped_radius() {
        let bare = ShapeDesc::parse("Sphere", &json!(0.75)).unwrap();
        let wrapped = ShapeDesc::parse("Sphere", &json!([0.75])).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare, ShapeDesc::Sphere { radius: 0.75 });
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = ShapeDesc::parse("Torus", &json!([1.0])).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownShapeType("Torus".into()));
    }

    #[test]
    fn cylinder_fills_missing_arguments() {
        let desc = ShapeDesc::parse("Cylinder", &json!([0.5, 1.0])).unwrap();
        assert_eq!(
            desc,
            ShapeDesc::Cylinder {
                radius_top: 0.5,
                radius_bottom: 1.0,
                height: 1.0,
                segments: DEFAULT_CYLINDER_SEGMENTS,
            }
        );
    }

    #[test]
    fn convex_vertices_are_triplets() {
        let desc = ShapeDesc::parse(
            "ConvexPolyhedron",
            &json!([
                [[0, 0, 0], [1, 0, 0], [0, 1, 0], [0, 0, 1]],
                [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]]
            ]),
        )
        .unwrap();
        match desc {
            ShapeDesc::ConvexPolyhedron {
                vertices, faces, normals, ..
            } => {
                assert_eq!(vertices[1], [1.0, 0.0, 0.0]);
                assert_eq!(faces.len(), 4);
                assert!(normals.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn trimesh_accepts_flat_and_nested_arrays() {
        let flat = ShapeDesc::parse(
            "Trimesh",
            &json!([[0, 0, 0, 1, 0, 0, 0, 0, 1], [0, 1, 2]]),
        )
        .unwrap();
        let nested = ShapeDesc::parse(
            "Trimesh",
            &json!([[[0, 0, 0], [1, 0, 0], [0, 0, 1]], [[0, 1, 2]]]),
        )
        .unwrap();
        assert_eq!(flat, nested);
    }

    #[test]
    fn trimesh_index_out_of_range_is_degenerate() {
        let err = ShapeDesc::parse("Trimesh", &json!([[0, 0, 0, 1, 0, 0, 0, 0, 1], [0, 1, 3]]))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DegenerateShape { shape: "Trimesh", .. }));
    }

    #[test]
    fn heightfield_reads_options() {
        let desc = ShapeDesc::parse(
            "Heightfield",
            &json!([[[0, 1], [2, 3]], { "elementSize": 0.5, "maxValue": 2.5 }]),
        )
        .unwrap();
        assert_eq!(
            desc,
            ShapeDesc::Heightfield {
                data: vec![vec![0.0, 1.0], vec![2.0, 3.0]],
                element_size: 0.5,
                min_value: None,
                max_value: Some(2.5),
            }
        );
    }

    #[test]
    fn wrong_argument_types_are_invalid() {
        let err = ShapeDesc::parse("Box", &json!("big")).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidShapeArgs { shape: "Box", .. }));
    }

    #[test]
    fn sphere_needs_exactly_one_radius() {
        for args in [json!([]), json!([1, 2])] {
            let err = ShapeDesc::parse("Sphere", &args).unwrap_err();
            assert!(
                matches!(err, ProtocolError::InvalidShapeArgs { shape: "Sphere", .. }),
                "{args}"
            );
        }
    }

    #[test]
    fn cylinder_arguments_must_be_finite() {
        // 1e39 overflows f32 to infinity.
        let err = ShapeDesc::parse("Cylinder", &json!([1e39, 1, 1])).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidShapeArgs { shape: "Cylinder", .. }));
        let err = ShapeDesc::parse("Cylinder", &json!([1, 1, 1, 8, 2])).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidShapeArgs { shape: "Cylinder", .. }));
    }
}
