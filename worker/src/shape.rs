//! Shape descriptions -> engine collision shapes.
//!
//! Conventions
//! - Units are meters. Shapes are built in the body's local frame.
//! - Plane: infinite half-space with outward normal local +Y.
//! - Cylinder: Y-aligned and centered. Equal radii use the native cylinder, a zero top radius
//!   the native cone, anything else the convex hull of two sampled rings.
//! - Heightfield: `data[i][j]` sits at `x = i * element_size`, `z = j * element_size`, so the
//!   field extends from the local origin towards +X/+Z. The engine's heightfield is centered,
//!   which is compensated by the returned local offset.

use rapier3d::na::DMatrix;
use rapier3d::prelude::*;
use shared::constants::PARTICLE_RADIUS;
use shared::{ProtocolError, ShapeDesc};
use std::f32::consts::TAU;

/// A built shape plus the offset it needs relative to where the caller placed it.
pub struct BuiltShape {
    pub shape: SharedShape,
    pub offset: Isometry<f32>,
}

impl BuiltShape {
    fn centered(shape: SharedShape) -> Self {
        Self {
            shape,
            offset: Isometry::identity(),
        }
    }
}

fn degenerate(shape: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::DegenerateShape {
        shape,
        reason: reason.into(),
    }
}

/// Build the engine shape for a validated description.
pub fn build_shape(desc: &ShapeDesc) -> Result<BuiltShape, ProtocolError> {
    let name = desc.shape_type().as_str();
    let built = match desc {
        ShapeDesc::Box { half_extents } => BuiltShape::centered(SharedShape::cuboid(
            half_extents[0],
            half_extents[1],
            half_extents[2],
        )),

        ShapeDesc::Sphere { radius } => BuiltShape::centered(SharedShape::ball(*radius)),

        ShapeDesc::Particle => BuiltShape::centered(SharedShape::ball(PARTICLE_RADIUS)),

        ShapeDesc::Plane => {
            // Rapier's half-space expects a `UnitVector<Real>`; +Y is already unit length.
            let halfspace = HalfSpace::new(Vector::y_axis());
            BuiltShape::centered(SharedShape::new(halfspace))
        }

        ShapeDesc::Cylinder {
            radius_top,
            radius_bottom,
            height,
            segments,
        } => {
            let half_height = height * 0.5;
            let shape = if (radius_top - radius_bottom).abs() <= f32::EPSILON {
                SharedShape::cylinder(half_height, *radius_bottom)
            } else if *radius_top == 0.0 {
                SharedShape::cone(half_height, *radius_bottom)
            } else {
                let points = tapered_rings(*radius_top, *radius_bottom, half_height, *segments);
                SharedShape::convex_hull(&points)
                    .ok_or_else(|| degenerate(name, "tapered cylinder hull failed"))?
            };
            BuiltShape::centered(shape)
        }

        ShapeDesc::ConvexPolyhedron {
            vertices, faces, ..
        } => {
            let points: Vec<Point<f32>> =
                vertices.iter().map(|v| point![v[0], v[1], v[2]]).collect();
            let triangles = fan_triangulate(faces);
            // Faces describe a convex mesh directly when they are consistent; otherwise
            // fall back to hulling the vertex cloud.
            let mesh = if triangles.is_empty() {
                None
            } else {
                SharedShape::convex_mesh(points.clone(), &triangles)
            };
            let shape = match mesh {
                Some(shape) => shape,
                None => SharedShape::convex_hull(&points)
                    .ok_or_else(|| degenerate(name, "vertices do not span a volume"))?,
            };
            BuiltShape::centered(shape)
        }

        ShapeDesc::Trimesh { vertices, indices } => {
            let points = vertices
                .chunks_exact(3)
                .map(|c| point![c[0], c[1], c[2]])
                .collect();
            let triangles = indices
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect();
            let shape = SharedShape::trimesh(points, triangles)
                .map_err(|e| degenerate(name, format!("{e:?}")))?;
            BuiltShape::centered(shape)
        }

        ShapeDesc::Heightfield {
            data,
            element_size,
            min_value,
            max_value,
        } => {
            let columns = data.len();
            let rows = data.first().map_or(0, Vec::len);
            let clamp = |h: f32| {
                let h = min_value.map_or(h, |min| h.max(min));
                max_value.map_or(h, |max| h.min(max))
            };
            // Engine rows run along Z and columns along X.
            let heights = DMatrix::from_fn(rows, columns, |z, x| clamp(data[x][z]));
            let width = element_size * (columns - 1) as f32;
            let depth = element_size * (rows - 1) as f32;
            BuiltShape {
                shape: SharedShape::heightfield(heights, vector![width, 1.0, depth]),
                offset: Isometry::translation(width * 0.5, 0.0, depth * 0.5),
            }
        }
    };
    Ok(built)
}

/// Points of the top and bottom rings of a tapered cylinder.
fn tapered_rings(
    radius_top: f32,
    radius_bottom: f32,
    half_height: f32,
    segments: u32,
) -> Vec<Point<f32>> {
    let segments = segments.max(3);
    let mut points = Vec::with_capacity(segments as usize * 2);
    for i in 0..segments {
        let theta = TAU * i as f32 / segments as f32;
        let (sin, cos) = theta.sin_cos();
        if radius_top > 0.0 {
            points.push(point![radius_top * cos, half_height, radius_top * sin]);
        }
        if radius_bottom > 0.0 {
            points.push(point![radius_bottom * cos, -half_height, radius_bottom * sin]);
        }
    }
    // A zero-radius ring collapses to its apex.
    if radius_top == 0.0 {
        points.push(point![0.0, half_height, 0.0]);
    }
    if radius_bottom == 0.0 {
        points.push(point![0.0, -half_height, 0.0]);
    }
    points
}

/// Splits polygonal faces into triangles sharing each face's first vertex.
fn fan_triangulate(faces: &[Vec<u32>]) -> Vec<[u32; 3]> {
    faces
        .iter()
        .filter(|face| face.len() >= 3)
        .flat_map(|face| (1..face.len() - 1).map(move |k| [face[0], face[k], face[k + 1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(tag: &str, args: serde_json::Value) -> BuiltShape {
        build_shape(&ShapeDesc::parse(tag, &args).unwrap()).unwrap()
    }

    #[test]
    fn box_uses_half_extents() {
        let built = build("Box", json!([2.0, 4.0, 6.0]));
        let cuboid = built.shape.as_cuboid().unwrap();
        assert!((cuboid.half_extents - vector![1.0, 2.0, 3.0]).norm() < 1.0e-6);
    }

    #[test]
    fn plane_normal_is_local_up() {
        let built = build("Plane", serde_json::Value::Null);
        let halfspace = built.shape.as_halfspace().unwrap();
        assert!((halfspace.normal.into_inner() - Vector::y()).norm() < 1.0e-6);
    }

    #[test]
    fn cylinder_variants() {
        assert!(build("Cylinder", json!([1.0, 1.0, 2.0])).shape.as_cylinder().is_some());
        assert!(build("Cylinder", json!([0.0, 1.0, 2.0])).shape.as_cone().is_some());
        let tapered = build("Cylinder", json!([0.5, 1.0, 2.0, 12]));
        assert!(tapered.shape.as_convex_polyhedron().is_some());
    }

    #[test]
    fn fan_triangulation_of_a_quad() {
        assert_eq!(
            fan_triangulate(&[vec![0, 1, 2, 3], vec![4, 5]]),
            vec![[0, 1, 2], [0, 2, 3]]
        );
    }

    #[test]
    fn convex_polyhedron_from_tetrahedron() {
        let built = build(
            "ConvexPolyhedron",
            json!([
                [[0, 0, 0], [1, 0, 0], [0, 1, 0], [0, 0, 1]],
                [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]]
            ]),
        );
        assert!(built.shape.as_convex_polyhedron().is_some());
    }

    #[test]
    fn heightfield_extends_towards_positive_x_and_z() {
        let built = build(
            "Heightfield",
            json!([[[0, 0, 0], [0, 5, 0], [0, 0, 0]], { "elementSize": 2.0, "maxValue": 1.0 }]),
        );
        let field = built.shape.as_heightfield().unwrap();
        assert_eq!(field.heights().nrows(), 3);
        assert_eq!(field.heights().ncols(), 3);
        // Clamped to maxValue.
        assert!((field.heights()[(1, 1)] - 1.0).abs() < 1.0e-6);
        assert!((built.offset.translation.vector - vector![2.0, 0.0, 2.0]).norm() < 1.0e-6);
    }

    #[test]
    fn trimesh_builds() {
        let built = build("Trimesh", json!([[0, 0, 0, 1, 0, 0, 0, 0, 1], [0, 1, 2]]));
        assert_eq!(built.shape.as_trimesh().unwrap().indices().len(), 1);
    }
}
