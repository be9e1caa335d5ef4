//! Orientation helpers for the wire formats.
//!
//! On the wire an orientation is either a quaternion `[x, y, z, w]` or an Euler triple
//! `[x, y, z]` in radians applied in `XYZ` order (the scene-graph convention: the matrix is
//! `Rx * Ry * Rz`). The quaternion is authoritative; Euler input is converted on arrival.
//!
//! ```text
//! Identity ([0, 0, 0, 1]):
//!   local +Y aligned with world +Y (up)
//!   local -Z aligned with world -Z (forward)
//! ```

use nalgebra::{Quaternion, Rotation3, UnitQuaternion, Vector3};

/// Wire vector `[x, y, z]`.
pub type Vec3 = [f32; 3];

/// Wire quaternion `[x, y, z, w]`.
pub type Quat = [f32; 4];

pub const IDENTITY_QUAT: Quat = [0.0, 0.0, 0.0, 1.0];

/// Above this |m13| the decomposition is treated as gimbal locked.
const GIMBAL_EPS: f32 = 0.999_99;

/// Converts a wire quaternion, normalizing it.
///
/// A zero quaternion has no orientation and maps to identity.
pub fn quat_from_array(q: Quat) -> UnitQuaternion<f32> {
    // nalgebra: Quaternion::new(w, i, j, k)
    let raw = Quaternion::new(q[3], q[0], q[1], q[2]);
    if raw.norm_squared() <= f32::EPSILON {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::from_quaternion(raw)
}

pub fn quat_to_array(q: &UnitQuaternion<f32>) -> Quat {
    let q = q.quaternion();
    [q.i, q.j, q.k, q.w]
}

/// Builds the rotation `Rx(e.x) * Ry(e.y) * Rz(e.z)`.
pub fn quat_from_euler_xyz(e: Vec3) -> UnitQuaternion<f32> {
    let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), e[0]);
    let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), e[1]);
    let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), e[2]);
    rx * ry * rz
}

/// Decomposes a rotation back into an `XYZ` Euler triple.
///
/// Near gimbal lock (`|y| == pi/2`) the `z` angle is folded into `x` and reported as zero.
pub fn euler_xyz_from_quat(q: &UnitQuaternion<f32>) -> Vec3 {
    let m: Rotation3<f32> = q.to_rotation_matrix();
    let m = m.matrix();
    let m13 = m[(0, 2)];

    let y = m13.clamp(-1.0, 1.0).asin();
    if m13.abs() < GIMBAL_EPS {
        let x = (-m[(1, 2)]).atan2(m[(2, 2)]);
        let z = (-m[(0, 1)]).atan2(m[(0, 0)]);
        [x, y, z]
    } else {
        let x = m[(2, 1)].atan2(m[(1, 1)]);
        [x, y, 0.0]
    }
}

/// Resolves the orientation of a body or shape from optional wire inputs.
///
/// Precedence: explicit quaternion, then Euler rotation, then identity.
pub fn resolve_orientation(
    quaternion: Option<Quat>,
    rotation: Option<Vec3>,
) -> UnitQuaternion<f32> {
    match (quaternion, rotation) {
        (Some(q), _) => quat_from_array(q),
        (None, Some(e)) => quat_from_euler_xyz(e),
        (None, None) => UnitQuaternion::identity(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn assert_close(a: &[f32], b: &[f32], eps: f32) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < eps, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn euler_round_trips_away_from_gimbal_lock() {
        let angles = [[0.3, -0.7, 1.1], [-1.2, 0.4, -2.9], [0.0, 0.0, 0.0], [2.0, 1.2, 0.1]];
        for e in angles {
            let q = quat_from_euler_xyz(e);
            assert_close(&euler_xyz_from_quat(&q), &e, 1.0e-4);
        }
    }

    #[test]
    fn euler_order_matches_xyz_composition() {
        // Ry(90) takes +Z to +X, which Rx then leaves alone.
        let q = quat_from_euler_xyz([FRAC_PI_2, FRAC_PI_2, 0.0]);
        let v = q * Vector3::z();
        assert_close(v.as_slice(), &[1.0, 0.0, 0.0], 1.0e-5);
    }

    #[test]
    fn gimbal_lock_reports_zero_z() {
        let q = quat_from_euler_xyz([0.5, FRAC_PI_2, 0.0]);
        let e = euler_xyz_from_quat(&q);
        assert!((e[1] - FRAC_PI_2).abs() < 1.0e-3);
        assert_eq!(e[2], 0.0);
        let back = quat_from_euler_xyz(e);
        assert!(back.angle_to(&q) < 1.0e-3);
    }

    #[test]
    fn wire_quaternion_is_xyzw_and_normalized() {
        let q = quat_from_array([0.0, 0.0, 0.0, 2.0]);
        assert_close(&quat_to_array(&q), &IDENTITY_QUAT, 1.0e-6);

        let half = std::f32::consts::FRAC_1_SQRT_2;
        let q = quat_from_array([0.0, half, 0.0, half]);
        assert!((q.angle() - FRAC_PI_2).abs() < 1.0e-5);
        assert_close(&quat_to_array(&q), &[0.0, half, 0.0, half], 1.0e-6);
    }

    #[test]
    fn zero_quaternion_is_identity() {
        assert_eq!(quat_from_array([0.0; 4]), UnitQuaternion::identity());
    }

    #[test]
    fn quaternion_wins_over_euler() {
        let q = resolve_orientation(Some([0.0, 0.0, 0.0, 1.0]), Some([1.0, 0.0, 0.0]));
        assert_eq!(q, UnitQuaternion::identity());
        let e = resolve_orientation(None, Some([1.0, 0.0, 0.0]));
        assert!((e.angle() - 1.0).abs() < 1.0e-5);
        assert_eq!(resolve_orientation(None, None), UnitQuaternion::identity());
    }
}
