//! Local transform of a scene node

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, rotation and scale relative to the node's parent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation in parent space
    pub position: Vec3,
    /// Euler angles in degrees, applied as intrinsic XYZ
    pub rotation: Vec3,
    /// Per-axis scale
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transform with just a position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform from all three components
    pub fn from_parts(position: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Set a uniform scale
    #[must_use]
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Set the rotation in degrees
    #[must_use]
    pub fn with_rotation(mut self, degrees: Vec3) -> Self {
        self.rotation = degrees;
        self
    }

    /// Orientation built from the Euler angles
    ///
    /// Composed as `Rz * Ry * Rx`: the X angle is applied first, each about
    /// the parent's fixed axes.
    pub fn orientation(&self) -> Quat {
        let radians = Vec3::new(
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        Quat::from_euler(EulerRot::ZYX, radians.z, radians.y, radians.x)
    }

    /// `T * R * S`
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation(), self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matrix() {
        assert_eq!(Transform::new().matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_matrix_is_translate_rotate_scale() {
        let transform = Transform::from_parts(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(0.0, 90.0, 0.0),
            Vec3::splat(2.0),
        );

        let expected = Mat4::from_translation(transform.position)
            * Mat4::from_rotation_y(90.0_f32.to_radians())
            * Mat4::from_scale(Vec3::splat(2.0));

        assert!(transform.matrix().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_euler_angles_apply_x_then_y_then_z() {
        let transform = Transform::new().with_rotation(Vec3::new(30.0, 45.0, 60.0));
        let expected = Quat::from_rotation_z(60.0_f32.to_radians())
            * Quat::from_rotation_y(45.0_f32.to_radians())
            * Quat::from_rotation_x(30.0_f32.to_radians());
        assert!(transform.orientation().abs_diff_eq(expected, 1e-5));

        // X about the fixed X axis leaves X alone, then Y turns it to -Z
        let turned = Transform::new().with_rotation(Vec3::new(90.0, 90.0, 0.0));
        let rotated = turned.matrix().transform_vector3(Vec3::X);
        assert!(rotated.abs_diff_eq(Vec3::NEG_Z, 1e-5));
    }

    #[test]
    fn test_rotation_is_in_degrees() {
        let transform = Transform::new().with_rotation(Vec3::new(0.0, 0.0, 90.0));
        let rotated = transform.matrix().transform_vector3(Vec3::X);

        assert!(rotated.abs_diff_eq(Vec3::Y, 1e-5));
    }
}
