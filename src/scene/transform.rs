//! Decomposed object transforms

use glam::{Mat3, Mat4, Quat, Vec3};

/// Scale, rotation and position, applied in that order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Default::default()
        }
    }

    /// Decompose an affine matrix. Shear is lost.
    pub fn from_matrix(m: &Mat4) -> Self {
        let (scale, rotation, position) = m.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Get the model matrix for this transform
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Get the normal matrix (inverse transpose of the upper 3x3)
    pub fn normal_matrix(&self) -> Mat3 {
        normal_matrix(&self.to_mat4())
    }

    /// Get forward direction (local -Z in world space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Get up direction (local +Y in world space)
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Rotate around an axis
    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32) {
        let delta = Quat::from_axis_angle(axis, angle);
        self.rotation = delta * self.rotation;
    }

    /// Look at a target position
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize();
        let right = up.cross(forward).normalize();
        let up = forward.cross(right);

        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward));
    }
}

impl From<Transform> for Mat4 {
    fn from(t: Transform) -> Self {
        t.to_mat4()
    }
}

impl From<&Transform> for Mat4 {
    fn from(t: &Transform) -> Self {
        t.to_mat4()
    }
}

/// Inverse transpose of the upper 3x3 of `m`. Singular matrices yield the plain 3x3.
pub fn normal_matrix(m: &Mat4) -> Mat3 {
    let upper = Mat3::from_mat4(*m);
    if upper.determinant().abs() <= f32::EPSILON {
        upper
    } else {
        upper.inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_round_trip() {
        let t = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.5),
            scale: Vec3::splat(2.0),
        };
        let back = Transform::from_matrix(&t.to_mat4());
        assert!(back.position.abs_diff_eq(t.position, 1e-5));
        assert!(back.scale.abs_diff_eq(t.scale, 1e-5));
        assert!(back.rotation.abs_diff_eq(t.rotation, 1e-5));
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let t = Transform::from_position_scale(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let n = t.normal_matrix();
        assert!((n.x_axis.x - 0.5).abs() < 1e-6);
        assert!((n.y_axis.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_forward_is_negative_z() {
        assert_eq!(Transform::new().forward(), -Vec3::Z);
        assert_eq!(Mat4::from(Transform::new()), Mat4::IDENTITY);
    }
}
