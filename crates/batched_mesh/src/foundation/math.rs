//! Math utilities and types
//!
//! Provides the vector/matrix aliases used by the batch, plus the handful of
//! matrix helpers culling and sorting lean on.

pub use nalgebra::{
    Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type (column-major storage)
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Number of floats in a packed 4x4 matrix
pub const MAT4_FLOATS: usize = 16;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Builder-style uniform scale
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::new(scale, scale, scale);
        self
    }

    /// Convert to a transformation matrix (translation * rotation * scale)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create a rotation matrix around the Y axis
    fn rotation_y(angle: f32) -> Mat4;

    /// Rebuild a matrix from 16 column-major floats
    ///
    /// Returns `None` when the slice is shorter than 16 elements.
    fn from_packed(data: &[f32]) -> Option<Mat4>;

    /// Largest scale factor along any of the three basis axes
    ///
    /// Used to grow bounding-sphere radii under non-uniform scale.
    fn max_scale_on_axis(&self) -> f32;

    /// Translation column as a vector
    fn translation_part(&self) -> Vec3;

    /// Transform a point (w = 1, with perspective divide)
    fn transform_point3(&self, point: &Vec3) -> Vec3;

    /// Transform a direction (w = 0) and normalize the result
    fn transform_direction(&self, direction: &Vec3) -> Vec3;

    /// Inverse of the matrix, or identity when it is singular
    fn inverse_or_identity(&self) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn rotation_y(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::y_axis(), angle)
    }

    fn from_packed(data: &[f32]) -> Option<Mat4> {
        (data.len() >= MAT4_FLOATS).then(|| Mat4::from_column_slice(&data[..MAT4_FLOATS]))
    }

    fn max_scale_on_axis(&self) -> f32 {
        let sx = Vec3::new(self[(0, 0)], self[(1, 0)], self[(2, 0)]).norm_squared();
        let sy = Vec3::new(self[(0, 1)], self[(1, 1)], self[(2, 1)]).norm_squared();
        let sz = Vec3::new(self[(0, 2)], self[(1, 2)], self[(2, 2)]).norm_squared();
        sx.max(sy).max(sz).sqrt()
    }

    fn translation_part(&self) -> Vec3 {
        Vec3::new(self[(0, 3)], self[(1, 3)], self[(2, 3)])
    }

    fn transform_point3(&self, point: &Vec3) -> Vec3 {
        self.transform_point(&Point3::from(*point)).coords
    }

    fn transform_direction(&self, direction: &Vec3) -> Vec3 {
        let transformed = self.transform_vector(direction);
        transformed.try_normalize(f32::EPSILON).unwrap_or(transformed)
    }

    fn inverse_or_identity(&self) -> Mat4 {
        self.try_inverse().unwrap_or_else(Mat4::identity)
    }
}
