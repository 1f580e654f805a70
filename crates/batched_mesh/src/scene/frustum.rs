//! Frustum planes extracted from projection matrices

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::geometry::{Aabb, BoundingSphere};

/// Clip-space depth convention of a projection matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// OpenGL/WebGL style depth in `[-1, 1]`
    #[default]
    WebGl,
    /// WebGPU/Vulkan style depth in `[0, 1]`
    WebGpu,
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Plane from `ax + by + cz + d = 0` coefficients, normalized
    pub fn from_coefficients(coefficients: &Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.norm();
        if length <= f32::EPSILON {
            return Self { normal, distance: coefficients.w };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Frustum for visibility culling
///
/// Planes point inward and are ordered right, left, bottom, top, far, near.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six inward-facing planes
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub const fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a (model-)view-projection matrix
    ///
    /// This uses the Gribb-Hartmann method: every plane is a sum or
    /// difference of the matrix's fourth row with one of the others. The near
    /// plane depends on the clip-space depth range, and reversed depth swaps
    /// the roles of near and far.
    pub fn from_projection_matrix(
        matrix: &Mat4,
        coordinate_system: CoordinateSystem,
        reversed_depth: bool,
    ) -> Self {
        let row = |r: usize| Vec4::new(matrix[(r, 0)], matrix[(r, 1)], matrix[(r, 2)], matrix[(r, 3)]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let (far, near) = if reversed_depth {
            (r2, r3 - r2)
        } else {
            let near = match coordinate_system {
                CoordinateSystem::WebGl => r3 + r2,
                CoordinateSystem::WebGpu => r2,
            };
            (r3 - r2, near)
        };

        Self {
            planes: [
                Plane::from_coefficients(&(r3 - r0)),
                Plane::from_coefficients(&(r3 + r0)),
                Plane::from_coefficients(&(r3 + r1)),
                Plane::from_coefficients(&(r3 - r1)),
                Plane::from_coefficients(&far),
                Plane::from_coefficients(&near),
            ],
        }
    }

    /// Whether a sphere is inside or touches the frustum
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        if sphere.is_empty() {
            return false;
        }
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(&sphere.center) >= -sphere.radius)
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        for plane in &self.planes {
            // Corner furthest along the plane normal
            let mut p = aabb.min;
            if plane.normal.x >= 0.0 { p.x = aabb.max.x; }
            if plane.normal.y >= 0.0 { p.y = aabb.max.y; }
            if plane.normal.z >= 0.0 { p.z = aabb.max.z; }

            if plane.distance_to_point(&p) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Whether a point is inside the frustum
    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }
}
