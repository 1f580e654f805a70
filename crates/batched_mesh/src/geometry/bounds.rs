//! Bounding volumes
//!
//! Both volumes have an explicit "empty" state so unions can start from
//! nothing: an empty box has `min > max`, an empty sphere has a negative
//! radius.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box containing nothing; the identity for [`union`](Self::union)
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box containing every point
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut aabb = Self::empty();
        for point in points {
            aabb.expand_by_point(&point);
        }
        aabb
    }

    /// Whether the box contains nothing
    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Grow to include `point`
    pub fn expand_by_point(&mut self, point: &Vec3) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Grow to include `other`
    pub fn union(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Box around the eight transformed corners
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        Self::from_points(corners.iter().map(|corner| matrix.transform_point3(corner)))
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: &Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Test ray intersection with this AABB using slab method
    /// Returns the distance to the entry point if the ray intersects, None otherwise
    pub fn intersect_ray(&self, ray_origin: &Vec3, ray_dir: &Vec3) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let inv_dir = Vec3::new(
            if ray_dir.x != 0.0 { 1.0 / ray_dir.x } else { f32::INFINITY },
            if ray_dir.y != 0.0 { 1.0 / ray_dir.y } else { f32::INFINITY },
            if ray_dir.z != 0.0 { 1.0 / ray_dir.z } else { f32::INFINITY },
        );

        let t1 = (self.min.x - ray_origin.x) * inv_dir.x;
        let t2 = (self.max.x - ray_origin.x) * inv_dir.x;
        let t3 = (self.min.y - ray_origin.y) * inv_dir.y;
        let t4 = (self.max.y - ray_origin.y) * inv_dir.y;
        let t5 = (self.min.z - ray_origin.z) * inv_dir.z;
        let t6 = (self.max.z - ray_origin.z) * inv_dir.z;

        let tmin = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
        let tmax = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

        // Ray intersects if tmax >= tmin and tmax >= 0
        if tmax >= tmin && tmax >= 0.0 {
            Some(tmin.max(0.0))
        } else {
            None
        }
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// The center of the sphere
    pub center: Vec3,
    /// The radius of the sphere; negative when empty
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingSphere {
    /// Creates a new bounding sphere with the given center and radius
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere containing nothing; the identity for [`union`](Self::union)
    pub fn empty() -> Self {
        Self {
            center: Vec3::zeros(),
            radius: -1.0,
        }
    }

    /// Whether the sphere contains nothing
    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    /// Sphere centered on the box center that reaches every point
    pub fn from_points_around_box<I: IntoIterator<Item = Vec3>>(aabb: &Aabb, points: I) -> Self {
        if aabb.is_empty() {
            return Self::empty();
        }
        let center = aabb.center();
        let max_distance_sq = points
            .into_iter()
            .map(|point| (point - center).norm_squared())
            .fold(0.0_f32, f32::max);
        Self::new(center, max_distance_sq.sqrt())
    }

    /// Sphere under `matrix`: transformed center, radius scaled by the largest axis scale
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self {
            center: matrix.transform_point3(&self.center),
            radius: self.radius * matrix.max_scale_on_axis(),
        }
    }

    /// Grow the minimum amount needed to include `point`
    pub fn expand_by_point(&mut self, point: &Vec3) {
        if self.is_empty() {
            self.center = *point;
            self.radius = 0.0;
            return;
        }
        let delta = point - self.center;
        let length_sq = delta.norm_squared();
        if length_sq > self.radius * self.radius {
            let length = length_sq.sqrt();
            let half_way = (length - self.radius) * 0.5;
            self.center += delta * (half_way / length);
            self.radius += half_way;
        }
    }

    /// Grow to include `other`
    pub fn union(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        if self.center == other.center {
            self.radius = self.radius.max(other.radius);
            return;
        }
        let offset = (other.center - self.center).normalize() * other.radius;
        self.expand_by_point(&(other.center + offset));
        self.expand_by_point(&(other.center - offset));
    }

    /// Whether `point` lies inside or on the sphere
    pub fn contains_point(&self, point: &Vec3) -> bool {
        (point - self.center).norm_squared() <= self.radius * self.radius
    }

    /// Test ray intersection with this sphere
    /// Returns the distance to the nearest hit in front of the origin
    pub fn intersect_ray(&self, ray_origin: &Vec3, ray_dir: &Vec3) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        // Vector from ray origin to sphere center
        let oc = ray_origin - self.center;

        // Solve: |origin + t*direction - center|^2 = radius^2
        let a = ray_dir.dot(ray_dir);
        let b = 2.0 * oc.dot(ray_dir);
        let c = oc.dot(&oc) - self.radius * self.radius;

        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return None;
        }

        let sqrt_discriminant = discriminant.sqrt();
        let t1 = (-b - sqrt_discriminant) / (2.0 * a);
        let t2 = (-b + sqrt_discriminant) / (2.0 * a);

        if t1 >= 0.0 {
            Some(t1)
        } else if t2 >= 0.0 {
            Some(t2)
        } else {
            None
        }
    }
}
