//! Ray queries against batched geometry
//!
//! The batch narrows each instance to its geometry's draw range and bounds,
//! then hands a borrowed [`GeometryView`] to a [`RayIntersector`]. The
//! default [`TriangleIntersector`] rejects by bounding sphere and box before
//! testing triangles with Möller-Trumbore.

use crate::batch::InstanceId;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::geometry::{Aabb, AttributeArray, BoundingSphere, IndexArray};
use crate::render::{Material, Side};

/// A ray for ray casting and picking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin point of the ray
    pub origin: Vec3,
    /// The direction of the ray (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray under `matrix`, direction renormalized
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            origin: matrix.transform_point3(&self.origin),
            direction: matrix.transform_direction(&self.direction),
        }
    }
}

/// Result of a ray intersection test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// The distance from the ray origin to the hit point (world space)
    pub distance: f32,
    /// The point of intersection in world space
    pub point: Vec3,
    /// Triangle index relative to the start of the draw range
    pub face_index: Option<usize>,
    /// Instance that was hit, filled in by the batch
    pub instance_id: Option<InstanceId>,
    /// Batch that produced the hit, filled in by the batch
    pub batch_id: Option<u32>,
}

/// Borrowed view of one geometry's slice of the shared arena
///
/// Lives only for the duration of one intersector call.
#[derive(Debug, Clone, Copy)]
pub struct GeometryView<'a> {
    /// Shared position array
    pub positions: &'a AttributeArray,
    /// Components per position
    pub position_item_size: usize,
    /// Whether positions are normalized integers
    pub position_normalized: bool,
    /// Shared index array when the batch is indexed
    pub index: Option<&'a IndexArray>,
    /// First element (index or vertex) of the geometry
    pub draw_start: usize,
    /// Number of elements to draw
    pub draw_count: usize,
    /// Local-space bounding box
    pub bounding_box: Aabb,
    /// Local-space bounding sphere
    pub bounding_sphere: BoundingSphere,
}

impl GeometryView<'_> {
    /// Position of absolute vertex `vertex`
    pub fn vertex(&self, vertex: usize) -> Vec3 {
        let base = vertex * self.position_item_size;
        let component = |c: usize| {
            if c < self.position_item_size {
                self.positions.get_f32(base + c, self.position_normalized)
            } else {
                0.0
            }
        };
        Vec3::new(component(0), component(1), component(2))
    }

    /// Absolute vertex referenced by draw element `element`
    pub fn element_vertex(&self, element: usize) -> Option<usize> {
        match self.index {
            Some(index) => index.get(element).map(|v| v as usize),
            None => Some(element),
        }
    }

    /// Corners of triangle `triangle`, counted from the draw start
    pub fn triangle(&self, triangle: usize) -> Option<[Vec3; 3]> {
        let first = self.draw_start + triangle * 3;
        if triangle * 3 + 3 > self.draw_count {
            return None;
        }
        Some([
            self.vertex(self.element_vertex(first)?),
            self.vertex(self.element_vertex(first + 1)?),
            self.vertex(self.element_vertex(first + 2)?),
        ])
    }

    /// Number of whole triangles in the draw range
    pub const fn triangle_count(&self) -> usize {
        self.draw_count / 3
    }
}

/// Per-geometry ray test plugged into [`BatchedMesh::raycast`](crate::batch::BatchedMesh::raycast)
pub trait RayIntersector {
    /// Append hits of `ray` (world space) against `geometry` placed at `world_matrix`
    fn intersect(
        &self,
        ray: &Ray,
        geometry: &GeometryView<'_>,
        world_matrix: &Mat4,
        material: &Material,
        hits: &mut Vec<Intersection>,
    );
}

/// Triangle-mesh intersector with bounding-volume early outs
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleIntersector;

impl TriangleIntersector {
    /// Möller-Trumbore ray-triangle intersection algorithm
    /// Returns the distance along the ray if hit, None otherwise
    ///
    /// Counter-clockwise triangles (seen from the ray origin) are front faces.
    pub fn intersect_triangle(ray: &Ray, [v0, v1, v2]: [Vec3; 3], side: Side) -> Option<f32> {
        const EPSILON: f32 = 0.000_001;

        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = ray.direction.cross(&edge2);
        let a = edge1.dot(&h);

        let facing_ok = match side {
            Side::Front => a > EPSILON,
            Side::Back => a < -EPSILON,
            Side::Double => a.abs() > EPSILON,
        };
        if !facing_ok {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - v0;
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * ray.direction.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(&q);
        (t >= 0.0).then_some(t)
    }
}

impl RayIntersector for TriangleIntersector {
    fn intersect(
        &self,
        ray: &Ray,
        geometry: &GeometryView<'_>,
        world_matrix: &Mat4,
        material: &Material,
        hits: &mut Vec<Intersection>,
    ) {
        let world_sphere = geometry.bounding_sphere.transformed(world_matrix);
        if world_sphere.intersect_ray(&ray.origin, &ray.direction).is_none() {
            return;
        }

        let Some(inverse) = world_matrix.try_inverse() else {
            return;
        };
        let local_ray = ray.transformed(&inverse);
        if geometry.bounding_box.intersect_ray(&local_ray.origin, &local_ray.direction).is_none() {
            return;
        }

        for triangle in 0..geometry.triangle_count() {
            let Some(corners) = geometry.triangle(triangle) else {
                break;
            };
            let Some(t) = Self::intersect_triangle(&local_ray, corners, material.side) else {
                continue;
            };
            let point = world_matrix.transform_point3(&local_ray.point_at(t));
            hits.push(Intersection {
                distance: (point - ray.origin).norm(),
                point,
                face_index: Some(triangle),
                instance_id: None,
                batch_id: None,
            });
        }
    }
}
