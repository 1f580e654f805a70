//! # Camera Views
//!
//! The batch only needs three things from a camera: a projection matrix, the
//! inverse of its world matrix and the clip-space depth convention. Array
//! cameras (stereo rigs, multi-view) carry one view per eye plus a rig view
//! used as the sorting reference.

use crate::foundation::math::{utils, Mat4, Mat4Ext, Point3, Vec3};
use super::{CoordinateSystem, Frustum};

/// Single view: projection, inverse world matrix and depth convention
#[derive(Debug, Clone, PartialEq)]
pub struct CameraView {
    /// Projection matrix
    pub projection: Mat4,

    /// Inverse of the camera's world matrix (the view matrix)
    pub world_inverse: Mat4,

    /// Clip-space depth range of `projection`
    pub coordinate_system: CoordinateSystem,

    /// Whether `projection` maps near to 1 and far to 0
    pub reversed_depth: bool,
}

impl CameraView {
    /// Create a view from raw matrices with WebGL conventions
    pub const fn new(projection: Mat4, world_inverse: Mat4) -> Self {
        Self {
            projection,
            world_inverse,
            coordinate_system: CoordinateSystem::WebGl,
            reversed_depth: false,
        }
    }

    /// Create a perspective view looking from `eye` towards `target`
    ///
    /// # Arguments
    /// * `eye` - Camera position in world space
    /// * `target` - Point the camera is looking at
    /// * `up` - Up vector (typically +Y)
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height)
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(eye: Vec3, target: Vec3, up: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let projection = Mat4::new_perspective(aspect, utils::deg_to_rad(fov_degrees), near, far);
        let world_inverse = Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up);
        log::trace!("Perspective view at {:?} looking at {:?}", eye, target);
        Self::new(projection, world_inverse)
    }

    /// Switch the depth convention, remapping the projection's depth row
    ///
    /// Views built by [`perspective`](Self::perspective) use WebGL depth.
    pub fn with_coordinate_system(mut self, coordinate_system: CoordinateSystem) -> Self {
        if self.coordinate_system != coordinate_system {
            let remap = match coordinate_system {
                // [-1, 1] -> [0, 1]
                CoordinateSystem::WebGpu => Mat4::new(
                    1.0, 0.0, 0.0, 0.0,
                    0.0, 1.0, 0.0, 0.0,
                    0.0, 0.0, 0.5, 0.5,
                    0.0, 0.0, 0.0, 1.0,
                ),
                // [0, 1] -> [-1, 1]
                CoordinateSystem::WebGl => Mat4::new(
                    1.0, 0.0, 0.0, 0.0,
                    0.0, 1.0, 0.0, 0.0,
                    0.0, 0.0, 2.0, -1.0,
                    0.0, 0.0, 0.0, 1.0,
                ),
            };
            self.projection = remap * self.projection;
            self.coordinate_system = coordinate_system;
        }
        self
    }

    /// Mark the projection as using reversed depth
    ///
    /// The matrix itself is left untouched; callers supply a reversed projection.
    pub const fn with_reversed_depth(mut self, reversed_depth: bool) -> Self {
        self.reversed_depth = reversed_depth;
        self
    }

    /// Camera world matrix
    pub fn world_matrix(&self) -> Mat4 {
        self.world_inverse.inverse_or_identity()
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        self.world_matrix().translation_part()
    }

    /// Viewing direction in world space
    pub fn forward(&self) -> Vec3 {
        self.world_matrix().transform_direction(&Vec3::new(0.0, 0.0, -1.0))
    }

    /// Projection times view
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.world_inverse
    }

    /// Frustum expressed in the local space of an object with world matrix `object_world`
    pub fn frustum_for(&self, object_world: &Mat4) -> Frustum {
        Frustum::from_projection_matrix(
            &(self.view_projection() * object_world),
            self.coordinate_system,
            self.reversed_depth,
        )
    }
}

/// Camera the batch is prepared for
#[derive(Debug, Clone, PartialEq)]
pub enum Camera {
    /// Ordinary single-view camera
    Single(CameraView),
    /// Multi-view camera: visible in any view means visible
    Array {
        /// Rig view used as the sorting reference
        rig: CameraView,
        /// Per-eye views used for culling
        views: Vec<CameraView>,
    },
}

impl Camera {
    /// View used for depth sorting
    pub const fn primary(&self) -> &CameraView {
        match self {
            Self::Single(view) => view,
            Self::Array { rig, .. } => rig,
        }
    }

    /// Views used for culling
    ///
    /// An array camera without sub-views culls against its rig.
    pub fn culling_views(&self) -> &[CameraView] {
        match self {
            Self::Single(view) => std::slice::from_ref(view),
            Self::Array { rig, views } if views.is_empty() => std::slice::from_ref(rig),
            Self::Array { views, .. } => views,
        }
    }

    /// Whether this is a multi-view camera
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }
}

impl From<CameraView> for Camera {
    fn from(view: CameraView) -> Self {
        Self::Single(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    fn view_at(eye: Vec3, target: Vec3) -> CameraView {
        CameraView::perspective(eye, target, Vec3::y(), 60.0, 1.0, 0.1, 100.0)
    }

    #[test]
    fn test_position_and_forward() {
        let view = view_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros());
        assert_relative_eq!(view.position(), Vec3::new(0.0, 0.0, 10.0), epsilon = EPSILON);
        assert_relative_eq!(view.forward(), Vec3::new(0.0, 0.0, -1.0), epsilon = EPSILON);

        let side = view_at(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(side.forward(), Vec3::new(1.0, 0.0, 0.0), epsilon = EPSILON);
    }

    #[test]
    fn test_frustum_for_object_world() {
        let view = view_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));
        let object_world = Mat4::new_translation(&Vec3::new(0.0, 0.0, -20.0));
        let frustum = view.frustum_for(&object_world);
        // Local origin sits 20 units in front of the camera
        assert!(frustum.contains_point(&Vec3::zeros()));
        // Local +30 on z is 10 units behind the camera
        assert!(!frustum.contains_point(&Vec3::new(0.0, 0.0, 30.0)));
    }

    #[test]
    fn test_webgpu_remap_keeps_visibility() {
        let view = view_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0)).with_coordinate_system(CoordinateSystem::WebGpu);
        let frustum = view.frustum_for(&Mat4::identity());
        assert!(frustum.contains_point(&Vec3::new(0.0, 0.0, -50.0)));
        assert!(!frustum.contains_point(&Vec3::new(0.0, 0.0, -0.05)));
    }

    #[test]
    fn test_array_camera_views() {
        let left = view_at(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, -1.0));
        let right = view_at(Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, -1.0));
        let rig = view_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));
        let camera = Camera::Array { rig: rig.clone(), views: vec![left, right] };
        assert!(camera.is_array());
        assert_eq!(camera.culling_views().len(), 2);
        assert_eq!(camera.primary(), &rig);

        let bare = Camera::Array { rig: rig.clone(), views: Vec::new() };
        assert_eq!(bare.culling_views(), std::slice::from_ref(&rig));
    }
}
