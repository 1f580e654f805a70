//! # Batched Mesh
//!
//! Draws many instances of many geometries in a single multi-draw call.
//!
//! ## Features
//!
//! - **Geometry Arena**: Shared vertex/index buffers with reserved ranges,
//!   in-place replacement, compaction and resizing
//! - **Instance Table**: Stable instance ids recycled lowest-first
//! - **Instance Data Textures**: Square float/uint textures holding per-instance
//!   matrices, colors and the draw-slot indirection
//! - **Cull & Sort**: Per-frame frustum culling (multi-view aware) and depth
//!   sorting that emits multi-draw starts/counts
//! - **Raycasting**: Per-instance ray queries through a pluggable intersector
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batched_mesh::prelude::*;
//!
//! fn main() -> Result<(), BatchError> {
//!     let mut batch = BatchedMesh::new(10, 5000, 10000, Material::default());
//!     let cube = box_geometry(1.0, 1.0, 1.0);
//!     let geometry = batch.add_geometry(&cube, None, None)?;
//!
//!     let instance = batch.add_instance(geometry)?;
//!     batch.set_matrix_at(instance, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0)))?;
//!
//!     let camera = Camera::from(CameraView::perspective(
//!         Vec3::zeros(),
//!         Vec3::new(0.0, 0.0, -1.0),
//!         Vec3::y(),
//!         75.0,
//!         1.0,
//!         0.1,
//!         100.0,
//!     ));
//!     batch.prepare_draw(&camera)?;
//!     for command in batch.draw_list().commands() {
//!         println!("{command:?}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod geometry;
pub mod scene;
pub mod raycast;
pub mod render;
pub mod batch;

/// Common imports for batch users
pub mod prelude {
    pub use crate::{
        batch::{
            BatchError, BatchResult, BatchedMesh, CustomSort, DrawCommand, DrawList,
            GeometryId, GeometryRange, InstanceId, RenderItem,
        },
        config::{BatchConfig, Config, ConfigError},
        foundation::math::{Mat4, Mat4Ext, Point3, Quat, Transform, Vec3, Vec4},
        geometry::{
            box_geometry, Aabb, AttributeArray, BoundingSphere, BufferAttribute, Geometry,
            IndexArray,
        },
        raycast::{Intersection, Ray, RayIntersector, TriangleIntersector},
        render::{BufferTarget, Color, DirtyFlags, Material, Side, UploadSink},
        scene::{Camera, CameraView, CoordinateSystem, Frustum, Plane},
    };
}
