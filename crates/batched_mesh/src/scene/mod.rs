//! Cameras and frustum culling primitives

pub mod camera;
pub mod frustum;

pub use camera::{Camera, CameraView};
pub use frustum::{CoordinateSystem, Frustum, Plane};
