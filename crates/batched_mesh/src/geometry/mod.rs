//! Geometry data: typed attributes, index arrays, bounds and primitives

pub mod attribute;
pub mod bounds;
pub mod buffer_geometry;
pub mod primitives;

pub use attribute::{AttributeArray, BufferAttribute, ComponentType, IndexArray};
pub use bounds::{Aabb, BoundingSphere};
pub use buffer_geometry::{Geometry, POSITION};
pub use primitives::box_geometry;
