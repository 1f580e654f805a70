//! Source geometry handed to the batch

use std::collections::BTreeMap;

use super::{Aabb, AttributeArray, BoundingSphere, BufferAttribute, IndexArray};
use crate::foundation::math::Vec3;

/// Name of the attribute every geometry must carry
pub const POSITION: &str = "position";

/// Named vertex attributes with an optional index and cached bounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    attributes: BTreeMap<String, BufferAttribute>,
    index: Option<IndexArray>,
    bounding_box: Option<Aabb>,
    bounding_sphere: Option<BoundingSphere>,
}

impl Geometry {
    /// Create an empty geometry
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insertion
    pub fn with_attribute(mut self, name: impl Into<String>, attribute: BufferAttribute) -> Self {
        self.set_attribute(name, attribute);
        self
    }

    /// Builder-style index assignment
    pub fn with_index(mut self, index: impl Into<IndexArray>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Insert or replace an attribute; invalidates cached bounds
    pub fn set_attribute(&mut self, name: impl Into<String>, attribute: BufferAttribute) {
        self.attributes.insert(name.into(), attribute);
        self.bounding_box = None;
        self.bounding_sphere = None;
    }

    /// Replace the index
    pub fn set_index(&mut self, index: Option<IndexArray>) {
        self.index = index;
    }

    /// Attribute by name
    pub fn attribute(&self, name: &str) -> Option<&BufferAttribute> {
        self.attributes.get(name)
    }

    /// Attributes in name order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &BufferAttribute)> {
        self.attributes.iter().map(|(name, attribute)| (name.as_str(), attribute))
    }

    /// Index, when the geometry is indexed
    pub const fn index(&self) -> Option<&IndexArray> {
        self.index.as_ref()
    }

    /// Whether the geometry is indexed
    pub const fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Vertex count taken from the position attribute
    pub fn vertex_count(&self) -> usize {
        self.attribute(POSITION).map_or(0, BufferAttribute::count)
    }

    /// Number of indices (zero when not indexed)
    pub fn index_count(&self) -> usize {
        self.index.as_ref().map_or(0, IndexArray::len)
    }

    /// Position of vertex `vertex`
    pub fn position(&self, vertex: usize) -> Option<Vec3> {
        let attribute = self.attribute(POSITION)?;
        Some(Vec3::new(
            attribute.get_component(vertex, 0),
            attribute.get_component(vertex, 1),
            attribute.get_component(vertex, 2),
        ))
    }

    /// Cached bounding box, if computed or supplied
    pub const fn bounding_box(&self) -> Option<&Aabb> {
        self.bounding_box.as_ref()
    }

    /// Cached bounding sphere, if computed or supplied
    pub const fn bounding_sphere(&self) -> Option<&BoundingSphere> {
        self.bounding_sphere.as_ref()
    }

    /// Compute and cache the bounding box of all positions
    pub fn compute_bounding_box(&mut self) -> Aabb {
        let aabb = Aabb::from_points((0..self.vertex_count()).filter_map(|v| self.position(v)));
        self.bounding_box = Some(aabb);
        aabb
    }

    /// Compute and cache the bounding sphere of all positions
    pub fn compute_bounding_sphere(&mut self) -> BoundingSphere {
        let aabb = self.bounding_box.unwrap_or_else(|| {
            Aabb::from_points((0..self.vertex_count()).filter_map(|v| self.position(v)))
        });
        let sphere = BoundingSphere::from_points_around_box(
            &aabb,
            (0..self.vertex_count()).filter_map(|v| self.position(v)),
        );
        self.bounding_sphere = Some(sphere);
        sphere
    }

    /// Expand indexed geometry so every triangle owns its vertices
    ///
    /// Only plain attributes are expanded; other storage kinds are dropped.
    /// Non-indexed geometry is returned unchanged.
    pub fn to_non_indexed(&self) -> Self {
        let Some(index) = &self.index else {
            return self.clone();
        };

        let mut out = Self::new();
        for (name, attribute) in &self.attributes {
            let BufferAttribute::Plain { array, item_size, normalized } = attribute else {
                continue;
            };
            let mut expanded = AttributeArray::zeroed(array.component_type(), index.len() * item_size);
            for (i, vertex) in index.iter().enumerate() {
                let start = vertex as usize * item_size;
                if let Some(item) = array.slice(start..start + item_size) {
                    expanded.write_from(&item, i * item_size);
                }
            }
            out.set_attribute(name.clone(), BufferAttribute::new(expanded, *item_size, *normalized));
        }
        out
    }
}
