//! Shared vertex/index storage carved into per-geometry reservations
//!
//! The first registered geometry fixes the attribute schema and allocates
//! every shared array at full capacity. Later geometries are copied into
//! reserved ranges handed out from two monotonically advancing cursors;
//! removed ranges are only reclaimed by [`GeometryArena::optimize`].

use std::collections::BTreeMap;

use super::{BatchError, BatchResult, GeometryId, Resource};
use crate::foundation::collections::FreeList;
use crate::foundation::math::Vec3;
use crate::geometry::{Aabb, AttributeArray, BoundingSphere, BufferAttribute, Geometry, IndexArray, POSITION};
use crate::raycast::GeometryView;
use crate::render::{BufferState, BufferTarget, DirtyFlags, UploadSink};

/// Placement of one geometry inside the shared buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryRange {
    /// First vertex of the reservation
    pub vertex_start: usize,
    /// Vertices actually written
    pub vertex_count: usize,
    /// Vertices reserved
    pub reserved_vertex_count: usize,
    /// First index of the reservation (0 when the batch is not indexed)
    pub index_start: usize,
    /// Indices actually written
    pub index_count: usize,
    /// Indices reserved
    pub reserved_index_count: usize,
    /// First drawn element (index start when indexed, vertex start otherwise)
    pub draw_start: usize,
    /// Number of drawn elements
    pub draw_count: usize,
}

impl GeometryRange {
    /// One past the last reserved vertex
    pub const fn vertex_end(&self) -> usize {
        self.vertex_start + self.reserved_vertex_count
    }

    /// One past the last reserved index
    pub const fn index_end(&self) -> usize {
        self.index_start + self.reserved_index_count
    }
}

/// One registered geometry
#[derive(Debug, Clone, PartialEq)]
pub struct GeometrySlot {
    /// Placement in the shared buffers
    pub range: GeometryRange,
    /// Cached local-space bounding box
    pub bounding_box: Option<Aabb>,
    /// Cached local-space bounding sphere
    pub bounding_sphere: Option<BoundingSphere>,
}

/// Shared array for one named attribute
#[derive(Debug, Clone)]
pub struct ArenaAttribute {
    /// Component data for every vertex of the arena
    pub array: AttributeArray,
    /// Components per vertex
    pub item_size: usize,
    /// Whether integer data maps to a normalized float range
    pub normalized: bool,
    state: BufferState,
}

impl ArenaAttribute {
    /// Upload bookkeeping
    pub const fn state(&self) -> &BufferState {
        &self.state
    }
}

/// Shared index array
#[derive(Debug, Clone)]
pub struct ArenaIndex {
    /// Absolute vertex indices
    pub array: IndexArray,
    state: BufferState,
}

impl ArenaIndex {
    /// Upload bookkeeping
    pub const fn state(&self) -> &BufferState {
        &self.state
    }
}

/// Shared vertex/index buffers and the geometry slots carved from them
#[derive(Debug, Clone)]
pub struct GeometryArena {
    max_vertex_count: usize,
    max_index_count: usize,
    initialized: bool,
    attributes: BTreeMap<String, ArenaAttribute>,
    index: Option<ArenaIndex>,
    slots: FreeList<GeometrySlot>,
    next_vertex_start: usize,
    next_index_start: usize,
}

impl GeometryArena {
    /// Create an empty arena; buffers are allocated by the first registration
    pub fn new(max_vertex_count: usize, max_index_count: usize) -> Self {
        Self {
            max_vertex_count,
            max_index_count,
            initialized: false,
            attributes: BTreeMap::new(),
            index: None,
            slots: FreeList::new(),
            next_vertex_start: 0,
            next_index_start: 0,
        }
    }

    /// Vertex capacity
    pub const fn max_vertex_count(&self) -> usize {
        self.max_vertex_count
    }

    /// Index capacity
    pub const fn max_index_count(&self) -> usize {
        self.max_index_count
    }

    /// Whether the schema has been established
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether geometries carry indices
    pub const fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Vertices left after the allocation cursor
    pub const fn unused_vertex_count(&self) -> usize {
        self.max_vertex_count.saturating_sub(self.next_vertex_start)
    }

    /// Indices left after the allocation cursor
    pub const fn unused_index_count(&self) -> usize {
        self.max_index_count.saturating_sub(self.next_index_start)
    }

    /// Number of live geometries
    pub fn geometry_count(&self) -> usize {
        self.slots.live_count()
    }

    /// Whether `id` refers to a live geometry
    pub fn contains(&self, id: GeometryId) -> bool {
        self.slots.contains(id.0)
    }

    /// Live slot by id
    pub fn slot(&self, id: GeometryId) -> BatchResult<&GeometrySlot> {
        self.slots.get(id.0).ok_or_else(|| id.invalid())
    }

    /// Placement of a live geometry
    pub fn range_at(&self, id: GeometryId) -> BatchResult<GeometryRange> {
        self.slot(id).map(|slot| slot.range)
    }

    /// Live geometries in ascending id order
    pub fn slots(&self) -> impl Iterator<Item = (GeometryId, &GeometrySlot)> {
        self.slots.iter().map(|(id, slot)| (GeometryId(id), slot))
    }

    /// Shared attribute array by name
    pub fn attribute(&self, name: &str) -> Option<&ArenaAttribute> {
        self.attributes.get(name)
    }

    /// Shared attribute arrays in name order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &ArenaAttribute)> {
        self.attributes.iter().map(|(name, attribute)| (name.as_str(), attribute))
    }

    /// Shared index array, when indexed
    pub const fn index(&self) -> Option<&ArenaIndex> {
        self.index.as_ref()
    }

    /// Byte multiplier for multi-draw starts (1 when not indexed)
    pub fn bytes_per_draw_element(&self) -> usize {
        self.index.as_ref().map_or(1, |index| index.array.bytes_per_element())
    }

    /// Copy a geometry into a fresh reservation
    ///
    /// Reservations default to the geometry's own vertex and index counts.
    /// The first geometry establishes the attribute schema and allocates
    /// every shared array. Recycled ids are reused lowest-first but always
    /// receive new space at the allocation cursor.
    pub fn register_geometry(
        &mut self,
        geometry: &Geometry,
        reserved_vertex_count: Option<usize>,
        reserved_index_count: Option<usize>,
    ) -> BatchResult<GeometryId> {
        self.validate_schema(geometry)?;

        let indexed = geometry.is_indexed();
        let reserved_vertex_count = reserved_vertex_count.unwrap_or_else(|| geometry.vertex_count());
        let reserved_index_count = if indexed {
            reserved_index_count.unwrap_or_else(|| geometry.index_count())
        } else {
            0
        };
        self.validate_fit(geometry, reserved_vertex_count, reserved_index_count)?;

        if reserved_vertex_count > self.unused_vertex_count() {
            return Err(BatchError::CapacityExceeded {
                resource: Resource::Vertices,
                requested: reserved_vertex_count,
                available: self.unused_vertex_count(),
            });
        }
        if indexed && reserved_index_count > self.unused_index_count() {
            return Err(BatchError::CapacityExceeded {
                resource: Resource::Indices,
                requested: reserved_index_count,
                available: self.unused_index_count(),
            });
        }

        if !self.initialized {
            self.initialize(geometry);
        }

        let mut slot = GeometrySlot {
            range: GeometryRange {
                vertex_start: self.next_vertex_start,
                reserved_vertex_count,
                index_start: if indexed { self.next_index_start } else { 0 },
                reserved_index_count,
                ..GeometryRange::default()
            },
            bounding_box: None,
            bounding_sphere: None,
        };
        self.write_geometry(&mut slot, geometry);

        self.next_vertex_start += reserved_vertex_count;
        if indexed {
            self.next_index_start += reserved_index_count;
        }
        let id = GeometryId(self.slots.insert(slot));

        log::debug!(
            "Registered {} ({} vertices reserved at {}, {} indices reserved)",
            id,
            reserved_vertex_count,
            self.next_vertex_start - reserved_vertex_count,
            reserved_index_count
        );
        Ok(id)
    }

    /// Overwrite a live geometry in place
    ///
    /// The new data must fit the slot's existing reservation. Cached bounds
    /// are replaced by the geometry's own (or cleared).
    pub fn replace_geometry(&mut self, id: GeometryId, geometry: &Geometry) -> BatchResult<GeometryId> {
        let mut slot = self.slot(id)?.clone();
        self.validate_schema(geometry)?;
        self.validate_fit(geometry, slot.range.reserved_vertex_count, slot.range.reserved_index_count)?;

        self.write_geometry(&mut slot, geometry);
        if let Some(stored) = self.slots.get_mut(id.0) {
            *stored = slot;
        }
        log::trace!("Replaced {}", id);
        Ok(id)
    }

    /// Free a live geometry's slot
    ///
    /// The reserved range stays allocated until [`optimize`](Self::optimize).
    pub fn remove_geometry(&mut self, id: GeometryId) -> BatchResult<()> {
        self.slots.remove(id.0).ok_or_else(|| id.invalid())?;
        log::debug!("Removed {}", id);
        Ok(())
    }

    /// Pack live reservations to the front of the shared buffers
    ///
    /// Slots keep their relative order. Index values are rebased whenever
    /// the owning slot's vertex base moves. Both cursors end up just past
    /// the last live reservation. Returns the number of slots that moved.
    pub fn optimize(&mut self) -> usize {
        let mut order: Vec<(usize, u32)> = self
            .slots
            .iter()
            .map(|(id, slot)| (slot.range.vertex_start, id))
            .collect();
        order.sort_unstable();

        let indexed = self.is_indexed();
        let mut next_vertex_start = 0;
        let mut next_index_start = 0;
        let mut moved = 0;

        for (_, id) in order {
            let Some(mut range) = self.slots.get(id).map(|slot| slot.range) else {
                continue;
            };
            let old_range = range;

            if let Some(index) = self.index.as_mut() {
                let vertex_delta = next_vertex_start as i64 - range.vertex_start as i64;
                if range.index_start != next_index_start || vertex_delta != 0 {
                    let source = range.index_start..range.index_end();
                    if vertex_delta != 0 {
                        index.array.rebase(source.clone(), vertex_delta);
                    }
                    index.array.copy_within(source, next_index_start);
                    index.state.mark_range(next_index_start, range.reserved_index_count);
                    range.index_start = next_index_start;
                    range.draw_start = next_index_start;
                }
                next_index_start += range.reserved_index_count;
            }

            if range.vertex_start != next_vertex_start {
                for attribute in self.attributes.values_mut() {
                    let item_size = attribute.item_size;
                    attribute.array.copy_within(
                        range.vertex_start * item_size..range.vertex_end() * item_size,
                        next_vertex_start * item_size,
                    );
                    attribute
                        .state
                        .mark_range(next_vertex_start * item_size, range.reserved_vertex_count * item_size);
                }
                range.vertex_start = next_vertex_start;
                if !indexed {
                    range.draw_start = next_vertex_start;
                }
            }
            next_vertex_start += range.reserved_vertex_count;

            if range != old_range {
                moved += 1;
                if let Some(slot) = self.slots.get_mut(id) {
                    slot.range = range;
                }
            }
        }

        log::debug!(
            "Optimized arena: {} slots moved, vertex cursor {} -> {}, index cursor {} -> {}",
            moved,
            self.next_vertex_start,
            next_vertex_start,
            self.next_index_start,
            next_index_start
        );
        self.next_vertex_start = next_vertex_start;
        self.next_index_start = next_index_start;
        moved
    }

    /// Change vertex/index capacity, keeping all live data
    ///
    /// Fails without touching anything when a live reservation would fall
    /// outside the new bounds.
    pub fn resize(&mut self, max_vertex_count: usize, max_index_count: usize) -> BatchResult<()> {
        let required_vertices = self.slots.iter().map(|(_, slot)| slot.range.vertex_end()).max().unwrap_or(0);
        if max_vertex_count < required_vertices {
            return Err(BatchError::ShrinkViolation {
                resource: Resource::Vertices,
                requested: max_vertex_count,
                required: required_vertices,
            });
        }
        let required_indices = if self.is_indexed() {
            self.slots.iter().map(|(_, slot)| slot.range.index_end()).max().unwrap_or(0)
        } else {
            0
        };
        if max_index_count < required_indices {
            return Err(BatchError::ShrinkViolation {
                resource: Resource::Indices,
                requested: max_index_count,
                required: required_indices,
            });
        }

        if self.initialized {
            for attribute in self.attributes.values_mut() {
                attribute.array.resize(max_vertex_count * attribute.item_size);
                attribute.state.mark_all();
            }
            if let Some(index) = self.index.as_mut() {
                let mut array = IndexArray::for_vertex_capacity(max_vertex_count, max_index_count);
                array.copy_prefix_from(&index.array);
                index.array = array;
                index.state.mark_all();
            }
        }

        // Live data ends at the high-water marks
        if self.next_vertex_start > max_vertex_count {
            self.next_vertex_start = required_vertices;
        }
        if self.next_index_start > max_index_count {
            self.next_index_start = required_indices;
        }

        log::debug!(
            "Resized arena: vertices {} -> {}, indices {} -> {}",
            self.max_vertex_count,
            max_vertex_count,
            self.max_index_count,
            max_index_count
        );
        self.max_vertex_count = max_vertex_count;
        self.max_index_count = max_index_count;
        Ok(())
    }

    /// Local-space bounding box of a geometry, computed on first use
    pub fn compute_bounding_box_at(&mut self, id: GeometryId) -> BatchResult<Aabb> {
        let slot = self.slot(id)?;
        if let Some(aabb) = slot.bounding_box {
            return Ok(aabb);
        }
        let range = slot.range;
        let aabb = Aabb::from_points(self.draw_positions(&range));
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.bounding_box = Some(aabb);
        }
        Ok(aabb)
    }

    /// Local-space bounding sphere of a geometry, computed on first use
    ///
    /// Centered on the bounding box center.
    pub fn compute_bounding_sphere_at(&mut self, id: GeometryId) -> BatchResult<BoundingSphere> {
        if let Some(sphere) = self.slot(id)?.bounding_sphere {
            return Ok(sphere);
        }
        let aabb = self.compute_bounding_box_at(id)?;
        let range = self.slot(id)?.range;
        let sphere = BoundingSphere::from_points_around_box(&aabb, self.draw_positions(&range));
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.bounding_sphere = Some(sphere);
        }
        Ok(sphere)
    }

    /// Borrowed view of a geometry for ray queries
    pub fn geometry_view(&self, id: GeometryId) -> BatchResult<GeometryView<'_>> {
        let slot = self.slot(id)?;
        let position = self
            .attributes
            .get(POSITION)
            .ok_or_else(|| BatchError::schema("batch has no position attribute"))?;

        let bounding_box = slot
            .bounding_box
            .unwrap_or_else(|| Aabb::from_points(self.draw_positions(&slot.range)));
        let bounding_sphere = slot.bounding_sphere.unwrap_or_else(|| {
            BoundingSphere::from_points_around_box(&bounding_box, self.draw_positions(&slot.range))
        });

        Ok(GeometryView {
            positions: &position.array,
            position_item_size: position.item_size,
            position_normalized: position.normalized,
            index: self.index.as_ref().map(|index| &index.array),
            draw_start: slot.range.draw_start,
            draw_count: slot.range.draw_count,
            bounding_box,
            bounding_sphere,
        })
    }

    /// Which arena buffers have pending uploads
    pub fn dirty_flags(&self) -> DirtyFlags {
        let mut flags = DirtyFlags::empty();
        if self.attributes.values().any(|attribute| attribute.state.is_dirty()) {
            flags |= DirtyFlags::ATTRIBUTES;
        }
        if self.index.as_ref().is_some_and(|index| index.state.is_dirty()) {
            flags |= DirtyFlags::INDEX;
        }
        flags
    }

    /// Hand pending attribute and index changes to `sink`
    pub fn flush_uploads(&mut self, sink: &mut dyn UploadSink) {
        for (name, attribute) in &mut self.attributes {
            if let Some(region) = attribute.state.take() {
                let target = BufferTarget::Attribute(name.clone());
                let component_bytes = attribute.array.component_type().bytes();
                sink.upload(&target, attribute.array.as_bytes(), component_bytes, &region);
            }
        }
        if let Some(index) = self.index.as_mut() {
            if let Some(region) = index.state.take() {
                sink.upload(&BufferTarget::Index, index.array.as_bytes(), index.array.bytes_per_element(), &region);
            }
        }
    }

    fn validate_schema(&self, geometry: &Geometry) -> BatchResult<()> {
        if !self.initialized {
            return Self::validate_initial_schema(geometry);
        }

        if geometry.is_indexed() != self.is_indexed() {
            return Err(BatchError::schema(if self.is_indexed() {
                "batch is indexed but geometry has no index"
            } else {
                "batch is not indexed but geometry has an index"
            }));
        }

        for (name, shared) in &self.attributes {
            let source = geometry
                .attribute(name)
                .ok_or_else(|| BatchError::schema(format!("missing attribute \"{name}\"")))?;
            let array = source.plain_array().ok_or_else(|| {
                BatchError::UnsupportedFeature(format!("{} attribute \"{name}\"", source.kind_name()))
            })?;
            if source.item_size() != shared.item_size {
                return Err(BatchError::schema(format!(
                    "attribute \"{name}\" has item size {}, expected {}",
                    source.item_size(),
                    shared.item_size
                )));
            }
            if source.normalized() != shared.normalized {
                return Err(BatchError::schema(format!("attribute \"{name}\" normalization differs")));
            }
            if array.component_type() != shared.array.component_type() {
                return Err(BatchError::schema(format!(
                    "attribute \"{name}\" is {:?}, expected {:?}",
                    array.component_type(),
                    shared.array.component_type()
                )));
            }
        }
        Ok(())
    }

    fn validate_initial_schema(geometry: &Geometry) -> BatchResult<()> {
        if geometry.attribute(POSITION).is_none() {
            return Err(BatchError::schema("missing attribute \"position\""));
        }
        for (name, attribute) in geometry.attributes() {
            if attribute.plain_array().is_none() {
                return Err(BatchError::UnsupportedFeature(format!(
                    "{} attribute \"{name}\"",
                    attribute.kind_name()
                )));
            }
            if attribute.item_size() == 0 {
                return Err(BatchError::schema(format!("attribute \"{name}\" has item size 0")));
            }
        }
        Ok(())
    }

    fn validate_fit(&self, geometry: &Geometry, reserved_vertex_count: usize, reserved_index_count: usize) -> BatchResult<()> {
        let vertex_count = geometry.vertex_count();
        let copied = geometry
            .attributes()
            .filter(|(name, _)| !self.initialized || self.attributes.contains_key(*name));
        let mut longest = vertex_count;
        for (name, attribute) in copied {
            let len = attribute.plain_array().map_or(0, AttributeArray::len);
            if len % attribute.item_size().max(1) != 0 {
                return Err(BatchError::schema(format!(
                    "attribute \"{name}\" has {len} components, not a multiple of item size {}",
                    attribute.item_size()
                )));
            }
            longest = longest.max(attribute.count());
        }
        if longest > reserved_vertex_count {
            return Err(BatchError::CapacityExceeded {
                resource: Resource::Vertices,
                requested: longest,
                available: reserved_vertex_count,
            });
        }

        if let Some(index) = geometry.index() {
            if index.len() > reserved_index_count {
                return Err(BatchError::CapacityExceeded {
                    resource: Resource::Indices,
                    requested: index.len(),
                    available: reserved_index_count,
                });
            }
            if let Some(max) = index.max_value().filter(|max| *max as usize >= vertex_count) {
                return Err(BatchError::schema(format!(
                    "index references vertex {max} but geometry has {vertex_count} vertices"
                )));
            }
        }
        Ok(())
    }

    fn initialize(&mut self, reference: &Geometry) {
        for (name, attribute) in reference.attributes() {
            let Some(array) = attribute.plain_array() else {
                continue;
            };
            self.attributes.insert(
                name.to_string(),
                ArenaAttribute {
                    array: AttributeArray::zeroed(array.component_type(), self.max_vertex_count * attribute.item_size()),
                    item_size: attribute.item_size(),
                    normalized: attribute.normalized(),
                    state: BufferState::new_full(),
                },
            );
        }
        if reference.is_indexed() {
            self.index = Some(ArenaIndex {
                array: IndexArray::for_vertex_capacity(self.max_vertex_count, self.max_index_count),
                state: BufferState::new_full(),
            });
        }
        self.initialized = true;
        log::info!(
            "Initialized geometry arena: {} attributes, {} vertices, {}",
            self.attributes.len(),
            self.max_vertex_count,
            if reference.is_indexed() {
                format!("{} indices", self.max_index_count)
            } else {
                "non-indexed".to_string()
            }
        );
    }

    /// Copy `geometry` into `slot`'s reservation and zero-fill the unused tail
    fn write_geometry(&mut self, slot: &mut GeometrySlot, geometry: &Geometry) {
        let range = &mut slot.range;
        let vertex_count = geometry.vertex_count();

        for (name, attribute) in &mut self.attributes {
            let item_size = attribute.item_size;
            let start = range.vertex_start * item_size;
            let end = range.vertex_end() * item_size;
            let written = match geometry.attribute(name).and_then(BufferAttribute::plain_array) {
                Some(source) => {
                    // validate_fit bounds every copied array by the reservation
                    let copied = attribute.array.write_from(source, start);
                    debug_assert!(copied, "attribute \"{name}\" overran its reservation");
                    if copied {
                        source.len()
                    } else {
                        0
                    }
                }
                None => 0,
            };
            attribute.array.fill_zero(start + written..end);
            attribute.state.mark_range(start, end - start);
        }
        range.vertex_count = vertex_count;

        match (self.index.as_mut(), geometry.index()) {
            (Some(index), Some(source)) => {
                let base = range.vertex_start as u32;
                for (i, value) in source.iter().enumerate() {
                    index.array.set(range.index_start + i, base + value);
                }
                for i in source.len()..range.reserved_index_count {
                    index.array.set(range.index_start + i, base);
                }
                index.state.mark_range(range.index_start, range.reserved_index_count);
                range.index_count = source.len();
                range.draw_start = range.index_start;
                range.draw_count = source.len();
            }
            _ => {
                range.index_count = 0;
                range.draw_start = range.vertex_start;
                range.draw_count = vertex_count;
            }
        }

        slot.bounding_box = geometry.bounding_box().copied();
        slot.bounding_sphere = geometry.bounding_sphere().copied();
    }

    fn draw_positions<'a>(&'a self, range: &GeometryRange) -> impl Iterator<Item = Vec3> + 'a {
        let position = self.attributes.get(POSITION);
        let index = self.index.as_ref();
        (range.draw_start..range.draw_start + range.draw_count).filter_map(move |element| {
            let position = position?;
            let vertex = match index {
                Some(index) => index.array.get(element)? as usize,
                None => element,
            };
            let base = vertex * position.item_size;
            let component = |c: usize| {
                if c < position.item_size {
                    position.array.get_f32(base + c, position.normalized)
                } else {
                    0.0
                }
            };
            Some(Vec3::new(component(0), component(1), component(2)))
        })
    }
}
