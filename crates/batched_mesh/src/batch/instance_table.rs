//! Instance records, geometry bindings and id recycling

use super::{BatchError, BatchResult, GeometryArena, GeometryId, InstanceDataTextures, InstanceId, Resource};
use crate::foundation::collections::FreeList;

/// One drawn occurrence of a geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Whether the instance takes part in drawing and raycasting
    pub visible: bool,
    /// Geometry the instance draws
    pub geometry_id: GeometryId,
}

/// Live instances addressed by recycled dense ids
#[derive(Debug, Clone)]
pub struct InstanceTable {
    max_instance_count: usize,
    records: FreeList<InstanceRecord>,
}

impl InstanceTable {
    /// Create an empty table
    pub fn new(max_instance_count: usize) -> Self {
        Self {
            max_instance_count,
            records: FreeList::new(),
        }
    }

    /// Instance capacity
    pub const fn max_instance_count(&self) -> usize {
        self.max_instance_count
    }

    /// Number of live instances
    pub fn instance_count(&self) -> usize {
        self.records.live_count()
    }

    /// Number of ids ever minted, live or recycled
    pub fn slot_count(&self) -> usize {
        self.records.slot_count()
    }

    /// Whether `id` refers to a live instance
    pub fn contains(&self, id: InstanceId) -> bool {
        self.records.contains(id.0)
    }

    /// Live record by id
    pub fn record(&self, id: InstanceId) -> BatchResult<&InstanceRecord> {
        self.records.get(id.0).ok_or_else(|| id.invalid())
    }

    /// Fail unless `id` refers to a live instance
    pub fn validate(&self, id: InstanceId) -> BatchResult<()> {
        self.record(id).map(|_| ())
    }

    /// Live instances in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &InstanceRecord)> {
        self.records.iter().map(|(id, record)| (InstanceId(id), record))
    }

    /// Recycled ids in ascending order
    pub fn free_ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.records.free_ids().map(InstanceId)
    }

    /// Create a visible instance of `geometry_id`
    ///
    /// Takes the lowest recycled id first. The new id's matrix is reset to
    /// identity and its color (when colors exist) to white.
    pub fn add_instance(
        &mut self,
        geometry_id: GeometryId,
        arena: &GeometryArena,
        textures: &mut InstanceDataTextures,
    ) -> BatchResult<InstanceId> {
        if !arena.contains(geometry_id) {
            return Err(geometry_id.invalid());
        }
        if self.records.free_count() == 0 && self.records.slot_count() >= self.max_instance_count {
            return Err(BatchError::CapacityExceeded {
                resource: Resource::Instances,
                requested: self.instance_count() + 1,
                available: self.max_instance_count,
            });
        }

        let id = InstanceId(self.records.insert(InstanceRecord {
            visible: true,
            geometry_id,
        }));
        textures.reset_instance(id);
        log::trace!("Added {} of {}", id, geometry_id);
        Ok(id)
    }

    /// Remove a live instance and recycle its id
    ///
    /// Matrix and color data stay in place until the id is reissued.
    pub fn delete_instance(&mut self, id: InstanceId) -> BatchResult<()> {
        self.records.remove(id.0).ok_or_else(|| id.invalid())?;
        log::trace!("Deleted {}", id);
        Ok(())
    }

    /// Remove every instance bound to `geometry_id`, then the geometry itself
    ///
    /// Returns the removed instance ids in ascending order.
    pub fn delete_geometry_cascade(
        &mut self,
        geometry_id: GeometryId,
        arena: &mut GeometryArena,
    ) -> BatchResult<Vec<InstanceId>> {
        if !arena.contains(geometry_id) {
            return Err(geometry_id.invalid());
        }

        let bound: Vec<InstanceId> = self
            .iter()
            .filter(|(_, record)| record.geometry_id == geometry_id)
            .map(|(id, _)| id)
            .collect();
        for id in &bound {
            self.records.remove(id.0);
        }
        arena.remove_geometry(geometry_id)?;

        log::debug!("Deleted {} with {} bound instances", geometry_id, bound.len());
        Ok(bound)
    }

    /// Geometry a live instance draws
    pub fn geometry_id_at(&self, id: InstanceId) -> BatchResult<GeometryId> {
        self.record(id).map(|record| record.geometry_id)
    }

    /// Rebind a live instance to another live geometry
    pub fn set_geometry_id_at(&mut self, id: InstanceId, geometry_id: GeometryId, arena: &GeometryArena) -> BatchResult<()> {
        self.validate(id)?;
        if !arena.contains(geometry_id) {
            return Err(geometry_id.invalid());
        }
        if let Some(record) = self.records.get_mut(id.0) {
            record.geometry_id = geometry_id;
        }
        Ok(())
    }

    /// Visibility of a live instance
    pub fn visible_at(&self, id: InstanceId) -> BatchResult<bool> {
        self.record(id).map(|record| record.visible)
    }

    /// Set visibility of a live instance; returns whether it changed
    pub fn set_visible_at(&mut self, id: InstanceId, visible: bool) -> BatchResult<bool> {
        let record = self.records.get_mut(id.0).ok_or_else(|| id.invalid())?;
        let changed = record.visible != visible;
        record.visible = visible;
        Ok(changed)
    }

    /// Change instance capacity
    ///
    /// Trailing recycled ids are dropped first; any live id at or above the
    /// new capacity makes the call fail without changes.
    pub fn resize_capacity(&mut self, max_instance_count: usize) -> BatchResult<()> {
        let required = self.records.trimmed_slot_count();
        if max_instance_count < required {
            log::warn!(
                "Rejected instance capacity {} below high-water mark {}",
                max_instance_count,
                required
            );
            return Err(BatchError::ShrinkViolation {
                resource: Resource::Instances,
                requested: max_instance_count,
                required,
            });
        }

        self.records.trim_trailing_free();
        log::info!("Instance capacity {} -> {}", self.max_instance_count, max_instance_count);
        self.max_instance_count = max_instance_count;
        Ok(())
    }
}
