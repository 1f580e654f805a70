//! Public batch API tying the arena, instance table, textures and scheduler together

use super::{
    BatchResult, CullSortScheduler, CustomSort, DrawList, GeometryArena, GeometryId, GeometryRange,
    InstanceDataTextures, InstanceId, InstanceTable,
};
use crate::config::BatchConfig;
use crate::foundation::math::Mat4;
use crate::geometry::{Aabb, BoundingSphere, Geometry};
use crate::raycast::{Intersection, Ray, RayIntersector};
use crate::render::{BufferTarget, Color, DirtyFlags, Material, UploadSink};
use crate::scene::Camera;

/// Many instances of many geometries drawn with one multi-draw call
///
/// Geometry data is copied into shared vertex/index buffers; each instance
/// references a geometry and owns a matrix (and optionally a color) in the
/// instance data textures. [`prepare_draw`](Self::prepare_draw) culls and
/// sorts the instances and writes the multi-draw parameters.
///
/// Every fallible call validates before mutating, so an error leaves the
/// batch unchanged.
#[derive(Debug, Clone)]
pub struct BatchedMesh {
    material: Material,
    world_matrix: Mat4,
    batch_id: u32,
    arena: GeometryArena,
    instances: InstanceTable,
    textures: InstanceDataTextures,
    scheduler: CullSortScheduler,
}

impl BatchedMesh {
    /// Create an empty batch
    ///
    /// # Arguments
    ///
    /// * `max_instance_count` - Number of instance slots
    /// * `max_vertex_count` - Vertices in the shared attribute buffers
    /// * `max_index_count` - Indices in the shared index buffer
    /// * `material` - Material the batch draws with
    pub fn new(max_instance_count: usize, max_vertex_count: usize, max_index_count: usize, material: Material) -> Self {
        log::info!(
            "Creating batch: {} instances, {} vertices, {} indices",
            max_instance_count,
            max_vertex_count,
            max_index_count
        );
        Self {
            material,
            world_matrix: Mat4::identity(),
            batch_id: 0,
            arena: GeometryArena::new(max_vertex_count, max_index_count),
            instances: InstanceTable::new(max_instance_count),
            textures: InstanceDataTextures::new(max_instance_count),
            scheduler: CullSortScheduler::new(max_instance_count),
        }
    }

    /// Create a batch from configuration
    pub fn from_config(config: &BatchConfig) -> Self {
        let mut batch = Self::new(
            config.max_instance_count,
            config.max_vertex_count,
            config.resolved_max_index_count(),
            config.material.clone(),
        );
        batch.scheduler.per_object_frustum_culled = config.per_object_frustum_culled;
        batch.scheduler.sort_objects = config.sort_objects;
        batch
    }

    /// Set the id stamped on raycast hits
    #[must_use]
    pub fn with_batch_id(mut self, batch_id: u32) -> Self {
        self.batch_id = batch_id;
        self
    }

    /// Id stamped on raycast hits
    pub const fn batch_id(&self) -> u32 {
        self.batch_id
    }

    /// Material the batch draws with
    pub const fn material(&self) -> &Material {
        &self.material
    }

    /// Replace the material
    pub fn set_material(&mut self, material: Material) {
        if material.transparent != self.material.transparent {
            self.scheduler.invalidate();
        }
        self.material = material;
    }

    /// Batch world matrix
    pub const fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// Move the whole batch
    pub fn set_world_matrix(&mut self, world_matrix: Mat4) {
        self.world_matrix = world_matrix;
    }

    /// Whether instances are frustum culled every frame
    pub const fn per_object_frustum_culled(&self) -> bool {
        self.scheduler.per_object_frustum_culled
    }

    /// Toggle per-instance frustum culling
    pub fn set_per_object_frustum_culled(&mut self, enabled: bool) {
        self.scheduler.per_object_frustum_culled = enabled;
        self.scheduler.invalidate();
    }

    /// Whether instances are depth sorted every frame
    pub const fn sort_objects(&self) -> bool {
        self.scheduler.sort_objects
    }

    /// Toggle depth sorting
    pub fn set_sort_objects(&mut self, enabled: bool) {
        self.scheduler.sort_objects = enabled;
        self.scheduler.invalidate();
    }

    /// Install (or clear) an ordering that replaces the depth sort
    pub fn set_custom_sort(&mut self, custom_sort: Option<CustomSort>) {
        self.scheduler.set_custom_sort(custom_sort);
        self.scheduler.invalidate();
    }

    /// Instance capacity
    pub const fn max_instance_count(&self) -> usize {
        self.instances.max_instance_count()
    }

    /// Live instances
    pub fn instance_count(&self) -> usize {
        self.instances.instance_count()
    }

    /// Live geometries
    pub fn geometry_count(&self) -> usize {
        self.arena.geometry_count()
    }

    /// Vertices still available past the allocation cursor
    pub const fn unused_vertex_count(&self) -> usize {
        self.arena.unused_vertex_count()
    }

    /// Indices still available past the allocation cursor
    pub const fn unused_index_count(&self) -> usize {
        self.arena.unused_index_count()
    }

    /// Draws emitted by the last prepare pass
    pub const fn draw_count(&self) -> usize {
        self.scheduler.draw_list().draw_count()
    }

    /// Whether geometries carry indices
    pub const fn is_indexed(&self) -> bool {
        self.arena.is_indexed()
    }

    /// Shared geometry buffers
    pub const fn arena(&self) -> &GeometryArena {
        &self.arena
    }

    /// Instance records
    pub const fn instances(&self) -> &InstanceTable {
        &self.instances
    }

    /// Matrix, color and indirection textures
    pub const fn textures(&self) -> &InstanceDataTextures {
        &self.textures
    }

    /// Multi-draw parameters from the last prepare pass
    pub const fn draw_list(&self) -> &DrawList {
        self.scheduler.draw_list()
    }

    /// Copy a geometry into the shared buffers
    ///
    /// # Arguments
    ///
    /// * `geometry` - Source geometry; must match the batch's attribute layout
    /// * `reserved_vertex_count` - Vertices to set aside (defaults to the geometry's count)
    /// * `reserved_index_count` - Indices to set aside (defaults to the geometry's count)
    pub fn add_geometry(
        &mut self,
        geometry: &Geometry,
        reserved_vertex_count: Option<usize>,
        reserved_index_count: Option<usize>,
    ) -> BatchResult<GeometryId> {
        self.arena
            .register_geometry(geometry, reserved_vertex_count, reserved_index_count)
            .inspect_err(|err| log::warn!("add_geometry rejected: {}", err))
    }

    /// Replace a geometry's data within its existing reservation
    pub fn set_geometry_at(&mut self, geometry_id: GeometryId, geometry: &Geometry) -> BatchResult<GeometryId> {
        let id = self
            .arena
            .replace_geometry(geometry_id, geometry)
            .inspect_err(|err| log::warn!("set_geometry_at rejected: {}", err))?;
        self.scheduler.invalidate();
        Ok(id)
    }

    /// Delete a geometry together with every instance drawing it
    pub fn delete_geometry(&mut self, geometry_id: GeometryId) -> BatchResult<()> {
        self.instances.delete_geometry_cascade(geometry_id, &mut self.arena)?;
        self.scheduler.invalidate();
        Ok(())
    }

    /// Placement of a geometry in the shared buffers
    pub fn get_geometry_range_at(&self, geometry_id: GeometryId) -> BatchResult<GeometryRange> {
        self.arena.range_at(geometry_id)
    }

    /// Local-space bounding box of a geometry
    pub fn get_bounding_box_at(&mut self, geometry_id: GeometryId) -> BatchResult<Aabb> {
        self.arena.compute_bounding_box_at(geometry_id)
    }

    /// Local-space bounding sphere of a geometry
    pub fn get_bounding_sphere_at(&mut self, geometry_id: GeometryId) -> BatchResult<BoundingSphere> {
        self.arena.compute_bounding_sphere_at(geometry_id)
    }

    /// Create a visible instance of a geometry with identity matrix
    pub fn add_instance(&mut self, geometry_id: GeometryId) -> BatchResult<InstanceId> {
        let id = self
            .instances
            .add_instance(geometry_id, &self.arena, &mut self.textures)
            .inspect_err(|err| log::warn!("add_instance rejected: {}", err))?;
        self.scheduler.invalidate();
        Ok(id)
    }

    /// Delete an instance and recycle its id
    pub fn delete_instance(&mut self, instance_id: InstanceId) -> BatchResult<()> {
        self.instances.delete_instance(instance_id)?;
        self.scheduler.invalidate();
        Ok(())
    }

    /// Set an instance's local matrix
    pub fn set_matrix_at(&mut self, instance_id: InstanceId, matrix: &Mat4) -> BatchResult<()> {
        self.instances.validate(instance_id)?;
        self.textures.set_matrix_at(instance_id, matrix);
        Ok(())
    }

    /// Instance local matrix
    pub fn get_matrix_at(&self, instance_id: InstanceId) -> BatchResult<Mat4> {
        self.instances.validate(instance_id)?;
        Ok(self.textures.matrix_at(instance_id))
    }

    /// Set an instance's color
    pub fn set_color_at(&mut self, instance_id: InstanceId, color: Color) -> BatchResult<()> {
        self.instances.validate(instance_id)?;
        self.textures.set_color_at(instance_id, color);
        Ok(())
    }

    /// Instance color; white until a color is set
    pub fn get_color_at(&self, instance_id: InstanceId) -> BatchResult<Color> {
        self.instances.validate(instance_id)?;
        Ok(self.textures.color_at(instance_id))
    }

    /// Show or hide an instance
    pub fn set_visible_at(&mut self, instance_id: InstanceId, visible: bool) -> BatchResult<()> {
        if self.instances.set_visible_at(instance_id, visible)? {
            self.scheduler.invalidate();
        }
        Ok(())
    }

    /// Instance visibility
    pub fn get_visible_at(&self, instance_id: InstanceId) -> BatchResult<bool> {
        self.instances.visible_at(instance_id)
    }

    /// Rebind an instance to another geometry
    pub fn set_geometry_id_at(&mut self, instance_id: InstanceId, geometry_id: GeometryId) -> BatchResult<()> {
        self.instances.set_geometry_id_at(instance_id, geometry_id, &self.arena)?;
        self.scheduler.invalidate();
        Ok(())
    }

    /// Geometry an instance draws
    pub fn get_geometry_id_at(&self, instance_id: InstanceId) -> BatchResult<GeometryId> {
        self.instances.geometry_id_at(instance_id)
    }

    /// Local-space box around every live instance, `None` when empty
    pub fn compute_bounding_box(&mut self) -> BatchResult<Option<Aabb>> {
        let mut bounds = Aabb::empty();
        for (instance_id, geometry_id) in self.live_instances() {
            let local = self.arena.compute_bounding_box_at(geometry_id)?;
            bounds.union(&local.transformed(&self.textures.matrix_at(instance_id)));
        }
        Ok((!bounds.is_empty()).then_some(bounds))
    }

    /// Local-space sphere around every live instance, `None` when empty
    pub fn compute_bounding_sphere(&mut self) -> BatchResult<Option<BoundingSphere>> {
        let mut bounds = BoundingSphere::empty();
        for (instance_id, geometry_id) in self.live_instances() {
            let local = self.arena.compute_bounding_sphere_at(geometry_id)?;
            bounds.union(&local.transformed(&self.textures.matrix_at(instance_id)));
        }
        Ok((!bounds.is_empty()).then_some(bounds))
    }

    /// Pack live geometry reservations to the front of the shared buffers
    pub fn optimize(&mut self) -> usize {
        let moved = self.arena.optimize();
        self.scheduler.invalidate();
        moved
    }

    /// Change instance capacity
    ///
    /// Fails with a shrink violation while any live id is at or above the
    /// new capacity.
    pub fn set_instance_count(&mut self, max_instance_count: usize) -> BatchResult<()> {
        self.instances.resize_capacity(max_instance_count)?;
        self.textures.resize(max_instance_count);
        self.scheduler.resize(max_instance_count);
        Ok(())
    }

    /// Change vertex and index capacity of the shared buffers
    pub fn set_geometry_size(&mut self, max_vertex_count: usize, max_index_count: usize) -> BatchResult<()> {
        self.arena
            .resize(max_vertex_count, max_index_count)
            .inspect_err(|err| log::warn!("set_geometry_size rejected: {}", err))?;
        self.scheduler.invalidate();
        Ok(())
    }

    /// Cull, sort and emit the multi-draw list for `camera`
    ///
    /// Returns `false` when the previous list was reused unchanged.
    pub fn prepare_draw(&mut self, camera: &Camera) -> BatchResult<bool> {
        self.scheduler.prepare(
            &self.instances,
            &mut self.arena,
            &mut self.textures,
            &self.world_matrix,
            &self.material,
            camera,
        )
    }

    /// Same pass as [`prepare_draw`](Self::prepare_draw), driven by a shadow camera
    pub fn prepare_shadow_draw(&mut self, shadow_camera: &Camera) -> BatchResult<bool> {
        log::trace!("Preparing shadow draw");
        self.prepare_draw(shadow_camera)
    }

    /// Intersect `ray` (world space) with every visible instance
    ///
    /// Hits are appended to `hits` tagged with the instance and batch ids;
    /// the appended hits are ordered by distance.
    pub fn raycast(
        &mut self,
        ray: &Ray,
        intersector: &dyn RayIntersector,
        hits: &mut Vec<Intersection>,
    ) -> BatchResult<()> {
        let first_new = hits.len();
        let mut instance_hits = Vec::new();

        let candidates: Vec<(InstanceId, GeometryId)> = self
            .instances
            .iter()
            .filter(|(_, record)| record.visible)
            .map(|(id, record)| (id, record.geometry_id))
            .collect();

        for (instance_id, geometry_id) in candidates {
            self.arena.compute_bounding_sphere_at(geometry_id)?;
            let view = self.arena.geometry_view(geometry_id)?;
            let world = self.world_matrix * self.textures.matrix_at(instance_id);

            intersector.intersect(ray, &view, &world, &self.material, &mut instance_hits);
            hits.extend(instance_hits.drain(..).map(|hit| Intersection {
                instance_id: Some(instance_id),
                batch_id: Some(self.batch_id),
                ..hit
            }));
        }

        hits[first_new..].sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(())
    }

    /// Which owned buffers have pending uploads
    pub fn dirty_flags(&self) -> DirtyFlags {
        let mut flags = self.arena.dirty_flags();
        if self.textures.matrices().state().is_dirty() {
            flags |= DirtyFlags::MATRICES;
        }
        if self.textures.colors().is_some_and(|colors| colors.state().is_dirty()) {
            flags |= DirtyFlags::COLORS;
        }
        if self.textures.indirect().state().is_dirty() {
            flags |= DirtyFlags::INDIRECT;
        }
        if self.draw_list().state().is_dirty() {
            flags |= DirtyFlags::DRAW_LIST;
        }
        flags
    }

    /// Hand every pending buffer change to `sink`
    ///
    /// Order: attributes, index, matrices, colors, indirection, draw starts,
    /// draw counts.
    pub fn flush_uploads(&mut self, sink: &mut dyn UploadSink) {
        self.arena.flush_uploads(sink);

        if let Some(region) = self.textures.matrices_mut().take_dirty() {
            sink.upload(&BufferTarget::Matrices, self.textures.matrices().as_bytes(), 4, &region);
        }
        if let Some(region) = self.textures.colors_mut().and_then(|colors| colors.take_dirty()) {
            if let Some(colors) = self.textures.colors() {
                sink.upload(&BufferTarget::Colors, colors.as_bytes(), 4, &region);
            }
        }
        if let Some(region) = self.textures.indirect_mut().take_dirty() {
            sink.upload(&BufferTarget::Indirect, self.textures.indirect().as_bytes(), 4, &region);
        }
        if let Some(region) = self.scheduler.draw_list_mut().take_dirty() {
            let draw_list = self.scheduler.draw_list();
            sink.upload(&BufferTarget::DrawStarts, draw_list.starts_bytes(), 4, &region);
            sink.upload(&BufferTarget::DrawCounts, draw_list.counts_bytes(), 4, &region);
        }
    }

    fn live_instances(&self) -> Vec<(InstanceId, GeometryId)> {
        self.instances
            .iter()
            .map(|(id, record)| (id, record.geometry_id))
            .collect()
    }
}
