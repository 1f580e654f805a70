//! Per-frame culling, depth sorting and multi-draw list emission

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::{BatchResult, GeometryArena, InstanceDataTextures, InstanceId, InstanceTable};
use crate::foundation::math::{Mat4, Mat4Ext};
use crate::render::{BufferState, DirtyRegion, Material};
use crate::scene::{Camera, Frustum};

/// One surviving instance in the per-frame render list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderItem {
    /// First drawn element of the instance's geometry
    pub start: usize,
    /// Number of drawn elements
    pub count: usize,
    /// Signed depth along the camera's forward axis (batch-local space)
    pub z: f32,
    /// Instance being drawn
    pub instance_id: InstanceId,
}

/// Caller-supplied ordering that replaces the default depth sort
pub type CustomSort = Arc<dyn Fn(&mut Vec<RenderItem>, &Camera) + Send + Sync>;

/// Indirect draw parameters for one instance
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCommand {
    /// Offset of the first element in the index (or vertex) stream, in bytes
    pub byte_offset: u32,
    /// Number of elements to draw
    pub element_count: u32,
    /// Instance whose matrix and color the draw uses
    pub instance_id: u32,
}

/// Multi-draw starts/counts plus the parallel instance ids
///
/// Arrays are sized to the instance capacity; only the first
/// [`draw_count`](Self::draw_count) entries are meaningful.
#[derive(Debug, Clone)]
pub struct DrawList {
    starts: Vec<u32>,
    counts: Vec<u32>,
    instance_ids: Vec<u32>,
    draw_count: usize,
    state: BufferState,
}

impl DrawList {
    /// Allocate arrays for `capacity` draws
    pub fn new(capacity: usize) -> Self {
        Self {
            starts: vec![0; capacity],
            counts: vec![0; capacity],
            instance_ids: vec![0; capacity],
            draw_count: 0,
            state: BufferState::new_full(),
        }
    }

    /// Number of emitted draws
    pub const fn draw_count(&self) -> usize {
        self.draw_count
    }

    /// Byte offsets of the emitted draws
    pub fn starts(&self) -> &[u32] {
        &self.starts[..self.draw_count]
    }

    /// Element counts of the emitted draws
    pub fn counts(&self) -> &[u32] {
        &self.counts[..self.draw_count]
    }

    /// Instance ids in draw order
    pub fn instance_ids(&self) -> &[u32] {
        &self.instance_ids[..self.draw_count]
    }

    /// Emitted draws as packed commands
    pub fn commands(&self) -> impl Iterator<Item = DrawCommand> + '_ {
        (0..self.draw_count).map(|i| DrawCommand {
            byte_offset: self.starts[i],
            element_count: self.counts[i],
            instance_id: self.instance_ids[i],
        })
    }

    /// Raw bytes of the full starts array
    pub fn starts_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.starts)
    }

    /// Raw bytes of the full counts array
    pub fn counts_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.counts)
    }

    /// Upload bookkeeping shared by starts and counts
    pub const fn state(&self) -> &BufferState {
        &self.state
    }

    pub(crate) fn take_dirty(&mut self) -> Option<DirtyRegion> {
        self.state.take()
    }

    fn push(&mut self, byte_offset: usize, element_count: usize, instance_id: InstanceId) {
        let slot = self.draw_count;
        self.starts[slot] = byte_offset as u32;
        self.counts[slot] = element_count as u32;
        self.instance_ids[slot] = instance_id.0;
        self.draw_count += 1;
    }

    fn resize(&mut self, capacity: usize) {
        self.starts.resize(capacity, 0);
        self.counts.resize(capacity, 0);
        self.instance_ids.resize(capacity, 0);
        self.draw_count = self.draw_count.min(capacity);
        self.state.mark_all();
    }
}

/// Decides each frame which instances draw and in what order
#[derive(Clone)]
pub struct CullSortScheduler {
    /// Cull each instance's bounding sphere against the camera
    pub per_object_frustum_culled: bool,
    /// Depth-sort surviving instances
    pub sort_objects: bool,
    custom_sort: Option<CustomSort>,
    render_list: Vec<RenderItem>,
    frustums: Vec<Frustum>,
    draw_list: DrawList,
    visibility_changed: bool,
}

impl fmt::Debug for CullSortScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CullSortScheduler")
            .field("per_object_frustum_culled", &self.per_object_frustum_culled)
            .field("sort_objects", &self.sort_objects)
            .field("custom_sort", &self.custom_sort.is_some())
            .field("draw_count", &self.draw_list.draw_count)
            .field("visibility_changed", &self.visibility_changed)
            .finish_non_exhaustive()
    }
}

impl CullSortScheduler {
    /// Create a scheduler for `max_instance_count` draws
    pub fn new(max_instance_count: usize) -> Self {
        Self {
            per_object_frustum_culled: true,
            sort_objects: true,
            custom_sort: None,
            render_list: Vec::with_capacity(max_instance_count),
            frustums: Vec::new(),
            draw_list: DrawList::new(max_instance_count),
            visibility_changed: true,
        }
    }

    /// Last emitted draw list
    pub const fn draw_list(&self) -> &DrawList {
        &self.draw_list
    }

    pub(crate) fn draw_list_mut(&mut self) -> &mut DrawList {
        &mut self.draw_list
    }

    /// Replace (or clear) the custom ordering
    pub fn set_custom_sort(&mut self, custom_sort: Option<CustomSort>) {
        self.custom_sort = custom_sort;
    }

    /// Whether a custom ordering is installed
    pub const fn has_custom_sort(&self) -> bool {
        self.custom_sort.is_some()
    }

    /// Flag that the set of drawable instances changed
    pub fn invalidate(&mut self) {
        self.visibility_changed = true;
    }

    /// Whether the next [`prepare`](Self::prepare) must rebuild the list
    pub const fn needs_update(&self) -> bool {
        self.visibility_changed || self.per_object_frustum_culled || self.sort_objects
    }

    /// Resize draw arrays for a new instance capacity
    pub fn resize(&mut self, max_instance_count: usize) {
        self.draw_list.resize(max_instance_count);
        self.visibility_changed = true;
    }

    /// Rebuild the draw list for `camera`
    ///
    /// Returns `false` when the cached list was reused. The camera frustum
    /// is moved into batch-local space once; each instance's bounding
    /// sphere is moved by its own matrix only.
    pub fn prepare(
        &mut self,
        instances: &InstanceTable,
        arena: &mut GeometryArena,
        textures: &mut InstanceDataTextures,
        batch_world: &Mat4,
        material: &Material,
        camera: &Camera,
    ) -> BatchResult<bool> {
        if !self.needs_update() {
            return Ok(false);
        }

        let bytes_per_element = arena.bytes_per_draw_element();

        self.frustums.clear();
        if self.per_object_frustum_culled {
            self.frustums
                .extend(camera.culling_views().iter().map(|view| view.frustum_for(batch_world)));
        }

        let batch_inverse = batch_world.inverse_or_identity();
        let primary = camera.primary();
        let camera_position = batch_inverse.transform_point3(&primary.position());
        let camera_forward = batch_inverse.transform_direction(&primary.forward());

        self.render_list.clear();
        for (id, record) in instances.iter() {
            if !record.visible {
                continue;
            }
            let range = arena.range_at(record.geometry_id)?;

            if !self.per_object_frustum_culled && !self.sort_objects {
                self.render_list.push(RenderItem {
                    start: range.draw_start,
                    count: range.draw_count,
                    z: 0.0,
                    instance_id: id,
                });
                continue;
            }

            let sphere = arena
                .compute_bounding_sphere_at(record.geometry_id)?
                .transformed(&textures.matrix_at(id));
            if self.per_object_frustum_culled && !self.frustums.iter().any(|frustum| frustum.intersects_sphere(&sphere)) {
                log::trace!("Culled {}", id);
                continue;
            }

            self.render_list.push(RenderItem {
                start: range.draw_start,
                count: range.draw_count,
                z: (sphere.center - camera_position).dot(&camera_forward),
                instance_id: id,
            });
        }

        if self.sort_objects {
            match &self.custom_sort {
                Some(custom_sort) => custom_sort(&mut self.render_list, camera),
                None if material.transparent => self.render_list.sort_by(|a, b| compare_depth(b, a)),
                None => self.render_list.sort_by(compare_depth),
            }
        }

        self.draw_list.draw_count = 0;
        for item in self.render_list.iter().take(self.draw_list.starts.len()) {
            textures.set_indirect(self.draw_list.draw_count, item.instance_id);
            self.draw_list.push(item.start * bytes_per_element, item.count, item.instance_id);
        }
        let draw_count = self.draw_list.draw_count;
        self.draw_list.state.mark_range(0, draw_count);
        textures.mark_indirect_written(draw_count);
        self.visibility_changed = false;

        log::trace!("Prepared {} draws from {} instances", draw_count, instances.instance_count());
        Ok(true)
    }
}

fn compare_depth(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.z.partial_cmp(&b.z).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::geometry::box_geometry;
    use crate::scene::CameraView;

    struct Fixture {
        instances: InstanceTable,
        arena: GeometryArena,
        textures: InstanceDataTextures,
        scheduler: CullSortScheduler,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                instances: InstanceTable::new(8),
                arena: GeometryArena::new(200, 400),
                textures: InstanceDataTextures::new(8),
                scheduler: CullSortScheduler::new(8),
            }
        }

        fn cube_at(&mut self, position: Vec3) -> InstanceId {
            let existing = self.arena.slots().next().map(|(id, _)| id);
            let geometry = match existing {
                Some(id) => id,
                None => self.arena.register_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap(),
            };
            let id = self.instances.add_instance(geometry, &self.arena, &mut self.textures).unwrap();
            self.textures.set_matrix_at(id, &Mat4::new_translation(&position));
            id
        }

        fn prepare(&mut self, material: &Material) -> bool {
            let camera = Camera::from(CameraView::perspective(
                Vec3::zeros(),
                Vec3::new(0.0, 0.0, -1.0),
                Vec3::y(),
                60.0,
                1.0,
                0.1,
                100.0,
            ));
            self.scheduler
                .prepare(
                    &self.instances,
                    &mut self.arena,
                    &mut self.textures,
                    &Mat4::identity(),
                    material,
                    &camera,
                )
                .unwrap()
        }

        fn order(&self) -> Vec<u32> {
            self.scheduler.draw_list().instance_ids().to_vec()
        }
    }

    #[test]
    fn test_opaque_sorts_front_to_back() {
        let mut fx = Fixture::new();
        fx.cube_at(Vec3::new(0.0, 0.0, -30.0));
        fx.cube_at(Vec3::new(0.0, 0.0, -10.0));
        fx.cube_at(Vec3::new(0.0, 0.0, -20.0));

        assert!(fx.prepare(&Material::default()));
        assert_eq!(fx.order(), vec![1, 2, 0]);
        assert_eq!(&fx.textures.indirect().data()[..3], &[1, 2, 0]);
    }

    #[test]
    fn test_transparent_sorts_back_to_front() {
        let mut fx = Fixture::new();
        fx.cube_at(Vec3::new(0.0, 0.0, -30.0));
        fx.cube_at(Vec3::new(0.0, 0.0, -10.0));
        fx.cube_at(Vec3::new(0.0, 0.0, -20.0));

        fx.prepare(&Material::transparent("glass"));
        assert_eq!(fx.order(), vec![0, 2, 1]);
    }

    #[test]
    fn test_culling_excludes_instances_behind_camera() {
        let mut fx = Fixture::new();
        fx.cube_at(Vec3::new(0.0, 0.0, -10.0));
        fx.cube_at(Vec3::new(0.0, 0.0, 10.0));

        fx.prepare(&Material::default());
        assert_eq!(fx.order(), vec![0]);

        fx.scheduler.per_object_frustum_culled = false;
        fx.prepare(&Material::default());
        assert_eq!(fx.order(), vec![1, 0]);
    }

    #[test]
    fn test_hidden_instances_are_skipped() {
        let mut fx = Fixture::new();
        let a = fx.cube_at(Vec3::new(0.0, 0.0, -10.0));
        fx.cube_at(Vec3::new(0.0, 0.0, -12.0));
        fx.instances.set_visible_at(a, false).unwrap();

        fx.prepare(&Material::default());
        assert_eq!(fx.order(), vec![1]);
    }

    #[test]
    fn test_draw_starts_are_byte_offsets() {
        let mut fx = Fixture::new();
        let first = fx.arena.register_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
        let second = fx.arena.register_geometry(&box_geometry(2.0, 2.0, 2.0), None, None).unwrap();
        let a = fx.instances.add_instance(first, &fx.arena, &mut fx.textures).unwrap();
        let b = fx.instances.add_instance(second, &fx.arena, &mut fx.textures).unwrap();
        fx.textures.set_matrix_at(a, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0)));
        fx.textures.set_matrix_at(b, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -8.0)));

        fx.prepare(&Material::default());
        let commands: Vec<_> = fx.scheduler.draw_list().commands().collect();
        assert_eq!(
            commands,
            vec![
                DrawCommand { byte_offset: 0, element_count: 36, instance_id: 0 },
                DrawCommand { byte_offset: 72, element_count: 36, instance_id: 1 },
            ]
        );
    }

    #[test]
    fn test_unchanged_batch_reuses_cached_list() {
        let mut fx = Fixture::new();
        fx.cube_at(Vec3::new(0.0, 0.0, -10.0));
        fx.scheduler.per_object_frustum_culled = false;
        fx.scheduler.sort_objects = false;

        assert!(fx.prepare(&Material::default()));
        assert!(!fx.prepare(&Material::default()));

        fx.cube_at(Vec3::new(0.0, 0.0, -12.0));
        fx.scheduler.invalidate();
        assert!(fx.prepare(&Material::default()));
        assert_eq!(fx.order(), vec![0, 1]);
    }

    #[test]
    fn test_custom_sort_overrides_depth_order() {
        let mut fx = Fixture::new();
        fx.cube_at(Vec3::new(0.0, 0.0, -10.0));
        fx.cube_at(Vec3::new(0.0, 0.0, -20.0));
        fx.scheduler.set_custom_sort(Some(Arc::new(|list: &mut Vec<RenderItem>, _: &Camera| {
            list.sort_by(|a, b| b.instance_id.cmp(&a.instance_id));
        })));

        fx.prepare(&Material::transparent("glass"));
        assert_eq!(fx.order(), vec![1, 0]);
    }

    #[test]
    fn test_array_camera_draws_instance_visible_in_any_view() {
        let mut fx = Fixture::new();
        fx.cube_at(Vec3::new(0.0, 0.0, -10.0));
        fx.cube_at(Vec3::new(0.0, 0.0, 10.0));

        let forward = CameraView::perspective(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::y(), 60.0, 1.0, 0.1, 100.0);
        let backward = CameraView::perspective(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0), Vec3::y(), 60.0, 1.0, 0.1, 100.0);
        let camera = Camera::Array { rig: forward.clone(), views: vec![forward, backward] };

        fx.scheduler
            .prepare(&fx.instances, &mut fx.arena, &mut fx.textures, &Mat4::identity(), &Material::default(), &camera)
            .unwrap();
        assert_eq!(fx.order(), vec![1, 0]);
    }
}
