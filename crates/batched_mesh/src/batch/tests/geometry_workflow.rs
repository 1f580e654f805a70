//! Geometry registration, replacement, compaction, resizing and raycasting through the batch API

use approx::assert_relative_eq;

use crate::batch::{BatchError, BatchedMesh, GeometryId, Resource};
use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::{box_geometry, AttributeArray, BufferAttribute, Geometry, POSITION};
use crate::raycast::{Ray, TriangleIntersector};
use crate::render::Material;
use crate::scene::{Camera, CameraView};

fn camera() -> Camera {
    Camera::from(CameraView::perspective(
        Vec3::zeros(),
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::y(),
        60.0,
        1.0,
        0.1,
        100.0,
    ))
}

fn layout_snapshot(batch: &BatchedMesh) -> (Vec<AttributeArray>, Option<Vec<u32>>, Vec<(GeometryId, usize, usize)>) {
    let arena = batch.arena();
    let attributes = arena.attributes().map(|(_, attribute)| attribute.array.clone()).collect();
    let index = arena.index().map(|index| index.array.iter().collect());
    let ranges = arena
        .slots()
        .map(|(id, slot)| (id, slot.range.vertex_start, slot.range.index_start))
        .collect();
    (attributes, index, ranges)
}

#[test]
fn test_optimize_is_idempotent() {
    let mut batch = BatchedMesh::new(8, 500, 1000, Material::default());
    let a = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), Some(30), Some(40)).unwrap();
    let b = batch.add_geometry(&box_geometry(2.0, 2.0, 2.0), None, None).unwrap();
    let c = batch.add_geometry(&box_geometry(3.0, 3.0, 3.0), Some(24), Some(48)).unwrap();
    batch.delete_geometry(b).unwrap();

    batch.optimize();
    let first = layout_snapshot(&batch);
    batch.optimize();
    assert_eq!(layout_snapshot(&batch), first);

    let ra = batch.get_geometry_range_at(a).unwrap();
    let rc = batch.get_geometry_range_at(c).unwrap();
    assert_eq!(rc.vertex_start, ra.vertex_start + 30);
    assert_eq!(rc.index_start, ra.index_start + 40);
    assert_eq!(batch.unused_vertex_count(), 500 - 54);
    assert_eq!(batch.unused_index_count(), 1000 - 88);
}

#[test]
fn test_optimize_keeps_geometry_drawable() {
    let mut batch = BatchedMesh::new(8, 500, 1000, Material::default());
    let a = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    let b = batch.add_geometry(&box_geometry(2.0, 2.0, 2.0), None, None).unwrap();
    let instance = batch.add_instance(b).unwrap();
    batch.set_matrix_at(instance, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -10.0))).unwrap();
    let before = batch.get_bounding_box_at(b).unwrap();

    batch.delete_geometry(a).unwrap();
    batch.optimize();

    let range = batch.get_geometry_range_at(b).unwrap();
    assert_eq!((range.vertex_start, range.index_start), (0, 0));
    let first_index = batch.arena().index().unwrap().array.get(0).unwrap();
    assert!(first_index < 24);
    assert_eq!(batch.get_bounding_box_at(b).unwrap(), before);

    batch.prepare_draw(&camera()).unwrap();
    assert_eq!(batch.draw_list().starts(), &[0]);
}

#[test]
fn test_recycled_geometry_id_gets_fresh_space() {
    let mut batch = BatchedMesh::new(8, 80, 200, Material::default());
    let a = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    batch.delete_geometry(a).unwrap();

    let reused = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    assert_eq!(reused, a);
    assert_eq!(batch.get_geometry_range_at(reused).unwrap().vertex_start, 48);
    assert_eq!(batch.unused_vertex_count(), 8);

    // The freed region only comes back after compaction
    assert!(matches!(
        batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None),
        Err(BatchError::CapacityExceeded { resource: Resource::Vertices, .. })
    ));
    batch.optimize();
    assert_eq!(batch.unused_vertex_count(), 32);
    assert!(batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).is_ok());
}

#[test]
fn test_set_geometry_at_within_reservation() {
    let mut batch = BatchedMesh::new(4, 200, 200, Material::default());
    let flat = Geometry::new()
        .with_attribute(POSITION, BufferAttribute::from_f32(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], 3))
        .with_index(vec![0u32, 1, 2]);
    let id = batch.add_geometry(&flat, Some(8), Some(12)).unwrap();

    let quad = Geometry::new()
        .with_attribute(
            POSITION,
            BufferAttribute::from_f32(vec![0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 3.0, 3.0, 0.0, 0.0, 3.0, 0.0], 3),
        )
        .with_index(vec![0u32, 1, 2, 0, 2, 3]);
    assert_eq!(batch.set_geometry_at(id, &quad), Ok(id));

    let range = batch.get_geometry_range_at(id).unwrap();
    assert_eq!((range.vertex_count, range.index_count, range.draw_count), (4, 6, 6));
    assert_relative_eq!(batch.get_bounding_box_at(id).unwrap().max, Vec3::new(3.0, 3.0, 0.0));

    let nine = Geometry::new()
        .with_attribute(POSITION, BufferAttribute::from_f32(vec![0.0; 27], 3))
        .with_index(vec![0u32, 1, 2]);
    assert!(matches!(
        batch.set_geometry_at(id, &nine),
        Err(BatchError::CapacityExceeded { resource: Resource::Vertices, requested: 9, available: 8 })
    ));
    assert_eq!(batch.get_geometry_range_at(id).unwrap().vertex_count, 4);
}

#[test]
fn test_set_geometry_size_grows_and_guards_live_data() {
    let mut batch = BatchedMesh::new(4, 30, 40, Material::default());
    let first = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    assert!(batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).is_err());

    batch.set_geometry_size(60, 80).unwrap();
    let second = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    assert_eq!(batch.get_geometry_range_at(second).unwrap().vertex_start, 24);
    assert_eq!(batch.get_geometry_range_at(first).unwrap().vertex_count, 24);

    assert_eq!(
        batch.set_geometry_size(47, 80),
        Err(BatchError::ShrinkViolation { resource: Resource::Vertices, requested: 47, required: 48 })
    );
    assert_eq!(batch.arena().max_vertex_count(), 60);
}

#[test]
fn test_non_indexed_batch_draws_vertex_ranges() {
    let mut batch = BatchedMesh::new(4, 200, 0, Material::default());
    let flat = box_geometry(1.0, 1.0, 1.0).to_non_indexed();
    let a = batch.add_geometry(&flat, None, None).unwrap();
    let b = batch.add_geometry(&flat, None, None).unwrap();
    assert!(!batch.is_indexed());
    assert_eq!(batch.unused_index_count(), 0);

    let near = batch.add_instance(b).unwrap();
    let far = batch.add_instance(a).unwrap();
    batch.set_matrix_at(near, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -4.0))).unwrap();
    batch.set_matrix_at(far, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -8.0))).unwrap();

    batch.prepare_draw(&camera()).unwrap();
    assert_eq!(batch.draw_list().starts(), &[36, 0]);
    assert_eq!(batch.draw_list().counts(), &[36, 36]);
}

#[test]
fn test_incompatible_geometry_leaves_batch_unchanged() {
    let mut batch = BatchedMesh::new(4, 200, 400, Material::default());
    batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    let unused = batch.unused_vertex_count();

    let mut gpu_only = box_geometry(1.0, 1.0, 1.0);
    gpu_only.set_attribute(
        "normal",
        BufferAttribute::GpuOpaque { item_size: 3, normalized: false, count: 24 },
    );
    assert!(matches!(
        batch.add_geometry(&gpu_only, None, None),
        Err(BatchError::UnsupportedFeature(_))
    ));

    let mut normalized_uv = box_geometry(1.0, 1.0, 1.0);
    normalized_uv.set_attribute(
        "uv",
        BufferAttribute::new(AttributeArray::U16(vec![0; 48]), 2, true),
    );
    assert!(matches!(
        batch.add_geometry(&normalized_uv, None, None),
        Err(BatchError::SchemaMismatch { .. })
    ));

    assert_eq!(batch.geometry_count(), 1);
    assert_eq!(batch.unused_vertex_count(), unused);
}

#[test]
fn test_raycast_tags_and_orders_hits() {
    let mut batch = BatchedMesh::new(4, 200, 400, Material::default()).with_batch_id(7);
    let cube = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    let far = batch.add_instance(cube).unwrap();
    let near = batch.add_instance(cube).unwrap();
    let hidden = batch.add_instance(cube).unwrap();
    batch.set_matrix_at(far, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -10.0))).unwrap();
    batch.set_matrix_at(near, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0))).unwrap();
    batch.set_matrix_at(hidden, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -2.0))).unwrap();
    batch.set_visible_at(hidden, false).unwrap();

    let ray = Ray::new(Vec3::new(0.1, 0.2, 0.0), Vec3::new(0.0, 0.0, -1.0));
    let mut hits = Vec::new();
    batch.raycast(&ray, &TriangleIntersector, &mut hits).unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].instance_id, Some(near));
    assert_eq!(hits[1].instance_id, Some(far));
    assert!(hits.iter().all(|hit| hit.batch_id == Some(7)));
    assert_relative_eq!(hits[0].distance, 4.5, epsilon = 1e-5);
    assert_relative_eq!(hits[1].point, Vec3::new(0.1, 0.2, -9.5), epsilon = 1e-5);
}
