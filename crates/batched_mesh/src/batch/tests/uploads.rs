//! Dirty tracking and upload flushing across every batch-owned buffer

use crate::batch::{BatchedMesh, InstanceId};
use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::box_geometry;
use crate::render::{BufferTarget, Color, DirtyFlags, DirtyRegion, Material, UpdateRange, UploadLog};
use crate::scene::{Camera, CameraView};

fn flushed_batch() -> BatchedMesh {
    let mut batch = BatchedMesh::new(4, 100, 200, Material::default());
    let cube = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    batch.add_instance(cube).unwrap();
    batch.add_instance(cube).unwrap();
    batch.flush_uploads(&mut UploadLog::new());
    batch
}

#[test]
fn test_first_flush_uploads_everything_in_order() {
    let mut batch = BatchedMesh::new(4, 100, 200, Material::default());
    let cube = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    batch.add_instance(cube).unwrap();
    assert!(batch.dirty_flags().contains(DirtyFlags::GEOMETRY | DirtyFlags::MATRICES | DirtyFlags::DRAW_LIST));
    assert!(!batch.dirty_flags().contains(DirtyFlags::COLORS));

    let mut log = UploadLog::new();
    batch.flush_uploads(&mut log);

    let targets: Vec<_> = log.records.iter().map(|record| record.target.clone()).collect();
    assert_eq!(
        targets,
        vec![
            BufferTarget::Attribute("normal".to_string()),
            BufferTarget::Attribute("position".to_string()),
            BufferTarget::Attribute("uv".to_string()),
            BufferTarget::Index,
            BufferTarget::Matrices,
            BufferTarget::Indirect,
            BufferTarget::DrawStarts,
            BufferTarget::DrawCounts,
        ]
    );
    assert!(log.records.iter().all(|record| record.region == DirtyRegion::Full));
    assert_eq!(log.find(&BufferTarget::Index).unwrap().uploaded_bytes, 400);
    assert!(batch.dirty_flags().is_empty());
}

#[test]
fn test_matrix_edit_uploads_one_instance() {
    let mut batch = flushed_batch();
    batch.set_matrix_at(InstanceId(1), &Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0))).unwrap();
    assert_eq!(batch.dirty_flags(), DirtyFlags::MATRICES);

    let mut log = UploadLog::new();
    batch.flush_uploads(&mut log);
    assert_eq!(log.records.len(), 1);
    let record = &log.records[0];
    assert_eq!(record.target, BufferTarget::Matrices);
    assert_eq!(record.region, DirtyRegion::Ranges(vec![UpdateRange { start: 16, count: 16 }]));
    assert_eq!(record.uploaded_bytes, 64);
}

#[test]
fn test_first_color_uploads_whole_texture() {
    let mut batch = flushed_batch();
    batch.set_color_at(InstanceId(0), Color::rgb(0.5, 0.5, 0.5)).unwrap();
    assert_eq!(batch.dirty_flags(), DirtyFlags::COLORS);

    let mut log = UploadLog::new();
    batch.flush_uploads(&mut log);
    assert_eq!(log.find(&BufferTarget::Colors).unwrap().region, DirtyRegion::Full);

    batch.set_color_at(InstanceId(1), Color::WHITE).unwrap();
    let mut log = UploadLog::new();
    batch.flush_uploads(&mut log);
    assert_eq!(
        log.find(&BufferTarget::Colors).unwrap().region,
        DirtyRegion::Ranges(vec![UpdateRange { start: 4, count: 4 }])
    );
}

#[test]
fn test_prepare_marks_emitted_draws() {
    let mut batch = flushed_batch();
    batch.set_per_object_frustum_culled(false);
    let camera = Camera::from(CameraView::perspective(
        Vec3::new(0.0, 0.0, 5.0),
        Vec3::zeros(),
        Vec3::y(),
        60.0,
        1.0,
        0.1,
        100.0,
    ));
    batch.prepare_draw(&camera).unwrap();
    assert_eq!(batch.dirty_flags(), DirtyFlags::INDIRECT | DirtyFlags::DRAW_LIST);

    let mut log = UploadLog::new();
    batch.flush_uploads(&mut log);
    let emitted = DirtyRegion::Ranges(vec![UpdateRange { start: 0, count: 2 }]);
    assert_eq!(log.find(&BufferTarget::Indirect).unwrap().region, emitted);
    assert_eq!(log.find(&BufferTarget::DrawStarts).unwrap().region, emitted);
    assert_eq!(log.find(&BufferTarget::DrawCounts).unwrap().uploaded_bytes, 8);
}

#[test]
fn test_geometry_resize_reuploads_arena() {
    let mut batch = flushed_batch();
    batch.set_geometry_size(150, 300).unwrap();
    assert_eq!(batch.dirty_flags(), DirtyFlags::GEOMETRY);

    let mut log = UploadLog::new();
    batch.flush_uploads(&mut log);
    assert_eq!(
        log.find(&BufferTarget::Attribute("position".to_string())).unwrap().uploaded_bytes,
        150 * 3 * 4
    );
}
