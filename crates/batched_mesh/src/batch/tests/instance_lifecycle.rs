//! Instance id recycling, per-instance data and visibility through the batch API

use approx::assert_relative_eq;

use crate::batch::{BatchedMesh, GeometryId, InstanceId};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::geometry::box_geometry;
use crate::render::{Color, Material};
use crate::scene::{Camera, CameraView};

fn batch_with_cube(max_instances: usize) -> (BatchedMesh, GeometryId) {
    let mut batch = BatchedMesh::new(max_instances, 1000, 2000, Material::default());
    let cube = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    (batch, cube)
}

fn sample_matrix(seed: f32) -> Mat4 {
    Transform::from_position_rotation(
        Vec3::new(seed, -2.0 * seed, 0.5 + seed),
        Quat::from_axis_angle(&Vec3::y_axis(), 0.3 * seed),
    )
    .with_uniform_scale(1.0 + seed * 0.1)
    .to_matrix()
}

#[test]
fn test_ids_are_unique_and_lowest_free_first() {
    let (mut batch, cube) = batch_with_cube(16);
    let ids: Vec<_> = (0..8).map(|_| batch.add_instance(cube).unwrap()).collect();
    assert_eq!(ids, (0..8).map(InstanceId).collect::<Vec<_>>());

    for id in [ids[6], ids[2], ids[4]] {
        batch.delete_instance(id).unwrap();
    }
    assert_eq!(batch.add_instance(cube).unwrap(), InstanceId(2));
    assert_eq!(batch.add_instance(cube).unwrap(), InstanceId(4));
    assert_eq!(batch.add_instance(cube).unwrap(), InstanceId(6));
    assert_eq!(batch.add_instance(cube).unwrap(), InstanceId(8));

    let live: Vec<_> = batch.instances().iter().map(|(id, _)| id).collect();
    let mut deduped = live.clone();
    deduped.dedup();
    assert_eq!(live, deduped);
    assert_eq!(batch.instance_count(), 9);
}

#[test]
fn test_matrix_round_trip_survives_resize() {
    let (mut batch, cube) = batch_with_cube(4);
    let ids: Vec<_> = (0..3).map(|_| batch.add_instance(cube).unwrap()).collect();
    for (i, id) in ids.iter().enumerate() {
        batch.set_matrix_at(*id, &sample_matrix(i as f32 + 1.0)).unwrap();
    }

    batch.set_instance_count(64).unwrap();
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(batch.get_matrix_at(*id).unwrap(), sample_matrix(i as f32 + 1.0));
    }

    batch.set_instance_count(3).unwrap();
    assert_eq!(batch.get_matrix_at(ids[2]).unwrap(), sample_matrix(3.0));
}

#[test]
fn test_recycled_id_starts_fresh() {
    let (mut batch, cube) = batch_with_cube(4);
    let id = batch.add_instance(cube).unwrap();
    batch.set_matrix_at(id, &sample_matrix(2.0)).unwrap();
    batch.set_color_at(id, Color::rgb(1.0, 0.0, 0.0)).unwrap();
    batch.set_visible_at(id, false).unwrap();
    batch.delete_instance(id).unwrap();

    // Stale data stays in the textures until the id is reissued
    assert_eq!(batch.textures().matrix_at(id), sample_matrix(2.0));

    let reused = batch.add_instance(cube).unwrap();
    assert_eq!(reused, id);
    assert_eq!(batch.get_matrix_at(reused).unwrap(), Mat4::identity());
    assert_eq!(batch.get_color_at(reused).unwrap(), Color::WHITE);
    assert_eq!(batch.get_visible_at(reused), Ok(true));
}

#[test]
fn test_colors_are_allocated_on_first_use() {
    let (mut batch, cube) = batch_with_cube(4);
    let a = batch.add_instance(cube).unwrap();
    let b = batch.add_instance(cube).unwrap();
    assert!(batch.textures().colors().is_none());
    assert_eq!(batch.get_color_at(a).unwrap(), Color::WHITE);

    batch.set_color_at(a, Color::new(0.2, 0.4, 0.6, 0.8)).unwrap();
    let color = batch.get_color_at(a).unwrap();
    assert_relative_eq!(color.g, 0.4);
    assert_relative_eq!(color.a, 0.8);
    assert_eq!(batch.get_color_at(b).unwrap(), Color::WHITE);
}

#[test]
fn test_visibility_and_rebinding_drive_the_draw_list() {
    let mut batch = BatchedMesh::new(4, 1000, 2000, Material::default());
    let small = batch.add_geometry(&box_geometry(1.0, 1.0, 1.0), None, None).unwrap();
    let large = batch.add_geometry(&box_geometry(2.0, 2.0, 2.0), None, None).unwrap();
    let a = batch.add_instance(small).unwrap();
    let b = batch.add_instance(small).unwrap();
    batch.set_matrix_at(a, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0))).unwrap();
    batch.set_matrix_at(b, &Mat4::new_translation(&Vec3::new(0.0, 0.0, -9.0))).unwrap();
    batch.set_per_object_frustum_culled(false);
    batch.set_sort_objects(false);

    let camera = Camera::from(CameraView::perspective(
        Vec3::zeros(),
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::y(),
        60.0,
        1.0,
        0.1,
        100.0,
    ));

    assert!(batch.prepare_draw(&camera).unwrap());
    assert_eq!(batch.draw_count(), 2);
    assert!(!batch.prepare_draw(&camera).unwrap());

    batch.set_visible_at(a, false).unwrap();
    assert!(batch.prepare_draw(&camera).unwrap());
    assert_eq!(batch.draw_list().instance_ids(), &[b.0]);

    batch.set_geometry_id_at(b, large).unwrap();
    assert!(batch.prepare_draw(&camera).unwrap());
    let index_start = batch.get_geometry_range_at(large).unwrap().index_start;
    assert_eq!(batch.draw_list().starts(), &[(index_start * 2) as u32]);
    assert_eq!(batch.get_geometry_id_at(b), Ok(large));
}
