//! Procedural primitive geometry

use super::{BufferAttribute, Geometry, POSITION};
use crate::foundation::math::Vec3;

/// Face description: outward normal plus the two in-plane axes (u x v = normal)
const BOX_FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
    ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
    ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
    ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
    ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
];

/// Axis-aligned box centered at the origin
///
/// Each face gets its own four vertices so normals and UVs stay flat, giving
/// 24 vertices and 36 indices with `position`, `normal` and `uv` attributes.
/// Triangles wind counter-clockwise when viewed from outside.
pub fn box_geometry(width: f32, height: f32, depth: f32) -> Geometry {
    let half = Vec3::new(width * 0.5, height * 0.5, depth * 0.5);
    let corners = [(-1.0, -1.0, 0.0, 0.0), (1.0, -1.0, 1.0, 0.0), (1.0, 1.0, 1.0, 1.0), (-1.0, 1.0, 0.0, 1.0)];

    let mut positions = Vec::with_capacity(24 * 3);
    let mut normals = Vec::with_capacity(24 * 3);
    let mut uvs = Vec::with_capacity(24 * 2);
    let mut indices = Vec::with_capacity(36);

    for (face, (normal, u, v)) in BOX_FACES.iter().enumerate() {
        let normal = Vec3::from(*normal);
        let u = Vec3::from(*u);
        let v = Vec3::from(*v);
        let base = (face * 4) as u16;

        for (su, sv, tu, tv) in corners {
            let position = (normal + u * su + v * sv).component_mul(&half);
            positions.extend_from_slice(position.as_slice());
            normals.extend_from_slice(normal.as_slice());
            uvs.extend_from_slice(&[tu, tv]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    Geometry::new()
        .with_attribute(POSITION, BufferAttribute::from_f32(positions, 3))
        .with_attribute("normal", BufferAttribute::from_f32(normals, 3))
        .with_attribute("uv", BufferAttribute::from_f32(uvs, 2))
        .with_index(indices)
}
