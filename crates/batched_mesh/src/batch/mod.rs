//! Batched mesh: shared geometry arena, instance table, instance data
//! textures and the per-frame cull/sort scheduler

pub mod batched_mesh;
pub mod error;
pub mod geometry_arena;
pub mod instance_table;
pub mod instance_textures;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use batched_mesh::BatchedMesh;
pub use error::{BatchError, BatchResult, GeometryId, IdKind, InstanceId, Resource};
pub use geometry_arena::{ArenaAttribute, ArenaIndex, GeometryArena, GeometryRange, GeometrySlot};
pub use instance_table::{InstanceRecord, InstanceTable};
pub use instance_textures::{
    instance_texture_side, matrix_texture_side, DataTexture, InstanceDataTextures, MATRIX_STRIDE_BYTES,
    MATRIX_TEXELS_PER_INSTANCE, TEXEL_CHANNELS,
};
pub use scheduler::{CullSortScheduler, CustomSort, DrawCommand, DrawList, RenderItem};
