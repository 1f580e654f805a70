//! Per-instance data packed into square GPU textures
//!
//! Every texture is a flat row-major buffer of RGBA texels. Instance `i`
//! owns floats `[i * 16, i * 16 + 16)` of the matrix texture (column-major
//! 4x4), floats `[i * 4, i * 4 + 4)` of the color texture and element `i` of
//! the indirection texture. The 2D side length only matters to the sampler;
//! resizing copies the overlapping linear prefix.

use bytemuck::Pod;

use super::InstanceId;
use crate::foundation::math::{Mat4, Mat4Ext, MAT4_FLOATS};
use crate::render::{BufferState, Color, DirtyRegion};

/// Texels per instance in the matrix texture
pub const MATRIX_TEXELS_PER_INSTANCE: usize = 4;

/// Channels per texel (RGBA)
pub const TEXEL_CHANNELS: usize = 4;

/// Bytes between consecutive instances in the matrix texture
pub const MATRIX_STRIDE_BYTES: usize = MAT4_FLOATS * std::mem::size_of::<f32>();

/// Side of the matrix texture for `max_instance_count` instances
///
/// Rounded up to a multiple of four so every row holds whole matrices.
pub fn matrix_texture_side(max_instance_count: usize) -> usize {
    let texels = (max_instance_count * MATRIX_TEXELS_PER_INSTANCE) as f64;
    let side = (texels.sqrt() / 4.0).ceil() as usize * 4;
    side.max(4)
}

/// Side of the one-texel-per-instance textures (colors, indirection)
pub fn instance_texture_side(max_instance_count: usize) -> usize {
    ((max_instance_count as f64).sqrt().ceil() as usize).max(1)
}

/// Square texture backed by a flat buffer
#[derive(Debug, Clone)]
pub struct DataTexture<T> {
    side: usize,
    channels: usize,
    data: Vec<T>,
    state: BufferState,
}

impl<T: Pod> DataTexture<T> {
    /// Allocate a `side` x `side` texture filled with `fill`
    pub fn new(side: usize, channels: usize, fill: T) -> Self {
        Self {
            side,
            channels,
            data: vec![fill; side * side * channels],
            state: BufferState::new_full(),
        }
    }

    /// Texture width and height in texels
    pub const fn side(&self) -> usize {
        self.side
    }

    /// Components per texel
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Flat texel data
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Flat texel data as bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Upload bookkeeping
    pub const fn state(&self) -> &BufferState {
        &self.state
    }

    fn write(&mut self, offset: usize, values: &[T]) {
        self.data[offset..offset + values.len()].copy_from_slice(values);
        self.state.mark_range(offset, values.len());
    }

    fn read(&self, offset: usize, len: usize) -> &[T] {
        &self.data[offset..offset + len]
    }

    fn resized(&self, side: usize, fill: T) -> Self {
        let mut resized = Self::new(side, self.channels, fill);
        let len = resized.data.len().min(self.data.len());
        resized.data[..len].copy_from_slice(&self.data[..len]);
        resized
    }

    pub(crate) fn take_dirty(&mut self) -> Option<DirtyRegion> {
        self.state.take()
    }
}

/// Matrix, color and indirection textures for one batch
#[derive(Debug, Clone)]
pub struct InstanceDataTextures {
    max_instance_count: usize,
    matrices: DataTexture<f32>,
    colors: Option<DataTexture<f32>>,
    indirect: DataTexture<u32>,
}

impl InstanceDataTextures {
    /// Allocate textures for `max_instance_count` instances
    ///
    /// The color texture is created on the first [`set_color_at`](Self::set_color_at).
    pub fn new(max_instance_count: usize) -> Self {
        log::debug!(
            "Allocating instance textures for {} instances (matrix side {}, indirect side {})",
            max_instance_count,
            matrix_texture_side(max_instance_count),
            instance_texture_side(max_instance_count)
        );
        Self {
            max_instance_count,
            matrices: DataTexture::new(matrix_texture_side(max_instance_count), TEXEL_CHANNELS, 0.0),
            colors: None,
            indirect: DataTexture::new(instance_texture_side(max_instance_count), 1, 0),
        }
    }

    /// Instance capacity the textures are sized for
    pub const fn max_instance_count(&self) -> usize {
        self.max_instance_count
    }

    /// Float offset of an instance's matrix
    pub const fn matrix_offset(id: InstanceId) -> usize {
        id.index() * MAT4_FLOATS
    }

    /// Float offset of an instance's color
    pub const fn color_offset(id: InstanceId) -> usize {
        id.index() * TEXEL_CHANNELS
    }

    /// Store an instance matrix
    pub fn set_matrix_at(&mut self, id: InstanceId, matrix: &Mat4) {
        self.matrices.write(Self::matrix_offset(id), matrix.as_slice());
    }

    /// Read an instance matrix
    pub fn matrix_at(&self, id: InstanceId) -> Mat4 {
        Mat4::from_packed(self.matrices.read(Self::matrix_offset(id), MAT4_FLOATS))
            .unwrap_or_else(Mat4::identity)
    }

    /// Store an instance color, creating the color texture on first use
    pub fn set_color_at(&mut self, id: InstanceId, color: Color) {
        let max_instance_count = self.max_instance_count;
        let colors = self.colors.get_or_insert_with(|| {
            log::debug!("Allocating instance color texture");
            DataTexture::new(instance_texture_side(max_instance_count), TEXEL_CHANNELS, 1.0)
        });
        colors.write(Self::color_offset(id), &color.to_array());
    }

    /// Read an instance color; white when no color was ever set
    pub fn color_at(&self, id: InstanceId) -> Color {
        self.colors
            .as_ref()
            .and_then(|colors| Color::from_slice(colors.read(Self::color_offset(id), TEXEL_CHANNELS)))
            .unwrap_or(Color::WHITE)
    }

    /// Reset a (re)created instance to identity transform and white
    pub fn reset_instance(&mut self, id: InstanceId) {
        self.set_matrix_at(id, &Mat4::identity());
        if self.colors.is_some() {
            self.set_color_at(id, Color::WHITE);
        }
    }

    /// Write draw slot `slot` of the indirection texture
    pub fn set_indirect(&mut self, slot: usize, id: InstanceId) {
        self.indirect.data[slot] = id.0;
    }

    /// Flag the first `count` indirection entries for upload
    pub fn mark_indirect_written(&mut self, count: usize) {
        self.indirect.state.mark_range(0, count);
    }

    /// Reallocate for a new capacity, keeping the overlapping prefix
    pub fn resize(&mut self, max_instance_count: usize) {
        log::debug!("Resizing instance textures {} -> {}", self.max_instance_count, max_instance_count);
        self.matrices = self.matrices.resized(matrix_texture_side(max_instance_count), 0.0);
        self.colors = self
            .colors
            .as_ref()
            .map(|colors| colors.resized(instance_texture_side(max_instance_count), 1.0));
        self.indirect = self.indirect.resized(instance_texture_side(max_instance_count), 0);
        self.max_instance_count = max_instance_count;
    }

    /// Matrix texture
    pub const fn matrices(&self) -> &DataTexture<f32> {
        &self.matrices
    }

    /// Color texture, if any color was ever set
    pub const fn colors(&self) -> Option<&DataTexture<f32>> {
        self.colors.as_ref()
    }

    /// Indirection texture
    pub const fn indirect(&self) -> &DataTexture<u32> {
        &self.indirect
    }

    pub(crate) fn matrices_mut(&mut self) -> &mut DataTexture<f32> {
        &mut self.matrices
    }

    pub(crate) fn colors_mut(&mut self) -> Option<&mut DataTexture<f32>> {
        self.colors.as_mut()
    }

    pub(crate) fn indirect_mut(&mut self) -> &mut DataTexture<u32> {
        &mut self.indirect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_texture_sides() {
        assert_eq!(matrix_texture_side(1), 4);
        assert_eq!(matrix_texture_side(10), 8);
        assert_eq!(matrix_texture_side(100), 20);
        assert_eq!(instance_texture_side(10), 4);
        assert_eq!(instance_texture_side(16), 4);
        assert_eq!(instance_texture_side(17), 5);
        assert_eq!(instance_texture_side(0), 1);

        for n in [1, 7, 10, 64, 1000] {
            let side = matrix_texture_side(n);
            assert!(side * side >= n * MATRIX_TEXELS_PER_INSTANCE);
            assert_eq!(side % 4, 0);
        }
    }

    #[test]
    fn test_matrix_layout_is_flat_column_major() {
        let mut textures = InstanceDataTextures::new(10);
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        textures.set_matrix_at(InstanceId(3), &m);

        let data = textures.matrices().data();
        assert_eq!(&data[48..64], m.as_slice());
        assert_eq!(data[48 + 12], 1.0);
        assert_eq!(textures.matrix_at(InstanceId(3)), m);
    }

    #[test]
    fn test_colors_are_lazy_and_default_white() {
        let mut textures = InstanceDataTextures::new(4);
        assert!(textures.colors().is_none());
        assert_eq!(textures.color_at(InstanceId(2)), Color::WHITE);

        textures.set_color_at(InstanceId(1), Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(textures.color_at(InstanceId(1)), Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(textures.color_at(InstanceId(0)), Color::WHITE);
    }

    #[test]
    fn test_resize_keeps_overlapping_prefix() {
        let mut textures = InstanceDataTextures::new(4);
        let m = Mat4::new_translation(&Vec3::new(9.0, 8.0, 7.0));
        textures.set_matrix_at(InstanceId(3), &m);
        textures.set_color_at(InstanceId(3), Color::rgb(0.0, 1.0, 0.0));

        textures.resize(100);
        assert_eq!(textures.matrix_at(InstanceId(3)), m);
        assert_eq!(textures.color_at(InstanceId(3)), Color::rgb(0.0, 1.0, 0.0));
        assert_eq!(textures.color_at(InstanceId(99)), Color::WHITE);
        assert_eq!(textures.matrices().side(), matrix_texture_side(100));
    }

    #[test]
    fn test_reset_instance() {
        let mut textures = InstanceDataTextures::new(4);
        textures.set_matrix_at(InstanceId(0), &Mat4::new_scaling(3.0));
        textures.set_color_at(InstanceId(0), Color::rgb(0.0, 0.0, 1.0));
        textures.reset_instance(InstanceId(0));
        assert_eq!(textures.matrix_at(InstanceId(0)), Mat4::identity());
        assert_eq!(textures.color_at(InstanceId(0)), Color::WHITE);
    }
}
