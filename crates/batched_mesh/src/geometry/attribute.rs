//! Typed vertex attribute storage
//!
//! Attribute data keeps its source component type so the batch can allocate
//! shared arrays of the same type and copy without conversion.

use std::ops::Range;

/// Component type of an attribute array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// 32-bit float
    F32,
    /// 32-bit unsigned integer
    U32,
    /// 16-bit unsigned integer
    U16,
    /// 8-bit unsigned integer
    U8,
    /// 32-bit signed integer
    I32,
    /// 16-bit signed integer
    I16,
    /// 8-bit signed integer
    I8,
}

impl ComponentType {
    /// Size of one component in bytes
    pub const fn bytes(self) -> usize {
        match self {
            Self::F32 | Self::U32 | Self::I32 => 4,
            Self::U16 | Self::I16 => 2,
            Self::U8 | Self::I8 => 1,
        }
    }
}

/// Flat array of attribute components
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeArray {
    /// 32-bit floats
    F32(Vec<f32>),
    /// 32-bit unsigned integers
    U32(Vec<u32>),
    /// 16-bit unsigned integers
    U16(Vec<u16>),
    /// 8-bit unsigned integers
    U8(Vec<u8>),
    /// 32-bit signed integers
    I32(Vec<i32>),
    /// 16-bit signed integers
    I16(Vec<i16>),
    /// 8-bit signed integers
    I8(Vec<i8>),
}

macro_rules! with_array {
    ($array:expr, $data:ident => $body:expr) => {
        match $array {
            AttributeArray::F32($data) => $body,
            AttributeArray::U32($data) => $body,
            AttributeArray::U16($data) => $body,
            AttributeArray::U8($data) => $body,
            AttributeArray::I32($data) => $body,
            AttributeArray::I16($data) => $body,
            AttributeArray::I8($data) => $body,
        }
    };
}

macro_rules! with_array_pair {
    ($dst:expr, $src:expr, ($d:ident, $s:ident) => $body:expr, _ => $fallback:expr) => {
        match ($dst, $src) {
            (AttributeArray::F32($d), AttributeArray::F32($s)) => $body,
            (AttributeArray::U32($d), AttributeArray::U32($s)) => $body,
            (AttributeArray::U16($d), AttributeArray::U16($s)) => $body,
            (AttributeArray::U8($d), AttributeArray::U8($s)) => $body,
            (AttributeArray::I32($d), AttributeArray::I32($s)) => $body,
            (AttributeArray::I16($d), AttributeArray::I16($s)) => $body,
            (AttributeArray::I8($d), AttributeArray::I8($s)) => $body,
            _ => $fallback,
        }
    };
}

impl AttributeArray {
    /// Component type of the array
    pub const fn component_type(&self) -> ComponentType {
        match self {
            Self::F32(_) => ComponentType::F32,
            Self::U32(_) => ComponentType::U32,
            Self::U16(_) => ComponentType::U16,
            Self::U8(_) => ComponentType::U8,
            Self::I32(_) => ComponentType::I32,
            Self::I16(_) => ComponentType::I16,
            Self::I8(_) => ComponentType::I8,
        }
    }

    /// Number of components
    pub fn len(&self) -> usize {
        with_array!(self, data => data.len())
    }

    /// Whether the array holds no components
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-filled array of the same component type
    pub fn zeroed(component_type: ComponentType, len: usize) -> Self {
        match component_type {
            ComponentType::F32 => Self::F32(vec![0.0; len]),
            ComponentType::U32 => Self::U32(vec![0; len]),
            ComponentType::U16 => Self::U16(vec![0; len]),
            ComponentType::U8 => Self::U8(vec![0; len]),
            ComponentType::I32 => Self::I32(vec![0; len]),
            ComponentType::I16 => Self::I16(vec![0; len]),
            ComponentType::I8 => Self::I8(vec![0; len]),
        }
    }

    /// Component at `index` as a float
    ///
    /// Normalized integer data is mapped to `[0, 1]` (unsigned) or `[-1, 1]`
    /// (signed). Out-of-range reads return zero.
    pub fn get_f32(&self, index: usize, normalized: bool) -> f32 {
        match self {
            Self::F32(data) => data.get(index).copied().unwrap_or(0.0),
            Self::U32(data) => denormalize(data.get(index).map_or(0.0, |v| *v as f32), u32::MAX as f32, normalized),
            Self::U16(data) => denormalize(data.get(index).map_or(0.0, |v| f32::from(*v)), f32::from(u16::MAX), normalized),
            Self::U8(data) => denormalize(data.get(index).map_or(0.0, |v| f32::from(*v)), f32::from(u8::MAX), normalized),
            Self::I32(data) => denormalize_signed(data.get(index).map_or(0.0, |v| *v as f32), i32::MAX as f32, normalized),
            Self::I16(data) => denormalize_signed(data.get(index).map_or(0.0, |v| f32::from(*v)), f32::from(i16::MAX), normalized),
            Self::I8(data) => denormalize_signed(data.get(index).map_or(0.0, |v| f32::from(*v)), f32::from(i8::MAX), normalized),
        }
    }

    /// Copy of the components in `range`, or `None` when out of bounds
    pub fn slice(&self, range: Range<usize>) -> Option<Self> {
        Some(match self {
            Self::F32(data) => Self::F32(data.get(range)?.to_vec()),
            Self::U32(data) => Self::U32(data.get(range)?.to_vec()),
            Self::U16(data) => Self::U16(data.get(range)?.to_vec()),
            Self::U8(data) => Self::U8(data.get(range)?.to_vec()),
            Self::I32(data) => Self::I32(data.get(range)?.to_vec()),
            Self::I16(data) => Self::I16(data.get(range)?.to_vec()),
            Self::I8(data) => Self::I8(data.get(range)?.to_vec()),
        })
    }

    /// Copy all of `source` into this array starting at component `offset`
    ///
    /// Returns `false` when the component types differ or the copy would
    /// overrun this array.
    pub fn write_from(&mut self, source: &Self, offset: usize) -> bool {
        with_array_pair!(self, source, (dst, src) => {
            match dst.get_mut(offset..offset + src.len()) {
                Some(window) => {
                    window.copy_from_slice(src);
                    true
                }
                None => false,
            }
        }, _ => false)
    }

    /// Grow or truncate to `len` components; new components are zero
    pub fn resize(&mut self, len: usize) {
        match self {
            Self::F32(data) => data.resize(len, 0.0),
            Self::U32(data) => data.resize(len, 0),
            Self::U16(data) => data.resize(len, 0),
            Self::U8(data) => data.resize(len, 0),
            Self::I32(data) => data.resize(len, 0),
            Self::I16(data) => data.resize(len, 0),
            Self::I8(data) => data.resize(len, 0),
        }
    }


    /// Zero the components in `range` (clamped to the array)
    pub fn fill_zero(&mut self, range: Range<usize>) {
        let len = self.len();
        let range = range.start.min(len)..range.end.min(len);
        with_array!(self, data => data[range].fill(Default::default()));
    }

    /// Move components in `source` so they start at `dest` (overlap-safe)
    pub fn copy_within(&mut self, source: Range<usize>, dest: usize) {
        with_array!(self, data => data.copy_within(source, dest));
    }

    /// Raw bytes of the array
    pub fn as_bytes(&self) -> &[u8] {
        with_array!(self, data => bytemuck::cast_slice(data))
    }
}

fn denormalize(value: f32, max: f32, normalized: bool) -> f32 {
    if normalized {
        value / max
    } else {
        value
    }
}

fn denormalize_signed(value: f32, max: f32, normalized: bool) -> f32 {
    if normalized {
        (value / max).max(-1.0)
    } else {
        value
    }
}

/// Vertex attribute as supplied by a source geometry
#[derive(Debug, Clone, PartialEq)]
pub enum BufferAttribute {
    /// Tightly packed components owned by this attribute
    Plain {
        /// Component data
        array: AttributeArray,
        /// Components per vertex
        item_size: usize,
        /// Whether integer data maps to a normalized float range
        normalized: bool,
    },
    /// View into a buffer shared with other attributes
    Interleaved {
        /// Backing buffer
        buffer: AttributeArray,
        /// Components between consecutive vertices
        stride: usize,
        /// Component offset of this attribute inside a vertex
        offset: usize,
        /// Components per vertex
        item_size: usize,
        /// Whether integer data maps to a normalized float range
        normalized: bool,
    },
    /// Attribute whose data only lives on the GPU
    GpuOpaque {
        /// Components per vertex
        item_size: usize,
        /// Whether integer data maps to a normalized float range
        normalized: bool,
        /// Number of vertices
        count: usize,
    },
}

impl BufferAttribute {
    /// Create a plain attribute
    pub const fn new(array: AttributeArray, item_size: usize, normalized: bool) -> Self {
        Self::Plain { array, item_size, normalized }
    }

    /// Plain float attribute
    pub const fn from_f32(data: Vec<f32>, item_size: usize) -> Self {
        Self::new(AttributeArray::F32(data), item_size, false)
    }

    /// Components per vertex
    pub const fn item_size(&self) -> usize {
        match self {
            Self::Plain { item_size, .. }
            | Self::Interleaved { item_size, .. }
            | Self::GpuOpaque { item_size, .. } => *item_size,
        }
    }

    /// Whether integer data maps to a normalized float range
    pub const fn normalized(&self) -> bool {
        match self {
            Self::Plain { normalized, .. }
            | Self::Interleaved { normalized, .. }
            | Self::GpuOpaque { normalized, .. } => *normalized,
        }
    }

    /// Number of vertices described by the attribute
    pub fn count(&self) -> usize {
        match self {
            Self::Plain { array, item_size, .. } => array.len() / (*item_size).max(1),
            Self::Interleaved { buffer, stride, .. } => buffer.len() / (*stride).max(1),
            Self::GpuOpaque { count, .. } => *count,
        }
    }

    /// Component data when the attribute is plain
    pub const fn plain_array(&self) -> Option<&AttributeArray> {
        match self {
            Self::Plain { array, .. } => Some(array),
            _ => None,
        }
    }

    /// Short description of the storage kind
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Plain { .. } => "plain",
            Self::Interleaved { .. } => "interleaved",
            Self::GpuOpaque { .. } => "gpu-only",
        }
    }

    /// Component `component` of vertex `vertex` as a float
    pub fn get_component(&self, vertex: usize, component: usize) -> f32 {
        match self {
            Self::Plain { array, item_size, normalized } => {
                array.get_f32(vertex * item_size + component, *normalized)
            }
            Self::Interleaved { buffer, stride, offset, normalized, .. } => {
                buffer.get_f32(vertex * stride + offset + component, *normalized)
            }
            Self::GpuOpaque { .. } => 0.0,
        }
    }
}

/// Index array, 16- or 32-bit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexArray {
    /// 16-bit indices
    U16(Vec<u16>),
    /// 32-bit indices
    U32(Vec<u32>),
}

impl IndexArray {
    /// Zeroed index array whose element width fits `max_vertex_count` vertices
    pub fn for_vertex_capacity(max_vertex_count: usize, len: usize) -> Self {
        if max_vertex_count > usize::from(u16::MAX) {
            Self::U32(vec![0; len])
        } else {
            Self::U16(vec![0; len])
        }
    }

    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            Self::U16(data) => data.len(),
            Self::U32(data) => data.len(),
        }
    }

    /// Whether the array holds no indices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of one index in bytes
    pub const fn bytes_per_element(&self) -> usize {
        match self {
            Self::U16(_) => 2,
            Self::U32(_) => 4,
        }
    }

    /// Index at position `i`
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            Self::U16(data) => data.get(i).map(|v| u32::from(*v)),
            Self::U32(data) => data.get(i).copied(),
        }
    }

    /// Overwrite the index at position `i`
    ///
    /// Values are truncated to the element width; callers size the array
    /// with [`for_vertex_capacity`](Self::for_vertex_capacity).
    pub fn set(&mut self, i: usize, value: u32) {
        match self {
            Self::U16(data) => data[i] = value as u16,
            Self::U32(data) => data[i] = value,
        }
    }

    /// Largest index value, if any
    pub fn max_value(&self) -> Option<u32> {
        match self {
            Self::U16(data) => data.iter().max().map(|v| u32::from(*v)),
            Self::U32(data) => data.iter().max().copied(),
        }
    }

    /// Iterate indices as `u32`
    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            Self::U16(data) => Box::new(data.iter().map(|v| u32::from(*v))),
            Self::U32(data) => Box::new(data.iter().copied()),
        }
    }

    /// Move indices in `source` so they start at `dest` (overlap-safe)
    pub fn copy_within(&mut self, source: Range<usize>, dest: usize) {
        match self {
            Self::U16(data) => data.copy_within(source, dest),
            Self::U32(data) => data.copy_within(source, dest),
        }
    }

    /// Add `delta` to every index in `range`
    pub fn rebase(&mut self, range: Range<usize>, delta: i64) {
        for i in range {
            if let Some(value) = self.get(i) {
                self.set(i, (i64::from(value) + delta).max(0) as u32);
            }
        }
    }

    /// Copy the overlapping prefix of `source` into this array
    pub fn copy_prefix_from(&mut self, source: &Self) {
        let len = self.len().min(source.len());
        for i in 0..len {
            if let Some(value) = source.get(i) {
                self.set(i, value);
            }
        }
    }

    /// Raw bytes of the array
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U16(data) => bytemuck::cast_slice(data),
            Self::U32(data) => bytemuck::cast_slice(data),
        }
    }
}

impl From<Vec<u32>> for IndexArray {
    fn from(data: Vec<u32>) -> Self {
        Self::U32(data)
    }
}

impl From<Vec<u16>> for IndexArray {
    fn from(data: Vec<u16>) -> Self {
        Self::U16(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_write_from_rejects_type_mismatch_and_overrun() {
        let mut dst = AttributeArray::zeroed(ComponentType::F32, 6);
        assert!(dst.write_from(&AttributeArray::F32(vec![1.0, 2.0]), 4));
        assert!(!dst.write_from(&AttributeArray::F32(vec![1.0, 2.0]), 5));
        assert!(!dst.write_from(&AttributeArray::U8(vec![1]), 0));
        assert_eq!(dst, AttributeArray::F32(vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0]));
    }

    #[test]
    fn test_resize_keeps_prefix_and_zero_fills() {
        let mut array = AttributeArray::U16(vec![1, 2, 3]);
        array.resize(5);
        assert_eq!(array, AttributeArray::U16(vec![1, 2, 3, 0, 0]));
        array.resize(2);
        assert_eq!(array, AttributeArray::U16(vec![1, 2]));
    }

    #[test]
    fn test_normalized_reads() {
        let unsigned = AttributeArray::U8(vec![0, 255, 51]);
        assert_relative_eq!(unsigned.get_f32(1, true), 1.0);
        assert_relative_eq!(unsigned.get_f32(2, true), 0.2, epsilon = 1e-6);
        assert_relative_eq!(unsigned.get_f32(2, false), 51.0);

        let signed = AttributeArray::I8(vec![-128, 127]);
        assert_relative_eq!(signed.get_f32(0, true), -1.0);
        assert_relative_eq!(signed.get_f32(1, true), 1.0);
    }

    #[test]
    fn test_index_width_follows_vertex_capacity() {
        assert_eq!(IndexArray::for_vertex_capacity(65535, 3).bytes_per_element(), 2);
        assert_eq!(IndexArray::for_vertex_capacity(65536, 3).bytes_per_element(), 4);
    }

    #[test]
    fn test_rebase_shifts_values() {
        let mut index = IndexArray::U16(vec![10, 11, 12, 40]);
        index.rebase(0..3, -10);
        assert_eq!(index.iter().collect::<Vec<_>>(), vec![0, 1, 2, 40]);
    }

    #[test]
    fn test_attribute_counts() {
        let plain = BufferAttribute::from_f32(vec![0.0; 9], 3);
        assert_eq!(plain.count(), 3);

        let interleaved = BufferAttribute::Interleaved {
            buffer: AttributeArray::F32(vec![0.0; 12]),
            stride: 6,
            offset: 3,
            item_size: 3,
            normalized: false,
        };
        assert_eq!(interleaved.count(), 2);
        assert!(interleaved.plain_array().is_none());
    }
}
