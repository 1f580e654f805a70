//! Dirty tracking and upload plumbing for batch-owned buffers
//!
//! Every CPU-side buffer the batch owns carries a [`BufferState`] recording
//! which element ranges changed since the last flush. A backend implements
//! [`UploadSink`] to receive the bytes and ranges when the batch is flushed.

use std::ops::Range;

bitflags::bitflags! {
    /// Summary of which buffer groups have pending uploads
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        /// One or more vertex attribute arrays
        const ATTRIBUTES = 1 << 0;
        /// The shared index array
        const INDEX = 1 << 1;
        /// The per-instance matrix texture
        const MATRICES = 1 << 2;
        /// The per-instance color texture
        const COLORS = 1 << 3;
        /// The draw-slot indirection texture
        const INDIRECT = 1 << 4;
        /// Multi-draw starts/counts
        const DRAW_LIST = 1 << 5;

        /// Geometry arena buffers
        const GEOMETRY = Self::ATTRIBUTES.bits() | Self::INDEX.bits();
        /// Instance texture buffers
        const TEXTURES = Self::MATRICES.bits() | Self::COLORS.bits() | Self::INDIRECT.bits();
    }
}

/// Contiguous run of changed elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRange {
    /// First changed element
    pub start: usize,
    /// Number of changed elements
    pub count: usize,
}

impl UpdateRange {
    /// One past the last changed element
    pub const fn end(&self) -> usize {
        self.start + self.count
    }
}

/// Pending changes handed to an [`UploadSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirtyRegion {
    /// The whole buffer must be re-uploaded (new allocation or resize)
    Full,
    /// Only these element ranges changed; sorted and coalesced
    Ranges(Vec<UpdateRange>),
}

impl DirtyRegion {
    /// Byte ranges covered by this region, clamped to `total_bytes`
    pub fn byte_ranges(&self, bytes_per_element: usize, total_bytes: usize) -> Vec<Range<usize>> {
        match self {
            Self::Full => vec![0..total_bytes],
            Self::Ranges(ranges) => ranges
                .iter()
                .map(|range| {
                    let start = (range.start * bytes_per_element).min(total_bytes);
                    let end = (range.end() * bytes_per_element).min(total_bytes);
                    start..end
                })
                .filter(|range| !range.is_empty())
                .collect(),
        }
    }
}

/// Pending disjoint ranges after which a buffer falls back to a full upload
pub const MAX_PENDING_RANGES: usize = 64;

/// Version counter and pending ranges for one buffer
#[derive(Debug, Clone, Default)]
pub struct BufferState {
    version: u64,
    full: bool,
    ranges: Vec<UpdateRange>,
}

impl BufferState {
    /// Fresh state that requests a full upload
    pub fn new_full() -> Self {
        Self {
            version: 1,
            full: true,
            ranges: Vec::new(),
        }
    }

    /// Record a changed element range
    pub fn mark_range(&mut self, start: usize, count: usize) {
        if count == 0 {
            return;
        }
        self.version += 1;
        if self.full {
            return;
        }

        // Ranges stay sorted and coalesced; touching ranges merge
        let mut merged = UpdateRange { start, count };
        let first = self.ranges.partition_point(|range| range.end() < merged.start);
        let mut last = first;
        while let Some(range) = self.ranges.get(last).filter(|range| range.start <= merged.end()) {
            let end = merged.end().max(range.end());
            merged.start = merged.start.min(range.start);
            merged.count = end - merged.start;
            last += 1;
        }
        self.ranges.splice(first..last, [merged]);

        if self.ranges.len() > MAX_PENDING_RANGES {
            self.full = true;
            self.ranges.clear();
        }
    }

    /// Request a full re-upload
    pub fn mark_all(&mut self) {
        self.version += 1;
        self.full = true;
        self.ranges.clear();
    }

    /// Whether anything is pending
    pub fn is_dirty(&self) -> bool {
        self.full || !self.ranges.is_empty()
    }

    /// Monotonic counter bumped on every change
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Take the pending region, leaving the state clean
    pub fn take(&mut self) -> Option<DirtyRegion> {
        if self.full {
            self.full = false;
            self.ranges.clear();
            return Some(DirtyRegion::Full);
        }
        if self.ranges.is_empty() {
            return None;
        }
        Some(DirtyRegion::Ranges(std::mem::take(&mut self.ranges)))
    }
}

/// Identifies a batch-owned buffer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Named vertex attribute
    Attribute(String),
    /// Shared index array
    Index,
    /// Instance matrix texture
    Matrices,
    /// Instance color texture
    Colors,
    /// Draw-slot to instance-id indirection texture
    Indirect,
    /// Multi-draw start offsets
    DrawStarts,
    /// Multi-draw element counts
    DrawCounts,
}

/// Receiver for changed buffer contents
pub trait UploadSink {
    /// Upload `region` of `bytes` to `target`
    ///
    /// `bytes` always holds the whole CPU-side buffer; `region` is expressed
    /// in elements of `bytes_per_element` bytes.
    fn upload(&mut self, target: &BufferTarget, bytes: &[u8], bytes_per_element: usize, region: &DirtyRegion);
}

/// One call received by an [`UploadLog`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    /// Buffer that was uploaded
    pub target: BufferTarget,
    /// Bytes actually covered by the region
    pub uploaded_bytes: usize,
    /// Region that was uploaded
    pub region: DirtyRegion,
}

/// Sink that records uploads instead of sending them anywhere
#[derive(Debug, Clone, Default)]
pub struct UploadLog {
    /// Uploads in the order they were received
    pub records: Vec<UploadRecord>,
}

impl UploadLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes across all recorded uploads
    pub fn total_bytes(&self) -> usize {
        self.records.iter().map(|record| record.uploaded_bytes).sum()
    }

    /// First record for `target`, if any
    pub fn find(&self, target: &BufferTarget) -> Option<&UploadRecord> {
        self.records.iter().find(|record| &record.target == target)
    }
}

impl UploadSink for UploadLog {
    fn upload(&mut self, target: &BufferTarget, bytes: &[u8], bytes_per_element: usize, region: &DirtyRegion) {
        let uploaded_bytes = region
            .byte_ranges(bytes_per_element, bytes.len())
            .iter()
            .map(ExactSizeIterator::len)
            .sum();
        log::trace!("upload {:?}: {} bytes ({:?})", target, uploaded_bytes, region);
        self.records.push(UploadRecord {
            target: target.clone(),
            uploaded_bytes,
            region: region.clone(),
        });
    }
}
