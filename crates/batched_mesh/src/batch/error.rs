//! Batch error types

use std::fmt;

use thiserror::Error;

/// Capacity-limited resource a batch manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Instance slots
    Instances,
    /// Arena vertices
    Vertices,
    /// Arena indices
    Indices,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Instances => "instance",
            Self::Vertices => "vertex",
            Self::Indices => "index",
        })
    }
}

/// Kind of id carried by an [`BatchError::InvalidId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Geometry id
    Geometry,
    /// Instance id
    Instance,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Geometry => "geometry",
            Self::Instance => "instance",
        })
    }
}

/// Errors returned by batch operations
///
/// Every failing operation leaves the batch exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// Not enough room left in a fixed-capacity buffer
    #[error("{resource} capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded {
        /// Exhausted resource
        resource: Resource,
        /// Amount the operation needed
        requested: usize,
        /// Amount that was free
        available: usize,
    },

    /// Id is out of range or refers to a deleted slot
    #[error("invalid {kind} id {id}")]
    InvalidId {
        /// Which id space
        kind: IdKind,
        /// Offending id
        id: u32,
    },

    /// Geometry does not match the batch's attribute layout
    #[error("geometry schema mismatch: {reason}")]
    SchemaMismatch {
        /// Human-readable description of the first mismatch
        reason: String,
    },

    /// Geometry uses a storage feature the batch cannot copy from
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Shrinking would cut off live data
    #[error("cannot shrink {resource} capacity to {requested}: live data extends to {required}")]
    ShrinkViolation {
        /// Resource being resized
        resource: Resource,
        /// Requested capacity
        requested: usize,
        /// Smallest capacity that keeps all live data
        required: usize,
    },
}

impl BatchError {
    pub(crate) fn schema(reason: impl Into<String>) -> Self {
        Self::SchemaMismatch { reason: reason.into() }
    }
}

/// Result alias for batch operations
pub type BatchResult<T> = Result<T, BatchError>;

/// Id of a geometry registered in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

/// Id of an instance in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl GeometryId {
    /// Raw slot index
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn invalid(self) -> BatchError {
        BatchError::InvalidId { kind: IdKind::Geometry, id: self.0 }
    }
}

impl InstanceId {
    /// Raw slot index
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn invalid(self) -> BatchError {
        BatchError::InvalidId { kind: IdKind::Instance, id: self.0 }
    }
}

impl fmt::Display for GeometryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "geometry #{}", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance #{}", self.0)
    }
}
