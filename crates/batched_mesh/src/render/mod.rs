//! Rendering-side types the batch hands to a GPU backend
//!
//! The batch never talks to a graphics API. It exposes a [`Material`] for
//! draw-order decisions and pushes changed buffer bytes through an
//! [`UploadSink`].

pub mod color;
pub mod material;
pub mod upload;

pub use color::Color;
pub use material::{Material, Side};
pub use upload::{BufferState, BufferTarget, DirtyFlags, DirtyRegion, UpdateRange, UploadLog, UploadSink, MAX_PENDING_RANGES};
