//! Material description consumed by the batch

use serde::{Deserialize, Serialize};

/// Which triangle faces are rendered and hit by rays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Side {
    /// Counter-clockwise faces only
    #[default]
    Front,
    /// Clockwise faces only
    Back,
    /// Both windings
    Double,
}

/// Material the batch draws with
///
/// Only the properties that influence batching are modelled: transparency
/// flips the depth-sort direction and `side` drives ray face culling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    /// Optional name for debugging
    pub name: String,
    /// Alpha-blended materials are sorted back-to-front
    pub transparent: bool,
    /// Face culling mode
    pub side: Side,
}

impl Default for Material {
    fn default() -> Self {
        Self::opaque("default")
    }
}

impl Material {
    /// Create an opaque front-faced material
    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transparent: false,
            side: Side::Front,
        }
    }

    /// Create an alpha-blended front-faced material
    pub fn transparent(name: impl Into<String>) -> Self {
        Self {
            transparent: true,
            ..Self::opaque(name)
        }
    }

    /// Set the face culling mode
    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }
}
