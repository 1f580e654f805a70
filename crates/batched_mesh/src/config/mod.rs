//! Configuration system
//!
//! Batch capacities and per-frame switches can be loaded from `.toml` or
//! `.ron` files through the [`Config`] trait.

pub use serde::{Serialize, Deserialize};

use crate::render::Material;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Construction parameters for a [`BatchedMesh`](crate::batch::BatchedMesh)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Instance capacity
    pub max_instance_count: usize,

    /// Vertex capacity of the shared geometry arena
    pub max_vertex_count: usize,

    /// Index capacity; defaults to twice the vertex capacity
    pub max_index_count: Option<usize>,

    /// Cull each instance against the camera frustum every frame
    pub per_object_frustum_culled: bool,

    /// Depth-sort the draw list every frame
    pub sort_objects: bool,

    /// Material the batch draws with
    pub material: Material,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_instance_count: 1000,
            max_vertex_count: 1000,
            max_index_count: None,
            per_object_frustum_culled: true,
            sort_objects: true,
            material: Material::default(),
        }
    }
}

impl BatchConfig {
    /// Effective index capacity after applying the default
    pub fn resolved_max_index_count(&self) -> usize {
        self.max_index_count.unwrap_or(self.max_vertex_count * 2)
    }
}

impl Config for BatchConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_capacity_defaults_to_twice_vertices() {
        let config = BatchConfig {
            max_vertex_count: 300,
            ..Default::default()
        };
        assert_eq!(config.resolved_max_index_count(), 600);

        let explicit = BatchConfig {
            max_index_count: Some(42),
            ..config
        };
        assert_eq!(explicit.resolved_max_index_count(), 42);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: BatchConfig = toml::from_str(
            "max_instance_count = 10\nmax_vertex_count = 5000\nsort_objects = false\n",
        )
        .unwrap();

        assert_eq!(config.max_instance_count, 10);
        assert_eq!(config.max_vertex_count, 5000);
        assert_eq!(config.max_index_count, None);
        assert!(config.per_object_frustum_culled);
        assert!(!config.sort_objects);
        assert!(!config.material.transparent);
    }

    #[test]
    fn test_ron_round_trip() {
        let config = BatchConfig {
            max_instance_count: 64,
            max_index_count: Some(128),
            material: Material::transparent("glass"),
            ..Default::default()
        };
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        let parsed: BatchConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let result = BatchConfig::default().save_to_file("batch.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
