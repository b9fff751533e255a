//! Engine configuration
//!
//! Every setting has a default, so an empty file (or no file at all) yields a
//! working engine. Files are read as YAML (`.yaml`, `.yml`) or JSON (`.json`).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is neither YAML nor JSON
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),
}

/// Defaults substituted for missing rendering fields during ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub default_node_size: f64,
    pub default_node_color: String,
    pub default_edge_size: f64,
    pub default_edge_color: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            default_node_size: 1.0,
            default_node_color: "#999999".to_string(),
            default_edge_size: 1.0,
            default_edge_color: "#cccccc".to_string(),
        }
    }
}

/// Attribute keys that get special treatment before classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    /// Keys whose text values hold several values joined by the separator
    pub multi_value_keys: Vec<String>,
    pub multi_value_separator: char,
    /// Keys holding ISO-8601 dates, split into `<key>_year` and `<key>_month`
    pub date_keys: Vec<String>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            multi_value_keys: vec!["topics".to_string()],
            multi_value_separator: '|',
            date_keys: vec![
                "createdAt".to_string(),
                "updatedAt".to_string(),
                "pushedAt".to_string(),
            ],
        }
    }
}

/// Ranges and colors used by the visual mapping functions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub node_size_range: [f64; 2],
    pub edge_size_range: [f64; 2],
    /// Two-stop gradient for quantitative colors
    pub gradient: [String; 2],
    /// Largest number of distinct palette colors handed out
    pub palette_cap: usize,
    pub fallback_color: String,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            node_size_range: [2.0, 15.0],
            edge_size_range: [0.5, 5.0],
            gradient: ["#f4e9b8".to_string(), "#b0161c".to_string()],
            palette_cap: 20,
            fallback_color: "#999999".to_string(),
        }
    }
}

/// Iteration budgets of the fallback layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub iterations: usize,
    pub overlap_iterations: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            iterations: 150,
            overlap_iterations: 150,
        }
    }
}

/// PageRank parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralityConfig {
    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ingestion: IngestionConfig,
    pub fields: FieldsConfig,
    pub visual: VisualConfig,
    pub layout: LayoutConfig,
    pub centrality: CentralityConfig,
}

impl EngineConfig {
    /// Load a configuration file, picking the parser from its extension
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let content = fs::read_to_string(path)?;
        let config = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat(ext)),
        };
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse YAML text; an empty document yields the defaults
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}
