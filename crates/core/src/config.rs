//! Index configuration via `hnsw.toml`
//!
//! Index parameters are fixed at creation time. They can be built in code
//! (`HnswOptions::new(dimensions)`) or loaded from a TOML file that sits next
//! to the page file. Validation happens before any page is allocated, so a
//! bad parameter never leaves a partially built index behind.

use crate::error::{Error, Result};
use crate::limits::{max_level, HNSW_MAX_DIM};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed next to the index page file.
pub const CONFIG_FILE_NAME: &str = "hnsw.toml";

/// Primary vector metric. All metrics are "lower = closer".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance
    #[default]
    L2,
    /// Negative inner product
    InnerProduct,
    /// `1 - cosine similarity`; vectors are normalized before indexing
    Cosine,
    /// Manhattan distance
    L1,
}

impl DistanceMetric {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L1 => "l1",
        }
    }

    /// Whether vectors must be normalized before they enter the graph
    pub fn normalizes(&self) -> bool {
        matches!(self, DistanceMetric::Cosine)
    }
}

/// Type of an auxiliary (non-vector) index column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// 64-bit integer, distance `|a - b|`
    Int,
    /// 64-bit float, distance `|a - b|`
    Float,
    /// Text, distance is the difference of byte lengths
    Text,
    /// A second vector column; always rejected by validation
    Vector,
}

impl AttributeKind {
    /// Name of the column type, as written in `hnsw.toml`
    pub fn name(&self) -> &'static str {
        match self {
            AttributeKind::Int => "int",
            AttributeKind::Float => "float",
            AttributeKind::Text => "text",
            AttributeKind::Vector => "vector",
        }
    }
}

/// Constants of the multi-column distance blend.
///
/// `distance = weight * vector_distance + bias - 1 / log10(e + 1)` when the
/// attribute mismatch `e` is positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeWeights {
    /// Weight of the vector term
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Offset of the attribute term; must dominate `weight * vector_distance`
    #[serde(default = "default_bias")]
    pub bias: f64,
    /// Mismatch added for a null-vs-value pair or unequal values at distance zero
    #[serde(default = "default_penalty")]
    pub penalty: f64,
}

fn default_weight() -> f64 {
    0.25
}

fn default_bias() -> f64 {
    4.32
}

fn default_penalty() -> f64 {
    1000.0
}

impl Default for AttributeWeights {
    fn default() -> Self {
        Self {
            weight: default_weight(),
            bias: default_bias(),
            penalty: default_penalty(),
        }
    }
}

/// Index parameters.
///
/// # Example
///
/// ```toml
/// dimensions = 96
/// m = 16
/// ef_construction = 64
/// metric = "l2"
/// attributes = ["int"]
/// maintenance_work_mem = 67108864
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswOptions {
    /// Vector dimension
    pub dimensions: usize,
    /// Base per-layer degree (layer 0 gets twice this)
    #[serde(default = "default_m")]
    pub m: usize,
    /// Beam width while building
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,
    /// Beam width while searching
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
    /// Primary vector metric
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Auxiliary column kinds, in index column order after the vector
    #[serde(default)]
    pub attributes: Vec<AttributeKind>,
    /// Multi-column distance constants
    #[serde(default)]
    pub attribute_weights: AttributeWeights,
    /// Byte budget of the in-memory build phase
    #[serde(default = "default_maintenance_work_mem")]
    pub maintenance_work_mem: usize,
    /// Seed of the level generator
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_m() -> usize {
    16
}

fn default_ef_construction() -> usize {
    64
}

fn default_ef_search() -> usize {
    40
}

fn default_maintenance_work_mem() -> usize {
    64 * 1024 * 1024
}

fn default_seed() -> u64 {
    42
}

impl HnswOptions {
    /// Default parameters for a single-column index of the given dimension
    pub fn new(dimensions: usize) -> Self {
        HnswOptions {
            dimensions,
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            metric: DistanceMetric::default(),
            attributes: Vec::new(),
            attribute_weights: AttributeWeights::default(),
            maintenance_work_mem: default_maintenance_work_mem(),
            seed: default_seed(),
        }
    }

    /// Set `m`
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    /// Set `ef_construction`
    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    /// Set `ef_search`
    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    /// Set the metric
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the auxiliary column kinds
    pub fn with_attributes(mut self, attributes: Vec<AttributeKind>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set the in-memory build budget in bytes
    pub fn with_maintenance_work_mem(mut self, bytes: usize) -> Self {
        self.maintenance_work_mem = bytes;
        self
    }

    /// Set the level generator seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// True when the index covers auxiliary attributes
    pub fn is_multi_column(&self) -> bool {
        !self.attributes.is_empty()
    }

    /// Level multiplier `1 / ln(m)`
    pub fn ml(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }

    /// Highest level an element may be assigned
    pub fn max_level(&self) -> usize {
        max_level(self.m)
    }

    /// Check every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(Error::config("column does not have dimensions"));
        }
        if self.dimensions > HNSW_MAX_DIM {
            return Err(Error::config(format!(
                "column cannot have more than {} dimensions for hnsw index",
                HNSW_MAX_DIM
            )));
        }
        if !(2..=100).contains(&self.m) {
            return Err(Error::config(format!(
                "m must be between 2 and 100, got {}",
                self.m
            )));
        }
        if !(4..=1000).contains(&self.ef_construction) {
            return Err(Error::config(format!(
                "ef_construction must be between 4 and 1000, got {}",
                self.ef_construction
            )));
        }
        if self.ef_construction < 2 * self.m {
            return Err(Error::config(
                "ef_construction must be greater than or equal to 2 * m",
            ));
        }
        if !(1..=1000).contains(&self.ef_search) {
            return Err(Error::config(format!(
                "ef_search must be between 1 and 1000, got {}",
                self.ef_search
            )));
        }
        if let Some(pos) = self
            .attributes
            .iter()
            .position(|k| *k == AttributeKind::Vector)
        {
            return Err(Error::config(format!("column {} cannot be a vector", pos + 2)));
        }
        if self.attributes.len() > u8::MAX as usize {
            return Err(Error::config("too many attribute columns"));
        }
        Ok(())
    }

    /// Parse and validate options from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the text does not parse or a
    /// parameter is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let options: HnswOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Read, parse and validate options from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidConfig(msg) => {
                Error::config(format!("config file '{}': {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Serialize these options to TOML and write them to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize options: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns a commented template config file.
    pub fn default_toml() -> &'static str {
        r#"# pagehnsw index configuration
#
# Vector dimension (required, 1..=2000)
dimensions = 128

# Max connections per upper layer; layer 0 gets 2 * m (2..=100)
m = 16

# Build-time beam width, must be >= 2 * m (4..=1000)
ef_construction = 64

# Search-time beam width (1..=1000)
ef_search = 40

# "l2", "inner_product", "cosine" or "l1"
metric = "l2"

# Auxiliary attribute columns: "int", "float" or "text"
# attributes = ["int"]

# Memory budget of the in-memory build phase, in bytes (default 64 MiB)
maintenance_work_mem = 67108864
"#
    }
}
