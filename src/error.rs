//! Error types for grid simplification and lookup.

use thiserror::Error;

/// Errors raised by labelgrid.
///
/// `GeometryOperationFailed` is normally caught inside the simplifier and gap
/// filler and replaced by a local fallback; it only reaches callers from
/// operations that have no fallback (e.g. the gap filler's land union).
#[derive(Error, Debug)]
pub enum LabelGridError {
    /// A serialized cell address could not be parsed against its grid.
    #[error("Malformed cell address {value:?}: {reason}")]
    MalformedAddress { value: String, reason: String },

    /// The geometry engine could not complete an operation.
    #[error("Geometry operation failed: {0}")]
    GeometryOperationFailed(String),

    /// A loaded dataset lacks the label or cell address attribute.
    #[error("Schema has no attribute {0}")]
    SchemaMissingAttribute(String),

    /// Attempted to descend below the grid's deepest level.
    #[error("Cell at depth {depth} cannot have children: grid has {max} levels")]
    UnsupportedDepth { depth: usize, max: usize },

    /// Invalid argument supplied by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while reading or writing a dataset.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// GeoJSON conversion error.
    #[cfg(feature = "geojson")]
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl LabelGridError {
    pub(crate) fn malformed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedAddress {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for labelgrid operations.
pub type Result<T> = std::result::Result<T, LabelGridError>;
