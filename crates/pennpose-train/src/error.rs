//! Error types for the PennPose target/scoring pipeline.
//!
//! This module is the single source of truth for all error types in the
//! crate. Every module that produces an error imports its error type from
//! here rather than defining it inline.
//!
//! ## Hierarchy
//!
//! ```text
//! PipelineError (top-level)
//! ├── HeatmapError   (shape / parameter problems in encode, decode, score)
//! ├── ConfigError    (config validation / file loading)
//! └── DatasetError   (clip index, sequence files, npy I/O)
//! ```
//!
//! A zero-span ground-truth bounding box is *not* represented
//! here: it yields a zero threshold and is scored, not rejected.

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// PipelineResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by orchestration-level functions.
pub type PipelineResult<T> = Result<T, PipelineError>;

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Top-level error type for the pipeline.
///
/// Lower-level functions return their own module-specific error types which
/// are automatically coerced into `PipelineError` via [`From`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An encoding, decoding or scoring error.
    #[error("Heatmap error: {0}")]
    Heatmap(#[from] HeatmapError),

    /// A configuration validation or loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A dataset loading or writing error.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

// ---------------------------------------------------------------------------
// HeatmapError
// ---------------------------------------------------------------------------

/// Errors produced by the encoder, decoder and scorer.
///
/// All variants describe caller errors; none of them is transient.
#[derive(Debug, Error, PartialEq)]
pub enum HeatmapError {
    /// Two arrays that must agree on their leading dimensions do not.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// A numeric parameter is outside its valid domain.
    #[error("Invalid value for `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A joint map is missing the entry for a joint index.
    #[error("Joint map has no entry for joint {index}")]
    MissingJoint {
        /// The joint index that was expected.
        index: usize,
    },
}

impl HeatmapError {
    /// Construct a [`HeatmapError::ShapeMismatch`].
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        HeatmapError::ShapeMismatch { expected: expected.to_vec(), actual: actual.to_vec() }
    }

    /// Construct a [`HeatmapError::InvalidParameter`].
    pub fn invalid_parameter<S: Into<String>>(name: &'static str, reason: S) -> Self {
        HeatmapError::InvalidParameter { name, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating a [`TargetConfig`].
///
/// [`TargetConfig`]: crate::config::TargetConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read from or written to disk.
    #[error("Cannot access config file `{path}`: {source}")]
    FileRead {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// DatasetError
// ---------------------------------------------------------------------------

/// Errors produced while reading or writing dataset artefacts
/// (clip indices, sequence JSON files, `.npy` arrays).
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A file was found but its contents have the wrong structure or shape.
    #[error("Invalid data format in `{path}`: {message}")]
    InvalidFormat {
        /// Path of the malformed file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// A low-level I/O error while accessing a data file.
    #[error("I/O error accessing `{path}`: {source}")]
    Io {
        /// Path being accessed when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON in an index or sequence file.
    #[error("JSON error in `{path}`: {source}")]
    Json {
        /// Path of the JSON file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A `.npy` array could not be read or written.
    #[error("NumPy array error in `{path}`: {message}")]
    Npy {
        /// Path of the `.npy` file.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// The annotation arrays themselves are inconsistent.
    #[error(transparent)]
    Heatmap(#[from] HeatmapError),
}

impl DatasetError {
    /// Construct a [`DatasetError::InvalidFormat`].
    pub fn invalid_format<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::InvalidFormat { path: path.into(), message: msg.into() }
    }

    /// Construct a [`DatasetError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::Io { path: path.into(), source }
    }

    /// Construct a [`DatasetError::Npy`].
    pub fn npy<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::Npy { path: path.into(), message: msg.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_display_lists_both_shapes() {
        let err = HeatmapError::shape_mismatch(&[5, 14], &[5, 13]);
        assert_eq!(err.to_string(), "Shape mismatch: expected [5, 14], got [5, 13]");
    }

    #[test]
    fn heatmap_error_coerces_into_pipeline_error() {
        let err: PipelineError = HeatmapError::invalid_parameter("sigma", "must be > 0").into();
        assert!(matches!(err, PipelineError::Heatmap(HeatmapError::InvalidParameter { .. })));
        assert!(err.to_string().contains("sigma"));
    }
}
