//! Target-generation and scoring configuration.
//!
//! [`TargetConfig`] is the single source of truth for the clip length,
//! output resolution, heatmap stride and sigmas, and the accuracy radius used
//! throughout the pipeline. It is serializable via [`serde`] so it can be
//! stored to / restored from JSON files next to generated targets.
//!
//! # Example
//!
//! ```rust
//! use pennpose_train::config::TargetConfig;
//!
//! let cfg = TargetConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.output_size, 256.0);
//! assert_eq!(cfg.label_size(), 31);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::heatmap::{label_map_size, CenterPolicy};

// ---------------------------------------------------------------------------
// TargetConfig
// ---------------------------------------------------------------------------

/// Complete configuration for building training targets and scoring
/// predictions.
///
/// Defaults match the Penn Action setup: 5-frame clips, 256 px square
/// frames, stride 8 (31 × 31 label maps), `sigma_label = 2`,
/// `sigma_center = 21`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Number of consecutive frames per training sample (`T`). Default: **5**.
    pub clip_length: usize,

    /// Side length in pixels of the square output frame. Default: **256**.
    pub output_size: f32,

    /// Downsampling factor between the output frame and the label map.
    /// Default: **8**.
    pub stride: f32,

    /// Gaussian sigma (pixels) for per-joint label maps. Default: **2.0**.
    pub sigma_label: f32,

    /// Gaussian sigma (pixels) for the center map. Default: **21.0**.
    pub sigma_center: f32,

    /// Fraction of the ground-truth box side used as the correctness
    /// radius. Default: **0.2**.
    pub radius_fraction: f64,

    /// Which joints contribute to the center-map aggregate.
    /// Default: [`CenterPolicy::VisibleJoints`].
    pub center_policy: CenterPolicy,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            clip_length: 5,
            output_size: 256.0,
            stride: 8.0,
            sigma_label: 2.0,
            sigma_center: 21.0,
            radius_fraction: 0.2,
            center_policy: CenterPolicy::VisibleJoints,
        }
    }
}

impl TargetConfig {
    /// Load a [`TargetConfig`] from a JSON file at `path`.
    ///
    /// Missing fields fall back to their defaults. The loaded config is
    /// validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened,
    /// [`ConfigError::ParseError`] if the JSON is malformed and
    /// [`ConfigError::InvalidValue`] if validation fails.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: TargetConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize this configuration to pretty-printed JSON and write it to
    /// `path`, creating parent directories if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the directory cannot be created or
    /// the file cannot be written.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Side length of the label map, `floor((output_size - 0.5) / stride)`.
    ///
    /// Returns `0` for configurations that would not fit a single cell.
    pub fn label_size(&self) -> usize {
        label_map_size(self.output_size, self.stride)
    }

    /// Side length of the center map (the full output resolution).
    pub fn center_size(&self) -> usize {
        self.output_size.max(0.0).floor() as usize
    }

    /// Validate all fields and return an error describing the first problem
    /// found, or `Ok(())` if the configuration is coherent.
    ///
    /// # Validated invariants
    ///
    /// - `clip_length` must be at least 1.
    /// - `output_size`, `stride`, both sigmas must be finite and > 0.
    /// - The label map must be at least one cell wide.
    /// - `radius_fraction` must be finite and >= 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clip_length == 0 {
            return Err(ConfigError::invalid_value("clip_length", "must be > 0"));
        }
        if !(self.output_size.is_finite() && self.output_size > 0.0) {
            return Err(ConfigError::invalid_value("output_size", "must be > 0.0"));
        }
        if !(self.stride.is_finite() && self.stride > 0.0) {
            return Err(ConfigError::invalid_value("stride", "must be > 0.0"));
        }
        if self.label_size() == 0 {
            return Err(ConfigError::invalid_value(
                "stride",
                format!(
                    "output_size {} with stride {} yields an empty label map",
                    self.output_size, self.stride
                ),
            ));
        }
        if !(self.sigma_label.is_finite() && self.sigma_label > 0.0) {
            return Err(ConfigError::invalid_value("sigma_label", "must be > 0.0"));
        }
        if !(self.sigma_center.is_finite() && self.sigma_center > 0.0) {
            return Err(ConfigError::invalid_value("sigma_center", "must be > 0.0"));
        }
        if !(self.radius_fraction.is_finite() && self.radius_fraction >= 0.0) {
            return Err(ConfigError::invalid_value("radius_fraction", "must be >= 0.0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        let cfg = TargetConfig::default();
        cfg.validate().expect("default config should be valid");
    }

    #[test]
    fn json_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let mut original = TargetConfig::default();
        original.center_policy = CenterPolicy::AllJoints;
        original.to_json(&path).expect("serialization should succeed");

        let loaded = TargetConfig::from_json(&path).expect("deserialization should succeed");
        assert_eq!(loaded, original);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{ "stride": 4.0 }"#).unwrap();

        let loaded = TargetConfig::from_json(&path).unwrap();
        assert_eq!(loaded.stride, 4.0);
        assert_eq!(loaded.clip_length, 5);
        assert_eq!(loaded.label_size(), 63);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            TargetConfig::from_json(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn zero_clip_length_is_invalid() {
        let mut cfg = TargetConfig::default();
        cfg.clip_length = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn stride_larger_than_frame_is_invalid() {
        let mut cfg = TargetConfig::default();
        cfg.stride = 512.0;
        assert_eq!(cfg.label_size(), 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_positive_sigma_is_invalid() {
        let mut cfg = TargetConfig::default();
        cfg.sigma_label = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = TargetConfig::default();
        cfg.sigma_center = f32::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_radius_is_invalid() {
        let mut cfg = TargetConfig::default();
        cfg.radius_fraction = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_fields_have_expected_defaults() {
        let cfg = TargetConfig::default();
        assert_eq!(cfg.clip_length, 5);
        assert_eq!(cfg.output_size, 256.0);
        assert_eq!(cfg.stride, 8.0);
        assert_eq!(cfg.sigma_label, 2.0);
        assert_eq!(cfg.sigma_center, 21.0);
        assert!((cfg.radius_fraction - 0.2).abs() < 1e-12);
        assert_eq!(cfg.center_policy, CenterPolicy::VisibleJoints);
        assert_eq!(cfg.label_size(), 31);
        assert_eq!(cfg.center_size(), 256);
    }
}
