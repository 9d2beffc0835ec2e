//! # PennPose training targets and accuracy
//!
//! Turns sparse 2-D joint annotations into dense heatmap targets for a
//! sequential pose-estimation model, and scores the model's dense output
//! against ground truth.
//!
//! ## Architecture
//!
//! ```text
//! raw annotations ──► annotation (Sequence, JointOrderingConvention)
//!                          │
//!                          ▼
//!                     heatmap ──► LabelMap (T, J+1, L, L) / CenterMap (T, 1, S, S)
//!
//! model output (B, S, J, H, W) ──► decode ──► (B, S, J, 2) ──► metrics ──► accuracy
//!
//! TargetConfig ──► dataset (clip windows, ClipIndex, SampleTargets, .npy I/O)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use pennpose_train::annotation::{JointSet, Sequence};
//! use pennpose_train::decode::decode;
//! use pennpose_train::heatmap::encode_label_map;
//! use pennpose_train::metrics::{accuracy, DEFAULT_RADIUS_FRACTION};
//! use ndarray::Axis;
//!
//! let frame = JointSet::new(vec![128.0, 64.0], vec![128.0, 200.0], vec![1.0, 1.0]).unwrap();
//! let seq = Sequence::single(&frame);
//!
//! let labels = encode_label_map(&seq, 256.0, 2.0, 8.0).unwrap();
//! assert_eq!(labels.data().shape(), &[1, 3, 31, 31]);
//!
//! // Score the targets against themselves as a (B=1, S=1, ...) batch.
//! let dense = labels.into_inner().insert_axis(Axis(0));
//! let coords = decode(dense.view());
//! assert_eq!(coords[[0, 0, 0, 0]], 17.0);
//! assert_eq!(accuracy(dense.view(), dense.view(), DEFAULT_RADIUS_FRACTION).unwrap(), 1.0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod annotation;
pub mod config;
pub mod dataset;
pub mod decode;
pub mod error;
pub mod heatmap;
pub mod metrics;

// Convenient re-exports at the crate root.
pub use annotation::{JointOrderingConvention, JointSet, Sequence};
pub use config::TargetConfig;
pub use decode::{cell_to_image, decode, decode_flat};
pub use error::{ConfigError, DatasetError, HeatmapError, PipelineError, PipelineResult};
pub use heatmap::{encode_center_map, encode_label_map, CenterMap, CenterPolicy, LabelMap};
pub use metrics::{
    accuracy, coord_accuracy, coord_accuracy_unstaged, AccuracyReport, MetricsAccumulator,
};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
