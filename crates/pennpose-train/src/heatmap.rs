//! Gaussian heatmap encoder.
//!
//! Converts sparse joint annotations into dense training targets:
//!
//! - [`encode_label_map`]: one Gaussian per joint per time step on a
//!   stride-downsampled grid, shape `(T, J+1, L, L)` with
//!   `L = floor((size - 0.5) / stride)`.
//! - [`encode_center_map`]: one Gaussian per time step at the aggregate joint
//!   center on the full-resolution grid, shape `(T, 1, size, size)`.
//!
//! Responses below [`MIN_RESPONSE`] are zeroed and responses above 1 are
//! clamped to exactly 1, so every value lies in `[0, 1]`.
//!
//! # Label-map grid
//!
//! Cell `k` of an `L`-cell axis sits at image coordinate
//!
//! ```text
//! g_k = k · L / (L − 1)            (k = 0..L, g_0 = 0 when L = 1)
//! pos_k = (g_k − 1) · stride + start,   start = stride / 2 − 0.5
//! ```
//!
//! i.e. `L` evenly spaced samples of `[0, L]`. The decoder's 1-indexed cells
//! invert it at cell granularity (see [`crate::decode::cell_to_image`]).

use ndarray::{Array4, ArrayViewMut2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotation::Sequence;
use crate::error::HeatmapError;

/// Responses strictly below this value are written as exactly zero.
pub const MIN_RESPONSE: f32 = 0.01;

// ---------------------------------------------------------------------------
// CenterPolicy
// ---------------------------------------------------------------------------

/// Which joints contribute to the aggregate center of a center map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CenterPolicy {
    /// Only joints with `visible > 0`. A frame with no visible joint gets an
    /// all-zero center map.
    #[default]
    VisibleJoints,
    /// Every joint, regardless of visibility.
    AllJoints,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Per-joint training targets, shape `(T, J+1, L, L)`.
///
/// Channel `J` is reserved for a background class. It is currently unused
/// and always all-zero; consumers must not expect signal in it.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    data: Array4<f32>,
}

impl LabelMap {
    /// Index of the reserved background channel (`J`).
    pub fn reserved_channel(&self) -> usize {
        self.data.shape()[1] - 1
    }

    /// Number of joint channels `J` (excluding the reserved channel).
    pub fn num_joints(&self) -> usize {
        self.reserved_channel()
    }

    /// Side length `L` of each map.
    pub fn label_size(&self) -> usize {
        self.data.shape()[2]
    }

    /// The underlying `(T, J+1, L, L)` array.
    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    /// Consume the wrapper and return the array.
    pub fn into_inner(self) -> Array4<f32> {
        self.data
    }
}

/// Coarse localisation prior, shape `(T, 1, size, size)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CenterMap {
    data: Array4<f32>,
}

impl CenterMap {
    /// The underlying `(T, 1, size, size)` array.
    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    /// Consume the wrapper and return the array.
    pub fn into_inner(self) -> Array4<f32> {
        self.data
    }
}

// ---------------------------------------------------------------------------
// Grid helpers
// ---------------------------------------------------------------------------

/// Label-map side length for an output frame of `size` pixels.
///
/// `floor((size - 0.5) / stride)`, or `0` when that is not a positive finite
/// number.
pub fn label_map_size(size: f32, stride: f32) -> usize {
    let cells = ((f64::from(size) - 0.5) / f64::from(stride)).floor();
    if cells.is_finite() && cells > 0.0 {
        cells as usize
    } else {
        0
    }
}

/// Image-space coordinate of every cell along one label-map axis.
pub(crate) fn label_grid_positions(label_size: usize, stride: f32) -> Vec<f64> {
    let stride = f64::from(stride);
    let start = stride / 2.0 - 0.5;
    let step = if label_size > 1 {
        label_size as f64 / (label_size - 1) as f64
    } else {
        0.0
    };
    (0..label_size)
        .map(|k| (k as f64 * step - 1.0) * stride + start)
        .collect()
}

/// Write a clipped Gaussian centred at `(cx, cy)` into `out`.
///
/// `positions[k]` is the image coordinate of row/column `k`.
fn rasterize(mut out: ArrayViewMut2<f32>, positions: &[f64], cx: f64, cy: f64, sigma: f64) {
    let inv_two_sigma_sq = 0.5 / (sigma * sigma);
    for ((r, c), cell) in out.indexed_iter_mut() {
        let dx = positions[c] - cx;
        let dy = positions[r] - cy;
        let response = (-(dx * dx + dy * dy) * inv_two_sigma_sq).exp() as f32;
        *cell = if response < MIN_RESPONSE {
            0.0
        } else if response > 1.0 {
            1.0
        } else {
            response
        };
    }
}

fn check_sigma(sigma: f32) -> Result<(), HeatmapError> {
    if sigma.is_finite() && sigma > 0.0 {
        Ok(())
    } else {
        Err(HeatmapError::invalid_parameter("sigma", format!("must be > 0, got {sigma}")))
    }
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

/// Encode a sequence into per-joint Gaussian label maps.
///
/// Joints with `visible <= 0` get an all-zero channel. The reserved channel
/// `J` is always zero. The sequence is borrowed and never modified.
///
/// # Errors
///
/// [`HeatmapError::InvalidParameter`] when `sigma` or `stride` is not a
/// positive finite number or the resulting label map would be empty.
pub fn encode_label_map(
    seq: &Sequence,
    size: f32,
    sigma: f32,
    stride: f32,
) -> Result<LabelMap, HeatmapError> {
    check_sigma(sigma)?;
    if !(stride.is_finite() && stride > 0.0) {
        return Err(HeatmapError::invalid_parameter("stride", format!("must be > 0, got {stride}")));
    }
    let label_size = label_map_size(size, stride);
    if label_size == 0 {
        return Err(HeatmapError::invalid_parameter(
            "size",
            format!("size {size} with stride {stride} yields an empty label map"),
        ));
    }

    let (t, j) = seq.dim();
    let positions = label_grid_positions(label_size, stride);
    let (xs, ys, vis) = (seq.x(), seq.y(), seq.visible());
    debug!(t, joints = j, label_size, sigma, stride, "encoding label map");

    let mut data = Array4::<f32>::zeros((t, j + 1, label_size, label_size));
    for step in 0..t {
        for p in 0..j {
            if !(vis[[step, p]] > 0.0) {
                continue;
            }
            let slot = data.slice_mut(ndarray::s![step, p, .., ..]);
            rasterize(
                slot,
                &positions,
                f64::from(xs[[step, p]]),
                f64::from(ys[[step, p]]),
                f64::from(sigma),
            );
        }
    }
    Ok(LabelMap { data })
}

/// Encode a sequence into one full-resolution center map per time step.
///
/// The center is the mean position of the joints selected by `policy`; a
/// time step with no selected joint gets an all-zero map.
///
/// # Errors
///
/// [`HeatmapError::InvalidParameter`] when `sigma` is not a positive finite
/// number or `size < 1`.
pub fn encode_center_map(
    seq: &Sequence,
    size: f32,
    sigma: f32,
    policy: CenterPolicy,
) -> Result<CenterMap, HeatmapError> {
    check_sigma(sigma)?;
    if !(size.is_finite() && size >= 1.0) {
        return Err(HeatmapError::invalid_parameter("size", format!("must be >= 1, got {size}")));
    }
    let cells = size.floor() as usize;
    let positions: Vec<f64> = (0..cells).map(|k| k as f64).collect();
    let (t, j) = seq.dim();
    let (xs, ys, vis) = (seq.x(), seq.y(), seq.visible());
    debug!(t, joints = j, cells, sigma, ?policy, "encoding center map");

    let mut data = Array4::<f32>::zeros((t, 1, cells, cells));
    for step in 0..t {
        let (mut sx, mut sy, mut n) = (0.0_f64, 0.0_f64, 0_usize);
        for p in 0..j {
            if policy == CenterPolicy::VisibleJoints && !(vis[[step, p]] > 0.0) {
                continue;
            }
            sx += f64::from(xs[[step, p]]);
            sy += f64::from(ys[[step, p]]);
            n += 1;
        }
        if n == 0 {
            continue;
        }
        let slot = data.slice_mut(ndarray::s![step, 0, .., ..]);
        rasterize(slot, &positions, sx / n as f64, sy / n as f64, f64::from(sigma));
    }
    Ok(CenterMap { data })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
