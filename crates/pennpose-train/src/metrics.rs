//! Accuracy scoring for decoded joint coordinates.
//!
//! A predicted joint is **correct** when its Euclidean distance from the
//! ground truth is at most `r × max(w, h)`, where `w` and `h` are the x- and
//! y-spans of that sample's decoded ground truth across every stage and
//! joint. The threshold therefore scales with the person, and a sample whose
//! ground truth collapses to a single point only accepts exact matches.
//!
//! - [`accuracy`]: dense `(B, S, J, H, W)` maps in, scalar ratio out.
//! - [`coord_accuracy`]: already-decoded `(B, S, J, 2)` coordinates.
//! - [`score_coords`]: the same, returning a full [`AccuracyReport`].
//! - [`MetricsAccumulator`]: sums reports over mini-batches.
//!
//! Distances are measured in label-map cells, the unit the decoder emits.
//! NaN coordinates are not guarded: they fail every comparison and count as
//! incorrect.

use ndarray::{s, Array4, ArrayView3, ArrayView4, ArrayView5, Axis};
use tracing::{debug, warn};

use crate::decode::decode;
use crate::error::HeatmapError;

/// Fraction of the ground-truth box side used as the correctness radius.
pub const DEFAULT_RADIUS_FRACTION: f64 = 0.2;

// ---------------------------------------------------------------------------
// AccuracyReport
// ---------------------------------------------------------------------------

/// Correct/total counts from one or more scored batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccuracyReport {
    /// Number of `(sample, stage, joint)` predictions within the threshold.
    pub correct: usize,
    /// Number of `(sample, stage, joint)` predictions scored.
    pub total: usize,
    /// `correct` broken down by joint index.
    pub per_joint_correct: Vec<usize>,
    /// `total` broken down by joint index.
    pub per_joint_total: Vec<usize>,
}

impl AccuracyReport {
    /// `correct / total`, or `0.0` when nothing was scored.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    /// Per-joint accuracy; joints never scored report `0.0`.
    pub fn per_joint_ratio(&self) -> Vec<f64> {
        self.per_joint_correct
            .iter()
            .zip(&self.per_joint_total)
            .map(|(&c, &t)| if t == 0 { 0.0 } else { c as f64 / t as f64 })
            .collect()
    }

    /// Add another report's counts into this one.
    pub fn merge(&mut self, other: &AccuracyReport) {
        self.correct += other.correct;
        self.total += other.total;
        let joints = self.per_joint_total.len().max(other.per_joint_total.len());
        self.per_joint_correct.resize(joints, 0);
        self.per_joint_total.resize(joints, 0);
        for (j, (&c, &t)) in
            other.per_joint_correct.iter().zip(&other.per_joint_total).enumerate()
        {
            self.per_joint_correct[j] += c;
            self.per_joint_total[j] += t;
        }
    }

    /// A human-readable summary line suitable for logging.
    pub fn summary(&self) -> String {
        format!("accuracy={:.4}  ({}/{} correct)", self.ratio(), self.correct, self.total)
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Largest side of the axis-aligned box around one sample's ground truth.
///
/// `gt` is `(S, J, 2)`. NaN coordinates are skipped by the min/max folds.
fn gt_box_side(gt: ArrayView3<f32>) -> f64 {
    let span = |c: usize| {
        let col = gt.slice(s![.., .., c]);
        let lo = col.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = col.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        f64::from(hi) - f64::from(lo)
    };
    span(0).max(span(1))
}

/// Score decoded predictions against decoded ground truth.
///
/// `pred` is `(B, S, J, 2)`; `target` is `(B, S_t, J, 2)` with `S_t == S` or
/// `S_t == 1`, the latter applied to every stage.
///
/// # Errors
///
/// [`HeatmapError::ShapeMismatch`] for any other shape combination;
/// [`HeatmapError::InvalidParameter`] for a negative or non-finite
/// `radius_fraction`.
pub fn score_coords(
    pred: ArrayView4<f32>,
    target: ArrayView4<f32>,
    radius_fraction: f64,
) -> Result<AccuracyReport, HeatmapError> {
    if !(radius_fraction.is_finite() && radius_fraction >= 0.0) {
        return Err(HeatmapError::invalid_parameter(
            "radius_fraction",
            format!("must be >= 0, got {radius_fraction}"),
        ));
    }
    let (b, st, j, c) = pred.dim();
    let (tb, tst, tj, tc) = target.dim();
    if c != 2 || tc != 2 || tb != b || tj != j || !(tst == st || tst == 1) {
        return Err(HeatmapError::shape_mismatch(&[b, st, j, 2], target.shape()));
    }

    let mut report = AccuracyReport {
        correct: 0,
        total: b * st * j,
        per_joint_correct: vec![0; j],
        per_joint_total: vec![b * st; j],
    };

    for bi in 0..b {
        let gt = target.slice(s![bi, .., .., ..]);
        let side = gt_box_side(gt);
        let threshold = radius_fraction * side;
        if side == 0.0 && j > 0 {
            warn!(sample = bi, "ground-truth box has zero extent; only exact matches count");
        }
        debug!(sample = bi, threshold, "scoring sample");

        for si in 0..st {
            let ts = if tst == 1 { 0 } else { si };
            for ji in 0..j {
                let dx = f64::from(pred[[bi, si, ji, 0]]) - f64::from(gt[[ts, ji, 0]]);
                let dy = f64::from(pred[[bi, si, ji, 1]]) - f64::from(gt[[ts, ji, 1]]);
                if (dx * dx + dy * dy).sqrt() <= threshold {
                    report.correct += 1;
                    report.per_joint_correct[ji] += 1;
                }
            }
        }
    }
    Ok(report)
}

/// Fraction of correct joints for already-decoded coordinates.
///
/// `target` carries a stage axis. Per-sample `(B, J, 2)` ground truth goes
/// through [`coord_accuracy_unstaged`] instead.
///
/// See [`score_coords`] for shapes and errors.
pub fn coord_accuracy(
    pred: ArrayView4<f32>,
    target: ArrayView4<f32>,
    radius_fraction: f64,
) -> Result<f64, HeatmapError> {
    score_coords(pred, target, radius_fraction).map(|r| r.ratio())
}

/// [`coord_accuracy`] for `(B, J, 2)` ground truth shared by every stage.
///
/// # Errors
///
/// See [`score_coords`].
pub fn coord_accuracy_unstaged(
    pred: ArrayView4<f32>,
    target: ArrayView3<f32>,
    radius_fraction: f64,
) -> Result<f64, HeatmapError> {
    coord_accuracy(pred, target.insert_axis(Axis(1)), radius_fraction)
}

/// Prepend copies of stage 0 until `coords` has `stages` stages.
fn align_stages(coords: Array4<f32>, stages: usize) -> Array4<f32> {
    let (b, have, j, c) = coords.dim();
    if have == stages {
        return coords;
    }
    let pad = stages - have;
    let mut out = Array4::<f32>::zeros((b, stages, j, c));
    for si in 0..stages {
        let from = si.saturating_sub(pad);
        out.slice_mut(s![.., si, .., ..]).assign(&coords.slice(s![.., from, .., ..]));
    }
    out
}

/// Decode dense predictions and targets and score them.
///
/// # Errors
///
/// [`HeatmapError::ShapeMismatch`] when batch, joint or spatial dimensions
/// differ, when `target` has more stages than `pred`, or when `target` has
/// no stages and `pred` does.
pub fn score_dense(
    pred: ArrayView5<f32>,
    target: ArrayView5<f32>,
    radius_fraction: f64,
) -> Result<AccuracyReport, HeatmapError> {
    let (b, st, j, h, w) = pred.dim();
    let (tb, tst, tj, th, tw) = target.dim();
    if tb != b || tj != j || th != h || tw != w || tst > st || (tst == 0 && st > 0) {
        return Err(HeatmapError::shape_mismatch(&[b, st, j, h, w], target.shape()));
    }
    let pred_coords = decode(pred);
    let target_coords = align_stages(decode(target), st);
    score_coords(pred_coords.view(), target_coords.view(), radius_fraction)
}

/// Fraction of correct joints for dense `(B, S, J, H, W)` maps.
///
/// A target with fewer stages than the prediction has its first stage
/// replicated in front until the counts match. Returns `0.0` for empty input.
///
/// # Errors
///
/// See [`score_dense`].
pub fn accuracy(
    pred: ArrayView5<f32>,
    target: ArrayView5<f32>,
    radius_fraction: f64,
) -> Result<f64, HeatmapError> {
    score_dense(pred, target, radius_fraction).map(|r| r.ratio())
}

// ---------------------------------------------------------------------------
// MetricsAccumulator
// ---------------------------------------------------------------------------

/// Running accumulator for accuracy across an evaluation pass.
///
/// Call one of the `update_*` methods per mini-batch, then
/// [`MetricsAccumulator::finalize`].
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    radius_fraction: f64,
    report: AccuracyReport,
    batches: usize,
}

impl MetricsAccumulator {
    /// Create an accumulator scoring with the given radius fraction.
    pub fn new(radius_fraction: f64) -> Self {
        MetricsAccumulator { radius_fraction, report: AccuracyReport::default(), batches: 0 }
    }

    /// Score one batch of dense maps and add it to the running totals.
    ///
    /// # Errors
    ///
    /// See [`score_dense`]. A failed batch leaves the totals untouched.
    pub fn update_dense(
        &mut self,
        pred: ArrayView5<f32>,
        target: ArrayView5<f32>,
    ) -> Result<(), HeatmapError> {
        let r = score_dense(pred, target, self.radius_fraction)?;
        self.add(&r);
        Ok(())
    }

    /// Score one batch of decoded coordinates and add it to the running
    /// totals.
    ///
    /// # Errors
    ///
    /// See [`score_coords`]. A failed batch leaves the totals untouched.
    pub fn update_coords(
        &mut self,
        pred: ArrayView4<f32>,
        target: ArrayView4<f32>,
    ) -> Result<(), HeatmapError> {
        let r = score_coords(pred, target, self.radius_fraction)?;
        self.add(&r);
        Ok(())
    }

    /// Add a report computed elsewhere.
    pub fn add(&mut self, report: &AccuracyReport) {
        self.report.merge(report);
        self.batches += 1;
    }

    /// Number of batches seen.
    pub fn num_batches(&self) -> usize {
        self.batches
    }

    /// The combined report, or `None` if nothing has been scored.
    pub fn finalize(&self) -> Option<AccuracyReport> {
        (self.report.total > 0).then(|| self.report.clone())
    }

    /// Reset to the empty state.
    pub fn reset(&mut self) {
        self.report = AccuracyReport::default();
        self.batches = 0;
    }
}

impl Default for MetricsAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS_FRACTION)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
