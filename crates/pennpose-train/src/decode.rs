//! Heatmap decoder: per-joint peak finding.
//!
//! Every `(batch, stage, joint)` slice of a dense map is reduced to the
//! 1-indexed grid cell `(px, py)` holding its maximum response. A slice whose
//! maximum is not positive decodes to the `(0, 0)` sentinel, which downstream
//! scoring treats as an ordinary coordinate.

use ndarray::{s, Array4, ArrayView4, ArrayView5};

use crate::error::HeatmapError;
use crate::heatmap::label_grid_positions;

/// Peak of one slice given in row-major order.
///
/// Ties resolve to the first maximal index. NaN propagates through the max,
/// so a slice containing NaN decodes to the sentinel.
fn peak<'a>(values: impl Iterator<Item = &'a f32>, width: usize) -> [f32; 2] {
    let mut best = f32::NEG_INFINITY;
    let mut best_idx = None;
    for (idx, &v) in values.enumerate() {
        if v.is_nan() {
            return [0.0, 0.0];
        }
        if best_idx.is_none() || v > best {
            best = v;
            best_idx = Some(idx);
        }
    }
    match best_idx {
        Some(idx) if best > 0.0 => [(idx % width + 1) as f32, (idx / width + 1) as f32],
        _ => [0.0, 0.0],
    }
}

/// Decode `(B, S, J, H, W)` dense maps into `(B, S, J, 2)` coordinates.
///
/// `px = idx % W + 1`, `py = idx / W + 1` where `idx` is the row-major
/// position of the maximum.
pub fn decode(dense: ArrayView5<f32>) -> Array4<f32> {
    let (b, st, j, _h, w) = dense.dim();
    let mut out = Array4::<f32>::zeros((b, st, j, 2));
    for bi in 0..b {
        for si in 0..st {
            for ji in 0..j {
                let [px, py] = peak(dense.slice(s![bi, si, ji, .., ..]).iter(), w);
                out[[bi, si, ji, 0]] = px;
                out[[bi, si, ji, 1]] = py;
            }
        }
    }
    out
}

/// Decode flattened `(B, S, J, H*W)` maps given the row width `W`.
///
/// # Errors
///
/// [`HeatmapError::InvalidParameter`] for `width == 0`;
/// [`HeatmapError::ShapeMismatch`] when `H*W` is not a multiple of `width`.
pub fn decode_flat(dense: ArrayView4<f32>, width: usize) -> Result<Array4<f32>, HeatmapError> {
    if width == 0 {
        return Err(HeatmapError::invalid_parameter("width", "must be > 0"));
    }
    let (b, st, j, hw) = dense.dim();
    if hw % width != 0 {
        let rows = hw / width;
        return Err(HeatmapError::shape_mismatch(&[b, st, j, rows * width], &[b, st, j, hw]));
    }
    let mut out = Array4::<f32>::zeros((b, st, j, 2));
    for bi in 0..b {
        for si in 0..st {
            for ji in 0..j {
                let [px, py] = peak(dense.slice(s![bi, si, ji, ..]).iter(), width);
                out[[bi, si, ji, 0]] = px;
                out[[bi, si, ji, 1]] = py;
            }
        }
    }
    Ok(out)
}

/// Map a decoded 1-indexed label-map cell back to output-image pixels.
///
/// Uses the same grid as [`crate::heatmap::encode_label_map`], so the result
/// is within one cell of the joint that produced the peak. Returns `None` for
/// the `(0, 0)` sentinel and for cells outside `1..=label_size`.
pub fn cell_to_image(px: f32, py: f32, label_size: usize, stride: f32) -> Option<(f32, f32)> {
    let index = |p: f32| {
        let r = p.round();
        (r.is_finite() && r >= 1.0 && r <= label_size as f32).then(|| r as usize - 1)
    };
    let (cx, cy) = (index(px)?, index(py)?);
    let positions = label_grid_positions(label_size, stride);
    Some((positions[cx] as f32, positions[cy] as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array5;

    #[test]
    fn peak_is_one_indexed_column_then_row() {
        let mut dense = Array5::<f32>::zeros((1, 1, 1, 4, 5));
        dense[[0, 0, 0, 2, 3]] = 0.7;
        let c = decode(dense.view());
        assert_eq!(c[[0, 0, 0, 0]], 4.0);
        assert_eq!(c[[0, 0, 0, 1]], 3.0);
    }

    #[test]
    fn non_positive_maximum_is_sentinel() {
        let mut dense = Array5::<f32>::from_elem((1, 1, 2, 3, 3), -1.0);
        dense[[0, 0, 1, 1, 1]] = 0.0;
        let c = decode(dense.view());
        assert!(c.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn ties_resolve_to_first_index() {
        let mut dense = Array5::<f32>::zeros((1, 1, 1, 3, 3));
        dense[[0, 0, 0, 0, 2]] = 1.0;
        dense[[0, 0, 0, 2, 0]] = 1.0;
        let c = decode(dense.view());
        assert_eq!((c[[0, 0, 0, 0]], c[[0, 0, 0, 1]]), (3.0, 1.0));
    }

    #[test]
    fn nan_slice_decodes_to_sentinel() {
        let mut dense = Array5::<f32>::zeros((1, 1, 1, 2, 2));
        dense[[0, 0, 0, 0, 0]] = 0.5;
        dense[[0, 0, 0, 1, 1]] = f32::NAN;
        let c = decode(dense.view());
        assert_eq!((c[[0, 0, 0, 0]], c[[0, 0, 0, 1]]), (0.0, 0.0));
    }

    #[test]
    fn flat_layout_matches_dense_layout() {
        let mut dense = Array5::<f32>::zeros((2, 1, 1, 3, 4));
        dense[[0, 0, 0, 1, 2]] = 0.9;
        dense[[1, 0, 0, 2, 3]] = 0.4;
        let flat = dense.clone().into_shape((2, 1, 1, 12)).unwrap();
        assert_eq!(decode_flat(flat.view(), 4).unwrap(), decode(dense.view()));
    }

    #[test]
    fn flat_width_must_divide_length() {
        let flat = Array4::<f32>::zeros((1, 1, 1, 10));
        assert!(matches!(
            decode_flat(flat.view(), 4),
            Err(HeatmapError::ShapeMismatch { .. })
        ));
        assert!(decode_flat(flat.view(), 0).is_err());
    }

    #[test]
    fn cell_to_image_rejects_sentinel_and_out_of_range() {
        assert_eq!(cell_to_image(0.0, 0.0, 31, 8.0), None);
        assert_eq!(cell_to_image(32.0, 1.0, 31, 8.0), None);
        let (x, y) = cell_to_image(1.0, 31.0, 31, 8.0).unwrap();
        assert!((x + 4.5).abs() < 1e-4);
        assert!((y - 243.5).abs() < 1e-4);
    }
}
