//! Coordinate annotation model.
//!
//! A [`Sequence`] holds `x`, `y` and `visible` as `[T, J]` arrays in the
//! output coordinate space (already resized/cropped to the canonical
//! `size × size` frame). A single frame is simply a sequence of length 1; the
//! encoder never inspects array rank to decide what it was given.
//!
//! Joint order is an explicit [`JointOrderingConvention`] carried by every
//! sequence. The Penn Action convention derives a synthetic neck joint from
//! the head and shoulders and then reorders the 14 joints into the MPII
//! skeleton order used by the model.

use std::collections::HashMap;

use ndarray::{concatenate, stack, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::HeatmapError;

// ---------------------------------------------------------------------------
// JointSet
// ---------------------------------------------------------------------------

/// Joint coordinates and visibility for a single time step.
///
/// `visible <= 0` marks a joint that contributes no signal to label maps.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSet {
    x: Array1<f32>,
    y: Array1<f32>,
    visible: Array1<f32>,
}

impl JointSet {
    /// Build a joint set from co-indexed coordinate and visibility vectors.
    ///
    /// # Errors
    ///
    /// [`HeatmapError::ShapeMismatch`] when the three vectors differ in length.
    pub fn new(x: Vec<f32>, y: Vec<f32>, visible: Vec<f32>) -> Result<Self, HeatmapError> {
        let n = x.len();
        if y.len() != n {
            return Err(HeatmapError::shape_mismatch(&[n], &[y.len()]));
        }
        if visible.len() != n {
            return Err(HeatmapError::shape_mismatch(&[n], &[visible.len()]));
        }
        Ok(JointSet { x: Array1::from(x), y: Array1::from(y), visible: Array1::from(visible) })
    }

    /// Parse a per-frame joint map of the form `{"0": [x, y, vis], "1": ...}`.
    ///
    /// The joint count is the number of entries; keys `"0"..="J-1"` must all
    /// be present.
    ///
    /// # Errors
    ///
    /// [`HeatmapError::MissingJoint`] for the first absent index.
    pub fn from_joint_map(map: &HashMap<String, [f32; 3]>) -> Result<Self, HeatmapError> {
        let n = map.len();
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        let mut visible = Vec::with_capacity(n);
        for p in 0..n {
            let [px, py, pv] =
                *map.get(&p.to_string()).ok_or(HeatmapError::MissingJoint { index: p })?;
            x.push(px);
            y.push(py);
            visible.push(pv);
        }
        JointSet::new(x, y, visible)
    }

    /// Number of joints `J`.
    pub fn num_joints(&self) -> usize {
        self.x.len()
    }

    /// x coordinates, one per joint.
    pub fn x(&self) -> ArrayView1<'_, f32> {
        self.x.view()
    }

    /// y coordinates, one per joint.
    pub fn y(&self) -> ArrayView1<'_, f32> {
        self.y.view()
    }

    /// Visibility flags, one per joint.
    pub fn visible(&self) -> ArrayView1<'_, f32> {
        self.visible.view()
    }
}

// ---------------------------------------------------------------------------
// JointOrderingConvention
// ---------------------------------------------------------------------------

/// Indices of the joints a synthetic neck is interpolated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeckDerivation {
    /// Head joint index.
    pub head: usize,
    /// First shoulder joint index.
    pub left_shoulder: usize,
    /// Second shoulder joint index.
    pub right_shoulder: usize,
}

impl NeckDerivation {
    /// Neck position for one frame.
    ///
    /// `x = 0.5·head + 0.25·(ls + rs)`, `y = 0.2·head + 0.4·(ls + rs)`,
    /// `visible = floor(mean(visibility of the three))`, so the neck is only
    /// visible when all three source joints are.
    fn derive(&self, x: ArrayView1<f32>, y: ArrayView1<f32>, v: ArrayView1<f32>) -> [f32; 3] {
        let (h, l, r) = (self.head, self.left_shoulder, self.right_shoulder);
        [
            0.5 * x[h] + 0.25 * (x[l] + x[r]),
            0.2 * y[h] + 0.4 * (y[l] + y[r]),
            ((v[h] + v[l] + v[r]) / 3.0).floor(),
        ]
    }
}

/// A named, versioned contract describing how raw annotation joints map to
/// the joint order seen by the model.
///
/// Applying a convention optionally appends a derived neck joint (at index
/// `source_joints`) and then selects joints by `order`.
#[derive(Debug, Clone, PartialEq)]
pub struct JointOrderingConvention {
    name: String,
    version: u32,
    source_joints: usize,
    neck: Option<NeckDerivation>,
    order: Vec<usize>,
}

/// Penn Action joints 0..13 plus the derived neck (13), in MPII order.
const PENN_TO_MPII_ORDER: [usize; 14] = [12, 10, 8, 7, 9, 11, 3, 5, 13, 0, 6, 4, 2, 1];

impl JointOrderingConvention {
    /// Build a custom convention.
    ///
    /// # Errors
    ///
    /// [`HeatmapError::InvalidParameter`] when the neck or `order` reference
    /// a joint that does not exist.
    pub fn new(
        name: impl Into<String>,
        version: u32,
        source_joints: usize,
        neck: Option<NeckDerivation>,
        order: Vec<usize>,
    ) -> Result<Self, HeatmapError> {
        if let Some(n) = neck {
            let max = n.head.max(n.left_shoulder).max(n.right_shoulder);
            if max >= source_joints {
                return Err(HeatmapError::invalid_parameter(
                    "neck",
                    format!("joint {max} out of range for {source_joints} source joints"),
                ));
            }
        }
        let available = source_joints + usize::from(neck.is_some());
        if let Some(&bad) = order.iter().find(|&&i| i >= available) {
            return Err(HeatmapError::invalid_parameter(
                "order",
                format!("joint {bad} out of range for {available} joints"),
            ));
        }
        Ok(JointOrderingConvention { name: name.into(), version, source_joints, neck, order })
    }

    /// The convention for data that is already in model order.
    pub fn identity(num_joints: usize) -> Self {
        JointOrderingConvention {
            name: "identity".to_string(),
            version: 1,
            source_joints: num_joints,
            neck: None,
            order: (0..num_joints).collect(),
        }
    }

    /// Penn Action (13 joints) → inferred neck → MPII order (14 joints).
    pub fn penn_action_to_mpii() -> Self {
        JointOrderingConvention {
            name: "penn-action-mpii".to_string(),
            version: 1,
            source_joints: 13,
            neck: Some(NeckDerivation { head: 0, left_shoulder: 1, right_shoulder: 2 }),
            order: PENN_TO_MPII_ORDER.to_vec(),
        }
    }

    /// Convention name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Convention version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Joint count expected in the raw annotation.
    pub fn source_joints(&self) -> usize {
        self.source_joints
    }

    /// Joint count after applying the convention.
    pub fn output_joints(&self) -> usize {
        self.order.len()
    }

    /// Re-express a raw sequence in this convention's joint order.
    ///
    /// The input is not modified; the returned sequence carries `self`.
    ///
    /// # Errors
    ///
    /// [`HeatmapError::ShapeMismatch`] when the sequence does not have
    /// `source_joints` joints.
    pub fn apply(&self, seq: &Sequence) -> Result<Sequence, HeatmapError> {
        let (t, j) = seq.dim();
        if j != self.source_joints {
            return Err(HeatmapError::shape_mismatch(&[t, self.source_joints], &[t, j]));
        }

        let (x, y, v) = match self.neck {
            Some(neck) => {
                let mut derived = Array2::<f32>::zeros((t, 3));
                for step in 0..t {
                    let n = neck.derive(seq.x.row(step), seq.y.row(step), seq.visible.row(step));
                    for (c, value) in n.into_iter().enumerate() {
                        derived[[step, c]] = value;
                    }
                }
                let append = |base: &Array2<f32>, c: usize| {
                    let column = derived.column(c).insert_axis(Axis(1));
                    concatenate(Axis(1), &[base.view(), column])
                        .map_err(|_| HeatmapError::shape_mismatch(&[t, j + 1], base.shape()))
                };
                (append(&seq.x, 0)?, append(&seq.y, 1)?, append(&seq.visible, 2)?)
            }
            None => (seq.x.clone(), seq.y.clone(), seq.visible.clone()),
        };

        Ok(Sequence {
            x: x.select(Axis(1), &self.order),
            y: y.select(Axis(1), &self.order),
            visible: v.select(Axis(1), &self.order),
            convention: self.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Sequence
// ---------------------------------------------------------------------------

/// `T` consecutive [`JointSet`]s sharing one joint order and coordinate
/// space, stored as `[T, J]` arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    x: Array2<f32>,
    y: Array2<f32>,
    visible: Array2<f32>,
    convention: JointOrderingConvention,
}

impl Sequence {
    /// Build a sequence from `[T, J]` arrays. The sequence is tagged with the
    /// identity convention.
    ///
    /// # Errors
    ///
    /// [`HeatmapError::ShapeMismatch`] when the three arrays differ in shape.
    pub fn new(x: Array2<f32>, y: Array2<f32>, visible: Array2<f32>) -> Result<Self, HeatmapError> {
        if y.shape() != x.shape() {
            return Err(HeatmapError::shape_mismatch(x.shape(), y.shape()));
        }
        if visible.shape() != x.shape() {
            return Err(HeatmapError::shape_mismatch(x.shape(), visible.shape()));
        }
        let convention = JointOrderingConvention::identity(x.ncols());
        Ok(Sequence { x, y, visible, convention })
    }

    /// Wrap one frame as a length-1 sequence.
    pub fn single(frame: &JointSet) -> Self {
        let row = |a: &Array1<f32>| a.clone().insert_axis(Axis(0));
        Sequence {
            x: row(&frame.x),
            y: row(&frame.y),
            visible: row(&frame.visible),
            convention: JointOrderingConvention::identity(frame.num_joints()),
        }
    }

    /// Stack frames in order.
    ///
    /// # Errors
    ///
    /// [`HeatmapError::ShapeMismatch`] when frames disagree on `J`, or
    /// [`HeatmapError::InvalidParameter`] when `frames` is empty.
    pub fn from_frames(frames: &[JointSet]) -> Result<Self, HeatmapError> {
        let first = frames
            .first()
            .ok_or_else(|| HeatmapError::invalid_parameter("frames", "must not be empty"))?;
        let j = first.num_joints();
        if let Some(bad) = frames.iter().find(|f| f.num_joints() != j) {
            return Err(HeatmapError::shape_mismatch(&[j], &[bad.num_joints()]));
        }
        let gather = |pick: fn(&JointSet) -> ArrayView1<'_, f32>| {
            let views: Vec<_> = frames.iter().map(pick).collect();
            stack(Axis(0), &views)
        };
        let x = gather(JointSet::x).map_err(|_| HeatmapError::shape_mismatch(&[j], &[]))?;
        let y = gather(JointSet::y).map_err(|_| HeatmapError::shape_mismatch(&[j], &[]))?;
        let visible =
            gather(JointSet::visible).map_err(|_| HeatmapError::shape_mismatch(&[j], &[]))?;
        Sequence::new(x, y, visible)
    }

    /// Tag an already-ordered sequence with the convention it follows.
    ///
    /// # Errors
    ///
    /// [`HeatmapError::ShapeMismatch`] when the convention's output joint
    /// count differs from `J`.
    pub fn with_convention(mut self, convention: JointOrderingConvention) -> Result<Self, HeatmapError> {
        if convention.output_joints() != self.num_joints() {
            return Err(HeatmapError::shape_mismatch(
                &[convention.output_joints()],
                &[self.num_joints()],
            ));
        }
        self.convention = convention;
        Ok(self)
    }

    /// `(T, J)`.
    pub fn dim(&self) -> (usize, usize) {
        self.x.dim()
    }

    /// Number of time steps `T`.
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    /// `true` when the sequence has no time steps.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of joints `J`.
    pub fn num_joints(&self) -> usize {
        self.x.ncols()
    }

    /// `[T, J]` x coordinates.
    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    /// `[T, J]` y coordinates.
    pub fn y(&self) -> ArrayView2<'_, f32> {
        self.y.view()
    }

    /// `[T, J]` visibility flags.
    pub fn visible(&self) -> ArrayView2<'_, f32> {
        self.visible.view()
    }

    /// The joint ordering this sequence follows.
    pub fn convention(&self) -> &JointOrderingConvention {
        &self.convention
    }

    /// The `len` frames starting at `start`, keeping this sequence's
    /// convention. `None` when the window runs past the end.
    pub fn slice_frames(&self, start: usize, len: usize) -> Option<Sequence> {
        let end = start.checked_add(len)?;
        if end > self.len() {
            return None;
        }
        let rows = |a: &Array2<f32>| a.slice(ndarray::s![start..end, ..]).to_owned();
        Some(Sequence {
            x: rows(&self.x),
            y: rows(&self.y),
            visible: rows(&self.visible),
            convention: self.convention.clone(),
        })
    }

    /// Copy out frame `t`, or `None` past the end.
    pub fn frame(&self, t: usize) -> Option<JointSet> {
        (t < self.len()).then(|| JointSet {
            x: self.x.row(t).to_owned(),
            y: self.y.row(t).to_owned(),
            visible: self.visible.row(t).to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn joint_set_rejects_ragged_input() {
        let err = JointSet::new(vec![1.0, 2.0], vec![1.0], vec![1.0, 1.0]).unwrap_err();
        assert_eq!(err, HeatmapError::shape_mismatch(&[2], &[1]));
    }

    #[test]
    fn joint_map_parses_in_index_order() {
        let mut map = HashMap::new();
        map.insert("1".to_string(), [3.0, 4.0, 0.0]);
        map.insert("0".to_string(), [1.0, 2.0, 1.0]);
        let js = JointSet::from_joint_map(&map).unwrap();
        assert_eq!(js.x(), array![1.0_f32, 3.0].view());
        assert_eq!(js.y(), array![2.0_f32, 4.0].view());
        assert_eq!(js.visible(), array![1.0_f32, 0.0].view());
    }

    #[test]
    fn joint_map_with_gap_reports_missing_joint() {
        let mut map = HashMap::new();
        map.insert("0".to_string(), [1.0, 2.0, 1.0]);
        map.insert("2".to_string(), [1.0, 2.0, 1.0]);
        assert_eq!(
            JointSet::from_joint_map(&map).unwrap_err(),
            HeatmapError::MissingJoint { index: 1 }
        );
    }

    #[test]
    fn sequence_rejects_visibility_shape_mismatch() {
        let x = Array2::<f32>::zeros((2, 3));
        let v = Array2::<f32>::zeros((2, 2));
        assert!(matches!(
            Sequence::new(x.clone(), x, v),
            Err(HeatmapError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn single_frame_is_length_one_sequence() {
        let js = JointSet::new(vec![5.0, 6.0], vec![7.0, 8.0], vec![1.0, 1.0]).unwrap();
        let seq = Sequence::single(&js);
        assert_eq!(seq.dim(), (1, 2));
        assert_eq!(seq.frame(0), Some(js));
        assert!(seq.frame(1).is_none());
    }

    #[test]
    fn from_frames_stacks_rows() {
        let a = JointSet::new(vec![1.0], vec![2.0], vec![1.0]).unwrap();
        let b = JointSet::new(vec![3.0], vec![4.0], vec![0.0]).unwrap();
        let seq = Sequence::from_frames(&[a, b]).unwrap();
        assert_eq!(seq.x(), array![[1.0_f32], [3.0]].view());
        assert_eq!(seq.visible(), array![[1.0_f32], [0.0]].view());
    }

    #[test]
    fn slice_frames_keeps_convention() {
        let frames: Vec<JointSet> = (0..4)
            .map(|t| JointSet::new(vec![t as f32], vec![0.0], vec![1.0]).unwrap())
            .collect();
        let seq = Sequence::from_frames(&frames).unwrap();
        let window = seq.slice_frames(1, 2).unwrap();
        assert_eq!(window.x(), array![[1.0_f32], [2.0]].view());
        assert_eq!(window.convention(), seq.convention());
        assert!(seq.slice_frames(3, 2).is_none());
    }

    #[test]
    fn neck_is_weighted_head_and_shoulders() {
        let neck = NeckDerivation { head: 0, left_shoulder: 1, right_shoulder: 2 };
        let [x, y, v] = neck.derive(
            array![10.0_f32, 20.0, 40.0].view(),
            array![10.0_f32, 20.0, 40.0].view(),
            array![1.0_f32, 1.0, 0.0].view(),
        );
        assert_abs_diff_eq!(x, 20.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 26.0, epsilon = 1e-6);
        assert_eq!(v, 0.0);
    }

    #[test]
    fn convention_rejects_out_of_range_order() {
        assert!(JointOrderingConvention::new("bad", 1, 3, None, vec![0, 3]).is_err());
        let neck = NeckDerivation { head: 0, left_shoulder: 1, right_shoulder: 2 };
        assert!(JointOrderingConvention::new("ok", 1, 3, Some(neck), vec![3, 0]).is_ok());
    }
}
