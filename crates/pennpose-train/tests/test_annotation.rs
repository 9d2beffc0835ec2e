//! Integration tests for [`pennpose_train::annotation`].
//!
//! Covers the Penn Action → MPII joint convention and sequence assembly.

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use pennpose_train::annotation::{JointOrderingConvention, JointSet, NeckDerivation, Sequence};
use pennpose_train::HeatmapError;

/// One frame of 13 Penn Action joints: joint `j` sits at (10j, 100 + j).
fn penn_frame(visible: [f32; 13]) -> Sequence {
    let x = Array2::from_shape_fn((1, 13), |(_, j)| 10.0 * j as f32);
    let y = Array2::from_shape_fn((1, 13), |(_, j)| 100.0 + j as f32);
    let v = Array2::from_shape_vec((1, 13), visible.to_vec()).unwrap();
    Sequence::new(x, y, v).unwrap()
}

#[test]
fn penn_to_mpii_reorders_and_inserts_neck() {
    let conv = JointOrderingConvention::penn_action_to_mpii();
    assert_eq!(conv.source_joints(), 13);
    assert_eq!(conv.output_joints(), 14);

    let seq = conv.apply(&penn_frame([1.0; 13])).unwrap();
    assert_eq!(seq.dim(), (1, 14));
    assert_eq!(seq.convention().name(), "penn-action-mpii");

    // Output slot 0 is Penn joint 12, slot 9 is Penn joint 0 (head).
    assert_abs_diff_eq!(seq.x()[[0, 0]], 120.0);
    assert_abs_diff_eq!(seq.x()[[0, 9]], 0.0);
    assert_abs_diff_eq!(seq.y()[[0, 13]], 101.0);

    // Slot 8 is the neck: x = 0.5*0 + 0.25*(10 + 20), y = 0.2*100 + 0.4*(101 + 102).
    assert_abs_diff_eq!(seq.x()[[0, 8]], 7.5, epsilon = 1e-5);
    assert_abs_diff_eq!(seq.y()[[0, 8]], 101.2, epsilon = 1e-4);
    assert_eq!(seq.visible()[[0, 8]], 1.0);
}

#[test]
fn neck_hidden_unless_head_and_both_shoulders_visible() {
    let mut vis = [1.0; 13];
    vis[2] = 0.0;
    let seq = JointOrderingConvention::penn_action_to_mpii().apply(&penn_frame(vis)).unwrap();
    assert_eq!(seq.visible()[[0, 8]], 0.0);
}

#[test]
fn convention_rejects_wrong_joint_count() {
    let frame = JointSet::new(vec![0.0; 14], vec![0.0; 14], vec![1.0; 14]).unwrap();
    let err = JointOrderingConvention::penn_action_to_mpii()
        .apply(&Sequence::single(&frame))
        .unwrap_err();
    assert_eq!(err, HeatmapError::shape_mismatch(&[1, 13], &[1, 14]));
}

#[test]
fn custom_convention_with_neck_and_subset() {
    let neck = NeckDerivation { head: 0, left_shoulder: 1, right_shoulder: 2 };
    let conv = JointOrderingConvention::new("upper-body", 2, 3, Some(neck), vec![3, 0]).unwrap();
    let frame = JointSet::new(vec![0.0, 4.0, 8.0], vec![0.0, 10.0, 10.0], vec![1.0; 3]).unwrap();
    let seq = conv.apply(&Sequence::single(&frame)).unwrap();
    assert_eq!(seq.dim(), (1, 2));
    assert_abs_diff_eq!(seq.x()[[0, 0]], 3.0);
    assert_abs_diff_eq!(seq.y()[[0, 0]], 8.0);
    assert_eq!(seq.convention().version(), 2);
}

#[test]
fn with_convention_checks_joint_count() {
    let frame = JointSet::new(vec![0.0; 14], vec![0.0; 14], vec![1.0; 14]).unwrap();
    let seq = Sequence::single(&frame);
    let tagged = seq.clone().with_convention(JointOrderingConvention::penn_action_to_mpii());
    assert!(tagged.is_ok());
    assert!(seq.with_convention(JointOrderingConvention::identity(13)).is_err());
}

#[test]
fn empty_frame_list_is_rejected() {
    assert!(matches!(
        Sequence::from_frames(&[]),
        Err(HeatmapError::InvalidParameter { .. })
    ));
}
