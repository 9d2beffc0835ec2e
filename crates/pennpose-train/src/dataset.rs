//! Dataset helpers: clip windowing, the persisted clip index, sequence files
//! and per-sample target assembly.
//!
//! A video of `n` frames is cut into `T`-frame clips starting at
//! `0, T, 2T, ...`; the last start position is always dropped so every clip
//! has `T` real frames after it, even when `n` is an exact multiple of `T`.
//!
//! # Clip index layout
//!
//! ```text
//! {
//!   "0": { "annotations_path": "labels/0001.json", "frames_root": "frames/0001", "start_index": 0 },
//!   "1": { "annotations_path": "labels/0001.json", "frames_root": "frames/0001", "start_index": 5 },
//!   ...
//! }
//! ```
//!
//! # Example
//!
//! ```rust
//! use pennpose_train::dataset::clip_start_indices;
//!
//! assert_eq!(clip_start_indices(23, 5), vec![0, 5, 10, 15]);
//! assert_eq!(clip_start_indices(10, 5), vec![0]);
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::{concatenate, Array, Array2, Array5, ArrayD, ArrayView2, Axis, Dimension, Ix5};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::annotation::Sequence;
use crate::config::TargetConfig;
use crate::error::{DatasetError, HeatmapError};
use crate::heatmap::{encode_center_map, encode_label_map, CenterMap, LabelMap};

// ---------------------------------------------------------------------------
// Clip windowing
// ---------------------------------------------------------------------------

/// Start frames of the `clip_length`-frame clips cut from `num_frames`
/// frames.
///
/// Starts step by `clip_length` from 0 and the final start is dropped.
/// Returns an empty list when `clip_length == 0` or the video is shorter
/// than two steps.
pub fn clip_start_indices(num_frames: usize, clip_length: usize) -> Vec<usize> {
    if clip_length == 0 {
        return Vec::new();
    }
    let mut starts: Vec<usize> = (0..num_frames).step_by(clip_length).collect();
    starts.pop();
    starts
}

// ---------------------------------------------------------------------------
// ClipIndex
// ---------------------------------------------------------------------------

/// One clip: which annotation file and frame directory it comes from and the
/// first frame it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipIndexEntry {
    /// Annotation file of the source video.
    pub annotations_path: PathBuf,
    /// Directory holding the source video's frames.
    pub frames_root: PathBuf,
    /// First frame of the clip.
    pub start_index: usize,
}

/// A video to be cut into clips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    /// Annotation file of the video.
    pub annotations_path: PathBuf,
    /// Directory holding the video's frames.
    pub frames_root: PathBuf,
    /// Number of annotated frames.
    pub num_frames: usize,
}

/// Ordered list of clips, persisted as a JSON object keyed by clip number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipIndex {
    entries: Vec<ClipIndexEntry>,
}

impl ClipIndex {
    /// Cut every video into clips, in input order.
    pub fn build(videos: &[VideoSource], clip_length: usize) -> Self {
        let mut entries = Vec::new();
        for video in videos {
            let starts = clip_start_indices(video.num_frames, clip_length);
            if starts.is_empty() {
                warn!(
                    path = %video.annotations_path.display(),
                    frames = video.num_frames,
                    clip_length,
                    "video too short for a single clip, skipping"
                );
                continue;
            }
            debug!(path = %video.annotations_path.display(), clips = starts.len(), "indexed video");
            entries.extend(starts.into_iter().map(|start_index| ClipIndexEntry {
                annotations_path: video.annotations_path.clone(),
                frames_root: video.frames_root.clone(),
                start_index,
            }));
        }
        info!(videos = videos.len(), clips = entries.len(), "built clip index");
        ClipIndex { entries }
    }

    /// Wrap an already-ordered entry list.
    pub fn from_entries(entries: Vec<ClipIndexEntry>) -> Self {
        ClipIndex { entries }
    }

    /// Number of clips.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the index holds no clips.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clip `idx`, or `None` out of range.
    pub fn get(&self, idx: usize) -> Option<&ClipIndexEntry> {
        self.entries.get(idx)
    }

    /// Iterate clips in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ClipIndexEntry> {
        self.entries.iter()
    }

    /// Load an index written by [`ClipIndex::save`].
    ///
    /// # Errors
    ///
    /// [`DatasetError::Io`] / [`DatasetError::Json`] for unreadable files,
    /// [`DatasetError::InvalidFormat`] when the keys are not exactly
    /// `"0".."n-1"`.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
        let raw: BTreeMap<String, ClipIndexEntry> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| DatasetError::Json { path: path.to_path_buf(), source })?;

        let mut keyed = Vec::with_capacity(raw.len());
        for (key, entry) in raw {
            let idx: usize = key.parse().map_err(|_| {
                DatasetError::invalid_format(path, format!("non-numeric key `{key}`"))
            })?;
            keyed.push((idx, entry));
        }
        keyed.sort_by_key(|(idx, _)| *idx);
        let gap = keyed.iter().enumerate().find(|(pos, (idx, _))| pos != idx);
        if let Some((pos, (idx, _))) = gap {
            return Err(DatasetError::invalid_format(
                path,
                format!("expected key `{pos}`, found `{idx}`"),
            ));
        }
        Ok(ClipIndex { entries: keyed.into_iter().map(|(_, e)| e).collect() })
    }

    /// Write the index as pretty-printed JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// [`DatasetError::Io`] / [`DatasetError::Json`].
    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
        }
        let keyed: BTreeMap<usize, &ClipIndexEntry> = self.entries.iter().enumerate().collect();
        let json = serde_json::to_string_pretty(&keyed)
            .map_err(|source| DatasetError::Json { path: path.to_path_buf(), source })?;
        std::fs::write(path, json).map_err(|e| DatasetError::io(path, e))
    }
}

impl<'a> IntoIterator for &'a ClipIndex {
    type Item = &'a ClipIndexEntry;
    type IntoIter = std::slice::Iter<'a, ClipIndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Sequence files
// ---------------------------------------------------------------------------

/// On-disk form of a [`Sequence`]: three `[T][J]` nested lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceFile {
    /// x coordinates per frame.
    pub x: Vec<Vec<f32>>,
    /// y coordinates per frame.
    pub y: Vec<Vec<f32>>,
    /// Visibility flags per frame.
    pub visible: Vec<Vec<f32>>,
}

impl SequenceFile {
    /// Capture a sequence's arrays.
    pub fn from_sequence(seq: &Sequence) -> Self {
        let rows = |a: ArrayView2<f32>| -> Vec<Vec<f32>> {
            a.outer_iter().map(|r| r.to_vec()).collect()
        };
        SequenceFile { x: rows(seq.x()), y: rows(seq.y()), visible: rows(seq.visible()) }
    }

    /// Convert into a [`Sequence`] tagged with the identity convention.
    ///
    /// `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// [`DatasetError::InvalidFormat`] for ragged rows, or
    /// [`DatasetError::Heatmap`] when the three arrays disagree in shape.
    pub fn into_sequence(self, path: &Path) -> Result<Sequence, DatasetError> {
        let x = to_array2(self.x, path, "x")?;
        let y = to_array2(self.y, path, "y")?;
        let visible = to_array2(self.visible, path, "visible")?;
        Ok(Sequence::new(x, y, visible)?)
    }
}

fn to_array2(rows: Vec<Vec<f32>>, path: &Path, field: &str) -> Result<Array2<f32>, DatasetError> {
    let t = rows.len();
    let j = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().position(|r| r.len() != j) {
        return Err(DatasetError::invalid_format(
            path,
            format!("`{field}` row {bad} has {} joints, expected {j}", rows[bad].len()),
        ));
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((t, j), flat)
        .map_err(|e| DatasetError::invalid_format(path, format!("`{field}`: {e}")))
}

/// Read a [`SequenceFile`] from JSON.
///
/// # Errors
///
/// See [`SequenceFile::into_sequence`]; plus [`DatasetError::Io`] and
/// [`DatasetError::Json`].
pub fn read_sequence_json(path: &Path) -> Result<Sequence, DatasetError> {
    let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let raw: SequenceFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|source| DatasetError::Json { path: path.to_path_buf(), source })?;
    raw.into_sequence(path)
}

/// Write a sequence as JSON, creating parent directories.
///
/// # Errors
///
/// [`DatasetError::Io`] / [`DatasetError::Json`].
pub fn write_sequence_json(seq: &Sequence, path: &Path) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
    }
    let json = serde_json::to_string(&SequenceFile::from_sequence(seq))
        .map_err(|source| DatasetError::Json { path: path.to_path_buf(), source })?;
    std::fs::write(path, json).map_err(|e| DatasetError::io(path, e))
}

// ---------------------------------------------------------------------------
// NPY helpers
// ---------------------------------------------------------------------------

/// Write an `f32` array of any rank to a `.npy` file.
///
/// # Errors
///
/// [`DatasetError::Io`] if the file cannot be created, [`DatasetError::Npy`]
/// if serialization fails.
pub fn write_npy<D: Dimension>(path: &Path, array: &Array<f32, D>) -> Result<(), DatasetError> {
    let file = File::create(path).map_err(|e| DatasetError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    array.write_npy(&mut writer).map_err(|e| DatasetError::npy(path, e.to_string()))?;
    writer.flush().map_err(|e| DatasetError::io(path, e))
}

/// Read a 5-D `f32` `.npy` array such as a `(B, S, J, H, W)` prediction.
///
/// # Errors
///
/// [`DatasetError::Io`] if the file cannot be opened, [`DatasetError::Npy`]
/// for malformed data, [`DatasetError::InvalidFormat`] for the wrong rank.
pub fn read_npy5(path: &Path) -> Result<Array5<f32>, DatasetError> {
    let file = File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let arr = ArrayD::<f32>::read_npy(BufReader::new(file))
        .map_err(|e| DatasetError::npy(path, e.to_string()))?;
    let shape = arr.shape().to_vec();
    arr.into_dimensionality::<Ix5>().map_err(|_| {
        DatasetError::invalid_format(path, format!("expected a 5-D array, got shape {shape:?}"))
    })
}

// ---------------------------------------------------------------------------
// SampleTargets
// ---------------------------------------------------------------------------

/// Everything one training sample needs besides its frames.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTargets {
    /// `(T, J+1, L, L)` per-joint label maps.
    pub label_map: LabelMap,
    /// `(T, 1, size, size)` center maps.
    pub center_map: CenterMap,
    /// `(T, 2J)`: all x coordinates followed by all y coordinates.
    pub meta: Array2<f32>,
}

impl SampleTargets {
    /// Encode `seq` with the sigmas, stride and size in `cfg`.
    ///
    /// # Errors
    ///
    /// [`DatasetError::Heatmap`] when the encoder rejects the parameters.
    pub fn build(seq: &Sequence, cfg: &TargetConfig) -> Result<Self, DatasetError> {
        if seq.len() != cfg.clip_length {
            debug!(
                frames = seq.len(),
                clip_length = cfg.clip_length,
                "sequence length differs from clip length"
            );
        }
        let label_map = encode_label_map(seq, cfg.output_size, cfg.sigma_label, cfg.stride)?;
        let center_map =
            encode_center_map(seq, cfg.output_size, cfg.sigma_center, cfg.center_policy)?;
        let meta = concatenate(Axis(1), &[seq.x(), seq.y()])
            .map_err(|_| HeatmapError::shape_mismatch(seq.x().shape(), seq.y().shape()))?;
        Ok(SampleTargets { label_map, center_map, meta })
    }

    /// Write `label_map.npy`, `center_map.npy` and `meta.npy` into `dir`,
    /// creating it if needed.
    ///
    /// # Errors
    ///
    /// [`DatasetError::Io`] / [`DatasetError::Npy`].
    pub fn write_npy(&self, dir: &Path) -> Result<(), DatasetError> {
        std::fs::create_dir_all(dir).map_err(|e| DatasetError::io(dir, e))?;
        write_npy(&dir.join("label_map.npy"), self.label_map.data())?;
        write_npy(&dir.join("center_map.npy"), self.center_map.data())?;
        write_npy(&dir.join("meta.npy"), &self.meta)?;
        info!(dir = %dir.display(), shape = ?self.label_map.data().shape(), "wrote sample targets");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::JointSet;
    use tempfile::tempdir;

    #[test]
    fn last_window_is_dropped() {
        assert_eq!(clip_start_indices(23, 5), vec![0, 5, 10, 15]);
        assert_eq!(clip_start_indices(25, 5), vec![0, 5, 10, 15]);
        assert_eq!(clip_start_indices(5, 5), Vec::<usize>::new());
        assert_eq!(clip_start_indices(0, 5), Vec::<usize>::new());
        assert_eq!(clip_start_indices(10, 0), Vec::<usize>::new());
    }

    #[test]
    fn build_skips_short_videos() {
        let videos = vec![
            VideoSource { annotations_path: "a.json".into(), frames_root: "a".into(), num_frames: 12 },
            VideoSource { annotations_path: "b.json".into(), frames_root: "b".into(), num_frames: 3 },
            VideoSource { annotations_path: "c.json".into(), frames_root: "c".into(), num_frames: 6 },
        ];
        let index = ClipIndex::build(&videos, 5);
        let starts: Vec<(String, usize)> = index
            .iter()
            .map(|e| (e.frames_root.display().to_string(), e.start_index))
            .collect();
        let expected: Vec<(String, usize)> =
            vec![("a".to_string(), 0), ("a".to_string(), 5), ("c".to_string(), 0)];
        assert_eq!(starts, expected);
    }

    #[test]
    fn clip_index_keys_sort_numerically() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("index.json");
        let entries: Vec<ClipIndexEntry> = (0..12)
            .map(|i| ClipIndexEntry {
                annotations_path: "v.json".into(),
                frames_root: "v".into(),
                start_index: i * 5,
            })
            .collect();
        let index = ClipIndex::from_entries(entries);
        index.save(&path).unwrap();
        let loaded = ClipIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.get(11).map(|e| e.start_index), Some(55));
    }

    #[test]
    fn clip_index_with_gap_is_invalid() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::write(
            &path,
            r#"{"0": {"annotations_path": "a", "frames_root": "b", "start_index": 0},
                "2": {"annotations_path": "a", "frames_root": "b", "start_index": 5}}"#,
        )
        .unwrap();
        assert!(matches!(ClipIndex::load(&path), Err(DatasetError::InvalidFormat { .. })));
    }

    #[test]
    fn ragged_sequence_file_is_invalid() {
        let raw = SequenceFile {
            x: vec![vec![1.0, 2.0], vec![1.0]],
            y: vec![vec![1.0, 2.0], vec![1.0, 2.0]],
            visible: vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        };
        assert!(matches!(
            raw.into_sequence(Path::new("seq.json")),
            Err(DatasetError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn meta_is_x_then_y() {
        let js = JointSet::new(vec![10.0, 20.0], vec![30.0, 40.0], vec![1.0, 1.0]).unwrap();
        let targets = SampleTargets::build(&Sequence::single(&js), &TargetConfig::default()).unwrap();
        assert_eq!(targets.meta.row(0).to_vec(), vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(targets.label_map.data().shape(), &[1, 3, 31, 31]);
        assert_eq!(targets.center_map.data().shape(), &[1, 1, 256, 256]);
    }
}
