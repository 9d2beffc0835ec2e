//! `pennpose` binary: build training targets and score predictions.
//!
//! # Usage
//!
//! ```bash
//! pennpose encode --sequence seq.json --out-dir targets/0001 [--config cfg.json] [--penn-to-mpii]
//! pennpose evaluate --pred pred.npy --target target.npy [--radius 0.2]
//! pennpose index --frames 120 --clip-length 5 [--save index.json --annotations a.json --frames-root frames/0001]
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use pennpose_train::annotation::JointOrderingConvention;
use pennpose_train::config::TargetConfig;
use pennpose_train::dataset::{
    clip_start_indices, read_npy5, read_sequence_json, ClipIndex, SampleTargets, VideoSource,
};
use pennpose_train::metrics::{score_dense, DEFAULT_RADIUS_FRACTION};
use pennpose_train::PipelineResult;

/// Command-line arguments for the `pennpose` binary.
#[derive(Parser, Debug)]
#[command(
    name = "pennpose",
    version,
    about = "Heatmap training targets and accuracy scoring for sequential pose estimation",
    long_about = None
)]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a JSON joint sequence into label_map.npy, center_map.npy and meta.npy.
    Encode {
        /// JSON file with `x`, `y` and `visible` as `[T][J]` lists.
        #[arg(long, value_name = "FILE")]
        sequence: PathBuf,

        /// Directory to write the `.npy` targets into.
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,

        /// Target configuration. Defaults are used when omitted.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Treat the input as raw 13-joint Penn Action annotations: derive the
        /// neck and reorder to the 14-joint MPII layout before encoding.
        #[arg(long, default_value_t = false)]
        penn_to_mpii: bool,
    },

    /// Score dense `(B, S, J, H, W)` predictions against dense targets.
    Evaluate {
        /// Predicted maps (`.npy`).
        #[arg(long, value_name = "FILE")]
        pred: PathBuf,

        /// Ground-truth maps (`.npy`), with one stage or as many as `--pred`.
        #[arg(long, value_name = "FILE")]
        target: PathBuf,

        /// Correctness radius as a fraction of the ground-truth box side.
        #[arg(long, default_value_t = DEFAULT_RADIUS_FRACTION)]
        radius: f64,
    },

    /// List the clip start frames for a video, optionally saving a clip index.
    Index {
        /// Number of annotated frames in the video.
        #[arg(long)]
        frames: usize,

        /// Frames per clip.
        #[arg(long, default_value_t = 5)]
        clip_length: usize,

        /// Write a clip index JSON file for this video.
        #[arg(long, value_name = "FILE", requires_all = ["annotations", "frames_root"])]
        save: Option<PathBuf>,

        /// Annotation file recorded in the saved index.
        #[arg(long, value_name = "FILE")]
        annotations: Option<PathBuf>,

        /// Frame directory recorded in the saved index.
        #[arg(long, value_name = "DIR")]
        frames_root: Option<PathBuf>,
    },
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("pennpose v{}", pennpose_train::VERSION);

    if let Err(e) = run(args.command) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> PipelineResult<()> {
    match command {
        Command::Encode { sequence, out_dir, config, penn_to_mpii } => {
            let cfg = match config.as_deref() {
                Some(path) => {
                    info!("Loading configuration from {}", path.display());
                    TargetConfig::from_json(path)?
                }
                None => TargetConfig::default(),
            };

            let mut seq = read_sequence_json(&sequence)?;
            if penn_to_mpii {
                let convention = JointOrderingConvention::penn_action_to_mpii();
                seq = convention.apply(&seq)?;
                info!("Applied joint convention {} v{}", convention.name(), convention.version());
            }
            info!(
                "Encoding {} frames x {} joints from {}",
                seq.len(),
                seq.num_joints(),
                sequence.display()
            );

            let targets = SampleTargets::build(&seq, &cfg)?;
            targets.write_npy(&out_dir)?;
        }

        Command::Evaluate { pred, target, radius } => {
            let pred_maps = read_npy5(&pred)?;
            let target_maps = read_npy5(&target)?;
            info!("pred {:?}  target {:?}", pred_maps.shape(), target_maps.shape());

            let report = score_dense(pred_maps.view(), target_maps.view(), radius)?;
            info!("{}", report.summary());
            for (j, r) in report.per_joint_ratio().iter().enumerate() {
                info!("  joint {j:>2}: {r:.4}");
            }
        }

        Command::Index { frames, clip_length, save, annotations, frames_root } => {
            let starts = clip_start_indices(frames, clip_length);
            info!("{} clips: {:?}", starts.len(), starts);

            if let (Some(path), Some(annotations_path), Some(frames_root)) =
                (save, annotations, frames_root)
            {
                let video = VideoSource { annotations_path, frames_root, num_frames: frames };
                let index = ClipIndex::build(&[video], clip_length);
                index.save(&path)?;
                info!("Wrote clip index with {} entries to {}", index.len(), path.display());
            }
        }
    }
    Ok(())
}
