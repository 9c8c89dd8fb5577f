use clap::{Parser, Subcommand};
use std::path::PathBuf;
use video_detections::detection::rtdetr::DEFAULT_MODEL_FILE;
use video_detections::pipeline::artifact::ProtocolVersion;
use video_detections::video::Backend;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run object detection over a video, or every video under a directory
    Detect(DetectArgs),
    /// Draw saved detections onto a copy of the video
    Render(RenderArgs),
    /// Print the properties of a video
    Info(InfoArgs),
}

/// Options for opening a windowed sequence.
#[derive(clap::Args, Debug, Clone)]
pub struct SequenceArgs {
    /// Number of decoded frames kept in memory
    #[arg(long, env = "CACHE_SIZE", default_value_t = 100)]
    pub cache_size: usize,

    /// First physical frame of the window (inclusive)
    #[arg(long)]
    pub start_frame: Option<usize>,

    /// Last physical frame of the window (inclusive)
    #[arg(long)]
    pub end_frame: Option<usize>,

    /// Decoder backend
    #[arg(long, value_enum, env = "VIDEO_DETECTIONS_BACKEND", default_value_t = Backend::Opencv)]
    pub backend: Backend,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DetectArgs {
    /// Video file or directory of videos
    pub input: PathBuf,

    /// Root directory for run outputs
    #[arg(long, env = "VIDEO_DETECTIONS_OUTPUT_ROOT")]
    pub output_root: PathBuf,

    #[command(flatten)]
    pub sequence: SequenceArgs,

    /// Frames per detector call
    #[arg(long, env = "BATCH_SIZE", default_value_t = 100)]
    pub batch_size: usize,

    /// Binary mask image; pixels outside it are ignored by the detector
    #[arg(long, env = "VIDEO_DETECTIONS_MASK")]
    pub mask: Option<PathBuf>,

    /// Also drop objects whose center falls outside the mask
    #[arg(long, requires = "mask")]
    pub filter_by_mask: bool,

    /// Keep only these labels (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub classes: Vec<String>,

    /// Minimum score to keep an object
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Merge objects whose centers are closer than this many pixels
    #[arg(long)]
    pub duplicate_distance: Option<f32>,

    /// Artifact protocol version
    #[arg(long, value_enum, default_value_t = ProtocolVersion::LATEST)]
    pub protocol: ProtocolVersion,

    /// Model file name (relative to --models-dir with --use-local)
    #[arg(long, env = "VIDEO_DETECTIONS_MODEL", default_value = DEFAULT_MODEL_FILE)]
    pub model_file: String,

    /// Directory holding local model files
    #[arg(long, env = "VIDEO_DETECTIONS_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Load the model from --models-dir instead of downloading it
    #[arg(long)]
    pub use_local: bool,

    /// Replace existing run directories
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RenderArgs {
    /// Source video
    pub video: PathBuf,

    /// Detections artifact produced by `detect`
    pub detections: PathBuf,

    /// Output video path
    #[arg(long, short)]
    pub output: PathBuf,

    #[command(flatten)]
    pub sequence: SequenceArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InfoArgs {
    pub video: PathBuf,

    #[arg(long, value_enum, env = "VIDEO_DETECTIONS_BACKEND", default_value_t = Backend::Opencv)]
    pub backend: Backend,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
