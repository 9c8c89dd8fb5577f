//! Error types for sequence access, detection runs and persisted artifacts.
//!
//! Every enum separates caller mistakes (bad ranges, bad batch sizes, bad
//! masks) from faults of the underlying resource (missing files, failed seeks,
//! decoder errors). Neither class is ever downgraded to an empty value.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error used as the `source` of decoder and detector faults.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for frame sources, sequences and writers.
pub type SequenceResult<T> = Result<T, SequenceError>;

/// Errors raised by frame sources, the windowed sequence and the writer.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Frame {index} is outside the window [{start}, {end}]")]
    OutOfRange {
        index: usize,
        start: usize,
        end: usize,
    },

    #[error("Cache capacity must be at least 1")]
    InvalidCapacity,

    #[error("Video source {path} can't be opened or doesn't exist: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Video source contains no frames")]
    EmptySource,

    #[error("Failed to seek to frame {index}")]
    SeekFailure {
        index: usize,
        #[source]
        source: BoxError,
    },

    #[error("Failed to decode frame {index}")]
    Decode {
        index: usize,
        #[source]
        source: BoxError,
    },

    #[error("Frame {index} was not produced by the decoder")]
    MissingFrame { index: usize },

    #[error("Sequence has already been closed")]
    Closed,

    #[error("Output video {path} can't be opened for writing")]
    SinkUnavailable { path: PathBuf },

    #[error("Frame size {actual_width}x{actual_height} does not match {expected_width}x{expected_height}")]
    FrameSizeMismatch {
        expected_width: i32,
        expected_height: i32,
        actual_width: i32,
        actual_height: i32,
    },

    #[error("OpenCV error: {0}")]
    Opencv(#[from] opencv::Error),
}

impl SequenceError {
    pub fn seek(index: usize, source: impl Into<BoxError>) -> Self {
        Self::SeekFailure {
            index,
            source: source.into(),
        }
    }

    pub fn decode(index: usize, source: impl Into<BoxError>) -> Self {
        Self::Decode {
            index,
            source: source.into(),
        }
    }

    /// True for precondition violations made by the caller; false for faults of
    /// the underlying resource.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange(_)
                | Self::OutOfRange { .. }
                | Self::InvalidCapacity
                | Self::Closed
                | Self::FrameSizeMismatch { .. }
        )
    }
}

/// Result type for detector adapters and the batch pipeline.
pub type DetectionResult<T> = Result<T, DetectionError>;

/// Errors raised while generating detections over a sequence.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Batch size must be at least 1")]
    InvalidBatchSize,

    #[error("Invalid mask: {0}")]
    InvalidMask(String),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("Detector failed on the batch starting at frame {batch_start}")]
    Detector {
        batch_start: usize,
        #[source]
        source: BoxError,
    },

    #[error("Detector returned {actual} results for the {expected} frames starting at {batch_start}")]
    MisalignedBatch {
        batch_start: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Model file not available: {0}")]
    ModelUnavailable(PathBuf),

    #[error("OpenCV error: {0}")]
    Opencv(#[from] opencv::Error),
}

impl DetectionError {
    pub fn is_caller_error(&self) -> bool {
        match self {
            Self::InvalidBatchSize | Self::InvalidMask(_) => true,
            Self::Sequence(e) => e.is_caller_error(),
            _ => false,
        }
    }
}

/// Errors raised while reading or writing a detections artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Not a detections artifact (bad magic bytes)")]
    BadMagic,

    #[error("Unsupported artifact protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("Artifact is truncated")]
    Truncated,
}
