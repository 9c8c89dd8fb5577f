// Batched detection over a windowed sequence

pub mod artifact;
pub mod draw;

use crate::detection::{FrameDetections, Mask, ObjectDetector};
use crate::error::{DetectionError, DetectionResult};
use crate::video::sequence::WindowedSequence;
use crate::video::FrameSource;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar in the style used by the CLI.
pub fn progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow}, {eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Runs a detector over every logical frame of a sequence, `batch_size`
/// frames per detector call.
pub struct BatchDetectionPipeline {
    batch_size: usize,
    progress: ProgressBar,
}

impl BatchDetectionPipeline {
    pub fn new(batch_size: usize) -> DetectionResult<Self> {
        if batch_size == 0 {
            return Err(DetectionError::InvalidBatchSize);
        }
        Ok(Self {
            batch_size,
            progress: ProgressBar::hidden(),
        })
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of detector calls needed for `frames` logical frames.
    pub fn batch_count(&self, frames: usize) -> usize {
        frames.div_ceil(self.batch_size)
    }

    /// Detect objects in every frame of the sequence's window.
    ///
    /// The i-th record always holds logical frame i. Any failure aborts the
    /// run; a returned list is complete.
    pub fn run<D, S>(
        &self,
        detector: &mut D,
        sequence: &mut WindowedSequence<S>,
        mask: Option<&Mask>,
    ) -> DetectionResult<Vec<FrameDetections>>
    where
        D: ObjectDetector + ?Sized,
        S: FrameSource,
    {
        if let Some(mask) = mask {
            if mask.width() != sequence.width() || mask.height() != sequence.height() {
                return Err(DetectionError::InvalidMask(format!(
                    "mask is {}x{} but frames are {}x{}",
                    mask.width(),
                    mask.height(),
                    sequence.width(),
                    sequence.height()
                )));
            }
        }

        let total = sequence.len();
        if self.batch_size > sequence.cache_capacity() {
            tracing::warn!(
                "BatchDetectionPipeline: batch size {} exceeds cache capacity {}, frames will be decoded more than once",
                self.batch_size,
                sequence.cache_capacity()
            );
        }
        self.progress.set_length(self.batch_count(total) as u64);

        let mut records = Vec::with_capacity(total);
        for batch_start in (0..total).step_by(self.batch_size) {
            let batch_end = (batch_start + self.batch_size).min(total);
            let mut frames = sequence.get_range(batch_start..batch_end)?;
            if let Some(mask) = mask {
                frames = mask.apply_all(&frames)?;
            }

            let results = detector
                .detect_batch(&frames)
                .map_err(|e| DetectionError::Detector {
                    batch_start,
                    source: e.into(),
                })?;
            if results.len() != frames.len() {
                return Err(DetectionError::MisalignedBatch {
                    batch_start,
                    expected: frames.len(),
                    actual: results.len(),
                });
            }

            tracing::debug!(
                "BatchDetectionPipeline: frames {}..{} -> {} objects",
                batch_start,
                batch_end,
                results.iter().map(Vec::len).sum::<usize>()
            );
            records.extend(
                results
                    .into_iter()
                    .enumerate()
                    .map(|(offset, objects)| FrameDetections::new(batch_start + offset, objects)),
            );
            self.progress.inc(1);
        }

        self.progress.finish();
        let stats = sequence.stats();
        tracing::info!(
            "BatchDetectionPipeline: {} frames, cache hits={} misses={} decoded={}",
            records.len(),
            stats.hits,
            stats.misses,
            stats.decoded
        );
        Ok(records)
    }
}

/// Run a detector over a sequence in batches of `batch_size`.
pub fn generate_detections<D, S>(
    detector: &mut D,
    sequence: &mut WindowedSequence<S>,
    batch_size: usize,
    mask: Option<&Mask>,
) -> DetectionResult<Vec<FrameDetections>>
where
    D: ObjectDetector + ?Sized,
    S: FrameSource,
{
    BatchDetectionPipeline::new(batch_size)?.run(detector, sequence, mask)
}
