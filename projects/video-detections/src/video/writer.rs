use super::sequence::WindowedSequence;
use super::{Frame, FrameSource};
use crate::error::{SequenceError, SequenceResult};
use opencv::core::Size;
use opencv::prelude::*;
use opencv::{imgproc, videoio::VideoWriter};
use std::path::{Path, PathBuf};

/// Four-character codec tag used for every output video.
pub const CODEC_FOURCC: [char; 4] = ['D', 'I', 'V', 'X'];

/// Appends RGB frames, in order, to an output video.
pub struct SequenceWriter {
    writer: Option<VideoWriter>,
    path: PathBuf,
    size: Size,
    frames_written: usize,
}

impl SequenceWriter {
    /// Create (or overwrite) `path`.
    pub fn create(path: &Path, fps: f64, width: i32, height: i32) -> SequenceResult<Self> {
        let unavailable = || SequenceError::SinkUnavailable {
            path: path.to_path_buf(),
        };
        let path_str = path.to_str().ok_or_else(unavailable)?;
        let [c1, c2, c3, c4] = CODEC_FOURCC;
        let fourcc = VideoWriter::fourcc(c1, c2, c3, c4)?;
        let size = Size::new(width, height);

        let writer = VideoWriter::new(path_str, fourcc, fps, size, true).map_err(|e| {
            tracing::warn!("SequenceWriter: failed to open {}: {}", path.display(), e);
            unavailable()
        })?;
        if !writer.is_opened()? {
            return Err(unavailable());
        }
        tracing::info!(
            "SequenceWriter: writing {} ({}x{} @ {:.2} fps)",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
            size,
            frames_written: 0,
        })
    }

    /// Append one RGB frame.
    pub fn write(&mut self, frame: &Frame) -> SequenceResult<()> {
        let writer = self.writer.as_mut().ok_or(SequenceError::Closed)?;
        let actual = frame.size()?;
        if actual != self.size {
            return Err(SequenceError::FrameSizeMismatch {
                expected_width: self.size.width,
                expected_height: self.size.height,
                actual_width: actual.width,
                actual_height: actual.height,
            });
        }

        let mut bgr = Frame::default();
        imgproc::cvt_color_def(frame, &mut bgr, imgproc::COLOR_RGB2BGR)?;
        writer.write(&bgr)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    /// Flush and close the output file. Releasing twice is a no-op.
    pub fn release(&mut self) -> SequenceResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.release()?;
            tracing::info!(
                "SequenceWriter: closed {} after {} frames",
                self.path.display(),
                self.frames_written
            );
        }
        Ok(())
    }
}

impl Drop for SequenceWriter {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("SequenceWriter: failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// Write every frame of the sequence's current window to `path`.
pub fn save_sequence<S: FrameSource>(
    sequence: &mut WindowedSequence<S>,
    path: &Path,
) -> SequenceResult<usize> {
    let mut writer =
        SequenceWriter::create(path, sequence.fps(), sequence.width(), sequence.height())?;
    for frame in sequence.frames() {
        writer.write(&frame?)?;
    }
    writer.release()?;
    Ok(writer.frames_written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::testing::{self, SyntheticSource};
    use opencv::core::{Scalar, CV_8UC3};

    // OpenCV builds without an FFmpeg backend cannot encode DIVX.
    fn writer_or_skip(path: &Path) -> Option<SequenceWriter> {
        match SequenceWriter::create(path, 25.0, testing::WIDTH, testing::HEIGHT) {
            Ok(writer) => Some(writer),
            Err(SequenceError::SinkUnavailable { .. }) => {
                eprintln!("skipped: no DIVX encoder available to write {}", path.display());
                None
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn test_save_sequence_writes_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.avi");
        if writer_or_skip(&path).is_none() {
            return;
        }

        let (source, _) = SyntheticSource::new(20);
        let mut seq = WindowedSequence::new(source, 4).unwrap();
        seq.set_start_frame(5).unwrap();
        seq.set_end_frame(9).unwrap();

        let written = save_sequence(&mut seq, &path).unwrap();
        assert_eq!(written, 5);
        assert!(path.exists());
    }

    #[test]
    fn test_rejects_mismatched_frame() {
        let dir = tempfile::tempdir().unwrap();
        let Some(mut writer) = writer_or_skip(&dir.path().join("out.avi")) else {
            return;
        };

        let wrong = Mat::new_rows_cols_with_default(8, 8, CV_8UC3, Scalar::all(0.0)).unwrap();
        let err = writer.write(&wrong).unwrap_err();
        assert!(matches!(err, SequenceError::FrameSizeMismatch { .. }));
        assert!(err.is_caller_error());
        assert_eq!(writer.frames_written(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let Some(mut writer) = writer_or_skip(&dir.path().join("out.avi")) else {
            return;
        };
        writer.release().unwrap();
        writer.release().unwrap();
        assert!(matches!(
            writer.write(&testing::bgr_frame(0)),
            Err(SequenceError::Closed)
        ));
    }
}
