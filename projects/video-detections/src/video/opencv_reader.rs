use super::{Frame, FrameSource, VideoProperties};
use crate::error::{SequenceError, SequenceResult};
use opencv::{
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH, CAP_PROP_POS_FRAMES,
    },
};
use std::path::Path;

/// Frame source backed by OpenCV's `VideoCapture`. Frames come out in BGR.
pub struct OpencvSource {
    capture: Option<VideoCapture>,
    properties: VideoProperties,
    cursor: usize,
}

impl OpencvSource {
    pub fn open(path: &Path) -> SequenceResult<Self> {
        let unavailable = |reason: String| SequenceError::SourceUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(unavailable("file not found".to_string()));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| unavailable("path is not valid UTF-8".to_string()))?;

        let capture =
            VideoCapture::from_file(path_str, CAP_ANY).map_err(|e| unavailable(e.to_string()))?;
        if !capture.is_opened()? {
            return Err(unavailable("decoder refused the file".to_string()));
        }

        let mut fps = capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("OpencvSource: Failed to get FPS from metadata, falling back to 30.0");
            fps = 30.0;
        }
        let properties = VideoProperties {
            width: capture.get(CAP_PROP_FRAME_WIDTH)? as i32,
            height: capture.get(CAP_PROP_FRAME_HEIGHT)? as i32,
            fps,
            total_frames: capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0) as usize,
        };

        tracing::info!(
            "OpencvSource: opened {}, {}x{}, fps={:.2}, frames={}",
            path.display(),
            properties.width,
            properties.height,
            properties.fps,
            properties.total_frames
        );

        Ok(Self {
            capture: Some(capture),
            properties,
            cursor: 0,
        })
    }

    fn capture(&mut self) -> SequenceResult<&mut VideoCapture> {
        self.capture.as_mut().ok_or(SequenceError::Closed)
    }
}

impl FrameSource for OpencvSource {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn seek(&mut self, index: usize) -> SequenceResult<()> {
        let capture = self.capture()?;
        let moved = capture
            .set(CAP_PROP_POS_FRAMES, index as f64)
            .map_err(|e| SequenceError::seek(index, e))?;
        if !moved {
            return Err(SequenceError::seek(
                index,
                "decoder rejected the frame position",
            ));
        }
        self.cursor = index;
        Ok(())
    }

    fn read_next(&mut self) -> SequenceResult<Option<Frame>> {
        let index = self.cursor;
        let capture = self.capture()?;
        let mut frame = Frame::default();
        let success = capture
            .read(&mut frame)
            .map_err(|e| SequenceError::decode(index, e))?;
        if !success || frame.empty() {
            return Ok(None);
        }
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn position(&self) -> usize {
        self.cursor
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                tracing::warn!("OpencvSource: failed to release capture: {}", e);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.capture.is_none()
    }
}

impl Drop for OpencvSource {
    fn drop(&mut self) {
        self.close();
    }
}
