pub mod cache;
pub mod ffmpeg_reader;
pub mod opencv_reader;
pub mod sequence;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::SequenceResult;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A decoded 8-bit, 3-channel image.
///
/// Frame sources produce BGR frames. Everything a [`sequence::WindowedSequence`]
/// hands out is RGB, and [`writer::SequenceWriter`] expects RGB.
pub type Frame = Mat;

/// Static properties of a video stream.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    pub total_frames: usize,
}

/// A strictly sequential decoder.
///
/// Reads only move forward from the last `seek`/`read_next` position; `seek` is
/// the only way to jump. A source is owned by exactly one consumer and is not
/// meant to be shared between threads.
pub trait FrameSource: Send {
    fn properties(&self) -> VideoProperties;

    /// Reposition the cursor so that the next `read_next` yields frame `index`.
    fn seek(&mut self, index: usize) -> SequenceResult<()>;

    /// Decode the frame under the cursor (BGR) and advance. `Ok(None)` marks
    /// the end of the stream.
    fn read_next(&mut self) -> SequenceResult<Option<Frame>>;

    /// One past the index of the last frame produced, or the seek target if
    /// nothing has been read since. Sources that skip frames (variable frame
    /// rate, dropped frames) jump ahead accordingly.
    fn position(&self) -> usize;

    /// Release the decoder. Calling it again is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn properties(&self) -> VideoProperties {
        (**self).properties()
    }

    fn seek(&mut self, index: usize) -> SequenceResult<()> {
        (**self).seek(index)
    }

    fn read_next(&mut self) -> SequenceResult<Option<Frame>> {
        (**self).read_next()
    }

    fn position(&self) -> usize {
        (**self).position()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Decoder backend used to open a video file.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Opencv,
    Ffmpeg,
}

/// Open `path` with the selected backend.
pub fn open_source(path: &Path, backend: Backend) -> SequenceResult<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match backend {
        Backend::Opencv => Box::new(opencv_reader::OpencvSource::open(path)?),
        Backend::Ffmpeg => Box::new(ffmpeg_reader::FfmpegSource::open(path)?),
    };
    Ok(source)
}
