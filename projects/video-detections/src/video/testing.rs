// Test fixtures: a synthetic frame source whose frame N carries N in its
// pixels, and small real videos for exercising the decoder backends.

use super::writer::SequenceWriter;
use super::{Frame, FrameSource, VideoProperties};
use crate::error::{SequenceError, SequenceResult};
use opencv::core::{Mat, Scalar, Vec3b, CV_8UC3};
use opencv::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const WIDTH: i32 = 6;
pub const HEIGHT: i32 = 4;

#[derive(Debug, Default)]
pub struct Counters {
    pub seeks: AtomicUsize,
    pub reads: AtomicUsize,
    pub releases: AtomicUsize,
}

impl Counters {
    pub fn seeks(&self) -> usize {
        self.seeks.load(Ordering::Relaxed)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }
}

pub struct SyntheticSource {
    total_frames: usize,
    /// Frames actually decodable; may be lower than the advertised count.
    decodable: usize,
    cursor: usize,
    closed: bool,
    fail_seek_at: Option<usize>,
    skipped: Option<usize>,
    counters: Arc<Counters>,
}

impl SyntheticSource {
    pub fn new(total_frames: usize) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let source = Self {
            total_frames,
            decodable: total_frames,
            cursor: 0,
            closed: false,
            fail_seek_at: None,
            skipped: None,
            counters: counters.clone(),
        };
        (source, counters)
    }

    pub fn with_decodable(mut self, decodable: usize) -> Self {
        self.decodable = decodable;
        self
    }

    pub fn with_failing_seek(mut self, index: usize) -> Self {
        self.fail_seek_at = Some(index);
        self
    }

    /// Never produce frame `index`, as if the stream dropped it.
    pub fn with_skipped_frame(mut self, index: usize) -> Self {
        self.skipped = Some(index);
        self
    }
}

impl FrameSource for SyntheticSource {
    fn properties(&self) -> VideoProperties {
        VideoProperties {
            width: WIDTH,
            height: HEIGHT,
            fps: 25.0,
            total_frames: self.total_frames,
        }
    }

    fn seek(&mut self, index: usize) -> SequenceResult<()> {
        self.counters.seeks.fetch_add(1, Ordering::Relaxed);
        if self.fail_seek_at == Some(index) {
            return Err(SequenceError::seek(index, "synthetic seek failure"));
        }
        self.cursor = index;
        Ok(())
    }

    fn read_next(&mut self) -> SequenceResult<Option<Frame>> {
        if self.skipped == Some(self.cursor) {
            self.cursor += 1;
        }
        if self.cursor >= self.decodable {
            return Ok(None);
        }
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        let frame = bgr_frame(self.cursor);
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn position(&self) -> usize {
        self.cursor
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.counters.releases.fetch_add(1, Ordering::Relaxed);
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// BGR frame whose blue/green channels hold the low/high byte of `index` and
/// whose red channel is a constant 7.
pub fn bgr_frame(index: usize) -> Mat {
    let b = (index % 256) as f64;
    let g = ((index / 256) % 256) as f64;
    Mat::new_rows_cols_with_default(HEIGHT, WIDTH, CV_8UC3, Scalar::new(b, g, 7.0, 0.0)).unwrap()
}

/// Decode the index out of an RGB frame produced from [`bgr_frame`].
pub fn rgb_frame_index(frame: &Mat) -> usize {
    let px = *frame.at_2d::<Vec3b>(0, 0).unwrap();
    assert_eq!(px[0], 7, "frame is not in RGB order");
    px[2] as usize + (px[1] as usize) * 256
}

/// [`bgr_frame`] converted to RGB, as a sequence would hand it out.
pub fn rgb_frame(index: usize) -> Mat {
    let mut rgb = Mat::default();
    opencv::imgproc::cvt_color_def(&bgr_frame(index), &mut rgb, opencv::imgproc::COLOR_BGR2RGB)
        .unwrap();
    rgb
}

pub const RAMP_WIDTH: i32 = 64;
pub const RAMP_HEIGHT: i32 = 48;

/// Intensity of every pixel of frame `index` in a video from [`write_ramp_video`].
pub fn ramp_level(index: usize) -> f64 {
    (20 + index * 20) as f64
}

/// Write `count` flat grey frames whose intensity encodes their index.
///
/// Returns false, with a notice on stderr, when this OpenCV build has no
/// DIVX encoder.
pub fn write_ramp_video(path: &Path, count: usize) -> bool {
    let mut writer = match SequenceWriter::create(path, 25.0, RAMP_WIDTH, RAMP_HEIGHT) {
        Ok(writer) => writer,
        Err(SequenceError::SinkUnavailable { .. }) => {
            eprintln!(
                "skipped: no DIVX encoder available to write {}",
                path.display()
            );
            return false;
        }
        Err(e) => panic!("unexpected error: {}", e),
    };
    for index in 0..count {
        let level = ramp_level(index);
        let frame = Mat::new_rows_cols_with_default(
            RAMP_HEIGHT,
            RAMP_WIDTH,
            CV_8UC3,
            Scalar::all(level),
        )
        .unwrap();
        writer.write(&frame).unwrap();
    }
    writer.release().unwrap();
    true
}

/// Assert that a decoded ramp frame is frame `index`, within codec error.
pub fn assert_ramp_frame(frame: &Mat, index: usize) {
    let px = *frame
        .at_2d::<Vec3b>(RAMP_HEIGHT / 2, RAMP_WIDTH / 2)
        .unwrap();
    let level = px[0] as f64;
    assert!(
        (level - ramp_level(index)).abs() <= 8.0,
        "expected frame {} (level {}), decoded level {}",
        index,
        ramp_level(index),
        level
    );
}
