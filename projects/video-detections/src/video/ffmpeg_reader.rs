use super::{Frame, FrameSource, VideoProperties};
use crate::error::{SequenceError, SequenceResult};
use ffmpeg_next::ffi;
use ffmpeg_next::{codec, format, frame, media, software::scaling, Rational};
use opencv::core::{Mat, Scalar, CV_8UC3};
use opencv::prelude::*;
use std::path::Path;

/// Open decoder state. Dropping it releases the demuxer and the codec.
struct Decoding {
    input_ctx: format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    stream_index: usize,
    time_base: Rational,
    start_pts: i64,
    /// Lazily created on first frame (source format is only known then).
    scaler: Option<scaling::Context>,
    /// Persistent packet object to avoid allocations.
    packet: codec::packet::Packet,
    eof_sent: bool,
}

/// Frame source backed by FFmpeg software decoding. Frames come out in BGR.
///
/// Frame indices are derived from presentation timestamps at the stream's
/// average frame rate, so seeks land on the exact frame even though the
/// demuxer can only jump to key frames.
pub struct FfmpegSource {
    state: Option<Decoding>,
    properties: VideoProperties,
    cursor: usize,
}

// SAFETY: an FfmpegSource is owned by a single WindowedSequence and only ever
// used from the thread that currently owns it. The raw pointers inside the
// ffmpeg-next types are never shared.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn open(path: &Path) -> SequenceResult<Self> {
        let unavailable = |reason: String| SequenceError::SourceUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| unavailable(format!("FFmpeg init failed: {}", e)))?;
        if !path.exists() {
            return Err(unavailable("file not found".to_string()));
        }

        let input_ctx = format::input(&path).map_err(|e| unavailable(e.to_string()))?;
        let stream = input_ctx
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| unavailable("no video stream".to_string()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_pts = stream.start_time().max(0);

        let rate = stream.avg_frame_rate();
        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            tracing::warn!("FfmpegSource: could not determine FPS, defaulting to 30.0");
            30.0
        };

        let stream_frames = stream.frames().max(0) as usize;
        let duration_secs = input_ctx.duration().max(0) as f64 / ffi::AV_TIME_BASE as f64;
        let total_frames = if stream_frames == 0 {
            (duration_secs * fps).round() as usize
        } else {
            stream_frames
        };

        let decoder = codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| unavailable(format!("failed to open video decoder: {}", e)))?;

        let properties = VideoProperties {
            width: decoder.width() as i32,
            height: decoder.height() as i32,
            fps,
            total_frames,
        };

        tracing::info!(
            "FfmpegSource: opened {}, {}x{}, duration={:.2}s, fps={:.2}, frames={}",
            path.display(),
            properties.width,
            properties.height,
            duration_secs,
            fps,
            total_frames
        );

        Ok(Self {
            state: Some(Decoding {
                input_ctx,
                decoder,
                stream_index,
                time_base,
                start_pts,
                scaler: None,
                packet: codec::packet::Packet::empty(),
                eof_sent: false,
            }),
            properties,
            cursor: 0,
        })
    }
}

impl Decoding {
    /// Next decoded frame in stream order, or `None` once the decoder is drained.
    fn receive_raw(&mut self) -> Result<Option<frame::Video>, ffmpeg_next::Error> {
        let mut decoded = frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return Ok(Some(decoded)),
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => {
                    if self.eof_sent {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(e),
            }

            // Feed packets until one belongs to the video stream or input ends.
            let mut fed = false;
            loop {
                match self.packet.read(&mut self.input_ctx) {
                    Ok(()) if self.packet.stream() == self.stream_index => {
                        self.decoder.send_packet(&self.packet)?;
                        fed = true;
                        break;
                    }
                    Ok(()) => continue,
                    Err(ffmpeg_next::Error::Eof) => break,
                    Err(e) => return Err(e),
                }
            }
            if !fed {
                self.decoder.send_eof()?;
                self.eof_sent = true;
            }
        }
    }

    fn frame_index(&self, decoded: &frame::Video, fps: f64) -> Option<usize> {
        let pts = decoded.timestamp().or_else(|| decoded.pts())?;
        Some(pts_to_index(pts, self.start_pts, self.time_base, fps))
    }

    fn to_bgr(&mut self, decoded: &frame::Video) -> Result<frame::Video, ffmpeg_next::Error> {
        let mut scaler = match self.scaler.take() {
            Some(scaler) => scaler,
            None => scaling::Context::get(
                decoded.format(),
                decoded.width(),
                decoded.height(),
                format::Pixel::BGR24,
                decoded.width(),
                decoded.height(),
                scaling::Flags::BILINEAR,
            )?,
        };
        let mut converted = frame::Video::empty();
        let result = scaler.run(decoded, &mut converted);
        self.scaler = Some(scaler);
        result.map(|_| converted)
    }
}

/// Frame number of a presentation timestamp at a constant `fps`.
fn pts_to_index(pts: i64, start_pts: i64, time_base: Rational, fps: f64) -> usize {
    let seconds =
        (pts - start_pts) as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
    (seconds * fps).round().max(0.0) as usize
}

/// Copy a packed BGR24 frame into an owned OpenCV Mat, dropping row padding.
fn bgr_frame_to_mat(converted: &frame::Video) -> opencv::Result<Mat> {
    let width = converted.width() as usize;
    let height = converted.height() as usize;
    let stride = converted.stride(0);
    let data = converted.data(0);
    let row_bytes = width * 3;

    let mut mat = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    let bytes = mat.data_bytes_mut()?;
    for (y, row) in bytes.chunks_exact_mut(row_bytes).enumerate() {
        let offset = y * stride;
        row.copy_from_slice(&data[offset..offset + row_bytes]);
    }
    Ok(mat)
}

impl FrameSource for FfmpegSource {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    fn seek(&mut self, index: usize) -> SequenceResult<()> {
        let state = self.state.as_mut().ok_or(SequenceError::Closed)?;
        let seconds = index as f64 / self.properties.fps;
        let timestamp = (seconds * ffi::AV_TIME_BASE as f64) as i64;
        state
            .input_ctx
            .seek(timestamp, ..timestamp)
            .map_err(|e| SequenceError::seek(index, e))?;
        state.decoder.flush();
        state.eof_sent = false;
        state.scaler = None;
        self.cursor = index;
        Ok(())
    }

    fn read_next(&mut self) -> SequenceResult<Option<Frame>> {
        let index = self.cursor;
        let fps = self.properties.fps;
        let state = self.state.as_mut().ok_or(SequenceError::Closed)?;

        loop {
            let decoded = match state
                .receive_raw()
                .map_err(|e| SequenceError::decode(index, e))?
            {
                Some(decoded) => decoded,
                None => return Ok(None),
            };

            // Frames before the cursor are leftovers from a key-frame seek.
            let decoded_at = state.frame_index(&decoded, fps).unwrap_or(index);
            if decoded_at < index {
                continue;
            }

            let converted = state
                .to_bgr(&decoded)
                .map_err(|e| SequenceError::decode(decoded_at, e))?;
            let mat = bgr_frame_to_mat(&converted)?;
            // Dropped or variable-rate frames move the cursor past the gap.
            self.cursor = decoded_at + 1;
            return Ok(Some(mat));
        }
    }

    fn position(&self) -> usize {
        self.cursor
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            tracing::debug!("FfmpegSource: decoder released");
        }
    }

    fn is_closed(&self) -> bool {
        self.state.is_none()
    }
}
