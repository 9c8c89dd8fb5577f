//! Random access over a sequential decoder.
//!
//! [`WindowedSequence`] exposes logical indices `0..len()` over a physical
//! window `[start_frame, end_frame]` of a [`FrameSource`]. Frames are served
//! from a direct-mapped [`FrameCache`]; a miss seeks the source once and
//! decodes forward until one full ring of the cache has been filled (or the
//! stream ends), so later lookups in that run are hits.
//!
//! A sequence owns its source and cache exclusively. It is not thread-safe:
//! share it across threads only by moving it, never by reference.

use super::cache::FrameCache;
use super::{Frame, FrameSource, VideoProperties};
use crate::error::{SequenceError, SequenceResult};
use opencv::imgproc;
use std::ops::Range;

/// Physical bounds the logical indices map onto. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// The whole stream, as set at construction.
    Unbounded { end: usize },
    /// Narrowed by `set_start_frame` / `set_end_frame`.
    Bounded { start: usize, end: usize },
}

impl Window {
    pub fn start(&self) -> usize {
        match self {
            Window::Unbounded { .. } => 0,
            Window::Bounded { start, .. } => *start,
        }
    }

    pub fn end(&self) -> usize {
        match self {
            Window::Unbounded { end } | Window::Bounded { end, .. } => *end,
        }
    }

    pub fn len(&self) -> usize {
        self.end() - self.start() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, physical: usize) -> bool {
        (self.start()..=self.end()).contains(&physical)
    }
}

/// Counters describing how the cache has been serving requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub decoded: usize,
}

pub struct WindowedSequence<S: FrameSource = Box<dyn FrameSource>> {
    source: S,
    cache: FrameCache,
    properties: VideoProperties,
    window: Window,
    stats: CacheStats,
    closed: bool,
}

impl<S: FrameSource> WindowedSequence<S> {
    /// Wrap `source` with a cache of `cache_size` frames. The window starts out
    /// covering the whole stream.
    pub fn new(source: S, cache_size: usize) -> SequenceResult<Self> {
        let cache = FrameCache::new(cache_size)?;
        let properties = source.properties();
        if properties.total_frames == 0 {
            return Err(SequenceError::EmptySource);
        }

        Ok(Self {
            source,
            cache,
            properties,
            window: Window::Unbounded {
                end: properties.total_frames - 1,
            },
            stats: CacheStats::default(),
            closed: false,
        })
    }

    /// Set the first physical frame of the window. Must be below the current
    /// end frame.
    pub fn set_start_frame(&mut self, frame: usize) -> SequenceResult<()> {
        let end = self.window.end();
        if frame >= end {
            return Err(SequenceError::InvalidRange(format!(
                "start frame {} must be lower than the end frame {}",
                frame, end
            )));
        }
        self.window = Window::Bounded { start: frame, end };
        Ok(())
    }

    /// Set the last physical frame of the window. Must be below the number of
    /// frames available and above the current start frame.
    pub fn set_end_frame(&mut self, frame: usize) -> SequenceResult<()> {
        let total = self.properties.total_frames;
        if frame >= total {
            return Err(SequenceError::InvalidRange(format!(
                "end frame {} must be lower than the {} frames available",
                frame, total
            )));
        }
        let start = self.window.start();
        if frame <= start {
            return Err(SequenceError::InvalidRange(format!(
                "end frame {} must be greater than the start frame {}",
                frame, start
            )));
        }
        self.window = Window::Bounded { start, end: frame };
        Ok(())
    }

    /// Frame at logical position `index`, in RGB order.
    pub fn get(&mut self, index: usize) -> SequenceResult<Frame> {
        if self.closed {
            return Err(SequenceError::Closed);
        }
        let physical = self.physical_index(index)?;

        if self.cache.lookup(physical).is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            self.pull_to_cache(physical)?;
        }
        let bgr = self
            .cache
            .lookup(physical)
            .ok_or(SequenceError::MissingFrame { index: physical })?;

        let mut rgb = Frame::default();
        imgproc::cvt_color_def(bgr, &mut rgb, imgproc::COLOR_BGR2RGB)?;
        Ok(rgb)
    }

    /// Frames for a contiguous logical range, fetched in increasing order.
    pub fn get_range(&mut self, range: Range<usize>) -> SequenceResult<Vec<Frame>> {
        let mut frames = Vec::with_capacity(range.len());
        for index in range {
            frames.push(self.get(index)?);
        }
        Ok(frames)
    }

    /// Iterate over every frame of the window.
    pub fn frames(&mut self) -> Frames<'_, S> {
        Frames {
            sequence: self,
            next: 0,
        }
    }

    /// Logical length of the current window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn start_frame(&self) -> usize {
        self.window.start()
    }

    pub fn end_frame(&self) -> usize {
        self.window.end()
    }

    pub fn properties(&self) -> VideoProperties {
        self.properties
    }

    pub fn width(&self) -> i32 {
        self.properties.width
    }

    pub fn height(&self) -> i32 {
        self.properties.height
    }

    pub fn fps(&self) -> f64 {
        self.properties.fps
    }

    /// Physical frame count of the underlying stream, ignoring the window.
    pub fn num_frames_available(&self) -> usize {
        self.properties.total_frames
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Release the underlying decoder. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.source.close();
        tracing::debug!(
            "WindowedSequence closed: hits={}, misses={}, decoded={}",
            self.stats.hits,
            self.stats.misses,
            self.stats.decoded
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn physical_index(&self, logical: usize) -> SequenceResult<usize> {
        let out_of_range = || SequenceError::OutOfRange {
            index: self.window.start().saturating_add(logical),
            start: self.window.start(),
            end: self.window.end(),
        };
        let physical = self
            .window
            .start()
            .checked_add(logical)
            .ok_or_else(out_of_range)?;
        if !self.window.contains(physical) {
            return Err(out_of_range());
        }
        Ok(physical)
    }

    /// Seek to `index` and decode forward, filling at most one full ring of the
    /// cache starting at `index`. Running into the end of the stream just stops
    /// the fill.
    ///
    /// Each frame is stored under the index the source reports for it, so a
    /// source that skips a frame leaves that index uncached instead of
    /// shifting every later frame down by one.
    fn pull_to_cache(&mut self, index: usize) -> SequenceResult<()> {
        self.source.seek(index)?;

        let capacity = self.cache.capacity();
        let limit = index
            .saturating_add(capacity)
            .min(self.properties.total_frames);
        let mut next = index;
        let mut decoded = 0;
        while next < limit {
            let Some(frame) = self.source.read_next()? else {
                break;
            };
            decoded += 1;
            let at = self.source.position().saturating_sub(1).max(next);
            if at >= limit {
                break;
            }
            self.cache.store(at, frame);
            next = at + 1;
        }
        self.stats.decoded += decoded;

        tracing::debug!(
            "Pulled {} frames for [{}, {}) into cache (capacity {})",
            decoded,
            index,
            next,
            capacity
        );

        if decoded == 0 {
            return Err(SequenceError::MissingFrame { index });
        }
        Ok(())
    }
}

impl<S: FrameSource> Drop for WindowedSequence<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Iterator returned by [`WindowedSequence::frames`].
pub struct Frames<'a, S: FrameSource> {
    sequence: &'a mut WindowedSequence<S>,
    next: usize,
}

impl<S: FrameSource> Iterator for Frames<'_, S> {
    type Item = SequenceResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.sequence.len() {
            return None;
        }
        let item = self.sequence.get(self.next);
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sequence.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}
