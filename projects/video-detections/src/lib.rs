//! Windowed, cache-backed sequential access to video frames, and batched
//! object detection over it.
//!
//! A [`video::sequence::WindowedSequence`] turns a strictly sequential decoder
//! into an indexable container restricted to a `[start, end]` window. The
//! [`pipeline::BatchDetectionPipeline`] walks that window in fixed-size
//! batches and hands each batch to an [`detection::ObjectDetector`].

pub mod detection;
pub mod error;
pub mod pipeline;
pub mod run_context;
pub mod video;
