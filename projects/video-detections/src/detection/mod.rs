pub mod filters;
pub mod mask;
pub mod object;
pub mod rtdetr;

pub use mask::Mask;
pub use object::{DetectedObject, FrameDetections, Point};
pub use rtdetr::{ModelConfig, RtDetrDetector};

use crate::video::Frame;
use anyhow::{anyhow, Result};

/// Something that finds objects in RGB frames.
///
/// Implementors only provide [`ObjectDetector::detect_batch`]; masking is
/// handled by the provided methods.
pub trait ObjectDetector {
    /// Detect objects in each frame. Returns exactly one list per input frame,
    /// in input order.
    fn detect_batch(&mut self, frames: &[Frame]) -> Result<Vec<Vec<DetectedObject>>>;

    /// Detect objects in a single frame, restricted to `mask` when given.
    fn get_objects(&mut self, frame: &Frame, mask: Option<&Mask>) -> Result<Vec<DetectedObject>> {
        let mut results = self.get_images_objects(std::slice::from_ref(frame), mask)?;
        if results.len() != 1 {
            return Err(anyhow!(
                "detector returned {} results for a single frame",
                results.len()
            ));
        }
        Ok(results.remove(0))
    }

    /// Detect objects in every frame, restricted to `mask` when given.
    fn get_images_objects(
        &mut self,
        frames: &[Frame],
        mask: Option<&Mask>,
    ) -> Result<Vec<Vec<DetectedObject>>> {
        match mask {
            Some(mask) => {
                let masked = mask.apply_all(frames)?;
                self.detect_batch(&masked)
            }
            None => self.detect_batch(frames),
        }
    }
}

impl<D: ObjectDetector + ?Sized> ObjectDetector for Box<D> {
    fn detect_batch(&mut self, frames: &[Frame]) -> Result<Vec<Vec<DetectedObject>>> {
        (**self).detect_batch(frames)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::video::testing::rgb_frame_index;

    /// Detector that reports one object per RGB frame, labelled with the
    /// frame's encoded index.
    #[derive(Default)]
    pub(crate) struct IndexDetector {
        pub calls: Vec<usize>,
        pub fail_on_call: Option<usize>,
        pub drop_last: bool,
    }

    impl ObjectDetector for IndexDetector {
        fn detect_batch(&mut self, frames: &[Frame]) -> Result<Vec<Vec<DetectedObject>>> {
            if self.fail_on_call == Some(self.calls.len()) {
                return Err(anyhow!("model crashed"));
            }
            self.calls.push(frames.len());
            let mut results = Vec::with_capacity(frames.len());
            for frame in frames {
                let index = rgb_frame_index(frame);
                results.push(vec![DetectedObject::new(
                    Point::new(1.0, 1.0),
                    2.0,
                    2.0,
                    0.5,
                    format!("frame-{}", index),
                )]);
            }
            if self.drop_last {
                results.pop();
            }
            Ok(results)
        }
    }
}
