//! Binary detection mask. Non-zero pixels are inside the region of interest.

use super::object::Point;
use crate::error::{DetectionError, DetectionResult};
use crate::video::Frame;
use opencv::core::{Mat, Scalar, CV_8U};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Mask {
    mat: Mat,
}

impl Mask {
    /// Load a mask image from disk as grayscale.
    pub fn load(path: &Path) -> DetectionResult<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| DetectionError::InvalidMask(format!("bad path {:?}", path)))?;
        let mat = imgcodecs::imread(path_str, imgcodecs::IMREAD_GRAYSCALE)?;
        if mat.empty() {
            return Err(DetectionError::InvalidMask(format!(
                "{} can't be read as an image",
                path.display()
            )));
        }
        Ok(Self { mat })
    }

    /// Accept an 8-bit image with one channel, or three channels in RGB order.
    pub fn from_mat(mat: &Mat) -> DetectionResult<Self> {
        if mat.empty() || mat.depth() != CV_8U {
            return Err(DetectionError::InvalidMask(
                "mask must be a non-empty 8-bit image".to_string(),
            ));
        }
        let mat = match mat.channels() {
            1 => mat.clone(),
            3 => {
                let mut gray = Mat::default();
                imgproc::cvt_color_def(mat, &mut gray, imgproc::COLOR_RGB2GRAY)?;
                gray
            }
            n => {
                return Err(DetectionError::InvalidMask(format!(
                    "mask has {} channels, expected 1 or 3",
                    n
                )))
            }
        };
        Ok(Self { mat })
    }

    pub fn width(&self) -> i32 {
        self.mat.cols()
    }

    pub fn height(&self) -> i32 {
        self.mat.rows()
    }

    pub fn as_mat(&self) -> &Mat {
        &self.mat
    }

    /// Copy of `frame` with every pixel outside the mask set to zero.
    pub fn apply(&self, frame: &Frame) -> DetectionResult<Frame> {
        let size = frame.size()?;
        if size != self.mat.size()? {
            return Err(DetectionError::InvalidMask(format!(
                "mask is {}x{} but the frame is {}x{}",
                self.width(),
                self.height(),
                size.width,
                size.height
            )));
        }
        let mut masked =
            Mat::new_rows_cols_with_default(size.height, size.width, frame.typ(), Scalar::all(0.0))?;
        frame.copy_to_masked(&mut masked, &self.mat)?;
        Ok(masked)
    }

    pub fn apply_all(&self, frames: &[Frame]) -> DetectionResult<Vec<Frame>> {
        frames.iter().map(|frame| self.apply(frame)).collect()
    }

    /// Whether the pixel under `point` is inside the mask. Points off the
    /// image are outside.
    pub fn contains(&self, point: Point) -> bool {
        if point.x < 0.0 || point.y < 0.0 {
            return false;
        }
        let (col, row) = (point.x as i32, point.y as i32);
        if col >= self.width() || row >= self.height() {
            return false;
        }
        self.mat
            .at_2d::<u8>(row, col)
            .map(|value| *value != 0)
            .unwrap_or(false)
    }
}
