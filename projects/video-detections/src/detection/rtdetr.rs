use super::{DetectedObject, ObjectDetector};
use crate::error::DetectionError;
use crate::video::Frame;
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageBuffer, Rgb};
use opencv::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use usls::models::RTDETR;
use usls::{Config, Image};

pub const DEFAULT_MODEL_FILE: &str = "rtdetr/v2-s.onnx";

/// Where the detector's weights come from and which labels it emits.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Model file name. Relative to `models_dir` in local mode, otherwise a
    /// name usls knows how to fetch.
    pub model_file: String,
    pub models_dir: Option<PathBuf>,
    pub use_local: bool,
    pub class_names: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_file: DEFAULT_MODEL_FILE.to_string(),
            models_dir: None,
            use_local: false,
            class_names: usls::NAMES_COCO_80.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ModelConfig {
    /// The path or name handed to usls. Local mode requires the file to exist.
    pub fn resolve_model(&self) -> Result<String, DetectionError> {
        if !self.use_local {
            return Ok(self.model_file.clone());
        }
        let path = match &self.models_dir {
            Some(dir) => dir.join(&self.model_file),
            None => PathBuf::from(&self.model_file),
        };
        if !path.is_file() {
            return Err(DetectionError::ModelUnavailable(path));
        }
        Ok(path.to_string_lossy().into_owned())
    }
}

/// usls RT-DETR wrapped as an [`ObjectDetector`].
///
/// Takes RGB frames and corrects for the aspect-ratio padding bug in the
/// underlying model library.
pub struct RtDetrDetector {
    model: RTDETR,
}

impl RtDetrDetector {
    pub fn new(model_config: &ModelConfig) -> Result<Self> {
        let model_path = model_config.resolve_model()?;
        let class_names: Vec<&str> = model_config
            .class_names
            .iter()
            .map(String::as_str)
            .collect();

        let config = Config::default()
            .with_model_file(&model_path)
            .with_class_names(&class_names);

        #[cfg(target_os = "macos")]
        let config = config.with_model_device(usls::Device::CoreMl);

        let config = config.commit()?;
        let model = RTDETR::new(config)
            .with_context(|| format!("Failed to load RT-DETR model {}", model_path))?;
        tracing::info!("RtDetrDetector: loaded {}", model_path);
        Ok(Self { model })
    }
}

impl ObjectDetector for RtDetrDetector {
    fn detect_batch(&mut self, frames: &[Frame]) -> Result<Vec<Vec<DetectedObject>>> {
        let mut usls_images = Vec::with_capacity(frames.len());
        let mut corrections = Vec::with_capacity(frames.len());

        for frame in frames {
            let size = frame.size()?;
            corrections.push(aspect_correction(size.width as f32, size.height as f32));
            usls_images.push(Image::from(rgb_mat_to_dynamic_image(frame)?));
        }

        let results = self.model.forward(&usls_images)?;

        let mut batch = Vec::with_capacity(results.len());
        for (y, (x_correction, y_correction)) in results.into_iter().zip(corrections) {
            let objects = y
                .hbbs
                .into_iter()
                .map(|hbb| {
                    let xmin = hbb.xmin() * x_correction;
                    let ymin = hbb.ymin() * y_correction;
                    let xmax = xmin + hbb.width() * x_correction;
                    let ymax = ymin + hbb.height() * y_correction;
                    let label = match (hbb.name(), hbb.id()) {
                        (Some(name), _) => name.to_string(),
                        (None, Some(id)) => id.to_string(),
                        (None, None) => "unknown".to_string(),
                    };
                    DetectedObject::from_corners(
                        xmin,
                        ymin,
                        xmax,
                        ymax,
                        hbb.confidence().unwrap_or(0.0),
                        label,
                    )
                })
                .collect();
            batch.push(objects);
        }
        Ok(batch)
    }
}

/// Scale factors that undo the model's letterboxing of non-square inputs.
fn aspect_correction(width: f32, height: f32) -> (f32, f32) {
    if width > height {
        (width / height, 1.0)
    } else if height > width {
        (1.0, height / width)
    } else {
        (1.0, 1.0)
    }
}

fn rgb_mat_to_dynamic_image(mat: &Frame) -> Result<DynamicImage> {
    let size = mat.size()?;
    if !mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }
    let buffer = mat.data_bytes()?.to_vec();
    let img_buffer =
        ImageBuffer::<Rgb<u8>, _>::from_vec(size.width as u32, size.height as u32, buffer)
            .ok_or_else(|| anyhow!("Failed to create ImageBuffer from Mat data"))?;
    Ok(DynamicImage::ImageRgb8(img_buffer))
}
