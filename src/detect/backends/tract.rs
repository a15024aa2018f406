#![cfg(feature = "backend-tract")]

use std::path::Path;

use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawTensor;
use crate::error::{CounterError, Result};
use crate::frame::Frame;

/// Tract-based backend for ONNX YOLO-style detectors.
///
/// Frames are resized to the model input, scaled to `[0, 1]` and fed as NCHW RGB.
/// Each model output must be `[rows, cols]` or `[1, rows, cols]`, with rows laid
/// out as box, objectness, class scores.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(
                        f32::datum_type(),
                        tvec!(1, 3, height as usize, width as usize),
                    ),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                CounterError::Inference(format!(
                    "failed to load ONNX model from {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let rgb = frame.to_rgb_image().ok_or_else(|| {
            CounterError::Inference(format!(
                "frame from {} is not a {}x{} RGB buffer",
                frame.location(),
                frame.width(),
                frame.height()
            ))
        })?;
        let resized = imageops::resize(&rgb, self.width, self.height, FilterType::Triangle);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn to_raw(output: &Tensor) -> Result<RawTensor> {
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| CounterError::Inference(format!("model output was not f32: {}", e)))?;
        let shape = view.shape();
        let (rows, cols) = match shape {
            [rows, cols] => (*rows, *cols),
            [1, rows, cols] => (*rows, *cols),
            other => {
                return Err(CounterError::MalformedDetectionInput(format!(
                    "unexpected output shape {:?}",
                    other
                )))
            }
        };
        Ok(RawTensor::new(rows, cols, view.iter().copied().collect()))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawTensor>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| CounterError::Inference(format!("ONNX inference failed: {}", e)))?;
        if outputs.is_empty() {
            return Err(CounterError::Inference("model produced no outputs".into()));
        }
        outputs.iter().map(|output| Self::to_raw(output)).collect()
    }
}
