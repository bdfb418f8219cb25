//! ResNet-10 SSD face detector via ONNX Runtime.
//!
//! Runs the single-shot face detector at 300×300 with BGR mean subtraction
//! and decodes the `[1, 1, N, 7]` detection tensor into clamped frame-space
//! bounding boxes.

use crate::types::Detection;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SSD_INPUT_SIZE: usize = 300;
/// Per-channel BGR means subtracted during preprocessing.
const SSD_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];
/// Detections at or above this confidence are kept (boundary inclusive).
pub const SSD_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// Fields per detection row: [image_id, label, confidence, x0, y0, x1, y1].
const SSD_FIELDS_PER_DETECTION: usize = 7;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detection capability as seen by the session controller.
///
/// Implemented by [`FaceDetector`] and by test stubs, so the controller can
/// run headlessly on synthetic frames.
pub trait Detect {
    fn detect_faces(&mut self, frame: &GrayImage) -> Result<Vec<Detection>, DetectorError>;
}

/// SSD-based face detector.
pub struct FaceDetector {
    session: Session,
    threshold: f32,
}

impl FaceDetector {
    /// Load the SSD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        Self::load_with_threshold(model_path, SSD_CONFIDENCE_THRESHOLD)
    }

    pub fn load_with_threshold(model_path: &str, threshold: f32) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded SSD face model"
        );

        Ok(Self { session, threshold })
    }

    /// Detect faces in a grayscale frame.
    ///
    /// Returns detections in the model's row order — no sorting, no NMS.
    /// An empty frame yields an empty list, not an error.
    pub fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, DetectorError> {
        if width == 0 || height == 0 || frame.len() < (width * height) as usize {
            return Ok(Vec::new());
        }

        let input = preprocess(frame, width as usize, height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("detection tensor: {e}")))?;

        Ok(decode_detections(data, width, height, self.threshold))
    }
}

impl Detect for FaceDetector {
    fn detect_faces(&mut self, frame: &GrayImage) -> Result<Vec<Detection>, DetectorError> {
        self.detect(frame.as_raw(), frame.width(), frame.height())
    }
}

/// Preprocess a grayscale frame into a mean-subtracted NCHW float tensor.
///
/// Plain bilinear resize to 300×300 (the SSD input is not letterboxed), with
/// the single gray channel replicated into all three input channels before
/// per-channel mean subtraction.
fn preprocess(frame: &[u8], width: usize, height: usize) -> Array4<f32> {
    let size = SSD_INPUT_SIZE;
    let scale_x = width as f32 / size as f32;
    let scale_y = height as f32 / size as f32;

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..size {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = frame[y0 * width + x0] as f32;
            let tr = frame[y0 * width + x1] as f32;
            let bl = frame[y1 * width + x0] as f32;
            let br = frame[y1 * width + x1] as f32;

            let pixel = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            // Grayscale → 3-channel: replicate Y into B, G, R
            for (c, mean) in SSD_MEAN_BGR.iter().enumerate() {
                tensor[[0, c, y, x]] = pixel - mean;
            }
        }
    }

    tensor
}

/// Decode the flattened `[1, 1, N, 7]` SSD output into frame-space detections.
///
/// Rows below the confidence threshold are dropped; the boundary is
/// inclusive, a row at exactly the threshold is kept. Boxes that are
/// degenerate after clamping are dropped. Row order is preserved.
fn decode_detections(data: &[f32], frame_width: u32, frame_height: u32, threshold: f32) -> Vec<Detection> {
    let mut detections = Vec::new();

    for row in data.chunks_exact(SSD_FIELDS_PER_DETECTION) {
        let confidence = row[2];
        if !(confidence >= threshold) {
            continue;
        }
        if let Some(det) = Detection::from_normalized(
            confidence,
            row[3],
            row[4],
            row[5],
            row[6],
            frame_width,
            frame_height,
        ) {
            detections.push(det);
        }
    }

    detections
}
