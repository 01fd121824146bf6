//! Landmark models: frame in, 68 facial landmarks out

use camera_capture::VideoFrame;
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::{debug, error, info};

use crate::landmarks::{Landmarks, Point, LANDMARK_COUNT};
use crate::{DmsConfig, DmsError};

/// A loaded face-landmark model
pub trait LandmarkModel: Send {
    /// Detect the driver's face. `Ok(None)` means no face in the frame.
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<Landmarks>, DmsError>;
}

/// Loads landmark models from a path
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_path: &str) -> Result<Box<dyn LandmarkModel>, DmsError>;
}

/// ONNX landmark regressor.
///
/// Expects a `1x3xSxS` RGB input in `0..1` and a first output holding
/// 136 normalized `(x, y)` coordinates. An optional second output is
/// read as the face score.
pub struct OnnxLandmarkModel {
    session: Session,
    input_size: u32,
    face_confidence: f32,
}

impl OnnxLandmarkModel {
    pub fn from_file(path: &str, config: &DmsConfig) -> Result<Self, DmsError> {
        info!("Loading landmark model from {}", path);
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                error!("Failed to load landmark model: {}", e);
                DmsError::ModelLoad(e.to_string())
            })?;

        Ok(Self {
            session,
            input_size: config.model_input_size,
            face_confidence: config.face_confidence,
        })
    }

    fn preprocess(&self, frame: &VideoFrame) -> Result<Array4<f32>, DmsError> {
        let img = frame
            .to_rgb_image()
            .ok_or_else(|| DmsError::ImageProcessing("Failed to create image buffer".into()))?;
        let size = self.input_size;
        let resized = imageops::resize(&img, size, size, FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        Ok(input)
    }
}

impl LandmarkModel for OnnxLandmarkModel {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<Landmarks>, DmsError> {
        if !frame.is_valid() {
            return Err(DmsError::ImageProcessing(format!(
                "frame {} has {} bytes for {}x{}",
                frame.sequence,
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }

        let input = self.preprocess(frame)?;
        let has_score = self.session.outputs.len() > 1;
        let inputs = ort::inputs![input].map_err(|e| DmsError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        if has_score {
            let score = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| DmsError::InvalidOutput(e.to_string()))?
                .iter()
                .copied()
                .next()
                .unwrap_or(0.0);
            if score < self.face_confidence {
                debug!(score, "No face above confidence threshold");
                return Ok(None);
            }
        }

        let coords = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DmsError::InvalidOutput(e.to_string()))?;
        let values: Vec<f32> = coords.iter().copied().collect();

        decode_landmarks(&values, frame.width, frame.height).map(Some)
    }
}

/// Scale normalized `(x, y)` pairs to frame pixels
pub fn decode_landmarks(values: &[f32], width: u32, height: u32) -> Result<Landmarks, DmsError> {
    if values.len() < LANDMARK_COUNT * 2 {
        return Err(DmsError::InvalidOutput(format!(
            "expected {} coordinates, got {}",
            LANDMARK_COUNT * 2,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DmsError::InvalidOutput("non-finite landmark".into()));
    }

    let points = values
        .chunks_exact(2)
        .take(LANDMARK_COUNT)
        .map(|xy| Point::new(xy[0] * width as f32, xy[1] * height as f32))
        .collect();
    Ok(Landmarks::new(points))
}

/// Loads [`OnnxLandmarkModel`]s
#[derive(Debug, Clone, Default)]
pub struct OnnxModelLoader {
    config: DmsConfig,
}

impl OnnxModelLoader {
    pub fn new(config: DmsConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, model_path: &str) -> Result<Box<dyn LandmarkModel>, DmsError> {
        if model_path.trim().is_empty() {
            return Err(DmsError::ModelLoad("empty model path".into()));
        }
        let model = OnnxLandmarkModel::from_file(model_path, &self.config)?;
        Ok(Box::new(model))
    }
}
