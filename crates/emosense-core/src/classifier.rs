//! Facial expression classifier via ONNX Runtime.
//!
//! Expects a seven-class FER-style model: a 48×48 grayscale crop scaled to
//! 0–1 in NCHW layout, producing one logit or probability per label.

use crate::types::CropRect;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

/// Output order of the classifier head.
pub const EMOTION_LABELS: [&str; 7] = ["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"];

const EMOTION_INPUT_SIZE: u32 = 48;
const EMOTION_PIXEL_SCALE: f32 = 255.0;
const PROBABILITY_TOLERANCE: f32 = 1e-3;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0} — place a 7-class emotion ONNX model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Probability per emotion label, in [`EMOTION_LABELS`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionScores {
    probabilities: [f32; 7],
}

impl EmotionScores {
    /// Build scores from raw model output.
    ///
    /// Outputs that already form a distribution are kept; anything else is
    /// treated as logits and softmaxed.
    pub fn from_raw(raw: &[f32]) -> Result<Self, ClassifierError> {
        let raw: [f32; 7] = raw.try_into().map_err(|_| {
            ClassifierError::InferenceFailed(format!(
                "expected {} emotion scores, got {}",
                EMOTION_LABELS.len(),
                raw.len()
            ))
        })?;

        let is_distribution = raw.iter().all(|p| (0.0..=1.0).contains(p))
            && (raw.iter().sum::<f32>() - 1.0).abs() < PROBABILITY_TOLERANCE;

        let probabilities = if is_distribution { raw } else { softmax(raw) };
        Ok(Self { probabilities })
    }

    /// Label with the highest probability (first wins on ties).
    pub fn dominant(&self) -> &'static str {
        let mut best = 0;
        for (i, p) in self.probabilities.iter().enumerate() {
            if *p > self.probabilities[best] {
                best = i;
            }
        }
        EMOTION_LABELS[best]
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        EMOTION_LABELS
            .iter()
            .position(|l| *l == label)
            .map(|i| self.probabilities[i])
    }

    /// Scores as a label → percentage (0–100) JSON mapping.
    pub fn to_percentages(&self) -> Map<String, Value> {
        EMOTION_LABELS
            .iter()
            .zip(self.probabilities.iter())
            .map(|(label, p)| (label.to_string(), Value::from(f64::from(*p) * 100.0)))
            .collect()
    }
}

fn softmax(logits: [f32; 7]) -> [f32; 7] {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = logits.map(|l| (l - max).exp());
    let sum: f32 = exps.iter().sum();
    exps.map(|e| e / sum)
}

/// Seven-class facial expression classifier.
pub struct EmotionClassifier {
    session: Session,
}

impl EmotionClassifier {
    /// Load the emotion ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded emotion model"
        );

        Ok(Self { session })
    }

    /// Classify the expression of the face inside `rect`.
    pub fn classify(&mut self, gray: &GrayImage, rect: CropRect) -> Result<EmotionScores, ClassifierError> {
        let input = preprocess(gray, rect);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("emotion scores: {e}")))?;

        EmotionScores::from_raw(raw)
    }
}

/// Crop, resize to 48×48 and scale to a `[1, 1, 48, 48]` tensor.
fn preprocess(gray: &GrayImage, rect: CropRect) -> Array4<f32> {
    let crop = imageops::crop_imm(gray, rect.x, rect.y, rect.width, rect.height).to_image();
    let face = imageops::resize(&crop, EMOTION_INPUT_SIZE, EMOTION_INPUT_SIZE, FilterType::Triangle);

    let size = EMOTION_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
    for (x, y, pixel) in face.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / EMOTION_PIXEL_SCALE;
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_distribution_kept() {
        let scores = EmotionScores::from_raw(&[0.0, 0.0, 0.0, 0.7, 0.1, 0.0, 0.2]).unwrap();
        assert_eq!(scores.get("happy"), Some(0.7));
        assert_eq!(scores.dominant(), "happy");
    }

    #[test]
    fn test_logits_softmaxed() {
        let scores = EmotionScores::from_raw(&[2.0, -1.0, 0.5, 0.0, 3.5, 1.0, 0.0]).unwrap();
        let total: f32 = EMOTION_LABELS.iter().filter_map(|l| scores.get(l)).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert_eq!(scores.dominant(), "sad");
    }

    #[test]
    fn test_wrong_length() {
        assert!(matches!(
            EmotionScores::from_raw(&[0.5, 0.5]),
            Err(ClassifierError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_ties_pick_first_label() {
        let uniform = [1.0 / 7.0; 7];
        let scores = EmotionScores::from_raw(&uniform).unwrap();
        assert_eq!(scores.dominant(), "angry");
    }

    #[test]
    fn test_percentages() {
        let scores = EmotionScores::from_raw(&[0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.5]).unwrap();
        let pct = scores.to_percentages();
        assert_eq!(pct.len(), 7);
        assert_eq!(pct["neutral"].as_f64(), Some(50.0));
        assert_eq!(pct["fear"].as_f64(), Some(0.0));
    }

    #[test]
    fn test_preprocess_shape_and_scale() {
        let mut gray = GrayImage::from_pixel(100, 80, Luma([0]));
        for y in 10..60 {
            for x in 20..70 {
                gray.put_pixel(x, y, Luma([255]));
            }
        }
        let rect = CropRect { x: 20, y: 10, width: 50, height: 50 };
        let tensor = preprocess(&gray, rect);
        assert_eq!(tensor.shape(), &[1, 1, 48, 48]);
        assert!((tensor[[0, 0, 24, 24]] - 1.0).abs() < 1e-6);
    }
}
