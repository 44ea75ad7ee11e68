//! Emotion analysis over a decoded image.
//!
//! [`EmotionAnalyzer`] is the seam between the request pipeline and whatever
//! produces per-face records. [`OnnxEmotionAnalyzer`] is the bundled
//! implementation: SCRFD for detection, a FER classifier for expressions.
//! Face presence is not enforced; an image without a detectable face yields
//! one zero-confidence record covering the whole frame.

use crate::classifier::{ClassifierError, EmotionClassifier, EmotionScores};
use crate::detector::{DetectorError, FaceDetector};
use crate::types::{AnalyzerOutput, FaceAnalysis, FaceBox};
use image::RgbImage;
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("image has zero width or height")]
    EmptyImage,
}

/// Produces emotion records for every face in an image.
pub trait EmotionAnalyzer: Send {
    fn analyze(&mut self, image: &RgbImage) -> Result<AnalyzerOutput, AnalyzerError>;
}

/// SCRFD detection followed by per-face expression classification.
pub struct OnnxEmotionAnalyzer {
    detector: FaceDetector,
    classifier: EmotionClassifier,
}

impl OnnxEmotionAnalyzer {
    /// Load both models; fails if either file is missing.
    pub fn load(detector_path: &str, classifier_path: &str) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(detector_path)?;
        let classifier = EmotionClassifier::load(classifier_path)?;
        Ok(Self {
            detector,
            classifier,
        })
    }
}

impl EmotionAnalyzer for OnnxEmotionAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<AnalyzerOutput, AnalyzerError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(AnalyzerError::EmptyImage);
        }

        let faces = faces_or_whole_frame(self.detector.detect(image)?, width, height);

        let gray = image::imageops::grayscale(image);
        let mut records = Vec::with_capacity(faces.len());
        for face in &faces {
            let Some(rect) = face.crop_rect(width, height) else {
                tracing::debug!(?face, "face box outside image; skipped");
                continue;
            };
            let scores = self.classifier.classify(&gray, rect)?;
            records.push(face_record(&scores, face, width, height));
        }

        Ok(into_output(records))
    }
}

/// Detected faces, or a single zero-confidence box covering the whole frame
/// when the detector found none.
pub fn faces_or_whole_frame(faces: Vec<FaceBox>, width: u32, height: u32) -> Vec<FaceBox> {
    if faces.is_empty() {
        tracing::debug!(width, height, "no face detected; classifying whole frame");
        vec![FaceBox::whole_image(width, height)]
    } else {
        faces
    }
}

/// A lone record is returned unwrapped, mirroring analyzers that only wrap
/// multi-face results in a list.
pub fn into_output(mut records: Vec<FaceAnalysis>) -> AnalyzerOutput {
    if records.len() == 1 {
        AnalyzerOutput::Single(records.remove(0))
    } else {
        AnalyzerOutput::Many(records)
    }
}

/// Build the analyzer record for one face.
///
/// `region` carries the clipped box plus eye landmarks as `[x, y]` pairs (or
/// `null`); `face_confidence` travels as an extra field.
pub fn face_record(scores: &EmotionScores, face: &FaceBox, width: u32, height: u32) -> FaceAnalysis {
    let eye = |point: Option<(f32, f32)>| {
        point.map_or(Value::Null, |(x, y)| json!([x.round() as i64, y.round() as i64]))
    };

    let region = match face.crop_rect(width, height) {
        Some(rect) => json!({
            "x": rect.x,
            "y": rect.y,
            "w": rect.width,
            "h": rect.height,
            "left_eye": eye(face.left_eye()),
            "right_eye": eye(face.right_eye()),
        }),
        None => Value::Null,
    };

    let mut extra = Map::new();
    extra.insert(
        "face_confidence".to_string(),
        Value::from(f64::from(face.confidence)),
    );

    FaceAnalysis {
        dominant_emotion: Some(Value::from(scores.dominant())),
        emotion: Some(Value::Object(scores.to_percentages())),
        region: Some(region),
        extra,
    }
}
