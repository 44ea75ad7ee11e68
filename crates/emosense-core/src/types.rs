use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceBox {
    /// A zero-confidence box spanning the whole image.
    pub fn whole_image(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            confidence: 0.0,
            landmarks: None,
        }
    }

    pub fn left_eye(&self) -> Option<(f32, f32)> {
        self.landmarks.map(|lms| lms[0])
    }

    pub fn right_eye(&self) -> Option<(f32, f32)> {
        self.landmarks.map(|lms| lms[1])
    }

    /// Clip the box to an image of the given size.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn crop_rect(&self, image_width: u32, image_height: u32) -> Option<CropRect> {
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        let x1 = ((self.x + self.width).ceil().max(0.0) as u32).min(image_width);
        let y1 = ((self.y + self.height).ceil().max(0.0) as u32).min(image_height);

        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(CropRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Integer pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One per-face record as emitted by an analyzer.
///
/// Fields stay raw JSON values: analyzers may emit numbers, strings, pairs or
/// `null` in any of them, and only the normalizer decides what survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_emotion: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Value>,
    /// Anything else the analyzer attached (e.g. `face_confidence`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Analyzer result: a lone record or a sequence of records.
///
/// Deserializes from either a JSON object or a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyzerOutput {
    Many(Vec<FaceAnalysis>),
    Single(FaceAnalysis),
}

impl AnalyzerOutput {
    /// Always hand back a sequence; a lone record becomes a one-element vec.
    pub fn into_records(self) -> Vec<FaceAnalysis> {
        match self {
            AnalyzerOutput::Many(records) => records,
            AnalyzerOutput::Single(record) => vec![record],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnalyzerOutput::Many(records) => records.len(),
            AnalyzerOutput::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<FaceAnalysis> for AnalyzerOutput {
    fn from(record: FaceAnalysis) -> Self {
        AnalyzerOutput::Single(record)
    }
}

impl From<Vec<FaceAnalysis>> for AnalyzerOutput {
    fn from(records: Vec<FaceAnalysis>) -> Self {
        AnalyzerOutput::Many(records)
    }
}

/// JSON-safe per-face result returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub dominant_emotion: String,
    pub emotion: BTreeMap<String, f64>,
    pub region: BTreeMap<String, i64>,
}

/// Successful response body of the emotion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub status: String,
    pub emotions: Vec<NormalizedResult>,
}

impl AnalysisResponse {
    pub fn success(emotions: Vec<NormalizedResult>) -> Self {
        Self {
            status: "success".to_string(),
            emotions,
        }
    }
}
