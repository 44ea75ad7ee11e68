//! emosense-core — facial emotion analysis pipeline.
//!
//! Decodes data-URI images, finds faces with SCRFD, classifies expressions
//! with a FER model via ONNX Runtime, and normalizes the results into
//! JSON-safe records.

pub mod analyzer;
pub mod classifier;
pub mod decoder;
pub mod detector;
pub mod normalize;
pub mod types;

pub use analyzer::{AnalyzerError, EmotionAnalyzer, OnnxEmotionAnalyzer};
pub use decoder::DecodeError;
pub use normalize::NormalizeError;
pub use types::{AnalysisResponse, AnalyzerOutput, FaceAnalysis, FaceBox, NormalizedResult};

use std::path::PathBuf;

/// SCRFD detector weights inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// Seven-class emotion classifier weights inside the model directory.
pub const EMOTION_MODEL_FILE: &str = "emotion_fer7.onnx";

/// Default model directory: `$XDG_DATA_HOME/emosense/models`, then
/// `~/.local/share/emosense/models`, then `/usr/share/emosense/models`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(data) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data).join("emosense/models");
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local/share/emosense/models"),
        Err(_) => PathBuf::from("/usr/share/emosense/models"),
    }
}
