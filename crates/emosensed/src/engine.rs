use emosense_core::{AnalyzerError, AnalyzerOutput, EmotionAnalyzer};
use image::RgbImage;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error("analyzer panicked: {0}")]
    AnalyzerPanicked(String),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Message sent from HTTP handlers to the engine thread.
struct AnalyzeRequest {
    image: RgbImage,
    reply: oneshot::Sender<Result<AnalyzerOutput, EngineError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<AnalyzeRequest>,
}

impl EngineHandle {
    /// Hand an image to the engine and wait for its analysis.
    ///
    /// The image is moved to the engine and dropped there once analyzed.
    pub async fn analyze(&self, image: RgbImage) -> Result<AnalyzerOutput, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AnalyzeRequest {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the analyzer, so analyzers need `&mut self` but not
/// `Sync`; concurrent requests queue on a channel of `queue` slots. A panic
/// inside the analyzer fails that request only.
pub fn spawn_engine(
    mut analyzer: Box<dyn EmotionAnalyzer>,
    queue: usize,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<AnalyzeRequest>(queue.max(1));

    std::thread::Builder::new()
        .name("emosense-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(AnalyzeRequest { image, reply }) = rx.blocking_recv() {
                let (width, height) = image.dimensions();
                tracing::debug!(width, height, "engine: analyzing");

                let result = match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&image))) {
                    Ok(outcome) => outcome.map_err(EngineError::from),
                    Err(payload) => Err(panic_message(payload)),
                };
                drop(image);

                if reply.send(result).is_err() {
                    tracing::debug!("engine: requester went away before reply");
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> EngineError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(%message, "analyzer panicked");
    EngineError::AnalyzerPanicked(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emosense_core::FaceAnalysis;
    use image::Rgb;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingAnalyzer {
        calls: Arc<AtomicUsize>,
    }

    impl EmotionAnalyzer for CountingAnalyzer {
        fn analyze(&mut self, image: &RgbImage) -> Result<AnalyzerOutput, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AnalyzerOutput::Single(FaceAnalysis {
                dominant_emotion: Some(json!("neutral")),
                region: Some(json!({"w": image.width(), "h": image.height()})),
                ..Default::default()
            }))
        }
    }

    struct PanickyAnalyzer {
        remaining_panics: usize,
    }

    impl EmotionAnalyzer for PanickyAnalyzer {
        fn analyze(&mut self, _image: &RgbImage) -> Result<AnalyzerOutput, AnalyzerError> {
            if self.remaining_panics > 0 {
                self.remaining_panics -= 1;
                panic!("model exploded");
            }
            Err(AnalyzerError::EmptyImage)
        }
    }

    fn image() -> RgbImage {
        RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]))
    }

    #[tokio::test]
    async fn test_analyze_roundtrip() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = spawn_engine(Box::new(CountingAnalyzer { calls: calls.clone() }), 2).unwrap();

        let output = handle.analyze(image()).await.unwrap();
        let AnalyzerOutput::Single(face) = output else {
            panic!("expected single record");
        };
        assert_eq!(face.region, Some(json!({"w": 4, "h": 3})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_all_served() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = spawn_engine(Box::new(CountingAnalyzer { calls: calls.clone() }), 1).unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.analyze(image()).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let handle = spawn_engine(Box::new(PanickyAnalyzer { remaining_panics: 1 }), 1).unwrap();

        let err = handle.analyze(image()).await.unwrap_err();
        assert!(matches!(err, EngineError::AnalyzerPanicked(ref m) if m == "model exploded"));

        // engine keeps serving after the panic
        let err = handle.analyze(image()).await.unwrap_err();
        assert!(matches!(err, EngineError::Analyzer(AnalyzerError::EmptyImage)));
    }
}
