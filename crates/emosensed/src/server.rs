//! HTTP surface: liveness and the emotion analysis endpoint.

use crate::engine::{EngineError, EngineHandle};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use emosense_core::decoder::{self, DecodeError};
use emosense_core::normalize::{self, NormalizeError};
use emosense_core::AnalysisResponse;
use std::net::SocketAddr;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const LIVENESS_MESSAGE: &str = "emosense analyzer is running";

/// Which cross-origin requests the listener accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsPolicy {
    AnyOrigin,
    SameOrigin,
}

/// Listener settings, constructed once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub cors: CorsPolicy,
    pub max_body_bytes: usize,
}

#[derive(Clone)]
struct AppState {
    engine: EngineHandle,
}

/// Request failures. Only `MissingImage` is the client's fault; everything
/// else is reported as a 500 carrying the underlying message.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No image provided")]
    MissingImage,
    #[error("{0}")]
    Body(String),
    #[error(transparent)]
    Decode(DecodeError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        if err.is_client_error() {
            ApiError::MissingImage
        } else {
            ApiError::Decode(err)
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        ApiError::Body(rejection.body_text())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingImage => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the application router.
pub fn router(engine: EngineHandle, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/api/emotion", post(analyze_emotion))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine })
}

fn cors_layer(policy: CorsPolicy) -> CorsLayer {
    match policy {
        CorsPolicy::AnyOrigin => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsPolicy::SameOrigin => CorsLayer::new(),
    }
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: ServerConfig, engine: EngineHandle) -> std::io::Result<()> {
    let app = router(engine, &config);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, cors = ?config.cors, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

/// The body is read as raw bytes so it is parsed as JSON whatever the
/// declared content type.
async fn analyze_emotion(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    match run_pipeline(&state, body).await {
        Ok(response) => {
            tracing::info!(faces = response.emotions.len(), "analysis succeeded");
            Ok(Json(response))
        }
        Err(err) => {
            if matches!(err, ApiError::MissingImage) {
                tracing::warn!(error = %err, "rejected request");
            } else {
                tracing::error!(error = %err, "analysis failed");
            }
            Err(err)
        }
    }
}

async fn run_pipeline(
    state: &AppState,
    body: Result<Bytes, BytesRejection>,
) -> Result<AnalysisResponse, ApiError> {
    let body = body?;
    tracing::info!(bytes = body.len(), "analyzing image");

    let image = tokio::task::spawn_blocking(move || decoder::decode_request(&body)).await??;
    let output = state.engine.analyze(image).await?;
    let emotions = normalize::normalize_output(output)?;

    Ok(AnalysisResponse::success(emotions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use axum::body::Body;
    use axum::http::{header, Request};
    use emosense_core::{AnalyzerError, AnalyzerOutput, EmotionAnalyzer};
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::{json, Value};
    use std::io::Cursor;
    use tower::ServiceExt;

    /// Replays a canned analyzer output for every image.
    struct StubAnalyzer(AnalyzerOutput);

    impl EmotionAnalyzer for StubAnalyzer {
        fn analyze(&mut self, _image: &RgbImage) -> Result<AnalyzerOutput, AnalyzerError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenAnalyzer;

    impl EmotionAnalyzer for BrokenAnalyzer {
        fn analyze(&mut self, _image: &RgbImage) -> Result<AnalyzerOutput, AnalyzerError> {
            Err(AnalyzerError::EmptyImage)
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            cors: CorsPolicy::AnyOrigin,
            max_body_bytes: 1024 * 1024,
        }
    }

    fn app_with(analyzer: impl EmotionAnalyzer + 'static) -> Router {
        let engine = spawn_engine(Box::new(analyzer), 4).unwrap();
        router(engine, &test_config())
    }

    fn stub(output: Value) -> Router {
        app_with(StubAnalyzer(serde_json::from_value(output).unwrap()))
    }

    fn solid_png_uri() -> String {
        let img = RgbImage::from_pixel(32, 24, Rgb([90, 160, 220]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        decoder::to_data_uri(&buf.into_inner())
    }

    fn post_emotion(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/emotion")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(body.into())
            .unwrap()
    }

    fn post_json(value: Value) -> Request<Body> {
        post_emotion(serde_json::to_vec(&value).unwrap())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn single_face() -> Value {
        json!({
            "dominant_emotion": "happy",
            "emotion": {"happy": 88.0, "sad": 2, "neutral": 10.0, "note": "x"},
            "region": {"x": 4, "y": 5.8, "w": 20, "h": 18, "left_eye": null, "right_eye": [1, 2]},
            "face_confidence": 0.97
        })
    }

    #[tokio::test]
    async fn test_liveness() {
        let app = stub(json!([]));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], LIVENESS_MESSAGE.as_bytes());
    }

    #[tokio::test]
    async fn test_missing_image_is_400() {
        let app = stub(json!([]));
        for body in [json!({}), json!({"image": ""}), json!({"image": null})] {
            let (status, value) = send(&app, post_json(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(value, json!({"error": "No image provided"}));
        }
    }

    #[tokio::test]
    async fn test_single_face_success() {
        let app = stub(single_face());
        let (status, value) = send(&app, post_json(json!({ "image": solid_png_uri() }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["status"], "success");
        let emotions = value["emotions"].as_array().unwrap();
        assert_eq!(emotions.len(), 1);

        let face = &emotions[0];
        assert_eq!(face["dominant_emotion"], "happy");
        let scores = face["emotion"].as_object().unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.values().all(Value::is_f64));
        assert_eq!(face["region"], json!({"x": 4, "y": 5, "w": 20, "h": 18}));
    }

    #[tokio::test]
    async fn test_many_faces_keep_analyzer_order() {
        let app = stub(json!([
            {"dominant_emotion": "sad", "region": {"x": 1}},
            {"dominant_emotion": "angry"},
            {"emotion": {"fear": 1}}
        ]));
        let (status, value) = send(&app, post_json(json!({ "image": solid_png_uri() }))).await;

        assert_eq!(status, StatusCode::OK);
        let emotions = value["emotions"].as_array().unwrap();
        let labels: Vec<&str> = emotions
            .iter()
            .map(|e| e["dominant_emotion"].as_str().unwrap())
            .collect();
        assert_eq!(labels, ["sad", "angry", "unknown"]);
        assert_eq!(emotions[0]["region"], json!({"x": 1}));
        assert_eq!(emotions[1]["region"], json!({"x": 0, "y": 0, "w": 0, "h": 0}));
    }

    #[tokio::test]
    async fn test_no_face_is_success() {
        let app = stub(json!([]));
        let (status, value) = send(&app, post_json(json!({ "image": solid_png_uri() }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({"status": "success", "emotions": []}));
    }

    #[tokio::test]
    async fn test_malformed_base64_is_500_and_service_survives() {
        let app = stub(single_face());
        let (status, value) =
            send(&app, post_json(json!({"image": "data:image/png;base64,%%%not-base64%%%"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!value["error"].as_str().unwrap().is_empty());

        let (status, _) = send(&app, post_json(json!({ "image": solid_png_uri() }))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unpadded_base64_is_500() {
        let app = stub(single_face());
        let padded = (1..=16)
            .map(|width| {
                let img = RgbImage::from_pixel(width, 3, Rgb([10, 20, 30]));
                let mut buf = Cursor::new(Vec::new());
                DynamicImage::ImageRgb8(img)
                    .write_to(&mut buf, ImageFormat::Png)
                    .unwrap();
                decoder::to_data_uri(&buf.into_inner())
            })
            .find(|uri| uri.ends_with('='))
            .unwrap();

        let (status, _) = send(&app, post_json(json!({ "image": padded }))).await;
        assert_eq!(status, StatusCode::OK);

        let unpadded = padded.trim_end_matches('=');
        let (status, value) = send(&app, post_json(json!({ "image": unpadded }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"].as_str().unwrap().contains("base64"));
    }

    #[tokio::test]
    async fn test_missing_comma_is_500() {
        let app = stub(single_face());
        let (status, value) = send(&app, post_json(json!({"image": "iVBORw0KGgo"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"].as_str().unwrap().contains("separator"));
    }

    #[tokio::test]
    async fn test_undecodable_image_is_500() {
        let app = stub(single_face());
        let (status, value) =
            send(&app, post_json(json!({"image": "data:image/png;base64,aGVsbG8gd29ybGQ="}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"].is_string());
    }

    #[tokio::test]
    async fn test_non_json_body_is_500() {
        let app = stub(single_face());
        let (status, value) = send(&app, post_emotion("image=abc")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"].is_string());
    }

    #[tokio::test]
    async fn test_analyzer_failure_is_500() {
        let app = app_with(BrokenAnalyzer);
        let (status, value) = send(&app, post_json(json!({ "image": solid_png_uri() }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(value, json!({"error": "image has zero width or height"}));
    }

    #[tokio::test]
    async fn test_normalize_failure_is_500() {
        let app = stub(json!({"emotion": "happy"}));
        let (status, value) = send(&app, post_json(json!({ "image": solid_png_uri() }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"].as_str().unwrap().contains("mapping"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_500_json() {
        let app = stub(json!([]));
        let huge = vec![b' '; 2 * 1024 * 1024];
        let (status, value) = send(&app, post_emotion(huge)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(value["error"].is_string());
    }

    #[tokio::test]
    async fn test_cors_any_origin() {
        let app = stub(json!([]));
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::MissingImage.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(DecodeError::MissingImage).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DecodeError::MissingSeparator).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(EngineError::ChannelClosed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
