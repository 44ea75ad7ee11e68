use anyhow::{Context, Result};
use emosense_core::OnnxEmotionAnalyzer;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "emosensed starting");

    let config = config::Config::load().context("loading configuration")?;
    let server_config = config.server()?;

    // Load models synchronously (fail-fast)
    let analyzer = OnnxEmotionAnalyzer::load(
        &config.detector_model_path(),
        &config.emotion_model_path(),
    )
    .with_context(|| format!("loading models from {}", config.model_dir.display()))?;

    let engine = engine::spawn_engine(Box::new(analyzer), config.engine_queue)?;

    server::serve(server_config, engine).await?;
    tracing::info!("emosensed shutting down");

    Ok(())
}
