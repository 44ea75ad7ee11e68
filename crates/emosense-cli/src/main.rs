use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use emosense_core::{decoder, normalize, AnalysisResponse, EmotionAnalyzer, OnnxEmotionAnalyzer};
use emosense_insights::{bonding_report, generate_tips, predict_milestones, DomainScores, ScoreEntry};
use std::path::{Path, PathBuf};

const DEFAULT_URL: &str = "http://127.0.0.1:5001";

#[derive(Parser)]
#[command(name = "emosense", about = "emosense facial emotion analysis CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the faces in an image file
    Analyze {
        /// Image file (PNG, JPEG, ...)
        path: PathBuf,
        /// Base URL of a running emosensed
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
        /// Run the models in-process instead of calling the daemon
        #[arg(long)]
        local: bool,
        /// Model directory for --local
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Check that the daemon is up
    Status {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
    /// Bonding score from parent feedback text
    Bonding {
        #[arg(short, long)]
        text: String,
    },
    /// Three-month milestone forecast from screening scores
    Forecast {
        /// Screening score, e.g. --score voice=0.55 (repeatable)
        #[arg(short, long = "score", value_name = "KEY=VALUE")]
        scores: Vec<ScoreEntry>,
    },
    /// Activity tips for weak screening areas
    Tips {
        /// Screening score, e.g. --score sensor=0.4 (repeatable)
        #[arg(short, long = "score", value_name = "KEY=VALUE")]
        scores: Vec<ScoreEntry>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            path,
            url,
            local,
            model_dir,
        } => {
            let response = if local {
                analyze_local(&path, model_dir)?
            } else {
                analyze_remote(&path, &url).await?
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Status { url } => {
            let body = reqwest::get(&url)
                .await
                .with_context(|| format!("connecting to {url}"))?
                .error_for_status()?
                .text()
                .await?;
            println!("{body}");
        }
        Commands::Bonding { text } => {
            println!("{}", serde_json::to_string_pretty(&bonding_report(&text))?);
        }
        Commands::Forecast { scores } => {
            let scores: DomainScores = scores.into_iter().collect();
            println!("{}", serde_json::to_string_pretty(&predict_milestones(&scores))?);
        }
        Commands::Tips { scores } => {
            let scores: DomainScores = scores.into_iter().collect();
            for tip in generate_tips(&scores) {
                println!("- {tip}");
            }
        }
    }

    Ok(())
}

/// POST the image to the daemon as a data URI.
async fn analyze_remote(path: &Path, url: &str) -> Result<serde_json::Value> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let endpoint = format!("{}/api/emotion", url.trim_end_matches('/'));
    tracing::debug!(%endpoint, bytes = bytes.len(), "sending image");

    let response = reqwest::Client::new()
        .post(&endpoint)
        .json(&serde_json::json!({ "image": decoder::to_data_uri(&bytes) }))
        .send()
        .await
        .with_context(|| format!("connecting to {endpoint}"))?;

    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("unknown error");
        bail!("emosensed returned {status}: {message}");
    }
    Ok(body)
}

/// Decode, analyze and normalize in-process.
fn analyze_local(path: &Path, model_dir: Option<PathBuf>) -> Result<serde_json::Value> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let image = decoder::decode_image(&bytes)?;

    let model_dir = model_dir.unwrap_or_else(emosense_core::default_model_dir);
    let model_path = |file: &str| model_dir.join(file).to_string_lossy().into_owned();
    let mut analyzer = OnnxEmotionAnalyzer::load(
        &model_path(emosense_core::DETECTOR_MODEL_FILE),
        &model_path(emosense_core::EMOTION_MODEL_FILE),
    )?;

    let output = analyzer.analyze(&image)?;
    let response = AnalysisResponse::success(normalize::normalize_output(output)?);
    Ok(serde_json::to_value(response)?)
}
