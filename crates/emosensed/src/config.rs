use crate::server::{CorsPolicy, ServerConfig};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid listen host: {0}")]
    InvalidHost(String),
}

/// Daemon configuration.
///
/// Defaults, optionally overlaid by the TOML file named in `EMOSENSE_CONFIG`,
/// then by individual `EMOSENSE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Listen address (default: 0.0.0.0).
    pub host: String,
    /// Listen port (default: 5001).
    pub port: u16,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Accept cross-origin requests from any origin.
    pub cors_allow_any: bool,
    /// Upper bound on the request body, in bytes.
    pub max_body_bytes: usize,
    /// Pending analysis requests buffered ahead of the engine thread.
    pub engine_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            model_dir: emosense_core::default_model_dir(),
            cors_allow_any: true,
            max_body_bytes: 16 * 1024 * 1024,
            engine_queue: 16,
        }
    }
}

impl Config {
    /// Load from `EMOSENSE_CONFIG` (if set) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("EMOSENSE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `EMOSENSE_*` overrides on top of `self`.
    pub fn with_env(self) -> Self {
        Self {
            host: std::env::var("EMOSENSE_HOST").unwrap_or(self.host),
            port: env_or("EMOSENSE_PORT", self.port),
            model_dir: std::env::var("EMOSENSE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(self.model_dir),
            cors_allow_any: std::env::var("EMOSENSE_CORS_ALLOW_ANY")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(self.cors_allow_any),
            max_body_bytes: env_or("EMOSENSE_MAX_BODY_BYTES", self.max_body_bytes),
            engine_queue: env_or("EMOSENSE_ENGINE_QUEUE", self.engine_queue).max(1),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(emosense_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the emotion classification model.
    pub fn emotion_model_path(&self) -> String {
        self.model_dir
            .join(emosense_core::EMOTION_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Listener settings, built once at startup.
    pub fn server(&self) -> Result<ServerConfig, ConfigError> {
        let ip = IpAddr::from_str(&self.host)
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;
        Ok(ServerConfig {
            addr: SocketAddr::new(ip, self.port),
            cors: if self.cors_allow_any {
                CorsPolicy::AnyOrigin
            } else {
                CorsPolicy::SameOrigin
            },
            max_body_bytes: self.max_body_bytes,
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset or
/// unparseable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
