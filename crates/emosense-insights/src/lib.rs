//! emosense-insights — heuristic insights from screening scores.
//!
//! Everything here is a deterministic function of its inputs: a bonding
//! score from parent feedback text, a three-month milestone forecast and a
//! short list of activity tips.

pub mod bonding;
pub mod milestones;
pub mod tips;

pub use bonding::{bonding_report, bonding_score, BondingReport};
pub use milestones::{predict_milestones, MilestoneForecast, Trend};
pub use tips::generate_tips;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ScoreParseError {
    #[error("expected key=value, got {0:?}")]
    MissingSeparator(String),
    #[error("score key is empty")]
    EmptyKey,
    #[error("score for {key} is not a number: {value:?}")]
    NotANumber { key: String, value: String },
}

/// Screening scores keyed by domain (`emotion`, `story`, `sound`, `sensor`,
/// `voice`, `quiz`), nominally in 0.0–1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainScores(BTreeMap<String, f64>);

impl DomainScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, score: f64) -> Self {
        self.insert(key, score);
        self
    }

    pub fn insert(&mut self, key: &str, score: f64) {
        self.0.insert(key.to_string(), score);
    }

    /// Score for `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.0.get(key).copied().unwrap_or(default)
    }
}

impl FromIterator<(String, f64)> for DomainScores {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One `key=value` pair, as given on a command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub key: String,
    pub score: f64,
}

impl FromStr for ScoreEntry {
    type Err = ScoreParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| ScoreParseError::MissingSeparator(s.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ScoreParseError::EmptyKey);
        }
        let score = value
            .trim()
            .parse()
            .map_err(|_| ScoreParseError::NotANumber {
                key: key.to_string(),
                value: value.to_string(),
            })?;
        Ok(Self {
            key: key.to_string(),
            score,
        })
    }
}

impl FromIterator<ScoreEntry> for DomainScores {
    fn from_iter<I: IntoIterator<Item = ScoreEntry>>(iter: I) -> Self {
        iter.into_iter().map(|e| (e.key, e.score)).collect()
    }
}
