//! Parent–child bonding score from free-text feedback.

use serde::{Deserialize, Serialize};

const BASE_SCORE: f64 = 0.5;
const WORD_WEIGHT: f64 = 0.05;
const POSITIVE_WORDS: [&str; 6] = ["love", "hug", "play", "smile", "together", "proud"];

/// Score plus a suggested next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondingReport {
    pub score: f64,
    pub intervention: String,
}

/// `0.5 + 0.05` per positive word present (case-insensitive substring match,
/// each word counted once), clamped to 0.0–1.0.
pub fn bonding_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let hits = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    (BASE_SCORE + WORD_WEIGHT * hits as f64).clamp(0.0, 1.0)
}

/// Intervention tier for a score.
pub fn intervention_for(score: f64) -> &'static str {
    if score >= 0.8 {
        "Excellent bonding! Keep celebrating small moments together."
    } else if score >= 0.6 {
        "Good bonding. Try adding more playtime or hugs."
    } else if score >= 0.4 {
        "Moderate bonding. Spend a few minutes listening calmly today."
    } else {
        "Needs more connection. Plan a simple joyful activity together."
    }
}

pub fn bonding_report(text: &str) -> BondingReport {
    let score = bonding_score(text);
    tracing::debug!(score, "bonding score computed");
    BondingReport {
        score,
        intervention: intervention_for(score).to_string(),
    }
}
