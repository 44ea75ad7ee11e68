//! Three-month developmental milestone forecast.

use crate::DomainScores;
use serde::{Deserialize, Serialize};

/// Monthly growth multipliers applied to the current trend.
const MONTHLY_GROWTH: [f64; 3] = [1.05, 1.10, 1.15];

/// Developmental trend per area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub language: f64,
    pub motor: f64,
    pub social_emotional: f64,
    pub cognition: f64,
}

impl Trend {
    /// Current trend from screening scores.
    ///
    /// Missing scores default to 0.5, except `story` which defaults to 0.4.
    pub fn from_scores(scores: &DomainScores) -> Self {
        Self {
            language: scores.get_or("voice", 0.5) * 0.6 + scores.get_or("story", 0.4) * 0.4,
            motor: scores.get_or("sensor", 0.5),
            social_emotional: scores.get_or("emotion", 0.5),
            cognition: scores.get_or("quiz", 0.5),
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            language: self.language * factor,
            motor: self.motor * factor,
            social_emotional: self.social_emotional * factor,
            cognition: self.cognition * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyForecast {
    pub month1: Trend,
    pub month2: Trend,
    pub month3: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneForecast {
    pub current: Trend,
    pub forecast: MonthlyForecast,
}

pub fn predict_milestones(scores: &DomainScores) -> MilestoneForecast {
    let current = Trend::from_scores(scores);
    let [m1, m2, m3] = MONTHLY_GROWTH;
    MilestoneForecast {
        current,
        forecast: MonthlyForecast {
            month1: current.scaled(m1),
            month2: current.scaled(m2),
            month3: current.scaled(m3),
        },
    }
}
