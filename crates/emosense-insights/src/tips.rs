//! Activity tips for the weakest screening areas.

use crate::DomainScores;

const TIP_THRESHOLD: f64 = 0.6;

const STORYTIME_TIP: &str = "Storytime: read and repeat 5 new words together.";
const FINE_MOTOR_TIP: &str = "Fine motor: 2-minute finger tracing on sand or rice.";
const EMOTION_PLAY_TIP: &str = "Emotion play: mirror faces and name the feelings.";
const FREE_PLAY_TIP: &str = "Free play: choose a favorite game and celebrate small wins!";

/// One tip per area scoring under 0.6 (voice, sensor, emotion, in that
/// order; missing scores count as 0.0). Falls back to a single free-play tip.
pub fn generate_tips(scores: &DomainScores) -> Vec<&'static str> {
    let tips: Vec<&'static str> = [
        ("voice", STORYTIME_TIP),
        ("sensor", FINE_MOTOR_TIP),
        ("emotion", EMOTION_PLAY_TIP),
    ]
    .into_iter()
    .filter(|(key, _)| scores.get_or(key, 0.0) < TIP_THRESHOLD)
    .map(|(_, tip)| tip)
    .collect();

    if tips.is_empty() {
        vec![FREE_PLAY_TIP]
    } else {
        tips
    }
}
