use serde::{Deserialize, Serialize};

/// Result codes that count as a loss for the player who carries them.
pub const LOSS_CODES: &[&str] = &["checkmated", "resigned", "timeout", "abandoned"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    /// Maps a per-player result code. Anything that is neither `win` nor a
    /// loss code is a draw, including unknown codes.
    pub fn from_result_code(code: &str) -> Self {
        if code == "win" {
            Outcome::Win
        } else if LOSS_CODES.contains(&code) {
            Outcome::Loss
        } else {
            Outcome::Draw
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Draw => "draw",
        };
        write!(f, "{s}")
    }
}

/// Classify a subject's result code.
///
/// `_subject_color_match` is accepted for callers that track which side the
/// code came from; it never changes the outcome because the code is always
/// the subject's own.
pub fn classify(result_code: &str, _subject_color_match: bool) -> Outcome {
    Outcome::from_result_code(result_code)
}
