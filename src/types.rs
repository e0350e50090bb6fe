use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::outcome::Outcome;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Color::White => "white",
            Color::Black => "black",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// GameRecord
// ---------------------------------------------------------------------------

/// One side of a finished game as reported by the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub username: String,
    pub rating: i32,
    pub result: String,
}

/// A finished game seen from the subject player's side.
///
/// `moves` holds SAN tokens as produced by the replay engine and may be empty
/// when the PGN carried no movetext. Records whose replay failed never get built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub end_time: DateTime<Utc>,
    pub moves: Vec<String>,
    pub subject_color: Color,
    pub subject_result: String,
    pub opening: Option<String>,
    pub url: Option<String>,
    pub white: Participant,
    pub black: Participant,
    pub time_class: Option<String>,
}

impl GameRecord {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_result_code(&self.subject_result)
    }

    pub fn subject(&self) -> &Participant {
        match self.subject_color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome counters
// ---------------------------------------------------------------------------

/// Win/loss/draw counter. `total` always equals `wins + losses + draws`;
/// the fields are only mutated through `record` and `merge`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    wins: u32,
    losses: u32,
    draws: u32,
    total: u32,
}

/// Per-color breakdown of a player's results.
pub type ColorStats = OutcomeCounts;

/// Overall results across every game in a slice.
pub type Summary = OutcomeCounts;

impl OutcomeCounts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
        }
        self.total += 1;
    }

    pub fn merge(&mut self, other: &OutcomeCounts) {
        self.wins += other.wins;
        self.losses += other.losses;
        self.draws += other.draws;
        self.total += other.total;
    }

    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn losses(&self) -> u32 {
        self.losses
    }

    pub fn draws(&self) -> u32 {
        self.draws
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Rounded win percentage, 0 for an empty counter.
    pub fn win_rate_pct(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.wins as f64 / self.total as f64) * 100.0).round() as u32
    }
}

// ---------------------------------------------------------------------------
// Rating history
// ---------------------------------------------------------------------------

/// A monthly rating sample. `date` is always the first day of its month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingPoint {
    pub date: NaiveDate,
    pub rating: i32,
}

impl RatingPoint {
    /// Returns None for an invalid year/month pair.
    pub fn new(year: i32, month: u32, rating: i32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { date, rating })
    }

    /// Builds a point for the UTC calendar month containing `ts`.
    pub fn for_month_of(ts: DateTime<Utc>, rating: i32) -> Self {
        let day = ts.date_naive();
        // day 1 of an existing month is always valid
        let date = day.with_day(1).unwrap_or(day);
        Self { date, rating }
    }
}
