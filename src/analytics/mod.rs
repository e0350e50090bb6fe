pub mod openings;
pub mod outcome;
pub mod rating_history;
pub mod temporal;

pub use openings::{OpeningIndex, OpeningRollup, PrefixQuery};
pub use outcome::{classify, Outcome};
pub use rating_history::{reconcile, ReconciledSeries};
pub use temporal::{aggregate, aggregate_daily, color_split, ActivityGrid, DailyActivity};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};

    use crate::types::{Color, GameRecord, Participant};

    pub fn moves(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    /// A game ending 2024-01-07 10:15 UTC (a Sunday) seen from `color`.
    pub fn game(tokens: &[&str], result: &str, color: Color, opening: Option<&str>) -> GameRecord {
        let (white_result, black_result) = match color {
            Color::White => (result.to_string(), "win".to_string()),
            Color::Black => ("win".to_string(), result.to_string()),
        };
        GameRecord {
            end_time: Utc.with_ymd_and_hms(2024, 1, 7, 10, 15, 0).unwrap(),
            moves: moves(tokens),
            subject_color: color,
            subject_result: result.to_string(),
            opening: opening.map(str::to_string),
            url: None,
            white: Participant {
                username: "alice".to_string(),
                rating: 1500,
                result: white_result,
            },
            black: Participant {
                username: "bob".to_string(),
                rating: 1480,
                result: black_result,
            },
            time_class: Some("rapid".to_string()),
        }
    }
}
