use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::openings::{CandidateMove, OpeningIndex, OpeningRollup};
use crate::analytics::outcome::Outcome;
use crate::analytics::temporal::{
    aggregate, aggregate_daily, color_split, within_days, ActivityReport, ColorSplit, DailyActivity,
    DailyCount, DayActivity,
};
use crate::fetcher::{to_game_records, RawGame};
use crate::replay::MoveReplay;
use crate::types::{Color, GameRecord, Participant, Summary};

/// Everything the dashboard shows for one player, built once per cache
/// window from the player's recent archives.
#[derive(Debug, Clone)]
pub struct PlayerCorpus {
    pub username: String,
    pub built_at: DateTime<Utc>,
    /// Games in the trailing window, also ingested into `index`.
    pub index: OpeningIndex,
    pub activity: ActivityReport,
    pub colors: ColorSplit,
    /// Calendar activity over every fetched archive month.
    pub daily: DailyActivity,
    pub games_total: usize,
    pub games_dropped: usize,
}

impl PlayerCorpus {
    /// Replays `raw` for `username` and derives every view. Games whose
    /// replay fails are counted in `games_dropped` and otherwise ignored.
    pub fn build(
        username: &str,
        raw: &[RawGame],
        replay: &dyn MoveReplay,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> Self {
        let records = to_game_records(raw, username, replay);
        let participated = raw.iter().filter(|g| g.subject_color(username).is_some()).count();
        let recent = within_days(&records, now, window_days);

        Self {
            username: username.to_lowercase(),
            built_at: now,
            index: OpeningIndex::build(&recent),
            activity: aggregate(&recent),
            colors: color_split(&recent),
            daily: aggregate_daily(&records),
            games_total: records.len(),
            games_dropped: participated.saturating_sub(records.len()),
        }
    }

    pub fn insights(&self, top_openings: usize) -> InsightsResponse {
        InsightsResponse {
            username: self.username.clone(),
            activity: self.activity.grid.rows(),
            daily_activity: self.daily.entries(),
            openings: self.index.top_openings(top_openings).into_iter().cloned().collect(),
            color_stats: self.colors,
            summary: self.activity.summary,
            win_rate_pct: self.activity.summary.win_rate_pct(),
            games_analyzed: self.index.game_count(),
            games_dropped: self.games_dropped,
            built_at: self.built_at,
        }
    }

    pub fn explore(&self, prefix: Vec<String>) -> OpeningsResponse {
        let q = self.index.query_prefix(&prefix);
        OpeningsResponse {
            candidate_moves: q.candidate_moves,
            matching_games: q.matching_games.into_iter().map(MatchingGame::from).collect(),
            terminal_count: q.terminal_count,
            prefix,
        }
    }
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsResponse {
    pub username: String,
    pub activity: Vec<DayActivity>,
    pub daily_activity: Vec<DailyCount>,
    pub openings: Vec<OpeningRollup>,
    pub color_stats: ColorSplit,
    pub summary: Summary,
    pub win_rate_pct: u32,
    pub games_analyzed: usize,
    pub games_dropped: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingGame {
    pub url: Option<String>,
    pub end_time: DateTime<Utc>,
    pub white: Participant,
    pub black: Participant,
    pub subject_color: Color,
    pub outcome: Outcome,
    pub opening: Option<String>,
    pub ply_count: usize,
}

impl From<&GameRecord> for MatchingGame {
    fn from(g: &GameRecord) -> Self {
        Self {
            url: g.url.clone(),
            end_time: g.end_time,
            white: g.white.clone(),
            black: g.black.clone(),
            subject_color: g.subject_color,
            outcome: g.outcome(),
            opening: g.opening.clone(),
            ply_count: g.moves.len(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningsResponse {
    pub prefix: Vec<String>,
    pub candidate_moves: Vec<CandidateMove>,
    pub matching_games: Vec<MatchingGame>,
    pub terminal_count: u32,
}

/// `"e4,e5"` or `"e4 e5"` → `["e4", "e5"]`.
pub fn parse_move_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::PgnReplay;
    use chrono::TimeZone;

    fn raw(end_time: i64, pgn: &str, white: &str, white_result: &str, black: &str, black_result: &str) -> RawGame {
        serde_json::from_value(serde_json::json!({
            "url": format!("https://www.chess.com/game/live/{end_time}"),
            "pgn": pgn,
            "end_time": end_time,
            "rules": "chess",
            "time_class": "rapid",
            "white": {"username": white, "rating": 1500, "result": white_result},
            "black": {"username": black, "rating": 1500, "result": black_result},
        }))
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap()
    }

    fn corpus() -> PlayerCorpus {
        // 2024-01-07 10:15 UTC, Sunday
        let sunday = 1704622500;
        let games = vec![
            raw(sunday, "[Opening \"Ruy Lopez: Berlin\"]\n\n1. e4 e5 2. Nf3 Nc6 3. Bb5 1-0", "alice", "win", "x", "resigned"),
            raw(sunday + 60, "[Opening \"Sicilian Defense\"]\n\n1. e4 c5 0-1", "alice", "resigned", "y", "win"),
            raw(sunday + 120, "1. d4 d5 1/2-1/2", "z", "agreed", "Alice", "agreed"),
            raw(sunday + 180, "1. e4 e5 2. Qh4 *", "alice", "win", "w", "timeout"),
            // outside the 30-day window but inside the archive
            raw(1672531200, "1. c4 1-0", "alice", "win", "v", "abandoned"),
        ];
        PlayerCorpus::build("Alice", &games, &PgnReplay::new(), now(), 30)
    }

    #[test]
    fn builds_views_over_the_trailing_window() {
        let c = corpus();
        assert_eq!(c.username, "alice");
        assert_eq!(c.games_dropped, 1);
        assert_eq!(c.games_total, 4);
        assert_eq!(c.index.game_count(), 3);
        assert_eq!(c.activity.grid.get(0, 10), 3);
        assert_eq!(c.activity.summary.total(), 3);
        assert_eq!(c.colors.white.total(), 2);
        assert_eq!(c.colors.black.draws(), 1);
        // calendar view keeps the old game
        assert_eq!(c.daily.len(), 2);
    }

    #[test]
    fn insights_response_uses_dashboard_field_names() {
        let v = serde_json::to_value(corpus().insights(10)).unwrap();
        assert_eq!(v["activity"].as_array().unwrap().len(), 7);
        assert_eq!(v["activity"][0]["hours"][10]["count"], 3);
        assert_eq!(v["dailyActivity"][1]["date"], "2024-01-07");
        assert_eq!(v["colorStats"]["white"]["wins"], 1);
        assert_eq!(v["summary"]["total"], 3);
        // one win out of three
        assert_eq!(v["winRatePct"], 33);
        let openings = v["openings"].as_array().unwrap();
        assert_eq!(openings.len(), 2);
        assert_eq!(openings[0]["name"], "Ruy Lopez");
        assert_eq!(openings[0]["color"], "white");
    }

    #[test]
    fn explore_walks_the_prefix_tree() {
        let c = corpus();
        let r = c.explore(parse_move_list(Some("e4")));
        assert_eq!(r.prefix, ["e4"]);
        let moves: Vec<_> = r.candidate_moves.iter().map(|m| m.mv.as_str()).collect();
        assert_eq!(moves, ["c5", "e5"]);
        assert_eq!(r.matching_games.len(), 2);
        assert_eq!(r.matching_games[1].outcome, Outcome::Loss);

        let root = c.explore(Vec::new());
        assert_eq!(root.matching_games.len(), 3);
        assert_eq!(root.candidate_moves[0].mv, "e4");
    }

    #[test]
    fn move_lists_accept_commas_and_spaces() {
        assert_eq!(parse_move_list(Some("e4, e5 Nf3")), ["e4", "e5", "Nf3"]);
        assert!(parse_move_list(Some(" , ")).is_empty());
        assert!(parse_move_list(None).is_empty());
    }
}
