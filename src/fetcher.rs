use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::analytics::rating_history::monthly_rating_point;
use crate::config::{Config, USER_AGENT};
use crate::error::{AppError, Result};
use crate::replay::{MoveReplay, ReplayedGame};
use crate::types::{Color, GameRecord, Participant, RatingPoint};

// ---------------------------------------------------------------------------
// Raw archive payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RawParticipant {
    pub username: String,
    #[serde(default)]
    pub rating: i32,
    #[serde(default)]
    pub result: String,
}

/// One entry of `/player/{user}/games/{yyyy}/{mm}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGame {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pgn: Option<String>,
    pub end_time: i64,
    #[serde(default)]
    pub rules: Option<String>,
    #[serde(default)]
    pub time_class: Option<String>,
    pub white: RawParticipant,
    pub black: RawParticipant,
}

#[derive(Debug, Deserialize)]
struct ArchiveList {
    #[serde(default)]
    archives: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ArchiveGames {
    #[serde(default)]
    games: Vec<RawGame>,
}

impl RawGame {
    /// Only games explicitly tagged `rules: "chess"` count; variants and
    /// entries without a rules field do not.
    pub fn is_standard_chess(&self) -> bool {
        self.rules.as_deref() == Some("chess")
    }

    /// Which side `subject` played, case-insensitively. None if neither.
    pub fn subject_color(&self, subject: &str) -> Option<Color> {
        if self.white.username.eq_ignore_ascii_case(subject) {
            Some(Color::White)
        } else if self.black.username.eq_ignore_ascii_case(subject) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Builds the subject's record from an already-replayed game.
    /// None if the subject did not play or the end time is out of range.
    pub fn record_for(&self, subject: &str, replayed: ReplayedGame) -> Option<GameRecord> {
        let subject_color = self.subject_color(subject)?;
        let end_time = DateTime::<Utc>::from_timestamp(self.end_time, 0)?;
        let subject_result = match subject_color {
            Color::White => self.white.result.clone(),
            Color::Black => self.black.result.clone(),
        };
        Some(GameRecord {
            end_time,
            moves: replayed.moves,
            subject_color,
            subject_result,
            opening: replayed.opening,
            url: self.url.clone(),
            white: participant(&self.white),
            black: participant(&self.black),
            time_class: self.time_class.clone(),
        })
    }
}

fn participant(raw: &RawParticipant) -> Participant {
    Participant {
        username: raw.username.clone(),
        rating: raw.rating,
        result: raw.result.clone(),
    }
}

/// Replays the game's PGN and builds the subject's record.
///
/// Returns None (the record is dropped) when the subject is not a
/// participant or the replay fails; a game without PGN text has no moves.
pub fn to_game_record(raw: &RawGame, subject: &str, replay: &dyn MoveReplay) -> Option<GameRecord> {
    let replayed = match raw.pgn.as_deref() {
        Some(pgn) => match replay.replay(pgn) {
            Ok(game) => game,
            Err(e) => {
                debug!(url = ?raw.url, "dropping game, replay failed: {e}");
                return None;
            }
        },
        None => ReplayedGame::default(),
    };
    raw.record_for(subject, replayed)
}

/// Records for every game in `games` the subject took part in.
pub fn to_game_records(games: &[RawGame], subject: &str, replay: &dyn MoveReplay) -> Vec<GameRecord> {
    games
        .iter()
        .filter_map(|g| to_game_record(g, subject, replay))
        .collect()
}

/// Rating sample for one archive month: the last standard-chess game of
/// `time_class`. No replay is needed for this view.
pub fn archive_rating_point(games: &[RawGame], subject: &str, time_class: &str) -> Option<RatingPoint> {
    let records: Vec<GameRecord> = games
        .iter()
        .filter(|g| g.is_standard_chess())
        .filter_map(|g| g.record_for(subject, ReplayedGame::default()))
        .collect();
    monthly_rating_point(&records, subject, time_class)
}

// ---------------------------------------------------------------------------
// ChessComClient
// ---------------------------------------------------------------------------

/// Thin client for the chess.com public API.
#[derive(Clone)]
pub struct ChessComClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChessComClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.chess_api_url.clone(),
        })
    }

    fn player_url(&self, username: &str, suffix: &str) -> String {
        format!("{}/player/{}{}", self.base_url, username.to_lowercase(), suffix)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Upstream error")
                        .to_string()
                });
            warn!(url, status = status.as_u16(), "upstream request failed: {message}");
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<T>().await?)
    }

    pub async fn player(&self, username: &str) -> Result<serde_json::Value> {
        self.get_json(&self.player_url(username, "")).await
    }

    pub async fn player_stats(&self, username: &str) -> Result<serde_json::Value> {
        self.get_json(&self.player_url(username, "/stats")).await
    }

    pub async fn player_clubs(&self, username: &str) -> Result<serde_json::Value> {
        self.get_json(&self.player_url(username, "/clubs")).await
    }

    pub async fn current_daily_games(&self, username: &str) -> Result<serde_json::Value> {
        self.get_json(&self.player_url(username, "/games")).await
    }

    /// Archive URLs, oldest first.
    pub async fn monthly_archives(&self, username: &str) -> Result<Vec<String>> {
        let list: ArchiveList = self.get_json(&self.player_url(username, "/games/archives")).await?;
        Ok(list.archives)
    }

    pub async fn archive_games(&self, archive_url: &str) -> Result<Vec<RawGame>> {
        let archive: ArchiveGames = self.get_json(archive_url).await?;
        Ok(archive.games)
    }

    /// Games from the most recent `months` archives, oldest first. A month
    /// that fails to load is skipped; a failing archive list fails the call.
    pub async fn recent_games(&self, username: &str, months: usize) -> Result<Vec<RawGame>> {
        let archives = self.monthly_archives(username).await?;
        let recent = &archives[archives.len().saturating_sub(months)..];

        let results = join_all(recent.iter().map(|url| self.archive_games(url))).await;
        let mut games = Vec::new();
        for (url, result) in recent.iter().zip(results) {
            match result {
                Ok(month) => games.extend(month),
                Err(e) => warn!(url = %url, "skipping archive month: {e}"),
            }
        }
        info!(
            username,
            archives = recent.len(),
            games = games.len(),
            "Fetched recent games"
        );
        Ok(games)
    }

    /// Monthly rating points over the last `months` archives.
    pub async fn rating_history(
        &self,
        username: &str,
        months: usize,
        time_class: &str,
    ) -> Result<Vec<RatingPoint>> {
        let archives = self.monthly_archives(username).await?;
        let recent = &archives[archives.len().saturating_sub(months)..];

        let results = join_all(recent.iter().map(|url| self.archive_games(url))).await;
        let mut points = Vec::new();
        for (url, result) in recent.iter().zip(results) {
            match result {
                Ok(games) => points.extend(archive_rating_point(&games, username, time_class)),
                Err(e) => warn!(url = %url, "skipping archive month in history: {e}"),
            }
        }
        Ok(points)
    }
}

// ---------------------------------------------------------------------------
// Response decoration
// ---------------------------------------------------------------------------

const TIMESTAMP_KEYS: &[&str] = &["date", "joined", "last_online"];

/// Adds `<key>_formatted` next to every numeric `date`/`joined`/`last_online`
/// field, at any depth. Rendered in UTC.
pub fn with_formatted_timestamps(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(with_formatted_timestamps).collect())
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                if TIMESTAMP_KEYS.contains(&key.as_str()) {
                    if let Some(formatted) = v.as_i64().and_then(format_unix_secs) {
                        out.insert(format!("{key}_formatted"), serde_json::Value::String(formatted));
                    }
                }
                out.insert(key, with_formatted_timestamps(v));
            }
            serde_json::Value::Object(out)
        }
        other => other,
    }
}

fn format_unix_secs(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::{PgnReplay, ReplayError};
    use chrono::Datelike;

    fn archive_json() -> serde_json::Value {
        serde_json::json!({
            "games": [
                {
                    "url": "https://www.chess.com/game/live/1",
                    "pgn": "[Event \"Live Chess\"]\n[Opening \"Sicilian Defense: Open\"]\n\n1. e4 c5 2. Nf3 d6 0-1",
                    "end_time": 1704622500,
                    "rules": "chess",
                    "time_class": "rapid",
                    "white": {"username": "Alice", "rating": 1510, "result": "resigned"},
                    "black": {"username": "bob", "rating": 1490, "result": "win"}
                },
                {
                    "url": "https://www.chess.com/game/live/2",
                    "pgn": "1. e4 e5 2. Ke3 *",
                    "end_time": 1704709000,
                    "rules": "chess",
                    "time_class": "rapid",
                    "white": {"username": "alice", "rating": 1500, "result": "win"},
                    "black": {"username": "carol", "rating": 1300, "result": "checkmated"}
                },
                {
                    "url": "https://www.chess.com/game/daily/3",
                    "end_time": 1705000000,
                    "rules": "chess960",
                    "time_class": "rapid",
                    "white": {"username": "dave", "rating": 1700, "result": "win"},
                    "black": {"username": "alice", "rating": 1560, "result": "timeout"}
                },
                {
                    "end_time": 1705100000,
                    "rules": "chess",
                    "time_class": "blitz",
                    "white": {"username": "alice", "rating": 1200, "result": "agreed"},
                    "black": {"username": "erin", "rating": 1210, "result": "agreed"}
                }
            ]
        })
    }

    fn raw_games() -> Vec<RawGame> {
        let archive: ArchiveGames = serde_json::from_value(archive_json()).unwrap();
        archive.games
    }

    struct FailingReplay;

    impl MoveReplay for FailingReplay {
        fn replay(&self, _pgn: &str) -> std::result::Result<ReplayedGame, ReplayError> {
            Err(ReplayError::NoGame)
        }
    }

    #[test]
    fn builds_records_from_subject_side() {
        let games = raw_games();
        let record = to_game_record(&games[0], "alice", &PgnReplay::new()).unwrap();
        assert_eq!(record.subject_color, Color::White);
        assert_eq!(record.subject_result, "resigned");
        assert_eq!(record.moves, ["e4", "c5", "Nf3", "d6"]);
        assert_eq!(record.opening.as_deref(), Some("Sicilian Defense: Open"));
        assert_eq!(record.end_time.timestamp(), 1704622500);
        assert_eq!(record.subject().rating, 1510);

        let as_bob = to_game_record(&games[0], "BOB", &PgnReplay::new()).unwrap();
        assert_eq!(as_bob.subject_color, Color::Black);
        assert_eq!(as_bob.subject_result, "win");
    }

    #[test]
    fn failed_replay_drops_only_that_game() {
        let games = raw_games();
        let records = to_game_records(&games, "alice", &PgnReplay::new());
        // game 2 has an illegal move; games 3 and 4 have no PGN text
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.url.as_deref() != Some("https://www.chess.com/game/live/2")));
        assert!(records[2].moves.is_empty());

        assert!(to_game_record(&games[0], "alice", &FailingReplay).is_none());
        assert!(to_game_record(&games[3], "alice", &FailingReplay).is_some());
    }

    #[test]
    fn non_participant_is_skipped() {
        let games = raw_games();
        assert!(to_game_record(&games[0], "mallory", &PgnReplay::new()).is_none());
    }

    #[test]
    fn rating_point_ignores_variants_and_other_time_classes() {
        let games = raw_games();
        let point = archive_rating_point(&games, "alice", "rapid").unwrap();
        // the chess960 game is later but does not count
        assert_eq!(point.rating, 1500);
        assert_eq!(point.date.day(), 1);
        assert_eq!(point.date.month(), 1);

        let blitz = archive_rating_point(&games, "alice", "blitz").unwrap();
        assert_eq!(blitz.rating, 1200);
        assert!(archive_rating_point(&games, "alice", "bullet").is_none());
    }

    #[test]
    fn missing_rules_field_is_not_standard_chess() {
        let mut games = raw_games();
        games[1].rules = None;
        assert!(!games[1].is_standard_chess());
        // game 2 no longer counts, the earlier rapid game sets the point
        let point = archive_rating_point(&games, "alice", "rapid").unwrap();
        assert_eq!(point.rating, 1510);
    }

    #[test]
    fn formats_nested_timestamps() {
        let v = serde_json::json!({
            "username": "alice",
            "joined": 1_600_000_000,
            "last_online": "never",
            "chess_rapid": {"last": {"rating": 1500, "date": 0}}
        });
        let out = with_formatted_timestamps(v);
        assert_eq!(out["joined_formatted"], "2020-09-13 12:26:40 UTC");
        assert!(out.get("last_online_formatted").is_none());
        assert_eq!(out["chess_rapid"]["last"]["date_formatted"], "1970-01-01 00:00:00 UTC");
        assert_eq!(out["chess_rapid"]["last"]["rating"], 1500);
    }

    #[test]
    fn formatting_walks_arrays() {
        let v = serde_json::json!([{"date": 86_400}, 3]);
        let out = with_formatted_timestamps(v);
        assert_eq!(out[0]["date_formatted"], "1970-01-02 00:00:00 UTC");
        assert_eq!(out[1], 3);
    }
}
