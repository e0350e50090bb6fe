use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::analytics::reconcile;
use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, StageLatency, STAGE_BUILD, STAGE_FETCH};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::{with_formatted_timestamps, ChessComClient};
use crate::insights::{parse_move_list, InsightsResponse, OpeningsResponse, PlayerCorpus};
use crate::replay::{MoveReplay, PgnReplay};
use crate::state::{AnalyticsCache, CacheStats};
use crate::types::RatingPoint;

const MAX_USERNAME_LEN: usize = 50;

#[derive(Clone)]
pub struct ApiState {
    pub cfg: Arc<Config>,
    pub client: ChessComClient,
    pub replay: Arc<dyn MoveReplay>,
    /// Replayed games and derived views, keyed `corpus:<username>`.
    pub corpus: Arc<AnalyticsCache<Arc<PlayerCorpus>>>,
    /// Monthly rating points, keyed `history:<username>:<time_class>`.
    pub history: Arc<AnalyticsCache<Vec<RatingPoint>>>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

impl ApiState {
    pub fn new(cfg: Config) -> Result<Self> {
        let ttl = Duration::from_secs(cfg.cache_ttl_secs);
        Ok(Self {
            client: ChessComClient::new(&cfg)?,
            cfg: Arc::new(cfg),
            replay: Arc::new(PgnReplay::new()),
            corpus: Arc::new(AnalyticsCache::new(ttl)),
            history: Arc::new(AnalyticsCache::new(ttl)),
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new()),
        })
    }

    /// Records the upstream outcome of a handler in the health counters.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                self.health.inc_requests_served();
                self.health
                    .set_last_upstream_ok_secs(Utc::now().timestamp().max(0) as u64);
            }
            Err(AppError::Upstream { .. } | AppError::Http(_) | AppError::Json(_)) => {
                self.health.inc_upstream_errors();
            }
            Err(_) => {}
        }
        result
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/health", get(get_health))
        .route("/player/:id", get(get_player))
        .route("/player/:id/stats", get(get_player_stats))
        .route("/player/:id/full", get(get_player_full))
        .route("/player/:id/clubs", get(get_player_clubs))
        .route("/player/:id/matches", get(get_player_matches))
        .route("/player/:id/insights", get(get_player_insights))
        .route("/player/:id/openings", get(get_player_openings))
        .route("/compare/:p1/:p2", get(get_compare))
        .route("/cache/flush", post(post_cache_flush))
        .route("/stats/latency", get(get_stats_latency))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct OpeningsQuery {
    pub moves: Option<String>,
}

#[derive(Deserialize)]
pub struct FlushQuery {
    /// Exact cache key, e.g. `corpus:hikaru`.
    pub key: Option<String>,
    /// Every cached view of one player.
    pub player: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub requests_served: u64,
    pub upstream_errors: u64,
    pub last_upstream_ok_secs: Option<u64>,
    pub corpus_cache: CacheStats,
    pub history_cache: CacheStats,
}

#[derive(Serialize)]
pub struct FlushResponse {
    pub flushed: usize,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub stages: Vec<StageLatency>,
}

// ---------------------------------------------------------------------------
// Shared loaders
// ---------------------------------------------------------------------------

/// Lowercased, validated chess.com username.
fn validate_username(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Player ID is required".to_string()));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_chars || name.len() > MAX_USERNAME_LEN {
        return Err(AppError::BadRequest(format!("Invalid player ID: {name}")));
    }
    Ok(name.to_lowercase())
}

fn corpus_key(username: &str) -> String {
    format!("corpus:{username}")
}

fn history_key(username: &str, time_class: &str) -> String {
    format!("history:{username}:{time_class}")
}

async fn load_corpus(state: &ApiState, username: &str) -> Result<Arc<PlayerCorpus>> {
    state
        .corpus
        .get_or_compute_default(&corpus_key(username), || async {
            let started = Instant::now();
            let raw = state
                .client
                .recent_games(username, state.cfg.history_months)
                .await?;
            state.latency.record(STAGE_FETCH, started.elapsed());

            let started = Instant::now();
            let replay = Arc::clone(&state.replay);
            let user = username.to_string();
            let window_days = state.cfg.insights_window_days;
            let corpus = tokio::task::spawn_blocking(move || {
                PlayerCorpus::build(&user, &raw, replay.as_ref(), Utc::now(), window_days)
            })
            .await
            .map_err(|e| AppError::Internal(format!("corpus build task failed: {e}")))?;
            let elapsed = started.elapsed();
            state.latency.record(STAGE_BUILD, elapsed);

            info!(
                username,
                games = corpus.games_total,
                windowed = corpus.index.game_count(),
                dropped = corpus.games_dropped,
                tree_nodes = corpus.index.tree().len(),
                build_ms = elapsed.as_millis() as u64,
                "Built player corpus"
            );
            if corpus.games_dropped > 0 {
                warn!(username, dropped = corpus.games_dropped, "Some games could not be replayed");
            }
            Ok::<_, AppError>(Arc::new(corpus))
        })
        .await
}

async fn load_history(state: &ApiState, username: &str) -> Result<Vec<RatingPoint>> {
    let time_class = state.cfg.history_time_class.as_str();
    state
        .history
        .get_or_compute_default(&history_key(username, time_class), || async {
            let started = Instant::now();
            let points = state
                .client
                .rating_history(username, state.cfg.history_months, time_class)
                .await?;
            state.latency.record(STAGE_FETCH, started.elapsed());
            Ok::<_, AppError>(points)
        })
        .await
}

// ---------------------------------------------------------------------------
// Body assembly
// ---------------------------------------------------------------------------

/// Decorated top-level fields of `base` with `sections` inserted beside them.
fn merge_sections<const N: usize>(
    base: serde_json::Value,
    sections: [(&str, serde_json::Value); N],
) -> serde_json::Value {
    let mut body = match with_formatted_timestamps(base) {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for (key, value) in sections {
        body.insert(key.to_string(), value);
    }
    serde_json::Value::Object(body)
}

/// `{"clubs": [...]}` -> `[...]`.
fn clubs_list(clubs: serde_json::Value) -> serde_json::Value {
    match clubs {
        serde_json::Value::Object(mut map) => map
            .remove("clubs")
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new())),
        other => other,
    }
}

/// Profile fields at the top level plus `stats`, `clubs` and `history`.
fn full_body(
    profile: serde_json::Value,
    stats: serde_json::Value,
    clubs: serde_json::Value,
    history: Vec<RatingPoint>,
) -> Result<serde_json::Value> {
    Ok(merge_sections(
        profile,
        [
            ("stats", with_formatted_timestamps(stats)),
            ("clubs", with_formatted_timestamps(clubs_list(clubs))),
            ("history", serde_json::to_value(reconcile([("rating", history)]))?),
        ],
    ))
}

type PlayerData = (serde_json::Value, serde_json::Value, Vec<RatingPoint>);

/// Each player's profile fields with `stats` beside them, plus the merged
/// `player1`/`player2` history.
fn compare_body(p1: PlayerData, p2: PlayerData) -> Result<serde_json::Value> {
    let (profile1, stats1, history1) = p1;
    let (profile2, stats2, history2) = p2;
    let history = reconcile([("player1", history1), ("player2", history2)]);
    Ok(json!({
        "player1": merge_sections(profile1, [("stats", with_formatted_timestamps(stats1))]),
        "player2": merge_sections(profile2, [("stats", with_formatted_timestamps(stats2))]),
        "history": serde_json::to_value(history)?,
    }))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_index() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /health",
            "GET /player/:id",
            "GET /player/:id/stats",
            "GET /player/:id/full",
            "GET /player/:id/clubs",
            "GET /player/:id/matches",
            "GET /player/:id/insights",
            "GET /player/:id/openings?moves=e4,e5",
            "GET /compare/:p1/:p2",
            "POST /cache/flush?key=|player=",
            "GET /stats/latency",
        ],
    }))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    state.corpus.purge_expired();
    state.history.purge_expired();
    let last_ok = state.health.last_upstream_ok_secs();
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        requests_served: state.health.requests_served(),
        upstream_errors: state.health.upstream_errors(),
        last_upstream_ok_secs: (last_ok > 0).then_some(last_ok),
        corpus_cache: state.corpus.stats(),
        history_cache: state.history.stats(),
    })
}

async fn get_player(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let username = validate_username(&id)?;
    let profile = state.observe(state.client.player(&username).await)?;
    Ok(Json(with_formatted_timestamps(profile)))
}

async fn get_player_stats(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let username = validate_username(&id)?;
    let (stats, history) = state.observe(
        tokio::try_join!(state.client.player_stats(&username), load_history(&state, &username)),
    )?;
    let history = serde_json::to_value(reconcile([("rating", history)]))?;
    Ok(Json(merge_sections(stats, [("history", history)])))
}

async fn get_player_full(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let username = validate_username(&id)?;
    let (profile, stats, clubs, history) = state.observe(tokio::try_join!(
        state.client.player(&username),
        state.client.player_stats(&username),
        state.client.player_clubs(&username),
        load_history(&state, &username),
    ))?;
    Ok(Json(full_body(profile, stats, clubs, history)?))
}

async fn get_player_clubs(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let username = validate_username(&id)?;
    let clubs = state.observe(state.client.player_clubs(&username).await)?;
    Ok(Json(with_formatted_timestamps(clubs)))
}

async fn get_player_matches(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let username = validate_username(&id)?;
    let games = state.observe(state.client.current_daily_games(&username).await)?;
    Ok(Json(with_formatted_timestamps(games)))
}

async fn get_player_insights(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<InsightsResponse>> {
    let username = validate_username(&id)?;
    let corpus = state.observe(load_corpus(&state, &username).await)?;
    Ok(Json(corpus.insights(state.cfg.top_openings)))
}

async fn get_player_openings(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<OpeningsQuery>,
) -> Result<Json<OpeningsResponse>> {
    let username = validate_username(&id)?;
    let prefix = parse_move_list(params.moves.as_deref());
    let corpus = state.observe(load_corpus(&state, &username).await)?;
    Ok(Json(corpus.explore(prefix)))
}

async fn get_compare(
    State(state): State<ApiState>,
    Path((p1, p2)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
    let a = validate_username(&p1)?;
    let b = validate_username(&p2)?;
    let (profile1, stats1, history1, profile2, stats2, history2) = state.observe(tokio::try_join!(
        state.client.player(&a),
        state.client.player_stats(&a),
        load_history(&state, &a),
        state.client.player(&b),
        state.client.player_stats(&b),
        load_history(&state, &b),
    ))?;
    Ok(Json(compare_body((profile1, stats1, history1), (profile2, stats2, history2))?))
}

async fn post_cache_flush(
    State(state): State<ApiState>,
    Query(params): Query<FlushQuery>,
) -> Result<Json<FlushResponse>> {
    let flushed = match (params.key.as_deref(), params.player.as_deref()) {
        (Some(key), _) => state.corpus.flush(Some(key)) + state.history.flush(Some(key)),
        (None, Some(player)) => {
            let username = validate_username(player)?;
            state.corpus.flush(Some(&corpus_key(&username)))
                + state
                    .history
                    .flush(Some(&history_key(&username, &state.cfg.history_time_class)))
        }
        (None, None) => state.corpus.flush(None) + state.history.flush(None),
    };
    info!(key = ?params.key, player = ?params.player, flushed, "Cache flushed");
    Ok(Json(FlushResponse { flushed }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    Json(LatencyResponse {
        stages: state.latency.snapshot(),
    })
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Route not found" })))
}
