use crate::analytics::openings::DEFAULT_TOP_OPENINGS;
use crate::error::{AppError, Result};

pub const CHESS_API_URL: &str = "https://api.chess.com/pub";

/// Upstream HTTP timeout (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Freshness window for cached analytics (seconds).
pub const CACHE_TTL_SECS: u64 = 300;

/// Monthly archives pulled for rating history and calendar activity.
pub const HISTORY_MONTHS: usize = 12;

/// Time class whose ratings make up the history charts.
pub const HISTORY_TIME_CLASS: &str = "rapid";

/// Trailing window for the weekday/hour grid, summaries and openings (days).
pub const INSIGHTS_WINDOW_DAYS: i64 = 30;

/// Openings listed on the insights page.
pub const TOP_OPENINGS: usize = DEFAULT_TOP_OPENINGS;

/// chess.com rejects requests without a User-Agent.
pub const USER_AGENT: &str = concat!("chess-insights/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct Config {
    pub chess_api_url: String,
    pub log_level: String,
    pub api_port: u16,
    pub http_timeout_secs: u64,
    /// Default TTL for every analytics cache (CACHE_TTL_SECS)
    pub cache_ttl_secs: u64,
    /// Number of most recent monthly archives to read (HISTORY_MONTHS)
    pub history_months: usize,
    /// Time class used for rating history, e.g. rapid/blitz/bullet (HISTORY_TIME_CLASS)
    pub history_time_class: String,
    /// Trailing days for grid/summary/openings (INSIGHTS_WINDOW_DAYS)
    pub insights_window_days: i64,
    /// Openings returned by /insights (TOP_OPENINGS)
    pub top_openings: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            chess_api_url: std::env::var("CHESS_API_URL")
                .unwrap_or_else(|_| CHESS_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("PORT must be a valid port number".to_string()))?,
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(HTTP_TIMEOUT_SECS),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(CACHE_TTL_SECS),
            history_months: std::env::var("HISTORY_MONTHS")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(HISTORY_MONTHS),
            history_time_class: std::env::var("HISTORY_TIME_CLASS")
                .map(|s| s.trim().to_lowercase())
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| HISTORY_TIME_CLASS.to_string()),
            insights_window_days: std::env::var("INSIGHTS_WINDOW_DAYS")
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(INSIGHTS_WINDOW_DAYS),
            top_openings: std::env::var("TOP_OPENINGS")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(TOP_OPENINGS),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chess_api_url: CHESS_API_URL.to_string(),
            log_level: "info".to_string(),
            api_port: 3000,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
            cache_ttl_secs: CACHE_TTL_SECS,
            history_months: HISTORY_MONTHS,
            history_time_class: HISTORY_TIME_CLASS.to_string(),
            insights_window_days: INSIGHTS_WINDOW_DAYS,
            top_openings: TOP_OPENINGS,
        }
    }
}
