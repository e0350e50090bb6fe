//! Chess.com player analytics: outcome classification, opening explorer,
//! activity heatmaps and rating-history comparison behind a small JSON API.

pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod insights;
pub mod replay;
pub mod state;
pub mod types;
