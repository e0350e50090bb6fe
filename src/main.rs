use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chess_insights::api::{router, ApiState};
use chess_insights::config::Config;
use chess_insights::error::Result;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        upstream = %cfg.chess_api_url,
        cache_ttl_secs = cfg.cache_ttl_secs,
        history_months = cfg.history_months,
        time_class = %cfg.history_time_class,
        window_days = cfg.insights_window_days,
        "Starting chess insights server"
    );

    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let state = ApiState::new(cfg)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
