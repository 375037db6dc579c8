use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use growthhub_server::state::AppState;

/// `growthhub health` — liveness probe for container health checks.
///
/// Calls `GET http://localhost:$GROWTHHUB_PORT/health` and exits 0 on HTTP
/// 200, 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("GROWTHHUB_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logs; level via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("growthhub=info".parse()?),
        )
        .json()
        .init();

    let cfg = growthhub_server::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/growthhub.db", cfg.data_dir);
    let db = growthhub_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    if cfg.gemini.api_key.is_none() {
        tracing::warn!(
            "GROWTHHUB_GEMINI_API_KEY is not set. Generation requests will be answered \
             from canned responses where available."
        );
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let state = Arc::new(AppState::new(db, cfg.clone()));
    let app = growthhub_server::app::build_app(state);

    info!(port = cfg.port, timezone = %cfg.timezone, "GrowthHub listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
