//! Forex calendar scraper service entrypoint.
//! Boots the Axum HTTP server with shared run state and storage backends.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("forex_calendar_scraper=info,warn"));

    // the runtime may already own a global subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let router = forex_calendar_scraper::app().await?;
    tracing::info!(
        "endpoints: GET /health, GET /status, GET /logs, GET|POST /scrape, GET|POST /scrape/{{month}}, GET /convex/test, GET /metrics"
    );

    Ok(router.into())
}
