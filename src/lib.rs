// src/lib.rs
// Public library surface for the service binary, the one-shot CLI and integration tests.

pub mod activity;
pub mod api;
pub mod browser;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod normalize;
pub mod scrape;
pub mod storage;
pub mod telemetry;

pub use crate::api::{router, AppState};
pub use crate::config::Settings;
pub use crate::coordinator::{MonthSelector, RunCoordinator, RunStatus};

use axum::Router;

/// Build the full HTTP app from the process environment.
pub async fn app() -> anyhow::Result<Router> {
    let settings = Settings::from_env()?;
    tracing::info!(
        storage = %settings.storage_method,
        source_tz = %settings.scraper_timezone,
        target_tz = ?settings.target_timezone,
        output_dir = %settings.output_dir.display(),
        "settings loaded"
    );

    let state = AppState::from_settings(settings)?;
    let mut app = router(state);
    if let Some(handle) = telemetry::install() {
        app = app.merge(telemetry::router(handle));
    }
    Ok(app)
}
