use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::activity::{ActivityEntry, ActivityLog};
use crate::browser::{self, BrowserLauncher};
use crate::config::Settings;
use crate::coordinator::{MonthSelector, RunCoordinator, RunStatus};
use crate::error::TriggerError;
use crate::scrape;
use crate::storage::{CsvStore, RemoteStore, Storage};

const LOGS_WINDOW: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub coordinator: Arc<RunCoordinator>,
    pub activity: Arc<ActivityLog>,
    pub browser: Arc<dyn BrowserLauncher>,
    pub storage: Arc<Storage>,
}

impl AppState {
    pub fn new(settings: Settings, browser: Arc<dyn BrowserLauncher>, storage: Storage) -> Self {
        Self {
            settings: Arc::new(settings),
            coordinator: RunCoordinator::new(),
            activity: Arc::new(ActivityLog::default()),
            browser,
            storage: Arc::new(storage),
        }
    }

    /// Wire the production collaborators described by `settings`.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let browser = browser::launcher_from_settings(&settings)?;
        let csv = CsvStore::new(&settings.output_dir);
        let storage = Storage::new(csv, remote_from_settings(&settings));
        Ok(Self::new(settings, browser, storage))
    }
}

#[cfg(feature = "convex")]
fn remote_from_settings(settings: &Settings) -> Option<Arc<dyn RemoteStore>> {
    let url = settings.convex_url.clone()?;
    tracing::info!(%url, "convex backend configured");
    Some(Arc::new(crate::storage::convex::ConvexClient::new(url)))
}

#[cfg(not(feature = "convex"))]
fn remote_from_settings(_settings: &Settings) -> Option<Arc<dyn RemoteStore>> {
    None
}

pub fn router(state: AppState) -> Router {
    let r = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/logs", get(logs))
        .route("/scrape", get(scrape_current).post(scrape_current))
        .route("/scrape/{month}", get(scrape_month).post(scrape_month));

    #[cfg(feature = "convex")]
    let r = r.route("/convex/test", get(convex_test));

    r.layer(CorsLayer::very_permissive()).with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Local::now().to_rfc3339(),
        "service": "forex-scraper",
    }))
}

async fn status(State(state): State<AppState>) -> Json<RunStatus> {
    Json(state.coordinator.status())
}

#[derive(Serialize)]
struct LogsResp {
    logs: Vec<ActivityEntry>,
    total_logs: usize,
}

async fn logs(State(state): State<AppState>) -> Json<LogsResp> {
    let (logs, total_logs) = state.activity.snapshot_last_n(LOGS_WINDOW);
    Json(LogsResp { logs, total_logs })
}

fn started(message: String) -> Json<Value> {
    Json(json!({
        "message": message,
        "status": "started",
        "check_status_at": "/status",
    }))
}

async fn scrape_current(State(state): State<AppState>) -> Result<Json<Value>, TriggerError> {
    let selector = MonthSelector::This;
    let ticket = state.coordinator.try_start(selector.as_param())?;
    scrape::spawn_run(state.clone(), ticket, selector);
    Ok(started("Scraping started for current month".to_string()))
}

async fn scrape_month(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<Value>, TriggerError> {
    // a busy service answers 409 even for a malformed month
    let current = state.coordinator.status();
    if current.is_running {
        return Err(TriggerError::AlreadyRunning {
            current_month: current.current_month,
        });
    }

    let selector = MonthSelector::parse(&month)?;
    let ticket = state.coordinator.try_start(selector.as_param())?;
    scrape::spawn_run(state.clone(), ticket, selector);
    Ok(started(format!("Scraping started for {month}")))
}

#[cfg(feature = "convex")]
async fn convex_test(State(state): State<AppState>) -> Json<Value> {
    let Some(store) = state.storage.remote() else {
        return Json(json!({
            "connected": false,
            "error": "Convex client not configured",
            "url": "Not set",
        }));
    };
    match store.ping().await {
        Ok(test_result) => Json(json!({
            "connected": true,
            "url": store.endpoint(),
            "test_result": test_result,
        })),
        Err(e) => Json(json!({
            "connected": false,
            "url": store.endpoint(),
            "error": format!("{e:#}"),
        })),
    }
}
