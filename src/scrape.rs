// src/scrape.rs
//! Scrape run worker: browser → rows → normalizer → storage, reporting into
//! the activity log and settling the coordinator ticket exactly once.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::activity::ActivityLog;
use crate::api::AppState;
use crate::browser::CalendarPage;
use crate::coordinator::{MonthSelector, RunTicket};
use crate::normalize::{NormalizeStats, Normalizer, RawRow, RecordFilter};
use crate::storage::SaveResults;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scrape_runs_total", "Completed scrape runs by outcome.");
        describe_histogram!("scrape_duration_ms", "Wall time of a scrape run in milliseconds.");
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub month: String,
    pub year: i32,
    pub stats: NormalizeStats,
    pub save: SaveResults,
}

/// Hand the run to the runtime and return at once; completion is only
/// observable through the coordinator status and the activity log.
pub fn spawn_run(state: AppState, ticket: RunTicket, selector: MonthSelector) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _ = run_to_completion(&state, ticket, selector).await;
    })
}

/// Run one scrape and settle `ticket` with its outcome.
pub async fn run_to_completion(
    state: &AppState,
    ticket: RunTicket,
    selector: MonthSelector,
) -> Result<RunReport> {
    ensure_metrics_described();
    let t0 = Instant::now();
    state
        .activity
        .info(format!("Starting scrape for month: {}", selector.as_param()));

    let outcome = scrape_month(state, selector).await;
    histogram!("scrape_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    match outcome {
        Ok(report) => {
            state.activity.info(format!(
                "Successfully completed scraping for {} {} - {} events kept, csv saved: {}, convex saved: {}",
                report.month,
                report.year,
                report.stats.kept,
                report.save.csv.success,
                report.save.convex.saved_count,
            ));
            ticket.succeed();
            Ok(report)
        }
        Err(e) => {
            state.activity.error(format!("Scraping failed: {e:#}"));
            state.activity.error(format!("Full error trace: {e:?}"));
            ticket.fail(format!("{e:#}"));
            Err(e)
        }
    }
}

async fn scrape_month(state: &AppState, selector: MonthSelector) -> Result<RunReport> {
    let url = format!(
        "{}/calendar?month={}",
        state.settings.calendar_base_url.trim_end_matches('/'),
        selector.as_param()
    );
    state.activity.info(format!("Navigating to {url}"));
    state
        .activity
        .info(format!("Initializing browser ({})...", state.browser.name()));

    let mut page = state.browser.launch().await.context("launching browser")?;
    let scraped = read_calendar(state, page.as_mut(), &url, selector).await;
    release(&state.activity, page.as_mut(), scraped.is_err()).await;
    let (month, year, rows) = scraped?;

    let normalizer = Normalizer::new(
        RecordFilter::new(state.settings.allowlists.clone()),
        state.settings.zones(),
    );
    let (records, stats) = normalizer.normalize(&rows, year);
    state.activity.info(format!(
        "Parsed {} events from calendar ({} rows, {} section headers, {} filtered out)",
        stats.kept, stats.rows, stats.headers, stats.filtered
    ));
    if stats.kept > 0 && records.iter().all(|r| r.date.is_empty()) {
        state
            .activity
            .warn("No date cell matched the calendar pattern; events carry an empty date");
    }

    let method = state.settings.storage_method;
    state
        .activity
        .info(format!("Saving data using method: {method}"));
    let save = state.storage.save(&records, &month, year, method, true).await;
    log_save_results(&state.activity, &save);

    Ok(RunReport {
        month,
        year,
        stats,
        save,
    })
}

async fn read_calendar(
    state: &AppState,
    page: &mut dyn CalendarPage,
    url: &str,
    selector: MonthSelector,
) -> Result<(String, i32, Vec<RawRow>)> {
    page.goto(url).await?;

    match page.detect_timezone().await {
        Ok(tz) => {
            state
                .activity
                .info(format!("Browser timezone detected: {tz}"));
            let source = state.settings.scraper_timezone.name();
            if tz != source {
                tracing::warn!(target: "scrape", browser = %tz, %source, "browser zone differs; reading times as source zone");
            }
        }
        Err(e) => state
            .activity
            .warn(format!("Could not detect browser timezone: {e:#}")),
    }

    state.activity.info("Scrolling page to load all events...");
    page.scroll_to_end().await.context("scrolling calendar")?;

    let (month, year) = selector.resolve(chrono::Local::now().date_naive());
    state
        .activity
        .info(format!("Parsing data for {month} {year}"));
    let rows = page.extract_rows().await?;
    Ok((month, year, rows))
}

/// Quit the browser; a failure here is logged and never replaces the run's own error.
async fn release(activity: &ActivityLog, page: &mut dyn CalendarPage, after_error: bool) {
    match page.quit().await {
        Ok(()) if after_error => activity.info("Browser cleaned up after error"),
        Ok(()) => activity.info("Browser closed successfully"),
        Err(e) => activity.warn(format!("Failed to close browser: {e:#}")),
    }
}

fn log_save_results(activity: &ActivityLog, save: &SaveResults) {
    if save.csv.attempted {
        if save.csv.success {
            activity.info(format!("CSV saved successfully ({} rows)", save.csv.saved_count));
        } else {
            activity.error(format!(
                "CSV save failed: {}",
                save.csv.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    if save.convex.attempted {
        if save.convex.success {
            activity.info(format!(
                "Convex saved {} records successfully",
                save.convex.saved_count
            ));
        } else {
            activity.error(format!(
                "Convex save failed: {}",
                save.convex.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
}
