//! Run a single scrape without the HTTP server and print the final run status.
//!
//! Usage: `scrape_once [this|next|<month name>]` (defaults to `this`).

use anyhow::Context;
use forex_calendar_scraper::{scrape, AppState, MonthSelector, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let raw = std::env::args().nth(1).unwrap_or_else(|| "this".to_string());
    let selector = MonthSelector::parse(&raw)?;

    let state = AppState::from_settings(Settings::from_env()?)?;
    let ticket = state.coordinator.try_start(selector.as_param())?;
    let outcome = scrape::run_to_completion(&state, ticket, selector).await;

    let status = state.coordinator.status();
    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("serializing run status")?
    );

    if outcome.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
