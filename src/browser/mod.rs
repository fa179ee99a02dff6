// src/browser/mod.rs
//! Browser collaborator: renders the calendar page and hands back raw rows.

pub mod fixture;
pub mod webdriver;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Settings;
use crate::normalize::RawRow;

/// Starts one browser session per scrape run.
#[async_trait::async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn CalendarPage>>;
    fn name(&self) -> &'static str;
}

/// A live browser session. `quit` must be called on every exit path.
#[async_trait::async_trait]
pub trait CalendarPage: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    /// IANA zone the browser reports (`Intl.DateTimeFormat().resolvedOptions().timeZone`).
    async fn detect_timezone(&mut self) -> Result<String>;
    /// Scroll until lazily loaded rows stop appearing.
    async fn scroll_to_end(&mut self) -> Result<()>;
    async fn extract_rows(&mut self) -> Result<Vec<RawRow>>;
    async fn quit(&mut self) -> Result<()>;
}

/// Fixture replay when `BROWSER_FIXTURE_PATH` is set, WebDriver otherwise.
pub fn launcher_from_settings(settings: &Settings) -> Result<Arc<dyn BrowserLauncher>> {
    match &settings.browser_fixture {
        Some(path) => {
            let fx = fixture::FixtureBrowser::from_path(path)
                .with_context(|| format!("loading browser fixture {}", path.display()))?;
            Ok(Arc::new(fx))
        }
        None => Ok(Arc::new(webdriver::WebDriverLauncher::new(
            settings.webdriver_url.clone(),
        ))),
    }
}

/// Turn the JSON array returned by the page script into rows.
/// Non-string cells are dropped; non-object entries are skipped.
pub fn rows_from_json(value: serde_json::Value) -> Result<Vec<RawRow>> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        other => anyhow::bail!("expected an array of rows, got {}", json_kind(&other)),
    };
    let rows = items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .filter_map(|(k, v)| match v {
                        serde_json::Value::String(s) => Some((k, s)),
                        _ => None,
                    })
                    .collect::<RawRow>(),
            ),
            _ => None,
        })
        .collect();
    Ok(rows)
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
