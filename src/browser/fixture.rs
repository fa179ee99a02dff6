// src/browser/fixture.rs
//! Replays recorded calendar rows instead of driving a real browser.
//! Used by the integration tests and for offline runs (`BROWSER_FIXTURE_PATH`).

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{rows_from_json, BrowserLauncher, CalendarPage};
use crate::normalize::RawRow;

#[derive(Clone)]
pub struct FixtureBrowser {
    rows: Arc<Vec<RawRow>>,
    timezone: String,
    delay: Duration,
    fail_navigation: bool,
    launches: Arc<AtomicUsize>,
    quits: Arc<AtomicUsize>,
    visited: Arc<std::sync::Mutex<Vec<String>>>,
}

impl FixtureBrowser {
    pub fn from_rows(rows: Vec<RawRow>) -> Self {
        Self {
            rows: Arc::new(rows),
            timezone: "Europe/Berlin".to_string(),
            delay: Duration::ZERO,
            fail_navigation: false,
            launches: Arc::new(AtomicUsize::new(0)),
            quits: Arc::new(AtomicUsize::new(0)),
            visited: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// JSON array of row objects, as returned by the page script.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let v: serde_json::Value = serde_json::from_str(s).context("parsing fixture json")?;
        Ok(Self::from_rows(rows_from_json(v)?))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&s)
    }

    /// Hold the run inside `scroll_to_end` for this long.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn quit_count(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().expect("fixture mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for FixtureBrowser {
    async fn launch(&self) -> Result<Box<dyn CalendarPage>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixturePage {
            browser: self.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

struct FixturePage {
    browser: FixtureBrowser,
}

#[async_trait::async_trait]
impl CalendarPage for FixturePage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.browser
            .visited
            .lock()
            .expect("fixture mutex poisoned")
            .push(url.to_string());
        if self.browser.fail_navigation {
            bail!("net::ERR_NAME_NOT_RESOLVED at {url}");
        }
        Ok(())
    }

    async fn detect_timezone(&mut self) -> Result<String> {
        Ok(self.browser.timezone.clone())
    }

    async fn scroll_to_end(&mut self) -> Result<()> {
        if !self.browser.delay.is_zero() {
            tokio::time::sleep(self.browser.delay).await;
        }
        Ok(())
    }

    async fn extract_rows(&mut self) -> Result<Vec<RawRow>> {
        Ok(self.browser.rows.as_ref().clone())
    }

    async fn quit(&mut self) -> Result<()> {
        self.browser.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
