// src/storage/mod.rs
//! Storage dispatcher: fans normalized records out to the CSV file and/or the
//! remote document store. Each backend is attempted on its own and reports
//! its own outcome; one failing never stops the other.

pub mod csv_file;
#[cfg(feature = "convex")]
pub mod convex;
pub mod memory;

use anyhow::{anyhow, bail, Context, Result};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::normalize::NormalizedRecord;
pub use csv_file::CsvStore;

pub const REMOTE_UNAVAILABLE: &str =
    "Convex client not available. Check CONVEX_URL environment variable.";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("storage_csv_writes_total", "CSV file writes by outcome.");
        describe_counter!("storage_remote_saved_total", "Events persisted to the remote store.");
        describe_counter!(
            "storage_remote_errors_total",
            "Remote store call failures (per record, delete, session)."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMethod {
    Csv,
    Convex,
    Both,
}

impl StorageMethod {
    pub fn wants_csv(self) -> bool {
        matches!(self, StorageMethod::Csv | StorageMethod::Both)
    }

    pub fn wants_remote(self) -> bool {
        matches!(self, StorageMethod::Convex | StorageMethod::Both)
    }
}

impl FromStr for StorageMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "convex" => Ok(Self::Convex),
            "both" => Ok(Self::Both),
            other => Err(anyhow!("expected csv|convex|both, got '{other}'")),
        }
    }
}

impl std::fmt::Display for StorageMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StorageMethod::Csv => "csv",
            StorageMethod::Convex => "convex",
            StorageMethod::Both => "both",
        })
    }
}

/// Outcome of one backend for one save call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendResult {
    pub attempted: bool,
    pub success: bool,
    pub error: Option<String>,
    pub saved_count: usize,
}

impl BackendResult {
    fn from_outcome(outcome: Result<usize>) -> Self {
        match outcome {
            Ok(saved_count) => Self {
                attempted: true,
                success: true,
                error: None,
                saved_count,
            },
            Err(e) => Self {
                attempted: true,
                success: false,
                error: Some(format!("{e:#}")),
                saved_count: 0,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveResults {
    pub csv: BackendResult,
    pub convex: BackendResult,
}

/// Event document as uploaded to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub scraped_at: String,
    pub source: String,
    pub month: String,
    pub year: i32,
    pub date: String,
    pub time: String,
    pub day: String,
    pub currency: String,
    pub impact: String,
    pub event: String,
    pub actual: String,
    pub forecast: String,
    pub previous: String,
    pub detail_url: String,
    pub event_key: String,
    pub is_high_impact: bool,
    pub has_data: bool,
}

impl RemoteEvent {
    /// `None` for records without an event name or date; those are not uploaded.
    pub fn from_record(r: &NormalizedRecord, month: &str, year: i32, scraped_at: &str) -> Option<Self> {
        if r.event.is_empty() || r.date.is_empty() {
            return None;
        }
        Some(Self {
            scraped_at: scraped_at.to_string(),
            source: "forex_factory".to_string(),
            month: month.to_string(),
            year,
            date: r.date.clone(),
            time: r.time.clone(),
            day: r.day.clone(),
            currency: r.currency.clone(),
            impact: r.impact.clone(),
            event: r.event.clone(),
            actual: r.actual.clone(),
            forecast: r.forecast.clone(),
            previous: r.previous.clone(),
            detail_url: r.detail.clone(),
            event_key: format!("{}-{}-{}", r.date, r.time, r.event),
            is_high_impact: r.impact.eq_ignore_ascii_case("red"),
            has_data: !(r.actual.is_empty() && r.forecast.is_empty() && r.previous.is_empty()),
        })
    }
}

/// Run metadata written after the events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeSession {
    pub month: String,
    pub year: i32,
    pub total_events: usize,
    pub saved_events: usize,
    pub scraped_at: String,
    pub source: String,
}

/// Remote document store. Implemented over HTTP for Convex and in memory for tests.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &'static str;
    fn endpoint(&self) -> &str;
    async fn delete_month(&self, month: &str, year: i32) -> Result<()>;
    async fn save_event(&self, event: &RemoteEvent) -> Result<()>;
    async fn save_session(&self, session: &ScrapeSession) -> Result<()>;
    async fn ping(&self) -> Result<serde_json::Value>;
}

pub struct Storage {
    csv: CsvStore,
    remote: Option<Arc<dyn RemoteStore>>,
}

impl Storage {
    pub fn new(csv: CsvStore, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self { csv, remote }
    }

    pub fn csv(&self) -> &CsvStore {
        &self.csv
    }

    pub fn remote(&self) -> Option<&Arc<dyn RemoteStore>> {
        self.remote.as_ref()
    }

    pub async fn save(
        &self,
        records: &[NormalizedRecord],
        month: &str,
        year: i32,
        method: StorageMethod,
        replace_existing: bool,
    ) -> SaveResults {
        ensure_metrics_described();
        let mut results = SaveResults::default();

        if method.wants_csv() {
            let outcome = self.csv.write(records, month, year).map(|_| records.len());
            let label = if outcome.is_ok() { "success" } else { "error" };
            counter!("storage_csv_writes_total", "outcome" => label).increment(1);
            results.csv = BackendResult::from_outcome(outcome);
        }

        if method.wants_remote() {
            let outcome = match &self.remote {
                Some(store) => push_remote(store.as_ref(), records, month, year, replace_existing).await,
                None => Err(anyhow!(REMOTE_UNAVAILABLE)),
            };
            results.convex = BackendResult::from_outcome(outcome);
        }

        results
    }
}

/// Upload records one by one; returns how many were persisted.
async fn push_remote(
    store: &dyn RemoteStore,
    records: &[NormalizedRecord],
    month: &str,
    year: i32,
    replace_existing: bool,
) -> Result<usize> {
    let scraped_at = chrono::Utc::now().to_rfc3339();
    let events: Vec<RemoteEvent> = records
        .iter()
        .filter_map(|r| RemoteEvent::from_record(r, month, year, &scraped_at))
        .collect();
    if events.is_empty() {
        bail!("No valid data to save after transformation");
    }

    if replace_existing {
        if let Err(e) = store.delete_month(month, year).await {
            counter!("storage_remote_errors_total").increment(1);
            return Err(e).with_context(|| format!("deleting existing {month} {year} events"));
        }
    }

    let mut saved = 0usize;
    for ev in &events {
        match store.save_event(ev).await {
            Ok(()) => saved += 1,
            Err(e) => {
                tracing::error!(target: "storage", store = store.name(), event_key = %ev.event_key, error = %e, "failed to save event");
                counter!("storage_remote_errors_total").increment(1);
            }
        }
    }
    counter!("storage_remote_saved_total").increment(saved as u64);

    let session = ScrapeSession {
        month: month.to_string(),
        year,
        total_events: events.len(),
        saved_events: saved,
        scraped_at,
        source: "forex_factory_scraper".to_string(),
    };
    if let Err(e) = store.save_session(&session).await {
        tracing::error!(target: "storage", store = store.name(), error = %e, "failed to save scrape session");
        counter!("storage_remote_errors_total").increment(1);
    }

    if saved == 0 {
        bail!("all {} event writes failed", events.len());
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;

    fn rec(event: &str, date: &str, impact: &str) -> NormalizedRecord {
        NormalizedRecord {
            day: "Sun".into(),
            date: date.into(),
            time: "21:00".into(),
            currency: "USD".into(),
            impact: impact.into(),
            event: event.into(),
            forecast: "0.3%".into(),
            ..Default::default()
        }
    }

    #[test]
    fn storage_method_parses_case_insensitively() {
        assert_eq!("CSV".parse::<StorageMethod>().unwrap(), StorageMethod::Csv);
        assert_eq!(" both ".parse::<StorageMethod>().unwrap(), StorageMethod::Both);
        assert!("s3".parse::<StorageMethod>().is_err());
        assert!(!StorageMethod::Convex.wants_csv());
        assert!(StorageMethod::Both.wants_remote());
    }

    #[test]
    fn remote_event_derives_key_and_flags() {
        let ev = RemoteEvent::from_record(&rec("CPI", "01/06/2025", "Red"), "June", 2025, "t").unwrap();
        assert_eq!(ev.event_key, "01/06/2025-21:00-CPI");
        assert!(ev.is_high_impact);
        assert!(ev.has_data);
        assert_eq!(ev.source, "forex_factory");

        assert!(RemoteEvent::from_record(&rec("", "01/06/2025", "red"), "June", 2025, "t").is_none());
        assert!(RemoteEvent::from_record(&rec("CPI", "", "red"), "June", 2025, "t").is_none());
    }

    #[tokio::test]
    async fn csv_ok_and_missing_remote_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(CsvStore::new(dir.path()), None);

        let res = storage
            .save(&[rec("CPI", "01/06/2025", "red")], "June", 2025, StorageMethod::Both, true)
            .await;

        assert!(res.csv.attempted && res.csv.success);
        assert_eq!(res.csv.saved_count, 1);
        assert!(res.convex.attempted);
        assert!(!res.convex.success);
        assert_eq!(res.convex.error.as_deref(), Some(REMOTE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn per_record_failures_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().failing_event("Bad"));
        let storage = Storage::new(CsvStore::new(dir.path()), Some(store.clone()));

        let records = vec![
            rec("A", "01/06/2025", "red"),
            rec("Bad", "01/06/2025", "red"),
            rec("C", "02/06/2025", "orange"),
        ];
        let res = storage
            .save(&records, "June", 2025, StorageMethod::Convex, true)
            .await;

        assert!(!res.csv.attempted);
        assert!(res.convex.success);
        assert_eq!(res.convex.saved_count, 2);
        assert_eq!(store.events().len(), 2);
        assert_eq!(store.deleted(), vec![("June".to_string(), 2025)]);
        let sessions = store.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].total_events, 3);
        assert_eq!(sessions[0].saved_events, 2);
    }

    #[tokio::test]
    async fn failed_delete_fails_remote_but_not_csv() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().failing_delete());
        let storage = Storage::new(CsvStore::new(dir.path()), Some(store.clone()));

        let res = storage
            .save(&[rec("A", "01/06/2025", "red")], "June", 2025, StorageMethod::Both, true)
            .await;

        assert!(res.csv.success);
        assert!(!res.convex.success);
        assert!(res.convex.error.unwrap().contains("deleting existing June 2025 events"));
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn session_failure_does_not_affect_result() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().failing_session());
        let storage = Storage::new(CsvStore::new(dir.path()), Some(store.clone()));

        let res = storage
            .save(&[rec("A", "01/06/2025", "red")], "June", 2025, StorageMethod::Convex, false)
            .await;

        assert!(res.convex.success);
        assert_eq!(res.convex.saved_count, 1);
        assert!(store.deleted().is_empty(), "no delete without replace_existing");
    }

    #[tokio::test]
    async fn csv_failure_does_not_block_remote() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the output directory should be
        let blocker = dir.path().join("news");
        std::fs::write(&blocker, "x").unwrap();
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::new(CsvStore::new(&blocker), Some(store.clone()));

        let res = storage
            .save(&[rec("A", "01/06/2025", "red")], "June", 2025, StorageMethod::Both, false)
            .await;

        assert!(res.csv.attempted && !res.csv.success);
        assert!(res.csv.error.is_some());
        assert!(res.convex.success);
        assert_eq!(store.events().len(), 1);
    }

    #[tokio::test]
    async fn nothing_uploadable_is_a_remote_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::new(CsvStore::new(dir.path()), Some(store.clone()));

        let res = storage
            .save(&[rec("", "01/06/2025", "red")], "June", 2025, StorageMethod::Convex, true)
            .await;

        assert!(!res.convex.success);
        assert!(store.deleted().is_empty(), "nothing deleted when nothing would be uploaded");
    }
}
