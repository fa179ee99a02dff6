// src/normalize/mod.rs
//! Row normalizer: turns the ragged calendar table into per-event records.
//!
//! The calendar only prints date and time on the first row of a group, so
//! the pass carries the last seen date/day/time forward. Rows are folded
//! strictly left to right; the carry makes this inherently sequential.

pub mod filter;
pub mod timezone;

use std::collections::BTreeMap;

use metrics::{counter, describe_counter};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use filter::{AllowLists, RecordFilter};
pub use timezone::{convert_time_zone, ZonePair};

/// Scraper placeholder for a blank cell / "same as the row above".
pub const EMPTY_SENTINEL: &str = "empty";

const MONTH_ABBREVS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?P<day>Mon|Tue|Wed|Thu|Fri|Sat|Sun)\b\s+(?P<month>Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\b\s+(?P<date>\d{1,2})\b",
    )
    .expect("date regex")
});

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("normalize_rows_total", "Raw calendar rows seen by the normalizer.");
        describe_counter!("normalize_headers_total", "Section header rows skipped.");
        describe_counter!("normalize_filtered_total", "Records dropped by the allow-lists.");
        describe_counter!("normalize_kept_total", "Records emitted by the normalizer.");
        describe_counter!(
            "tz_convert_failures_total",
            "Times that could not be converted and were passed through."
        );
    });
}

/// One scraped table row: cell name → cell text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow(BTreeMap<String, String>);

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Cells carrying real text (neither blank nor the sentinel).
    pub fn populated_fields(&self) -> usize {
        self.0
            .values()
            .filter(|v| !v.trim().is_empty() && v.as_str() != EMPTY_SENTINEL)
            .count()
    }

    pub fn is_section_header(&self) -> bool {
        self.populated_fields() == 1
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Output record. Field order doubles as the CSV column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub day: String,
    pub date: String,
    pub time: String,
    pub currency: String,
    pub impact: String,
    pub event: String,
    pub detail: String,
    pub actual: String,
    pub forecast: String,
    pub previous: String,
}

impl NormalizedRecord {
    pub const FIELD_NAMES: [&'static str; 10] = [
        "day", "date", "time", "currency", "impact", "event", "detail", "actual", "forecast",
        "previous",
    ];

    fn fields_mut(&mut self) -> [&mut String; 10] {
        [
            &mut self.day,
            &mut self.date,
            &mut self.time,
            &mut self.currency,
            &mut self.impact,
            &mut self.event,
            &mut self.detail,
            &mut self.actual,
            &mut self.forecast,
            &mut self.previous,
        ]
    }

    fn blank_sentinels(&mut self) {
        for field in self.fields_mut() {
            if *field == EMPTY_SENTINEL {
                field.clear();
            }
        }
    }
}

/// Date/day/time inherited by rows that leave them out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarriedState {
    /// `dd/mm/yyyy`
    pub current_date: String,
    /// Three-letter weekday, e.g. `Sun`.
    pub current_day: String,
    /// Raw time text in the source zone.
    pub current_time: String,
}

/// Parse a calendar date cell such as `Sun Jun 1` into `("Sun", "01/06/<year>")`.
pub fn extract_date_parts(text: &str, year: i32) -> Option<(String, String)> {
    let caps = DATE_RE.captures(text)?;
    let month = MONTH_ABBREVS.iter().position(|m| *m == &caps["month"])? + 1;
    let day: u32 = caps["date"].parse().ok()?;
    Some((
        caps["day"].to_string(),
        format!("{day:02}/{month:02}/{year}"),
    ))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub rows: usize,
    pub headers: usize,
    pub filtered: usize,
    pub kept: usize,
}

pub struct Normalizer {
    filter: RecordFilter,
    zones: ZonePair,
}

impl Normalizer {
    pub fn new(filter: RecordFilter, zones: ZonePair) -> Self {
        Self { filter, zones }
    }

    /// Single left-to-right pass; output order follows input order.
    pub fn normalize(&self, rows: &[RawRow], year: i32) -> (Vec<NormalizedRecord>, NormalizeStats) {
        ensure_metrics_described();

        let mut state = CarriedState::default();
        let mut stats = NormalizeStats {
            rows: rows.len(),
            ..Default::default()
        };
        let mut out = Vec::with_capacity(rows.len());

        for row in rows {
            if let Some(text) = row.get("date").filter(|d| *d != EMPTY_SENTINEL) {
                match extract_date_parts(text, year) {
                    Some((day, date)) => {
                        state.current_day = day;
                        state.current_date = date;
                    }
                    None => {
                        tracing::debug!(target: "normalize", date = %text, "date cell did not match, keeping carried date");
                    }
                }
            }

            if let Some(time) = row.get("time").filter(|t| *t != EMPTY_SENTINEL) {
                state.current_time = time.trim().to_string();
            }

            if row.is_section_header() {
                stats.headers += 1;
                continue;
            }

            let field = |key: &str| row.get(key).unwrap_or_default().to_string();
            let mut record = NormalizedRecord {
                day: state.current_day.clone(),
                date: state.current_date.clone(),
                time: self.zones.convert(&state.current_date, &state.current_time),
                currency: field("currency"),
                impact: field("impact"),
                event: field("event"),
                detail: field("detail"),
                actual: field("actual"),
                forecast: field("forecast"),
                previous: field("previous"),
            };
            record.blank_sentinels();

            if !self.filter.accept(&record) {
                stats.filtered += 1;
                continue;
            }
            out.push(record);
        }

        stats.kept = out.len();
        counter!("normalize_rows_total").increment(stats.rows as u64);
        counter!("normalize_headers_total").increment(stats.headers as u64);
        counter!("normalize_filtered_total").increment(stats.filtered as u64);
        counter!("normalize_kept_total").increment(stats.kept as u64);

        if stats.rows > stats.headers && state.current_date.is_empty() {
            tracing::warn!(target: "normalize", rows = stats.rows, "no date cell matched; records carry an empty date");
        }

        (out, stats)
    }
}
