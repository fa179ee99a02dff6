// src/coordinator.rs
//! Single-flight run coordinator: at most one scrape at a time, process-wide.
//!
//! `idle → running` happens under the status mutex, so two concurrent triggers
//! cannot both win. The winner gets a [`RunTicket`]; consuming it (or dropping
//! it, e.g. when the worker panics) is the only way back to `idle`, which makes
//! the `running → idle` transition happen exactly once per run.

use chrono::{Datelike, NaiveDate};
use metrics::counter;
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::error::TriggerError;

pub const VALID_MONTHS: [&str; 14] = [
    "this", "next", "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december",
];

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Which calendar month a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthSelector {
    This,
    Next,
    /// 1-based month of the current year.
    Named(u32),
}

impl MonthSelector {
    /// Case-insensitive; only the entries of [`VALID_MONTHS`] are accepted.
    pub fn parse(raw: &str) -> Result<Self, TriggerError> {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "this" => Ok(Self::This),
            "next" => Ok(Self::Next),
            other => VALID_MONTHS[2..]
                .iter()
                .position(|m| *m == other)
                .map(|i| Self::Named(i as u32 + 1))
                .ok_or_else(|| TriggerError::InvalidMonth(raw.to_string())),
        }
    }

    /// Value for the calendar's `?month=` parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::This => "this",
            Self::Next => "next",
            Self::Named(m) => VALID_MONTHS[*m as usize + 1],
        }
    }

    /// Month name (`June`) and year the run covers, relative to `today`.
    pub fn resolve(&self, today: NaiveDate) -> (String, i32) {
        let (month, year) = match self {
            Self::This => (today.month(), today.year()),
            Self::Next if today.month() == 12 => (1, today.year() + 1),
            Self::Next => (today.month() + 1, today.year()),
            Self::Named(m) => (*m, today.year()),
        };
        (MONTH_NAMES[month as usize - 1].to_string(), year)
    }
}

/// Process-wide run state, served by `/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub is_running: bool,
    pub current_month: Option<String>,
    pub last_run: Option<String>,
    pub last_error: Option<String>,
    pub success_count: u64,
    pub error_count: u64,
}

#[derive(Debug, Default)]
pub struct RunCoordinator {
    status: Mutex<RunStatus>,
}

impl RunCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn status(&self) -> RunStatus {
        self.status.lock().expect("run status mutex poisoned").clone()
    }

    pub fn is_running(&self) -> bool {
        self.status.lock().expect("run status mutex poisoned").is_running
    }

    /// Atomic check-and-set; rejects while another run is in flight.
    pub fn try_start(self: &Arc<Self>, month: &str) -> Result<RunTicket, TriggerError> {
        let mut s = self.status.lock().expect("run status mutex poisoned");
        if s.is_running {
            return Err(TriggerError::AlreadyRunning {
                current_month: s.current_month.clone(),
            });
        }
        s.is_running = true;
        s.current_month = Some(month.to_string());
        s.last_error = None;
        drop(s);

        Ok(RunTicket {
            coordinator: Arc::clone(self),
            month: month.to_string(),
            finished: false,
        })
    }

    fn finish(&self, outcome: Result<(), String>) {
        let mut s = self.status.lock().expect("run status mutex poisoned");
        s.is_running = false;
        s.current_month = None;
        match outcome {
            Ok(()) => {
                s.last_run = Some(chrono::Local::now().to_rfc3339());
                s.success_count += 1;
                counter!("scrape_runs_total", "outcome" => "success").increment(1);
            }
            Err(e) => {
                s.last_error = Some(e);
                s.error_count += 1;
                counter!("scrape_runs_total", "outcome" => "error").increment(1);
            }
        }
    }
}

/// Proof of holding the running slot. Must be settled with `succeed`/`fail`;
/// a ticket dropped unsettled counts as a failed run.
#[derive(Debug)]
pub struct RunTicket {
    coordinator: Arc<RunCoordinator>,
    month: String,
    finished: bool,
}

impl RunTicket {
    pub fn month(&self) -> &str {
        &self.month
    }

    pub fn succeed(mut self) {
        self.finished = true;
        self.coordinator.finish(Ok(()));
    }

    pub fn fail(mut self, error: impl Into<String>) {
        self.finished = true;
        self.coordinator.finish(Err(error.into()));
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.coordinator
                .finish(Err(format!("run for '{}' ended unexpectedly", self.month)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn selectors_parse_case_insensitively() {
        assert_eq!(MonthSelector::parse("THIS").unwrap(), MonthSelector::This);
        assert_eq!(MonthSelector::parse("June").unwrap(), MonthSelector::Named(6));
        assert_eq!(MonthSelector::parse("december").unwrap().as_param(), "december");
        assert!(matches!(
            MonthSelector::parse("jun"),
            Err(TriggerError::InvalidMonth(m)) if m == "jun"
        ));
        assert!(MonthSelector::parse("").is_err());
    }

    #[test]
    fn resolve_handles_year_rollover() {
        assert_eq!(
            MonthSelector::Next.resolve(day(2025, 12, 15)),
            ("January".to_string(), 2026)
        );
        assert_eq!(
            MonthSelector::Next.resolve(day(2025, 5, 31)),
            ("June".to_string(), 2025)
        );
        assert_eq!(
            MonthSelector::This.resolve(day(2025, 6, 1)),
            ("June".to_string(), 2025)
        );
        assert_eq!(
            MonthSelector::Named(2).resolve(day(2025, 11, 1)),
            ("February".to_string(), 2025)
        );
    }

    #[test]
    fn second_start_conflicts_until_settled() {
        let c = RunCoordinator::new();
        let ticket = c.try_start("june").unwrap();
        assert!(c.is_running());

        match c.try_start("this") {
            Err(TriggerError::AlreadyRunning { current_month }) => {
                assert_eq!(current_month.as_deref(), Some("june"))
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        ticket.succeed();
        let s = c.status();
        assert!(!s.is_running);
        assert!(s.current_month.is_none());
        assert!(s.last_run.is_some());
        assert_eq!((s.success_count, s.error_count), (1, 0));
        assert!(c.try_start("next").is_ok());
    }

    #[test]
    fn exactly_one_counter_moves_per_run() {
        let c = RunCoordinator::new();
        c.try_start("this").unwrap().fail("boom");
        let s = c.status();
        assert_eq!((s.success_count, s.error_count), (0, 1));
        assert_eq!(s.last_error.as_deref(), Some("boom"));

        // a new start clears the previous error
        let t = c.try_start("this").unwrap();
        assert!(c.status().last_error.is_none());
        t.succeed();
        assert_eq!((c.status().success_count, c.status().error_count), (1, 1));
    }

    #[test]
    fn dropped_ticket_returns_to_idle_as_failure() {
        let c = RunCoordinator::new();
        {
            let _t = c.try_start("may").unwrap();
        }
        let s = c.status();
        assert!(!s.is_running);
        assert_eq!(s.error_count, 1);
        assert!(s.last_error.unwrap().contains("may"));
    }

    #[test]
    fn concurrent_triggers_admit_one() {
        let c = RunCoordinator::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || c.try_start("this").ok().map(std::mem::forget).is_some())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert!(c.is_running());
    }
}
