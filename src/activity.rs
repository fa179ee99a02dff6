//! activity.rs: bounded in-memory activity log behind `/logs`.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const ACTIVITY_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
}

/// Ring of the most recent entries; the oldest are evicted first.
#[derive(Debug)]
pub struct ActivityLog {
    inner: Mutex<VecDeque<ActivityEntry>>,
    cap: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(ACTIVITY_CAP)
    }
}

impl ActivityLog {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    /// Append an entry and mirror it to tracing.
    pub fn record(&self, level: Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::Info => tracing::info!(target: "activity", "{message}"),
            Level::Warning => tracing::warn!(target: "activity", "{message}"),
            Level::Error => tracing::error!(target: "activity", "{message}"),
        }

        let entry = ActivityEntry {
            timestamp: chrono::Local::now().to_rfc3339(),
            level,
            message,
        };
        let mut q = self.inner.lock().expect("activity mutex poisoned");
        if q.len() >= self.cap {
            q.pop_front();
        }
        q.push_back(entry);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(Level::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(Level::Error, message);
    }

    /// Last `n` entries (oldest first) and the number currently held.
    pub fn snapshot_last_n(&self, n: usize) -> (Vec<ActivityEntry>, usize) {
        let q = self.inner.lock().expect("activity mutex poisoned");
        let start = q.len().saturating_sub(n);
        (q.iter().skip(start).cloned().collect(), q.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entries_are_evicted_at_cap() {
        let log = ActivityLog::default();
        for i in 0..60 {
            log.info(format!("entry {i}"));
        }
        let (last, total) = log.snapshot_last_n(20);
        assert_eq!(total, ACTIVITY_CAP);
        assert_eq!(last.len(), 20);
        assert_eq!(last.first().unwrap().message, "entry 40");
        assert_eq!(last.last().unwrap().message, "entry 59");

        let (all, _) = log.snapshot_last_n(usize::MAX);
        assert_eq!(all[0].message, "entry 10");
    }

    #[test]
    fn level_serializes_uppercase() {
        let log = ActivityLog::with_capacity(2);
        log.warn("careful");
        let (v, _) = log.snapshot_last_n(1);
        let json = serde_json::to_value(&v[0]).unwrap();
        assert_eq!(json["level"], "WARNING");
        assert_eq!(json["message"], "careful");
    }
}
