// src/storage/memory.rs
//! In-process remote store for tests and offline runs.

use anyhow::{bail, Result};
use std::sync::Mutex;

use super::{RemoteEvent, RemoteStore, ScrapeSession};

#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<Vec<RemoteEvent>>,
    sessions: Mutex<Vec<ScrapeSession>>,
    deleted: Mutex<Vec<(String, i32)>>,
    failing_events: Vec<String>,
    fail_delete: bool,
    fail_session: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every event with this name.
    pub fn failing_event(mut self, event: &str) -> Self {
        self.failing_events.push(event.to_string());
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn failing_session(mut self) -> Self {
        self.fail_session = true;
        self
    }

    pub fn events(&self) -> Vec<RemoteEvent> {
        self.events.lock().expect("memory store mutex poisoned").clone()
    }

    pub fn sessions(&self) -> Vec<ScrapeSession> {
        self.sessions.lock().expect("memory store mutex poisoned").clone()
    }

    pub fn deleted(&self) -> Vec<(String, i32)> {
        self.deleted.lock().expect("memory store mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn endpoint(&self) -> &str {
        "memory://"
    }

    async fn delete_month(&self, month: &str, year: i32) -> Result<()> {
        if self.fail_delete {
            bail!("delete rejected");
        }
        self.events
            .lock()
            .expect("memory store mutex poisoned")
            .retain(|e| !(e.month == month && e.year == year));
        self.deleted
            .lock()
            .expect("memory store mutex poisoned")
            .push((month.to_string(), year));
        Ok(())
    }

    async fn save_event(&self, event: &RemoteEvent) -> Result<()> {
        if self.failing_events.iter().any(|e| *e == event.event) {
            bail!("write rejected for '{}'", event.event);
        }
        self.events
            .lock()
            .expect("memory store mutex poisoned")
            .push(event.clone());
        Ok(())
    }

    async fn save_session(&self, session: &ScrapeSession) -> Result<()> {
        if self.fail_session {
            bail!("session write rejected");
        }
        self.sessions
            .lock()
            .expect("memory store mutex poisoned")
            .push(session.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!("pong"))
    }
}
