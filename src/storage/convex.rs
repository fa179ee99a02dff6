// src/storage/convex.rs
//! Convex HTTP API client (`POST <deployment>/api/{mutation,query}`).

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{RemoteEvent, RemoteStore, ScrapeSession};

const SAVE_EVENT: &str = "economicEvents:saveEconomicEvent";
const SAVE_SESSION: &str = "economicEvents:saveScrapeSession";
const DELETE_MONTH: &str = "economicEvents:deleteEventsByMonth";
const PING: &str = "economicEvents:ping";

#[derive(Clone)]
pub struct ConvexClient {
    url: String,
    client: Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct FunctionCall<'a, A: Serialize> {
    path: &'a str,
    args: A,
    format: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionResponse {
    status: String,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error_message: Option<String>,
}

impl ConvexClient {
    pub fn new(url: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(15),
        }
    }

    /// `None` when `CONVEX_URL` is unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var(crate::config::ENV_CONVEX_URL)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .map(Self::new)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn call<A: Serialize>(&self, kind: &str, path: &str, args: A) -> Result<Value> {
        let body = FunctionCall {
            path,
            args,
            format: "json",
        };
        let rsp = self
            .client
            .post(format!("{}/api/{kind}", self.url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("convex {kind} {path}"))?;

        let status = rsp.status();
        let text = rsp.text().await.context("convex response body")?;
        if !status.is_success() {
            bail!("convex {kind} {path} HTTP {status}: {}", text.trim());
        }

        let parsed: FunctionResponse = serde_json::from_str(&text)
            .with_context(|| format!("decoding convex {kind} {path} response"))?;
        match parsed.status.as_str() {
            "success" => Ok(parsed.value.unwrap_or(Value::Null)),
            _ => Err(anyhow!(
                "convex {kind} {path} failed: {}",
                parsed.error_message.unwrap_or_else(|| "unknown error".into())
            )),
        }
    }

    async fn mutation<A: Serialize>(&self, path: &str, args: A) -> Result<Value> {
        self.call("mutation", path, args).await
    }

    async fn query<A: Serialize>(&self, path: &str, args: A) -> Result<Value> {
        self.call("query", path, args).await
    }
}

#[async_trait::async_trait]
impl RemoteStore for ConvexClient {
    fn name(&self) -> &'static str {
        "convex"
    }

    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn delete_month(&self, month: &str, year: i32) -> Result<()> {
        let deleted = self
            .mutation(DELETE_MONTH, json!({ "month": month, "year": year }))
            .await?;
        tracing::info!(target: "storage", %month, year, deleted = %deleted, "convex events cleared");
        Ok(())
    }

    async fn save_event(&self, event: &RemoteEvent) -> Result<()> {
        self.mutation(SAVE_EVENT, event).await.map(|_| ())
    }

    async fn save_session(&self, session: &ScrapeSession) -> Result<()> {
        self.mutation(SAVE_SESSION, session).await.map(|_| ())
    }

    async fn ping(&self) -> Result<Value> {
        self.query(PING, json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_http_api_shape() {
        let body = FunctionCall {
            path: SAVE_SESSION,
            args: json!({ "month": "June", "year": 2025 }),
            format: "json",
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["path"], "economicEvents:saveScrapeSession");
        assert_eq!(v["args"]["year"], 2025);
        assert_eq!(v["format"], "json");
    }

    #[test]
    fn error_response_decodes() {
        let r: FunctionResponse =
            serde_json::from_str(r#"{"status":"error","errorMessage":"boom","logLines":[]}"#).unwrap();
        assert_eq!(r.status, "error");
        assert_eq!(r.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let c = ConvexClient::new("https://happy-otter-123.convex.cloud/".into());
        assert_eq!(c.endpoint(), "https://happy-otter-123.convex.cloud");
    }

    #[tokio::test]
    async fn unreachable_deployment_is_an_error() {
        let c = ConvexClient::new("http://127.0.0.1:9".into()).with_timeout(2);
        assert!(c.ping().await.is_err());
    }
}
