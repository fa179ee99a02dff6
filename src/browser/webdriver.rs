// src/browser/webdriver.rs
//! Minimal W3C WebDriver client (chromedriver/geckodriver) over reqwest.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;

use super::{rows_from_json, BrowserLauncher, CalendarPage};
use crate::normalize::RawRow;

const MAX_SCROLLS: usize = 30;

const TIMEZONE_JS: &str = "return Intl.DateTimeFormat().resolvedOptions().timeZone;";

const SCROLL_JS: &str =
    "window.scrollTo(0, document.body.scrollHeight); return document.body.scrollHeight;";

/// Emits one object per calendar row. Day-breaker rows carry only `date`;
/// blank cells in event rows come back as the `empty` sentinel.
const EXTRACT_ROWS_JS: &str = r#"
const FIELDS = ["date", "time", "currency", "impact", "event", "detail", "actual", "forecast", "previous"];
const IMPACT = { red: "red", ora: "orange", yel: "yellow", gra: "gray" };
const rows = [];
for (const tr of document.querySelectorAll("table.calendar__table tr.calendar__row")) {
  if (tr.classList.contains("calendar__row--day-breaker")) {
    const text = tr.innerText.replace(/\s+/g, " ").trim();
    if (text) rows.push({ date: text });
    continue;
  }
  const row = {};
  for (const f of FIELDS) {
    const td = tr.querySelector("td.calendar__" + f);
    if (!td) continue;
    let value = "";
    if (f === "impact") {
      const icon = td.querySelector("span[class*='icon--ff-impact-']");
      const m = icon && icon.className.match(/icon--ff-impact-(\w+)/);
      value = m ? (IMPACT[m[1]] || m[1]) : "";
    } else if (f === "detail") {
      const a = td.querySelector("a");
      value = a ? a.href : "";
    } else {
      value = td.innerText.replace(/\s+/g, " ").trim();
    }
    row[f] = value === "" ? "empty" : value;
  }
  if (Object.keys(row).length) rows.push(row);
}
return rows;
"#;

pub struct WebDriverLauncher {
    url: String,
    client: Client,
    scroll_pause: Duration,
}

impl WebDriverLauncher {
    pub fn new(url: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            scroll_pause: Duration::from_millis(1500),
        }
    }

    fn capabilities(&self) -> Value {
        let args = [
            "--headless=new",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--window-size=1920,1080",
        ];
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn CalendarPage>> {
        let value = send(
            &self.client,
            Method::POST,
            &format!("{}/session", self.url),
            Some(self.capabilities()),
        )
        .await
        .context("creating webdriver session")?;

        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("webdriver returned no sessionId"))?
            .to_string();
        tracing::debug!(target: "browser", session = %id, "webdriver session started");

        Ok(Box::new(WebDriverSession {
            base: format!("{}/session/{id}", self.url),
            client: self.client.clone(),
            scroll_pause: self.scroll_pause,
            open: true,
        }))
    }

    fn name(&self) -> &'static str {
        "webdriver"
    }
}

pub struct WebDriverSession {
    base: String,
    client: Client,
    scroll_pause: Duration,
    open: bool,
}

impl WebDriverSession {
    async fn execute(&self, script: &str) -> Result<Value> {
        send(
            &self.client,
            Method::POST,
            &format!("{}/execute/sync", self.base),
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }
}

#[async_trait::async_trait]
impl CalendarPage for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        send(
            &self.client,
            Method::POST,
            &format!("{}/url", self.base),
            Some(json!({ "url": url })),
        )
        .await
        .with_context(|| format!("navigating to {url}"))?;
        Ok(())
    }

    async fn detect_timezone(&mut self) -> Result<String> {
        let v = self.execute(TIMEZONE_JS).await?;
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("browser timezone was not a string: {v}"))
    }

    async fn scroll_to_end(&mut self) -> Result<()> {
        let mut last = None;
        for _ in 0..MAX_SCROLLS {
            let height = self.execute(SCROLL_JS).await?.as_i64();
            if height.is_some() && height == last {
                return Ok(());
            }
            last = height;
            tokio::time::sleep(self.scroll_pause).await;
        }
        tracing::warn!(target: "browser", scrolls = MAX_SCROLLS, "page kept growing; extracting what is loaded");
        Ok(())
    }

    async fn extract_rows(&mut self) -> Result<Vec<RawRow>> {
        let v = self.execute(EXTRACT_ROWS_JS).await.context("extracting calendar rows")?;
        rows_from_json(v)
    }

    async fn quit(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        send(&self.client, Method::DELETE, &self.base, None)
            .await
            .context("closing webdriver session")?;
        self.open = false;
        Ok(())
    }
}

/// One WebDriver command; returns the `value` member of the response.
async fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
    let mut req = client.request(method, url);
    if let Some(b) = body {
        req = req.json(&b);
    }
    let rsp = req.send().await.with_context(|| format!("webdriver request {url}"))?;
    let status = rsp.status();
    let mut payload: Value = rsp.json().await.context("decoding webdriver response")?;
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
        bail!("webdriver {status}: {error}: {message}");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_request_asks_for_headless_chrome() {
        let l = WebDriverLauncher::new("http://localhost:9515/".into());
        assert_eq!(l.url, "http://localhost:9515");
        let caps = l.capabilities();
        let m = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(m["browserName"], "chrome");
        let args = m["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
    }

    #[tokio::test]
    async fn launch_without_driver_fails() {
        let l = WebDriverLauncher::new("http://127.0.0.1:9".into());
        assert!(l.launch().await.is_err());
    }
}
