// src/config/mod.rs
//! Runtime settings, read once from the environment at startup.

pub mod allowlist;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::path::PathBuf;

use crate::normalize::{timezone::parse_zone, AllowLists, ZonePair};
use crate::storage::StorageMethod;

pub const ENV_DATA_STORAGE: &str = "DATA_STORAGE";
pub const ENV_CONVEX_URL: &str = "CONVEX_URL";
pub const ENV_TARGET_TIMEZONE: &str = "TARGET_TIMEZONE";
pub const ENV_SCRAPER_TIMEZONE: &str = "SCRAPER_TIMEZONE";
pub const ENV_CALENDAR_BASE_URL: &str = "CALENDAR_BASE_URL";
pub const ENV_WEBDRIVER_URL: &str = "WEBDRIVER_URL";
pub const ENV_BROWSER_FIXTURE_PATH: &str = "BROWSER_FIXTURE_PATH";
pub const ENV_NEWS_OUTPUT_DIR: &str = "NEWS_OUTPUT_DIR";

pub const DEFAULT_SCRAPER_TIMEZONE: &str = "Europe/Berlin";
pub const DEFAULT_CALENDAR_BASE_URL: &str = "https://www.forexfactory.com";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_NEWS_OUTPUT_DIR: &str = "news";

#[derive(Debug, Clone)]
pub struct Settings {
    pub storage_method: StorageMethod,
    /// `None` disables the remote backend.
    pub convex_url: Option<String>,
    /// Zone the calendar renders its times in.
    pub scraper_timezone: Tz,
    /// `None` leaves scraped times untouched.
    pub target_timezone: Option<Tz>,
    pub allowlists: AllowLists,
    pub calendar_base_url: String,
    pub webdriver_url: String,
    /// Replay rows from this JSON file instead of driving a browser.
    pub browser_fixture: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_method: StorageMethod::Both,
            convex_url: None,
            scraper_timezone: chrono_tz::Europe::Berlin,
            target_timezone: None,
            allowlists: AllowLists::default(),
            calendar_base_url: DEFAULT_CALENDAR_BASE_URL.to_string(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            browser_fixture: None,
            output_dir: PathBuf::from(DEFAULT_NEWS_OUTPUT_DIR),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Settings {
    /// Build settings from the process environment (call `dotenvy::dotenv()` first).
    ///
    /// Bad timezone names and unreadable allow-list files are startup errors;
    /// an unknown storage method falls back to `both` with a warning.
    pub fn from_env() -> Result<Self> {
        let storage_method = match env_nonempty(ENV_DATA_STORAGE) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(value = %raw, error = %e, "unknown DATA_STORAGE, using 'both'");
                StorageMethod::Both
            }),
            None => StorageMethod::Both,
        };

        let scraper_timezone = parse_zone(
            &env_nonempty(ENV_SCRAPER_TIMEZONE).unwrap_or_else(|| DEFAULT_SCRAPER_TIMEZONE.into()),
        )
        .context("SCRAPER_TIMEZONE")?;
        let target_timezone = env_nonempty(ENV_TARGET_TIMEZONE)
            .map(|z| parse_zone(&z))
            .transpose()
            .context("TARGET_TIMEZONE")?;

        let allowlists = allowlist::load_allowlists_default().context("loading allow-lists")?;

        Ok(Self {
            storage_method,
            convex_url: env_nonempty(ENV_CONVEX_URL),
            scraper_timezone,
            target_timezone,
            allowlists,
            calendar_base_url: env_nonempty(ENV_CALENDAR_BASE_URL)
                .unwrap_or_else(|| DEFAULT_CALENDAR_BASE_URL.into()),
            webdriver_url: env_nonempty(ENV_WEBDRIVER_URL)
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.into()),
            browser_fixture: env_nonempty(ENV_BROWSER_FIXTURE_PATH).map(PathBuf::from),
            output_dir: env_nonempty(ENV_NEWS_OUTPUT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_NEWS_OUTPUT_DIR)),
        })
    }

    pub fn zones(&self) -> ZonePair {
        ZonePair {
            source: self.scraper_timezone,
            target: self.target_timezone,
        }
    }
}
