// src/config/allowlist.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::normalize::AllowLists;

const ENV_PATH: &str = "ALLOWLIST_PATH";
const ENV_CURRENCIES: &str = "ALLOWED_CURRENCY_CODES";
const ENV_IMPACTS: &str = "ALLOWED_IMPACT_COLORS";

#[derive(serde::Deserialize)]
struct AllowListFile {
    #[serde(default)]
    currencies: Option<Vec<String>>,
    #[serde(default)]
    impacts: Option<Vec<String>>,
}

/// Load allow-lists from an explicit path. Supports TOML or JSON formats.
/// A list missing from the file keeps its built-in default.
pub fn load_allowlists_from(path: &Path) -> Result<AllowLists> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading allow-lists from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_allowlists(&content, ext.as_str())
}

/// Load allow-lists using env var + fallbacks, then apply list overrides:
/// 1) $ALLOWLIST_PATH
/// 2) config/allowlist.toml
/// 3) config/allowlist.json
/// 4) built-in defaults
///
/// `ALLOWED_CURRENCY_CODES` / `ALLOWED_IMPACT_COLORS` (comma-separated)
/// replace the respective list afterwards.
pub fn load_allowlists_default() -> Result<AllowLists> {
    let mut lists = load_file_or_default()?;
    if let Ok(raw) = std::env::var(ENV_CURRENCIES) {
        lists.currencies = clean_list(split_env_list(&raw));
    }
    if let Ok(raw) = std::env::var(ENV_IMPACTS) {
        lists.impacts = clean_impacts(split_env_list(&raw));
    }
    Ok(lists)
}

fn load_file_or_default() -> Result<AllowLists> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_allowlists_from(&pb);
        } else {
            return Err(anyhow!("ALLOWLIST_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/allowlist.toml");
    if toml_p.exists() {
        return load_allowlists_from(&toml_p);
    }
    let json_p = PathBuf::from("config/allowlist.json");
    if json_p.exists() {
        return load_allowlists_from(&json_p);
    }
    Ok(AllowLists::default())
}

fn parse_allowlists(s: &str, hint_ext: &str) -> Result<AllowLists> {
    let file: AllowListFile = if hint_ext == "json" {
        serde_json::from_str(s).context("parsing allow-list json")?
    } else {
        toml::from_str::<AllowListFile>(s)
            .or_else(|_| serde_json::from_str(s))
            .map_err(|_| anyhow!("unsupported allow-list format"))?
    };

    let defaults = AllowLists::default();
    Ok(AllowLists {
        currencies: file
            .currencies
            .map(clean_list)
            .unwrap_or(defaults.currencies),
        impacts: file
            .impacts
            .map(clean_impacts)
            .unwrap_or(defaults.impacts),
    })
}

fn split_env_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}

fn clean_impacts(items: Vec<String>) -> Vec<String> {
    clean_list(items.into_iter().map(|s| s.to_lowercase()).collect())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}
