use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "editor.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub assistant_url: String,
    pub assistant_api_key: Option<String>,
    pub assistant_timeout_secs: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/decks.db".into(),
            assistant_url: "http://127.0.0.1:8787/".into(),
            assistant_api_key: None,
            assistant_timeout_secs: 60,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn assistant_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant_timeout_secs)
    }
}

/// Keys accepted in `editor.toml`. Anything missing keeps its default.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    database_url: Option<String>,
    assistant_url: Option<String>,
    assistant_api_key: Option<String>,
    assistant_timeout_secs: Option<u64>,
    log_filter: Option<String>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then environment variables. Each setting
/// reads `EDITOR_<NAME>` and then `APP__<NAME>`, the latter winning.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file) => {
                if let Some(v) = file.database_url {
                    settings.database_url = v;
                }
                if let Some(v) = file.assistant_url {
                    settings.assistant_url = v;
                }
                if file.assistant_api_key.is_some() {
                    settings.assistant_api_key = file.assistant_api_key;
                }
                if let Some(v) = file.assistant_timeout_secs {
                    settings.assistant_timeout_secs = v;
                }
                if let Some(v) = file.log_filter {
                    settings.log_filter = v;
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring unreadable settings file");
            }
        }
    }

    let lookup = |name: &str| {
        env(&format!("APP__{name}")).or_else(|| env(&format!("EDITOR_{name}")))
    };

    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("ASSISTANT_URL") {
        settings.assistant_url = v;
    }
    if let Some(v) = lookup("ASSISTANT_API_KEY") {
        settings.assistant_api_key = Some(v).filter(|key| !key.trim().is_empty());
    }
    if let Some(v) = lookup("ASSISTANT_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.assistant_timeout_secs = parsed,
            Err(error) => warn!(value = %v, %error, "ignoring invalid assistant timeout"),
        }
    }
    if let Some(v) = lookup("LOG") {
        settings.log_filter = v;
    }

    settings
}

/// Accepts plain file paths as well as sqlite urls.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

pub fn database_url(settings: &Settings, override_url: Option<&str>) -> anyhow::Result<String> {
    let raw = override_url.unwrap_or(&settings.database_url);
    let url = normalize_database_url(raw);
    if !url.starts_with("sqlite:") {
        anyhow::bail!("unsupported database url '{url}'; only sqlite is available");
    }
    Ok(url)
}

pub fn read_text_arg(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix('@') {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read text from '{path}'"))
        }
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
