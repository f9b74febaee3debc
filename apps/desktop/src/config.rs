use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::{ClientConfig, SelectionPolicy};
use shared::protocol::SEARCH_PATH;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "visual_search.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub search_path: String,
    pub database_url: String,
    pub preview_dir: PathBuf,
    /// Unset means requests never time out on the client side.
    pub request_timeout_secs: Option<u64>,
    /// Unset means no client-side size cap.
    pub max_upload_bytes: Option<u64>,
    pub validate_picker: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let data_root = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("./data"))
            .join("visual_search");
        let preview_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("visual_search")
            .join("previews");
        Self {
            api_base_url: "http://localhost:8001".into(),
            search_path: SEARCH_PATH.into(),
            database_url: sqlite_url_for_path(&data_root.join("client.sqlite3")),
            preview_dir,
            request_timeout_secs: None,
            max_upload_bytes: None,
            validate_picker: false,
        }
    }
}

impl Settings {
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::new(&self.api_base_url)
            .with_context(|| format!("invalid api base url '{}'", self.api_base_url))?
            .with_request_timeout(self.request_timeout_secs.map(Duration::from_secs));
        config.search_path = self.search_path.clone();
        Ok(config)
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            validate_picker: self.validate_picker,
            max_upload_bytes: self.max_upload_bytes,
            ..SelectionPolicy::default()
        }
    }
}

pub fn load_settings(config_path: Option<&Path>) -> Settings {
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    load_settings_from(path, |key| std::env::var(key).ok())
}

/// Defaults, then the config file, then environment variables.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<toml::Table>(&raw) {
            Ok(file_cfg) => {
                let get = |key: &str| file_cfg.get(key).map(value_to_string);
                apply(&mut settings, get);
            }
            Err(err) => warn!(path = %path.display(), "config: ignoring unreadable file: {err}"),
        }
    }

    apply(&mut settings, |key| {
        env(&format!("APP__{}", key.to_ascii_uppercase()))
    });
    if let Some(v) = env("VISUAL_SEARCH_API_URL") {
        settings.api_base_url = v;
    }

    settings.database_url = normalize_database_url(&settings.database_url);
    settings
}

fn apply(settings: &mut Settings, get: impl Fn(&str) -> Option<String>) {
    if let Some(v) = get("api_url") {
        settings.api_base_url = v;
    }
    if let Some(v) = get("search_path") {
        settings.search_path = v;
    }
    if let Some(v) = get("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = get("preview_dir") {
        settings.preview_dir = PathBuf::from(v);
    }
    if let Some(v) = get("request_timeout_secs") {
        match v.parse::<u64>() {
            Ok(parsed) if parsed > 0 => settings.request_timeout_secs = Some(parsed),
            _ => warn!(value = %v, "config: ignoring invalid request_timeout_secs"),
        }
    }
    if let Some(v) = get("max_upload_bytes") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.max_upload_bytes = Some(parsed),
            Err(_) => warn!(value = %v, "config: ignoring invalid max_upload_bytes"),
        }
    }
    if let Some(v) = get("validate_picker") {
        match v.parse::<bool>() {
            Ok(parsed) => settings.validate_picker = parsed,
            Err(_) => warn!(value = %v, "config: ignoring invalid validate_picker"),
        }
    }
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sqlite_url_for_path(path: &Path) -> String {
    format!("sqlite://{}", path.display().to_string().replace('\\', "/"))
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
