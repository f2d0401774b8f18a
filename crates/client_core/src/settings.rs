use std::{env, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::domain::{WorkerCatalog, WorkerDescriptor};

pub const SETTINGS_FILE: &str = "submitter.toml";

/// Client configuration, sourced from the deployment context: the service
/// base URL, the session's anti-forgery token, upload limits, the redirect
/// delay, the flag revealing the advanced worker panel, and the worker
/// catalog itself (a `[[workers]]` array).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    pub csrf_token: String,
    pub max_file_size_mb: u64,
    pub max_concurrent_uploads: usize,
    pub redirect_delay_ms: u64,
    pub show_worker_details: bool,
    pub workers: Vec<WorkerDescriptor>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:6100".into(),
            csrf_token: String::new(),
            max_file_size_mb: 100,
            max_concurrent_uploads: 4,
            redirect_delay_ms: 1000,
            show_worker_details: false,
            workers: Vec::new(),
        }
    }
}

impl Settings {
    pub fn catalog(&self) -> WorkerCatalog {
        WorkerCatalog::new(self.workers.clone())
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

/// Load settings from an explicit file, or from `submitter.toml` in the
/// working directory when present, then apply environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse settings file '{}'", path.display()))?
        }
        None => match fs::read_to_string(SETTINGS_FILE) {
            Ok(raw) => toml::from_str(&raw)
                .with_context(|| format!("failed to parse settings file '{SETTINGS_FILE}'"))?,
            Err(_) => Settings::default(),
        },
    };

    if let Ok(v) = env::var("SUBMIT_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = env::var("SUBMIT_CSRF_TOKEN") {
        settings.csrf_token = v;
    }
    if let Ok(v) = env::var("SUBMIT_MAX_FILE_SIZE_MB") {
        if let Ok(parsed) = v.parse() {
            settings.max_file_size_mb = parsed;
        }
    }
    if let Ok(v) = env::var("SUBMIT_MAX_CONCURRENT_UPLOADS") {
        if let Ok(parsed) = v.parse() {
            settings.max_concurrent_uploads = parsed;
        }
    }
    if let Ok(v) = env::var("SUBMIT_REDIRECT_DELAY_MS") {
        if let Ok(parsed) = v.parse() {
            settings.redirect_delay_ms = parsed;
        }
    }
    if let Ok(v) = env::var("SUBMIT_SHOW_WORKER_DETAILS") {
        settings.show_worker_details = matches!(v.as_str(), "1" | "true" | "yes");
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_settings_file() {
        let raw = r#"
            server_url = "https://analysis.example.org"
            csrf_token = "token-1"
            max_file_size_mb = 25
            show_worker_details = true

            [[workers]]
            name = "av"
            display_name = "Antivirus"
            description = "Signature scan"
            replicas = 2

            [[workers]]
            name = "legacy"
            replicas = 0
        "#;

        let settings: Settings = toml::from_str(raw).expect("parse settings");
        assert_eq!(settings.server_url, "https://analysis.example.org");
        assert_eq!(settings.max_file_size_mb, 25);
        assert!(settings.show_worker_details);
        // defaults fill the rest
        assert_eq!(settings.max_concurrent_uploads, 4);
        assert_eq!(settings.redirect_delay_ms, 1000);

        let catalog = settings.catalog();
        let selectable: Vec<&str> = catalog.selectable().map(|w| w.name.as_str()).collect();
        assert_eq!(selectable, ["av"]);
    }

    #[test]
    fn empty_settings_fall_back_to_defaults() {
        let settings: Settings = toml::from_str("").expect("parse empty settings");
        assert_eq!(settings.max_file_size_mb, 100);
        assert!(!settings.show_worker_details);
        assert!(settings.workers.is_empty());
    }

    #[test]
    fn environment_overrides_scalar_settings() {
        env::set_var("SUBMIT_MAX_FILE_SIZE_MB", "7");
        env::set_var("SUBMIT_SHOW_WORKER_DETAILS", "true");

        let settings = load_settings(None).expect("load settings");
        assert_eq!(settings.max_file_size_mb, 7);
        assert!(settings.show_worker_details);

        env::remove_var("SUBMIT_MAX_FILE_SIZE_MB");
        env::remove_var("SUBMIT_SHOW_WORKER_DETAILS");
    }
}
