use std::path::PathBuf;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/18dMo5d89HkyzFGnsQaCPw843LPUG-czAneBR7rVThHI/export?format=csv";
pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://api.radar.io/v1/geocode/forward";
const DEFAULT_DATA_DIR: &str = "./data/";
const DEFAULT_FILE_NAME: &str = "htcss_user_registry.csv";
const DEFAULT_HISTORY_MAX_BYTES: u64 = 1024 * 1024;
const DEFAULT_HISTORY_MAX_FILES: usize = 5;
pub const MAX_GEOCODE_CONCURRENCY: usize = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub sheet_url: String,
    pub geocode_endpoint: String,
    pub geocode_api_key: Option<SecretString>,
    pub data_dir: PathBuf,
    pub file_name: String,
    pub geocode_concurrency: usize,
    pub http_timeout_secs: Option<u64>,
    pub history_enabled: bool,
    pub history_max_bytes: u64,
    pub history_max_files: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub sheet_url: String,
    pub geocode_endpoint: String,
    pub registry_path: String,
    pub geocode_concurrency: usize,
    pub http_timeout_secs: Option<u64>,
    pub history_enabled: bool,
    pub has_geocode_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_present();
        Self {
            sheet_url: env::var("REGISTRY_SHEET_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SHEET_URL.to_string()),
            geocode_endpoint: env::var("RADAR_GEOCODE_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEOCODE_ENDPOINT.to_string()),
            geocode_api_key: env::var("RADARIO_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            data_dir: env::var("REGISTRY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
            file_name: env::var("REGISTRY_FILE_NAME")
                .unwrap_or_else(|_| DEFAULT_FILE_NAME.to_string()),
            geocode_concurrency: clamp_concurrency(parse_usize("GEOCODE_CONCURRENCY", 1)),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0),
            history_enabled: parse_bool("HISTORY_ENABLED", true),
            history_max_bytes: parse_u64("HISTORY_MAX_BYTES", DEFAULT_HISTORY_MAX_BYTES),
            history_max_files: parse_usize("HISTORY_MAX_FILES", DEFAULT_HISTORY_MAX_FILES).max(1),
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.geocode_concurrency = clamp_concurrency(concurrency);
        self
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            sheet_url: self.sheet_url.clone(),
            geocode_endpoint: self.geocode_endpoint.clone(),
            registry_path: self.registry_path().to_string_lossy().to_string(),
            geocode_concurrency: self.geocode_concurrency,
            http_timeout_secs: self.http_timeout_secs,
            history_enabled: self.history_enabled,
            has_geocode_key: self.geocode_api_key.is_some(),
        }
    }
}

fn load_dotenv_if_present() {
    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn clamp_concurrency(value: usize) -> usize {
    value.clamp(1, MAX_GEOCODE_CONCURRENCY)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_public_profile_without_secrets() {
        env::set_var("RADARIO_API_KEY", "prj_live_secret");
        env::set_var("REGISTRY_DATA_DIR", "/tmp/registry");
        env::set_var("REGISTRY_FILE_NAME", "users.csv");
        env::set_var("GEOCODE_CONCURRENCY", "64");

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert!(public.has_geocode_key);
        assert!(config.geocode_api_key.is_some());
        assert_eq!(public.registry_path, "/tmp/registry/users.csv");
        assert_eq!(public.geocode_concurrency, MAX_GEOCODE_CONCURRENCY);
        let rendered = serde_json::to_string(&public).unwrap();
        assert!(!rendered.contains("prj_live_secret"));
    }

    #[test]
    fn concurrency_override_is_clamped() {
        let config = AppConfig::from_env().with_concurrency(0);
        assert_eq!(config.geocode_concurrency, 1);
    }
}
