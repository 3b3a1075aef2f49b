//! Client configuration: environment selection, backend base URL, timeouts and session
//! storage location.
//!
//! Values come from an optional TOML file at HUB_CONFIG_PATH, then individual environment
//! variables override single keys. See `AppConfig` for the schema.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

pub const DEV_API_BASE_URL: &str = "http://localhost:5000/api";
pub const PROD_API_BASE_URL: &str = "https://api.challengehub.app/api";

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  #[default]
  Development,
  Production,
}

impl Environment {
  pub fn default_api_base_url(self) -> &'static str {
    match self {
      Environment::Development => DEV_API_BASE_URL,
      Environment::Production => PROD_API_BASE_URL,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub environment: Environment,
  /// Overrides the per-environment default when set.
  pub api_base_url: Option<String>,
  pub session_dir: PathBuf,
  pub request_timeout_secs: u64,
  pub google_auth_timeout_secs: u64,
  pub notification_poll_secs: u64,
  /// Image URLs the backend uses as "no picture" markers.
  pub placeholder_images: Vec<String>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      environment: Environment::Development,
      api_base_url: None,
      session_dir: PathBuf::from(".challenge-hub"),
      request_timeout_secs: 15,
      google_auth_timeout_secs: 10,
      notification_poll_secs: 30,
      placeholder_images: vec![
        "default.jpg".into(),
        "default-avatar.png".into(),
        "/images/default-profile.png".into(),
        "placeholder".into(),
      ],
    }
  }
}

impl AppConfig {
  /// TOML file (if any) first, then environment overrides.
  pub fn load() -> Self {
    let mut cfg = load_config_file_from_env().unwrap_or_default();
    cfg.apply_env(|k| std::env::var(k).ok());
    info!(target: "hub_client", environment = ?cfg.environment, base_url = %cfg.base_url(), "Configuration loaded");
    cfg
  }

  fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
    if let Some(v) = get("HUB_ENV") {
      match v.to_ascii_lowercase().as_str() {
        "production" | "prod" => self.environment = Environment::Production,
        "development" | "dev" => self.environment = Environment::Development,
        other => warn!(target: "hub_client", value = %other, "Unknown HUB_ENV, keeping {:?}", self.environment),
      }
    }
    if let Some(v) = get("HUB_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
      self.api_base_url = Some(v);
    }
    if let Some(v) = get("HUB_SESSION_DIR") {
      self.session_dir = PathBuf::from(v);
    }
    parse_secs(&get, "HUB_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
    parse_secs(&get, "HUB_NOTIFICATION_POLL_SECS", &mut self.notification_poll_secs);
  }

  /// Base URL without a trailing slash.
  pub fn base_url(&self) -> String {
    let raw = self
      .api_base_url
      .as_deref()
      .unwrap_or_else(|| self.environment.default_api_base_url());
    raw.trim_end_matches('/').to_string()
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs.max(1))
  }

  pub fn google_auth_timeout(&self) -> Duration {
    Duration::from_secs(self.google_auth_timeout_secs.max(1))
  }

  pub fn notification_poll_interval(&self) -> Duration {
    Duration::from_secs(self.notification_poll_secs.max(1))
  }
}

fn parse_secs(get: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut u64) {
  if let Some(raw) = get(key) {
    match raw.trim().parse::<u64>() {
      Ok(v) => *slot = v,
      Err(e) => warn!(target: "hub_client", %key, error = %e, "Ignoring invalid value"),
    }
  }
}

/// Attempt to load `AppConfig` from HUB_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_file_from_env() -> Option<AppConfig> {
  let path = std::env::var("HUB_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "hub_client", %path, "Loaded client config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "hub_client", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "hub_client", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
