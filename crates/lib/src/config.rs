//! Environment-driven settings.
//!
//! | Variable | Default |
//! |---|---|
//! | `KEPTN_API_URL` | unset (taken from the Instance manifest) |
//! | `KGITOPS_BASE_DIR` | `.keptn` |
//! | `KGITOPS_DEFAULT_BRANCH` | `main` |
//! | `KGITOPS_STORE_DIR` | `<data dir>/store` |
//! | `KGITOPS_ERROR_INTERVAL_SECS` | 10 |
//! | `KGITOPS_SUCCESS_INTERVAL_SECS` | 120 |
//! | `KGITOPS_HTTP_TIMEOUT_SECS` | 30 |
//! | `RSA_PRIVATE_KEY` | unset |

use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::consts::{DEFAULT_BASE_DIR, DEFAULT_BRANCH, ERROR_INTERVAL, HTTP_TIMEOUT, SUCCESS_INTERVAL};
use crate::platform::paths::store_dir;
use crate::secrets::{SecretDecryptor, SecretError, decryptor_from_pem};

pub const API_URL_VAR: &str = "KEPTN_API_URL";
pub const BASE_DIR_VAR: &str = "KGITOPS_BASE_DIR";
pub const DEFAULT_BRANCH_VAR: &str = "KGITOPS_DEFAULT_BRANCH";
pub const STORE_DIR_VAR: &str = "KGITOPS_STORE_DIR";
pub const ERROR_INTERVAL_VAR: &str = "KGITOPS_ERROR_INTERVAL_SECS";
pub const SUCCESS_INTERVAL_VAR: &str = "KGITOPS_SUCCESS_INTERVAL_SECS";
pub const HTTP_TIMEOUT_VAR: &str = "KGITOPS_HTTP_TIMEOUT_SECS";
pub const RSA_PRIVATE_KEY_VAR: &str = "RSA_PRIVATE_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("{var}={value:?} is not a whole number of seconds: {source}")]
  InvalidSeconds {
    var: &'static str,
    value: String,
    #[source]
    source: ParseIntError,
  },
}

#[derive(Clone)]
pub struct Settings {
  /// Fallback control-plane URL when no Instance manifest names one.
  pub api_url: Option<String>,
  pub base_dir: String,
  pub default_branch: String,
  pub store_dir: PathBuf,
  pub error_interval: Duration,
  pub success_interval: Duration,
  pub http_timeout: Duration,
  pub rsa_private_key: Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      api_url: None,
      base_dir: DEFAULT_BASE_DIR.to_string(),
      default_branch: DEFAULT_BRANCH.to_string(),
      store_dir: store_dir(),
      error_interval: ERROR_INTERVAL,
      success_interval: SUCCESS_INTERVAL,
      http_timeout: HTTP_TIMEOUT,
      rsa_private_key: None,
    }
  }
}

impl std::fmt::Debug for Settings {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Settings")
      .field("api_url", &self.api_url)
      .field("base_dir", &self.base_dir)
      .field("default_branch", &self.default_branch)
      .field("store_dir", &self.store_dir)
      .field("error_interval", &self.error_interval)
      .field("success_interval", &self.success_interval)
      .field("http_timeout", &self.http_timeout)
      .field("rsa_private_key", &self.rsa_private_key.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

fn env_string(var: &str) -> Option<String> {
  std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn env_seconds(var: &'static str) -> Result<Option<Duration>, ConfigError> {
  let Some(value) = env_string(var) else {
    return Ok(None);
  };
  let secs = value
    .trim()
    .parse::<u64>()
    .map_err(|source| ConfigError::InvalidSeconds { var, value, source })?;
  Ok(Some(Duration::from_secs(secs)))
}

impl Settings {
  pub fn from_env() -> Result<Self, ConfigError> {
    let defaults = Self::default();
    Ok(Self {
      api_url: env_string(API_URL_VAR),
      base_dir: env_string(BASE_DIR_VAR).unwrap_or(defaults.base_dir),
      default_branch: env_string(DEFAULT_BRANCH_VAR).unwrap_or(defaults.default_branch),
      store_dir: env_string(STORE_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.store_dir),
      error_interval: env_seconds(ERROR_INTERVAL_VAR)?.unwrap_or(defaults.error_interval),
      success_interval: env_seconds(SUCCESS_INTERVAL_VAR)?.unwrap_or(defaults.success_interval),
      http_timeout: env_seconds(HTTP_TIMEOUT_VAR)?.unwrap_or(defaults.http_timeout),
      rsa_private_key: env_string(RSA_PRIVATE_KEY_VAR),
    })
  }

  pub fn decryptor(&self) -> Result<Box<dyn SecretDecryptor>, SecretError> {
    decryptor_from_pem(self.rsa_private_key.as_deref())
  }
}
