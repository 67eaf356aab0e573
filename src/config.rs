use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::api_connection::{ApiConnectionError, Provider};
use crate::metrics::BmrFormula;

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    Provider(#[from] ApiConnectionError),
}

/// Runtime settings for the AI backend, metrics and HTTP listener.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub provider: String,
    /// Name of the environment variable holding the bearer key, not the key.
    pub api_key_env: String,
    pub model: String,
    pub timeout: Duration,
    pub formula: BmrFormula,
    pub bind_addr: SocketAddr,
}

impl RelayConfig {
    /// Reads settings from the process environment after loading `.env`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set but cannot
    /// be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let timeout_raw = get("AI_TIMEOUT_SECS", &DEFAULT_TIMEOUT_SECS.to_string());
        let timeout_secs = match timeout_raw.parse::<u64>() {
            Ok(secs) if secs > 0 => secs,
            Ok(_) => {
                return Err(ConfigError::InvalidValue {
                    var: "AI_TIMEOUT_SECS",
                    value: timeout_raw,
                    reason: "must be greater than zero".to_string(),
                })
            }
            Err(e) => {
                return Err(ConfigError::InvalidValue {
                    var: "AI_TIMEOUT_SECS",
                    reason: e.to_string(),
                    value: timeout_raw,
                })
            }
        };

        let formula_raw = get("BMR_FORMULA", "mifflin");
        let formula = formula_raw
            .parse::<BmrFormula>()
            .map_err(|reason| ConfigError::InvalidValue {
                var: "BMR_FORMULA",
                value: formula_raw.clone(),
                reason,
            })?;

        let bind_raw = get("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                var: "BIND_ADDR",
                value: bind_raw.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            provider: get("AI_PROVIDER", DEFAULT_PROVIDER),
            api_key_env: get("AI_API_KEY_ENV", DEFAULT_API_KEY_ENV),
            model: get("AI_MODEL", DEFAULT_MODEL),
            timeout: Duration::from_secs(timeout_secs),
            formula,
            bind_addr,
        })
    }

    pub fn build_provider(&self) -> Result<Provider, ConfigError> {
        Ok(Provider::from_name(
            &self.provider,
            &self.api_key_env,
            &self.model,
            self.timeout,
        )?)
    }
}
