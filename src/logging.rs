//! Tracing subscriber setup driven by `RUST_LOG` and `LOG_FORMAT`.

use anyhow::{anyhow, Result};
use std::env;
use std::io;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `fitvida=debug,tower_http=info`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            format: LogFormat::parse(env::var("LOG_FORMAT").ok().as_deref()),
        }
    }

    /// Installs the global subscriber. Logs go to stderr so command output on
    /// stdout stays machine-readable.
    ///
    /// # Errors
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(&self) -> Result<()> {
        let filter = EnvFilter::new(&self.level)
            .add_directive(
                "hyper=warn"
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::WARN.into()),
            )
            .add_directive(
                "reqwest=warn"
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::WARN.into()),
            );
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match self.format {
            LogFormat::Json => registry
                .with(fmt::layer().json().with_target(true).with_writer(io::stderr))
                .try_init(),
            LogFormat::Pretty => registry
                .with(fmt::layer().pretty().with_writer(io::stderr))
                .try_init(),
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_target(false).with_writer(io::stderr))
                .try_init(),
        };
        installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

        info!(
            version = env!("CARGO_PKG_VERSION"),
            log.level = %self.level,
            log.format = ?self.format,
            "logging initialised"
        );
        Ok(())
    }
}
