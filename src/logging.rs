//! Logging setup.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: standard tracing filter, wins over `LOG_LEVEL`
//! - `LOG_LEVEL`: fallback filter (default `info`)
//! - `LOG_FORMAT`: `pretty` (default), `compact` or `json`
//! - `LOG_TIMESTAMPS`: `utc` (default) or `none`
use std::env;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub default_level: String,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            default_level: "info".to_string(),
            timestamps: true,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            format: env::var("LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
            default_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            timestamps: env::var("LOG_TIMESTAMPS")
                .map(|s| !matches!(s.to_lowercase().as_str(), "none" | "off"))
                .unwrap_or(true),
        }
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    let timer = ChronoUtc::new("%Y-%m-%dT%H:%M:%S%.3fZ".to_string());

    match (config.format, config.timestamps) {
        (LogFormat::Json, true) => registry
            .with(fmt::layer().json().with_timer(timer))
            .try_init()?,
        (LogFormat::Json, false) => registry
            .with(fmt::layer().json().without_time())
            .try_init()?,
        (LogFormat::Compact, true) => registry
            .with(fmt::layer().compact().with_timer(timer))
            .try_init()?,
        (LogFormat::Compact, false) => registry
            .with(fmt::layer().compact().without_time())
            .try_init()?,
        (LogFormat::Pretty, true) => registry
            .with(fmt::layer().pretty().with_timer(timer))
            .try_init()?,
        (LogFormat::Pretty, false) => registry
            .with(fmt::layer().pretty().without_time())
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_falls_back_to_pretty() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Pretty);
    }

    #[test]
    fn default_config() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.default_level, "info");
        assert!(config.timestamps);
    }
}
