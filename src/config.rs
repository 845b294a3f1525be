use std::time::Duration;

use thiserror::Error;

use crate::cache::{DEFAULT_GC_TIME, DEFAULT_STALE_TIME};
use crate::keys::EntityId;
use crate::logging::LogFormat;
use crate::modal::DEFAULT_SETTLE_DELAY;
use crate::registration::DEFAULT_WIZARD_IDLE;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend_url: Option<String>,
    pub request_timeout: Duration,
    pub institution: EntityId,
    pub modal_settle: Duration,
    pub cache_stale: Duration,
    pub cache_gc: Duration,
    pub wizard_idle: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            institution: EntityId::new(1),
            modal_settle: DEFAULT_SETTLE_DELAY,
            cache_stale: DEFAULT_STALE_TIME,
            cache_gc: DEFAULT_GC_TIME,
            wizard_idle: DEFAULT_WIZARD_IDLE,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from any variable source. Unset or blank variables keep
    /// their defaults; anything set but unparseable is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut cfg = Config::default();

        cfg.backend_url = get("SCHOOLD_BACKEND_URL");
        if let Some(v) = get("SCHOOLD_REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout = Duration::from_secs(positive("SCHOOLD_REQUEST_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("SCHOOLD_INSTITUTION_ID") {
            cfg.institution = EntityId::new(positive("SCHOOLD_INSTITUTION_ID", &v)? as i64);
        }
        if let Some(v) = get("SCHOOLD_MODAL_SETTLE_MS") {
            cfg.modal_settle = Duration::from_millis(unsigned("SCHOOLD_MODAL_SETTLE_MS", &v)?);
        }
        if let Some(v) = get("SCHOOLD_CACHE_STALE_SECS") {
            cfg.cache_stale = Duration::from_secs(unsigned("SCHOOLD_CACHE_STALE_SECS", &v)?);
        }
        if let Some(v) = get("SCHOOLD_CACHE_GC_SECS") {
            cfg.cache_gc = Duration::from_secs(positive("SCHOOLD_CACHE_GC_SECS", &v)?);
        }
        if let Some(v) = get("SCHOOLD_WIZARD_IDLE_SECS") {
            cfg.wizard_idle = Duration::from_secs(positive("SCHOOLD_WIZARD_IDLE_SECS", &v)?);
        }
        if let Some(v) = get("SCHOOLD_LOG") {
            let level = v.to_ascii_lowercase();
            if !matches!(
                level.as_str(),
                "error" | "warn" | "info" | "debug" | "trace" | "off"
            ) {
                return Err(ConfigError::Invalid {
                    var: "SCHOOLD_LOG",
                    expected: "one of error, warn, info, debug, trace, off",
                    value: v,
                });
            }
            cfg.log_level = level;
        }
        if let Some(v) = get("SCHOOLD_LOG_FORMAT") {
            cfg.log_format = match v.to_ascii_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "SCHOOLD_LOG_FORMAT",
                        expected: "compact or json",
                        value: v,
                    })
                }
            };
        }
        Ok(cfg)
    }
}

fn unsigned(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::Invalid {
        var,
        expected: "a non-negative integer",
        value: value.to_string(),
    })
}

fn positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match unsigned(var, value) {
        Ok(0) | Err(_) => Err(ConfigError::Invalid {
            var,
            expected: "a positive integer",
            value: value.to_string(),
        }),
        Ok(n) => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = Config::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.modal_settle, Duration::from_millis(100));
        assert_eq!(cfg.institution, EntityId::new(1));
    }

    #[test]
    fn values_override_defaults() {
        let cfg = Config::from_lookup(lookup(&[
            ("SCHOOLD_BACKEND_URL", " http://localhost:3000/api "),
            ("SCHOOLD_INSTITUTION_ID", "7"),
            ("SCHOOLD_MODAL_SETTLE_MS", "0"),
            ("SCHOOLD_LOG", "DEBUG"),
            ("SCHOOLD_LOG_FORMAT", "json"),
            ("SCHOOLD_REQUEST_TIMEOUT_SECS", ""),
            ("SCHOOLD_WIZARD_IDLE_SECS", "600"),
        ]))
        .expect("config");
        assert_eq!(cfg.backend_url.as_deref(), Some("http://localhost:3000/api"));
        assert_eq!(cfg.institution, EntityId::new(7));
        assert_eq!(cfg.modal_settle, Duration::ZERO);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(cfg.wizard_idle, Duration::from_secs(600));
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = Config::from_lookup(lookup(&[("SCHOOLD_CACHE_GC_SECS", "0")]))
            .expect_err("zero gc");
        assert!(err.to_string().starts_with("SCHOOLD_CACHE_GC_SECS"));
        let err = Config::from_lookup(lookup(&[("SCHOOLD_LOG_FORMAT", "pretty")]))
            .expect_err("format");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "SCHOOLD_LOG_FORMAT",
                ..
            }
        ));
    }
}
