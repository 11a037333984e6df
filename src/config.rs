use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::hub::HubSettings;

/// Process configuration, read from the environment and an optional `.env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub token_ttl_hours: i64,
    pub probe_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// The `.env` file that was loaded, if one was found.
    pub env_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let env_file = dotenv::dotenv().ok();
        let mut config = Self::from_lookup(|key| dotenv::var(key).ok())?;
        config.env_file = env_file;
        Ok(config)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = lookup("PORT").context("PORT must be set")?;
        // `:8080` is accepted as well as `8080`
        let port = port
            .trim()
            .trim_start_matches(':')
            .parse()
            .with_context(|| format!("invalid PORT {port:?}"))?;

        let config = Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_owned()),
            port,
            debug: lookup("DEBUG").is_some_and(|value| value.trim().eq_ignore_ascii_case("true")),
            token_ttl_hours: parse_or(&lookup, "TOKEN_TTL_HOURS", 720)?,
            probe_timeout_ms: parse_or(&lookup, "PROBE_TIMEOUT_MS", 5)?,
            write_timeout_ms: parse_or(&lookup, "WRITE_TIMEOUT_MS", 250)?,
            env_file: None,
        };
        if config.token_ttl_hours <= 0 {
            bail!("TOKEN_TTL_HOURS must be positive, got {}", config.token_ttl_hours);
        }
        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "callhub=debug,tower_http=debug,info"
        } else {
            "callhub=info,tower_http=info,warn"
        }
    }

    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            token_ttl: time::Duration::hours(self.token_ttl_hours),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {key} {value:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("PORT", "8080")]).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert!(!config.debug);
        let settings = config.hub_settings();
        assert_eq!(settings.token_ttl, time::Duration::hours(720));
        assert_eq!(settings.probe_timeout, Duration::from_millis(5));
        assert_eq!(settings.write_timeout, Duration::from_millis(250));
    }

    #[test]
    fn port_may_carry_a_colon() {
        assert_eq!(load(&[("PORT", ":9000")]).unwrap().port, 9000);
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            ("PORT", "1"),
            ("HOST", "0.0.0.0"),
            ("DEBUG", "true"),
            ("TOKEN_TTL_HOURS", "2"),
            ("WRITE_TIMEOUT_MS", "40"),
        ])
        .unwrap();
        assert!(config.debug);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.hub_settings().token_ttl, time::Duration::hours(2));
        assert_eq!(config.hub_settings().write_timeout, Duration::from_millis(40));
        assert!(config.default_log_filter().contains("debug"));
    }

    #[test]
    fn bad_values_are_fatal() {
        assert!(load(&[]).is_err());
        assert!(load(&[("PORT", "http")]).is_err());
        assert!(load(&[("PORT", "1"), ("PROBE_TIMEOUT_MS", "soon")]).is_err());
        assert!(load(&[("PORT", "1"), ("TOKEN_TTL_HOURS", "0")]).is_err());
    }
}
