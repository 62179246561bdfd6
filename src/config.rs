use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::checklist::{AttemptPolicy, GenerationSettings, ModelCandidates};

/// Application-level constants
pub const APP_NAME: &str = "visa-checklist";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PRIMARY_MODEL: &str = "gpt-4o";
pub const DEFAULT_SECONDARY_MODEL: &str = "gpt-4-turbo";
pub const DEFAULT_CHAT_FALLBACK_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_PORT: u16 = 8088;
const DEFAULT_LOG_FILTER: &str = "info,visa_checklist=debug";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    std::env::var("CHECKLIST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string())
}

/// `<platform data dir>/visa-checklist`, when it exists.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .filter(|p| p.is_dir())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("{var} = {value} is outside {min}..={max}")]
    OutOfRange {
        var: &'static str,
        value: String,
        min: String,
        max: String,
    },
}

// ── Engine ─────────────────────────────────────────────────────

/// Everything the checklist engine needs, read once at startup.
#[derive(Clone, PartialEq)]
pub struct EngineConfig {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub models: ModelCandidates,
    pub policy: AttemptPolicy,
    pub settings: GenerationSettings,
    pub data_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_attempts: u8 = parse_in_range(get("CHECKLIST_MAX_ATTEMPTS"), "CHECKLIST_MAX_ATTEMPTS", 2, 1, 5)?;
        let timeout_secs: u64 = parse_in_range(
            get("CHECKLIST_ATTEMPT_TIMEOUT_SECS"),
            "CHECKLIST_ATTEMPT_TIMEOUT_SECS",
            20,
            1,
            120,
        )?;
        let max_tokens: u32 = parse_in_range(get("CHECKLIST_MAX_TOKENS"), "CHECKLIST_MAX_TOKENS", 2000, 1, 32_000)?;
        let temperature: f32 = parse_in_range(get("CHECKLIST_TEMPERATURE"), "CHECKLIST_TEMPERATURE", 0.3, 0.0, 2.0)?;

        Ok(Self {
            api_base_url: get("CHECKLIST_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            api_key: get("CHECKLIST_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            models: ModelCandidates {
                override_model: get("CHECKLIST_MODEL"),
                primary: get("CHECKLIST_PRIMARY_MODEL").unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
                secondary: get("CHECKLIST_SECONDARY_MODEL")
                    .unwrap_or_else(|| DEFAULT_SECONDARY_MODEL.to_string()),
                conversation_fallback: get("CHECKLIST_CHAT_FALLBACK_MODEL")
                    .unwrap_or_else(|| DEFAULT_CHAT_FALLBACK_MODEL.to_string()),
            },
            policy: AttemptPolicy {
                max_attempts,
                per_attempt_timeout: Duration::from_secs(timeout_secs),
            },
            settings: GenerationSettings {
                max_tokens,
                temperature,
            },
            data_dir: get("CHECKLIST_DATA_DIR").map(PathBuf::from).or_else(default_data_dir),
        })
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("models", &self.models)
            .field("policy", &self.policy)
            .field("settings", &self.settings)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let host = match lookup("CHECKLIST_HOST").map(|v| v.trim().to_string()) {
            Some(raw) if !raw.is_empty() => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "CHECKLIST_HOST",
                value: raw,
            })?,
            _ => defaults.host,
        };
        let port = parse_in_range(lookup("CHECKLIST_PORT"), "CHECKLIST_PORT", defaults.port, 1, u16::MAX)?;
        Ok(Self { host, port })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_in_range<T>(
    raw: Option<String>,
    var: &'static str,
    default: T,
    min: T,
    max: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display + Copy,
{
    let Some(raw) = raw.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) else {
        return Ok(default);
    };
    let value: T = raw.parse().map_err(|_| ConfigError::Invalid {
        var,
        value: raw.clone(),
    })?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            var,
            value: raw,
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(value)
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(config.api_key.is_none());
        assert_eq!(config.models.primary, "gpt-4o");
        assert_eq!(config.models.secondary, "gpt-4-turbo");
        assert_eq!(config.models.conversation_fallback, "gpt-3.5-turbo");
        assert!(config.models.override_model.is_none());
        assert_eq!(config.policy, AttemptPolicy::default());
        assert_eq!(config.settings, GenerationSettings::default());
    }

    #[test]
    fn checklist_key_preferred_over_openai_key() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("CHECKLIST_API_KEY", "sk-checklist"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-checklist"));

        let config = EngineConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-openai")])).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CHECKLIST_MODEL", "  "),
            ("CHECKLIST_MAX_ATTEMPTS", ""),
        ]))
        .unwrap();
        assert!(config.models.override_model.is_none());
        assert_eq!(config.policy.max_attempts, 2);
    }

    #[test]
    fn policy_and_settings_parsed() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CHECKLIST_MAX_ATTEMPTS", "3"),
            ("CHECKLIST_ATTEMPT_TIMEOUT_SECS", "15"),
            ("CHECKLIST_MAX_TOKENS", "4000"),
            ("CHECKLIST_TEMPERATURE", "0.7"),
            ("CHECKLIST_DATA_DIR", "/srv/checklist"),
        ]))
        .unwrap();
        assert_eq!(config.policy.max_attempts, 3);
        assert_eq!(config.policy.per_attempt_timeout, Duration::from_secs(15));
        assert_eq!(config.settings.max_tokens, 4000);
        assert!((config.settings.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/checklist")));
    }

    #[test]
    fn out_of_range_attempts_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("CHECKLIST_MAX_ATTEMPTS", "9")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { var: "CHECKLIST_MAX_ATTEMPTS", .. }));

        let err = EngineConfig::from_lookup(lookup(&[("CHECKLIST_TEMPERATURE", "warm")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "CHECKLIST_TEMPERATURE",
                value: "warm".into()
            }
        );
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = EngineConfig::from_lookup(lookup(&[("CHECKLIST_API_KEY", "sk-secret")])).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn server_defaults_and_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.addr().to_string(), "127.0.0.1:8088");

        let config = ServerConfig::from_lookup(lookup(&[
            ("CHECKLIST_HOST", "0.0.0.0"),
            ("CHECKLIST_PORT", "9000"),
        ]))
        .unwrap();
        assert_eq!(config.addr().to_string(), "0.0.0.0:9000");

        assert!(ServerConfig::from_lookup(lookup(&[("CHECKLIST_HOST", "localhost:80")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("CHECKLIST_PORT", "0")])).is_err());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }
}
