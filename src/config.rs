use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorDetails};

/// Frozen configuration snapshot. Loaded once at startup and shared
/// immutably by every request flow.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: HashMap<String, ProviderConfig>,
    /// logical model name => ordered fallback chain
    pub models: HashMap<String, Vec<ModelTarget>>,
    pub log_level: String,
    pub log_format: String,
    pub thresholds: ThresholdsConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Base URL for the provider (e.g. https://api.openai.com/v1)
    pub url: String,
    /// Bearer key; supports `${VAR}` expansion
    #[serde(rename = "apiKey", default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    /// Upstream wire dialect
    #[serde(default)]
    pub dialect: Dialect,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    OpenAI,
    Ollama,
}

/// One entry in a logical model's fallback chain.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelTarget {
    /// Provider name from the providers config
    pub provider: String,
    /// Model name on that provider
    pub model: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub failures_before_switch: u32,
    pub initial_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            providers: HashMap::from([(
                "local".to_string(),
                ProviderConfig {
                    url: "http://localhost:11434/v1".to_string(),
                    api_key: String::new(),
                    dialect: Dialect::OpenAI,
                },
            )]),
            models: HashMap::new(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            thresholds: ThresholdsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "localhost".to_string(),
            port: 11435,
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        ThresholdsConfig {
            failures_before_switch: 3,
            initial_timeout_ms: 10_000,
            max_timeout_ms: 300_000,
        }
    }
}

fn default_log_level() -> String {
    std::env::var("OPENMODEL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn default_log_format() -> String {
    std::env::var("OPENMODEL_LOG_FORMAT").unwrap_or_else(|_| "text".to_string())
}

/// Expands `${VAR}` references with environment values (empty if unset).
fn expand_env_vars(s: &str) -> String {
    let mut out = s.to_string();
    while let Some(start) = out.find("${") {
        let Some(end) = out[start..].find('}') else {
            break;
        };
        let end = start + end;
        let var_name = &out[start + 2..end];
        let value = std::env::var(var_name).unwrap_or_default();
        out = format!("{}{}{}", &out[..start], value, &out[end + 1..]);
    }
    out
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("OPENMODEL_CONFIG") {
        return Some(PathBuf::from(path));
    }
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("openmodel")
            .join("config.json")
    })
}

impl Config {
    /// Loads the configuration from `$OPENMODEL_CONFIG` (else
    /// `~/.config/openmodel/config.json`). A missing file yields the
    /// defaults.
    pub fn load() -> Result<Config, Error> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Config, Error> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to read config file {}: {e}", path.display()),
            })
        })?;
        let mut config: Config = serde_json::from_str(&data).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to parse config file {}: {e}", path.display()),
            })
        })?;

        for provider in config.providers.values_mut() {
            provider.url = expand_env_vars(&provider.url);
            provider.api_key = expand_env_vars(&provider.api_key);
        }

        // Env vars override file values
        if let Ok(level) = std::env::var("OPENMODEL_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(format) = std::env::var("OPENMODEL_LOG_FORMAT") {
            config.log_format = format;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.thresholds.failures_before_switch < 1 {
            return Err(Error::new(ErrorDetails::Config {
                message: "thresholds.failures_before_switch must be at least 1".to_string(),
            }));
        }
        if self.thresholds.initial_timeout_ms == 0 {
            return Err(Error::new(ErrorDetails::Config {
                message: "thresholds.initial_timeout_ms must be positive".to_string(),
            }));
        }
        if self.thresholds.max_timeout_ms < self.thresholds.initial_timeout_ms {
            return Err(Error::new(ErrorDetails::Config {
                message: "thresholds.max_timeout_ms must be at least initial_timeout_ms"
                    .to_string(),
            }));
        }
        for (model, chain) in &self.models {
            if chain.is_empty() {
                return Err(Error::new(ErrorDetails::Config {
                    message: format!("model {model:?} has an empty provider chain"),
                }));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 11435);
        assert_eq!(config.thresholds.failures_before_switch, 3);
        assert_eq!(config.thresholds.initial_timeout_ms, 10_000);
        assert_eq!(config.thresholds.max_timeout_ms, 300_000);
        assert_eq!(config.log_format, "text");
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("OPENMODEL_TEST_KEY", "sk-12345");
        assert_eq!(expand_env_vars("${OPENMODEL_TEST_KEY}"), "sk-12345");
        assert_eq!(
            expand_env_vars("prefix-${OPENMODEL_TEST_KEY}-suffix"),
            "prefix-sk-12345-suffix"
        );
        // Unset variables expand to the empty string
        assert_eq!(expand_env_vars("${OPENMODEL_TEST_UNSET_VAR}"), "");
        // Unterminated references are left alone
        assert_eq!(expand_env_vars("${OPENMODEL"), "${OPENMODEL");
        assert_eq!(expand_env_vars("no vars here"), "no vars here");
    }

    #[test]
    fn test_load_from_path() {
        std::env::set_var("OPENMODEL_TEST_API_KEY", "sk-test");
        let path = write_temp_config(
            "openmodel-config-test.json",
            r#"{
                "server": {"host": "0.0.0.0", "port": 9000},
                "providers": {
                    "openai": {"url": "https://api.openai.com/v1", "apiKey": "${OPENMODEL_TEST_API_KEY}"},
                    "local": {"url": "http://localhost:11434", "dialect": "ollama"}
                },
                "models": {
                    "default": [
                        {"provider": "openai", "model": "gpt-4o-mini"},
                        {"provider": "local", "model": "llama3.2"}
                    ]
                },
                "thresholds": {"failures_before_switch": 2, "initial_timeout_ms": 5000, "max_timeout_ms": 60000}
            }"#,
        );

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.providers["openai"].api_key, "sk-test");
        assert_eq!(config.providers["local"].dialect, Dialect::Ollama);
        assert_eq!(config.providers["openai"].dialect, Dialect::OpenAI);
        assert_eq!(
            config.models["default"],
            vec![
                ModelTarget {
                    provider: "openai".to_string(),
                    model: "gpt-4o-mini".to_string(),
                },
                ModelTarget {
                    provider: "local".to_string(),
                    model: "llama3.2".to_string(),
                },
            ]
        );
        assert_eq!(config.thresholds.failures_before_switch, 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_round_trip() {
        let path = write_temp_config(
            "openmodel-config-roundtrip.json",
            r#"{
                "providers": {"p1": {"url": "http://localhost:8000/v1"}},
                "models": {"m": [{"provider": "p1", "model": "upstream"}]}
            }"#,
        );
        let config = Config::load_from_path(&path).unwrap();
        let serialized = serde_json::to_string(&config).unwrap();
        let reloaded: Config = serde_json::from_str(&serialized).unwrap();
        assert_eq!(reloaded.server.port, config.server.port);
        assert_eq!(reloaded.models["m"], config.models["m"]);
        assert_eq!(
            reloaded.thresholds.failures_before_switch,
            config.thresholds.failures_before_switch
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let path = write_temp_config(
            "openmodel-config-bad.json",
            r#"{"thresholds": {"failures_before_switch": 0}}"#,
        );
        assert!(Config::load_from_path(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_validate_rejects_empty_chain() {
        let path = write_temp_config("openmodel-config-empty-chain.json", r#"{"models": {"m": []}}"#);
        assert!(Config::load_from_path(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
