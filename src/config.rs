use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "FLOCK";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/".into()
}

fn default_user_agent() -> String {
    format!("flock/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(20)
}

/// Session credential injected from outside; the login flow that issues it
/// is not part of this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix));

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.backend.base_url.is_empty() && other.backend.base_url != default_base_url() {
        base.backend.base_url = other.backend.base_url;
    }
    if !other.backend.user_agent.is_empty() && other.backend.user_agent != default_user_agent() {
        base.backend.user_agent = other.backend.user_agent;
    }
    if other.backend.request_timeout != default_request_timeout() {
        base.backend.request_timeout = other.backend.request_timeout;
    }
    if !other.session.token.is_empty() {
        base.session.token = other.session.token;
    }
    base
}

fn load_env(prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    let mut cfg = Config::default();
    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }
    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.base_url" => cfg.backend.base_url = value,
        "backend.user_agent" => cfg.backend.user_agent = value,
        "backend.request_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.backend.request_timeout = duration;
            }
        }
        "session.token" | "token" => cfg.session.token = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("flock").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("config.yaml");
        let cfg = load(LoadOptions {
            config_file: Some(missing),
            env_prefix: Some("FLOCK_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.backend.base_url, "http://localhost:8080/");
        assert_eq!(cfg.backend.request_timeout, Duration::from_secs(20));
        assert!(cfg.session.token.is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "backend:\n  base_url: https://feed.example.com/\n  request_timeout: 5s\nsession:\n  token: tok123\n",
        )
        .unwrap();

        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("FLOCK_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.backend.base_url, "https://feed.example.com/");
        assert_eq!(cfg.backend.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.session.token, "tok123");
    }

    #[test]
    fn env_overrides() {
        env::set_var("FLOCK_TESTENV_BACKEND__BASE_URL", "https://env.example.com/");
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("config.yaml")),
            env_prefix: Some("FLOCK_TESTENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.backend.base_url, "https://env.example.com/");
        env::remove_var("FLOCK_TESTENV_BACKEND__BASE_URL");
    }
}
