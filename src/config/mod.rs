use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Runtime configuration, loaded from `SLIPSTREAM_*` environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between tracked image scans across providers
    pub scan_interval: u64,
    /// Schedule applied when a tracked image does not set its own
    pub default_schedule: String,
    /// Hours before a pending approval expires
    pub approval_deadline_hours: i64,
    /// Docker config.json to read registry credentials from
    pub docker_config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_interval: 55,
            default_schedule: "@every 1m".to_string(),
            approval_deadline_hours: 24,
            docker_config_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        let config = Self::from_map(&env);
        debug!(?config, "configuration loaded");
        config
    }

    fn from_map(env: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            scan_interval: parse_u64(env, "SLIPSTREAM_SCAN_INTERVAL", defaults.scan_interval),
            default_schedule: parse_string(
                env,
                "SLIPSTREAM_DEFAULT_SCHEDULE",
                &defaults.default_schedule,
            ),
            approval_deadline_hours: parse_i64(
                env,
                "SLIPSTREAM_APPROVAL_DEADLINE_HOURS",
                defaults.approval_deadline_hours,
            ),
            docker_config_path: env
                .get("SLIPSTREAM_DOCKER_CONFIG")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .or_else(default_docker_config),
        }
    }
}

fn default_docker_config() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".docker/config.json"))
}

fn parse_string(env: &HashMap<String, String>, key: &str, default: &str) -> String {
    env.get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn parse_u64(env: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    env.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_i64(env: &HashMap<String, String>, key: &str, default: i64) -> i64 {
    env.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
