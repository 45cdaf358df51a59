use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

/// Engine settings, layered defaults -> optional JSON file -> environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on planning rounds per run before the run is failed.
    pub max_rounds: u32,
    pub planner_max_retries: u32,
    pub planner_backoff_ms: u64,
    pub tool_timeout_ms: u64,
    /// Bearer key the gateway checks on every invocation.
    pub api_key: String,
    pub data_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: 4,
            planner_max_retries: 2,
            planner_backoff_ms: 50,
            tool_timeout_ms: 5_000,
            api_key: "dev-key".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl EngineConfig {
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            if path.exists() {
                let raw = fs::read_to_string(path).await?;
                config = serde_json::from_str(&raw)?;
            }
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Environment layer, highest precedence. Lookup is injected so tests
    /// do not mutate process-global state.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("OPSMITH_MAX_ROUNDS").and_then(|v| v.parse().ok()) {
            self.max_rounds = v;
        }
        if let Some(v) = lookup("OPSMITH_PLANNER_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.planner_max_retries = v;
        }
        if let Some(v) = lookup("OPSMITH_PLANNER_BACKOFF_MS").and_then(|v| v.parse().ok()) {
            self.planner_backoff_ms = v;
        }
        if let Some(v) = lookup("OPSMITH_TOOL_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.tool_timeout_ms = v;
        }
        if let Some(v) = lookup("OPSMITH_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = lookup("OPSMITH_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_apply_without_file() {
        let config = EngineConfig::load(None).await.unwrap();
        assert_eq!(config.max_rounds, 4);
        assert_eq!(config.tool_timeout_ms, 5_000);
    }

    #[tokio::test]
    async fn file_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"max_rounds": 2, "api_key": "file-key"}"#).unwrap();
        let config = EngineConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.max_rounds, 2);
        assert_eq!(config.api_key, "file-key");
        // Untouched fields keep their defaults.
        assert_eq!(config.planner_max_retries, 2);
    }

    #[test]
    fn env_layer_wins_over_file_values() {
        let mut config = EngineConfig {
            max_rounds: 2,
            ..EngineConfig::default()
        };
        config.apply_env(|key| match key {
            "OPSMITH_MAX_ROUNDS" => Some("9".to_string()),
            "OPSMITH_API_KEY" => Some("env-key".to_string()),
            _ => None,
        });
        assert_eq!(config.max_rounds, 9);
        assert_eq!(config.api_key, "env-key");
    }

    #[test]
    fn unparseable_env_value_is_ignored() {
        let mut config = EngineConfig::default();
        config.apply_env(|key| {
            (key == "OPSMITH_MAX_ROUNDS").then(|| "not-a-number".to_string())
        });
        assert_eq!(config.max_rounds, 4);
    }
}
