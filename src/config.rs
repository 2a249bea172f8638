//! Runtime settings loaded from a TOML file with serde-default fallbacks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level settings for the agent runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub agent: LoopSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }
}

/// Graph store connection and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Transactional query endpoint, e.g. `http://localhost:7474`.
    #[serde(default = "GatewaySettings::default_endpoint")]
    pub endpoint: String,

    #[serde(default = "GatewaySettings::default_database")]
    pub database: String,

    /// Per-call deadline in milliseconds.
    #[serde(default = "GatewaySettings::default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Bounded retry attempts for transient faults, applied by the
    /// dispatcher, never inside analytical tools.
    #[serde(default = "GatewaySettings::default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base delay for exponential backoff between retries.
    #[serde(default = "GatewaySettings::default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl GatewaySettings {
    fn default_endpoint() -> String {
        "http://localhost:7474".to_string()
    }

    fn default_database() -> String {
        "neo4j".to_string()
    }

    fn default_query_timeout_ms() -> u64 {
        15_000
    }

    fn default_retry_attempts() -> u32 {
        2
    }

    fn default_retry_base_delay_ms() -> u64 {
        250
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        toml::from_str("").expect("empty gateway settings must deserialize")
    }
}

/// Which node properties the shared full-text index covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "IndexSettings::default_name")]
    pub name: String,

    /// Node label whose properties get indexed.
    #[serde(default = "IndexSettings::default_label")]
    pub label: String,

    #[serde(default = "IndexSettings::default_fields")]
    pub fields: Vec<String>,

    #[serde(default = "IndexSettings::default_top_k")]
    pub default_top_k: usize,
}

impl IndexSettings {
    fn default_name() -> String {
        "supply_names".to_string()
    }

    fn default_label() -> String {
        "Entity".to_string()
    }

    fn default_fields() -> Vec<String> {
        vec!["name".to_string()]
    }

    fn default_top_k() -> usize {
        10
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        toml::from_str("").expect("empty index settings must deserialize")
    }
}

/// Reasoning-loop budgets and fan-out bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSettings {
    #[serde(default = "LoopSettings::default_max_iterations")]
    pub max_iterations: usize,

    /// Hard wall-clock limit for a whole session, in seconds.
    #[serde(default = "LoopSettings::default_hard_timeout_secs")]
    pub hard_timeout_secs: u64,

    /// Worker-pool bound for tool calls requested within one reasoning step.
    #[serde(default = "LoopSettings::default_tool_concurrency")]
    pub tool_concurrency: usize,

    /// Character budget for the transcript presented to the reasoning
    /// service; older events are dropped from the front.
    #[serde(default = "LoopSettings::default_max_transcript_chars")]
    pub max_transcript_chars: usize,
}

impl LoopSettings {
    fn default_max_iterations() -> usize {
        10
    }

    fn default_hard_timeout_secs() -> u64 {
        120
    }

    fn default_tool_concurrency() -> usize {
        4
    }

    fn default_max_transcript_chars() -> usize {
        120_000
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.hard_timeout_secs)
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        toml::from_str("").expect("empty loop settings must deserialize")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "LoggingSettings::default_level")]
    pub level: String,
}

impl LoggingSettings {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        toml::from_str("").expect("empty logging settings must deserialize")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let settings = Settings::default();
        assert_eq!(settings.agent.max_iterations, 10);
        assert_eq!(settings.agent.tool_concurrency, 4);
        assert_eq!(settings.gateway.retry_attempts, 2);
        assert_eq!(settings.index.fields, vec!["name".to_string()]);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let settings: Settings = toml::from_str(
            r#"
            [agent]
            max_iterations = 3

            [index]
            label = "Product"
            fields = ["name", "synonyms"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.agent.max_iterations, 3);
        assert_eq!(settings.agent.tool_concurrency, 4);
        assert_eq!(settings.index.label, "Product");
        assert_eq!(settings.gateway.database, "neo4j");
    }
}
