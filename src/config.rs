//! Configuration surface for the reasoning engine
//!
//! Every option has a default; a config deserialized from a partial
//! document is usable as-is. `validate` rejects values the engine cannot
//! run with.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::ConfigError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowMindConfig {
    /// Model name sent to the generation and embeddings endpoints.
    pub ollama_model: String,
    /// Base URL of the chat endpoint (`{base}/api/generate`,
    /// `{base}/api/embeddings`).
    pub ollama_api_base_url: String,
    /// HTTP timeout for a single LLM request, in milliseconds.
    pub llm_request_timeout_millis: u64,
    /// Number of concurrent worker tasks.
    pub num_workers: usize,
    /// Default result cap for memory similarity searches.
    pub memory_search_limit: usize,
    /// Retries before a failing thought goes terminal.
    pub max_retries: u32,
    /// Worker idle sleep when no PENDING thought is available.
    pub poll_interval_millis: u64,
    /// Upper bound on a single thought's processing attempt.
    pub thought_processing_timeout_millis: u64,
    /// Refresh hint for front-ends; the engine only round-trips it.
    pub ui_refresh_millis: u64,
    /// Snapshot file location.
    pub persistence_file_path: PathBuf,
    /// Interval between periodic snapshots.
    pub persistence_interval_millis: u64,
    /// Exponential belief decay toward the prior, per millisecond.
    /// Zero disables decay.
    pub belief_decay_rate_per_millis: f64,
    /// Weight multiplier for embedding similarity to the current
    /// context. Zero disables the boost.
    pub context_similarity_boost_factor: f64,
    /// Validate tool parameters against schemas before dispatch.
    pub enable_schema_validation: bool,
}

impl Default for FlowMindConfig {
    fn default() -> Self {
        Self {
            ollama_model: "llama3".to_string(),
            ollama_api_base_url: "http://localhost:11434".to_string(),
            llm_request_timeout_millis: 120_000,
            num_workers: 2,
            memory_search_limit: 5,
            max_retries: 2,
            poll_interval_millis: 100,
            thought_processing_timeout_millis: 30_000,
            ui_refresh_millis: 1_000,
            persistence_file_path: PathBuf::from("flowmind_state.json"),
            persistence_interval_millis: 30_000,
            belief_decay_rate_per_millis: 0.0,
            context_similarity_boost_factor: 0.0,
            enable_schema_validation: true,
        }
    }
}

impl FlowMindConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "num_workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.thought_processing_timeout_millis == 0 {
            return Err(ConfigError::InvalidValue {
                key: "thought_processing_timeout_millis".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.belief_decay_rate_per_millis < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "belief_decay_rate_per_millis".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        if self.context_similarity_boost_factor < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "context_similarity_boost_factor".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        if self.ollama_api_base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ollama_api_base_url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn thought_processing_timeout(&self) -> Duration {
        Duration::from_millis(self.thought_processing_timeout_millis)
    }

    pub fn persistence_interval(&self) -> Duration {
        Duration::from_millis(self.persistence_interval_millis)
    }

    pub fn llm_request_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_request_timeout_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FlowMindConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: FlowMindConfig =
            serde_json::from_str(r#"{"num_workers": 7, "ollama_model": "qwen"}"#).unwrap();
        assert_eq!(config.num_workers, 7);
        assert_eq!(config.ollama_model, "qwen");
        assert_eq!(config.max_retries, FlowMindConfig::default().max_retries);
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let config = FlowMindConfig {
            num_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_decay() {
        let config = FlowMindConfig {
            belief_decay_rate_per_millis: -0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
