//! Run configuration loaded from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryOptions;
use crate::gateway::{
    GatewayConfig, GenerateOptions, DEFAULT_FALLBACK_MODEL, DEFAULT_MAX_OUTPUT_TOKENS,
    DEFAULT_MAX_RETRIES, DEFAULT_TEMPERATURE,
};
use crate::guidelines::ConstraintForm;
use crate::judge::JudgeOptions;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_task_type() -> String {
    "summarization".to_string()
}

fn default_model_name() -> String {
    DEFAULT_FALLBACK_MODEL.to_string()
}

fn default_fallback_model() -> String {
    DEFAULT_FALLBACK_MODEL.to_string()
}

fn default_sample_size() -> Option<usize> {
    Some(10)
}

fn default_max_output_tokens() -> u32 {
    DEFAULT_MAX_OUTPUT_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintOptions {
    /// Leading items used for statistics; `null` uses every item.
    #[serde(default = "default_sample_size")]
    pub sample_size: Option<usize>,
    #[serde(default)]
    pub form: ConstraintForm,
}

impl Default for ConstraintOptions {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            form: ConstraintForm::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            fallback_model: default_fallback_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideConfig {
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Overrides the default instruction for `task_type` in task prompts.
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub discovery: DiscoveryOptions,
    #[serde(default)]
    pub judge: JudgeOptions,
    #[serde(default)]
    pub constraints: ConstraintOptions,
    #[serde(default)]
    pub generation: GenerationOptions,
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            task_type: default_task_type(),
            model_name: default_model_name(),
            instruction: None,
            discovery: DiscoveryOptions::default(),
            judge: JudgeOptions::default(),
            constraints: ConstraintOptions::default(),
            generation: GenerationOptions::default(),
            rng_seed: None,
        }
    }
}

impl GuideConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_type.trim().is_empty() {
            return Err(ConfigError::Invalid("task_type must not be empty".into()));
        }
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid("model_name must not be empty".into()));
        }
        if self.discovery.batch_size == 0 {
            return Err(ConfigError::Invalid("discovery.batch_size must be > 0".into()));
        }
        if self.judge.concurrency == 0 {
            return Err(ConfigError::Invalid("judge.concurrency must be > 0".into()));
        }
        if self.constraints.sample_size == Some(0) {
            return Err(ConfigError::Invalid("constraints.sample_size must be > 0".into()));
        }
        let t = self.generation.temperature;
        if !(0.0..=2.0).contains(&t) {
            return Err(ConfigError::Invalid(format!(
                "generation.temperature must be within [0, 2], got {t}"
            )));
        }
        Ok(())
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions::default()
            .max_output_tokens(self.generation.max_output_tokens)
            .temperature(self.generation.temperature)
            .max_retries(self.generation.max_retries)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            retry_base_delay: Duration::from_millis(self.generation.retry_base_delay_ms),
            fallback_model: self.generation.fallback_model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg: GuideConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.task_type, "summarization");
        assert_eq!(cfg.model_name, "gpt-3.5-turbo");
        assert_eq!(cfg.discovery.batch_size, 10);
        assert_eq!(cfg.judge.concurrency, 1);
        assert_eq!(cfg.constraints.sample_size, Some(10));
        assert_eq!(cfg.constraints.form, ConstraintForm::Range);
        assert_eq!(cfg.generation.max_retries, 3);
        assert_eq!(cfg.gateway_config().retry_base_delay, Duration::from_secs(1));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_sections_fill_in() {
        let cfg: GuideConfig = serde_json::from_str(
            r#"{"task_type": "translation", "discovery": {"iterations": 5}, "constraints": {"form": "average"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.discovery.iterations, 5);
        assert_eq!(cfg.discovery.batch_size, 10);
        assert_eq!(cfg.constraints.form, ConstraintForm::Average);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = GuideConfig::default();
        cfg.discovery.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = GuideConfig::default();
        cfg.judge.concurrency = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = GuideConfig::default();
        cfg.generation.temperature = 2.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"model_name": "claude-3-haiku", "rng_seed": 7}"#).unwrap();
        let cfg = GuideConfig::load(&path).unwrap();
        assert_eq!(cfg.rng_seed, Some(7));

        std::fs::write(&path, r#"{"judge": {"concurrency": 0}}"#).unwrap();
        assert!(matches!(GuideConfig::load(&path), Err(ConfigError::Invalid(_))));
    }
}
