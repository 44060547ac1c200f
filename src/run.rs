//! Guided generation over a dataset.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::ValidationItem;
use crate::gateway::{GenerateOptions, TextGenerator};
use crate::prompts::{task_instruction, task_prompt, TaskPromptVariant};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
}

/// One guided generation and the target it will be scored against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub input: String,
    pub target: String,
    pub prompt: String,
    pub generated: String,
}

pub struct GenerationRun<'a> {
    generator: &'a dyn TextGenerator,
    instruction: String,
    variant: TaskPromptVariant,
    generate: GenerateOptions,
}

impl<'a> GenerationRun<'a> {
    /// Uses the default instruction for `task_type`.
    pub fn new(generator: &'a dyn TextGenerator, task_type: &str) -> Self {
        Self {
            generator,
            instruction: task_instruction(task_type).to_string(),
            variant: TaskPromptVariant::Full,
            generate: GenerateOptions::default(),
        }
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn variant(mut self, variant: TaskPromptVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn generate_options(mut self, opts: GenerateOptions) -> Self {
        self.generate = opts;
        self
    }

    /// Generate one output per item. Failed generations are kept as `""`.
    pub async fn run(
        &self,
        items: &[ValidationItem],
        metric_guideline: &str,
        constraint_guideline: &str,
    ) -> Vec<GenerationRecord> {
        let total = items.len();
        let mut records = Vec::with_capacity(total);

        for (idx, item) in items.iter().enumerate() {
            let prompt = task_prompt(
                self.variant,
                &self.instruction,
                metric_guideline,
                constraint_guideline,
                &item.input,
            );
            let generated = self.generator.generate(&prompt, self.generate).await;
            if generated.is_empty() {
                warn!(item = idx + 1, total, "generation produced no content");
            } else {
                info!(item = idx + 1, total, "generated");
            }
            records.push(GenerationRecord {
                input: item.input.clone(),
                target: item.reference.clone(),
                prompt,
                generated,
            });
        }

        info!(variant = self.variant.as_str(), records = records.len(), "generation run finished");
        records
    }
}

pub fn save_records(path: impl AsRef<Path>, records: &[GenerationRecord]) -> Result<(), RunError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(records).map_err(|source| RunError::Decode {
        path: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| RunError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<GenerationRecord>, RunError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| RunError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| RunError::Decode {
        path: path.display().to_string(),
        source,
    })
}
