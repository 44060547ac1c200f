//! Guideline synthesis: metric guidelines from discovery plus judging, and
//! output-shape constraint guidelines from reference statistics.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::constraints::{
    compute_linguistic_statistics, compute_statistics, format_average_constraint,
    format_range_constraint, ConstraintError, ConstraintStatistics, LinguisticStatistics,
};
use crate::dataset::ValidationItem;
use crate::discovery::{DiscoveryError, DiscoveryOptions, MetricDiscovery};
use crate::gateway::{GenerateOptions, TextGenerator};
use crate::judge::{JudgeAggregator, JudgeOptions, ScoreProfile};
use crate::prompts;
use crate::text::TextAnalyzer;

/// Metric guideline used when there is no validation data.
pub const DEFAULT_METRIC_GUIDELINE: &str =
    "Focus on accuracy, clarity, and relevance for the task.";

/// Constraint guideline used when there is no validation data.
pub const DEFAULT_CONSTRAINT_GUIDELINE: &str =
    "Your response should be well-structured and appropriate for the task.";

const QUALITY_DESCRIPTION_TOKENS: u32 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum GuidelineError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error("failed to write {path}: {source}")]
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

// =============================================================================
// Metric guidelines
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricGuideline {
    pub metrics: Vec<String>,
    pub definitions: String,
    pub profile: Option<ScoreProfile>,
    pub text: String,
}

/// Discover metrics, score them with the judge, and describe expected quality.
pub struct MetricsGuidelines<'a> {
    generator: &'a dyn TextGenerator,
    task_type: String,
    discovery: DiscoveryOptions,
    judge: JudgeOptions,
    generate: GenerateOptions,
    rng_seed: Option<u64>,
}

impl<'a> MetricsGuidelines<'a> {
    pub fn new(generator: &'a dyn TextGenerator, task_type: impl Into<String>) -> Self {
        Self {
            generator,
            task_type: task_type.into(),
            discovery: DiscoveryOptions::default(),
            judge: JudgeOptions::default(),
            generate: GenerateOptions::default(),
            rng_seed: None,
        }
    }

    pub fn discovery(mut self, options: DiscoveryOptions) -> Self {
        self.discovery = options;
        self
    }

    pub fn judge(mut self, options: JudgeOptions) -> Self {
        self.judge = options;
        self
    }

    pub fn generate_options(mut self, opts: GenerateOptions) -> Self {
        self.generate = opts;
        self
    }

    pub fn rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    pub async fn build(&self, items: &[ValidationItem]) -> Result<MetricGuideline, GuidelineError> {
        if items.is_empty() {
            return Ok(MetricGuideline {
                metrics: Vec::new(),
                definitions: String::new(),
                profile: None,
                text: DEFAULT_METRIC_GUIDELINE.to_string(),
            });
        }

        let metrics = MetricDiscovery::new(self.generator, self.task_type.clone())
            .generate_options(self.generate)
            .max_output_tokens(self.discovery.max_output_tokens)
            .rng_seed(self.rng_seed)
            .discover(items, self.discovery.batch_size, self.discovery.iterations)
            .await?;

        let (definitions, profile) = JudgeAggregator::new(self.generator, self.task_type.clone())
            .options(self.judge.clone())
            .generate_options(self.generate)
            .rng_seed(self.rng_seed)
            .aggregate(items, &metrics)
            .await;

        let text = self.describe_quality(&metrics, &profile.scores).await;
        info!(
            task_type = %self.task_type,
            metrics = metrics.len(),
            guideline_chars = text.len(),
            "metric guideline ready"
        );

        Ok(MetricGuideline {
            metrics,
            definitions,
            profile: Some(profile),
            text,
        })
    }

    /// Natural-language expected quality per metric.
    pub async fn describe_quality(&self, metrics: &[String], scores: &BTreeMap<String, f64>) -> String {
        let prompt = prompts::quality_descriptions(&self.task_type, metrics, scores);
        let raw = self
            .generator
            .generate(&prompt, self.generate.max_output_tokens(QUALITY_DESCRIPTION_TOKENS))
            .await;
        strip_preamble(&raw)
    }
}

/// Keep only the second paragraph when the reply has a blank-line break.
pub fn strip_preamble(raw: &str) -> String {
    match raw.split("\n\n").nth(1) {
        Some(body) => body.trim().to_string(),
        None => raw.to_string(),
    }
}

// =============================================================================
// Output constraint guidelines
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintForm {
    /// Min/max/average sentence and word counts.
    #[default]
    Range,
    /// Average sentences and words only.
    Average,
}

impl std::str::FromStr for ConstraintForm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "range" => Ok(Self::Range),
            "average" | "avg" => Ok(Self::Average),
            other => Err(format!("unknown constraint form: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum ConstraintSummary {
    Range(ConstraintStatistics),
    Average(LinguisticStatistics),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintGuideline {
    pub statistics: Option<ConstraintSummary>,
    pub text: String,
}

pub struct OutputConstraintsGuidelines<'a> {
    analyzer: &'a dyn TextAnalyzer,
    form: ConstraintForm,
    limit: Option<usize>,
}

impl<'a> OutputConstraintsGuidelines<'a> {
    pub fn new(analyzer: &'a dyn TextAnalyzer) -> Self {
        Self {
            analyzer,
            form: ConstraintForm::default(),
            limit: None,
        }
    }

    pub fn form(mut self, form: ConstraintForm) -> Self {
        self.form = form;
        self
    }

    /// Only the first `n` items contribute.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn build(&self, items: &[ValidationItem]) -> Result<ConstraintGuideline, GuidelineError> {
        let take = self.limit.unwrap_or(items.len()).min(items.len());
        let outputs: Vec<&str> = items[..take]
            .iter()
            .map(ValidationItem::statistics_text)
            .collect();
        if outputs.is_empty() {
            return Ok(ConstraintGuideline {
                statistics: None,
                text: DEFAULT_CONSTRAINT_GUIDELINE.to_string(),
            });
        }

        let (statistics, text) = match self.form {
            ConstraintForm::Range => {
                let stats = compute_statistics(&outputs, self.analyzer)?;
                (ConstraintSummary::Range(stats), format_range_constraint(&stats))
            }
            ConstraintForm::Average => {
                let stats = compute_linguistic_statistics(&outputs, self.analyzer)?;
                let text = format_average_constraint(&stats);
                (ConstraintSummary::Average(stats), text)
            }
        };

        Ok(ConstraintGuideline {
            statistics: Some(statistics),
            text,
        })
    }
}

// =============================================================================
// Report
// =============================================================================

/// Persisted result of one guideline synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineReport {
    pub id: Uuid,
    pub created_at: String,
    pub task_type: String,
    pub model: String,
    pub metrics: Vec<String>,
    pub scores: BTreeMap<String, f64>,
    pub metric_guideline: String,
    pub statistics: Option<ConstraintSummary>,
    pub constraint_guideline: String,
}

impl GuidelineReport {
    pub fn new(
        task_type: impl Into<String>,
        model: impl Into<String>,
        metric: MetricGuideline,
        constraint: ConstraintGuideline,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now().to_rfc3339(),
            task_type: task_type.into(),
            model: model.into(),
            metrics: metric.metrics,
            scores: metric.profile.map(|p| p.scores).unwrap_or_default(),
            metric_guideline: metric.text,
            statistics: constraint.statistics,
            constraint_guideline: constraint.text,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GuidelineError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| GuidelineError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| GuidelineError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GuidelineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| GuidelineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| GuidelineError::Decode {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::RuleBasedAnalyzer;

    #[test]
    fn preamble_is_dropped() {
        let raw = "Sure! Here are the descriptions.\n\n- Clarity: crisp.\n- Brevity: short.  \n\nHope it helps.";
        assert_eq!(strip_preamble(raw), "- Clarity: crisp.\n- Brevity: short.");
    }

    #[test]
    fn single_paragraph_is_kept() {
        assert_eq!(strip_preamble("- Clarity: crisp."), "- Clarity: crisp.");
        assert_eq!(strip_preamble(""), "");
    }

    #[test]
    fn constraint_guideline_defaults_without_data() {
        let analyzer = RuleBasedAnalyzer;
        let g = OutputConstraintsGuidelines::new(&analyzer).build(&[]).unwrap();
        assert_eq!(g.text, DEFAULT_CONSTRAINT_GUIDELINE);
        assert!(g.statistics.is_none());
    }

    #[test]
    fn constraint_guideline_respects_limit_and_form() {
        let analyzer = RuleBasedAnalyzer;
        let items = vec![
            ValidationItem::new("a", "One. Two."),
            ValidationItem::new("b", "One two three four five six seven eight nine ten."),
        ];

        let range = OutputConstraintsGuidelines::new(&analyzer)
            .limit(Some(1))
            .build(&items)
            .unwrap();
        assert!(range.text.starts_with("The output must have from 2 to 2 sentences"));

        let avg = OutputConstraintsGuidelines::new(&analyzer)
            .form(ConstraintForm::Average)
            .build(&items)
            .unwrap();
        assert!(matches!(avg.statistics, Some(ConstraintSummary::Average(_))));
        assert!(avg.text.starts_with("Your response must have 1 sentences"));
    }

    #[test]
    fn constraint_statistics_read_output_over_reference() {
        let analyzer = RuleBasedAnalyzer;
        let items: Vec<ValidationItem> = serde_json::from_str(
            r#"[{"input": "a", "reference": "One. Two. Three.", "output": "Only one."}]"#,
        )
        .unwrap();

        let g = OutputConstraintsGuidelines::new(&analyzer).build(&items).unwrap();
        assert!(g.text.starts_with("The output must have from 1 to 1 sentences"));
    }

    #[test]
    fn report_round_trips_through_disk() {
        let metric = MetricGuideline {
            metrics: vec!["Clarity".into()],
            definitions: String::new(),
            profile: Some(ScoreProfile {
                scores: BTreeMap::from([("Clarity".to_string(), 4.5)]),
                evaluated: 2,
                valid_responses: 2,
            }),
            text: "- Clarity: crisp.".into(),
        };
        let constraint = ConstraintGuideline {
            statistics: None,
            text: DEFAULT_CONSTRAINT_GUIDELINE.into(),
        };
        let report = GuidelineReport::new("summarization", "gpt-4o-mini", metric, constraint);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guidelines.json");
        report.save(&path).unwrap();
        let loaded = GuidelineReport::load(&path).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.scores["Clarity"], 4.5);
    }
}
