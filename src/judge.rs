//! Judge-model scoring of reference outputs against a fixed metric set.

use std::collections::{BTreeMap, BTreeSet};

use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::dataset::ValidationItem;
use crate::gateway::{GenerateOptions, TextGenerator};
use crate::payload::{parse_json_block, PayloadError};
use crate::prompts;

/// Score assigned to every metric when no judge response parses.
pub const OPTIMISTIC_DEFAULT: f64 = 5.0;

const SCORE_MIN: f64 = 1.0;
const SCORE_MAX: f64 = 5.0;

fn default_concurrency() -> usize {
    1
}

fn default_judge_tokens() -> u32 {
    512
}

fn default_definition_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeOptions {
    /// Judge calls in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_judge_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_definition_tokens")]
    pub definition_tokens: u32,
}

impl Default for JudgeOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_output_tokens: default_judge_tokens(),
            definition_tokens: default_definition_tokens(),
        }
    }
}

/// Per-metric consensus scores from one aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreProfile {
    pub scores: BTreeMap<String, f64>,
    pub evaluated: usize,
    pub valid_responses: usize,
}

impl ScoreProfile {
    pub fn is_default(&self) -> bool {
        self.valid_responses == 0
    }
}

/// Why a judge reply was not counted.
#[derive(Debug, thiserror::Error)]
pub enum JudgeReplyError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("score for {metric} is not a number in [1, 5]: {value}")]
    OutOfRange { metric: String, value: Value },
    #[error("reply has no score for {0}")]
    MissingMetric(String),
}

/// Running totals folded from judge replies.
#[derive(Debug, Clone)]
pub struct ScoreAccumulator {
    totals: BTreeMap<String, f64>,
    valid: usize,
    seen: usize,
}

impl ScoreAccumulator {
    pub fn new(metrics: &[String]) -> Self {
        Self {
            totals: metrics.iter().map(|m| (m.clone(), 0.0)).collect(),
            valid: 0,
            seen: 0,
        }
    }

    /// Fold one parsed reply. Unknown keys are ignored; a failed reply
    /// counts as seen but contributes nothing.
    pub fn absorb(mut self, reply: Result<BTreeMap<String, f64>, JudgeReplyError>) -> Self {
        self.seen += 1;
        match reply {
            Ok(scores) => {
                for (metric, score) in scores {
                    if let Some(total) = self.totals.get_mut(&metric) {
                        *total += score;
                    }
                }
                self.valid += 1;
            }
            Err(err) => {
                debug!(error = %err, "judge reply skipped");
            }
        }
        self
    }

    pub fn finish(self) -> ScoreProfile {
        let valid = self.valid;
        let scores = self
            .totals
            .into_iter()
            .map(|(metric, total)| {
                let score = if valid == 0 {
                    OPTIMISTIC_DEFAULT
                } else {
                    total / valid as f64
                };
                (metric, score)
            })
            .collect();
        ScoreProfile {
            scores,
            evaluated: self.seen,
            valid_responses: valid,
        }
    }
}

/// Decode a judge reply into the scores for `requested` metrics.
///
/// A requested metric that is missing, or whose value is not a number
/// within [1, 5], rejects the whole reply.
pub fn parse_judge_reply(
    raw: &str,
    requested: &BTreeSet<&str>,
) -> Result<BTreeMap<String, f64>, JudgeReplyError> {
    let object: Map<String, Value> = parse_json_block(raw)?;
    let mut scores = BTreeMap::new();
    for (metric, value) in object {
        if !requested.contains(metric.as_str()) {
            continue;
        }
        match value.as_f64() {
            Some(score) if (SCORE_MIN..=SCORE_MAX).contains(&score) => {
                scores.insert(metric, score);
            }
            _ => return Err(JudgeReplyError::OutOfRange { metric, value }),
        }
    }
    if let Some(missing) = requested.iter().find(|m| !scores.contains_key(**m)) {
        return Err(JudgeReplyError::MissingMetric(missing.to_string()));
    }
    Ok(scores)
}

pub struct JudgeAggregator<'a> {
    generator: &'a dyn TextGenerator,
    task_type: String,
    options: JudgeOptions,
    generate: GenerateOptions,
    rng_seed: Option<u64>,
}

impl<'a> JudgeAggregator<'a> {
    pub fn new(generator: &'a dyn TextGenerator, task_type: impl Into<String>) -> Self {
        Self {
            generator,
            task_type: task_type.into(),
            options: JudgeOptions::default(),
            generate: GenerateOptions::default(),
            rng_seed: None,
        }
    }

    pub fn options(mut self, options: JudgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Base options for judge calls; token limits come from [`JudgeOptions`].
    pub fn generate_options(mut self, opts: GenerateOptions) -> Self {
        self.generate = opts;
        self
    }

    pub fn rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Free-form definitions of every metric, used as judge grounding.
    pub async fn metric_definitions(&self, metrics: &[String]) -> String {
        let prompt = prompts::metric_definitions(&self.task_type, metrics);
        let opts = self.generate.max_output_tokens(self.options.definition_tokens);
        self.generator.generate(&prompt, opts).await
    }

    /// Score every item once, in shuffled order, and average valid replies.
    ///
    /// Returns the metric definitions alongside the profile.
    pub async fn aggregate(
        &self,
        items: &[ValidationItem],
        metrics: &[String],
    ) -> (String, ScoreProfile) {
        let definitions = self.metric_definitions(metrics).await;
        if definitions.is_empty() {
            warn!(task_type = %self.task_type, "metric definitions call returned no content");
        }

        let mut rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut order: Vec<&ValidationItem> = items.iter().collect();
        order.shuffle(&mut rng);

        let requested: BTreeSet<&str> = metrics.iter().map(String::as_str).collect();
        let opts = self.generate.max_output_tokens(self.options.max_output_tokens);

        let mut accumulator = ScoreAccumulator::new(metrics);
        if self.options.concurrency <= 1 {
            for item in order {
                let reply = self
                    .judge_item(item, metrics, &definitions, &requested, opts)
                    .await;
                accumulator = accumulator.absorb(reply);
            }
        } else {
            accumulator = stream::iter(order)
                .map(|item| self.judge_item(item, metrics, &definitions, &requested, opts))
                .buffer_unordered(self.options.concurrency)
                .fold(accumulator, |acc, reply| async move { acc.absorb(reply) })
                .await;
        }

        let profile = accumulator.finish();
        info!(
            task_type = %self.task_type,
            evaluated = profile.evaluated,
            valid = profile.valid_responses,
            "judge aggregation finished"
        );
        if profile.is_default() && profile.evaluated > 0 {
            warn!("no judge reply parsed, using optimistic default scores");
        }
        (definitions, profile)
    }

    async fn judge_item(
        &self,
        item: &ValidationItem,
        metrics: &[String],
        definitions: &str,
        requested: &BTreeSet<&str>,
        opts: GenerateOptions,
    ) -> Result<BTreeMap<String, f64>, JudgeReplyError> {
        let prompt = prompts::judge_scores(&self.task_type, item, metrics, definitions);
        let raw = self.generator.generate(&prompt, opts).await;
        parse_judge_reply(&raw, requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accumulator_averages_valid_replies() {
        let metrics = names(&["Clarity", "Brevity"]);
        let profile = ScoreAccumulator::new(&metrics)
            .absorb(Ok(BTreeMap::from([
                ("Clarity".to_string(), 4.0),
                ("Brevity".to_string(), 2.0),
            ])))
            .absorb(Ok(BTreeMap::from([
                ("Clarity".to_string(), 5.0),
                ("Brevity".to_string(), 3.0),
            ])))
            .absorb(Err(JudgeReplyError::Payload(PayloadError::MissingBlock)))
            .finish();

        assert_eq!(profile.scores["Clarity"], 4.5);
        assert_eq!(profile.scores["Brevity"], 2.5);
        assert_eq!(profile.evaluated, 3);
        assert_eq!(profile.valid_responses, 2);
    }

    #[test]
    fn accumulator_defaults_when_nothing_valid() {
        let metrics = names(&["Clarity"]);
        let profile = ScoreAccumulator::new(&metrics)
            .absorb(Err(JudgeReplyError::Payload(PayloadError::Empty)))
            .finish();
        assert_eq!(profile.scores["Clarity"], OPTIMISTIC_DEFAULT);
        assert!(profile.is_default());
    }

    #[test]
    fn reply_ignores_unknown_keys() {
        let requested = BTreeSet::from(["Clarity"]);
        let scores =
            parse_judge_reply("```json\n{\"Clarity\": 4, \"Humor\": 1}\n```", &requested).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["Clarity"], 4.0);
    }

    #[test]
    fn reply_rejects_out_of_range_and_non_numeric() {
        let requested = BTreeSet::from(["Clarity"]);
        assert!(matches!(
            parse_judge_reply("```json\n{\"Clarity\": 7}\n```", &requested),
            Err(JudgeReplyError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_judge_reply("```json\n{\"Clarity\": \"high\"}\n```", &requested),
            Err(JudgeReplyError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_judge_reply("```json\n[4]\n```", &requested),
            Err(JudgeReplyError::Payload(PayloadError::Decode(_)))
        ));
    }

    #[test]
    fn reply_missing_a_requested_metric_is_rejected() {
        let requested = BTreeSet::from(["Brevity", "Clarity"]);
        assert!(matches!(
            parse_judge_reply("```json\n{\"Clarity\": 4}\n```", &requested),
            Err(JudgeReplyError::MissingMetric(m)) if m == "Brevity"
        ));
    }

    #[test]
    fn options_defaults() {
        let opts: JudgeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.concurrency, 1);
        assert_eq!(opts.max_output_tokens, 512);
        assert_eq!(opts.definition_tokens, 1024);
    }
}
