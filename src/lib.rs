#![forbid(unsafe_code)]

//! # longguide
//!
//! Synthesizes natural-language guidelines that steer a language model toward
//! the qualitative and statistical profile of a reference dataset.
//!
//! Two guideline kinds are produced:
//!
//! - **Metric guidelines**: salient evaluation metrics are discovered from
//!   sampled demonstrations, scored by a judge model over the validation set,
//!   and turned into expected-quality descriptions.
//! - **Constraint guidelines**: sentence and word count ranges computed from
//!   the reference outputs.
//!
//! All model calls go through [`gateway::ModelGateway`], which retries with
//! exponential backoff and never fails outward.

pub mod config;
pub mod constraints;
pub mod dataset;
pub mod discovery;
pub mod evaluate;
pub mod gateway;
pub mod guidelines;
pub mod judge;
pub mod payload;
pub mod prompts;
pub mod run;
pub mod text;

pub use config::{ConfigError, GuideConfig};
pub use constraints::{ConstraintError, ConstraintStatistics, LinguisticStatistics};
pub use dataset::{load_dataset, DatasetError, ValidationItem};
pub use discovery::{DiscoveryError, DiscoveryOptions, MetricDiscovery};
pub use evaluate::{evaluate, rouge_l, EvaluateError, EvaluationSummary, Tokenization};
pub use gateway::{
    GenerateOptions, ModelGateway, ProviderError, ProviderKind, TextGenerator, UsageSink,
};
pub use guidelines::{
    ConstraintForm, GuidelineError, GuidelineReport, MetricsGuidelines,
    OutputConstraintsGuidelines,
};
pub use judge::{JudgeAggregator, JudgeOptions, ScoreAccumulator, ScoreProfile};
pub use payload::PayloadError;
pub use run::{GenerationRecord, GenerationRun, RunError};
pub use text::{RuleBasedAnalyzer, TextAnalyzer};
