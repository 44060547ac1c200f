//! Prompt templates for metric selection, judging and guideline wording.
//!
//! Provider-agnostic: every template renders to a single user prompt.

use std::collections::BTreeMap;

use crate::dataset::ValidationItem;

// =============================================================================
// Metric catalog
// =============================================================================

/// Candidate quality dimensions offered to the model during discovery.
pub const METRIC_CATALOG: &[&str] = &[
    // Basic
    "Accuracy",
    "Brevity",
    "Clarity",
    // BARTScore
    "Relevance",
    "Coherence",
    // GPTScore
    "Semantic Coverage",
    "Factuality",
    "Fluency",
    "Informativeness",
    "Consistency",
    "Engagement",
    "Specificity",
    "Correctness",
    "Understandability",
    "Diversity",
    // Long-form specific
    "Completeness",
    "Conciseness",
    "Neutrality",
    "Naturalness",
    "Readability",
    "Creativity",
    "Rationalness",
    "Truthfulness",
    "Respect of Chronology",
    "Non-repetitiveness",
    "Indicativeness",
    "Resolution",
];

// =============================================================================
// Template rendering
// =============================================================================

/// A prompt template with `{name}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub body: &'static str,
}

impl PromptTemplate {
    /// Substitute placeholders in a single left-to-right pass.
    ///
    /// Substituted values are never rescanned, so dataset text containing
    /// `{...}` cannot pull in other variables. Unknown placeholders are kept.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.body.len());
        let mut rest = self.body;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}');
            let value = close.and_then(|close| {
                let name = &after[..close];
                vars.iter().find(|(k, _)| *k == name).map(|(_, v)| (*v, close))
            });
            match value {
                Some((v, close)) => {
                    out.push_str(v);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

pub const METRIC_SELECTION: PromptTemplate = PromptTemplate {
    slug: "metric_selection_v1",
    body: r#"Select top-5 metrics which are the most important from the list below to evaluate a special way of {task_type}.
{catalog}

Here are some demonstrations of the task {task_type}:
{demonstrations}

Output your list of metrics in JSON block including ```json and ```:
```json
["metric1", "metric2", "metric3", "metric4", "metric5"]
```"#,
};

pub const METRIC_DEFINITIONS: PromptTemplate = PromptTemplate {
    slug: "metric_definitions_v1",
    body: r#"Define the list of following metrics in details as the quality of the generation expected for the {task_type} task.
{metrics}
Give me the list in bullet points.
"#,
};

pub const JUDGE_SCORES: PromptTemplate = PromptTemplate {
    slug: "judge_scores_v1",
    body: r#"You are given an input, and an output of a {task_type} task.
Input: {input}
Output: {output}

Your task is to evaluate the following criteria in a scale of 1-5, with 1 is worst and 5 is best.
{evaluation_format}

The definitions of the criteria are:
{definitions}

Your output must be in JSON block including ```json and ```:
```json
{"metric1": 3, "metric2": 4, ...}
```"#,
};

pub const QUALITY_DESCRIPTIONS: PromptTemplate = PromptTemplate {
    slug: "quality_descriptions_v1",
    body: r#"Now you are given the following metrics: {metrics} for the {task_type} task.
Based on these scores on a scale of 5 for the quality of a generated text: {scores}, define the expected quality of the generated text for each metric in natural language. Give me the list in bullet points."#,
};

// =============================================================================
// Renderers
// =============================================================================

/// Numbered `INPUT i:` / `OUTPUT i:` pairs, 1-based.
pub fn format_demonstrations(items: &[&ValidationItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            format!(
                "INPUT {n}: {}\nOUTPUT {n}: {}\n\n",
                item.input,
                item.reference,
                n = idx + 1
            )
        })
        .collect()
}

pub fn metric_selection(task_type: &str, demonstrations: &[&ValidationItem]) -> String {
    let catalog = serde_json::to_string(METRIC_CATALOG).unwrap_or_default();
    let demonstrations = format_demonstrations(demonstrations);
    METRIC_SELECTION.render(&[
        ("task_type", task_type),
        ("catalog", &catalog),
        ("demonstrations", &demonstrations),
    ])
}

pub fn metric_definitions(task_type: &str, metrics: &[String]) -> String {
    let metrics = serde_json::to_string(metrics).unwrap_or_default();
    METRIC_DEFINITIONS.render(&[("task_type", task_type), ("metrics", &metrics)])
}

pub fn judge_scores(
    task_type: &str,
    item: &ValidationItem,
    metrics: &[String],
    definitions: &str,
) -> String {
    let format: BTreeMap<&str, &str> = metrics.iter().map(|m| (m.as_str(), "1-5")).collect();
    let evaluation_format = serde_json::to_string(&format).unwrap_or_default();
    JUDGE_SCORES.render(&[
        ("task_type", task_type),
        ("input", &item.input),
        ("output", &item.reference),
        ("evaluation_format", &evaluation_format),
        ("definitions", definitions),
    ])
}

pub fn quality_descriptions(
    task_type: &str,
    metrics: &[String],
    scores: &BTreeMap<String, f64>,
) -> String {
    let metrics = metrics.join(", ");
    let scores = serde_json::to_string(scores).unwrap_or_default();
    QUALITY_DESCRIPTIONS.render(&[
        ("task_type", task_type),
        ("metrics", &metrics),
        ("scores", &scores),
    ])
}

// =============================================================================
// Task prompts
// =============================================================================

/// Which guideline texts a task prompt carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPromptVariant {
    Full,
    OnlyMetrics,
    OnlyConstraints,
}

impl TaskPromptVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::OnlyMetrics => "only_metrics",
            Self::OnlyConstraints => "only_constraints",
        }
    }
}

impl std::str::FromStr for TaskPromptVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "full" => Ok(Self::Full),
            "only_metrics" | "metrics" => Ok(Self::OnlyMetrics),
            "only_constraints" | "constraints" => Ok(Self::OnlyConstraints),
            other => Err(format!("unknown prompt variant: {other}")),
        }
    }
}

/// Interpolate guideline texts into the prompt sent for one input.
pub fn task_prompt(
    variant: TaskPromptVariant,
    instruction: &str,
    metric_guideline: &str,
    constraint_guideline: &str,
    input: &str,
) -> String {
    match variant {
        TaskPromptVariant::Full => format!(
            "{instruction} Your generated output must strictly fulfill the following task metrics. {constraint_guideline}\n\n{metric_guideline}\n\nInput: {input}"
        ),
        TaskPromptVariant::OnlyMetrics => format!(
            "{instruction} Your generated output must strictly fulfill the following task metrics.\n\n{metric_guideline}\n\nInput: {input}"
        ),
        TaskPromptVariant::OnlyConstraints => {
            format!("{instruction} {constraint_guideline}\n\nInput: {input}")
        }
    }
}

/// Default instruction per task type.
pub fn task_instruction(task_type: &str) -> &'static str {
    match task_type.to_lowercase().as_str() {
        "summarization" => "Summarize the following document.",
        "translation" => "Translate the following from English to Japanese.",
        "text simplification" => "Simplify this text.",
        "table-to-text generation" => "Generate the text from the following table.",
        "dialogue generation" => "Generate the next dialogue response.",
        _ => "Process this text.",
    }
}

// =============================================================================
// TESTS
// =============================================================================
