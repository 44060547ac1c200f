//! ROUGE-L scoring of generated outputs against their targets.

use once_cell::sync::Lazy;
use rust_stemmers::{Algorithm, Stemmer};
use serde::Serialize;
use tiktoken_rs::{r50k_base, CoreBPE};
use tracing::info;

use crate::run::GenerationRecord;

static GPT2_BPE: Lazy<CoreBPE> =
    Lazy::new(|| r50k_base().expect("Failed to load r50k_base tokenizer"));

#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
    #[error("no generation records to evaluate")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tokenization {
    /// Lowercased alphanumeric runs, Porter-stemmed when longer than three
    /// characters.
    Standard,
    /// GPT-2 byte-pair tokens with the leading space marker dropped.
    SubWord,
}

impl Tokenization {
    /// Sub-word tokens for translation, standard otherwise.
    pub fn for_task(task_type: &str) -> Self {
        if task_type.eq_ignore_ascii_case("translation") {
            Self::SubWord
        } else {
            Self::Standard
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        match self {
            Self::Standard => {
                let stemmer = Stemmer::create(Algorithm::English);
                text.to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                    .map(|t| {
                        if t.chars().count() > 3 {
                            stemmer.stem(t).into_owned()
                        } else {
                            t.to_string()
                        }
                    })
                    .collect()
            }
            Self::SubWord => GPT2_BPE
                .encode_with_special_tokens(text)
                .into_iter()
                .filter_map(|id| {
                    // Partial multi-byte tokens do not decode alone; keep them by id.
                    let token = GPT2_BPE
                        .decode(vec![id])
                        .map(|s| s.trim_start().to_string())
                        .unwrap_or_else(|_| format!("<{id}>"));
                    (!token.is_empty()).then_some(token)
                })
                .collect(),
        }
    }
}

/// ROUGE-L F-measure (beta = 1) between `candidate` and `reference`.
pub fn rouge_l(candidate: &str, reference: &str, tokenization: Tokenization) -> f64 {
    let cand = tokenization.tokenize(candidate);
    let refs = tokenization.tokenize(reference);
    if cand.is_empty() || refs.is_empty() {
        return 0.0;
    }

    let lcs = lcs_len(&cand, &refs);
    if lcs == 0 {
        return 0.0;
    }
    let precision = lcs as f64 / cand.len() as f64;
    let recall = lcs as f64 / refs.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub task_type: String,
    pub mean_rouge_l: f64,
    pub scores: Vec<f64>,
}

pub fn evaluate(
    records: &[GenerationRecord],
    task_type: &str,
) -> Result<EvaluationSummary, EvaluateError> {
    if records.is_empty() {
        return Err(EvaluateError::Empty);
    }
    let tokenization = Tokenization::for_task(task_type);
    let scores: Vec<f64> = records
        .iter()
        .map(|r| rouge_l(&r.generated, &r.target, tokenization))
        .collect();
    let mean_rouge_l = scores.iter().sum::<f64>() / scores.len() as f64;

    info!(
        task_type,
        records = scores.len(),
        rouge_l = mean_rouge_l,
        "evaluation finished"
    );
    Ok(EvaluationSummary {
        task_type: task_type.to_string(),
        mean_rouge_l,
        scores,
    })
}
