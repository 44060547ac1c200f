//! Output-shape statistics over reference outputs.

use serde::{Deserialize, Serialize};

use crate::text::{majority_verb_form, TextAnalyzer};

#[derive(Debug, thiserror::Error)]
pub enum ConstraintError {
    #[error("cannot compute statistics over an empty corpus")]
    EmptyCorpus,
}

/// Sentence and word count range over a reference corpus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintStatistics {
    pub sentence_min: usize,
    pub sentence_max: usize,
    pub sentence_avg: f64,
    pub word_min: usize,
    pub word_max: usize,
    pub word_avg: f64,
}

/// Per-item averages used by the average-form constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinguisticStatistics {
    /// Truncated toward zero.
    pub words: u64,
    pub sentences: f64,
    pub verbs: f64,
    pub nouns: f64,
    /// Most frequent verb tag across the corpus.
    #[serde(default)]
    pub verb_form: Option<String>,
}

/// Min, max and mean sentence/word counts over `outputs`.
pub fn compute_statistics<S: AsRef<str>>(
    outputs: &[S],
    analyzer: &dyn TextAnalyzer,
) -> Result<ConstraintStatistics, ConstraintError> {
    if outputs.is_empty() {
        return Err(ConstraintError::EmptyCorpus);
    }

    let (sentence_counts, word_counts): (Vec<usize>, Vec<usize>) = outputs
        .iter()
        .map(|o| {
            let text = o.as_ref();
            (analyzer.count_sentences(text), analyzer.count_words(text))
        })
        .unzip();

    let (sentence_min, sentence_max, sentence_avg) = summarize(&sentence_counts);
    let (word_min, word_max, word_avg) = summarize(&word_counts);

    Ok(ConstraintStatistics {
        sentence_min,
        sentence_max,
        sentence_avg,
        word_min,
        word_max,
        word_avg,
    })
}

fn summarize(counts: &[usize]) -> (usize, usize, f64) {
    let min = counts.iter().copied().min().unwrap_or(0);
    let max = counts.iter().copied().max().unwrap_or(0);
    let avg = counts.iter().sum::<usize>() as f64 / counts.len().max(1) as f64;
    (min, max, avg)
}

/// Average word, sentence, verb and noun counts per output.
pub fn compute_linguistic_statistics<S: AsRef<str>>(
    outputs: &[S],
    analyzer: &dyn TextAnalyzer,
) -> Result<LinguisticStatistics, ConstraintError> {
    if outputs.is_empty() {
        return Err(ConstraintError::EmptyCorpus);
    }

    let mut words = 0usize;
    let mut sentences = 0usize;
    let mut verbs = 0usize;
    let mut nouns = 0usize;

    for output in outputs {
        let text = output.as_ref();
        let tokens = analyzer.words(text);
        let tagged = analyzer.pos_tags(&tokens);
        words += tokens.len();
        sentences += analyzer.count_sentences(text);
        verbs += tagged.iter().filter(|(_, t)| t.starts_with("VB")).count();
        nouns += tagged.iter().filter(|(_, t)| t.starts_with("NN")).count();
    }

    let n = outputs.len() as f64;
    Ok(LinguisticStatistics {
        words: (words as f64 / n) as u64,
        sentences: sentences as f64 / n,
        verbs: verbs as f64 / n,
        nouns: nouns as f64 / n,
        verb_form: majority_verb_form(analyzer, outputs),
    })
}

/// "The output must have from .. to .. sentences and from .. to .. words ..."
pub fn format_range_constraint(stats: &ConstraintStatistics) -> String {
    format!(
        "The output must have from {} to {} sentences and from {} to {} words with an average of {} words and {} sentences.",
        stats.sentence_min,
        stats.sentence_max,
        stats.word_min,
        stats.word_max,
        stats.word_avg as u64,
        stats.sentence_avg as u64,
    )
}

pub fn format_average_constraint(stats: &LinguisticStatistics) -> String {
    format!(
        "Your response must have {} sentences and on average {} words.",
        stats.sentences as u64, stats.words
    )
}
