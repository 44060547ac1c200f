//! Sentence segmentation, word tokenization and part-of-speech tagging.
//!
//! The constraint statistics only depend on the [`TextAnalyzer`] contract:
//! deterministic, ordered sentences/tokens/tags for a given text. The
//! bundled [`RuleBasedAnalyzer`] is a regex segmenter plus a coarse
//! Penn-Treebank-style tagger; swap in a statistical tagger through the
//! trait when tag accuracy matters.

use fancy_regex::Regex as FancyRegex;
use once_cell::sync::Lazy;
use regex::Regex;

/// Text analysis collaborator used by the constraint statistics.
pub trait TextAnalyzer: Send + Sync {
    /// Ordered sentences of `text`.
    fn sentences(&self, text: &str) -> Vec<String>;
    /// Ordered word/punctuation tokens of `text`.
    fn words(&self, text: &str) -> Vec<String>;
    /// One `(token, tag)` pair per input token, Penn Treebank tag set.
    fn pos_tags(&self, tokens: &[String]) -> Vec<(String, String)>;

    fn count_sentences(&self, text: &str) -> usize {
        self.sentences(text).len()
    }

    fn count_words(&self, text: &str) -> usize {
        self.words(text).len()
    }

    /// Tokens whose tag starts with `VB`.
    fn count_verbs(&self, text: &str) -> usize {
        count_tag_prefix(&self.pos_tags(&self.words(text)), "VB")
    }

    /// Tokens whose tag starts with `NN`.
    fn count_nouns(&self, text: &str) -> usize {
        count_tag_prefix(&self.pos_tags(&self.words(text)), "NN")
    }
}

fn count_tag_prefix(tagged: &[(String, String)], prefix: &str) -> usize {
    tagged.iter().filter(|(_, tag)| tag.starts_with(prefix)).count()
}

// =============================================================================
// Rule-based analyzer
// =============================================================================

// Use fancy-regex for lookbehind support
static SENTENCE_SPLIT: Lazy<FancyRegex> = Lazy::new(|| {
    // Split after . ! ? (optionally closed by a quote/bracket) followed by whitespace
    FancyRegex::new(r#"(?<=[.!?])\s+|(?<=[.!?]["')\]])\s+"#)
        .expect("Invalid sentence split regex")
});

static WORD_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.\.\.|\w+(?:[-']\w+)*|[^\w\s]").expect("Invalid word token regex")
});

/// Lowercased abbreviations that end with a period but not a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "st.", "vs.", "etc.", "e.g.", "i.e.",
    "inc.", "ltd.", "co.", "no.", "fig.", "u.s.",
];

/// Regex segmenter/tokenizer with a lexicon-and-suffix tagger.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedAnalyzer;

impl TextAnalyzer for RuleBasedAnalyzer {
    fn sentences(&self, text: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut sentence_start = 0;
        let mut finder = SENTENCE_SPLIT.find_iter(text);

        while let Some(Ok(m)) = finder.next() {
            let candidate = &text[sentence_start..m.start()];
            let last_word = candidate
                .split_whitespace()
                .last()
                .unwrap_or("")
                .to_lowercase();
            if ABBREVIATIONS.contains(&last_word.as_str()) {
                continue;
            }
            let sentence = candidate.trim();
            if !sentence.is_empty() {
                result.push(sentence.to_string());
            }
            sentence_start = m.end();
        }

        let tail = text[sentence_start..].trim();
        if !tail.is_empty() {
            result.push(tail.to_string());
        }
        result
    }

    fn words(&self, text: &str) -> Vec<String> {
        WORD_TOKEN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    fn pos_tags(&self, tokens: &[String]) -> Vec<(String, String)> {
        let mut tagged: Vec<(String, String)> = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            let prev = tagged.last().map(|(_, t)| t.as_str());
            let sentence_initial = i == 0 || matches!(prev, Some("."));
            let tag = tag_token(token, prev, sentence_initial);
            tagged.push((token.clone(), tag.to_string()));
        }
        tagged
    }
}

fn tag_token(token: &str, prev: Option<&str>, sentence_initial: bool) -> &'static str {
    let lower = token.to_lowercase();
    let w = lower.as_str();

    if !token.chars().any(|c| c.is_alphanumeric()) {
        return ".";
    }
    if token.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return "CD";
    }
    if let Some(tag) = closed_class(w) {
        return tag;
    }

    // Verb slots opened by the previous tag.
    match prev {
        Some("MD") | Some("TO") => return "VB",
        Some("PRP") if w.ends_with('s') && !w.ends_with("ss") => return "VBZ",
        Some("PRP") if !w.ends_with("ly") => {
            return if w.ends_with("ed") { "VBD" } else { "VBP" };
        }
        _ => {}
    }

    let capitalized = token.chars().next().is_some_and(|c| c.is_uppercase());
    if capitalized && !sentence_initial {
        return "NNP";
    }

    if w.ends_with("ly") && w.len() > 4 {
        "RB"
    } else if w.ends_with("ing") && w.len() > 4 {
        "VBG"
    } else if w.ends_with("ed") && w.len() > 3 {
        if matches!(prev, Some("VBZ") | Some("VBP") | Some("VBD")) {
            "VBN"
        } else {
            "VBD"
        }
    } else if ["ize", "ise", "ify", "ate"].iter().any(|s| w.ends_with(s)) && w.len() > 5 {
        "VB"
    } else if ["ous", "ful", "ive", "able", "ible", "al", "ic", "less", "ish"]
        .iter()
        .any(|s| w.ends_with(s))
        && w.len() > 4
    {
        "JJ"
    } else if w.ends_with('s') && !w.ends_with("ss") && w.len() > 3 {
        "NNS"
    } else {
        "NN"
    }
}

fn closed_class(w: &str) -> Option<&'static str> {
    let tag = match w {
        "the" | "a" | "an" | "this" | "that" | "these" | "those" | "every" | "each" | "some"
        | "any" | "no" | "all" | "both" => "DT",
        "i" | "you" | "he" | "she" | "it" | "we" | "they" | "me" | "him" | "us" | "them" => "PRP",
        "my" | "your" | "his" | "her" | "its" | "our" | "their" => "PRP$",
        "in" | "on" | "at" | "of" | "for" | "with" | "by" | "from" | "about" | "into" | "over"
        | "after" | "before" | "between" | "through" | "during" | "without" | "under"
        | "against" | "among" | "since" | "until" | "because" | "if" | "than" | "as" => "IN",
        "and" | "or" | "but" | "nor" | "yet" => "CC",
        "can" | "could" | "will" | "would" | "shall" | "should" | "may" | "might" | "must" => "MD",
        "to" => "TO",
        "is" => "VBZ",
        "are" | "am" => "VBP",
        "was" | "were" => "VBD",
        "be" => "VB",
        "been" => "VBN",
        "being" => "VBG",
        "has" | "does" | "says" | "goes" => "VBZ",
        "have" | "do" => "VBP",
        "had" | "did" | "said" | "went" | "made" | "took" | "got" | "came" | "gave" | "told"
        | "found" | "left" | "felt" | "thought" | "knew" | "saw" => "VBD",
        "who" | "whom" | "what" => "WP",
        "which" => "WDT",
        "when" | "where" | "why" | "how" => "WRB",
        "not" | "n't" | "very" | "also" | "too" | "just" | "never" | "always" | "often"
        | "then" | "there" | "here" | "now" | "still" | "already" | "again" => "RB",
        _ => return None,
    };
    Some(tag)
}

/// Most frequent verb tag (`VB*`) across the sentences of `paragraphs`.
///
/// Ties resolve to the tag seen first. `None` when there are no verbs.
pub fn majority_verb_form<S: AsRef<str>>(
    analyzer: &dyn TextAnalyzer,
    paragraphs: &[S],
) -> Option<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for paragraph in paragraphs {
        for sentence in analyzer.sentences(paragraph.as_ref()) {
            let tagged = analyzer.pos_tags(&analyzer.words(&sentence));
            for (_, tag) in tagged.into_iter().filter(|(_, t)| t.starts_with("VB")) {
                match counts.iter_mut().find(|(t, _)| *t == tag) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((tag, 1)),
                }
            }
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (tag, n) in counts {
        if best.as_ref().map_or(true, |(_, b)| n > *b) {
            best = Some((tag, n));
        }
    }
    best.map(|(tag, _)| tag)
}
