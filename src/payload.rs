//! Structured payload extraction from model replies.
//!
//! Prompts ask the model to wrap machine-readable output in a fenced block
//! tagged `json`. The first such block is decoded into the requested shape.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("Invalid JSON block regex"));

/// Why a reply carried no usable payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("reply is empty")]
    Empty,
    #[error("no ```json block in reply")]
    MissingBlock,
    #[error("json decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Return the body of the first fenced `json` block, without the fences.
pub fn extract_json_block(raw: &str) -> Option<&str> {
    JSON_BLOCK
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Decode the first fenced `json` block of `raw` as `T`.
pub fn parse_json_block<T: DeserializeOwned>(raw: &str) -> Result<T, PayloadError> {
    if raw.trim().is_empty() {
        return Err(PayloadError::Empty);
    }
    let block = extract_json_block(raw).ok_or(PayloadError::MissingBlock)?;
    Ok(serde_json::from_str(block)?)
}
