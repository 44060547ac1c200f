//! Validation records and dataset loading.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One source/target pair from a validation set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord")]
pub struct ValidationItem {
    pub input: String,
    pub reference: String,
    /// Raw `output` field, kept even when `reference` or `s_content` wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ValidationItem {
    pub fn new(input: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reference: reference.into(),
            output: None,
        }
    }

    /// Text that constraint statistics are computed on: the produced
    /// `output` when the record has one, the reference otherwise.
    pub fn statistics_text(&self) -> &str {
        self.output.as_deref().unwrap_or(&self.reference)
    }
}

/// Accepted key spellings, in precedence order.
#[derive(Deserialize)]
struct RawRecord {
    input: Option<Value>,
    r_content: Option<Value>,
    reference: Option<Value>,
    s_content: Option<Value>,
    output: Option<Value>,
}

impl TryFrom<RawRecord> for ValidationItem {
    type Error = String;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let input = raw
            .input
            .or(raw.r_content)
            .ok_or("record has no `input` or `r_content` field")?;
        let output = raw.output.map(value_text);
        let reference = raw
            .reference
            .or(raw.s_content)
            .map(value_text)
            .or_else(|| output.clone())
            .ok_or("record has no `reference`, `s_content` or `output` field")?;
        Ok(Self {
            input: value_text(input),
            reference,
            output,
        })
    }
}

fn value_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
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
    #[error("no *.json files in {0}")]
    NoFiles(String),
}

/// Load validation records from a JSON array file, or from every `*.json`
/// array in a directory (concatenated in file-name order).
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Vec<ValidationItem>, DatasetError> {
    let path = path.as_ref();
    if !path.is_dir() {
        return load_file(path);
    }

    let entries = std::fs::read_dir(path).map_err(|source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(DatasetError::NoFiles(path.display().to_string()));
    }

    let mut items = Vec::new();
    for file in files {
        items.extend(load_file(&file)?);
    }
    Ok(items)
}

fn load_file(path: &Path) -> Result<Vec<ValidationItem>, DatasetError> {
    let raw = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| DatasetError::Decode {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_key_aliases() {
        let item: ValidationItem =
            serde_json::from_str(r#"{"r_content": "long text", "s_content": "short"}"#).unwrap();
        assert_eq!(item, ValidationItem::new("long text", "short"));

        let item: ValidationItem =
            serde_json::from_str(r#"{"input": "dialogue", "output": "summary"}"#).unwrap();
        assert_eq!(item.reference, "summary");
    }

    #[test]
    fn reference_wins_over_output() {
        let item: ValidationItem =
            serde_json::from_str(r#"{"input": "x", "output": "o", "reference": "r"}"#).unwrap();
        assert_eq!(item.reference, "r");
        assert_eq!(item.statistics_text(), "o");
    }

    #[test]
    fn statistics_fall_back_to_reference() {
        let item: ValidationItem =
            serde_json::from_str(r#"{"input": "x", "s_content": "s"}"#).unwrap();
        assert_eq!(item.output, None);
        assert_eq!(item.statistics_text(), "s");
    }

    #[test]
    fn output_survives_a_serde_round_trip() {
        let item: ValidationItem =
            serde_json::from_str(r#"{"input": "x", "output": "o", "reference": "r"}"#).unwrap();
        let back: ValidationItem =
            serde_json::from_str(&serde_json::to_string(&item).unwrap()).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn non_string_values_are_stringified() {
        let item: ValidationItem =
            serde_json::from_str(r#"{"input": ["dog", "frisbee"], "output": "A dog."}"#).unwrap();
        assert_eq!(item.input, r#"["dog","frisbee"]"#);
    }

    #[test]
    fn missing_target_is_rejected() {
        let err = serde_json::from_str::<ValidationItem>(r#"{"input": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("reference"));
    }
}
