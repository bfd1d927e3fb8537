use std::path::PathBuf;

use thiserror::Error;

/// Why a declared source file contributed no records to a rebuild.
///
/// None of these abort a rebuild; the store logs them and moves on.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source {0} does not exist")]
    Missing(PathBuf),
    #[error("could not read source {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("source is not valid json: {0}")]
    Malformed(String),
    #[error("source top level is {0}, expected an array of tournaments")]
    NotAnArray(&'static str),
}

impl SourceError {
    pub fn is_missing(&self) -> bool {
        matches!(self, SourceError::Missing(_))
    }
}

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
