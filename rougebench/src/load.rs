//! Loading and validation of evaluation records.
//!
//! The input is a JSON array of objects. Validation is all-or-nothing: a
//! single record missing a field rejects the whole file before anything is
//! normalized.

use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

const REQUIRED_FIELDS: [&str; 3] = ["instruction", "input", "output"];

/// One instruction/input/output triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Task description, whitespace-normalized
    pub instruction: String,
    /// User-turn content sent to the model, whitespace-normalized
    pub input: String,
    /// Ground-truth reference, kept verbatim
    pub output: String,
}

/// Collapse line breaks and runs of whitespace into single spaces and trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read, validate and normalize the records in `path`.
pub fn load(path: impl AsRef<Path>) -> EvalResult<Vec<Record>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| EvalError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let content = std::str::from_utf8(&bytes)
        .map_err(|e| EvalError::Format(format!("{} is not valid UTF-8: {e}", path.display())))?;

    let records = parse_records(content)?;
    if let Some(first) = records.first() {
        tracing::info!(count = records.len(), ?first, "Loaded records");
    }
    Ok(records)
}

/// Validate and normalize records from in-memory JSON.
pub fn parse_records(content: &str) -> EvalResult<Vec<Record>> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| EvalError::Format(e.to_string()))?;

    let Value::Array(items) = value else {
        return Err(EvalError::Format(
            "expected a top-level array of objects".into(),
        ));
    };

    let objects = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_object().ok_or_else(|| {
                EvalError::Format(format!("element {index} is not an object"))
            })
        })
        .collect::<EvalResult<Vec<_>>>()?;

    // Check every record before touching any of them
    for (index, object) in objects.iter().enumerate() {
        validate(index, object)?;
    }

    Ok(objects.into_iter().map(to_record).collect())
}

fn validate(index: usize, object: &Map<String, Value>) -> EvalResult<()> {
    for field in REQUIRED_FIELDS {
        match object.get(field) {
            None => {
                return Err(EvalError::Schema {
                    index,
                    reason: format!(
                        "each object must contain 'instruction', 'input', and 'output' fields; missing '{field}'"
                    ),
                });
            }
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(EvalError::Schema {
                    index,
                    reason: format!("field '{field}' must be a string, got {other}"),
                });
            }
        }
    }
    Ok(())
}

fn to_record(object: &Map<String, Value>) -> Record {
    let field = |name: &str| {
        object
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Record {
        instruction: normalize(&field("instruction")),
        input: normalize(&field("input")),
        output: field("output"),
    }
}
