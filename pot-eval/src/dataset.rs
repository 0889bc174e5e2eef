use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EvalError;

/// Which fields of a dataset record hold what.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetConfig {
    pub question_field: String,
    pub answer_field: String,
    pub id_field: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            question_field: "question".to_string(),
            answer_field: "answer".to_string(),
            id_field: "id".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub question: String,
    pub answer: bool,
}

pub fn load_dataset(path: &Path, config: &DatasetConfig) -> Result<Vec<Record>, EvalError> {
    let text = fs::read_to_string(path).map_err(|source| EvalError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_dataset(&text, config)
}

/// Parse a JSON array of records, or one record per line.
pub fn parse_dataset(text: &str, config: &DatasetConfig) -> Result<Vec<Record>, EvalError> {
    let values = if text.trim_start().starts_with('[') {
        let doc: Vec<Value> = serde_json::from_str(text).map_err(|e| EvalError::Parse {
            line: e.line(),
            message: e.to_string(),
        })?;
        doc
    } else {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| EvalError::Parse {
                    line: i + 1,
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<Value>, _>>()?
    };

    values
        .iter()
        .enumerate()
        .map(|(index, value)| record(index, value, config))
        .collect()
}

fn record(index: usize, value: &Value, config: &DatasetConfig) -> Result<Record, EvalError> {
    let missing = |field: &str| EvalError::MissingField {
        index,
        field: field.to_string(),
    };

    let question = value
        .get(&config.question_field)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(&config.question_field))?
        .to_string();

    let label = value
        .get(&config.answer_field)
        .ok_or_else(|| missing(&config.answer_field))?;
    let answer = parse_label(label).ok_or_else(|| EvalError::BadLabel {
        index,
        value: label.to_string(),
    })?;

    // Records without an identifier are named by position.
    let id = match value.get(&config.id_field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => index.to_string(),
        Some(_) => return Err(missing(&config.id_field)),
    };

    Ok(Record { id, question, answer })
}

fn parse_label(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" => Some(true),
            "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
