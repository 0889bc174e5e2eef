//! Pulling a JSON document out of a free-text model reply.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"```json\s*(\{[\s\S]*?\})\s*```").ok());

static OUTERMOST: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").ok());

/// First parseable JSON object in `text`: a ```json fenced block wins,
/// otherwise the span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<Value> {
    let fenced = FENCED
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| serde_json::from_str(m.as_str()).ok());
    if fenced.is_some() {
        return fenced;
    }

    OUTERMOST
        .as_ref()
        .and_then(|re| re.find(text))
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
}
