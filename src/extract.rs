//! Structured-data extraction from model replies.
//!
//! Chat backends are asked for JSON but frequently wrap it in prose or
//! markdown fences. [`extract_record`] tries progressively looser strategies
//! to recover a JSON object from such replies, and degrades to `None`
//! instead of erroring so callers can substitute a placeholder value.

use serde_json::{Map, Value};

/// Pull a JSON object out of a model reply, if one can be found.
///
/// Strategies are tried in order, first hit wins:
/// 1. the whole trimmed reply is a JSON object
/// 2. the content of a ```` ```json ```` fenced block
/// 3. the substring from the first `{` to the last `}`
///
/// A parse failure at any step falls through to the next. Replies whose
/// JSON is not an object (arrays, bare strings) are treated the same as
/// unparseable text.
pub fn extract_record(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Some(record) = parse_object(trimmed) {
            return Some(record);
        }
    }

    if let Some(fenced) = fenced_block(text) {
        if let Some(record) = parse_object(fenced.trim()) {
            return Some(record);
        }
    }

    if let Some(span) = brace_span(text) {
        if let Some(record) = parse_object(span) {
            return Some(record);
        }
    }

    None
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Content of the first ```` ```json ```` block, or `None` when the block
/// is absent or unterminated.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

/// Widest brace-delimited substring, first `{` through last `}` inclusive.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
