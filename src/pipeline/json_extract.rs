//! Best-effort JSON recovery from free-form model replies.
//!
//! Models asked for "ONLY valid JSON" still wrap it in fences, prepend a
//! sentence, append commentary or leave a trailing comma. [`extract_json`]
//! peels those layers in a fixed order and gives up with a short preview
//! of what it saw.

use crate::error::JsonExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const PREVIEW_CHARS: usize = 500;

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```json\s*|\s*```").unwrap());

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Parse the first usable JSON value out of `text`.
///
/// Attempts, in order:
/// 1. the whole fence-stripped text
/// 2. the first balanced `{…}` object (string- and escape-aware)
/// 3. the whole text with trailing commas removed
/// 4. the balanced object with trailing commas removed
pub fn extract_json(text: &str) -> Result<Value, JsonExtractError> {
    let stripped = strip_fences(text);
    let text = stripped.trim();

    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Ok(v);
    }

    let object = balanced_object(text);
    if let Some(slice) = object {
        if let Ok(v) = serde_json::from_str::<Value>(slice) {
            return Ok(v);
        }
    }

    let cleaned = remove_trailing_commas(text);
    if let Ok(v) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(v);
    }

    if let Some(slice) = object {
        if let Ok(v) = serde_json::from_str::<Value>(&remove_trailing_commas(slice)) {
            return Ok(v);
        }
    }

    Err(JsonExtractError {
        preview: text.chars().take(PREVIEW_CHARS).collect(),
    })
}

fn strip_fences(text: &str) -> String {
    RE_JSON_FENCE.replace_all(text, "").into_owned()
}

fn remove_trailing_commas(text: &str) -> String {
    RE_TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// Slice from the first `{` to its matching `}`.
///
/// Braces inside string literals do not count. A backslash skips the next
/// character wherever it appears.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}
