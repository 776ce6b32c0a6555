//! Locating a JSON object inside free-form model output.
//!
//! Models wrap their answer in prose or Markdown code fences, so the reply is
//! scanned for the first `{` that starts a complete top-level object. Each
//! candidate is fed to serde_json's streaming deserializer, which stops at the
//! end of the first value and therefore copes with braces inside string
//! literals and with trailing text.

use crate::error::ClassificationError;
use serde_json::{Map, Value};

/// Extract the first complete JSON object from `text`.
///
/// # Errors
/// [`ClassificationError::NoJsonFound`] when the text holds no `{ ... }` span,
/// [`ClassificationError::MalformedJson`] when spans exist but none parses as
/// an object.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ClassificationError> {
    let Some(first) = text.find('{') else {
        return Err(ClassificationError::NoJsonFound);
    };
    if !text[first..].contains('}') {
        return Err(ClassificationError::NoJsonFound);
    }

    let mut first_error: Option<String> = None;
    let mut resume = first;

    while let Some(offset) = text[resume..].find('{') {
        let start = resume + offset;
        let candidate = &text[start..];
        let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) => return Ok(map),
            Some(Err(e)) if first_error.is_none() => first_error = Some(e.to_string()),
            _ => {}
        }
        // Objects nested in a rejected span are never top-level candidates.
        match brace_span_len(candidate) {
            Some(len) => resume = start + len,
            None => break,
        }
    }

    Err(ClassificationError::MalformedJson(
        first_error.unwrap_or_else(|| "no JSON object in reply".to_string()),
    ))
}

/// Byte length of the balanced `{ ... }` span opening `s`, skipping braces
/// inside string literals. `None` when the span never closes.
fn brace_span_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
