//! Structured payload extraction from free-form model output.
//!
//! Models wrap JSON in prose, code fences, or both, and occasionally put raw
//! newlines or stray backslashes inside string values. [`extract_json`]
//! recovers the first well-formed JSON object it can find.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// No `{ ... }` span anywhere in the text
    #[error("no JSON object found in model output")]
    NoPayloadFound,

    /// A candidate span was found but nothing parsed
    #[error("JSON parse failed: {0}")]
    InvalidJson(String),
}

/// Extract a JSON object from noisy model output.
///
/// Order of attempts:
/// 1. the body of a ```json fence, if there is one
/// 2. the span from the first `{` to the last `}`
/// 3. every balanced `{ ... }` span, left to right
///
/// Each candidate is normalized before parsing.
pub fn extract_json(raw: &str) -> Result<Value, ExtractError> {
    let region = fenced_body(raw).unwrap_or(raw);

    let (start, end) = match (region.find('{'), region.rfind('}')) {
        (Some(start), Some(end)) if end > start => (start, end),
        _ => match (raw.find('{'), raw.rfind('}')) {
            (Some(_), Some(_)) => return scan_balanced(raw, None),
            _ => return Err(ExtractError::NoPayloadFound),
        },
    };

    let candidate = &region[start..=end];
    let first_error = match serde_json::from_str::<Value>(&normalize(candidate)) {
        Ok(value @ Value::Object(_)) => return Ok(value),
        Ok(_) => "payload is not a JSON object".to_string(),
        Err(e) => e.to_string(),
    };

    tracing::debug!(error = %first_error, "outer span did not parse, scanning balanced spans");
    scan_balanced(raw, Some(first_error))
}

fn scan_balanced(raw: &str, first_error: Option<String>) -> Result<Value, ExtractError> {
    let mut last_error = first_error;

    for (start, _) in raw.match_indices('{') {
        let remainder = &raw[start..];
        let Some(end) = find_matching_brace(remainder) else {
            continue;
        };
        match serde_json::from_str::<Value>(&normalize(&remainder[..end])) {
            Ok(value @ Value::Object(_)) => return Ok(value),
            Ok(_) => {}
            Err(e) => {
                if last_error.is_none() {
                    last_error = Some(e.to_string());
                }
            }
        }
    }

    Err(ExtractError::InvalidJson(
        last_error.unwrap_or_else(|| "unbalanced braces".to_string()),
    ))
}

/// Body of the first ```json fence (or a bare ``` fence that holds an object)
fn fenced_body(raw: &str) -> Option<&str> {
    let lower = raw.to_ascii_lowercase();
    let (open, skip) = match lower.find("```json") {
        Some(i) => (i, "```json".len()),
        None => {
            let i = lower.find("```")?;
            (i, 3)
        }
    };

    let body_start = open + skip;
    let rest = &raw[body_start..];
    let close = rest.find("```")?;
    let body = &rest[..close];

    if body.trim_start().starts_with('{') {
        Some(body)
    } else {
        None
    }
}

/// Byte offset just past the brace matching the leading `{`.
/// Braces inside string literals are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if c == '\\' && in_string {
            escape = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Repair the usual model mistakes without touching string contents' meaning.
///
/// Outside strings: whitespace runs collapse to one space and trailing commas
/// before `}`/`]` are dropped. Inside strings: raw control characters are
/// escaped and backslashes that start an invalid escape are removed.
pub fn normalize(candidate: &str) -> String {
    let chars: Vec<char> = candidate.chars().collect();
    let mut out = String::with_capacity(candidate.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            match c {
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\\' => {
                    match chars.get(i + 1).copied() {
                        Some(next @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't')) => {
                            out.push('\\');
                            out.push(next);
                            i += 1;
                        }
                        Some('u') if is_hex_run(&chars, i + 2) => {
                            out.push_str("\\u");
                            i += 1;
                        }
                        // Invalid escape: drop the backslash, keep what follows
                        _ => {}
                    }
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
        } else {
            match c {
                '"' => {
                    in_string = true;
                    out.push(c);
                }
                c if c.is_whitespace() => {
                    if !out.ends_with(' ') {
                        out.push(' ');
                    }
                }
                '}' | ']' => {
                    let trimmed_len = out.trim_end().len();
                    if out[..trimmed_len].ends_with(',') {
                        out.truncate(trimmed_len - 1);
                    }
                    out.push(c);
                }
                c => out.push(c),
            }
        }
        i += 1;
    }

    out
}

fn is_hex_run(chars: &[char], from: usize) -> bool {
    chars.len() >= from + 4 && chars[from..from + 4].iter().all(|c| c.is_ascii_hexdigit())
}
