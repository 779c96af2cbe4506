//! Parsing of model output into a [`StructuredResult`]

use tracing::debug;

use super::StructuredResult;
use crate::error::BackendFailure;

/// Parse raw model text, recovering JSON embedded in prose when needed
pub fn parse_structured_response(raw: &str) -> Result<StructuredResult, BackendFailure> {
    if let Some(result) = parse_object(raw.trim()) {
        return Ok(result);
    }

    let cleaned = clean_llm_response(raw);
    if let Some(result) = parse_object(&cleaned) {
        debug!("Parsed model response after stripping code fences");
        return Ok(result);
    }

    // Spans nested inside a rejected report are its own fields, not reports
    let mut rejected_until = 0;
    for (start, _) in raw.match_indices('{') {
        if start < rejected_until {
            continue;
        }
        let Some(span) = balanced_span(raw, start) else {
            continue;
        };
        let Some(value) = report_value(span) else {
            continue;
        };
        match serde_json::from_value::<StructuredResult>(value) {
            Ok(result) => {
                debug!("Recovered structured span at byte {} of model response", start);
                return Ok(result);
            }
            Err(e) => {
                debug!("Rejected report candidate at byte {}: {}", start, e);
                rejected_until = start + span.len();
            }
        }
    }

    Err(BackendFailure::malformed(format!(
        "no structured object in model response: {}",
        snippet(raw, 200)
    )))
}

const REPORT_KEYS: [&str; 7] = [
    "team_weaknesses",
    "teamWeaknesses",
    "player_weaknesses",
    "playerWeaknesses",
    "improvement_ideas",
    "improvementIdeas",
    "evidence",
];

/// A JSON object carrying at least one report field
fn report_value(text: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    if !REPORT_KEYS.iter().any(|key| object.contains_key(*key)) {
        return None;
    }
    Some(value)
}

fn parse_object(text: &str) -> Option<StructuredResult> {
    serde_json::from_value(report_value(text)?).ok()
}

/// Remove Markdown code fences (```json ... ```) and surrounding whitespace
pub fn clean_llm_response(content: &str) -> String {
    let content = content.trim();

    if content.starts_with("```") {
        if let Some(start) = content.find('\n') {
            if let Some(end) = content.rfind("```") {
                if end > start {
                    return content[start + 1..end].trim().to_string();
                }
            }
        }
    }

    content.replace("```", "").trim().to_string()
}

/// The balanced `{...}` span opening at byte `start`, ignoring braces inside strings
pub fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.get(start..)?.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
