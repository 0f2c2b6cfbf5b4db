//! Extracting a score object from free-form model output.

use benchsift_core::BenchsiftError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A parsed, bounded score for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeScore {
    /// Score within the configured bounds.
    pub score: i64,
    /// One-sentence justification.
    #[serde(default)]
    pub reason: String,
    /// Full analysis text.
    #[serde(default)]
    pub analysis: String,
}

#[derive(Deserialize)]
struct RawScore {
    score: serde_json::Value,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    analysis: Option<String>,
}

/// Parse a model reply into a score between `min` and `max` inclusive.
///
/// Accepts a bare JSON object, one wrapped in a Markdown code fence, or one
/// embedded in surrounding prose. As a last resort, a `"score": N` pair is
/// picked out of otherwise broken JSON.
///
/// # Errors
///
/// Returns [`BenchsiftError::Parse`] when no score is found or it is out of
/// bounds.
///
/// # Examples
///
/// ```
/// use benchsift_judge::parse_response;
///
/// let reply = "```json\n{\"score\": 1, \"reason\": \"minor gaps\", \"analysis\": \"...\"}\n```";
/// let score = parse_response(reply, 0, 3).unwrap();
/// assert_eq!(score.score, 1);
/// assert_eq!(score.reason, "minor gaps");
///
/// assert!(parse_response("{\"score\": 9}", 0, 3).is_err());
/// ```
pub fn parse_response(text: &str, min: i64, max: i64) -> Result<JudgeScore, BenchsiftError> {
    let text = unfence(text.trim());
    let parsed = serde_json::from_str::<RawScore>(text)
        .ok()
        .and_then(into_score)
        .or_else(|| embedded_object(text))
        .or_else(|| loose_fields(text))
        .ok_or_else(|| BenchsiftError::Parse(format!("no score found in reply: {}", preview(text))))?;

    if !(min..=max).contains(&parsed.score) {
        return Err(BenchsiftError::Parse(format!(
            "score {} outside {min}..={max}",
            parsed.score
        )));
    }
    Ok(parsed)
}

/// Contents of the first fenced block, or the text unchanged.
fn unfence(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => text,
    }
}

fn into_score(raw: RawScore) -> Option<JudgeScore> {
    let score = match &raw.score {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(JudgeScore {
        score,
        reason: raw.reason.unwrap_or_default(),
        analysis: raw.analysis.unwrap_or_default(),
    })
}

/// First balanced `{...}` in `text` that parses and carries a score.
fn embedded_object(text: &str) -> Option<JudgeScore> {
    let bytes = text.as_bytes();
    for (start, _) in text.match_indices('{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[start..=start + offset];
                        if let Some(score) = serde_json::from_str::<RawScore>(candidate)
                            .ok()
                            .and_then(into_score)
                        {
                            return Some(score);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Field-by-field extraction for JSON the model failed to close or escape.
fn loose_fields(text: &str) -> Option<JudgeScore> {
    let score_re = Regex::new(r#""score"\s*:\s*"?(-?\d+)"#).ok()?;
    let score = score_re.captures(text)?.get(1)?.as_str().parse().ok()?;
    Some(JudgeScore {
        score,
        reason: string_field(text, "reason").unwrap_or_default(),
        analysis: string_field(text, "analysis").unwrap_or_default(),
    })
}

fn string_field(text: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"(?s)"{name}"\s*:\s*"((?:[^"\\]|\\.)*)""#)).ok()?;
    let raw = re.captures(text)?.get(1)?.as_str();
    Some(raw.replace("\\\"", "\"").replace("\\n", "\n").replace("\\\\", "\\"))
}

fn preview(text: &str) -> String {
    let flat: String = text.chars().take(120).collect();
    flat.replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object() {
        let s = parse_response(r#"{"score": 0, "reason": "ok", "analysis": "a"}"#, 0, 3).unwrap();
        assert_eq!(s.score, 0);
        assert_eq!(s.analysis, "a");
    }

    #[test]
    fn fence_without_language_tag() {
        let s = parse_response("```\n{\"score\": 2}\n```", 0, 3).unwrap();
        assert_eq!(s.score, 2);
        assert!(s.reason.is_empty());
    }

    #[test]
    fn object_inside_prose_with_nested_braces() {
        let reply = r#"Here is my verdict: {"score": 3, "reason": "stub {passes}", "analysis": "x"} thanks"#;
        let s = parse_response(reply, 0, 3).unwrap();
        assert_eq!(s.score, 3);
        assert_eq!(s.reason, "stub {passes}");
    }

    #[test]
    fn string_score_is_accepted() {
        assert_eq!(parse_response(r#"{"score": "1"}"#, 0, 3).unwrap().score, 1);
    }

    #[test]
    fn unterminated_json_falls_back_to_fields() {
        let reply = r#"{"score": 1, "reason": "minor \"gap\"", "analysis": "cut off"#;
        let s = parse_response(reply, 0, 3).unwrap();
        assert_eq!(s.score, 1);
        assert_eq!(s.reason, "minor \"gap\"");
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        assert!(parse_response(r#"{"score": -1}"#, 0, 3).is_err());
        assert!(parse_response(r#"{"score": 4}"#, 0, 3).is_err());
    }

    #[test]
    fn no_score_is_rejected() {
        let err = parse_response("I cannot grade this.", 0, 3).unwrap_err();
        assert!(matches!(err, BenchsiftError::Parse(_)));
    }
}
