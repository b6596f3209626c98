//! Response extractor: recovers one `EvaluationResult` from free-form model output.
//!
//! The model is asked for bare JSON but may wrap it in prose or code fences.
//! Candidates are found with a balanced-brace scanner that understands JSON
//! string literals, so braces inside values do not end an object early. The
//! classic first-`{`/last-`}` slice is kept as a last candidate for replies the
//! scanner cannot balance.
//!
//! Every failure is a `MalformedResponse` carrying the raw reply.

use serde_json::Value;

use crate::errors::AppError;
use crate::evaluation::domain::{EvaluationResult, REQUIRED_FIELDS};

#[derive(Debug)]
enum CandidateError {
    InvalidJson(serde_json::Error),
    NotAnObject,
    MissingFields(Vec<&'static str>),
    WrongShape(serde_json::Error),
}

impl CandidateError {
    fn describe(&self) -> String {
        match self {
            CandidateError::InvalidJson(e) => format!("reply contains invalid JSON: {e}"),
            CandidateError::NotAnObject => "reply JSON is not an object".to_string(),
            CandidateError::MissingFields(fields) => {
                format!("reply JSON is missing required fields: {}", fields.join(", "))
            }
            CandidateError::WrongShape(e) => format!("reply JSON has unexpected shape: {e}"),
        }
    }

    /// Higher is closer to a usable result; used to pick the message to surface.
    fn rank(&self) -> u8 {
        match self {
            CandidateError::InvalidJson(_) => 0,
            CandidateError::NotAnObject => 1,
            CandidateError::MissingFields(_) => 2,
            CandidateError::WrongShape(_) => 3,
        }
    }
}

/// Extracts the evaluation from a completion reply.
pub fn extract(reply: &str) -> Result<EvaluationResult, AppError> {
    let mut candidates = balanced_objects(reply);
    if let Some(slice) = first_last_slice(reply) {
        if !candidates.contains(&slice) {
            candidates.push(slice);
        }
    }

    if candidates.is_empty() {
        return Err(AppError::malformed("no JSON object found in reply", reply));
    }

    let mut results: Vec<EvaluationResult> = Vec::new();
    let mut best_error: Option<CandidateError> = None;

    for candidate in candidates {
        match parse_candidate(candidate) {
            Ok(result) => {
                if !results.contains(&result) {
                    results.push(result);
                }
            }
            Err(e) => {
                if best_error.as_ref().map_or(true, |b| e.rank() > b.rank()) {
                    best_error = Some(e);
                }
            }
        }
    }

    match results.len() {
        1 => Ok(results.remove(0)),
        0 => {
            let message = best_error
                .map(|e| e.describe())
                .unwrap_or_else(|| "no JSON object found in reply".to_string());
            Err(AppError::malformed(message, reply))
        }
        n => Err(AppError::malformed(
            format!("reply contains {n} different evaluation objects"),
            reply,
        )),
    }
}

fn parse_candidate(candidate: &str) -> Result<EvaluationResult, CandidateError> {
    let value: Value = serde_json::from_str(candidate).map_err(CandidateError::InvalidJson)?;
    let object = value.as_object().ok_or(CandidateError::NotAnObject)?;

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(CandidateError::MissingFields(missing));
    }

    serde_json::from_value(value).map_err(CandidateError::WrongShape)
}

/// Unclosed openers skipped before the scanner gives up and leaves the reply to
/// `first_last_slice`. Each restart rescans the rest of the text.
const MAX_SCAN_RESTARTS: usize = 8;

/// Every top-level balanced `{...}` span, in order of appearance.
///
/// An opening brace that never closes is treated as prose and scanning resumes
/// right after it, at most `MAX_SCAN_RESTARTS` times. Operates on bytes: `{`, `}`,
/// `"` and `\` are ASCII and never occur inside a multi-byte UTF-8 sequence, so
/// every slice lies on char boundaries.
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut offset = 0usize;

    for _ in 0..=MAX_SCAN_RESTARTS {
        let rest = &text[offset..];
        match scan_from(rest, &mut objects) {
            Some(unclosed) => offset += unclosed + 1,
            None => break,
        }
    }

    objects
}

/// Scans `text`, pushing closed objects. Returns the start of an object left open at the end.
fn scan_from<'a>(text: &'a str, objects: &mut Vec<&'a str>) -> Option<usize> {
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if depth == 0 {
            if b == b'{' {
                depth = 1;
                start = i;
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    objects.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    (depth > 0).then_some(start)
}

/// Inclusive slice from the first `{` to the last `}`, if they are ordered.
fn first_last_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
