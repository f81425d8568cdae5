//! Payloads returned by an external question generator.
//!
//! The generator answers with `{question, correctAnswer}`. Either field may be
//! a plain string or a list of `{type, value}` parts. The `value` of a `latex`
//! part is base64-encoded LaTeX.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::{
    classify::parse_content,
    error::VerifyError,
    model::{AnswerItem, Segment},
    normalize::strip_delimiters,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PartKind {
    Text,
    Latex,
    Newline,
}

/// Shown in place of a `latex` part that is not valid base64 UTF-8.
pub const DECODING_ERROR: &str = "Decoding Error";

#[derive(Debug, Clone, Deserialize)]
struct Part {
    #[serde(rename = "type")]
    kind: PartKind,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Field {
    Raw(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    question: Field,
    correct_answer: Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub question: Vec<Segment>,
    pub correct_answer: Vec<AnswerItem>,
}

pub fn parse_generated(payload: &str) -> Result<GeneratedQuestion, VerifyError> {
    let payload: Payload = serde_json::from_str(payload)
        .map_err(|e| VerifyError::Validation(format!("invalid generator payload: {e}")))?;

    let question = match payload.question {
        Field::Raw(text) => parse_content(&text),
        Field::Parts(parts) => parts.iter().filter_map(part_segment).collect(),
    };

    let correct_answer = match payload.correct_answer {
        Field::Raw(answer) => split_answer(&answer),
        Field::Parts(parts) => {
            if parts.len() > 1 {
                warn!(parts = parts.len(), "several answer parts, keeping the last");
            }
            let Some(last) = parts.last() else {
                return Err(VerifyError::Validation(
                    "generator payload has an empty correctAnswer".to_string(),
                ));
            };
            match last.kind {
                PartKind::Latex => match decode_latex(&last.value) {
                    Some(latex) => split_answer(&latex),
                    None => vec![AnswerItem::text(DECODING_ERROR)],
                },
                PartKind::Text if !last.value.trim().is_empty() => {
                    vec![AnswerItem::text(last.value.trim())]
                }
                _ => Vec::new(),
            }
        }
    };

    Ok(GeneratedQuestion {
        question,
        correct_answer,
    })
}

fn part_segment(part: &Part) -> Option<Segment> {
    let value = part.value.trim();
    match part.kind {
        PartKind::Newline => Some(Segment::paragraph_break(if part.value.is_empty() {
            "\n\n"
        } else {
            part.value.as_str()
        })),
        PartKind::Text if !value.is_empty() => Some(Segment::text(value)),
        PartKind::Latex if !value.is_empty() => Some(match decode_latex(value) {
            Some(latex) if !latex.trim().is_empty() => Segment::math(latex.trim(), latex.as_str()),
            Some(_) => return None,
            None => Segment::text(DECODING_ERROR),
        }),
        _ => None,
    }
}

fn decode_latex(encoded: &str) -> Option<String> {
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| e.to_string())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));
    match decoded {
        Ok(latex) => Some(latex),
        Err(e) => {
            error!(value = encoded, error = %e, "latex part is not valid base64");
            None
        }
    }
}

/// `$x=24, y=10$` becomes the math items `x=24` and `y=10`.
fn split_answer(answer: &str) -> Vec<AnswerItem> {
    split_top_level(strip_delimiters(answer.trim()))
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(AnswerItem::math)
        .collect()
}

/// Splits on commas outside any bracket pair.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces
}
