//! Values exchanged with callers. Field names follow the JSON contract.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentKind {
    Text,
    Math,
    ParagraphBreak,
}

/// One typed piece of parsed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub value: String,
    pub kind: SegmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_literal: Option<String>,
}

impl Segment {
    pub fn text(value: impl Into<String>) -> Self {
        Segment {
            value: value.into(),
            kind: SegmentKind::Text,
            original_literal: None,
        }
    }

    pub fn math(value: impl Into<String>, original: impl Into<String>) -> Self {
        Segment {
            value: value.into(),
            kind: SegmentKind::Math,
            original_literal: Some(original.into()),
        }
    }

    pub fn paragraph_break(stretch: impl Into<String>) -> Self {
        Segment {
            value: String::new(),
            kind: SegmentKind::ParagraphBreak,
            original_literal: Some(stretch.into()),
        }
    }

    /// The source text this segment stands for.
    pub fn literal(&self) -> &str {
        self.original_literal.as_deref().unwrap_or(&self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerKind {
    Text,
    Math,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerItem {
    pub value: String,
    pub kind: AnswerKind,
}

impl AnswerItem {
    pub fn math(value: impl Into<String>) -> Self {
        AnswerItem {
            value: value.into(),
            kind: AnswerKind::Math,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        AnswerItem {
            value: value.into(),
            kind: AnswerKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relationship {
    #[serde(rename = "ALL", alias = "AND")]
    All,
    #[serde(rename = "ANY", alias = "OR")]
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub relationship: Relationship,
    pub accepted: Vec<AnswerItem>,
    pub submitted: Vec<AnswerItem>,
}

/// Accepted representation(s) a submitted item was checked against: the
/// positional partner under `ALL`, every matching item under `ANY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchedAgainst {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub submitted_repr: String,
    pub correct: bool,
    pub matched_against: MatchedAgainst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub overall_correct: bool,
    pub per_item_results: Vec<ItemResult>,
    pub accepted_repr: Vec<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn segment_field_names() {
        let segment = Segment::math("x+1=5", "$x+1=5$");
        assert_eq!(
            serde_json::to_value(&segment).unwrap(),
            json!({"value": "x+1=5", "kind": "math", "originalLiteral": "$x+1=5$"})
        );
        let text = serde_json::to_value(Segment::text("Solve")).unwrap();
        assert_eq!(text, json!({"value": "Solve", "kind": "text"}));
        let pause = serde_json::to_value(Segment::paragraph_break("\n\n")).unwrap();
        assert_eq!(pause["kind"], "paragraph-break");
    }

    #[test]
    fn relationship_aliases() {
        let all: Relationship = serde_json::from_str(r#""AND""#).unwrap();
        let any: Relationship = serde_json::from_str(r#""OR""#).unwrap();
        assert_eq!(all, Relationship::All);
        assert_eq!(any, Relationship::Any);
        assert_eq!(serde_json::to_string(&Relationship::Any).unwrap(), r#""ANY""#);
    }

    #[test]
    fn matched_against_is_untagged() {
        let one = serde_json::to_value(MatchedAgainst::One("2".into())).unwrap();
        let many = serde_json::to_value(MatchedAgainst::Many(vec!["2".into(), "3".into()])).unwrap();
        assert_eq!(one, json!("2"));
        assert_eq!(many, json!(["2", "3"]));
    }
}
