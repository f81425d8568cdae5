use mathcheck::{Config, VerificationRequest, parse_content, parse_generated, verify};
use serde_json::{Value, json};

#[test]
fn segments_serialize_with_contract_names() {
    let segments = parse_content("Solve $x+1=5$ for x.\n\nDone");
    let value = serde_json::to_value(&segments).unwrap();
    assert_eq!(
        value,
        json!([
            {"value": "Solve", "kind": "text"},
            {"value": "x+1=5", "kind": "math", "originalLiteral": "$x+1=5$"},
            {"value": "for x.", "kind": "text"},
            {"value": "", "kind": "paragraph-break", "originalLiteral": "\n\n"},
            {"value": "Done", "kind": "text"}
        ])
    );
}

#[test]
fn request_and_result_round_trip_through_json() {
    let request: VerificationRequest = serde_json::from_value(json!({
        "relationship": "AND",
        "accepted": [{"value": "x+1", "kind": "math"}, {"value": "4", "kind": "text"}],
        "submitted": [{"value": "1+x", "kind": "math"}, {"value": "5", "kind": "text"}]
    }))
    .unwrap();

    let result = verify(&request, &Config::default()).unwrap();
    let value: Value = serde_json::to_value(&result).unwrap();
    assert_eq!(
        value,
        json!({
            "overallCorrect": false,
            "perItemResults": [
                {"submittedRepr": "x + 1", "correct": true, "matchedAgainst": "x + 1"},
                {"submittedRepr": "5", "correct": false, "matchedAgainst": "4"}
            ],
            "acceptedRepr": ["x + 1", "4"]
        })
    );
}

#[test]
fn any_results_list_matches() {
    let request: VerificationRequest = serde_json::from_value(json!({
        "relationship": "OR",
        "accepted": [{"value": "\\frac{6}{3}", "kind": "math"}, {"value": "2", "kind": "text"}],
        "submitted": [{"value": "2", "kind": "math"}]
    }))
    .unwrap();
    let result = verify(&request, &Config::default()).unwrap();
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["overallCorrect"], json!(true));
    assert_eq!(value["perItemResults"][0]["matchedAgainst"], json!(["2", "2"]));
}

#[test]
fn unknown_relationship_is_rejected() {
    let parsed = serde_json::from_value::<VerificationRequest>(json!({
        "relationship": "SOME",
        "accepted": [],
        "submitted": []
    }));
    assert!(parsed.is_err());
}

#[test]
fn generated_payload_serializes() {
    let generated = parse_generated(
        r#"{"question": "Find $a+b=3$", "correctAnswer": "\\(a=1, b=2\\)"}"#,
    )
    .unwrap();
    let value = serde_json::to_value(&generated).unwrap();
    assert_eq!(
        value["correctAnswer"],
        json!([
            {"value": "a=1", "kind": "math"},
            {"value": "b=2", "kind": "math"}
        ])
    );
    assert_eq!(value["question"][1]["originalLiteral"], json!("$a+b=3$"));
}
