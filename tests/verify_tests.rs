use mathcheck::{
    AnswerItem, Config, MatchedAgainst, Relationship, VerificationRequest, VerifyError, verify,
};

fn request(
    relationship: Relationship,
    accepted: Vec<AnswerItem>,
    submitted: Vec<AnswerItem>,
) -> VerificationRequest {
    VerificationRequest {
        relationship,
        accepted,
        submitted,
    }
}

fn check(request: &VerificationRequest) -> bool {
    verify(request, &Config::default()).unwrap().overall_correct
}

#[test]
fn commutativity() {
    let req = request(
        Relationship::All,
        vec![AnswerItem::math("x+1")],
        vec![AnswerItem::math("1+x")],
    );
    assert!(check(&req));
}

#[test]
fn numeric_tolerance() {
    let close = request(
        Relationship::All,
        vec![AnswerItem::math("2")],
        vec![AnswerItem::text("2.00000000005")],
    );
    assert!(check(&close));
    let far = request(
        Relationship::All,
        vec![AnswerItem::math("2")],
        vec![AnswerItem::text("2.1")],
    );
    assert!(!check(&far));

    let both_text = request(
        Relationship::All,
        vec![AnswerItem::text("2")],
        vec![AnswerItem::text("2.00000000005")],
    );
    assert!(check(&both_text));
    let both_text_far = request(
        Relationship::All,
        vec![AnswerItem::text("2")],
        vec![AnswerItem::text("2.000001")],
    );
    assert!(!check(&both_text_far));
}

#[test]
fn radicals_with_free_variables() {
    for (accepted, submitted) in [
        ("x\\sqrt{8}", "2\\sqrt{2}x"),
        ("\\frac{x}{\\sqrt{2}}", "\\frac{\\sqrt{2}x}{2}"),
        ("x\\sqrt{2}\\sqrt{3}", "x\\sqrt{6}"),
        ("\\sqrt{4x}", "2\\sqrt{x}"),
    ] {
        let req = request(
            Relationship::All,
            vec![AnswerItem::math(accepted)],
            vec![AnswerItem::math(submitted)],
        );
        assert!(check(&req), "{accepted} vs {submitted}");
    }
    let req = request(
        Relationship::All,
        vec![AnswerItem::math("\\sqrt{4x}")],
        vec![AnswerItem::math("4\\sqrt{x}")],
    );
    assert!(!check(&req));
}

#[test]
fn deeply_nested_answer_is_skipped() {
    let nested = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
    let req = request(
        Relationship::Any,
        vec![AnswerItem::math("1")],
        vec![AnswerItem::math(nested.clone()), AnswerItem::math("1")],
    );
    let result = mathcheck::verify_bounded(req, &Config::default()).unwrap();
    assert!(result.overall_correct);
    assert!(!result.per_item_results[0].correct);

    let req = request(
        Relationship::All,
        vec![AnswerItem::math("1")],
        vec![AnswerItem::math(nested)],
    );
    let err = mathcheck::verify_bounded(req, &Config::default()).unwrap_err();
    assert!(err.is_client_error());
}

#[test]
fn huge_expansion_is_skipped() {
    let req = request(
        Relationship::Any,
        vec![AnswerItem::math("1")],
        vec![AnswerItem::math("(a+b+c+d)^{4096}"), AnswerItem::math("1")],
    );
    let result = mathcheck::verify_bounded(req, &Config::default()).unwrap();
    assert!(result.overall_correct);
    assert!(!result.per_item_results[0].correct);
}

#[test]
fn cardinality_guard() {
    let req = request(
        Relationship::All,
        vec![AnswerItem::math("1"), AnswerItem::math("2")],
        vec![AnswerItem::math("1")],
    );
    let err = verify(&req, &Config::default()).unwrap_err();
    assert!(matches!(err, VerifyError::Validation(_)));
    assert!(err.is_client_error());
}

#[test]
fn any_relationship() {
    let hit = request(
        Relationship::Any,
        vec![AnswerItem::math("2"), AnswerItem::math("3")],
        vec![AnswerItem::math("3")],
    );
    let result = verify(&hit, &Config::default()).unwrap();
    assert!(result.overall_correct);
    assert_eq!(
        result.per_item_results[0].matched_against,
        MatchedAgainst::Many(vec!["3".to_string()])
    );

    let miss = request(
        Relationship::Any,
        vec![AnswerItem::math("2"), AnswerItem::math("3")],
        vec![AnswerItem::math("4")],
    );
    let result = verify(&miss, &Config::default()).unwrap();
    assert!(!result.overall_correct);
    assert_eq!(result.per_item_results[0].matched_against, MatchedAgainst::Many(vec![]));
}

#[test]
fn all_is_positional() {
    let req = request(
        Relationship::All,
        vec![AnswerItem::math("x=24"), AnswerItem::math("y=10")],
        vec![AnswerItem::math("$y=10$"), AnswerItem::math("$x=24$")],
    );
    let result = verify(&req, &Config::default()).unwrap();
    assert!(!result.overall_correct);
    assert_eq!(
        result.per_item_results[0].matched_against,
        MatchedAgainst::One("x = 24".to_string())
    );
    assert_eq!(result.accepted_repr, vec!["x = 24", "y = 10"]);
}

#[test]
fn delimiters_and_cosmetics_do_not_matter() {
    let req = request(
        Relationship::All,
        vec![AnswerItem::math("\\(\\frac{1}{2}\\)")],
        vec![AnswerItem::math("$\\mathbf{0.5}$")],
    );
    assert!(check(&req));
}

#[test]
fn equations_compare_up_to_scaling() {
    let req = request(
        Relationship::All,
        vec![AnswerItem::math("y = 2x + 1")],
        vec![AnswerItem::math("2y - 4x = 2")],
    );
    assert!(check(&req));
}

#[test]
fn determinant_answer() {
    let req = request(
        Relationship::All,
        vec![AnswerItem::math("\\begin{vmatrix}5 & 3\\\\2 & 4\\end{vmatrix}")],
        vec![AnswerItem::text("14")],
    );
    assert!(check(&req));
}

#[test]
fn opaque_text_compares_exactly() {
    let req = request(
        Relationship::Any,
        vec![AnswerItem::text("no solution")],
        vec![AnswerItem::text(" no solution ")],
    );
    assert!(check(&req));
    let req = request(
        Relationship::Any,
        vec![AnswerItem::text("no solution")],
        vec![AnswerItem::text("No solution")],
    );
    assert!(!check(&req));
}

#[test]
fn empty_sides_are_rejected() {
    let req = request(Relationship::Any, vec![AnswerItem::math("  ")], vec![AnswerItem::math("1")]);
    assert!(verify(&req, &Config::default()).unwrap_err().is_client_error());
    let req = request(Relationship::Any, vec![AnswerItem::math("1")], vec![]);
    assert!(verify(&req, &Config::default()).unwrap_err().is_client_error());
}

#[test]
fn custom_tolerance() {
    let config = Config {
        tolerance: 0.01,
        round_digits: 4,
        ..Config::default()
    };
    let req = request(
        Relationship::All,
        vec![AnswerItem::math("\\pi")],
        vec![AnswerItem::text("3.14")],
    );
    assert!(verify(&req, &config).unwrap().overall_correct);
    assert!(!verify(&req, &Config::default()).unwrap().overall_correct);
}

#[test]
fn bounded_verification() {
    let req = request(
        Relationship::All,
        vec![AnswerItem::math("\\sum_{i=1}^{100} i")],
        vec![AnswerItem::text("5050")],
    );
    let result = mathcheck::verify_bounded(req, &Config::default()).unwrap();
    assert!(result.overall_correct);
}
