//! Decides whether submitted answers match accepted ones.

use num_rational::BigRational;
use num_traits::{Signed, Zero};
use tracing::{info, warn};

use crate::{
    algebra::Expr,
    config::Config,
    error::VerifyError,
    eval::{Evaluated, Sense, Value, evaluate},
    model::{
        AnswerItem, AnswerKind, ItemResult, MatchedAgainst, Relationship, VerificationRequest,
        VerificationResult,
    },
    normalize::normalize,
};

/// One answer after normalization. `evaluated` is `None` when it failed to
/// parse and takes no part in matching.
#[derive(Debug)]
struct Prepared {
    normalized: String,
    evaluated: Option<Evaluated>,
}

impl Prepared {
    fn new(item: &AnswerItem, config: &Config) -> Self {
        let normalized = match item.kind {
            AnswerKind::Math => normalize(&item.value, config),
            AnswerKind::Text => item.value.trim().to_string(),
        };
        let evaluated = match evaluate(&normalized, item.kind, config) {
            Ok(evaluated) => Some(evaluated),
            Err(e) => {
                warn!(expression = %e.expression, reason = %e.reason, "skipping unparseable answer");
                None
            }
        };
        Prepared {
            normalized,
            evaluated,
        }
    }

    fn repr(&self) -> String {
        match &self.evaluated {
            Some(evaluated) => evaluated.repr(),
            None => self.normalized.clone(),
        }
    }
}

fn prepare_side(
    items: &[AnswerItem],
    side: &str,
    config: &Config,
) -> Result<Vec<Prepared>, VerifyError> {
    let prepared: Vec<Prepared> = items
        .iter()
        .filter(|item| !item.value.trim().is_empty())
        .map(|item| Prepared::new(item, config))
        .collect();
    if prepared.is_empty() {
        return Err(VerifyError::Validation(format!("no {side} answers given")));
    }
    if prepared.iter().all(|p| p.evaluated.is_none()) {
        return Err(VerifyError::Validation(format!(
            "none of the {side} answers could be parsed"
        )));
    }
    Ok(prepared)
}

/// Runs one verification request.
pub fn verify(
    request: &VerificationRequest,
    config: &Config,
) -> Result<VerificationResult, VerifyError> {
    config.validate()?;
    let accepted = prepare_side(&request.accepted, "accepted", config)?;
    let submitted = prepare_side(&request.submitted, "submitted", config)?;
    let accepted_repr: Vec<String> = accepted.iter().map(Prepared::repr).collect();

    let per_item_results: Vec<ItemResult> = match request.relationship {
        Relationship::All => {
            if accepted.len() != submitted.len() {
                return Err(VerifyError::Validation(format!(
                    "ALL needs as many submitted answers as accepted ones ({} vs {})",
                    submitted.len(),
                    accepted.len()
                )));
            }
            submitted
                .iter()
                .zip(&accepted)
                .zip(&accepted_repr)
                .map(|((s, a), repr)| ItemResult {
                    submitted_repr: s.repr(),
                    correct: prepared_equal(s, a, config),
                    matched_against: MatchedAgainst::One(repr.clone()),
                })
                .collect()
        }
        Relationship::Any => submitted
            .iter()
            .map(|s| {
                let matches: Vec<String> = accepted
                    .iter()
                    .zip(&accepted_repr)
                    .filter(|(a, _)| prepared_equal(s, a, config))
                    .map(|(_, repr)| repr.clone())
                    .collect();
                ItemResult {
                    submitted_repr: s.repr(),
                    correct: !matches.is_empty(),
                    matched_against: MatchedAgainst::Many(matches),
                }
            })
            .collect(),
    };

    let overall_correct = match request.relationship {
        Relationship::All => per_item_results.iter().all(|r| r.correct),
        Relationship::Any => per_item_results.iter().any(|r| r.correct),
    };
    info!(
        relationship = ?request.relationship,
        accepted = accepted.len(),
        submitted = submitted.len(),
        correct = per_item_results.iter().filter(|r| r.correct).count(),
        overall_correct,
        "verification finished"
    );

    Ok(VerificationResult {
        overall_correct,
        per_item_results,
        accepted_repr,
    })
}

fn prepared_equal(submitted: &Prepared, accepted: &Prepared, config: &Config) -> bool {
    match (&submitted.evaluated, &accepted.evaluated) {
        (Some(s), Some(a)) => equivalent(s, a, config),
        _ => false,
    }
}

/// Pairwise equality of two evaluated answers.
pub fn equivalent(a: &Evaluated, b: &Evaluated, config: &Config) -> bool {
    if matches!(a, Evaluated::Opaque(_)) || matches!(b, Evaluated::Opaque(_)) {
        return a.repr() == b.repr();
    }
    if let (Some(x), Some(y)) = (a.as_numeric(), b.as_numeric()) {
        return numbers_match(x, y, config);
    }
    match (a, b) {
        (Evaluated::Symbolic(a), Evaluated::Symbolic(b)) => values_equal(a, b, config),
        _ => false,
    }
}

/// Compares after rounding both sides to `round_digits`, in units of the last
/// kept digit.
pub fn numbers_match(a: f64, b: f64, config: &Config) -> bool {
    let scale = 10f64.powi(config.round_digits as i32);
    let (ra, rb) = ((a * scale).round(), (b * scale).round());
    if !ra.is_finite() || !rb.is_finite() {
        return a == b || (a - b).abs() <= config.tolerance;
    }
    (ra - rb).abs() <= (config.tolerance * scale).round()
}

fn scalars_equal(a: &Expr, b: &Expr, config: &Config) -> bool {
    match (a.approx(), b.approx()) {
        (Some(x), Some(y)) => numbers_match(x, y, config),
        _ => a.equivalent(b),
    }
}

fn values_equal(a: &Value, b: &Value, config: &Config) -> bool {
    match (a, b) {
        (Value::Scalar(a), Value::Scalar(b)) => scalars_equal(a, b, config),
        (Value::Relation { .. }, Value::Relation { .. }) => relations_equal(a, b),
        (Value::Matrix(a), Value::Matrix(b)) => {
            a.len() == b.len()
                && a.iter().zip(b).all(|(ra, rb)| {
                    ra.len() == rb.len()
                        && ra.iter().zip(rb).all(|(x, y)| scalars_equal(x, y, config))
                })
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y, config))
        }
        _ => false,
    }
}

/// Same sense, and one side's `lhs - rhs` is a constant multiple of the
/// other's (a positive one for inequalities).
fn relations_equal(a: &Value, b: &Value) -> bool {
    let (Some((sense_a, Ok(diff_a))), Some((sense_b, Ok(diff_b)))) =
        (a.relation_form(), b.relation_form())
    else {
        return false;
    };
    if sense_a != sense_b {
        return false;
    }
    match (diff_a.is_zero(), diff_b.is_zero()) {
        (true, true) => true,
        (false, false) => diff_a
            .ratio_to(&diff_b)
            .is_some_and(|ratio| ratio_allowed(sense_a, &ratio)),
        _ => false,
    }
}

fn ratio_allowed(sense: Sense, ratio: &BigRational) -> bool {
    match sense {
        Sense::Eq => !ratio.is_zero(),
        Sense::Lt | Sense::Le => ratio.is_positive(),
    }
}
