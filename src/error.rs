use miette::Diagnostic;
use thiserror::Error;

/// A single answer expression that the math grammar rejected.
///
/// Recoverable at the list level: the engine skips the item and only escalates
/// to [`VerifyError::Validation`] when a whole side is left without items.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
#[error("cannot parse `{expression}`: {reason}")]
#[diagnostic(code(mathcheck::parse))]
pub struct ParseError {
    pub expression: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(expression: impl Into<String>, reason: impl ToString) -> Self {
        ParseError {
            expression: expression.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors that escape a verification (or bounded parsing) call.
#[derive(Error, Debug, Diagnostic)]
pub enum VerifyError {
    #[error("invalid verification request: {0}")]
    #[diagnostic(
        code(mathcheck::validation),
        help("check that both answer lists are non-empty and, for ALL, have the same length")
    )]
    Validation(String),

    #[error("call exceeded its time budget of {millis} ms")]
    #[diagnostic(
        code(mathcheck::timeout),
        help("the input may be adversarial; raise `timeout_ms` only for trusted content")
    )]
    Timeout { millis: u64 },

    #[error("internal failure: {0}")]
    #[diagnostic(code(mathcheck::internal))]
    Internal(String),
}

impl VerifyError {
    /// Client errors map to a 4xx-style outcome in the request layer; all
    /// others are server-side failures.
    pub fn is_client_error(&self) -> bool {
        matches!(self, VerifyError::Validation(_))
    }
}
