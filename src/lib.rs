//! Mixed text/math content parsing and answer-equivalence checking.
//!
//! [`parse_content`] splits raw content into text, math and paragraph-break
//! segments. [`verify`] decides whether submitted answers are mathematically
//! equivalent to accepted ones.

pub mod algebra;
pub mod bounded;
pub mod classify;
pub mod config;
pub mod error;
pub mod eval;
pub mod generated;
pub mod lex;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod scan;
pub mod verify;

pub use bounded::{parse_content_bounded, parse_generated_bounded, run_bounded, verify_bounded};
pub use classify::parse_content;
pub use config::Config;
pub use error::{ParseError, VerifyError};
pub use eval::{Evaluated, evaluate, simplify};
pub use generated::{GeneratedQuestion, parse_generated};
pub use lex::Lexer;
pub use model::{
    AnswerItem, AnswerKind, ItemResult, MatchedAgainst, Relationship, Segment, SegmentKind,
    VerificationRequest, VerificationResult,
};
pub use normalize::normalize;
pub use parse::Parser;
pub use verify::verify;
