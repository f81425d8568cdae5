use std::{collections::HashMap, fmt};

use miette::{Error, miette};
use num_traits::ToPrimitive;
use tracing::debug;

use crate::{
    Parser,
    algebra::{self, Expr},
    config::Config,
    error::ParseError,
    model::AnswerKind,
    parse::{Atom, MAX_DEPTH, MatrixKind, Op, SeriesOp, TokenTree},
};

/// An answer reduced to something comparable.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Symbolic(Value),
    Numeric(f64),
    Opaque(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Eq,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Expr),
    Relation { lhs: Expr, op: Op, rhs: Expr },
    Matrix(Vec<Vec<Expr>>),
    Tuple(Vec<Value>),
}

impl Value {
    /// Reads the relation as `diff <sense> 0`, turning `>` around.
    pub fn relation_form(&self) -> Option<(Sense, Result<Expr, algebra::AlgebraError>)> {
        let Value::Relation { lhs, op, rhs } = self else {
            return None;
        };
        Some(match op {
            Op::Less => (Sense::Lt, lhs.sub(rhs)),
            Op::LessEqual => (Sense::Le, lhs.sub(rhs)),
            Op::Greater => (Sense::Lt, rhs.sub(lhs)),
            Op::GreaterEqual => (Sense::Le, rhs.sub(lhs)),
            _ => (Sense::Eq, lhs.sub(rhs)),
        })
    }
}

impl Evaluated {
    /// The numeric value, for literals and symbolic scalars without free
    /// variables.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Evaluated::Numeric(value) => Some(*value),
            Evaluated::Symbolic(Value::Scalar(expr)) => expr.approx(),
            _ => None,
        }
    }

    pub fn repr(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Evaluated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluated::Symbolic(value) => write!(f, "{value}"),
            Evaluated::Numeric(value) => write!(f, "{value}"),
            Evaluated::Opaque(text) => f.write_str(text),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(expr) => write!(f, "{expr}"),
            Value::Relation { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Value::Matrix(rows) => {
                f.write_str("[")?;
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str("[")?;
                    for (j, entry) in row.iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{entry}")?;
                    }
                    f.write_str("]")?;
                }
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Evaluates one normalized answer. Text never fails: it is a number or an
/// opaque string.
pub fn evaluate(
    normalized: &str,
    kind: AnswerKind,
    config: &Config,
) -> Result<Evaluated, ParseError> {
    match kind {
        AnswerKind::Text => {
            let trimmed = normalized.trim();
            Ok(match trimmed.parse::<f64>() {
                Ok(value) if value.is_finite() => Evaluated::Numeric(value),
                _ => Evaluated::Opaque(trimmed.to_string()),
            })
        }
        AnswerKind::Math => evaluate_math(normalized, config)
            .map(Evaluated::Symbolic)
            .map_err(|report| {
                let reason = report
                    .chain()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(": ");
                ParseError::new(normalized, reason)
            }),
    }
}

/// Parses and evaluates a math string into its canonical value.
pub fn evaluate_math(source: &str, config: &Config) -> Result<Value, Error> {
    let tree = Parser::new(None, source).parse()?;
    let value = Evaluator::new(config).eval(&tree)?;
    debug!(tree = %tree, "evaluated expression");
    Ok(value)
}

#[derive(Debug)]
pub struct Environment<'de> {
    stack: Stack<'de>,
}

impl<'de> Environment<'de> {
    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.stack.iter().find_map(|frame| frame.get(name))
    }

    pub fn define(&mut self, name: &'de str, value: Expr) -> Result<(), Error> {
        self.stack
            .current_mut()
            .ok_or_else(|| miette!("No current binding frame"))?
            .insert(name, value);
        Ok(())
    }
}

#[derive(Debug)]
pub struct Stack<'de> {
    frames: Vec<HashMap<&'de str, Expr>>,
}

impl<'de> Stack<'de> {
    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn iter(&self) -> impl Iterator<Item = &HashMap<&'de str, Expr>> {
        self.frames.iter().rev()
    }

    pub fn current_mut(&mut self) -> Option<&mut HashMap<&'de str, Expr>> {
        self.frames.iter_mut().next_back()
    }
}

/// Walks a parsed tree bottom-up into canonical values. Bound variables of
/// sums, integrals and limits live in stacked frames.
pub struct Evaluator<'de> {
    environment: Environment<'de>,
    max_terms: usize,
    expanded: usize,
    depth: usize,
}

impl<'de> Evaluator<'de> {
    pub fn new(config: &Config) -> Self {
        Evaluator {
            environment: Environment {
                stack: Stack {
                    frames: vec![HashMap::new()],
                },
            },
            max_terms: config.max_expansion_terms,
            expanded: 0,
            depth: 0,
        }
    }

    pub fn eval(&mut self, tree: &TokenTree<'de>) -> Result<Value, Error> {
        Ok(match tree {
            TokenTree::Tuple(items) => Value::Tuple(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<_, _>>()?,
            ),
            TokenTree::Matrix {
                kind: MatrixKind::Plain,
                rows,
            } => Value::Matrix(self.matrix(rows)?),
            TokenTree::Cons(
                op @ (Op::Equal | Op::Less | Op::Greater | Op::LessEqual | Op::GreaterEqual),
                operands,
            ) => {
                let [lhs, rhs] = operands.as_slice() else {
                    return Err(miette!("relation `{op}` needs two sides"));
                };
                Value::Relation {
                    lhs: self.scalar(lhs)?,
                    op: *op,
                    rhs: self.scalar(rhs)?,
                }
            }
            _ => Value::Scalar(self.scalar(tree)?),
        })
    }

    fn matrix(&mut self, rows: &[Vec<TokenTree<'de>>]) -> Result<Vec<Vec<Expr>>, Error> {
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return Err(miette!("matrix rows have different lengths"));
        }
        rows.iter()
            .map(|row| row.iter().map(|entry| self.scalar(entry)).collect())
            .collect()
    }

    fn scalar(&mut self, tree: &TokenTree<'de>) -> Result<Expr, Error> {
        if self.depth >= MAX_DEPTH {
            return Err(miette!("expression is nested more than {MAX_DEPTH} levels deep"));
        }
        self.depth += 1;
        let result = self.reduce(tree);
        self.depth -= 1;
        result
    }

    fn reduce(&mut self, tree: &TokenTree<'de>) -> Result<Expr, Error> {
        Ok(match tree {
            TokenTree::Atom(Atom::Number(literal)) => {
                Expr::decimal(literal).ok_or_else(|| miette!("malformed number `{literal}`"))?
            }
            TokenTree::Atom(Atom::Ident(name)) => match self.environment.get(name) {
                Some(value) => value.clone(),
                None => Expr::var(name),
            },
            TokenTree::Atom(Atom::Pi) => Expr::pi(),
            TokenTree::Cons(op, operands) => {
                let values = operands
                    .iter()
                    .map(|operand| self.scalar(operand))
                    .collect::<Result<Vec<_>, _>>()?;
                match (op, values.as_slice()) {
                    (Op::Neg, [x]) => x.neg(),
                    (Op::Plus, [a, b]) => a.add(b)?,
                    (Op::Minus, [a, b]) => a.sub(b)?,
                    (Op::Star, [a, b]) => a.mul(b)?,
                    (Op::Slash, [a, b]) => a.div(b)?,
                    (Op::Caret, [a, b]) => a.power(b)?,
                    (op, _) => return Err(miette!("`{op}` is not a scalar operation here")),
                }
            }
            TokenTree::Call { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.scalar(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Expr::call(*func, args)?
            }
            TokenTree::Matrix {
                kind: MatrixKind::Determinant,
                rows,
            } => {
                let rows = self.matrix(rows)?;
                algebra::determinant(&rows)?
            }
            TokenTree::Series {
                op,
                var,
                from,
                to,
                body,
            } => self.series(*op, *var, from, to, body)?,
            TokenTree::Integral { var, bounds, body } => {
                let bounds = match bounds {
                    Some((lower, upper)) => Some((self.scalar(lower)?, self.scalar(upper)?)),
                    None => None,
                };
                let integrand = self.with_free(*var, |this| this.scalar(body))?;
                let antiderivative = integrand.integrate(var)?;
                match bounds {
                    Some((lower, upper)) => antiderivative
                        .substitute(var, &upper)?
                        .sub(&antiderivative.substitute(var, &lower)?)?,
                    None => antiderivative,
                }
            }
            TokenTree::Limit {
                var,
                approach,
                body,
            } => {
                let point = self.scalar(approach)?;
                let body = self.with_free(*var, |this| this.scalar(body))?;
                body.substitute(var, &point)
                    .map_err(|e| miette!("limit as {var} -> {point} is not a plain substitution: {e}"))?
            }
            TokenTree::Matrix { .. } | TokenTree::Tuple(_) => {
                return Err(miette!("a matrix or list cannot be used inside arithmetic"));
            }
        })
    }

    /// Evaluates with `var` unbound, shadowing any outer binding.
    fn with_free<T>(
        &mut self,
        var: &'de str,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.environment.stack.push();
        let result = self
            .environment
            .define(var, Expr::var(var))
            .and_then(|()| f(self));
        self.environment.stack.pop();
        result
    }

    fn series(
        &mut self,
        op: SeriesOp,
        var: &'de str,
        from: &TokenTree<'de>,
        to: &TokenTree<'de>,
        body: &TokenTree<'de>,
    ) -> Result<Expr, Error> {
        let from = self.integer_bound(from)?;
        let to = self.integer_bound(to)?;
        let count = usize::try_from(to - from + 1).unwrap_or(0);
        self.expanded = self.expanded.saturating_add(count);
        if self.expanded > self.max_terms {
            return Err(miette!("expansion exceeds {} terms", self.max_terms));
        }

        let mut total = match op {
            SeriesOp::Sum => Expr::zero(),
            SeriesOp::Product => Expr::one(),
        };
        self.environment.stack.push();
        let result = (from..=to).try_for_each(|k| {
            self.environment.define(var, Expr::integer(k))?;
            let term = self.scalar(body)?;
            total = match op {
                SeriesOp::Sum => total.add(&term)?,
                SeriesOp::Product => total.mul(&term)?,
            };
            Ok::<_, Error>(())
        });
        self.environment.stack.pop();
        result?;
        Ok(total)
    }

    fn integer_bound(&mut self, tree: &TokenTree<'de>) -> Result<i64, Error> {
        let value = self.scalar(tree)?;
        value
            .as_constant()
            .filter(|c| c.is_integer())
            .and_then(|c| c.to_integer().to_i64())
            .filter(|k| k.abs() < i64::MAX / 2)
            .ok_or_else(|| miette!("series bound `{value}` is not an integer"))
    }
}

/// Shorthand used by the CLI: canonical text of a math string.
pub fn simplify(source: &str, config: &Config) -> Result<String, ParseError> {
    evaluate(source, AnswerKind::Math, config).map(|value| value.repr())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(source: &str) -> String {
        simplify(source, &Config::default()).unwrap()
    }

    #[test]
    fn arithmetic_is_exact() {
        assert_eq!(canon("1+2\\cdot 3"), "7");
        assert_eq!(canon("\\frac{1}{3}+\\frac{1}{6}"), "1/2");
        assert_eq!(canon("0.1+0.2"), "3/10");
    }

    #[test]
    fn polynomials_expand() {
        assert_eq!(canon("(x+1)^2"), "x^2 + 2*x + 1");
        assert_eq!(canon("\\frac{x^2-1}{x-1}"), "x + 1");
    }

    #[test]
    fn roots() {
        assert_eq!(canon("\\sqrt{16}"), "4");
        assert_eq!(canon("\\sqrt[3]{27}"), "3");
        assert_eq!(canon("\\sqrt{8}"), "2*sqrt(2)");
        assert_eq!(canon("\\sqrt{4x}"), "2*sqrt(x)");
        assert_eq!(canon("\\sqrt{2}^2"), "2");
    }

    #[test]
    fn relations_keep_both_sides() {
        assert_eq!(canon("x+1=5"), "x + 1 = 5");
        let value = evaluate_math("x > 3", &Config::default()).unwrap();
        let (sense, diff) = value.relation_form().unwrap();
        assert_eq!(sense, Sense::Lt);
        assert_eq!(diff.unwrap().to_string(), "-x + 3");
    }

    #[test]
    fn tuples_and_matrices() {
        assert_eq!(canon("x=24, y=10"), "(x = 24, y = 10)");
        assert_eq!(
            canon("\\begin{pmatrix}1 & 2\\\\3 & 4\\end{pmatrix}"),
            "[[1, 2], [3, 4]]"
        );
        assert_eq!(canon("\\begin{vmatrix}5 & 3\\\\2 & 4\\end{vmatrix}"), "14");
    }

    #[test]
    fn sums_and_products() {
        assert_eq!(canon("\\sum_{i=1}^{10} i"), "55");
        assert_eq!(canon("\\prod_{k=1}^{5} k"), "120");
        assert_eq!(canon("\\sum_{i=1}^{3} x^i"), "x^3 + x^2 + x");
    }

    #[test]
    fn expansion_cap() {
        let config = Config {
            max_expansion_terms: 100,
            ..Config::default()
        };
        let err = evaluate("\\sum_{i=1}^{1000} i", AnswerKind::Math, &config).unwrap_err();
        assert!(err.reason.contains("expansion exceeds 100 terms"), "{err}");
    }

    #[test]
    fn integrals_and_limits() {
        assert_eq!(canon("\\int_0^1 (x^2+1) dx"), "4/3");
        assert_eq!(canon("\\int x dx"), "1/2*x^2");
        assert_eq!(canon("\\lim_{x \\to 1} \\frac{x^2-1}{x-1}"), "2");
    }

    #[test]
    fn deep_trees_are_refused() {
        let mut source = "1".to_string();
        for _ in 0..3 {
            source = format!("({source}){}", "+1".repeat(100));
        }
        let err = evaluate(&source, AnswerKind::Math, &Config::default()).unwrap_err();
        assert!(err.reason.contains("levels deep"), "{err}");
    }

    #[test]
    fn text_answers() {
        let config = Config::default();
        assert_eq!(
            evaluate(" 2.5 ", AnswerKind::Text, &config).unwrap(),
            Evaluated::Numeric(2.5)
        );
        assert_eq!(
            evaluate("inf", AnswerKind::Text, &config).unwrap(),
            Evaluated::Opaque("inf".into())
        );
        assert_eq!(
            evaluate(" blue ", AnswerKind::Text, &config).unwrap(),
            Evaluated::Opaque("blue".into())
        );
    }

    #[test]
    fn numeric_view() {
        let config = Config::default();
        let pi = evaluate("2\\pi", AnswerKind::Math, &config).unwrap();
        assert!((pi.as_numeric().unwrap() - std::f64::consts::TAU).abs() < 1e-12);
        let free = evaluate("x+1", AnswerKind::Math, &config).unwrap();
        assert_eq!(free.as_numeric(), None);
    }

    #[test]
    fn parse_failures_carry_the_expression() {
        let err = evaluate("x+", AnswerKind::Math, &Config::default()).unwrap_err();
        assert_eq!(err.expression, "x+");
        let err = evaluate("\\frac{1}{0}", AnswerKind::Math, &Config::default()).unwrap_err();
        assert!(err.reason.contains("division by zero"));
    }
}
