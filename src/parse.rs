use std::fmt;

use miette::{Context, Error, LabeledSpan};

use crate::{
    Lexer,
    algebra::Func,
    lex::{Eof, Token, TokenKind},
};

/// Smallest binding power that still lets implicit multiplication through, used
/// for the argument of a function written without parentheses (`\sin 2x`).
const FUNCTION_ARG_BP: u8 = 6;
/// Body of `\sum`, `\prod` and `\lim` extends over products but not sums.
const OPERATOR_BODY_BP: u8 = 4;
/// Integrand extends over sums but stops at a relation.
const INTEGRAND_BP: u8 = 2;
const TIGHTEST_BP: u8 = u8::MAX;

/// Deepest nesting a parsed expression may reach.
pub const MAX_DEPTH: usize = 256;
/// Most tree nodes one expression may produce.
pub const MAX_NODES: usize = 2048;

pub struct Parser<'de> {
    whole: &'de str,
    lexer: Lexer<'de>,
    open_integrals: usize,
    depth: usize,
    nodes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenTree<'de> {
    Atom(Atom<'de>),
    Cons(Op, Vec<TokenTree<'de>>),
    Call {
        func: Func,
        args: Vec<TokenTree<'de>>,
    },
    Tuple(Vec<TokenTree<'de>>),
    Matrix {
        kind: MatrixKind,
        rows: Vec<Vec<TokenTree<'de>>>,
    },
    Series {
        op: SeriesOp,
        var: &'de str,
        from: Box<TokenTree<'de>>,
        to: Box<TokenTree<'de>>,
        body: Box<TokenTree<'de>>,
    },
    Integral {
        var: &'de str,
        bounds: Option<(Box<TokenTree<'de>>, Box<TokenTree<'de>>)>,
        body: Box<TokenTree<'de>>,
    },
    Limit {
        var: &'de str,
        approach: Box<TokenTree<'de>>,
        body: Box<TokenTree<'de>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Atom<'de> {
    Number(&'de str),
    Ident(&'de str),
    Pi,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Neg,
    Equal,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesOp {
    Sum,
    Product,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixKind {
    Plain,
    Determinant,
}

impl MatrixKind {
    fn from_environment(name: &str) -> Option<Self> {
        match name {
            "matrix" | "pmatrix" | "bmatrix" | "Bmatrix" | "smallmatrix" => {
                Some(MatrixKind::Plain)
            }
            "vmatrix" => Some(MatrixKind::Determinant),
            _ => None,
        }
    }
}

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Self {
        Parser {
            whole,
            lexer: Lexer::new(filename, whole),
            open_integrals: 0,
            depth: 0,
            nodes: 0,
        }
    }

    /// Parses the whole input as one expression, a relation, or a
    /// comma-separated list of them.
    pub fn parse(mut self) -> Result<TokenTree<'de>, Error> {
        if self.lexer.peek().is_none() {
            return Err(miette::miette!("empty expression"));
        }
        let first = self.parse_within(0)?;
        let tree = if self.lexer.peek_kind() == Some(TokenKind::Comma) {
            let mut items = vec![first];
            while self.lexer.peek_kind() == Some(TokenKind::Comma) {
                self.lexer.next();
                items.push(self.parse_within(0).wrap_err("parse list item")?);
            }
            TokenTree::Tuple(items)
        } else {
            first
        };

        match self.lexer.next() {
            None => Ok(tree),
            Some(Err(e)) => Err(e),
            Some(Ok(token)) => Err(self.unexpected(token, "unexpected trailing token")),
        }
    }

    /// Parses one operand at binding power `min_bp`. Each call and each
    /// operator it folds in counts against [`MAX_DEPTH`] and [`MAX_NODES`].
    pub fn parse_within(&mut self, min_bp: u8) -> Result<TokenTree<'de>, Error> {
        let entry = self.depth;
        let result = self
            .grow()
            .and_then(|()| self.parse_operand(min_bp));
        self.depth = entry;
        result
    }

    fn grow(&mut self) -> Result<(), Error> {
        self.depth += 1;
        self.nodes += 1;
        if self.depth > MAX_DEPTH {
            return Err(miette::miette!(
                "expression is nested more than {MAX_DEPTH} levels deep"
            ));
        }
        if self.nodes > MAX_NODES {
            return Err(miette::miette!(
                "expression has more than {MAX_NODES} parts"
            ));
        }
        Ok(())
    }

    fn parse_operand(&mut self, min_bp: u8) -> Result<TokenTree<'de>, Error> {
        let lhs = match self.lexer.next() {
            Some(Ok(token)) => token,
            None => return Err(Eof::build(&self.lexer).into()),
            Some(Err(e)) => return Err(e),
        };

        let mut lhs = match lhs {
            Token {
                kind: TokenKind::Number,
                literal,
                ..
            } => TokenTree::Atom(Atom::Number(literal)),
            Token {
                kind: TokenKind::Ident,
                literal: "π",
                ..
            } => TokenTree::Atom(Atom::Pi),
            Token {
                kind: TokenKind::Ident,
                ..
            } => self.parse_identifier(lhs)?,

            Token {
                kind: TokenKind::LeftParen | TokenKind::LeftBracket,
                ..
            } => {
                let terminator = match lhs.kind {
                    TokenKind::LeftParen => TokenKind::RightParen,
                    _ => TokenKind::RightBracket,
                };
                let first = self.parse_within(0).wrap_err("in group")?;
                let tree = if self.lexer.peek_kind() == Some(TokenKind::Comma) {
                    let mut items = vec![first];
                    while self.lexer.peek_kind() == Some(TokenKind::Comma) {
                        self.lexer.next();
                        items.push(self.parse_within(0).wrap_err("in tuple")?);
                    }
                    TokenTree::Tuple(items)
                } else {
                    first
                };
                self.lexer
                    .expect(terminator, "Unexpected end of group")
                    .wrap_err("after group")?;
                tree
            }
            Token {
                kind: TokenKind::LeftBrace,
                ..
            } => {
                let tree = self.parse_within(0).wrap_err("in braced group")?;
                self.lexer
                    .expect(TokenKind::RightBrace, "Unexpected end of braced group")
                    .wrap_err("after braced group")?;
                tree
            }
            Token {
                kind: TokenKind::Bar,
                ..
            } => {
                let inner = self.parse_within(0).wrap_err("in absolute value")?;
                self.lexer
                    .expect(TokenKind::Bar, "Missing closing `|`")
                    .wrap_err("after absolute value")?;
                TokenTree::Call {
                    func: Func::Abs,
                    args: vec![inner],
                }
            }

            Token {
                kind: TokenKind::Minus | TokenKind::Plus,
                ..
            } => {
                let op = match lhs.kind {
                    TokenKind::Minus => Op::Neg,
                    TokenKind::Plus => Op::Plus,
                    _ => unreachable!(),
                };
                let ((), r_bp) = prefix_binding_power(op);
                let rhs = self.parse_within(r_bp).wrap_err("parse RHS")?;
                match op {
                    Op::Plus => rhs,
                    _ => TokenTree::Cons(op, vec![rhs]),
                }
            }

            Token {
                kind: TokenKind::Command,
                ..
            } => self.parse_command(lhs)?,
            Token {
                kind: TokenKind::Begin,
                ..
            } => self.parse_matrix(lhs)?,

            token => return Err(self.unexpected(token, "expected an expression")),
        };

        loop {
            let op = match self.lexer.peek().map(|res| res.as_ref().ok().copied()) {
                None => break,
                Some(Some(token)) => token,
                Some(None) => {
                    return Err(self
                        .lexer
                        .next()
                        .and_then(Result::err)
                        .unwrap_or_else(|| miette::miette!("Error while lexing")));
                }
            };

            let infix = match op.kind {
                TokenKind::Plus => Some(Op::Plus),
                TokenKind::Minus => Some(Op::Minus),
                TokenKind::Star => Some(Op::Star),
                TokenKind::Slash => Some(Op::Slash),
                TokenKind::Caret => Some(Op::Caret),
                TokenKind::Equal => Some(Op::Equal),
                TokenKind::Less => Some(Op::Less),
                TokenKind::Greater => Some(Op::Greater),
                TokenKind::LessEqual => Some(Op::LessEqual),
                TokenKind::GreaterEqual => Some(Op::GreaterEqual),
                TokenKind::Number
                | TokenKind::Ident
                | TokenKind::Command
                | TokenKind::LeftParen
                | TokenKind::LeftBrace
                | TokenKind::Begin => None,
                _ => break,
            };

            let Some(op) = infix else {
                // juxtaposition: `2x`, `x\sqrt{2}`, `(a+b)(a-b)`
                if self.ends_integrand(&op) {
                    break;
                }
                if min_bp >= FUNCTION_ARG_BP && op.kind == TokenKind::Command {
                    if Func::from_command(op.literal).is_some() {
                        break;
                    }
                }
                let (l_bp, r_bp) = implicit_binding_power();
                if l_bp < min_bp {
                    break;
                }
                self.grow()?;
                let rhs = self.parse_within(r_bp).wrap_err("parse implicit product")?;
                lhs = TokenTree::Cons(Op::Star, vec![lhs, rhs]);
                continue;
            };

            let (l_bp, r_bp) = infix_binding_power(op);
            if l_bp < min_bp {
                break;
            }
            self.lexer.next();
            self.grow()?;
            let rhs = self
                .parse_within(r_bp)
                .wrap_err_with(|| format!("on the right-hand side of `{op}`"))?;
            lhs = TokenTree::Cons(op, vec![lhs, rhs]);
        }

        Ok(lhs)
    }

    /// `x`, `x_1`, `x_{ab}`: the subscript stays part of the variable name.
    fn parse_identifier(&mut self, ident: Token<'de>) -> Result<TokenTree<'de>, Error> {
        let start = ident.end - ident.literal.len();
        if self.lexer.peek_kind() != Some(TokenKind::Underscore) {
            return Ok(TokenTree::Atom(Atom::Ident(ident.literal)));
        }
        self.lexer.next();
        let end = match self.lexer.next() {
            Some(Ok(Token {
                kind: TokenKind::Number | TokenKind::Ident,
                end,
                ..
            })) => end,
            Some(Ok(Token {
                kind: TokenKind::LeftBrace,
                ..
            })) => loop {
                match self.lexer.next() {
                    Some(Ok(Token {
                        kind: TokenKind::RightBrace,
                        end,
                        ..
                    })) => break end,
                    Some(Ok(Token {
                        kind: TokenKind::Number | TokenKind::Ident,
                        ..
                    })) => {}
                    Some(Ok(token)) => {
                        return Err(self.unexpected(token, "subscripts may only hold a name"));
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(Eof::build(&self.lexer).into()),
                }
            },
            Some(Ok(token)) => return Err(self.unexpected(token, "expected a subscript")),
            Some(Err(e)) => return Err(e),
            None => return Err(Eof::build(&self.lexer).into()),
        };
        Ok(TokenTree::Atom(Atom::Ident(&self.whole[start..end])))
    }

    fn parse_command(&mut self, command: Token<'de>) -> Result<TokenTree<'de>, Error> {
        let name = command.literal;
        match name {
            "frac" | "dfrac" | "tfrac" | "cfrac" => {
                let numerator = self.parse_argument().wrap_err("fraction numerator")?;
                let denominator = self.parse_argument().wrap_err("fraction denominator")?;
                Ok(TokenTree::Cons(Op::Slash, vec![numerator, denominator]))
            }
            "sqrt" => {
                if self.lexer.peek_kind() == Some(TokenKind::LeftBracket) {
                    self.lexer.next();
                    let index = self.parse_within(0).wrap_err("root index")?;
                    self.lexer
                        .expect(TokenKind::RightBracket, "Unclosed root index")?;
                    let radicand = self.parse_argument().wrap_err("radicand")?;
                    Ok(TokenTree::Call {
                        func: Func::Root,
                        args: vec![radicand, index],
                    })
                } else {
                    let radicand = self.parse_argument().wrap_err("radicand")?;
                    Ok(TokenTree::Call {
                        func: Func::Sqrt,
                        args: vec![radicand],
                    })
                }
            }
            "pi" => Ok(TokenTree::Atom(Atom::Pi)),
            "mathrm" | "mathbf" | "mathit" | "textbf" | "boldsymbol" | "bm" | "operatorname" => {
                self.parse_argument()
            }
            "sum" => self.parse_series(SeriesOp::Sum),
            "prod" => self.parse_series(SeriesOp::Product),
            "int" => self.parse_integral(),
            "lim" => self.parse_limit(),
            "log" if self.lexer.peek_kind() == Some(TokenKind::Underscore) => {
                self.lexer.next();
                let base = self.parse_argument().wrap_err("logarithm base")?;
                let arg = self.parse_function_argument()?;
                Ok(TokenTree::Call {
                    func: Func::Log,
                    args: vec![arg, base],
                })
            }
            _ => {
                let Some(func) = Func::from_command(name) else {
                    return Err(self.unexpected(command, "unsupported command"));
                };
                // `\sin^2 x` squares the application, not the argument
                let power = if self.lexer.peek_kind() == Some(TokenKind::Caret) {
                    self.lexer.next();
                    Some(self.parse_argument().wrap_err("function power")?)
                } else {
                    None
                };
                let arg = self.parse_function_argument()?;
                let call = TokenTree::Call {
                    func,
                    args: vec![arg],
                };
                Ok(match power {
                    Some(power) => TokenTree::Cons(Op::Caret, vec![call, power]),
                    None => call,
                })
            }
        }
    }

    /// A braced group, or a single tight atom as in `\frac12` or `\sqrt x`.
    fn parse_argument(&mut self) -> Result<TokenTree<'de>, Error> {
        if self.lexer.peek_kind() == Some(TokenKind::LeftBrace) {
            self.lexer.next();
            let tree = self.parse_within(0)?;
            self.lexer
                .expect(TokenKind::RightBrace, "Unclosed argument")?;
            Ok(tree)
        } else {
            self.parse_within(TIGHTEST_BP)
        }
    }

    fn parse_function_argument(&mut self) -> Result<TokenTree<'de>, Error> {
        match self.lexer.peek_kind() {
            Some(TokenKind::LeftParen | TokenKind::LeftBrace) => self.parse_within(TIGHTEST_BP),
            _ => self
                .parse_within(FUNCTION_ARG_BP)
                .wrap_err("function argument"),
        }
    }

    /// `_{i=a}^{b}` in either order, followed by the body.
    fn parse_series(&mut self, op: SeriesOp) -> Result<TokenTree<'de>, Error> {
        let mut lower = None;
        let mut upper = None;
        for _ in 0..2 {
            match self.lexer.peek_kind() {
                Some(TokenKind::Underscore) if lower.is_none() => {
                    self.lexer.next();
                    self.lexer.expect(TokenKind::LeftBrace, "Expected `{` after `_`")?;
                    let var = self
                        .lexer
                        .expect(TokenKind::Ident, "Expected the index variable")?;
                    self.lexer
                        .expect(TokenKind::Equal, "Expected `=` after the index variable")?;
                    let from = self.parse_within(0).wrap_err("lower bound")?;
                    self.lexer
                        .expect(TokenKind::RightBrace, "Unclosed lower bound")?;
                    lower = Some((var.literal, from));
                }
                Some(TokenKind::Caret) if upper.is_none() => {
                    self.lexer.next();
                    upper = Some(self.parse_argument().wrap_err("upper bound")?);
                }
                _ => break,
            }
        }
        let (Some((var, from)), Some(to)) = (lower, upper) else {
            return Err(miette::miette!(
                help = "write the bounds as `_{i=1}^{n}`",
                "sums and products need both bounds"
            ));
        };
        let body = self
            .parse_within(OPERATOR_BODY_BP)
            .wrap_err("series body")?;
        Ok(TokenTree::Series {
            op,
            var,
            from: Box::new(from),
            to: Box::new(to),
            body: Box::new(body),
        })
    }

    fn parse_integral(&mut self) -> Result<TokenTree<'de>, Error> {
        let mut lower = None;
        let mut upper = None;
        for _ in 0..2 {
            match self.lexer.peek_kind() {
                Some(TokenKind::Underscore) if lower.is_none() => {
                    self.lexer.next();
                    lower = Some(self.parse_argument().wrap_err("lower limit")?);
                }
                Some(TokenKind::Caret) if upper.is_none() => {
                    self.lexer.next();
                    upper = Some(self.parse_argument().wrap_err("upper limit")?);
                }
                _ => break,
            }
        }
        let bounds = match (lower, upper) {
            (Some(lower), Some(upper)) => Some((Box::new(lower), Box::new(upper))),
            (None, None) => None,
            _ => {
                return Err(miette::miette!(
                    "a definite integral needs both limits"
                ));
            }
        };

        self.open_integrals += 1;
        let first = self.lexer.peek().and_then(|res| res.as_ref().ok().copied());
        let body = match first {
            Some(token) if self.ends_integrand(&token) => TokenTree::Atom(Atom::Number("1")),
            _ => self.parse_within(INTEGRAND_BP).wrap_err("integrand")?,
        };
        self.open_integrals -= 1;

        self.lexer
            .expect_where(|t| t.literal == "d", TokenKind::Ident, "Expected the differential `d`")?;
        let var = self
            .lexer
            .expect(TokenKind::Ident, "Expected the integration variable")?;
        Ok(TokenTree::Integral {
            var: var.literal,
            bounds,
            body: Box::new(body),
        })
    }

    fn parse_limit(&mut self) -> Result<TokenTree<'de>, Error> {
        self.lexer
            .expect(TokenKind::Underscore, "Expected `_` after `\\lim`")?;
        self.lexer.expect(TokenKind::LeftBrace, "Expected `{`")?;
        let var = self
            .lexer
            .expect(TokenKind::Ident, "Expected the limit variable")?;
        self.lexer
            .expect(TokenKind::Arrow, "Expected `\\to` in the limit")?;
        let approach = self.parse_within(0).wrap_err("limit point")?;
        self.lexer.expect(TokenKind::RightBrace, "Unclosed limit")?;
        let body = self
            .parse_within(OPERATOR_BODY_BP)
            .wrap_err("limit body")?;
        Ok(TokenTree::Limit {
            var: var.literal,
            approach: Box::new(approach),
            body: Box::new(body),
        })
    }

    fn parse_matrix(&mut self, begin: Token<'de>) -> Result<TokenTree<'de>, Error> {
        let Some(kind) = MatrixKind::from_environment(begin.literal) else {
            return Err(self.unexpected(begin, "unsupported environment"));
        };

        let mut rows = Vec::new();
        let mut row = Vec::new();
        loop {
            if let Some(TokenKind::End | TokenKind::RowSep) = self.lexer.peek_kind() {
                // empty trailing row
            } else {
                row.push(self.parse_within(0).wrap_err("matrix entry")?);
            }
            match self.lexer.next() {
                Some(Ok(Token {
                    kind: TokenKind::Ampersand,
                    ..
                })) => {}
                Some(Ok(Token {
                    kind: TokenKind::RowSep,
                    ..
                })) => rows.push(std::mem::take(&mut row)),
                Some(Ok(Token {
                    kind: TokenKind::End,
                    literal,
                    ..
                })) if literal == begin.literal => {
                    rows.push(row);
                    break;
                }
                Some(Ok(token)) => {
                    return Err(self.unexpected(token, "expected `&`, `\\\\` or the matching `\\end`"));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(Eof::build(&self.lexer).into()),
            }
        }
        rows.retain(|row| !row.is_empty());

        let width = rows.first().map_or(0, Vec::len);
        if width == 0 || rows.iter().any(|row| row.len() != width) {
            return Err(miette::miette!(
                help = "every row needs the same number of `&`-separated entries",
                "ragged or empty matrix"
            ));
        }
        Ok(TokenTree::Matrix { kind, rows })
    }

    /// Inside an integral, `d` directly followed by a variable closes the integrand.
    fn ends_integrand(&self, token: &Token<'de>) -> bool {
        self.open_integrals > 0
            && token.kind == TokenKind::Ident
            && token.literal == "d"
            && self
                .lexer
                .remaining()
                .trim_start()
                .starts_with(|c: char| c.is_ascii_alphabetic())
    }

    fn unexpected(&self, token: Token<'de>, message: &str) -> Error {
        let width = match token.kind {
            TokenKind::Command => token.literal.len() + 1,
            _ => token.literal.len().max(1),
        };
        let start = token.end.saturating_sub(width);
        miette::miette!(
            labels = vec![LabeledSpan::at(start..token.end, "here")],
            "{message}"
        )
        .with_source_code(self.whole.to_string())
    }
}

fn prefix_binding_power(op: Op) -> ((), u8) {
    match op {
        Op::Plus | Op::Neg => ((), 9),
        _ => unreachable!("not a prefix operator: {op:?}"),
    }
}

fn infix_binding_power(op: Op) -> (u8, u8) {
    match op {
        Op::Equal | Op::Less | Op::Greater | Op::LessEqual | Op::GreaterEqual => (1, 2),
        Op::Plus | Op::Minus => (3, 4),
        Op::Star | Op::Slash => (5, 6),
        Op::Caret => (13, 12),
        Op::Neg => unreachable!("not an infix operator"),
    }
}

fn implicit_binding_power() -> (u8, u8) {
    (7, 8)
}

impl fmt::Display for TokenTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenTree::Atom(Atom::Number(n)) => write!(f, "{n}"),
            TokenTree::Atom(Atom::Ident(name)) => write!(f, "{name}"),
            TokenTree::Atom(Atom::Pi) => write!(f, "pi"),
            TokenTree::Cons(op, trees) => {
                write!(f, "({op}")?;
                for tree in trees {
                    write!(f, " {tree}")?;
                }
                write!(f, ")")
            }
            TokenTree::Call { func, args } => {
                write!(f, "({func}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            TokenTree::Tuple(items) => {
                write!(f, "(tuple")?;
                for item in items {
                    write!(f, " {item}")?;
                }
                write!(f, ")")
            }
            TokenTree::Matrix { kind, rows } => {
                let name = match kind {
                    MatrixKind::Plain => "matrix",
                    MatrixKind::Determinant => "det",
                };
                write!(f, "({name}")?;
                for row in rows {
                    write!(f, " [")?;
                    for (i, entry) in row.iter().enumerate() {
                        if i > 0 {
                            write!(f, " ")?;
                        }
                        write!(f, "{entry}")?;
                    }
                    write!(f, "]")?;
                }
                write!(f, ")")
            }
            TokenTree::Series {
                op,
                var,
                from,
                to,
                body,
            } => {
                let name = match op {
                    SeriesOp::Sum => "sum",
                    SeriesOp::Product => "prod",
                };
                write!(f, "({name} {var} {from} {to} {body})")
            }
            TokenTree::Integral { var, bounds, body } => match bounds {
                Some((lower, upper)) => write!(f, "(int {var} {lower} {upper} {body})"),
                None => write!(f, "(int {var} {body})"),
            },
            TokenTree::Limit {
                var,
                approach,
                body,
            } => write!(f, "(lim {var} {approach} {body})"),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Star => "*",
            Op::Slash => "/",
            Op::Caret => "^",
            Op::Neg => "neg",
            Op::Equal => "=",
            Op::Less => "<",
            Op::Greater => ">",
            Op::LessEqual => "<=",
            Op::GreaterEqual => ">=",
        };
        f.write_str(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sexpr(input: &str) -> String {
        Parser::new(None, input).parse().unwrap().to_string()
    }

    #[test]
    fn precedence() {
        assert_eq!(sexpr("1 + 2 * 3"), "(+ 1 (* 2 3))");
        assert_eq!(sexpr("-x^2"), "(neg (^ x 2))");
        assert_eq!(sexpr("2^3^2"), "(^ 2 (^ 3 2))");
    }

    #[test]
    fn implicit_multiplication() {
        assert_eq!(sexpr("2xy"), "(* (* 2 x) y)");
        assert_eq!(sexpr("(a+b)(a-b)"), "(* (+ a b) (- a b))");
        assert_eq!(sexpr("3x^2"), "(* 3 (^ x 2))");
    }

    #[test]
    fn fractions_and_roots() {
        assert_eq!(sexpr("\\frac{x+1}{2}"), "(/ (+ x 1) 2)");
        assert_eq!(sexpr("\\sqrt[3]{8}"), "(root 8 3)");
        assert_eq!(sexpr("\\sqrt x"), "(sqrt x)");
    }

    #[test]
    fn functions_without_parentheses() {
        assert_eq!(sexpr("\\sin 2x"), "(sin (* 2 x))");
        assert_eq!(sexpr("\\sin x \\cos x"), "(* (sin x) (cos x))");
        assert_eq!(sexpr("\\sin^2 x"), "(^ (sin x) 2)");
    }

    #[test]
    fn relations_and_lists() {
        assert_eq!(sexpr("x = 24, y = 10"), "(tuple (= x 24) (= y 10))");
        assert_eq!(sexpr("x \\le 3"), "(<= x 3)");
    }

    #[test]
    fn subscripted_variables() {
        assert_eq!(sexpr("x_1 + x_{12}"), "(+ x_1 x_{12})");
    }

    #[test]
    fn matrices() {
        assert_eq!(
            sexpr("\\begin{vmatrix} 5 & 3 \\\\ 2 & 4 \\end{vmatrix}"),
            "(det [5 3] [2 4])"
        );
        assert_eq!(
            sexpr("\\begin{pmatrix} 1 & 0 \\\\ 0 & 1 \\\\ \\end{pmatrix}"),
            "(matrix [1 0] [0 1])"
        );
    }

    #[test]
    fn big_operators() {
        assert_eq!(sexpr("\\sum_{i=1}^{n} i^2"), "(sum i 1 n (^ i 2))");
        assert_eq!(sexpr("\\int_{0}^{1} x^2 + 1 dx"), "(int x 0 1 (+ (^ x 2) 1))");
        assert_eq!(sexpr("\\int x \\, dx"), "(int x x)");
        assert_eq!(sexpr("\\lim_{x \\to 2} x + 1"), "(+ (lim x 2 x) 1)");
    }

    #[test]
    fn rejects_dangling_operator() {
        assert!(Parser::new(None, "x +").parse().is_err());
        assert!(Parser::new(None, "\\frac{1}").parse().is_err());
        assert!(Parser::new(None, "").parse().is_err());
    }

    fn fails_with(input: &str, message: &str) -> bool {
        match Parser::new(None, input).parse() {
            Ok(_) => false,
            Err(err) => err.chain().any(|cause| cause.to_string().contains(message)),
        }
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let nested = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(fails_with(&nested, "levels deep"));
        assert!(fails_with(&vec!["2"; 5_000].join("^"), "levels deep"));
        assert!(fails_with(&format!("{}1", "-".repeat(5_000)), "levels deep"));
        assert!(fails_with(&vec!["1"; 5_000].join("+"), "levels deep"));

        let shallow = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(sexpr(&shallow), "1");
        assert!(Parser::new(None, &vec!["1"; 50].join("+")).parse().is_ok());
    }

    #[test]
    fn oversized_input_is_an_error() {
        assert!(fails_with(&vec!["1"; 3_000].join(", "), "parts"));
    }

    #[test]
    fn rejects_unknown_environment() {
        assert!(
            Parser::new(None, "\\begin{cases} x \\end{cases}")
                .parse()
                .is_err()
        );
    }
}
