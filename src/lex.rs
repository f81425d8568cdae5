use std::fmt::Display;

use miette::{Diagnostic, Error, LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
#[error("Unexpected token '{token}'")]
#[diagnostic(help("remove or correct the token: `{token}`"))]
pub struct SingleTokenError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this character")]
    bad_bit: SourceSpan,

    pub token: char,
}

#[derive(Error, Debug, Diagnostic)]
#[error("Unexpected end of expression")]
#[diagnostic(help(
    "The expression ended unexpectedly, possibly due to a missing closing brace or argument."
))]
pub struct Eof {
    #[source_code]
    src: NamedSource<String>,

    #[label("Syntax Error: Unexpected end of expression")]
    bad_bit: SourceSpan,
}

impl Eof {
    pub fn build(lexer: &Lexer<'_>) -> Self {
        let end = lexer.whole.len();
        Eof {
            src: NamedSource::new(lexer.filename.unwrap_or("<answer>"), lexer.whole.to_string()),
            bad_bit: SourceSpan::from(end.saturating_sub(1)..end),
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("environment name is not closed")]
#[diagnostic(help("write the environment as `\\begin{{name}}` ... `\\end{{name}}`"))]
pub struct UnclosedEnvironment {
    #[source_code]
    src: NamedSource<String>,

    #[label("this `{{` never sees its `}}`")]
    bad_bit: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    /// Source text of the token. For `Command` this is the name without the
    /// backslash; for `Begin`/`End` it is the environment name.
    pub literal: &'de str,
    /// Byte offset just past the token.
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Underscore,
    Bar,
    Ampersand,
    RowSep,
    Equal,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Arrow,
    Number,
    Ident,
    Command,
    Begin,
    End,
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.literal;
        match self.kind {
            TokenKind::LeftParen => write!(f, "LEFT_PAREN {lit}"),
            TokenKind::RightParen => write!(f, "RIGHT_PAREN {lit}"),
            TokenKind::LeftBrace => write!(f, "LEFT_BRACE {lit}"),
            TokenKind::RightBrace => write!(f, "RIGHT_BRACE {lit}"),
            TokenKind::LeftBracket => write!(f, "LEFT_BRACKET {lit}"),
            TokenKind::RightBracket => write!(f, "RIGHT_BRACKET {lit}"),
            TokenKind::Comma => write!(f, "COMMA {lit}"),
            TokenKind::Plus => write!(f, "PLUS {lit}"),
            TokenKind::Minus => write!(f, "MINUS {lit}"),
            TokenKind::Star => write!(f, "STAR {lit}"),
            TokenKind::Slash => write!(f, "SLASH {lit}"),
            TokenKind::Caret => write!(f, "CARET {lit}"),
            TokenKind::Underscore => write!(f, "UNDERSCORE {lit}"),
            TokenKind::Bar => write!(f, "BAR {lit}"),
            TokenKind::Ampersand => write!(f, "AMPERSAND {lit}"),
            TokenKind::RowSep => write!(f, "ROW_SEP {lit}"),
            TokenKind::Equal => write!(f, "EQUAL {lit}"),
            TokenKind::Less => write!(f, "LESS {lit}"),
            TokenKind::Greater => write!(f, "GREATER {lit}"),
            TokenKind::LessEqual => write!(f, "LESS_EQUAL {lit}"),
            TokenKind::GreaterEqual => write!(f, "GREATER_EQUAL {lit}"),
            TokenKind::Arrow => write!(f, "ARROW {lit}"),
            TokenKind::Number => write!(f, "NUMBER {lit}"),
            TokenKind::Ident => write!(f, "IDENTIFIER {lit}"),
            TokenKind::Command => write!(f, "COMMAND \\{lit}"),
            TokenKind::Begin => write!(f, "BEGIN {lit}"),
            TokenKind::End => write!(f, "END {lit}"),
        }
    }
}

pub struct Lexer<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    rest: &'de str,
    pub byte: usize,
    peeked: Option<Result<Token<'de>, Error>>,
}

impl<'de> Lexer<'de> {
    pub fn new(filename: Option<&'de str>, input: &'de str) -> Self {
        Lexer {
            filename,
            whole: input,
            rest: input,
            byte: 0,
            peeked: None,
        }
    }

    /// Unlexed input, after any peeked token.
    pub fn remaining(&self) -> &'de str {
        self.rest
    }

    pub fn expect(&mut self, expected: TokenKind, error: &str) -> Result<Token<'de>, Error> {
        self.expect_where(|token| token.kind == expected, expected, error)
    }

    pub fn expect_where(
        &mut self,
        check: impl FnOnce(&Token<'de>) -> bool,
        expected: TokenKind,
        error: &str,
    ) -> Result<Token<'de>, Error> {
        match self.next() {
            Some(Ok(token)) if check(&token) => Ok(token),
            Some(Ok(token)) => Err(miette::miette!(
                help = format!("use `{expected:?}` here instead"),
                labels = vec![LabeledSpan::at(
                    token.end - token_width(&token)..token.end,
                    "here",
                )],
                "{error}",
            )
            .with_source_code(self.whole.to_string())),
            Some(Err(e)) => Err(e),
            None => Err(Eof::build(self).into()),
        }
    }

    pub fn peek(&mut self) -> Option<&Result<Token<'de>, Error>> {
        if self.peeked.is_some() {
            return self.peeked.as_ref();
        }
        self.peeked = self.next();
        self.peeked.as_ref()
    }

    /// Kind of the next token, if it lexes cleanly.
    pub fn peek_kind(&mut self) -> Option<TokenKind> {
        match self.peek() {
            Some(Ok(token)) => Some(token.kind),
            _ => None,
        }
    }

    fn source(&self) -> NamedSource<String> {
        NamedSource::new(self.filename.unwrap_or("<answer>"), self.whole.to_string())
    }

    fn advance(&mut self, bytes: usize) {
        self.byte += bytes;
        self.rest = &self.rest[bytes..];
    }

    /// Reads the `{name}` argument of `\begin`/`\end`, skipping blanks before the brace.
    fn environment_name(&mut self) -> Result<&'de str, Error> {
        let trimmed = self.rest.trim_start();
        self.advance(self.rest.len() - trimmed.len());
        if !self.rest.starts_with('{') {
            return Err(Eof::build(self).into());
        }
        let Some(close) = self.rest.find('}') else {
            return Err(UnclosedEnvironment {
                src: self.source(),
                bad_bit: SourceSpan::from(self.byte..self.byte + 1),
            }
            .into());
        };
        let name = self.rest[1..close].trim();
        self.advance(close + 1);
        Ok(name)
    }

    /// Skips a braced argument, honouring nested braces.
    fn skip_group(&mut self) {
        let trimmed = self.rest.trim_start();
        self.advance(self.rest.len() - trimmed.len());
        if !self.rest.starts_with('{') {
            return;
        }
        let mut depth = 0usize;
        for (i, c) in self.rest.char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance(i + 1);
                        return;
                    }
                }
                _ => {}
            }
        }
        let rest = self.rest.len();
        self.advance(rest);
    }
}

fn token_width(token: &Token<'_>) -> usize {
    match token.kind {
        TokenKind::Command => token.literal.len() + 1,
        _ => token.literal.len().max(1),
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Result<Token<'de>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(peeked) = self.peeked.take() {
            return Some(peeked);
        }
        loop {
            let mut chars = self.rest.chars();
            let c = chars.next()?;
            let literal = &self.rest[..c.len_utf8()];
            let cur = self.rest;
            self.rest = chars.as_str();
            self.byte += c.len_utf8();

            enum Start {
                Backslash,
                Number,
                Star,
                IfEqualElse(TokenKind, TokenKind),
            }

            let end = self.byte;
            let process = |kind: TokenKind| Some(Ok(Token { kind, literal, end }));

            let started = match c {
                '(' => return process(TokenKind::LeftParen),
                ')' => return process(TokenKind::RightParen),
                '{' => return process(TokenKind::LeftBrace),
                '}' => return process(TokenKind::RightBrace),
                '[' => return process(TokenKind::LeftBracket),
                ']' => return process(TokenKind::RightBracket),
                ',' => return process(TokenKind::Comma),
                '+' => return process(TokenKind::Plus),
                '-' | '−' => return process(TokenKind::Minus),
                '/' | '÷' => return process(TokenKind::Slash),
                '·' | '×' => return process(TokenKind::Star),
                '^' => return process(TokenKind::Caret),
                '_' => return process(TokenKind::Underscore),
                '|' => return process(TokenKind::Bar),
                '&' => return process(TokenKind::Ampersand),
                '=' => return process(TokenKind::Equal),
                '≤' => return process(TokenKind::LessEqual),
                '≥' => return process(TokenKind::GreaterEqual),
                'a'..='z' | 'A'..='Z' | 'π' => return process(TokenKind::Ident),
                '*' => Start::Star,
                '<' => Start::IfEqualElse(TokenKind::LessEqual, TokenKind::Less),
                '>' => Start::IfEqualElse(TokenKind::GreaterEqual, TokenKind::Greater),
                '\\' => Start::Backslash,
                '0'..='9' | '.' => Start::Number,
                ' ' | '\r' | '\t' | '\n' | '~' => continue, // Skip whitespace
                c => {
                    return Some(Err(SingleTokenError {
                        src: self.source(),
                        bad_bit: SourceSpan::from(self.byte - c.len_utf8()..self.byte),
                        token: c,
                    }
                    .into()));
                }
            };

            match started {
                Start::Star => {
                    // `**` is the calculator spelling of `^`
                    if self.rest.starts_with('*') {
                        self.advance(1);
                        return Some(Ok(Token {
                            kind: TokenKind::Caret,
                            literal: &cur[..2],
                            end: self.byte,
                        }));
                    }
                    return process(TokenKind::Star);
                }
                Start::Backslash => {
                    let name_len = self
                        .rest
                        .find(|c: char| !c.is_ascii_alphabetic())
                        .unwrap_or(self.rest.len());

                    if name_len == 0 {
                        // control symbol: `\\`, `\,`, `\{` ...
                        let Some(symbol) = self.rest.chars().next() else {
                            return Some(Err(Eof::build(self).into()));
                        };
                        self.advance(symbol.len_utf8());
                        let kind = match symbol {
                            '\\' => TokenKind::RowSep,
                            '{' => TokenKind::LeftBrace,
                            '}' => TokenKind::RightBrace,
                            '|' => TokenKind::Bar,
                            ',' | ';' | ':' | '!' | ' ' => continue,
                            other => {
                                return Some(Err(SingleTokenError {
                                    src: self.source(),
                                    bad_bit: SourceSpan::from(
                                        self.byte - other.len_utf8()..self.byte,
                                    ),
                                    token: other,
                                }
                                .into()));
                            }
                        };
                        return Some(Ok(Token {
                            kind,
                            literal: &cur[..1 + symbol.len_utf8()],
                            end: self.byte,
                        }));
                    }

                    let name = &self.rest[..name_len];
                    self.advance(name_len);

                    let kind = match name {
                        "cdot" | "times" | "ast" => TokenKind::Star,
                        "div" => TokenKind::Slash,
                        "le" | "leq" | "leqslant" => TokenKind::LessEqual,
                        "ge" | "geq" | "geqslant" => TokenKind::GreaterEqual,
                        "lt" => TokenKind::Less,
                        "gt" => TokenKind::Greater,
                        "to" | "rightarrow" => TokenKind::Arrow,
                        "vert" | "lvert" | "rvert" => TokenKind::Bar,
                        "lbrace" => TokenKind::LeftBrace,
                        "rbrace" => TokenKind::RightBrace,
                        "left" | "right" | "displaystyle" | "quad" | "qquad" | "limits" => {
                            continue;
                        }
                        "text" | "mbox" | "textrm" => {
                            // labels such as `\text{ cm}` carry no mathematical value
                            self.skip_group();
                            continue;
                        }
                        "begin" | "end" => {
                            let env = match self.environment_name() {
                                Ok(env) => env,
                                Err(e) => return Some(Err(e)),
                            };
                            let kind = if name == "begin" {
                                TokenKind::Begin
                            } else {
                                TokenKind::End
                            };
                            return Some(Ok(Token {
                                kind,
                                literal: env,
                                end: self.byte,
                            }));
                        }
                        _ => TokenKind::Command,
                    };
                    let literal = if kind == TokenKind::Command {
                        name
                    } else {
                        &cur[..1 + name_len]
                    };
                    return Some(Ok(Token {
                        kind,
                        literal,
                        end: self.byte,
                    }));
                }
                Start::Number => {
                    let first_non_digit = cur
                        .find(|c| !matches!(c, '0'..='9' | '.'))
                        .unwrap_or(cur.len());

                    let mut literal = &cur[..first_non_digit];

                    let mut dotted = literal.splitn(3, '.');
                    match (dotted.next(), dotted.next(), dotted.next()) {
                        (Some(one), Some(two), Some(_)) => {
                            literal = &literal[..one.len() + two.len() + 1]
                        }
                        (Some(one), Some(""), None) if !one.is_empty() => {
                            literal = &literal[..one.len()]
                        }
                        _ => {}
                    };

                    if literal == "." && self.rest.trim().is_empty() {
                        // sentence-final period after an answer
                        continue;
                    }
                    if literal == "." || literal.is_empty() {
                        return Some(Err(SingleTokenError {
                            src: self.source(),
                            bad_bit: SourceSpan::from(self.byte - 1..self.byte),
                            token: c,
                        }
                        .into()));
                    }

                    let extra_bytes = literal.len() - c.len_utf8();
                    self.advance(extra_bytes);

                    return Some(Ok(Token {
                        kind: TokenKind::Number,
                        literal,
                        end: self.byte,
                    }));
                }
                Start::IfEqualElse(yes, no) => {
                    if self.rest.starts_with('=') {
                        self.advance(1);
                        return Some(Ok(Token {
                            kind: yes,
                            literal: &cur[..2],
                            end: self.byte,
                        }));
                    } else {
                        return process(no);
                    }
                }
            }
        }
    }
}
