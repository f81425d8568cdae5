//! Splits raw content into text runs and math-candidate runs.
//!
//! One state machine drives two delimiter tables. The raw table knows
//! `\begin{name}`, `$$`, `\[`, `\(` and `$`. The sentinel table knows the
//! `-CMD-LATEX-...-` markers some generators emit instead. A run whose closer
//! never appears falls back to text together with everything after it.

use std::collections::VecDeque;

use tracing::debug;

pub const SENTINEL_BLOCK_START: &str = "-CMD-LATEX-BLOCK-START-";
pub const SENTINEL_BLOCK_END: &str = "-CMD-LATEX-BLOCK-END-";
pub const SENTINEL_START: &str = "-CMD-LATEX-START-";
pub const SENTINEL_END: &str = "-CMD-LATEX-END-";

const BEGIN: &str = "\\begin{";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ScanningText,
    InInlineMath,
    InDisplayMath,
    InEnvironment,
    InTaggedInline,
    InTaggedBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Raw,
    Sentinel,
}

impl Dialect {
    pub fn detect(input: &str) -> Self {
        if input.contains(SENTINEL_START) || input.contains(SENTINEL_BLOCK_START) {
            Dialect::Sentinel
        } else {
            Dialect::Raw
        }
    }

    /// Fixed markers in priority order. Environments are matched before
    /// these in the raw dialect.
    fn markers(&self) -> &'static [Marker] {
        match self {
            Dialect::Raw => RAW_MARKERS,
            Dialect::Sentinel => SENTINEL_MARKERS,
        }
    }
}

const RAW_MARKERS: &[Marker] = &[
    Marker::new("$$", "$$", State::InDisplayMath),
    Marker::new("\\[", "\\]", State::InDisplayMath),
    Marker::new("\\(", "\\)", State::InInlineMath),
    Marker::new("$", "$", State::InInlineMath),
];

const SENTINEL_MARKERS: &[Marker] = &[
    Marker::new(SENTINEL_BLOCK_START, SENTINEL_BLOCK_END, State::InTaggedBlock),
    Marker::new(SENTINEL_START, SENTINEL_END, State::InTaggedInline),
];

#[derive(Debug)]
struct Marker {
    open: &'static str,
    close: &'static str,
    state: State,
}

impl Marker {
    const fn new(open: &'static str, close: &'static str, state: State) -> Self {
        Marker { open, close, state }
    }
}

/// A math candidate with its delimiters.
#[derive(Debug, Clone, PartialEq)]
pub struct MathRun<'a> {
    pub state: State,
    /// Opening marker (`\begin{...}` for environments).
    pub opener: &'a str,
    /// Exact source text, delimiters included.
    pub literal: &'a str,
    /// Text between the delimiters.
    pub interior: &'a str,
    /// Sentinel runs restored to `\(`...`\)` form.
    pub restored: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Run<'a> {
    Text(&'a str),
    ParagraphBreak(&'a str),
    Math(MathRun<'a>),
}

pub struct Scanner<'a> {
    whole: &'a str,
    dialect: Dialect,
    /// Start of the text not yet emitted.
    text_start: usize,
    /// Where the search for the next opener resumes.
    byte: usize,
    queued: VecDeque<Run<'a>>,
    done: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Scanner::with_dialect(input, Dialect::detect(input))
    }

    pub fn with_dialect(input: &'a str, dialect: Dialect) -> Self {
        debug!(?dialect, "scanning content");
        Scanner {
            whole: input,
            dialect,
            text_start: 0,
            byte: 0,
            queued: VecDeque::new(),
            done: false,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Queues `whole[text_start..end]`, cut at paragraph breaks.
    fn flush_text(&mut self, end: usize) {
        let text = &self.whole[self.text_start..end];
        self.text_start = end;
        if text.is_empty() {
            return;
        }
        let mut piece_start = 0;
        let mut chars = text.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if !c.is_whitespace() {
                continue;
            }
            let mut stretch_end = i + c.len_utf8();
            let mut newlines = usize::from(c == '\n');
            while let Some(&(j, d)) = chars.peek() {
                if !d.is_whitespace() {
                    break;
                }
                newlines += usize::from(d == '\n');
                stretch_end = j + d.len_utf8();
                chars.next();
            }
            if newlines >= 2 {
                if piece_start < i {
                    self.queued.push_back(Run::Text(&text[piece_start..i]));
                }
                self.queued
                    .push_back(Run::ParagraphBreak(&text[i..stretch_end]));
                piece_start = stretch_end;
            }
        }
        if piece_start < text.len() {
            self.queued.push_back(Run::Text(&text[piece_start..]));
        }
    }

    /// Finds the opener starting exactly at `at`, returning the marker text,
    /// the entered state and, for environments, the closing marker.
    fn opener_at(&self, at: usize) -> Option<(&'a str, State, Closer<'a>)> {
        let rest = &self.whole[at..];
        if self.dialect == Dialect::Raw && rest.starts_with(BEGIN) {
            if let Some(name) = environment_name(&rest[BEGIN.len()..]) {
                let open = &rest[..BEGIN.len() + name.len() + 1];
                return Some((open, State::InEnvironment, Closer::Environment(name)));
            }
        }
        self.dialect
            .markers()
            .iter()
            .find(|marker| rest.starts_with(marker.open))
            .map(|marker| {
                (
                    &rest[..marker.open.len()],
                    marker.state,
                    Closer::Marker(marker.close),
                )
            })
    }

    /// Byte range of the closer for a run whose interior starts at `from`.
    fn find_closer(&self, closer: &Closer<'a>, from: usize) -> Option<(usize, usize)> {
        match closer {
            Closer::Marker(close) if close.starts_with('$') => {
                find_unescaped(self.whole, from, close).map(|at| (at, at + close.len()))
            }
            Closer::Marker(close) => self.whole[from..]
                .find(close)
                .map(|at| (from + at, from + at + close.len())),
            Closer::Environment(name) => {
                let open = format!("\\begin{{{name}}}");
                let close = format!("\\end{{{name}}}");
                let mut depth = 1usize;
                let mut at = from;
                loop {
                    let rest = &self.whole[at..];
                    let next_open = rest.find(&open);
                    let next_close = rest.find(&close)?;
                    match next_open {
                        Some(o) if o < next_close => {
                            depth += 1;
                            at += o + open.len();
                        }
                        _ => {
                            depth -= 1;
                            at += next_close + close.len();
                            if depth == 0 {
                                return Some((at - close.len(), at));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Advances to the next opener and queues what precedes it, the run itself
    /// or, failing a closer, the remaining input as text.
    fn step(&mut self) {
        while self.byte < self.whole.len() {
            let at = self.byte;
            let rest = &self.whole[at..];
            if self.dialect == Dialect::Raw && rest.starts_with("\\$") && !escaped(self.whole, at)
            {
                self.byte += 2;
                continue;
            }
            let Some((open, state, closer)) = self.opener_at(at) else {
                self.byte += rest.chars().next().map_or(1, char::len_utf8);
                continue;
            };

            let interior_start = at + open.len();
            let Some((close_start, mut close_end)) = self.find_closer(&closer, interior_start)
            else {
                debug!(
                    opener = open,
                    offset = at,
                    "no closing delimiter, keeping the rest as text"
                );
                break;
            };

            let mut restored = None;
            if matches!(state, State::InTaggedInline | State::InTaggedBlock) {
                let interior = &self.whole[interior_start..close_start];
                let mut canonical = restore_placeholders(interior);
                if state == State::InTaggedInline {
                    if let Some(name) = self.whole[close_end..]
                        .strip_prefix("end{")
                        .and_then(environment_name)
                    {
                        close_end += "end{".len() + name.len() + 1;
                        canonical.push_str(&format!("\\end{{{name}}}"));
                    }
                }
                restored = Some(format!("\\({canonical}\\)"));
            }

            self.flush_text(at);
            self.queued.push_back(Run::Math(MathRun {
                state,
                opener: open,
                literal: &self.whole[at..close_end],
                interior: &self.whole[interior_start..close_start],
                restored,
            }));
            self.byte = close_end;
            self.text_start = close_end;
            return;
        }

        self.flush_text(self.whole.len());
        self.byte = self.whole.len();
        self.done = true;
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Run<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(run) = self.queued.pop_front() {
                return Some(run);
            }
            if self.done {
                return None;
            }
            self.step();
        }
    }
}

enum Closer<'a> {
    Marker(&'static str),
    Environment(&'a str),
}

/// Name inside `\begin{...}`, given the text after the brace.
fn environment_name(after_brace: &str) -> Option<&str> {
    let end = after_brace.find('}')?;
    let name = &after_brace[..end];
    (!name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '*'))
        .then_some(name)
}

/// Next `pat` at or after `from` that is not escaped.
fn find_unescaped(hay: &str, from: usize, pat: &str) -> Option<usize> {
    let mut at = from;
    while let Some(offset) = hay[at..].find(pat) {
        let found = at + offset;
        if escaped(hay, found) {
            at = found + 1;
            continue;
        }
        return Some(found);
    }
    None
}

/// True when an odd run of backslashes ends right before `at`.
pub fn escaped(hay: &str, at: usize) -> bool {
    let run = hay.as_bytes()[..at]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count();
    run % 2 == 1
}

/// Undoes the generator's escaping: `-BACKSLASH-` and `-CMD-LATEX-name`
/// both stand for a backslash.
pub fn restore_placeholders(interior: &str) -> String {
    interior
        .replace("-BACKSLASH-", "\\")
        .replace("-CMD-LATEX-", "\\")
}

pub fn scan(input: &str) -> Vec<Run<'_>> {
    Scanner::new(input).collect()
}
