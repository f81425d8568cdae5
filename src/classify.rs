use tracing::debug;

use crate::{
    model::Segment,
    scan::{MathRun, Run, Scanner, State, escaped},
};

/// Turns one scanned run into a segment. Blank text runs yield nothing.
pub fn classify(run: Run<'_>) -> Option<Segment> {
    match run {
        Run::Text(text) => {
            let text = trim_text(text);
            (!text.is_empty()).then(|| Segment::text(text))
        }
        Run::ParagraphBreak(stretch) => Some(Segment::paragraph_break(stretch)),
        Run::Math(math) => Some(classify_math(math)),
    }
}

/// Trims surrounding whitespace, except a character escaped by a trailing
/// backslash (`\ ` is a control space).
fn trim_text(text: &str) -> &str {
    let text = text.trim_start();
    let trimmed = text.trim_end();
    if !escaped(trimmed, trimmed.len()) {
        return trimmed;
    }
    match text[trimmed.len()..].chars().next() {
        Some(space) => &text[..trimmed.len() + space.len_utf8()],
        None => trimmed,
    }
}

fn classify_math(math: MathRun<'_>) -> Segment {
    let interior = math.interior.trim();
    if interior.is_empty() {
        debug!(literal = math.literal, "empty math delimiters, keeping as text");
        return Segment::text(math.literal);
    }

    match math.state {
        State::InTaggedInline | State::InTaggedBlock => {
            let canonical = math
                .restored
                .unwrap_or_else(|| format!("\\({interior}\\)"));
            Segment::math(canonical, math.literal)
        }
        State::InInlineMath if math.opener == "$" => {
            if looks_like_math(interior) {
                Segment::math(interior, math.literal)
            } else {
                debug!(literal = math.literal, "dollar run is not math, keeping as text");
                Segment::text(math.literal)
            }
        }
        _ => Segment::math(math.literal, math.literal),
    }
}

/// Content of a `$` pair counts as math when a letter is later followed by an
/// operator, or when it contains a `\command`, and it is not a bare numeral.
pub fn looks_like_math(content: &str) -> bool {
    if is_numeral(content) {
        return false;
    }

    let mut seen_letter = false;
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            'a'..='z' | 'A'..='Z' => seen_letter = true,
            '+' | '-' | '*' | '/' | '=' if seen_letter => return true,
            '\\' if chars.peek().is_some_and(char::is_ascii_lowercase) => return true,
            _ => {}
        }
    }
    false
}

fn is_numeral(content: &str) -> bool {
    let content = content.trim();
    let (whole, fraction) = content.split_once('.').unwrap_or((content, ""));
    !(whole.is_empty() && fraction.is_empty())
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c.is_ascii_digit())
}

/// Scans, classifies and collects the segments of a raw content string.
pub fn parse_content(input: &str) -> Vec<Segment> {
    Scanner::new(input).filter_map(classify).collect()
}

#[cfg(test)]
mod tests {
    use crate::model::SegmentKind;

    use super::*;

    #[test]
    fn math_rule() {
        assert!(looks_like_math("x+1=5"));
        assert!(looks_like_math("a 2 = b"));
        assert!(looks_like_math("\\frac{1}{2}"));
        assert!(!looks_like_math("150"));
        assert!(!looks_like_math("3.50"));
        assert!(!looks_like_math("150 and "));
        assert!(!looks_like_math("1+2"));
        assert!(!looks_like_math("\\$"));
    }

    #[test]
    fn solve_sentence() {
        let segments = parse_content("Solve $x+1=5$ for x.");
        assert_eq!(
            segments,
            vec![
                Segment::text("Solve"),
                Segment::math("x+1=5", "$x+1=5$"),
                Segment::text("for x."),
            ]
        );
    }

    #[test]
    fn prices_stay_text() {
        let segments = parse_content("Pay $150 and $200 today");
        assert_eq!(
            segments,
            vec![
                Segment::text("Pay"),
                Segment::text("$150 and $"),
                Segment::text("200 today"),
            ]
        );
    }

    #[test]
    fn empty_delimiters_become_text() {
        assert_eq!(parse_content("a $$ $$ b")[1], Segment::text("$$ $$"));
    }

    #[test]
    fn two_char_delimiters_keep_original() {
        let segments = parse_content("Then \\(x^2\\) holds");
        assert_eq!(segments[1], Segment::math("\\(x^2\\)", "\\(x^2\\)"));
    }

    #[test]
    fn environments_are_math() {
        let input = "\\begin{vmatrix}1&2\\\\3&4\\end{vmatrix}";
        let segments = parse_content(input);
        assert_eq!(segments, vec![Segment::math(input, input)]);
    }

    #[test]
    fn paragraph_break_segments() {
        let segments = parse_content("Intro.\n\n  $y=2x$ rest");
        assert_eq!(segments[1].kind, SegmentKind::ParagraphBreak);
        assert_eq!(segments[1].original_literal.as_deref(), Some("\n\n  "));
        assert_eq!(segments[2].value, "y=2x");
    }

    #[test]
    fn sentinel_runs_use_canonical_form() {
        let raw = "-CMD-LATEX-START-x^2-CMD-LATEX-END-";
        let segments = parse_content(&format!("Find {raw}."));
        assert_eq!(segments[1], Segment::math("\\(x^2\\)", raw));
        assert_eq!(segments[2], Segment::text("."));
    }
}
