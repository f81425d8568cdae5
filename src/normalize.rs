use tracing::debug;

use crate::{config::Config, parse::MAX_DEPTH};

const OUTER_DELIMITERS: &[(&str, &str)] = &[("$$", "$$"), ("\\(", "\\)"), ("\\[", "\\]"), ("$", "$")];

const DISPLAY_ENVIRONMENTS: &[&str] = &["equation", "equation*", "displaymath", "math"];

/// Commands that only change how their argument looks.
const WRAPPERS: &[&str] = &[
    "textbf",
    "mathbf",
    "boldsymbol",
    "bm",
    "mathrm",
    "mathit",
    "operatorname",
];

/// Commands dropped outright.
const STANDALONE: &[&str] = &["displaystyle", "left", "right", "quad", "qquad"];

/// Prepares a math string for evaluation: one layer of delimiters and any
/// display wrapper come off, then cosmetic commands are removed when enabled.
pub fn normalize(math: &str, config: &Config) -> String {
    let interior = strip_display_environment(strip_delimiters(math.trim()));
    if !config.strip_cosmetic {
        return interior.to_string();
    }
    match strip_cosmetic(interior, 0) {
        Some(cleaned) => cleaned.trim().to_string(),
        None => {
            debug!(math = interior, "cosmetic argument unbalanced or nested too deep");
            interior.to_string()
        }
    }
}

pub fn strip_delimiters(math: &str) -> &str {
    for (open, close) in OUTER_DELIMITERS {
        if math.len() >= open.len() + close.len() && math.starts_with(open) && math.ends_with(close)
        {
            return math[open.len()..math.len() - close.len()].trim();
        }
    }
    math
}

fn strip_display_environment(math: &str) -> &str {
    for name in DISPLAY_ENVIRONMENTS {
        let open = format!("\\begin{{{name}}}");
        let close = format!("\\end{{{name}}}");
        if let Some(inner) = math
            .strip_prefix(open.as_str())
            .and_then(|rest| rest.strip_suffix(close.as_str()))
        {
            return inner.trim();
        }
    }
    math
}

/// `None` when a wrapper's brace argument is unbalanced or wrappers nest
/// deeper than [`MAX_DEPTH`].
fn strip_cosmetic(math: &str, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    let mut out = String::with_capacity(math.len());
    let mut rest = math;
    while let Some(c) = rest.chars().next() {
        if c != '\\' {
            out.push(c);
            rest = &rest[c.len_utf8()..];
            continue;
        }

        let after = &rest[1..];
        let name_len = after
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(after.len());
        if name_len == 0 {
            // single-character command such as `\,` or `\\`
            let Some(symbol) = after.chars().next() else {
                out.push('\\');
                break;
            };
            if matches!(symbol, ',' | ';' | ':' | '!') {
                out.push(' ');
            } else {
                out.push('\\');
                out.push(symbol);
            }
            rest = &after[symbol.len_utf8()..];
            continue;
        }

        let name = &after[..name_len];
        let tail = &after[name_len..];
        if STANDALONE.contains(&name) {
            out.push(' ');
            rest = tail;
        } else if WRAPPERS.contains(&name) {
            let trimmed = tail.trim_start();
            if trimmed.starts_with('{') {
                let close = matching_brace(trimmed)?;
                let argument = strip_cosmetic(&trimmed[1..close], depth + 1)?;
                if argument.chars().all(|c| c.is_ascii_alphanumeric()) {
                    out.push_str(&argument);
                } else {
                    out.push('{');
                    out.push_str(&argument);
                    out.push('}');
                }
                rest = &trimmed[close + 1..];
            } else {
                rest = tail;
            }
        } else {
            out.push('\\');
            out.push_str(name);
            rest = tail;
        }
    }
    Some(out)
}

/// Byte offset of the brace closing the one at the start of `text`.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(math: &str) -> String {
        normalize(math, &Config::default())
    }

    #[test]
    fn strips_one_layer_of_delimiters() {
        assert_eq!(norm("$x+1$"), "x+1");
        assert_eq!(norm("$$ x $$"), "x");
        assert_eq!(norm("\\( \\frac{1}{2} \\)"), "\\frac{1}{2}");
        assert_eq!(norm("\\[y\\]"), "y");
        assert_eq!(norm("x"), "x");
    }

    #[test]
    fn strips_display_environments_only() {
        assert_eq!(norm("\\begin{equation*} a=b \\end{equation*}"), "a=b");
        let matrix = "\\begin{pmatrix}1&2\\end{pmatrix}";
        assert_eq!(norm(matrix), matrix);
    }

    #[test]
    fn removes_cosmetics() {
        assert_eq!(norm("\\mathbf{x}+\\mathrm{y}"), "x+y");
        assert_eq!(norm("\\left( x \\right)"), "( x  )");
        assert_eq!(norm("2\\,x"), "2 x");
        assert_eq!(norm("\\displaystyle\\frac{a}{b}"), "\\frac{a}{b}");
        assert_eq!(norm("\\textbf{x + 1}"), "{x + 1}");
    }

    #[test]
    fn keeps_structure() {
        assert_eq!(norm("\\int_0^1 x\\,dx"), "\\int_0^1 x dx");
        assert_eq!(norm("a \\\\ b"), "a \\\\ b");
    }

    #[test]
    fn unbalanced_argument_is_left_alone() {
        assert_eq!(norm("$\\mathbf{x + 1$"), "\\mathbf{x + 1");
    }

    #[test]
    fn deeply_nested_wrappers_are_left_alone() {
        let nested = format!("{}x{}", "\\mathbf{".repeat(5_000), "}".repeat(5_000));
        assert_eq!(norm(&nested), nested);
    }

    #[test]
    fn cosmetics_can_be_kept() {
        let config = Config {
            strip_cosmetic: false,
            ..Config::default()
        };
        assert_eq!(normalize("$\\mathbf{x}$", &config), "\\mathbf{x}");
    }
}
