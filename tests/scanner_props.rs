//! Property tests for the content scanner: segments reproduce their input,
//! and scanning the reproduction gives the same segments back.

use mathcheck::{Segment, parse_content};
use proptest::prelude::*;

fn piece() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,6}",
        "[a-z]\\\\ ",
        "[a-z]\\\\\\\\ ",
        Just(" ".to_string()),
        Just("\n".to_string()),
        Just("\n\n".to_string()),
        "\\$[a-z][+=*][0-9]\\$",
        "\\$[0-9]{1,3}",
        Just("\\(x^2\\)".to_string()),
        Just("\\[y\\]".to_string()),
        Just("$$z+1$$".to_string()),
        Just("\\begin{matrix}1&2\\end{matrix}".to_string()),
    ]
}

fn content() -> impl Strategy<Value = String> {
    prop::collection::vec(piece(), 0..24).prop_map(|pieces| pieces.concat())
}

fn reconstructed(segments: &[Segment]) -> String {
    segments.iter().map(Segment::literal).collect()
}

fn without_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn segments_reproduce_input(input in content()) {
        let segments = parse_content(&input);
        prop_assert_eq!(
            without_whitespace(&reconstructed(&segments)),
            without_whitespace(&input)
        );
    }

    #[test]
    fn rescanning_is_idempotent(input in content()) {
        let segments = parse_content(&input);
        let again = parse_content(&reconstructed(&segments));
        prop_assert_eq!(again, segments);
    }

    #[test]
    fn no_blank_text_segments(input in content()) {
        for segment in parse_content(&input) {
            prop_assert!(!segment.literal().trim().is_empty() || segment.value.is_empty());
        }
    }
}
