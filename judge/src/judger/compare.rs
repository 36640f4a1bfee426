//! Output comparison
//!
//! Two passes: first after trimming trailing layout and dropping carriage
//! returns, then (on mismatch) with every space and newline removed. A match
//! only on the second pass is a presentation error.

/// Result of comparing produced output with the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Match,
    Presentation,
    Mismatch,
}

pub fn compare_output(actual: &[u8], expected: &[u8]) -> Comparison {
    let actual = normalize(actual);
    let expected = normalize(expected);
    if actual == expected {
        return Comparison::Match;
    }

    if strip_layout(&actual) == strip_layout(&expected) {
        Comparison::Presentation
    } else {
        Comparison::Mismatch
    }
}

fn normalize(bytes: &[u8]) -> Vec<u8> {
    let end = bytes
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\r' | b'\n'))
        .map_or(0, |pos| pos + 1);
    bytes[..end].iter().copied().filter(|&b| b != b'\r').collect()
}

fn strip_layout(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .copied()
        .filter(|b| !matches!(b, b' ' | b'\n'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_and_trailing_newline_accepted() {
        assert_eq!(compare_output(b"3\n", b"3\r\n"), Comparison::Match);
        assert_eq!(compare_output(b"1 2\r\n3 4", b"1 2\n3 4\n\n  "), Comparison::Match);
    }

    #[test]
    fn test_inner_spacing_is_presentation_error() {
        assert_eq!(compare_output(b"1 2 3", b"1  2 3"), Comparison::Presentation);
        assert_eq!(compare_output(b"1\n2\n", b"1 2\n"), Comparison::Presentation);
    }

    #[test]
    fn test_different_values_mismatch() {
        assert_eq!(compare_output(b"4", b"5"), Comparison::Mismatch);
        assert_eq!(compare_output(b"", b"0"), Comparison::Mismatch);
    }

    #[test]
    fn test_tabs_are_not_layout() {
        assert_eq!(compare_output(b"1\t2", b"1 2"), Comparison::Mismatch);
    }

    #[test]
    fn test_leading_whitespace_matters_on_first_pass() {
        assert_eq!(compare_output(b" 7", b"7"), Comparison::Presentation);
    }

    #[test]
    fn test_comparison_is_deterministic() {
        let pairs: [(&[u8], &[u8]); 3] = [(b"a b\n", b"ab"), (b"x", b"y"), (b"", b"\r\n")];
        for (a, b) in pairs {
            assert_eq!(compare_output(a, b), compare_output(a, b));
        }
    }

    #[test]
    fn test_empty_outputs_match() {
        assert_eq!(compare_output(b"", b"\r\n \n"), Comparison::Match);
    }
}
