use std::path::Path;

pub const INPUT_EXTENSION: &str = "in";
pub const OUTPUT_EXTENSION: &str = "out";

/// Whether a remote-supplied filename may be used inside a data directory.
///
/// Rejects anything that could escape the directory.
pub fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Whether `name` is a test-case data file (`*.in` or `*.out`)
pub fn is_test_data_file(name: &str) -> bool {
    matches!(
        Path::new(name).extension().and_then(|ext| ext.to_str()),
        Some(INPUT_EXTENSION) | Some(OUTPUT_EXTENSION)
    ) && Path::new(name).file_stem().is_some_and(|stem| !stem.is_empty())
}

/// Base name of an input file, `"3.in"` -> `Some("3")`
pub fn input_base_name(name: &str) -> Option<&str> {
    name.strip_suffix(".in").filter(|base| !base.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_filename() {
        assert!(is_plain_filename("1.in"));
        assert!(!is_plain_filename("../1.in"));
        assert!(!is_plain_filename("a/1.in"));
        assert!(!is_plain_filename(".."));
        assert!(!is_plain_filename(""));
    }

    #[test]
    fn test_data_file_detection() {
        assert!(is_test_data_file("1.in"));
        assert!(is_test_data_file("sample.out"));
        assert!(!is_test_data_file("1.ans"));
        assert!(!is_test_data_file(".in"));
    }

    #[test]
    fn test_input_base_name() {
        assert_eq!(input_base_name("12.in"), Some("12"));
        assert_eq!(input_base_name("12.out"), None);
        assert_eq!(input_base_name(".in"), None);
    }
}
