/*!
`CheckOutput` matcher evaluation, pulled out as a pure function so it can be
unit-tested without any engine or process involved.
*/

use crate::spec::test_spec::{CheckOutput, FileCheckOutput};
use regex::Regex;

/// Evaluate a `CheckOutput` matcher against captured text. Every declared
/// field must be satisfied; an all-absent matcher is a no-op. Returns the
/// first unmet condition's description, or `None` if satisfied.
pub fn check_output(matcher: &CheckOutput, actual: &str) -> Option<String> {
    if matcher.is_noop() {
        return None;
    }

    if let Some(expected) = &matcher.equals {
        if actual != expected {
            return Some(format!("expected output to equal {expected:?}, got {actual:?}"));
        }
    }
    if let Some(expected) = &matcher.contains {
        if !actual.contains(expected.as_str()) {
            return Some(format!("expected output to contain {expected:?}, got {actual:?}"));
        }
    }
    if let Some(expected) = &matcher.starts_with {
        if !actual.starts_with(expected.as_str()) {
            return Some(format!("expected output to start with {expected:?}, got {actual:?}"));
        }
    }
    if let Some(expected) = &matcher.ends_with {
        if !actual.ends_with(expected.as_str()) {
            return Some(format!("expected output to end with {expected:?}, got {actual:?}"));
        }
    }
    if let Some(pattern) = &matcher.matches {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(actual) => {}
            Ok(_) => return Some(format!("expected output to match /{pattern}/, got {actual:?}")),
            Err(e) => return Some(format!("invalid regex /{pattern}/: {e}")),
        }
    }
    if matcher.empty == Some(true) && !actual.is_empty() {
        return Some(format!("expected empty output, got {actual:?}"));
    }
    if matcher.not_empty == Some(true) && actual.is_empty() {
        return Some("expected non-empty output, got empty".to_string());
    }

    None
}

/// File-level assertion: existence, permission bits, directory-ness, and
/// (for regular files) a nested `CheckOutput` against the file's contents.
pub fn check_file(
    matcher: &FileCheckOutput,
    path: &str,
    exists: bool,
    mode: Option<u32>,
    is_dir: bool,
    contents: Option<&str>,
) -> Option<String> {
    if matcher.not_exist == Some(true) {
        if exists {
            return Some(format!("expected '{path}' to not exist"));
        }
        return None;
    }
    if !exists {
        return Some(format!("expected '{path}' to exist"));
    }
    if let Some(expected_mode) = matcher.permissions {
        // POSIX permission bits only, masking off file-type bits.
        let actual_mode = mode.unwrap_or(0) & 0o7777;
        if actual_mode != expected_mode {
            return Some(format!(
                "expected '{path}' to have mode {expected_mode:o}, got {actual_mode:o}"
            ));
        }
    }
    if let Some(expected_dir) = matcher.is_dir {
        if expected_dir != is_dir {
            return Some(format!(
                "expected '{path}' isDir={expected_dir}, got {is_dir}"
            ));
        }
    }
    if let Some(check) = &matcher.check_output {
        let text = contents.unwrap_or_default();
        if let Some(reason) = check_output(check, text) {
            return Some(format!("'{path}': {reason}"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_matcher_always_satisfied() {
        assert!(check_output(&CheckOutput::default(), "anything").is_none());
    }

    #[test]
    fn all_declared_fields_must_hold() {
        let matcher = CheckOutput {
            contains: Some("hello".to_string()),
            starts_with: Some("goodbye".to_string()),
            ..Default::default()
        };
        assert!(check_output(&matcher, "hello world").is_some());
    }

    #[test]
    fn matches_uses_regex() {
        let matcher = CheckOutput {
            matches: Some(r"^v\d+\.\d+$".to_string()),
            ..Default::default()
        };
        assert!(check_output(&matcher, "v1.2").is_none());
        assert!(check_output(&matcher, "version 1.2").is_some());
    }

    #[test]
    fn not_exist_short_circuits_other_checks() {
        let matcher = FileCheckOutput {
            not_exist: Some(true),
            ..Default::default()
        };
        assert!(check_file(&matcher, "/tmp/x", false, None, false, None).is_none());
        assert!(check_file(&matcher, "/tmp/x", true, None, false, None).is_some());
    }

    #[test]
    fn permission_check_masks_file_type_bits() {
        let matcher = FileCheckOutput {
            permissions: Some(0o644),
            ..Default::default()
        };
        // 0o100644 is a regular file with mode 644; the file-type bits must
        // not affect the comparison.
        assert!(check_file(&matcher, "/tmp/x", true, Some(0o100644), false, None).is_none());
    }
}
