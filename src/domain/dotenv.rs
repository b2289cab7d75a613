//! Pure `KEY=VAL` parser for `.agent-layer/.env`.
//!
//! Empty values are legal to write but ignored at resolution time; the parser
//! records them so the readiness checker can report them.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDotenv {
    /// Non-empty assignments, last occurrence wins.
    pub values: BTreeMap<String, String>,
    /// Keys assigned an empty value (`KEY=`), in file order.
    pub empty_assignments: Vec<String>,
}

/// Parse dotenv bytes. Blank lines and `#` comments are skipped; lines
/// without `=` are ignored.
pub fn parse_dotenv(bytes: &[u8]) -> ParsedDotenv {
    let content = String::from_utf8_lossy(bytes);
    let mut parsed = ParsedDotenv::default();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        if value.is_empty() {
            parsed.empty_assignments.push(key.to_string());
        } else {
            parsed.values.insert(key.to_string(), value.to_string());
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignments_and_skips_comments() {
        let parsed = parse_dotenv(b"# header\nAL_TOKEN=abc\n\nAL_MODE=fast\n");
        assert_eq!(parsed.values.get("AL_TOKEN"), Some(&"abc".to_string()));
        assert_eq!(parsed.values.get("AL_MODE"), Some(&"fast".to_string()));
        assert!(parsed.empty_assignments.is_empty());
    }

    #[test]
    fn empty_values_are_recorded_not_resolved() {
        let parsed = parse_dotenv(b"AL_TOKEN=\nAL_MODE=fast\n");
        assert_eq!(parsed.values.get("AL_TOKEN"), None);
        assert_eq!(parsed.empty_assignments, vec!["AL_TOKEN".to_string()]);
    }

    #[test]
    fn last_assignment_wins() {
        let parsed = parse_dotenv(b"KEY=first\nKEY=second\n");
        assert_eq!(parsed.values.get("KEY"), Some(&"second".to_string()));
    }

    #[test]
    fn lines_without_equals_are_ignored() {
        let parsed = parse_dotenv(b"not an assignment\nKEY=v\n");
        assert_eq!(parsed.values.len(), 1);
    }
}
