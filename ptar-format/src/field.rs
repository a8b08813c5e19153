//! Lexical rules for metadata lines.
//!
//! A metadata line is either a `Key: value` pair, a bare value (such as the
//! `---` contents marker) or a blank line separating records.

/// One classified input line, with the trailing newline already removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// A valid key followed by a colon. The key is normalized with [`normalize`],
    /// the value is trimmed.
    Field { key: String, value: &'a str },
    /// A line without a valid key; the trimmed contents.
    Value(&'a str),
    /// A line containing nothing but whitespace.
    Blank,
}

/// The C `isspace` set for the "C" locale.
#[inline(always)]
pub(crate) fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r')
}

#[inline(always)]
fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '_'
}

/// Returns true if the text up to the first colon (or the end of the line) is
/// a valid key: it starts with an ASCII alphanumeric and continues with
/// alphanumerics, spaces, hyphens and underscores.
pub fn is_valid_key(line: &str) -> bool {
    let mut chars = line.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.take_while(|c| *c != ':').all(is_key_char)
}

/// Lower-cases `s` and removes every whitespace character.
///
/// Used for keys, type labels and the header's encoding and extension values,
/// so that `File   Size`, `file size` and `FILESIZE` all compare equal.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !is_space(*c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub(crate) fn trim(s: &str) -> &str {
    s.trim_matches(is_space)
}

/// Classifies a single line.
pub fn parse_line(line: &str) -> Line<'_> {
    if let Some(colon) = line.find(':') {
        if is_valid_key(line) {
            return Line::Field {
                key: normalize(&line[..colon]),
                value: trim(&line[colon + 1..]),
            };
        }
    }

    match trim(line) {
        "" => Line::Blank,
        value => Line::Value(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value() {
        assert_eq!(
            parse_line("Path:\tsome/file name.txt\n"),
            Line::Field {
                key: "path".into(),
                value: "some/file name.txt"
            }
        );
    }

    #[test]
    fn value_keeps_later_colons() {
        assert_eq!(
            parse_line("Archive Creation Date: 2013-05-01T10:11:12Z"),
            Line::Field {
                key: "archivecreationdate".into(),
                value: "2013-05-01T10:11:12Z"
            }
        );
    }

    #[test]
    fn key_whitespace_is_collapsed() {
        for line in &["File   Size: 5", "file size: 5", "FILE SIZE: 5", "FileSize:5"] {
            assert_eq!(
                parse_line(line),
                Line::Field {
                    key: "filesize".into(),
                    value: "5"
                },
                "{:?}",
                line
            );
        }
    }

    #[test]
    fn key_allows_hyphen_and_underscore() {
        assert!(is_valid_key("some-key_name 2: x"));
        assert_eq!(
            parse_line("Some-Key_Name: x"),
            Line::Field {
                key: "some-key_name".into(),
                value: "x"
            }
        );
    }

    #[test]
    fn invalid_keys_are_bare_values() {
        assert_eq!(parse_line(" Path: x"), Line::Value("Path: x"));
        assert_eq!(parse_line("   : x"), Line::Value(": x"));
        assert_eq!(parse_line("-key: x"), Line::Value("-key: x"));
        assert_eq!(parse_line("a/b: x"), Line::Value("a/b: x"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(" "));
    }

    #[test]
    fn bare_and_blank() {
        assert_eq!(parse_line("---\n"), Line::Value("---"));
        assert_eq!(parse_line("  ---  "), Line::Value("---"));
        assert_eq!(parse_line("\n"), Line::Blank);
        assert_eq!(parse_line(" \t\r\n"), Line::Blank);
        assert_eq!(parse_line(""), Line::Blank);
    }

    #[test]
    fn empty_value() {
        assert_eq!(
            parse_line("Extensions:\n"),
            Line::Field {
                key: "extensions".into(),
                value: ""
            }
        );
    }
}
