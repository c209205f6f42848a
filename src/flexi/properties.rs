//! Properties text codec for mapping files
//!
//! Reads and writes the `key=value` line format with the usual escaping
//! rules: `#`/`!` comments, backslash line continuations, `\:`, `\=`, `\\`,
//! `\t`/`\n`/`\r`/`\f` and `\uXXXX`. Entries keep insertion order so exported
//! files diff cleanly.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::ImportError;

/// Ordered key/value store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its position
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&pos| self.entries[pos].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize, optionally with a leading comment line
    pub fn write(&self, comment: Option<&str>) -> String {
        let mut out = String::new();
        if let Some(comment) = comment {
            let _ = writeln!(out, "#{}", comment);
        }
        for (key, value) in &self.entries {
            let _ = writeln!(out, "{}={}", escape(key, true), escape(value, false));
        }
        out
    }

    /// Parse properties text
    pub fn parse(text: &str) -> Result<Self, ImportError> {
        let mut props = Properties::new();
        let mut lines = text.lines().enumerate();

        while let Some((line_no, raw)) = lines.next() {
            let line = raw.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            // Join continuation lines
            let mut logical = line.to_string();
            while ends_with_continuation(&logical) {
                logical.pop();
                match lines.next() {
                    Some((_, next)) => logical.push_str(next.trim_start()),
                    None => break,
                }
            }

            let (key, value) = split_key_value(&logical);
            let key = unescape(key, line_no + 1)?;
            let value = unescape(value, line_no + 1)?;
            props.set(key, value);
        }

        Ok(props)
    }
}

/// An odd number of trailing backslashes continues the line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

/// Split at the first unescaped separator (`=`, `:` or whitespace)
fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0C' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let rest = line[key_end..].trim_start_matches([' ', '\t', '\x0C']);
    let rest = rest
        .strip_prefix(['=', ':'])
        .map(|r| r.trim_start_matches([' ', '\t', '\x0C']))
        .unwrap_or(rest);
    (key, rest)
}

fn unescape(text: &str, line: usize) -> Result<String, ImportError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0C'),
            Some('u') => {
                let unit = read_utf16_unit(&mut chars, line)?;
                let decoded = if (0xD800..0xDC00).contains(&unit) {
                    // High surrogate, the low half must follow as another escape
                    let low = match (chars.next(), chars.next()) {
                        (Some('\\'), Some('u')) => read_utf16_unit(&mut chars, line)?,
                        _ => 0,
                    };
                    char::decode_utf16([unit, low]).next().and_then(|r| r.ok())
                } else {
                    char::from_u32(u32::from(unit))
                };
                out.push(decoded.ok_or_else(|| ImportError::Syntax {
                    line,
                    reason: format!("unpaired surrogate \\u{:04X}", unit),
                })?);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}

/// Four hex digits following `\u`
fn read_utf16_unit(chars: &mut std::str::Chars<'_>, line: usize) -> Result<u16, ImportError> {
    let hex: String = chars.by_ref().take(4).collect();
    u16::from_str_radix(&hex, 16)
        .ok()
        .filter(|_| hex.len() == 4)
        .ok_or_else(|| ImportError::Syntax {
            line,
            reason: format!("malformed \\u{} escape", hex),
        })
}

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0C' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || (c as u32) > 0x7E => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04X}", unit);
                }
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_escapes_separators() {
        let mut props = Properties::new();
        props.set("SLOT0_COMMAND", "Transport: Play");
        props.set("SLOT0_TYPE", "0");

        let text = props.write(None);
        assert_eq!(text, "SLOT0_COMMAND=Transport\\: Play\nSLOT0_TYPE=0\n");
    }

    #[test]
    fn test_parse_separators_comments_and_continuations() {
        let text = "# header\n! also a comment\n\nA=1\nB : two words\nC   3\nD=line \\\n    continued\nE=Transport\\: Play\n";
        let props = Properties::parse(text).unwrap();

        assert_eq!(props.get("A"), Some("1"));
        assert_eq!(props.get("B"), Some("two words"));
        assert_eq!(props.get("C"), Some("3"));
        assert_eq!(props.get("D"), Some("line continued"));
        assert_eq!(props.get("E"), Some("Transport: Play"));
        assert_eq!(props.len(), 5);
    }

    #[test]
    fn test_unicode_escape() {
        let props = Properties::parse("K=caf\\u00E9\n").unwrap();
        assert_eq!(props.get("K"), Some("café"));

        let err = Properties::parse("K=\\u00G1\n").unwrap_err();
        assert!(matches!(err, ImportError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_supplementary_chars_use_surrogate_pairs() {
        let mut props = Properties::new();
        props.set("NAME", "Mixer 🎛");
        let text = props.write(None);
        assert_eq!(text, "NAME=Mixer \\uD83C\\uDF9B\n");

        let parsed = Properties::parse(&text).unwrap();
        assert_eq!(parsed.get("NAME"), Some("Mixer 🎛"));

        let err = Properties::parse("K=\\uD83Cx\n").unwrap_err();
        assert!(matches!(err, ImportError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_written_text_reads_back() {
        let mut props = Properties::new();
        props.set("key with space", " leading\\back=slash:é");
        let parsed = Properties::parse(&props.write(Some("comment"))).unwrap();
        assert_eq!(parsed, props);
    }

    #[test]
    fn test_replaced_key_keeps_position() {
        let mut props = Properties::new();
        props.set("A", "1");
        props.set("B", "2");
        props.set("A", "3");
        let keys: Vec<_> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(props.get("A"), Some("3"));
    }
}
