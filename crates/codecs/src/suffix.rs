//! File-name suffix allow-lists.
//!
//! The executable-aware diff path is only attempted for files whose final
//! extension matches one of these patterns. Patterns are separated by `/` or
//! `,`, compared case-insensitively, and may contain `[..]` character classes
//! such as `[ov]dex`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Extensions of files that usually hold executable or archive payloads.
pub const DEFAULT_EXECUTABLE_SUFFIXES: &[&str] = &[
    "apk", "so", "dex", "odex", "vdex", "oat", "art", "jar", "zip", "ko", "bin", "elf",
];

/// Errors raised while parsing a suffix list.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SuffixParseError {
    /// A pattern contained a non-ASCII character or a stray `]`.
    #[error("invalid character '{0}' in suffix list")]
    InvalidCharacter(char),
    /// A `[` was never closed.
    #[error("unterminated character class in suffix list")]
    UnterminatedClass,
    /// `[]` does not match anything.
    #[error("empty character class in suffix list")]
    EmptyClass,
}

/// Parsed list of extension patterns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SuffixList {
    patterns: Vec<SuffixPattern>,
    source: String,
}

impl SuffixList {
    /// Parses a `/` or `,` separated pattern list. An empty string yields an
    /// empty list that matches nothing.
    pub fn parse(list: &str) -> Result<Self, SuffixParseError> {
        let patterns = list
            .split(['/', ','])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(SuffixPattern::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            source: list.trim().to_owned(),
        })
    }

    /// An allow-list that matches nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            source: String::new(),
        }
    }

    /// Returns `true` when the extension of the last component of `name`
    /// matches a pattern.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let file_name = name.rsplit('/').next().unwrap_or(name);
        let Some((stem, extension)) = file_name.rsplit_once('.') else {
            return false;
        };
        if stem.is_empty() || extension.is_empty() {
            return false;
        }
        self.patterns.iter().any(|pattern| pattern.matches(extension))
    }

    /// Number of parsed patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns `true` when no pattern is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for SuffixList {
    fn default() -> Self {
        let patterns = DEFAULT_EXECUTABLE_SUFFIXES
            .iter()
            .map(|suffix| SuffixPattern::literal(suffix))
            .collect();
        Self {
            patterns,
            source: DEFAULT_EXECUTABLE_SUFFIXES.join("/"),
        }
    }
}

impl FromStr for SuffixList {
    type Err = SuffixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SuffixList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum PatternToken {
    Byte(u8),
    AnyOf(Vec<u8>),
}

impl PatternToken {
    fn accepts(&self, byte: u8) -> bool {
        let byte = byte.to_ascii_lowercase();
        match self {
            Self::Byte(expected) => *expected == byte,
            Self::AnyOf(options) => options.binary_search(&byte).is_ok(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct SuffixPattern {
    tokens: Vec<PatternToken>,
}

impl SuffixPattern {
    fn literal(text: &str) -> Self {
        Self {
            tokens: text
                .bytes()
                .map(|byte| PatternToken::Byte(byte.to_ascii_lowercase()))
                .collect(),
        }
    }

    fn parse(text: &str) -> Result<Self, SuffixParseError> {
        let text = text.strip_prefix('.').unwrap_or(text);
        let mut tokens = Vec::with_capacity(text.len());
        let mut chars = text.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '[' => {
                    let mut class = Vec::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(member) if member.is_ascii() => {
                                class.push(member.to_ascii_lowercase() as u8);
                            }
                            Some(member) => return Err(SuffixParseError::InvalidCharacter(member)),
                            None => return Err(SuffixParseError::UnterminatedClass),
                        }
                    }
                    if class.is_empty() {
                        return Err(SuffixParseError::EmptyClass);
                    }
                    class.sort_unstable();
                    class.dedup();
                    tokens.push(PatternToken::AnyOf(class));
                }
                ch if ch == ']' || !ch.is_ascii() => {
                    return Err(SuffixParseError::InvalidCharacter(ch));
                }
                ch => tokens.push(PatternToken::Byte(ch.to_ascii_lowercase() as u8)),
            }
        }

        if tokens.is_empty() {
            return Err(SuffixParseError::InvalidCharacter('.'));
        }
        Ok(Self { tokens })
    }

    fn matches(&self, extension: &str) -> bool {
        extension.len() == self.tokens.len()
            && self
                .tokens
                .iter()
                .zip(extension.bytes())
                .all(|(token, byte)| token.accepts(byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_covers_android_binaries() {
        let list = SuffixList::default();
        assert!(list.matches_name("system/lib64/libc.so"));
        assert!(list.matches_name("app/Settings/Settings.APK"));
        assert!(list.matches_name("framework/oat/arm64/services.vdex"));
        assert!(!list.matches_name("etc/hosts"));
        assert!(!list.matches_name("etc/init/boot.rc"));
    }

    #[test]
    fn only_the_last_component_is_inspected() {
        let list = SuffixList::default();
        assert!(!list.matches_name("lib.so/readme"));
        assert!(!list.matches_name("vendor/.so"));
    }

    #[test]
    fn classes_and_separators_are_honoured() {
        let list = SuffixList::parse("[ov]dex, so/ko").expect("parse");
        assert_eq!(list.len(), 3);
        assert!(list.matches_name("a.odex"));
        assert!(list.matches_name("a.VDEX"));
        assert!(!list.matches_name("a.cdex"));
        assert!(list.matches_name("drivers/wifi.ko"));
    }

    #[test]
    fn leading_dots_and_empty_segments_are_ignored() {
        let list = SuffixList::parse("//.so//").expect("parse");
        assert!(list.matches_name("libm.so"));
    }

    #[test]
    fn empty_list_matches_nothing() {
        let list = SuffixList::parse("").expect("parse");
        assert!(list.is_empty());
        assert!(!list.matches_name("libm.so"));
        assert_eq!(list, SuffixList::empty());
    }

    #[test]
    fn malformed_classes_are_rejected() {
        assert_eq!(
            SuffixList::parse("s[o").expect_err("unterminated"),
            SuffixParseError::UnterminatedClass
        );
        assert_eq!(
            SuffixList::parse("s[]").expect_err("empty"),
            SuffixParseError::EmptyClass
        );
        assert_eq!(
            SuffixList::parse("so]").expect_err("stray"),
            SuffixParseError::InvalidCharacter(']')
        );
    }
}
