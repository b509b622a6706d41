use crate::error::QueryError;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Start-anchored regular expression with an extracted literal prefix.
///
/// Any value accepted by the pattern must begin with `prefix()`. The prefix
/// is what the index feeds into its prefix tree to prune candidates, and
/// `matches_after_prefix` evaluates only the residual pattern so the verified
/// prefix bytes are not scanned twice.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    prefix: String,
    regex: Regex,
    residual: Regex,
}

impl Pattern {
    /// Compile a pattern. The expression is anchored at the start of the
    /// value; a leading `^` is accepted and equivalent.
    pub fn new(pattern: &str) -> Result<Self, QueryError> {
        let body = pattern.strip_prefix('^').unwrap_or(pattern);
        let regex = Self::compile(pattern, body)?;
        let (prefix, consumed) = literal_prefix(body);
        let residual = Self::compile(pattern, &body[consumed..])?;
        Ok(Self {
            source: pattern.to_string(),
            prefix,
            regex,
            residual,
        })
    }

    fn compile(pattern: &str, body: &str) -> Result<Regex, QueryError> {
        Regex::new(&format!("^(?:{body})")).map_err(|source| QueryError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Longest literal string every matching value must begin with. Empty
    /// when the pattern has no fixed start.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Match `value` assuming `value.starts_with(self.prefix())` has already
    /// been established; only the residual pattern is evaluated.
    pub fn matches_after_prefix(&self, value: &str) -> bool {
        debug_assert!(value.starts_with(&self.prefix));
        let split = self.prefix.len();
        if split > value.len() || !value.is_char_boundary(split) {
            return false;
        }
        self.residual.is_match(&value[split..])
    }
}

/// Scan the longest literal prefix of a pattern body. Returns the prefix and
/// the number of pattern bytes it consumed, so the residual pattern can be
/// recompiled from the remainder.
fn literal_prefix(body: &str) -> (String, usize) {
    // A top-level alternation invalidates any prefix taken from the first
    // branch; bail out instead of tracking group nesting.
    if body.contains('|') {
        return (String::new(), 0);
    }
    let mut prefix = String::new();
    let mut pos = 0;
    while pos < body.len() {
        let rest = &body[pos..];
        let Some(c) = rest.chars().next() else { break };
        let (literal, consumed) = if c == '\\' {
            match rest[1..].chars().next() {
                // Escaped punctuation is literal; alphanumeric escapes are
                // character classes (\d, \w, ...) and end the prefix.
                Some(esc) if !esc.is_ascii_alphanumeric() => (esc, 1 + esc.len_utf8()),
                _ => break,
            }
        } else if is_meta(c) {
            break;
        } else {
            (c, c.len_utf8())
        };
        // A quantifier binds to the preceding literal, so that literal is
        // not part of the fixed prefix.
        if is_quantifier(&body[pos + consumed..]) {
            break;
        }
        prefix.push(literal);
        pos += consumed;
    }
    (prefix, pos)
}

fn is_meta(c: char) -> bool {
    matches!(
        c,
        '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|'
    )
}

fn is_quantifier(rest: &str) -> bool {
    matches!(rest.chars().next(), Some('*' | '+' | '?' | '{'))
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({})", self.source)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(D::Error::custom)
    }
}
