//! Proxy mappings and their validation.
//!
//! A [`ProxyMapping`] pairs a local path pattern with a remote target
//! template. [`validate`] checks a list of mappings before rendering and
//! normalizes the targets; patterns are never rewritten.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use regex::Regex;

use crate::error::RuleError;

/// Characters percent-encoded in the literal path and query of a target.
///
/// `/`, `?`, `&`, `=`, `%` and `$` are kept so that existing escapes and
/// capture references survive.
const TARGET_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

/// Rewrite rule flag.
///
/// Variant order is the canonical render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleFlag {
    /// Forward the request to the target through the proxy module.
    Proxy,
    /// Stop processing further rules.
    Last,
    /// Append the original query string to the target.
    QueryStringAppend,
    /// Do not escape special characters in the target.
    NoEscape,
}

impl RuleFlag {
    /// Short form used inside the flag brackets.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proxy => "P",
            Self::Last => "L",
            Self::QueryStringAppend => "QSA",
            Self::NoEscape => "NE",
        }
    }
}

impl fmt::Display for RuleFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleFlag {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" | "proxy" => Ok(Self::Proxy),
            "l" | "last" => Ok(Self::Last),
            "qsa" | "qsappend" => Ok(Self::QueryStringAppend),
            "ne" | "noescape" => Ok(Self::NoEscape),
            _ => Err(RuleError::UnknownFlag(s.to_owned())),
        }
    }
}

/// A local path pattern proxied to a remote target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyMapping {
    /// Path pattern relative to the rewrite base, usually unanchored
    /// (`i/(acme)(/.*)?`).
    pub pattern: String,
    /// Target URL template; `$N` refers to the N-th capture group.
    pub target: String,
    /// Rule flags, rendered in canonical order.
    pub flags: BTreeSet<RuleFlag>,
}

impl ProxyMapping {
    /// Create a mapping with explicit flags.
    pub fn new(
        pattern: impl Into<String>,
        target: impl Into<String>,
        flags: impl IntoIterator<Item = RuleFlag>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            target: target.into(),
            flags: flags.into_iter().collect(),
        }
    }

    /// Create a passthrough proxy mapping (`[P]`).
    pub fn proxy(pattern: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(pattern, target, [RuleFlag::Proxy])
    }

    /// Parse flags from their textual form.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownFlag`] for an unrecognized name.
    pub fn with_flag_names<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self, RuleError> {
        self.flags = names
            .iter()
            .map(|name| name.as_ref().parse())
            .collect::<Result<_, _>>()?;
        Ok(self)
    }
}

/// Validate and normalize mappings, preserving their order.
///
/// # Errors
///
/// Fails on the first mapping that violates an invariant:
/// [`RuleError::InvalidPattern`], [`RuleError::DanglingCaptureReference`] or
/// [`RuleError::InvalidTarget`].
pub fn validate(mappings: &[ProxyMapping]) -> Result<Vec<ProxyMapping>, RuleError> {
    mappings.iter().map(validate_one).collect()
}

fn validate_one(mapping: &ProxyMapping) -> Result<ProxyMapping, RuleError> {
    let captures = capture_count(&mapping.pattern)?;

    for index in capture_references(&mapping.target) {
        // $0 is the whole match and always exists
        if index > captures {
            return Err(RuleError::DanglingCaptureReference {
                pattern: mapping.pattern.clone(),
                target: mapping.target.clone(),
                index,
                captures,
            });
        }
    }

    Ok(ProxyMapping {
        pattern: mapping.pattern.clone(),
        target: normalize_target(&mapping.target)?,
        flags: mapping.flags.clone(),
    })
}

/// Number of capturing groups in `pattern`.
///
/// # Errors
///
/// Returns [`RuleError::InvalidPattern`] if the pattern is empty, contains
/// unescaped whitespace, or does not compile.
pub fn capture_count(pattern: &str) -> Result<usize, RuleError> {
    let invalid = |reason: String| RuleError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason,
    };

    if pattern.is_empty() {
        return Err(invalid("pattern is empty".to_owned()));
    }
    if let Some(c) = unescaped_whitespace(pattern) {
        return Err(invalid(format!(
            "unescaped whitespace {c:?} would split the directive"
        )));
    }

    let regex = Regex::new(pattern).map_err(|e| invalid(e.to_string()))?;
    // Group 0 is the implicit whole match
    Ok(regex.captures_len() - 1)
}

/// First whitespace character not preceded by a backslash.
///
/// Line breaks are rejected even when escaped: a directive is a single line.
fn unescaped_whitespace(pattern: &str) -> Option<char> {
    let mut escaped = false;
    for c in pattern.chars() {
        if c == '\n' || c == '\r' {
            return Some(c);
        }
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c.is_whitespace() {
            return Some(c);
        }
    }
    None
}

/// Capture indices referenced as `$N` in a target. `\$` is a literal dollar.
fn capture_references(target: &str) -> Vec<usize> {
    let bytes = target.as_bytes();
    let mut refs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' => {
                if let Some(d) = bytes.get(i + 1).filter(|b| b.is_ascii_digit()) {
                    refs.push(usize::from(d - b'0'));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    refs
}

/// Lowercase scheme and host, percent-encode literal path characters.
///
/// Backslash escapes, `%{...}` server variables and `%N` condition
/// backreferences are substitutions and pass through untouched.
fn normalize_target(target: &str) -> Result<String, RuleError> {
    let invalid = |reason: &str| RuleError::InvalidTarget {
        target: target.to_owned(),
        reason: reason.to_owned(),
    };

    if target.is_empty() {
        return Err(invalid("target is empty"));
    }
    if target.chars().any(char::is_control) {
        return Err(invalid("control characters are not allowed"));
    }

    let Some((scheme, rest)) = target.split_once("://") else {
        // Local substitution such as `/local/$1` or `-`
        return Ok(encode_literals(target));
    };

    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return Err(invalid("malformed scheme"));
    }

    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(invalid("missing host"));
    }
    if authority.chars().any(char::is_whitespace) {
        return Err(invalid("whitespace in host"));
    }
    // Server variable names are case-sensitive
    let authority = if authority.contains("%{") {
        authority.to_owned()
    } else {
        authority.to_lowercase()
    };

    Ok(format!(
        "{}://{}{}",
        scheme.to_ascii_lowercase(),
        authority,
        encode_literals(path)
    ))
}

/// Percent-encode literal text, copying substitution tokens verbatim.
fn encode_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find(['\\', '%']) {
        let (literal, tail) = rest.split_at(idx);
        out.extend(utf8_percent_encode(literal, TARGET_ENCODE_SET));
        let token = substitution_len(tail);
        if token == 0 {
            // Dangling backslash at the end is literal text
            out.extend(utf8_percent_encode(&tail[..1], TARGET_ENCODE_SET));
            rest = &tail[1..];
        } else {
            out.push_str(&tail[..token]);
            rest = &tail[token..];
        }
    }
    out.extend(utf8_percent_encode(rest, TARGET_ENCODE_SET));
    out
}

/// Byte length of the escape or substitution token at the start of `s`.
///
/// `s` starts with `\` or `%`. Returns 0 for a backslash with nothing to
/// escape.
fn substitution_len(s: &str) -> usize {
    let mut chars = s.chars();
    let lead = chars.next();
    let next = chars.next();
    match (lead, next) {
        (Some('\\'), Some(c)) => 1 + c.len_utf8(),
        (Some('\\'), None) => 0,
        (Some('%'), Some('{')) => s.find('}').map_or(1, |end| end + 1),
        (Some('%'), Some(c)) if c.is_ascii_digit() => 2,
        _ => 1,
    }
}
