//! Rule block rendering.
//!
//! Rendering is a pure function of the mapping list and the routing mode, so
//! the same input always yields byte-identical text. The control file merge
//! relies on this to detect that nothing changed.

use std::fmt;

use crate::mapping::{ProxyMapping, RuleFlag};
use crate::mode::RoutingMode;

/// Opening line of the module-conditional guard.
pub const GUARD_OPEN: &str = "<IfModule mod_rewrite.c>";
/// Closing line of the module-conditional guard.
pub const GUARD_CLOSE: &str = "</IfModule>";
/// Engine-enable directive.
pub const ENGINE_ON: &str = "RewriteEngine On";
/// Base directive.
pub const REWRITE_BASE: &str = "RewriteBase /";

/// Rendered directive lines, without line terminators.
///
/// Displays as one `line\n` per line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleBlock {
    lines: Vec<String>,
}

impl RuleBlock {
    /// Directive lines in order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the block has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for RuleBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Render mappings for the given mode.
///
/// - [`RoutingMode::Default`]: a self-contained block (guard, engine, base,
///   one rule per mapping, guard close)
/// - [`RoutingMode::Custom`]: bare rule lines only
pub fn render(mappings: &[ProxyMapping], mode: RoutingMode) -> RuleBlock {
    let rules = mappings.iter().map(rule_line);

    let lines = match mode {
        RoutingMode::Default => [GUARD_OPEN, ENGINE_ON, REWRITE_BASE]
            .into_iter()
            .map(str::to_owned)
            .chain(rules)
            .chain(std::iter::once(GUARD_CLOSE.to_owned()))
            .collect(),
        RoutingMode::Custom => rules.collect(),
    };

    RuleBlock { lines }
}

/// Render a single `RewriteRule` directive.
///
/// The pattern is anchored with `^...$` unless it already carries anchors.
pub fn rule_line(mapping: &ProxyMapping) -> String {
    let pattern = &mapping.pattern;
    let start = if pattern.starts_with('^') { "" } else { "^" };
    let end = if ends_with_anchor(pattern) { "" } else { "$" };

    let mut line = format!("RewriteRule {start}{pattern}{end} {}", mapping.target);
    if !mapping.flags.is_empty() {
        let flags: Vec<&str> = mapping.flags.iter().copied().map(RuleFlag::as_str).collect();
        line.push_str(" [");
        line.push_str(&flags.join(","));
        line.push(']');
    }
    line
}

/// Whether the pattern ends with an unescaped `$`.
fn ends_with_anchor(pattern: &str) -> bool {
    let Some(body) = pattern.strip_suffix('$') else {
        return false;
    };
    let backslashes = body.bytes().rev().take_while(|&b| b == b'\\').count();
    backslashes % 2 == 0
}
