//! Textual merging of rendered rules into existing rule text.
//!
//! Two anchors are recognized in otherwise opaque rule text:
//!
//! - the terminal directive, the host's last rule, before which bare rule
//!   lines are spliced ([`splice_before_terminal`])
//! - a `# BEGIN <name>` / `# END <name>` marker pair delimiting owned content
//!   in the control file ([`insert_with_markers`])
//!
//! The splice is not idempotent on its own: running it twice duplicates the
//! rules. Use [`has_block_before_terminal`] to detect an earlier splice and
//! [`strip_block_before_terminal`] to take it out again.

use crate::error::RuleError;
use crate::render::RuleBlock;

/// Split rule text into lines, ignoring one trailing newline.
fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.strip_suffix('\n').unwrap_or(text).split('\n').collect()
}

/// Join lines with `\n` and terminate the last one.
fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

/// Index of the first line matching any terminal directive spelling.
fn find_terminal(lines: &[&str], terminals: &[String]) -> Option<usize> {
    lines
        .iter()
        .position(|line| terminals.iter().any(|t| t == line))
}

/// Splice `block` into `existing` immediately before the terminal directive.
///
/// The block's lines take the terminal directive's position, pushing it and
/// everything after it down by `block.len()` lines. The result always ends
/// in a newline.
///
/// # Errors
///
/// Returns [`RuleError::AnchorNotFound`] when no line equals a terminal
/// directive. `existing` is only borrowed, so the caller still holds the
/// unmodified text.
pub fn splice_before_terminal(
    existing: &str,
    block: &RuleBlock,
    terminals: &[String],
) -> Result<String, RuleError> {
    let mut lines = split_lines(existing);
    let Some(index) = find_terminal(&lines, terminals) else {
        return Err(RuleError::AnchorNotFound {
            expected: terminals.to_vec(),
        });
    };

    lines.splice(index..index, block.lines().iter().map(String::as_str));
    Ok(join_lines(&lines))
}

/// Whether `block` already sits immediately before the terminal directive.
pub fn has_block_before_terminal(existing: &str, block: &RuleBlock, terminals: &[String]) -> bool {
    let lines = split_lines(existing);
    let Some(index) = find_terminal(&lines, terminals) else {
        return false;
    };
    if block.is_empty() {
        return true;
    }
    index >= block.len()
        && lines[index - block.len()..index]
            .iter()
            .zip(block.lines())
            .all(|(have, want)| have == want)
}

/// Remove `previous` lines sitting immediately before the terminal directive.
///
/// Undoes an earlier [`splice_before_terminal`] of those lines. Text where
/// they are not found right above the terminal directive is returned as is.
pub fn strip_block_before_terminal<S: AsRef<str>>(
    existing: &str,
    previous: &[S],
    terminals: &[String],
) -> String {
    let mut lines = split_lines(existing);
    let Some(index) = find_terminal(&lines, terminals) else {
        return existing.to_owned();
    };
    let len = previous.len();
    if len == 0
        || index < len
        || !lines[index - len..index]
            .iter()
            .zip(previous)
            .all(|(have, want)| *have == AsRef::<str>::as_ref(want))
    {
        return existing.to_owned();
    }
    lines.drain(index - len..index);
    join_lines(&lines)
}

/// Replace the content between `# BEGIN <marker>` and `# END <marker>`.
///
/// When the pair is missing the marked block is appended. A `# BEGIN` line
/// without its `# END` owns everything up to the end of the text. Lines
/// outside the markers are kept as they are. Applying the same lines twice
/// yields the same text.
pub fn insert_with_markers<S: AsRef<str>>(existing: &str, marker: &str, lines: &[S]) -> String {
    let begin = format!("# BEGIN {marker}");
    let end = format!("# END {marker}");
    let current = split_lines(existing);

    let begin_idx = current.iter().position(|l| l.trim() == begin);
    let (before, after): (&[&str], &[&str]) = match begin_idx {
        Some(b) => {
            let end_idx = current[b + 1..]
                .iter()
                .position(|l| l.trim() == end)
                .map(|i| b + 1 + i);
            match end_idx {
                Some(e) => (&current[..b], &current[e + 1..]),
                None => (&current[..b], &[]),
            }
        }
        None => (&current[..], &[]),
    };

    let mut out: Vec<&str> = Vec::with_capacity(before.len() + lines.len() + after.len() + 2);
    out.extend_from_slice(before);
    out.push(&begin);
    out.extend(lines.iter().map(AsRef::<str>::as_ref));
    out.push(&end);
    out.extend_from_slice(after);
    join_lines(&out)
}
