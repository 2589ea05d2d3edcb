//! Error types for rule compilation and installation.

use std::path::PathBuf;

/// Error produced while validating, merging or installing proxy rules.
///
/// Validation errors (`InvalidPattern`, `DanglingCaptureReference`,
/// `InvalidTarget`, `UnknownFlag`) reject input before anything is rendered.
/// The remaining variants are recoverable: the rule set is left untouched and
/// the caller may retry on the next flush.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RuleError {
    /// Local pattern is empty, does not compile, or would break the directive.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Target references a capture group the pattern does not define.
    #[error(
        "target {target:?} references ${index} but pattern {pattern:?} has {captures} capture group(s)"
    )]
    DanglingCaptureReference {
        /// Pattern of the mapping.
        pattern: String,
        /// Target template of the mapping.
        target: String,
        /// Referenced capture index.
        index: usize,
        /// Number of capture groups in the pattern.
        captures: usize,
    },

    /// Target template cannot be rendered into a directive.
    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget {
        /// Offending target.
        target: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Flag name not recognized.
    #[error("unknown rewrite flag {0:?}")]
    UnknownFlag(String),

    /// Terminal directive line is missing from the rule set.
    #[error("terminal directive not found in rule set (expected one of {expected:?})")]
    AnchorNotFound {
        /// Accepted spellings of the terminal directive.
        expected: Vec<String>,
    },

    /// Control file cannot be written.
    #[error("cannot write {}: {reason}", .path.display())]
    WriteDenied {
        /// Control file path.
        path: PathBuf,
        /// Why the write was refused.
        reason: String,
        /// Underlying I/O error, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Rule set store failed to load or persist rules.
    #[error("rule set store error")]
    Store(#[from] std::io::Error),
}

impl RuleError {
    /// Whether the host can keep running and retry later.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AnchorNotFound { .. } | Self::WriteDenied { .. } | Self::Store(_)
        )
    }

    pub(crate) fn write_denied(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::WriteDenied {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn write_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::WriteDenied {
            path: path.into(),
            reason: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(RuleError::AnchorNotFound { expected: vec![] }.is_recoverable());
        assert!(RuleError::write_denied("/x/.htaccess", "read-only").is_recoverable());
        assert!(!RuleError::UnknownFlag("Z".to_owned()).is_recoverable());
        assert!(
            !RuleError::InvalidPattern {
                pattern: String::new(),
                reason: "empty".to_owned(),
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_dangling_reference_message() {
        let err = RuleError::DanglingCaptureReference {
            pattern: "a/(.*)".to_owned(),
            target: "http://x/$2".to_owned(),
            index: 2,
            captures: 1,
        };
        assert_eq!(
            err.to_string(),
            r#"target "http://x/$2" references $2 but pattern "a/(.*)" has 1 capture group(s)"#
        );
    }
}
