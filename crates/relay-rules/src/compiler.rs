//! Rule compiler facade.
//!
//! [`RuleCompiler`] validates a mapping list once and then renders and merges
//! it for either routing mode. It holds no state between calls beyond the
//! validated mappings; persisting results and tracking whether they were
//! installed is up to the caller (see [`crate::ProxyInjector`]).

use crate::control_file::{ControlFile, WriteOutcome};
use crate::error::RuleError;
use crate::mapping::{ProxyMapping, validate};
use crate::merge::{has_block_before_terminal, splice_before_terminal};
use crate::mode::RoutingMode;
use crate::render::{RuleBlock, render};

/// Terminal directive the host keeps as its last rewrite rule.
pub const DEFAULT_TERMINAL_DIRECTIVE: &str = r"RewriteRule ^index\.php$ - [L]";

/// Unescaped spelling of [`DEFAULT_TERMINAL_DIRECTIVE`] found on some hosts.
pub const UNESCAPED_TERMINAL_DIRECTIVE: &str = "RewriteRule ^index.php$ - [L]";

/// Anchors recognized when merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesOptions {
    /// Marker name for the owned block in the control file.
    pub marker: String,
    /// Accepted spellings of the terminal directive.
    pub terminal_directives: Vec<String>,
}

impl Default for RulesOptions {
    fn default() -> Self {
        Self {
            marker: "WordPress".to_owned(),
            terminal_directives: vec![
                DEFAULT_TERMINAL_DIRECTIVE.to_owned(),
                UNESCAPED_TERMINAL_DIRECTIVE.to_owned(),
            ],
        }
    }
}

/// Validated mappings plus the anchors needed to merge them.
#[derive(Debug, Clone)]
pub struct RuleCompiler {
    mappings: Vec<ProxyMapping>,
    options: RulesOptions,
}

impl RuleCompiler {
    /// Validate `mappings` and build a compiler.
    ///
    /// # Errors
    ///
    /// Returns the first validation error; nothing is rendered.
    pub fn new(mappings: Vec<ProxyMapping>, options: RulesOptions) -> Result<Self, RuleError> {
        let mappings = validate(&mappings)?;
        Ok(Self { mappings, options })
    }

    /// Validated, normalized mappings in their original order.
    pub fn mappings(&self) -> &[ProxyMapping] {
        &self.mappings
    }

    /// Merge anchors in use.
    pub fn options(&self) -> &RulesOptions {
        &self.options
    }

    /// Render the rule block for `mode`.
    pub fn render(&self, mode: RoutingMode) -> RuleBlock {
        render(&self.mappings, mode)
    }

    /// Splice the custom-mode block before the terminal directive.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::AnchorNotFound`] if `existing` lacks the terminal
    /// directive.
    pub fn merge_custom(&self, existing: &str) -> Result<String, RuleError> {
        splice_before_terminal(
            existing,
            &self.render(RoutingMode::Custom),
            &self.options.terminal_directives,
        )
    }

    /// Whether `existing` already carries the custom-mode block.
    pub fn is_merged(&self, existing: &str) -> bool {
        has_block_before_terminal(
            existing,
            &self.render(RoutingMode::Custom),
            &self.options.terminal_directives,
        )
    }

    /// Callback for the host's rule regeneration.
    ///
    /// Returns the spliced rules, or `rules` untouched if the terminal
    /// directive is missing.
    pub fn filter_rules(&self, rules: String) -> String {
        match self.merge_custom(&rules) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::warn!("proxy rules not installed: {e}");
                rules
            }
        }
    }

    /// Control file at `path` using the configured marker.
    pub fn control_file(&self, path: impl Into<std::path::PathBuf>) -> ControlFile {
        ControlFile::new(path, self.options.marker.clone())
    }

    /// Write the default-mode block into `file`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::WriteDenied`] if the file cannot be written.
    pub fn install_default(&self, file: &ControlFile) -> Result<WriteOutcome, RuleError> {
        file.write_block(&self.render(RoutingMode::Default))
    }
}
