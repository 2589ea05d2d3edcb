//! Proxy rule injection lifecycle.
//!
//! [`ProxyInjector`] drives the compiler on behalf of the host. It reads the
//! routing mode and the injection flag from an [`OptionStore`], installs rules
//! in the right place for the mode, and records success:
//!
//! ```text
//! NeedsInjection -> Injecting -> Injected
//!       ^                            |
//!       +--- mappings changed / hard flush
//! ```
//!
//! The flag is only set after a successful install. A recoverable failure
//! leaves it unset so the next flush or settings change retries.

use std::cell::Cell;

use relay_options::{OptionStore, OptionStoreExt, names};

use crate::compiler::{RuleCompiler, RulesOptions};
use crate::control_file::{ControlFile, WriteOutcome};
use crate::error::RuleError;
use crate::mapping::ProxyMapping;
use crate::merge::strip_block_before_terminal;
use crate::mode::{RoutingMode, select_mode};
use crate::preset::ForumPreset;
use crate::render::RuleBlock;
use crate::store::RuleSetStore;

/// Source of the mappings to install.
pub trait MappingProvider {
    /// Mappings in render order.
    fn mappings(&self) -> Vec<ProxyMapping>;
}

impl MappingProvider for Vec<ProxyMapping> {
    fn mappings(&self) -> Vec<ProxyMapping> {
        self.clone()
    }
}

impl MappingProvider for ForumPreset {
    fn mappings(&self) -> Vec<ProxyMapping> {
        self.to_mappings()
    }
}

/// Where the host is in the injection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionState {
    /// Rules are not (known to be) installed.
    NeedsInjection,
    /// An install is in progress.
    Injecting,
    /// Rules were installed and nothing has invalidated them since.
    Injected,
}

/// Why [`ProxyInjector::maybe_inject`] did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Proxy rewrites are switched off.
    Disabled,
    /// The provider returned no mappings.
    NoMappings,
    /// Rules are already installed.
    AlreadyInjected,
}

/// Result of an injection attempt.
#[derive(Debug)]
pub enum InjectOutcome {
    /// Nothing was attempted.
    Skipped(SkipReason),
    /// Rules are in place.
    Installed {
        /// Mode the rules were installed for.
        mode: RoutingMode,
        /// Whether persisted content changed.
        write: WriteOutcome,
    },
    /// The attempt failed; the injection flag stays unset.
    Failed {
        /// Mode the install was attempted for.
        mode: RoutingMode,
        /// Cause of the failure.
        error: RuleError,
    },
}

impl InjectOutcome {
    /// Whether rules are known to be installed after this outcome.
    pub fn is_installed(&self) -> bool {
        matches!(
            self,
            Self::Installed { .. } | Self::Skipped(SkipReason::AlreadyInjected)
        )
    }
}

/// Settings change submitted by an operator.
///
/// Only `Some` fields are written.
#[derive(Debug, Default, Clone)]
pub struct SettingsPatch {
    /// New remote forum identifier.
    pub forum_name: Option<String>,
    /// New state of the proxy rewrite toggle.
    pub proxy_rewrites: Option<bool>,
    /// New permalink structure.
    pub permalink_structure: Option<String>,
}

/// Installs proxy rules and tracks whether they are in place.
pub struct ProxyInjector<'a> {
    options: &'a dyn OptionStore,
    provider: &'a dyn MappingProvider,
    rule_set: &'a dyn RuleSetStore,
    control_file: ControlFile,
    rules_options: RulesOptions,
    permalink_override: Option<String>,
    enabled_override: Option<bool>,
    in_progress: Cell<bool>,
}

impl<'a> ProxyInjector<'a> {
    /// Create an injector over the host's collaborators.
    ///
    /// `control_file` is used in default routing mode, `rule_set` in custom
    /// routing mode.
    pub fn new(
        options: &'a dyn OptionStore,
        provider: &'a dyn MappingProvider,
        rule_set: &'a dyn RuleSetStore,
        control_file: ControlFile,
    ) -> Self {
        let rules_options = RulesOptions {
            marker: control_file.marker().to_owned(),
            ..RulesOptions::default()
        };
        Self {
            options,
            provider,
            rule_set,
            control_file,
            rules_options,
            permalink_override: None,
            enabled_override: None,
            in_progress: Cell::new(false),
        }
    }

    /// Accept these terminal directive spellings in custom mode.
    #[must_use]
    pub fn with_terminal_directives(mut self, terminal_directives: Vec<String>) -> Self {
        self.rules_options.terminal_directives = terminal_directives;
        self
    }

    /// Use this permalink structure instead of the stored option.
    #[must_use]
    pub fn with_permalink_structure(mut self, permalink_structure: Option<String>) -> Self {
        self.permalink_override = permalink_structure;
        self
    }

    /// Force proxy rewrites off (or on) regardless of the stored toggle.
    #[must_use]
    pub fn with_proxy_rewrites(mut self, enabled: Option<bool>) -> Self {
        self.enabled_override = enabled;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InjectionState {
        if self.in_progress.get() {
            InjectionState::Injecting
        } else if self.options.get_flag(names::ADDED_REWRITE_RULES, false) {
            InjectionState::Injected
        } else {
            InjectionState::NeedsInjection
        }
    }

    /// Routing mode derived from the permalink structure.
    pub fn mode(&self) -> RoutingMode {
        let stored;
        let structure = match &self.permalink_override {
            Some(s) => Some(s.as_str()),
            None => {
                stored = self.options.get(names::PERMALINK_STRUCTURE);
                stored.as_deref()
            }
        };
        select_mode(structure)
    }

    /// Whether proxy rewrites are switched on.
    pub fn is_enabled(&self) -> bool {
        self.enabled_override.unwrap_or(true)
            && self.options.get_flag(names::ENABLE_PROXY_REWRITES, true)
    }

    /// Install rules unless disabled, empty, or already installed.
    ///
    /// Installed rules that no longer match the current mappings or mode are
    /// reinstalled even if the flag is still set.
    pub fn maybe_inject(&self) -> InjectOutcome {
        if !self.is_enabled() {
            tracing::debug!("proxy rewrites disabled");
            return InjectOutcome::Skipped(SkipReason::Disabled);
        }
        if self.state() == InjectionState::Injected {
            if self.installed_rules_current() {
                tracing::debug!("proxy rules already installed");
                return InjectOutcome::Skipped(SkipReason::AlreadyInjected);
            }
            tracing::debug!("installed proxy rules are stale");
            self.reset();
        }
        if self.provider.mappings().is_empty() {
            tracing::debug!("no proxy mappings configured");
            return InjectOutcome::Skipped(SkipReason::NoMappings);
        }
        self.inject()
    }

    /// Install rules for the current mode, regardless of the stored state.
    pub fn inject(&self) -> InjectOutcome {
        let mode = self.mode();
        self.in_progress.set(true);
        let result = self.install(mode);
        self.in_progress.set(false);

        match result {
            Ok((write, block)) => {
                self.options
                    .set_json(names::INSTALLED_RULES, &block.lines().to_vec());
                self.options.set_flag(names::ADDED_REWRITE_RULES, true);
                tracing::info!(%mode, ?write, "proxy rules installed");
                InjectOutcome::Installed { mode, write }
            }
            Err(error) if error.is_recoverable() => {
                tracing::warn!(%mode, "proxy rules not installed, will retry: {error}");
                InjectOutcome::Failed { mode, error }
            }
            Err(error) => {
                tracing::error!(%mode, "proxy mappings rejected: {error}");
                InjectOutcome::Failed { mode, error }
            }
        }
    }

    /// Lines recorded by the last successful install.
    fn installed_rules(&self) -> Option<Vec<String>> {
        self.options.get_json(names::INSTALLED_RULES)
    }

    /// Whether the recorded install matches what would be rendered now.
    ///
    /// Without a record the flag is trusted.
    fn installed_rules_current(&self) -> bool {
        let Some(installed) = self.installed_rules() else {
            return true;
        };
        RuleCompiler::new(self.provider.mappings(), self.rules_options.clone())
            .is_ok_and(|compiler| compiler.render(self.mode()).lines() == installed.as_slice())
    }

    fn install(&self, mode: RoutingMode) -> Result<(WriteOutcome, RuleBlock), RuleError> {
        let compiler = RuleCompiler::new(self.provider.mappings(), self.rules_options.clone())?;
        let block = compiler.render(mode);
        let write = match mode {
            RoutingMode::Default => compiler.install_default(&self.control_file)?,
            RoutingMode::Custom => self.install_custom(&compiler)?,
        };
        Ok((write, block))
    }

    fn install_custom(&self, compiler: &RuleCompiler) -> Result<WriteOutcome, RuleError> {
        let loaded = self.rule_set.load()?;
        let terminals = &self.rules_options.terminal_directives;

        // Take out the previous splice so changed mappings replace it
        let base = match self.installed_rules() {
            Some(previous) => strip_block_before_terminal(&loaded, &previous, terminals),
            None => loaded.clone(),
        };
        // The host may not have regenerated its rules since an unrecorded
        // splice; a second splice would duplicate them.
        let merged = if compiler.is_merged(&base) {
            base
        } else {
            compiler.merge_custom(&base)?
        };

        if merged == loaded {
            return Ok(WriteOutcome::Unchanged);
        }
        self.rule_set.store(&merged)?;
        Ok(WriteOutcome::Written)
    }

    /// Handle a rule flush. A hard flush invalidates installed rules.
    ///
    /// Returns `hard` unchanged.
    pub fn on_hard_flush(&self, hard: bool) -> bool {
        if hard {
            tracing::debug!("hard flush, proxy rules need reinstalling");
            self.reset();
        }
        hard
    }

    /// Invalidate installed rules if the mapping list changed.
    ///
    /// Returns `true` when the state was reset.
    pub fn on_mappings_changed(&self, old: &[ProxyMapping], new: &[ProxyMapping]) -> bool {
        if old == new {
            return false;
        }
        tracing::debug!("proxy mappings changed, proxy rules need reinstalling");
        self.reset();
        true
    }

    /// Apply an operator settings change.
    ///
    /// Changing the forum name, the proxy toggle or the permalink structure
    /// invalidates installed rules. Returns `true` when the state was reset.
    pub fn update_settings(&self, patch: &SettingsPatch) -> bool {
        let mut changed = false;

        if let Some(forum_name) = &patch.forum_name
            && self.options.get_or(names::REMOTE_FORUM_NAME, "") != *forum_name
        {
            self.options.set(names::REMOTE_FORUM_NAME, forum_name);
            changed = true;
        }
        if let Some(enabled) = patch.proxy_rewrites
            && self.options.get_flag(names::ENABLE_PROXY_REWRITES, true) != enabled
        {
            self.options.set_flag(names::ENABLE_PROXY_REWRITES, enabled);
            changed = true;
        }
        if let Some(structure) = &patch.permalink_structure
            && self.options.get_or(names::PERMALINK_STRUCTURE, "") != *structure
        {
            self.options.set(names::PERMALINK_STRUCTURE, structure);
            changed = true;
        }

        if changed {
            tracing::debug!("settings changed, proxy rules need reinstalling");
            self.reset();
        }
        changed
    }

    fn reset(&self) {
        self.options.set_flag(names::ADDED_REWRITE_RULES, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRuleSet;
    use pretty_assertions::assert_eq;
    use relay_options::MemoryOptionStore;
    use tempfile::TempDir;

    const HOST_RULES: &str = "# BEGIN WordPress\n\
<IfModule mod_rewrite.c>\n\
RewriteEngine On\n\
RewriteBase /\n\
RewriteRule ^index\\.php$ - [L]\n\
RewriteRule . /index.php [L]\n\
</IfModule>\n\
# END WordPress\n";

    struct Fixture {
        _tmp: TempDir,
        control_file: ControlFile,
        rule_set: MemoryRuleSet,
        preset: ForumPreset,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let control_file = ControlFile::new(tmp.path().join(".htaccess"), "WordPress");
            Self {
                _tmp: tmp,
                control_file,
                rule_set: MemoryRuleSet::new(HOST_RULES),
                preset: ForumPreset::new("acme").with_server("svc.example"),
            }
        }

        fn injector<'a>(&'a self, options: &'a MemoryOptionStore) -> ProxyInjector<'a> {
            ProxyInjector::new(
                options,
                &self.preset,
                &self.rule_set,
                self.control_file.clone(),
            )
        }
    }

    #[test]
    fn test_default_mode_writes_control_file_and_sets_flag() {
        let fx = Fixture::new();
        let options = MemoryOptionStore::new();
        let injector = fx.injector(&options);

        assert_eq!(injector.state(), InjectionState::NeedsInjection);
        let outcome = injector.maybe_inject();
        assert!(matches!(
            outcome,
            InjectOutcome::Installed {
                mode: RoutingMode::Default,
                write: WriteOutcome::Written
            }
        ));
        assert_eq!(injector.state(), InjectionState::Injected);
        assert!(options.get_flag(names::ADDED_REWRITE_RULES, false));

        let content = std::fs::read_to_string(fx.control_file.path()).unwrap();
        assert!(content.contains("RewriteRule ^i/(acme)(/.*)?$ http://svc.example/i/$1$2 [P]\n"));
        assert!(content.contains("RewriteRule ^m/(.*)$ http://svc.example/m/$1 [P]\n"));
        // Custom-mode store untouched
        assert_eq!(fx.rule_set.contents(), HOST_RULES);
    }

    #[test]
    fn test_already_injected_is_skipped() {
        let fx = Fixture::new();
        let options = MemoryOptionStore::new().with_option(names::ADDED_REWRITE_RULES, "1");
        let injector = fx.injector(&options);

        assert!(matches!(
            injector.maybe_inject(),
            InjectOutcome::Skipped(SkipReason::AlreadyInjected)
        ));
        assert!(!fx.control_file.path().exists());
    }

    #[test]
    fn test_disabled_is_skipped() {
        let fx = Fixture::new();
        let options = MemoryOptionStore::new().with_option(names::ENABLE_PROXY_REWRITES, "0");
        let injector = fx.injector(&options);
        assert!(matches!(
            injector.maybe_inject(),
            InjectOutcome::Skipped(SkipReason::Disabled)
        ));

        let options = MemoryOptionStore::new();
        let injector = fx.injector(&options).with_proxy_rewrites(Some(false));
        assert!(matches!(
            injector.maybe_inject(),
            InjectOutcome::Skipped(SkipReason::Disabled)
        ));
    }

    #[test]
    fn test_no_mappings_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let options = MemoryOptionStore::new();
        let rule_set = MemoryRuleSet::new(HOST_RULES);
        let preset = ForumPreset::new("");
        let injector = ProxyInjector::new(
            &options,
            &preset,
            &rule_set,
            ControlFile::new(tmp.path().join(".htaccess"), "WordPress"),
        );
        assert!(matches!(
            injector.maybe_inject(),
            InjectOutcome::Skipped(SkipReason::NoMappings)
        ));
        assert_eq!(injector.state(), InjectionState::NeedsInjection);
    }

    #[test]
    fn test_custom_mode_splices_rule_set() {
        let fx = Fixture::new();
        let options =
            MemoryOptionStore::new().with_option(names::PERMALINK_STRUCTURE, "/%postname%/");
        let injector = fx.injector(&options);

        let outcome = injector.maybe_inject();
        assert!(matches!(
            outcome,
            InjectOutcome::Installed {
                mode: RoutingMode::Custom,
                write: WriteOutcome::Written
            }
        ));
        assert_eq!(
            fx.rule_set.contents(),
            "# BEGIN WordPress\n\
<IfModule mod_rewrite.c>\n\
RewriteEngine On\n\
RewriteBase /\n\
RewriteRule ^i/(acme)(/.*)?$ http://svc.example/i/$1$2 [P]\n\
RewriteRule ^m/(.*)$ http://svc.example/m/$1 [P]\n\
RewriteRule ^index\\.php$ - [L]\n\
RewriteRule . /index.php [L]\n\
</IfModule>\n\
# END WordPress\n"
        );
        assert!(!fx.control_file.path().exists());
    }

    #[test]
    fn test_hard_flush_then_reinject_does_not_duplicate() {
        let fx = Fixture::new();
        let options =
            MemoryOptionStore::new().with_option(names::PERMALINK_STRUCTURE, "/%postname%/");
        let injector = fx.injector(&options);

        injector.maybe_inject();
        let installed = fx.rule_set.contents();

        assert!(injector.on_hard_flush(true));
        assert_eq!(injector.state(), InjectionState::NeedsInjection);

        let outcome = injector.maybe_inject();
        assert!(matches!(
            outcome,
            InjectOutcome::Installed {
                write: WriteOutcome::Unchanged,
                ..
            }
        ));
        assert_eq!(fx.rule_set.contents(), installed);
        assert_eq!(injector.state(), InjectionState::Injected);
    }

    #[test]
    fn test_changed_forum_replaces_previous_splice() {
        let fx = Fixture::new();
        let options =
            MemoryOptionStore::new().with_option(names::PERMALINK_STRUCTURE, "/%postname%/");
        assert!(fx.injector(&options).maybe_inject().is_installed());

        let other = ForumPreset::new("other").with_server("svc.example");
        let injector = ProxyInjector::new(
            &options,
            &other,
            &fx.rule_set,
            fx.control_file.clone(),
        );
        assert!(injector.on_mappings_changed(&fx.preset.to_mappings(), &other.to_mappings()));
        assert!(matches!(
            injector.maybe_inject(),
            InjectOutcome::Installed {
                write: WriteOutcome::Written,
                ..
            }
        ));

        assert_eq!(
            fx.rule_set.contents(),
            "# BEGIN WordPress\n\
<IfModule mod_rewrite.c>\n\
RewriteEngine On\n\
RewriteBase /\n\
RewriteRule ^i/(other)(/.*)?$ http://svc.example/i/$1$2 [P]\n\
RewriteRule ^m/(.*)$ http://svc.example/m/$1 [P]\n\
RewriteRule ^index\\.php$ - [L]\n\
RewriteRule . /index.php [L]\n\
</IfModule>\n\
# END WordPress\n"
        );
    }

    #[test]
    fn test_stale_install_detected_without_reset() {
        let fx = Fixture::new();
        let options =
            MemoryOptionStore::new().with_option(names::PERMALINK_STRUCTURE, "/%postname%/");
        fx.injector(&options).maybe_inject();

        // Flag still set, but the recorded rules belong to another forum
        let other = ForumPreset::new("other").with_server("svc.example");
        let injector = ProxyInjector::new(
            &options,
            &other,
            &fx.rule_set,
            fx.control_file.clone(),
        );
        assert_eq!(injector.state(), InjectionState::Injected);
        assert!(injector.maybe_inject().is_installed());

        let rules = fx.rule_set.contents();
        assert!(rules.contains("^i/(other)"));
        assert!(!rules.contains("^i/(acme)"));
        assert_eq!(rules.matches("RewriteRule ^m/(.*)$").count(), 1);

        // Same mappings again: nothing to do
        assert!(matches!(
            injector.maybe_inject(),
            InjectOutcome::Skipped(SkipReason::AlreadyInjected)
        ));
    }

    #[test]
    fn test_install_records_rule_lines() {
        let fx = Fixture::new();
        let options = MemoryOptionStore::new();
        fx.injector(&options).maybe_inject();

        let recorded: Vec<String> = options.get_json(names::INSTALLED_RULES).unwrap();
        assert_eq!(recorded.first().map(String::as_str), Some("<IfModule mod_rewrite.c>"));
        assert_eq!(recorded.len(), 6);
    }

    #[test]
    fn test_soft_flush_keeps_state() {
        let fx = Fixture::new();
        let options = MemoryOptionStore::new().with_option(names::ADDED_REWRITE_RULES, "1");
        let injector = fx.injector(&options);
        assert!(!injector.on_hard_flush(false));
        assert_eq!(injector.state(), InjectionState::Injected);
    }

    #[test]
    fn test_missing_anchor_leaves_flag_unset() {
        let fx = Fixture::new();
        let options =
            MemoryOptionStore::new().with_option(names::PERMALINK_STRUCTURE, "/%postname%/");
        fx.rule_set.store("RewriteEngine On\n").unwrap();
        let injector = fx.injector(&options);

        let outcome = injector.maybe_inject();
        match outcome {
            InjectOutcome::Failed { mode, error } => {
                assert_eq!(mode, RoutingMode::Custom);
                assert!(matches!(error, RuleError::AnchorNotFound { .. }));
                assert!(error.is_recoverable());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(fx.rule_set.contents(), "RewriteEngine On\n");
        assert_eq!(injector.state(), InjectionState::NeedsInjection);
    }

    #[test]
    fn test_write_denied_leaves_flag_unset() {
        let tmp = TempDir::new().unwrap();
        let options = MemoryOptionStore::new();
        let rule_set = MemoryRuleSet::default();
        let preset = ForumPreset::new("acme");
        let injector = ProxyInjector::new(
            &options,
            &preset,
            &rule_set,
            ControlFile::new(tmp.path().join("no/such/dir/.htaccess"), "WordPress"),
        );

        let outcome = injector.maybe_inject();
        assert!(matches!(
            outcome,
            InjectOutcome::Failed {
                error: RuleError::WriteDenied { .. },
                ..
            }
        ));
        assert!(!outcome.is_installed());
        assert_eq!(injector.state(), InjectionState::NeedsInjection);
    }

    #[test]
    fn test_invalid_mapping_reported_not_panicking() {
        let tmp = TempDir::new().unwrap();
        let options = MemoryOptionStore::new();
        let rule_set = MemoryRuleSet::default();
        let mappings = vec![ProxyMapping::proxy("x/(.*)", "http://x.example/$4")];
        let injector = ProxyInjector::new(
            &options,
            &mappings,
            &rule_set,
            ControlFile::new(tmp.path().join(".htaccess"), "WordPress"),
        );
        assert!(matches!(
            injector.maybe_inject(),
            InjectOutcome::Failed {
                error: RuleError::DanglingCaptureReference { .. },
                ..
            }
        ));
        assert!(!tmp.path().join(".htaccess").exists());
    }

    #[test]
    fn test_permalink_override_wins() {
        let fx = Fixture::new();
        let options =
            MemoryOptionStore::new().with_option(names::PERMALINK_STRUCTURE, "/%postname%/");
        let injector = fx.injector(&options).with_permalink_structure(Some(String::new()));
        assert_eq!(injector.mode(), RoutingMode::Default);
    }

    #[test]
    fn test_mappings_changed_resets_state() {
        let fx = Fixture::new();
        let options = MemoryOptionStore::new().with_option(names::ADDED_REWRITE_RULES, "1");
        let injector = fx.injector(&options);

        let old = ForumPreset::new("acme").to_mappings();
        assert!(!injector.on_mappings_changed(&old, &old));
        assert_eq!(injector.state(), InjectionState::Injected);

        let new = ForumPreset::new("other").to_mappings();
        assert!(injector.on_mappings_changed(&old, &new));
        assert_eq!(injector.state(), InjectionState::NeedsInjection);
    }

    #[test]
    fn test_update_settings() {
        let fx = Fixture::new();
        let options = MemoryOptionStore::new()
            .with_option(names::ADDED_REWRITE_RULES, "1")
            .with_option(names::REMOTE_FORUM_NAME, "acme");
        let injector = fx.injector(&options);

        // Same forum name: nothing to do
        let same = SettingsPatch {
            forum_name: Some("acme".to_owned()),
            ..SettingsPatch::default()
        };
        assert!(!injector.update_settings(&same));
        assert_eq!(injector.state(), InjectionState::Injected);

        // Toggle stored as "0"/"1"
        let off = SettingsPatch {
            proxy_rewrites: Some(false),
            ..SettingsPatch::default()
        };
        assert!(injector.update_settings(&off));
        assert_eq!(options.get(names::ENABLE_PROXY_REWRITES).as_deref(), Some("0"));
        assert_eq!(injector.state(), InjectionState::NeedsInjection);
        assert!(!injector.is_enabled());
    }
}
