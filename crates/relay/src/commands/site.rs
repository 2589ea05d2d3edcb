//! Shared site arguments and collaborator wiring.

use std::path::PathBuf;

use clap::Args;
use relay_config::{CliSettings, Config};
use relay_options::{FileOptionStore, OptionStoreExt, names};
use relay_rules::{
    ControlFile, FileRuleSet, ForumPreset, ProxyInjector, ProxyMapping, RuleCompiler, RuleError,
    RuleSetStore, RulesOptions,
};

use crate::error::CliError;

/// Arguments shared by every command.
#[derive(Args)]
pub(crate) struct SiteArgs {
    /// Path to configuration file (default: auto-discover relay.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Site root directory (overrides config).
    #[arg(long, env = "RELAY_SITE_ROOT")]
    site_root: Option<PathBuf>,

    /// Permalink structure; empty selects default routing (overrides the option store).
    #[arg(long)]
    permalink_structure: Option<String>,
}

/// Loaded configuration plus the file-backed collaborators it describes.
pub(crate) struct Site {
    pub config: Config,
    pub options: FileOptionStore,
    pub rule_set: FileRuleSet,
    pub mappings: Vec<ProxyMapping>,
}

impl SiteArgs {
    /// Load configuration and open the site's stores.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or a mapping has an unknown flag.
    pub(crate) fn open(&self) -> Result<Site, CliError> {
        let cli_settings = CliSettings {
            site_root: self.site_root.clone(),
            permalink_structure: self.permalink_structure.clone(),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let options = FileOptionStore::new(config.site_resolved.options_file.clone());
        let rule_set = FileRuleSet::new(config.site_resolved.rules_file.clone());
        let mappings = collect_mappings(&config, &options)?;

        Ok(Site {
            config,
            options,
            rule_set,
            mappings,
        })
    }
}

impl Site {
    /// Merge anchors from configuration.
    pub(crate) fn rules_options(&self) -> RulesOptions {
        RulesOptions {
            marker: self.config.rules.marker.clone(),
            terminal_directives: self.config.rules.terminal_directives.clone(),
        }
    }

    /// Compiler over the configured mappings.
    pub(crate) fn compiler(&self) -> Result<RuleCompiler, CliError> {
        Ok(RuleCompiler::new(self.mappings.clone(), self.rules_options())?)
    }

    /// Current custom rule text.
    pub(crate) fn rule_set_contents(&self) -> Result<String, CliError> {
        Ok(self.rule_set.load()?)
    }

    /// Injector wired to the site's option store, rule set and control file.
    pub(crate) fn injector(&self) -> ProxyInjector<'_> {
        let control_file = ControlFile::new(
            self.config.site_resolved.control_file.clone(),
            self.config.rules.marker.clone(),
        );
        ProxyInjector::new(&self.options, &self.mappings, &self.rule_set, control_file)
            .with_terminal_directives(self.config.rules.terminal_directives.clone())
            .with_permalink_structure(self.config.site_resolved.permalink_structure.clone())
            .with_proxy_rewrites((!self.config.forum.proxy_rewrites).then_some(false))
    }
}

/// Forum preset mappings followed by `[[mappings]]` from configuration.
///
/// The forum name comes from configuration, falling back to the option store.
fn collect_mappings(
    config: &Config,
    options: &FileOptionStore,
) -> Result<Vec<ProxyMapping>, RuleError> {
    let forum_name = if config.forum.name.is_empty() {
        options.get_or(names::REMOTE_FORUM_NAME, "")
    } else {
        config.forum.name.clone()
    };

    let mut mappings = ForumPreset::new(forum_name)
        .with_server(config.forum.server.clone())
        .to_mappings();
    for mapping in &config.mappings {
        mappings.push(
            ProxyMapping::proxy(mapping.pattern.clone(), mapping.target.clone())
                .with_flag_names(&mapping.flags)?,
        );
    }
    Ok(mappings)
}
