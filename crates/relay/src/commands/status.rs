//! `relay status` command implementation.

use clap::Args;
use relay_rules::{InjectionState, RuleFlag};

use super::site::SiteArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the status command.
#[derive(Args)]
pub(crate) struct StatusArgs {
    #[command(flatten)]
    site: SiteArgs,
}

impl StatusArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let site = self.site.open()?;
        let injector = site.injector();

        if let Some(path) = &site.config.config_path {
            output.info(&format!("Config: {}", path.display()));
        }
        output.info(&format!("Mode: {}", injector.mode()));
        output.info(&format!(
            "Proxy rewrites: {}",
            if injector.is_enabled() { "enabled" } else { "disabled" }
        ));
        output.info(&format!("State: {}", state_label(injector.state())));

        if site.mappings.is_empty() {
            output.warning("No proxy mappings configured");
            return Ok(());
        }
        output.highlight(&format!("Mappings ({}):", site.mappings.len()));
        for mapping in &site.mappings {
            let flags: Vec<&str> = mapping.flags.iter().copied().map(RuleFlag::as_str).collect();
            output.info(&format!(
                "  {} -> {} [{}]",
                mapping.pattern,
                mapping.target,
                flags.join(",")
            ));
        }
        Ok(())
    }
}

fn state_label(state: InjectionState) -> &'static str {
    match state {
        InjectionState::NeedsInjection => "needs injection",
        InjectionState::Injecting => "injecting",
        InjectionState::Injected => "injected",
    }
}
