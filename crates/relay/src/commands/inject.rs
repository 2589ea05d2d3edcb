//! `relay inject` and `relay flush` command implementations.

use clap::Args;
use relay_rules::{InjectOutcome, SkipReason, WriteOutcome};

use super::site::SiteArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the inject command.
#[derive(Args)]
pub(crate) struct InjectArgs {
    /// Install even if rules are recorded as installed.
    #[arg(long)]
    force: bool,

    #[command(flatten)]
    site: SiteArgs,
}

impl InjectArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let site = self.site.open()?;
        let injector = site.injector();

        let outcome = if self.force && injector.is_enabled() && !site.mappings.is_empty() {
            injector.inject()
        } else {
            injector.maybe_inject()
        };
        report(&output, outcome)
    }
}

/// Arguments for the flush command.
#[derive(Args)]
pub(crate) struct FlushArgs {
    /// Soft flush: keep installed rules valid.
    #[arg(long)]
    soft: bool,

    #[command(flatten)]
    site: SiteArgs,
}

impl FlushArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let site = self.site.open()?;
        let injector = site.injector();

        if injector.on_hard_flush(!self.soft) {
            output.info("Installed rules invalidated");
        }
        report(&output, injector.maybe_inject())
    }
}

/// Print an injection outcome; a failed install becomes an error.
fn report(output: &Output, outcome: InjectOutcome) -> Result<(), CliError> {
    match outcome {
        InjectOutcome::Installed { mode, write } => {
            let detail = match write {
                WriteOutcome::Written => "written",
                WriteOutcome::Unchanged => "unchanged",
            };
            output.success(&format!("Proxy rules installed ({mode} routing, {detail})"));
            Ok(())
        }
        InjectOutcome::Skipped(SkipReason::AlreadyInjected) => {
            output.info("Proxy rules already installed");
            Ok(())
        }
        InjectOutcome::Skipped(SkipReason::Disabled) => {
            output.warning("Proxy rewrites are disabled");
            Ok(())
        }
        InjectOutcome::Skipped(SkipReason::NoMappings) => {
            output.warning("No proxy mappings configured");
            Ok(())
        }
        InjectOutcome::Failed { mode, error } => {
            if error.is_recoverable() {
                output.warning(&format!(
                    "Install failed in {mode} routing; rerun `relay inject` once the site is fixed"
                ));
            }
            Err(error.into())
        }
    }
}
