//! `relay render` command implementation.

use clap::{Args, ValueEnum};
use relay_rules::RoutingMode;

use super::site::SiteArgs;
use crate::error::CliError;
use crate::output::Output;

/// Routing mode selectable on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum ModeArg {
    Default,
    Custom,
}

impl From<ModeArg> for RoutingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Default => Self::Default,
            ModeArg::Custom => Self::Custom,
        }
    }
}

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Routing mode to render for (default: derived from the permalink structure).
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Print the custom rule set with the block spliced in instead of the bare block.
    #[arg(long)]
    merged: bool,

    #[command(flatten)]
    site: SiteArgs,
}

impl RenderArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let site = self.site.open()?;
        let compiler = site.compiler()?;

        if compiler.mappings().is_empty() {
            output.warning("No proxy mappings configured");
            return Ok(());
        }

        if self.merged {
            let existing = site.rule_set_contents()?;
            output.emit(&compiler.merge_custom(&existing)?)?;
            return Ok(());
        }

        let mode = self
            .mode
            .map_or_else(|| site.injector().mode(), RoutingMode::from);
        tracing::debug!(%mode, "rendering proxy rules");
        output.emit(&compiler.render(mode).to_string())?;
        Ok(())
    }
}
