//! `relay set` command implementation.

use clap::Args;
use relay_rules::SettingsPatch;

use super::site::SiteArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the set command.
#[derive(Args)]
pub(crate) struct SetArgs {
    /// Remote forum identifier.
    #[arg(long)]
    forum_name: Option<String>,

    /// Turn proxy rewrites on or off.
    #[arg(long)]
    proxy_rewrites: Option<bool>,

    /// Stored permalink structure; empty selects default routing.
    #[arg(long = "stored-permalink-structure")]
    stored_permalink_structure: Option<String>,

    #[command(flatten)]
    site: SiteArgs,
}

impl SetArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let patch = SettingsPatch {
            forum_name: self.forum_name,
            proxy_rewrites: self.proxy_rewrites,
            permalink_structure: self.stored_permalink_structure,
        };
        if patch.forum_name.is_none()
            && patch.proxy_rewrites.is_none()
            && patch.permalink_structure.is_none()
        {
            return Err(CliError::Validation(
                "Nothing to set: pass --forum-name, --proxy-rewrites or --stored-permalink-structure"
                    .to_owned(),
            ));
        }

        let site = self.site.open()?;
        if site.injector().update_settings(&patch) {
            output.success("Settings updated; proxy rules will be reinstalled on the next inject");
        } else {
            output.info("Settings unchanged");
        }
        Ok(())
    }
}
