//! CLI command implementations.

pub(crate) mod inject;
pub(crate) mod render;
pub(crate) mod set;
pub(crate) mod site;
pub(crate) mod status;

pub(crate) use inject::{FlushArgs, InjectArgs};
pub(crate) use render::RenderArgs;
pub(crate) use set::SetArgs;
pub(crate) use status::StatusArgs;
