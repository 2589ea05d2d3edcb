//! Routing mode selection.

use std::fmt;

/// How the host routes URLs, which decides where proxy rules are installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// No path segments in generated links. Rules go into a standalone
    /// module block in the root control file.
    Default,
    /// An explicit permalink pattern governs URLs. Rules are spliced into the
    /// host's own rule set before its terminal directive.
    Custom,
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Custom => f.write_str("custom"),
        }
    }
}

/// Select the routing mode from the host's permalink structure.
///
/// Absent or empty means [`RoutingMode::Default`]. The value is compared as
/// is, so a whitespace-only structure counts as custom.
pub fn select_mode(permalink_structure: Option<&str>) -> RoutingMode {
    match permalink_structure {
        None | Some("") => RoutingMode::Default,
        Some(_) => RoutingMode::Custom,
    }
}
