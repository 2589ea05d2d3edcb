//! Mapping preset for the hosted forum.

use crate::mapping::ProxyMapping;

/// Remote host serving hosted forums.
pub const DEFAULT_FORUM_SERVER: &str = "moot.it";

/// The two proxy mappings a hosted forum needs.
///
/// - `i/(<forum>)(/.*)?` serves the forum's indexable pages
/// - `m/(.*)` serves the shared widget assets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumPreset {
    /// Remote forum identifier.
    pub forum_name: String,
    /// Remote host, without scheme.
    pub server: String,
}

impl ForumPreset {
    /// Preset for `forum_name` on the default server.
    pub fn new(forum_name: impl Into<String>) -> Self {
        Self {
            forum_name: forum_name.into(),
            server: DEFAULT_FORUM_SERVER.to_owned(),
        }
    }

    /// Use a different remote host.
    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Mappings for this forum. Empty when no forum name is set.
    ///
    /// The forum name is regex-escaped before it becomes part of the pattern.
    pub fn to_mappings(&self) -> Vec<ProxyMapping> {
        if self.forum_name.is_empty() {
            return Vec::new();
        }
        let server = &self.server;
        vec![
            ProxyMapping::proxy(
                format!("i/({})(/.*)?", regex::escape(&self.forum_name)),
                format!("http://{server}/i/$1$2"),
            ),
            ProxyMapping::proxy("m/(.*)", format!("http://{server}/m/$1")),
        ]
    }
}
