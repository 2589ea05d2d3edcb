//! Option store abstraction for Relay.
//!
//! The site keeps its settings and the proxy injection state in a flat
//! key-value store owned by the host. This crate decouples the rule compiler
//! from how that store is persisted:
//!
//! - [`OptionStore`]: raw string get/set, the only thing a backend implements
//! - [`OptionStoreExt`]: typed access (flags, JSON) on top of any store
//!
//! # Implementations
//!
//! - [`MemoryOptionStore`]: in-process map, used in tests and one-shot runs
//! - [`FileOptionStore`]: JSON object persisted to a single file
//!
//! # Example
//!
//! ```
//! use relay_options::{MemoryOptionStore, OptionStore, OptionStoreExt, names};
//!
//! let options = MemoryOptionStore::new();
//! options.set_flag(names::ADDED_REWRITE_RULES, true);
//! assert!(options.get_flag(names::ADDED_REWRITE_RULES, false));
//! assert_eq!(options.get(names::ADDED_REWRITE_RULES).as_deref(), Some("1"));
//! ```

mod ext;
mod file;

use std::collections::HashMap;
use std::sync::RwLock;

pub use ext::OptionStoreExt;
pub use file::FileOptionStore;

/// Well-known option names shared by the compiler and its collaborators.
pub mod names {
    /// Identifier of the remote forum whose paths are proxied.
    pub const REMOTE_FORUM_NAME: &str = "remote_forum_name";
    /// Whether the compiled rules were already merged into persisted storage.
    pub const ADDED_REWRITE_RULES: &str = "added_rewrite_rules";
    /// Operator toggle for installing proxy rewrites at all.
    pub const ENABLE_PROXY_REWRITES: &str = "enable_proxy_rewrites";
    /// The host's permalink structure; empty means default routing.
    pub const PERMALINK_STRUCTURE: &str = "permalink_structure";
    /// JSON list of the rule lines last installed.
    pub const INSTALLED_RULES: &str = "relay_installed_rules";
}

/// A flat string key-value store owned by the host.
///
/// Values are stored as strings because that is what host option tables
/// hold. Use [`OptionStoreExt`] instead of parsing values by hand.
pub trait OptionStore: Send + Sync {
    /// Read an option. Returns `None` when the option was never set.
    fn get(&self, name: &str) -> Option<String>;

    /// Write an option.
    ///
    /// Returns `true` when the value was persisted. Backends log failures
    /// instead of returning errors since callers treat options as best-effort.
    fn set(&self, name: &str, value: &str) -> bool;
}

/// In-memory [`OptionStore`].
#[derive(Debug, Default)]
pub struct MemoryOptionStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryOptionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an option value.
    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let values = match self.values.get_mut() {
            Ok(values) => values,
            Err(poisoned) => poisoned.into_inner(),
        };
        values.insert(name.into(), value.into());
        self
    }
}

impl OptionStore for MemoryOptionStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.read().ok()?.get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) -> bool {
        let Ok(mut values) = self.values.write() else {
            return false;
        };
        values.insert(name.to_owned(), value.to_owned());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_missing_option() {
        let options = MemoryOptionStore::new();
        assert_eq!(options.get("nope"), None);
    }

    #[test]
    fn test_memory_store_set_and_get() {
        let options = MemoryOptionStore::new();
        assert!(options.set(names::REMOTE_FORUM_NAME, "acme"));
        assert_eq!(
            options.get(names::REMOTE_FORUM_NAME).as_deref(),
            Some("acme")
        );

        // Overwrite
        assert!(options.set(names::REMOTE_FORUM_NAME, "other"));
        assert_eq!(
            options.get(names::REMOTE_FORUM_NAME).as_deref(),
            Some("other")
        );
    }

    #[test]
    fn test_memory_store_with_option() {
        let options = MemoryOptionStore::new()
            .with_option(names::PERMALINK_STRUCTURE, "/%postname%/")
            .with_option(names::ADDED_REWRITE_RULES, "0");

        assert_eq!(
            options.get(names::PERMALINK_STRUCTURE).as_deref(),
            Some("/%postname%/")
        );
        assert_eq!(options.get(names::ADDED_REWRITE_RULES).as_deref(), Some("0"));
    }
}
