//! File-backed option store.
//!
//! [`FileOptionStore`] persists all options as a single JSON object:
//!
//! ```text
//! {
//!   "added_rewrite_rules": "1",
//!   "remote_forum_name": "acme"
//! }
//! ```
//!
//! The file is re-read on every access so that separate processes (an admin
//! action and a CLI run, say) observe each other's writes. A missing or
//! unreadable file reads as an empty store, but only a missing file is ever
//! written over: a file that fails to read or parse is left for the operator.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::OptionStore;

/// [`OptionStore`] persisted as a JSON object on disk.
pub struct FileOptionStore {
    path: PathBuf,
}

impl FileOptionStore {
    /// Create a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current options, or `None` if the file exists but cannot be used.
    fn load(&self) -> Option<BTreeMap<String, String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Some(BTreeMap::new()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to read options: {e}");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(values) => Some(values),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "malformed options file: {e}");
                None
            }
        }
    }
}

impl OptionStore for FileOptionStore {
    fn get(&self, name: &str) -> Option<String> {
        self.load()?.remove(name)
    }

    fn set(&self, name: &str, value: &str) -> bool {
        let Some(mut values) = self.load() else {
            tracing::warn!(
                path = %self.path.display(),
                option = name,
                "not overwriting unusable options file"
            );
            return false;
        };
        values.insert(name.to_owned(), value.to_owned());

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = fs::create_dir_all(parent)
        {
            tracing::warn!(path = %parent.display(), "failed to create options directory: {e}");
            return false;
        }

        let encoded = match serde_json::to_string_pretty(&values) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!("failed to encode options: {e}");
                return false;
            }
        };
        if let Err(e) = fs::write(&self.path, encoded) {
            tracing::warn!(path = %self.path.display(), "failed to write options: {e}");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OptionStoreExt;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let options = FileOptionStore::new(tmp.path().join("options.json"));
        assert_eq!(options.get("remote_forum_name"), None);
    }

    #[test]
    fn test_set_creates_parent_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".relay/options.json");

        let options = FileOptionStore::new(path.clone());
        assert!(options.set("remote_forum_name", "acme"));
        assert!(options.set_flag("added_rewrite_rules", true));

        // A second handle on the same file sees both values
        let reopened = FileOptionStore::new(path);
        assert_eq!(reopened.get("remote_forum_name").as_deref(), Some("acme"));
        assert!(reopened.get_flag("added_rewrite_rules", false));
    }

    #[test]
    fn test_malformed_file_reads_empty_and_is_kept() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("options.json");
        fs::write(&path, "{ \"remote_forum_name\": \"acme\", ").unwrap();

        let options = FileOptionStore::new(path.clone());
        assert_eq!(options.get("remote_forum_name"), None);

        assert!(!options.set("key", "value"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{ \"remote_forum_name\": \"acme\", "
        );
    }

    #[test]
    fn test_set_keeps_other_options() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("options.json");
        let options = FileOptionStore::new(path);

        assert!(options.set("remote_forum_name", "acme"));
        assert!(options.set("enable_proxy_rewrites", "0"));
        assert_eq!(options.get("remote_forum_name").as_deref(), Some("acme"));
        assert_eq!(options.get("enable_proxy_rewrites").as_deref(), Some("0"));
    }
}
