//! Rule set storage used in custom routing mode.
//!
//! In custom mode the host owns the full rule text and regenerates it on a
//! flush. [`RuleSetStore`] is the seam through which the injector reads that
//! text and hands the spliced result back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Persisted rule text owned by the host.
pub trait RuleSetStore: Send + Sync {
    /// Current rule text. Missing storage reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the rules exist but cannot be read.
    fn load(&self) -> io::Result<String>;

    /// Replace the rule text.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the rules cannot be persisted.
    fn store(&self, rules: &str) -> io::Result<()>;
}

/// [`RuleSetStore`] backed by a file on disk.
#[derive(Debug, Clone)]
pub struct FileRuleSet {
    path: PathBuf,
}

impl FileRuleSet {
    /// Rule set stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the rules file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleSetStore for FileRuleSet {
    fn load(&self) -> io::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(rules) => Ok(rules),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    fn store(&self, rules: &str) -> io::Result<()> {
        fs::write(&self.path, rules)
    }
}

/// In-memory [`RuleSetStore`].
#[derive(Debug, Default)]
pub struct MemoryRuleSet {
    rules: RwLock<String>,
}

impl MemoryRuleSet {
    /// Store seeded with `rules`.
    pub fn new(rules: impl Into<String>) -> Self {
        Self {
            rules: RwLock::new(rules.into()),
        }
    }

    /// Current rule text.
    pub fn contents(&self) -> String {
        match self.rules.read() {
            Ok(rules) => rules.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RuleSetStore for MemoryRuleSet {
    fn load(&self) -> io::Result<String> {
        self.rules
            .read()
            .map(|rules| rules.clone())
            .map_err(|_| io::Error::other("rule set lock poisoned"))
    }

    fn store(&self, rules: &str) -> io::Result<()> {
        let mut guard = self
            .rules
            .write()
            .map_err(|_| io::Error::other("rule set lock poisoned"))?;
        rules.clone_into(&mut *guard);
        Ok(())
    }
}
