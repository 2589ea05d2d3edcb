//! Root-level control file written in default routing mode.
//!
//! The rule block lives between a `# BEGIN`/`# END` marker pair so that
//! rewriting it never disturbs the rest of the file, and writing the same
//! block twice leaves the file unchanged.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::RuleError;
use crate::merge::insert_with_markers;
use crate::render::RuleBlock;

/// Result of a control file write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file content changed.
    Written,
    /// The file already held the block; nothing was written.
    Unchanged,
}

/// A control file such as `<site root>/.htaccess`.
#[derive(Debug, Clone)]
pub struct ControlFile {
    path: PathBuf,
    marker: String,
}

impl ControlFile {
    /// Control file at `path` whose owned block is delimited by `marker`.
    pub fn new(path: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            marker: marker.into(),
        }
    }

    /// Path of the control file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Marker name delimiting the owned block.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Check that the file can be written.
    ///
    /// An existing file must not be read-only. A missing file requires an
    /// existing, writable parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::WriteDenied`] describing the first failed check.
    pub fn check_writable(&self) -> Result<(), RuleError> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.is_dir() => {
                Err(RuleError::write_denied(&self.path, "path is a directory"))
            }
            Ok(meta) if meta.permissions().readonly() => {
                Err(RuleError::write_denied(&self.path, "file is read-only"))
            }
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => self.check_parent_writable(),
            Err(e) => Err(RuleError::write_io(&self.path, e)),
        }
    }

    fn check_parent_writable(&self) -> Result<(), RuleError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        match fs::metadata(parent) {
            Ok(meta) if !meta.is_dir() => Err(RuleError::write_denied(
                &self.path,
                "parent is not a directory",
            )),
            Ok(meta) if meta.permissions().readonly() => Err(RuleError::write_denied(
                &self.path,
                "parent directory is read-only",
            )),
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(RuleError::WriteDenied {
                path: self.path.clone(),
                reason: "parent directory does not exist".to_owned(),
                source: Some(e),
            }),
            Err(e) => Err(RuleError::write_io(&self.path, e)),
        }
    }

    /// Current file content. A missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::WriteDenied`] if the file exists but cannot be read.
    pub fn read(&self) -> Result<String, RuleError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(RuleError::write_io(&self.path, e)),
        }
    }

    /// Install `block` between the markers, keeping the rest of the file.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::WriteDenied`] if the file is not writable or the
    /// write fails. The file is left as it was.
    pub fn write_block(&self, block: &RuleBlock) -> Result<WriteOutcome, RuleError> {
        self.check_writable()?;

        let existing = self.read()?;
        let updated = insert_with_markers(&existing, &self.marker, block.lines());
        if updated == existing {
            tracing::debug!(path = %self.path.display(), "control file already up to date");
            return Ok(WriteOutcome::Unchanged);
        }

        fs::write(&self.path, &updated).map_err(|e| RuleError::write_io(&self.path, e))?;
        tracing::info!(
            path = %self.path.display(),
            lines = block.len(),
            "installed proxy rules in control file"
        );
        Ok(WriteOutcome::Written)
    }
}
