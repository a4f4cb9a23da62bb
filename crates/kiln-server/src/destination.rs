//! The destination tree shared by the build runner and the static server.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Destination directory plus the sibling directories used for staged builds.
///
/// Staged builds write into `.<name>.staging` next to the destination and are
/// promoted with two renames, so readers only ever see a complete tree. Between
/// the two renames the destination is briefly absent and requests answer 404.
#[derive(Debug, Clone)]
pub struct Destination {
    root: PathBuf,
}

impl Destination {
    /// Create a destination rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory served over HTTP.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a staged build writes into.
    pub fn staging_dir(&self) -> PathBuf {
        self.sibling("staging")
    }

    /// Directory the previous tree is parked in during promotion.
    pub fn previous_dir(&self) -> PathBuf {
        self.sibling("previous")
    }

    /// Paths the build writes to; the watcher must never react to them.
    pub fn owned_paths(&self) -> Vec<PathBuf> {
        vec![self.root.clone(), self.staging_dir(), self.previous_dir()]
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("site");
        self.root.with_file_name(format!(".{}.{}", name, suffix))
    }

    /// Create an empty staging directory, removing leftovers from an earlier run.
    pub fn prepare_staging(&self) -> io::Result<PathBuf> {
        let staging = self.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        Ok(staging)
    }

    /// Replace the destination with a completed staging directory.
    pub fn promote(&self, staging: &Path) -> io::Result<()> {
        let previous = self.previous_dir();
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }

        let had_root = self.root.exists();
        if had_root {
            fs::rename(&self.root, &previous)?;
        }

        if let Err(e) = fs::rename(staging, &self.root) {
            if had_root {
                if let Err(restore) = fs::rename(&previous, &self.root) {
                    tracing::error!(
                        "Failed to restore {} after aborted promotion: {}",
                        self.root.display(),
                        restore
                    );
                }
            }
            return Err(e);
        }

        if had_root {
            if let Err(e) = fs::remove_dir_all(&previous) {
                tracing::warn!("Failed to remove {}: {}", previous.display(), e);
            }
        }

        Ok(())
    }

    /// Remove a staging directory left by a failed build.
    pub fn discard(&self, staging: &Path) {
        if let Err(e) = fs::remove_dir_all(staging) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", staging.display(), e);
            }
        }
    }

    /// Empty the destination in place before an unstaged build.
    pub fn clear(&self) -> io::Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)
    }
}
