//! Source preparation
//!
//! Finds the public entry-point type in submitted source and materializes a
//! fresh working directory holding `<EntryPoint>.java`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Config;

/// Errors that occur while preparing a working directory
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("no public class found in code")]
    NoEntryPoint,

    #[error("failed to prepare working directory: {0}")]
    Filesystem(#[source] std::io::Error),
}

static ENTRY_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bpublic\s+(?:(?:abstract|final|static|sealed|non-sealed|strictfp)\s+)*(?:class|interface|enum|record)\s+([\p{L}_$][\p{L}\p{N}_$]*)",
    )
    .expect("entry point pattern should be valid")
});

/// Extract the name of the first public top-level type declared in `source`
pub fn extract_entry_point(source: &str) -> Option<&str> {
    ENTRY_POINT
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// A working directory exclusively owned by one run attempt
///
/// The directory is removed by [`remove()`](Self::remove). Dropping a
/// `WorkDir` without calling it still removes the directory on a best-effort
/// basis.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl WorkDir {
    /// Create a fresh, uniquely named directory under `root`
    pub fn create(root: &Path, prefix: &str) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively remove the directory
    ///
    /// Removing an already removed directory is a no-op.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn remove(mut self) -> Result<(), std::io::Error> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(std::io::Error::other)??;

        debug!("working directory removed");
        Ok(())
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.dir.is_some() {
            warn!(
                path = %self.path.display(),
                "WorkDir dropped without explicit removal, removing it now"
            );
        }
    }
}

/// Source code written into its own working directory
#[derive(Debug)]
pub struct PreparedSource {
    /// Public type name, also the class to launch
    pub entry_point: String,

    /// File name of the source inside the working directory
    pub source_name: String,

    /// The working directory
    pub work_dir: WorkDir,
}

impl PreparedSource {
    /// Host path of the source file
    pub fn source_path(&self) -> PathBuf {
        self.work_dir.path().join(&self.source_name)
    }
}

/// Create a working directory and write `source` into it verbatim
///
/// The returned [`PreparedSource`] owns the directory. No directory is created
/// when the source has no public entry point.
#[instrument(skip(config, source), fields(len = source.len()))]
pub async fn prepare(config: &Config, source: &str) -> Result<PreparedSource, PrepareError> {
    let entry_point = extract_entry_point(source)
        .ok_or(PrepareError::NoEntryPoint)?
        .to_owned();
    let source_name = format!("{entry_point}.java");

    let root = config.work_root();
    let prefix = config.temp_prefix.clone();
    let work_dir = tokio::task::spawn_blocking(move || WorkDir::create(&root, &prefix))
        .await
        .map_err(|e| PrepareError::Filesystem(std::io::Error::other(e)))?
        .map_err(PrepareError::Filesystem)?;

    let source_path = work_dir.path().join(&source_name);
    if let Err(e) = tokio::fs::write(&source_path, source).await {
        // The directory never reaches the caller, so it is ours to remove
        let _ = work_dir.remove().await;
        return Err(PrepareError::Filesystem(e));
    }

    debug!(%entry_point, path = %source_path.display(), "wrote source file");

    Ok(PreparedSource {
        entry_point,
        source_name,
        work_dir,
    })
}
