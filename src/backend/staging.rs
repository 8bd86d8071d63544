//! Per-fetch scratch directories committed into the final layout by rename.
//!
//! A backend writes everything for one fetch into a [`StagingDir`]. Only a
//! successful [`StagingDir::commit`] moves files into
//! `{download_dir}/{storage_key}/`; dropping the guard without committing
//! (error, panic or a cancelled future) deletes the scratch directory, so a
//! partial file set never reaches the final location.

use std::path::{Path, PathBuf};

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, warn};

use super::error::ExtractError;

/// Name of the scratch area under the download directory.
pub const STAGING_DIR_NAME: &str = ".staging";

const SUFFIX_LEN: usize = 8;

/// Scratch directory for one fetch.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    download_dir: PathBuf,
    storage_key: String,
    committed: bool,
}

impl StagingDir {
    /// Creates `{download_dir}/.staging/{storage_key}-{random}`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Io`] when the directory cannot be created.
    pub async fn create(download_dir: &Path, storage_key: &str) -> Result<Self, ExtractError> {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();
        let path = download_dir
            .join(STAGING_DIR_NAME)
            .join(format!("{storage_key}-{suffix}"));
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| ExtractError::io(&path, e))?;
        debug!(path = %path.display(), "staging directory created");
        Ok(Self {
            path,
            download_dir: download_dir.to_path_buf(),
            storage_key: storage_key.to_string(),
            committed: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Final directory files are committed into.
    #[must_use]
    pub fn final_dir(&self) -> PathBuf {
        self.download_dir.join(&self.storage_key)
    }

    /// Moves `files` (paths inside the staging directory) into the final directory.
    ///
    /// Existing files with the same name are replaced. Returns the committed
    /// paths in input order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Io`] if the final directory cannot be created or a
    /// rename fails; the staging directory is still removed on drop.
    pub async fn commit(mut self, files: &[PathBuf]) -> Result<Vec<PathBuf>, ExtractError> {
        let final_dir = self.final_dir();
        tokio::fs::create_dir_all(&final_dir)
            .await
            .map_err(|e| ExtractError::io(&final_dir, e))?;

        let mut committed = Vec::with_capacity(files.len());
        for file in files {
            let Some(name) = file.file_name() else {
                return Err(ExtractError::io(
                    file,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
                ));
            };
            let target = final_dir.join(name);
            if let Err(error) = tokio::fs::rename(file, &target).await {
                // Roll back so the final directory never holds a partial set
                for moved in &committed {
                    let _ = tokio::fs::remove_file(moved).await;
                }
                return Err(ExtractError::io(&target, error));
            }
            committed.push(target);
        }

        self.committed = true;
        if let Err(error) = tokio::fs::remove_dir_all(&self.path).await {
            debug!(path = %self.path.display(), %error, "staging leftovers not removed");
        }
        debug!(final_dir = %final_dir.display(), files = committed.len(), "staging committed");
        Ok(committed)
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "uncommitted staging directory removed"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => warn!(path = %self.path.display(), %error, "failed to remove staging directory"),
        }
    }
}
