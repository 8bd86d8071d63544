//! Metadata sidecar written next to committed media.
//!
//! Each download directory gets one `{storage_key}_metadata.json` holding the
//! extracted metadata plus the list of files the backend produced. A repeated
//! download replaces the sidecar.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::backend::{ExtractionResult, MediaMetadata, MediaType};
use crate::capability::BackendKind;

/// Errors produced by sidecar generation.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// I/O error writing the sidecar file to disk.
    #[error("I/O error writing sidecar {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// JSON serialization error (shouldn't occur for well-formed structs).
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SidecarError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Serialize)]
struct SidecarDocument<'a> {
    #[serde(flatten)]
    metadata: &'a MediaMetadata,
    media_type: MediaType,
    backend: BackendKind,
    files: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<&'a str>,
}

/// Path of the sidecar for `storage_key` inside `dir`.
#[must_use]
pub fn sidecar_path(dir: &Path, storage_key: &str) -> PathBuf {
    dir.join(format!("{storage_key}_metadata.json"))
}

/// Writes the sidecar for `result` into `dir` and returns its path.
///
/// The document is written to a temporary file first and renamed into place,
/// so readers never observe a half-written sidecar.
///
/// # Errors
///
/// Returns [`SidecarError`] on I/O or serialization failure; no partial file
/// is left behind.
#[instrument(skip(result), fields(dir = %dir.display()))]
pub fn write_sidecar(
    dir: &Path,
    storage_key: &str,
    result: &ExtractionResult,
) -> Result<PathBuf, SidecarError> {
    let target = sidecar_path(dir, storage_key);
    let temp = dir.join(format!(".{storage_key}_metadata.json.tmp"));

    let document = SidecarDocument {
        metadata: &result.metadata,
        media_type: result.media_type,
        backend: result.backend,
        files: result.files.iter().filter_map(|f| f.file_name()).collect(),
        warning: result.degraded.as_deref(),
    };

    let file = fs::File::create(&temp).map_err(|e| SidecarError::io(&temp, e))?;
    let write_result = {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &document)
            .map_err(SidecarError::from)
            .and_then(|()| writer.flush().map_err(|e| SidecarError::io(&temp, e)))
    };
    if let Err(err) = write_result {
        // Best-effort cleanup so a partially written file does not linger.
        let _ = fs::remove_file(&temp);
        return Err(err);
    }

    if let Err(err) = fs::rename(&temp, &target) {
        let _ = fs::remove_file(&temp);
        return Err(SidecarError::io(&target, err));
    }

    debug!(path = %target.display(), "Sidecar written");
    Ok(target)
}
