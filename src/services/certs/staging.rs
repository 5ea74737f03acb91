//! Short-lived on-disk staging of certificate material
//!
//! Certificate managers take a file path, not the certificate text, so the
//! text is written to a private temporary directory for the duration of the
//! bus call. The directory is removed when the [`StagedCertificate`] is
//! dropped, on every exit path.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

const STAGING_PREFIX: &str = "Certs.";
const STAGED_FILE_NAME: &str = "cert.pem";

/// Owning handle for one staged certificate file
#[derive(Debug)]
pub struct StagedCertificate {
    dir: Option<TempDir>,
    file: PathBuf,
}

impl StagedCertificate {
    /// Write `text` verbatim into a fresh directory under `root`.
    ///
    /// No validation happens here; the certificate manager on the bus is the
    /// one that parses the material.
    pub async fn acquire(root: &Path, text: &str) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;

        // tempdir_in creates the directory with mode 0700 and a random suffix
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)?;
        let file = dir.path().join(STAGED_FILE_NAME);

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut handle = options.open(&file).await?;
        handle.write_all(text.as_bytes()).await?;
        handle.flush().await?;

        debug!(path = %file.display(), "Staged certificate material");
        Ok(Self {
            dir: Some(dir),
            file,
        })
    }

    /// Path of the staged file, passed to the bus
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Directory holding the staged file
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }
}

impl Drop for StagedCertificate {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(path = %path.display(), "Removed staged certificate material"),
            Err(e) => error!(
                path = %path.display(),
                error = %e,
                "Failed to remove staged certificate material"
            ),
        }
    }
}
