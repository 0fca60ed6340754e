//! Artifact stager: deterministic naming and unpacking of the downloaded archive.

use crate::error::ArtifactError;
use chrono::{Local, Timelike};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the isolated extraction folder inside the staging directory.
pub const EXTRACT_DIR: &str = "extracted_files";

/// File extension recognized as tabular data.
pub const TABULAR_EXTENSION: &str = "csv";

/// Moves downloaded archives into place and unpacks them.
#[derive(Debug, Clone)]
pub struct ArtifactStager {
    staging_dir: PathBuf,
    stem: String,
}

impl ArtifactStager {
    pub fn new(staging_dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            stem: stem.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Deterministic artifact path for the given hour of day.
    pub fn artifact_path(&self, hour: u32) -> PathBuf {
        self.staging_dir.join(format!("{}{hour:02}.zip", self.stem))
    }

    /// Move the download to its name for the current local hour.
    pub fn stage(&self, download_path: &Path) -> Result<PathBuf, ArtifactError> {
        self.stage_at(download_path, Local::now().hour())
    }

    /// Move the download to its name for `hour`, replacing any file already there.
    pub fn stage_at(&self, download_path: &Path, hour: u32) -> Result<PathBuf, ArtifactError> {
        let target = self.artifact_path(hour);
        if target == download_path {
            return Ok(target);
        }
        if target.exists() {
            std::fs::remove_file(&target).map_err(|e| ArtifactError::io(&target, e))?;
        }
        move_file(download_path, &target)?;
        info!(path = %target.display(), "artifact staged");
        Ok(target)
    }

    /// Extract the archive and list the tabular files it contained.
    ///
    /// Returns `None` when no tabular file was found; the extraction folder is
    /// already gone in that case. Otherwise the returned guard removes the
    /// folder when dropped.
    pub fn unpack(&self, artifact: &Path) -> Result<Option<Extraction>, ArtifactError> {
        let dir = self.staging_dir.join(EXTRACT_DIR);
        // A killed earlier run can leave its extraction behind.
        match std::fs::remove_dir_all(&dir) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::io(&dir, e));
            }
            _ => {}
        }
        std::fs::create_dir_all(&dir).map_err(|e| ArtifactError::io(&dir, e))?;
        // From here on the guard owns the folder, including on error paths.
        let mut extraction = Extraction {
            dir,
            files: Vec::new(),
        };

        let file = File::open(artifact).map_err(|e| ArtifactError::io(artifact, e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|source| ArtifactError::Archive {
                path: artifact.to_path_buf(),
                source,
            })?;
        archive
            .extract(&extraction.dir)
            .map_err(|source| ArtifactError::Archive {
                path: artifact.to_path_buf(),
                source,
            })?;
        debug!(entries = archive.len(), "archive extracted");

        extraction.files = list_tabular_files(&extraction.dir)?;
        if extraction.files.is_empty() {
            warn!(artifact = %artifact.display(), "no tabular files in artifact");
            return Ok(None);
        }

        info!(files = extraction.files.len(), "tabular files found");
        Ok(Some(extraction))
    }

    /// Remove the staging directory and everything in it.
    pub fn purge(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(&self.staging_dir) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Files extracted from one artifact. The folder is removed on drop.
#[derive(Debug)]
pub struct Extraction {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl Extraction {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for Extraction {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %self.dir.display(), "failed to remove extraction folder: {e}");
            }
        }
    }
}

fn list_tabular_files(dir: &Path) -> Result<Vec<PathBuf>, ArtifactError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ArtifactError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ArtifactError::io(dir, e))?.path();
        let tabular = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(TABULAR_EXTENSION));
        if tabular {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), ArtifactError> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(|e| ArtifactError::io(from, e))?;
    std::fs::remove_file(from).map_err(|e| ArtifactError::io(from, e))
}
