//! Where downloaded exports end up

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::DownloadedExport;

/// Receives a downloaded export and saves it for the user
pub trait DownloadSink: Send + Sync {
    /// Save the export, returning where it went
    fn save(&self, export: &DownloadedExport) -> std::io::Result<PathBuf>;
}

/// Saves exports into a directory under their server-given name
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn save(&self, export: &DownloadedExport) -> std::io::Result<PathBuf> {
        debug!(dir = %self.dir.display(), filename = %export.filename, "DirectorySink::save: called");
        fs::create_dir_all(&self.dir)?;
        // The name is already stripped of folders, keep only its final component anyway
        let name = Path::new(&export.filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "download".into());
        let path = self.dir.join(name);
        fs::write(&path, &export.bytes)?;
        info!(path = %path.display(), size = export.bytes.len(), "Saved download");
        Ok(path)
    }
}
