use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::Result;

/// Uniquely named temporary directory owning everything extracted into it.
///
/// Dropping the workspace removes the directory recursively, on success and
/// on every error path. [`close`](Self::close) does the same but logs a
/// removal failure.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh `aoi-*` directory under `root`
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix("aoi-").tempdir_in(root)?;
        let path = dir.path().canonicalize()?;
        debug!("Created workspace {}", path.display());
        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute paths of every regular file below the workspace
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_files(&self.path, &mut files)?;
        files.sort();
        Ok(files)
    }

    pub fn close(self) {
        let path = self.path;
        match self.dir.close() {
            Ok(()) => debug!("Removed workspace {}", path.display()),
            Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
        }
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), files)?;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(())
}
