//! Archive extraction.
//!
//! An [`ArchiveReader`] is built from an uploaded archive, checks that the
//! container is one we can open (zip, tar family, 7z) and allocates a fresh
//! [`Workspace`]. Extracting consumes the reader: every entry is written into
//! the workspace, the source archive is deleted, and the caller receives the
//! absolute paths of all extracted files together with the workspace guard.
//!
//! - `zip_handler`: ZIP containers
//! - `tar_handler`: plain, gzip, bzip2 and xz compressed tar
//! - `sevenz_handler`: 7z via the external `7z` command
//! - `workspace`: the temporary directory guard

pub mod sevenz_handler;
pub mod tar_handler;
pub mod workspace;
pub mod zip_handler;

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::config::UploadConfig;
use crate::error::{NormalizerError, Result, ValidationError};
use crate::mime::{self, MimeSniffer};

pub use workspace::Workspace;

/// Compression layered over a tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

/// Archive containers the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar(TarCompression),
    SevenZip,
}

impl ArchiveKind {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            mime::APPLICATION_ZIP => Some(ArchiveKind::Zip),
            mime::APPLICATION_TAR => Some(ArchiveKind::Tar(TarCompression::None)),
            mime::APPLICATION_GZIP => Some(ArchiveKind::Tar(TarCompression::Gzip)),
            mime::APPLICATION_BZIP2 => Some(ArchiveKind::Tar(TarCompression::Bzip2)),
            mime::APPLICATION_XZ => Some(ArchiveKind::Tar(TarCompression::Xz)),
            mime::APPLICATION_7Z => Some(ArchiveKind::SevenZip),
            _ => None,
        }
    }

    pub fn is_archive_mime(mime_type: &str) -> bool {
        Self::from_mime(mime_type).is_some()
    }
}

/// Files materialized from an archive plus the workspace that owns them
#[derive(Debug)]
pub struct ExtractedArchive {
    pub files: Vec<PathBuf>,
    pub workspace: Workspace,
}

pub struct ArchiveReader {
    file: PathBuf,
    kind: ArchiveKind,
    workspace: Workspace,
    seven_zip_command: String,
}

impl ArchiveReader {
    /// Sniff the archive and allocate its workspace under `config.temp_root`
    pub fn new(file: &Path, sniffer: &dyn MimeSniffer, config: &UploadConfig) -> Result<Self> {
        let mime_type = sniffer.sniff(file)?;
        let kind = ArchiveKind::from_mime(&mime_type)
            .ok_or(ValidationError::UnsupportedFormat { mime_type })?;
        let workspace = Workspace::create(&config.temp_root)?;

        Ok(Self {
            file: file.to_path_buf(),
            kind,
            workspace,
            seven_zip_command: config.seven_zip_command.clone(),
        })
    }

    /// Extract every entry, delete the source archive and list the results.
    ///
    /// The archive path must not be reused afterwards.
    pub fn extract(self) -> Result<ExtractedArchive> {
        let destination = self.workspace.path();
        info!(
            "Extracting {:?} archive {} into {}",
            self.kind,
            self.file.display(),
            destination.display()
        );

        match self.kind {
            ArchiveKind::Zip => zip_handler::extract_zip(&self.file, destination)?,
            ArchiveKind::Tar(compression) => {
                tar_handler::extract_tar(&self.file, compression, destination)?
            }
            ArchiveKind::SevenZip => {
                sevenz_handler::extract_7z(&self.seven_zip_command, &self.file, destination)?
            }
        }

        fs::remove_file(&self.file)?;
        let files = self.workspace.files()?;
        info!("Extracted {} files", files.len());

        Ok(ExtractedArchive {
            files,
            workspace: self.workspace,
        })
    }
}

/// Resolve where an entry would land, failing if that is outside `root`.
///
/// Resolution is lexical: `..` pops a component and absolute entry names
/// replace the root, so both escape the check.
pub(crate) fn safe_destination(root: &Path, entry: &Path) -> Result<PathBuf> {
    let mut resolved = PathBuf::new();
    for component in root.join(entry).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                resolved.push(component.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
        }
    }

    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(NormalizerError::PathTraversal {
            entry: entry.display().to_string(),
        })
    }
}
