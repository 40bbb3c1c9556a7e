use std::fs::File;
use std::path::Path;

use tracing::debug;

use super::safe_destination;
use crate::error::{NormalizerError, Result};

/// Unpack every entry of a ZIP archive into `destination`.
///
/// All entry names are checked before anything is written.
pub fn extract_zip(path: &Path, destination: &Path) -> Result<()> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.enclosed_name().is_none() {
            return Err(NormalizerError::PathTraversal {
                entry: entry.name().to_string(),
            });
        }
        safe_destination(destination, Path::new(entry.name()))?;
    }

    debug!("Unpacking {} zip entries", archive.len());
    archive.extract(destination)?;
    Ok(())
}
