use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use super::{safe_destination, TarCompression};
use crate::error::{NormalizerError, Result};

fn open_tar(path: &Path, compression: TarCompression) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = match compression {
        TarCompression::None => Box::new(file),
        TarCompression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        TarCompression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
        TarCompression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
    };
    Ok(tar::Archive::new(reader))
}

/// Unpack a tar archive into `destination`.
///
/// Runs in two passes: the first walks every header and fails with
/// `PathTraversal` if an entry or link target resolves outside
/// `destination`; only then is the archive reopened and unpacked.
pub fn extract_tar(path: &Path, compression: TarCompression, destination: &Path) -> Result<()> {
    let mut archive = open_tar(path, compression)?;
    let mut entry_count = 0usize;

    for entry in archive.entries()? {
        let entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let target = safe_destination(destination, &entry_path)?;
        entry_count += 1;

        let entry_type = entry.header().entry_type();
        if let Some(link) = entry.link_name()? {
            let base = if entry_type.is_symlink() {
                target.parent().unwrap_or(destination).to_path_buf()
            } else {
                destination.to_path_buf()
            };
            let relative = base.strip_prefix(destination).unwrap_or(Path::new(""));
            safe_destination(destination, &relative.join(&link)).map_err(|_| {
                NormalizerError::PathTraversal {
                    entry: format!("{} -> {}", entry_path.display(), link.display()),
                }
            })?;
        }
    }

    debug!("Unpacking {} tar entries", entry_count);
    let mut archive = open_tar(path, compression)?;
    archive.set_preserve_permissions(false);
    archive.unpack(destination)?;
    Ok(())
}
