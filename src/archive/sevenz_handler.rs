use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{NormalizerError, Result};

/// Run `<command> x <archive>` with `destination` as working directory.
///
/// A non-zero exit status or a command that cannot be spawned is an
/// `ExternalToolFailure`.
pub fn extract_7z(command: &str, path: &Path, destination: &Path) -> Result<()> {
    let archive = path.canonicalize()?;
    let command_line = format!("{} x {}", command, archive.display());
    debug!("Running {} in {}", command_line, destination.display());

    let output = Command::new(command)
        .arg("x")
        .arg(&archive)
        .current_dir(destination)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| NormalizerError::ExternalToolFailure {
            command: command_line.clone(),
            status: "spawn failure".to_string(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(NormalizerError::ExternalToolFailure {
            command: command_line,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}
