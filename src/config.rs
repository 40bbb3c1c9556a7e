//! Runtime configuration for the uploader.
//!
//! Values come from the environment (optionally seeded from a `.env` file)
//! and can be overridden field by field by the CLI.

use std::env;
use std::path::PathBuf;

use crate::error::{NormalizerError, Result};
use crate::filter::FilterMode;

const DEFAULT_MAX_VECTOR_FILE_SIZE: u64 = 50 * 1024 * 1024; // 50MB
const DEFAULT_SEVEN_ZIP_COMMAND: &str = "7z";

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Uploads larger than this many bytes are rejected
    pub max_file_size: u64,
    /// Parent directory for workspaces and output artifacts
    pub temp_root: PathBuf,
    /// Executable used for 7z archives
    pub seven_zip_command: String,
    pub filter_mode: FilterMode,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_VECTOR_FILE_SIZE,
            temp_root: env::temp_dir(),
            seven_zip_command: DEFAULT_SEVEN_ZIP_COMMAND.to_string(),
            filter_mode: FilterMode::default(),
        }
    }
}

impl UploadConfig {
    pub fn new(max_file_size: u64, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            max_file_size,
            temp_root: temp_root.into(),
            ..Self::default()
        }
    }

    /// Build configuration from `MAX_VECTOR_FILE_SIZE`, `AOI_TEMP_ROOT`,
    /// `SEVEN_ZIP_COMMAND` and `FILTERED_GEOMETRY_MODE`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(value) = env::var("MAX_VECTOR_FILE_SIZE") {
            config.max_file_size = value.trim().parse().map_err(|_| {
                NormalizerError::Config(format!("MAX_VECTOR_FILE_SIZE is not a number: {}", value))
            })?;
        }
        if let Ok(value) = env::var("AOI_TEMP_ROOT") {
            config.temp_root = PathBuf::from(value);
        }
        if let Ok(value) = env::var("SEVEN_ZIP_COMMAND") {
            config.seven_zip_command = value;
        }
        if let Ok(value) = env::var("FILTERED_GEOMETRY_MODE") {
            config.filter_mode = value.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(NormalizerError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }
        if self.seven_zip_command.trim().is_empty() {
            return Err(NormalizerError::Config(
                "seven_zip_command must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
