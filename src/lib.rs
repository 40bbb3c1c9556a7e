use std::path::Path;

pub mod archive;
pub mod config;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod mime;
pub mod uploader;
pub mod validators;

pub use config::UploadConfig;
pub use error::{NormalizerError, Result, ValidationError};
pub use filter::{FilterMode, GeometryTypeFilter};
pub use uploader::{LayerSummary, NormalizedOutput, VectorFileUploader};

/// Normalize one uploaded file into a single GeoJSON file under
/// `config.temp_root`, keeping only the geometry types named in `types`
/// (all types when empty).
pub fn normalize_upload<S: AsRef<str>>(
    path: &Path,
    types: &[S],
    config: UploadConfig,
) -> Result<NormalizedOutput> {
    let filter = GeometryTypeFilter::new(types);
    VectorFileUploader::new(path, config)?.create_output_data_source(&filter)
}
