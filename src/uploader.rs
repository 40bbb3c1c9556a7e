//! Upload orchestration.
//!
//! One [`VectorFileUploader`] handles one uploaded file: classify it, obtain
//! candidate files (directly or from an archive), dispatch each candidate to
//! the first validator that claims it, hand the leftovers to the shapefile
//! pass and write the merged GeoJSON.
//!
//! Temporary state is held in guards. The archive workspace is removed when
//! the run ends, whatever the outcome; the output file is removed unless the
//! run completes. Errors reach the caller unchanged.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::archive::{ArchiveKind, ArchiveReader, Workspace};
use crate::config::UploadConfig;
use crate::error::{Result, ValidationError};
use crate::filter::GeometryTypeFilter;
use crate::geometry::OutputDatasource;
use crate::mime::{self, MagicSniffer, MimeSniffer};
use crate::validators::{self, ShapeValidator};

/// Media types accepted as a single vector file
pub const FILE_TYPES: [&str; 3] = [mime::APPLICATION_XML, mime::TEXT_PLAIN, mime::TEXT_HTML];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub feature_count: usize,
}

/// A completed run. The caller owns the file at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedOutput {
    pub path: PathBuf,
    pub layers: Vec<LayerSummary>,
    /// Names of candidate files no validator accepted
    pub unmatched: Vec<String>,
}

impl NormalizedOutput {
    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.feature_count).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadKind {
    VectorFile,
    Archive,
}

pub struct VectorFileUploader {
    file: PathBuf,
    mime_type: String,
    kind: UploadKind,
    config: UploadConfig,
    sniffer: Box<dyn MimeSniffer>,
}

impl VectorFileUploader {
    pub fn new(file: impl Into<PathBuf>, config: UploadConfig) -> Result<Self> {
        Self::with_sniffer(file, config, Box::new(MagicSniffer))
    }

    /// Classify the upload. Fails with a validation error when it is too
    /// large or of an unsupported type; nothing is written to disk here.
    pub fn with_sniffer(
        file: impl Into<PathBuf>,
        config: UploadConfig,
        sniffer: Box<dyn MimeSniffer>,
    ) -> Result<Self> {
        config.validate()?;
        let file = file.into();

        let size = fs::metadata(&file)?.len();
        if size > config.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: config.max_file_size,
            }
            .into());
        }

        let mime_type = sniffer.sniff(&file)?;
        let kind = if FILE_TYPES.contains(&mime_type.as_str()) {
            UploadKind::VectorFile
        } else if ArchiveKind::is_archive_mime(&mime_type) {
            UploadKind::Archive
        } else {
            return Err(ValidationError::UnsupportedFormat { mime_type }.into());
        };
        debug!("Classified {} as {} ({:?})", file.display(), mime_type, kind);

        Ok(Self {
            file,
            mime_type,
            kind,
            config,
            sniffer,
        })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn is_archive(&self) -> bool {
        self.kind == UploadKind::Archive
    }

    /// Run the upload through extraction, dispatch and the shapefile pass
    /// and write the merged GeoJSON. Archives are deleted once extracted.
    pub fn create_output_data_source(self, filter: &GeometryTypeFilter) -> Result<NormalizedOutput> {
        info!("=== Normalizing {} ===", self.file.display());

        let (files, workspace) = self.materialize_candidates()?;
        info!("Found {} candidate files", files.len());

        let mut output = PendingOutput::create(&self.config.temp_root)?;

        let mut leftovers = Vec::new();
        for file in &files {
            self.dispatch(&mut output.datasource, file, filter, &mut leftovers)?;
        }

        let mut unmatched = Vec::new();
        if !leftovers.is_empty() {
            info!("Running shapefile pass over {} files", leftovers.len());
            if ShapeValidator::has_multiple_shapefiles(&leftovers) {
                debug!("Upload contains more than one shapefile");
            }
            let pass = ShapeValidator.append_geometry_set(
                &mut output.datasource,
                &leftovers,
                filter,
                self.config.filter_mode,
            )?;
            unmatched = pass.unmatched;
        }
        for file in &unmatched {
            warn!("No validator accepted {}", file.display());
        }

        let result = output.commit(unmatched)?;
        if let Some(workspace) = workspace {
            workspace.close();
        }
        info!(
            "=== Wrote {} features in {} layers to {} ===",
            result.feature_count(),
            result.layers.len(),
            result.path.display()
        );
        Ok(result)
    }

    fn materialize_candidates(&self) -> Result<(Vec<PathBuf>, Option<Workspace>)> {
        match self.kind {
            UploadKind::VectorFile => Ok((vec![self.file.clone()], None)),
            UploadKind::Archive => {
                let reader = ArchiveReader::new(&self.file, self.sniffer.as_ref(), &self.config)?;
                let extracted = reader.extract()?;
                debug!(
                    "{} of the extracted files carry a vector extension",
                    validators::vector_candidates(&extracted.files).len()
                );
                Ok((extracted.files, Some(extracted.workspace)))
            }
        }
    }

    fn dispatch(
        &self,
        output: &mut OutputDatasource,
        file: &Path,
        filter: &GeometryTypeFilter,
        leftovers: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let matched = validators::single_file_validators()
            .into_iter()
            .find(|validator| validator.matches(file, self.sniffer.as_ref()));

        match matched {
            Some(validator) => {
                info!("Reading {} as {}", file.display(), validator.name());
                let written =
                    validator.append_geometry(output, file, filter, self.config.filter_mode)?;
                debug!("Appended {} features from {}", written, file.display());
            }
            None => leftovers.push(file.to_path_buf()),
        }
        Ok(())
    }
}

/// Output datasource backed by a temporary file that is deleted unless
/// committed
struct PendingOutput {
    file: NamedTempFile,
    datasource: OutputDatasource,
}

impl PendingOutput {
    fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let file = tempfile::Builder::new()
            .prefix("aoi-")
            .suffix(".geojson")
            .tempfile_in(root)?;
        let datasource = OutputDatasource::create(file.path())?;
        Ok(Self { file, datasource })
    }

    fn commit(self, unmatched: Vec<PathBuf>) -> Result<NormalizedOutput> {
        self.datasource.flush()?;
        let (_, path) = self.file.keep().map_err(|e| e.error)?;

        Ok(NormalizedOutput {
            path,
            layers: self
                .datasource
                .layers()
                .iter()
                .map(|layer| LayerSummary {
                    name: layer.name.clone(),
                    feature_count: layer.feature_count(),
                })
                .collect(),
            unmatched: unmatched
                .iter()
                .filter_map(|file| file.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .collect(),
        })
    }
}
