//! Format validators.
//!
//! Each single-file validator answers two questions: does this file look like
//! my format, and, if so, append its geometries to the shared output. The
//! shapefile validator works on a whole list of files, because a shapefile is
//! only usable together with its `.shx`, `.dbf` and `.prj` companions.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::filter::{FilterMode, GeometryTypeFilter};
use crate::geometry::{self, Datasource, Driver, Feature, OutputDatasource, OUTPUT_EPSG};
use crate::mime::{self, MimeSniffer};

/// Shared contract of the single-file validators
pub trait FormatValidator {
    fn name(&self) -> &'static str;

    /// Driver the format is opened with
    fn driver(&self) -> Driver;

    /// Sniffing never fails: anything unreadable is simply not a match
    fn matches(&self, file: &Path, sniffer: &dyn MimeSniffer) -> bool;

    /// Append `file`'s geometries to `output`, returning how many features
    /// were written
    fn append_geometry(
        &self,
        output: &mut OutputDatasource,
        file: &Path,
        filter: &GeometryTypeFilter,
        mode: FilterMode,
    ) -> Result<usize> {
        let datasource = open_with_fallback(self.driver(), file)?;
        append_datasource(output, datasource, filter, mode)
    }
}

/// Open with `driver`, falling back to content detection when the driver
/// produced a layer without features.
pub fn open_with_fallback(driver: Driver, file: &Path) -> Result<Datasource> {
    let datasource = driver.open(file)?;
    if datasource.has_empty_layer() {
        debug!(
            "{} driver found an empty layer in {}, retrying with auto-detection",
            driver.name(),
            file.display()
        );
        return geometry::open_auto(file);
    }
    Ok(datasource)
}

/// Copy every layer of `datasource` into the matching output layer
pub fn append_datasource(
    output: &mut OutputDatasource,
    datasource: Datasource,
    filter: &GeometryTypeFilter,
    mode: FilterMode,
) -> Result<usize> {
    let mut written = 0;
    for layer in datasource.layers {
        let out_layer = output.layer_mut_or_create(&layer.name, OUTPUT_EPSG)?;
        let mut rejected = 0;
        for feature in layer.features {
            let accepted = feature
                .geometry_type_name()
                .map_or(filter.is_empty(), |name| filter.accepts(name));
            if accepted {
                out_layer.features.push(feature);
                written += 1;
                continue;
            }
            rejected += 1;
            if mode == FilterMode::Placeholder {
                out_layer.features.push(Feature::default());
                written += 1;
            }
        }
        debug!(
            "Layer {}: {} features now, {} rejected by geometry filter",
            out_layer.name,
            out_layer.feature_count(),
            rejected
        );
    }
    Ok(written)
}

fn has_extension(file: &Path, extension: &str) -> bool {
    file.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn sniff_in(file: &Path, sniffer: &dyn MimeSniffer, accepted: &[&str]) -> bool {
    match sniffer.sniff(file) {
        Ok(mime_type) => accepted.contains(&mime_type.as_str()),
        Err(e) => {
            debug!("Could not sniff {}: {}", file.display(), e);
            false
        }
    }
}

/// KMZ: zip-compressed KML with a `.kmz` name, plus XML or plain-text
/// `.kml` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct KmzValidator;

impl FormatValidator for KmzValidator {
    fn name(&self) -> &'static str {
        "KMZ"
    }

    fn driver(&self) -> Driver {
        Driver::Kml
    }

    fn matches(&self, file: &Path, sniffer: &dyn MimeSniffer) -> bool {
        if has_extension(file, "kmz") {
            return sniff_in(file, sniffer, &[mime::APPLICATION_ZIP]);
        }
        has_extension(file, "kml")
            && sniff_in(file, sniffer, &[mime::APPLICATION_XML, mime::TEXT_PLAIN])
    }
}

/// KML: XML, plain-text or HTML-looking `.kml` files
#[derive(Debug, Default, Clone, Copy)]
pub struct KmlValidator;

impl FormatValidator for KmlValidator {
    fn name(&self) -> &'static str {
        "KML"
    }

    fn driver(&self) -> Driver {
        Driver::Kml
    }

    fn matches(&self, file: &Path, sniffer: &dyn MimeSniffer) -> bool {
        has_extension(file, "kml")
            && sniff_in(
                file,
                sniffer,
                &[mime::APPLICATION_XML, mime::TEXT_PLAIN, mime::TEXT_HTML],
            )
    }
}

/// GeoJSON: plain text holding a JSON object that the GeoJSON driver opens
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoJsonValidator;

impl FormatValidator for GeoJsonValidator {
    fn name(&self) -> &'static str {
        "GeoJSON"
    }

    fn driver(&self) -> Driver {
        Driver::GeoJson
    }

    fn matches(&self, file: &Path, sniffer: &dyn MimeSniffer) -> bool {
        if !sniff_in(file, sniffer, &[mime::TEXT_PLAIN]) {
            return false;
        }
        let parsed = fs::read_to_string(file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok());
        match parsed {
            Some(value) if value.is_object() => self.driver().open(file).is_ok(),
            _ => false,
        }
    }
}

/// Validators tried, in order, against every candidate file
pub fn single_file_validators() -> [&'static dyn FormatValidator; 3] {
    [&KmzValidator, &KmlValidator, &GeoJsonValidator]
}

/// Result of the shapefile pass
#[derive(Debug, Default)]
pub struct ShapefilePass {
    pub written: usize,
    /// Files no complete shapefile set claimed
    pub unmatched: Vec<PathBuf>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ShapeValidator;

impl ShapeValidator {
    pub const SHP_SET: [&'static str; 4] = ["dbf", "shp", "shx", "prj"];

    fn extensions<'a>(files: impl IntoIterator<Item = &'a PathBuf>) -> BTreeSet<String> {
        files
            .into_iter()
            .filter_map(|file| file.extension().and_then(|ext| ext.to_str()))
            .map(|ext| ext.to_lowercase())
            .collect()
    }

    /// True when the extensions of `files` cover `.dbf`, `.shp`, `.shx` and `.prj`
    pub fn matches_set(files: &[PathBuf]) -> bool {
        let extensions = Self::extensions(files);
        Self::SHP_SET.iter().all(|ext| extensions.contains(*ext))
    }

    pub fn shp_files(files: &[PathBuf]) -> Vec<PathBuf> {
        files
            .iter()
            .filter(|file| has_extension(file, "shp"))
            .cloned()
            .collect()
    }

    pub fn has_multiple_shapefiles(files: &[PathBuf]) -> bool {
        Self::shp_files(files).len() > 1
    }

    /// Group files by directory and stem, so `roads.shp` is only paired with
    /// `roads.dbf`, `roads.shx` and `roads.prj` next to it.
    fn group_by_stem(files: &[PathBuf]) -> BTreeMap<PathBuf, Vec<PathBuf>> {
        let mut groups: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        for file in files {
            groups
                .entry(file.with_extension(""))
                .or_default()
                .push(file.clone());
        }
        groups
    }

    /// Append every complete shapefile set found in `files`
    pub fn append_geometry_set(
        &self,
        output: &mut OutputDatasource,
        files: &[PathBuf],
        filter: &GeometryTypeFilter,
        mode: FilterMode,
    ) -> Result<ShapefilePass> {
        let mut pass = ShapefilePass::default();

        for (stem, group) in Self::group_by_stem(files) {
            if !Self::matches_set(&group) {
                pass.unmatched.extend(group);
                continue;
            }
            for shp in Self::shp_files(&group) {
                info!("Reading shapefile {}", shp.display());
                let datasource = open_with_fallback(Driver::EsriShapefile, &shp)?;
                pass.written += append_datasource(output, datasource, filter, mode)?;
            }
            debug!("Consumed shapefile set {}", stem.display());
        }

        Ok(pass)
    }
}

/// Files whose extension names a vector format we can read
pub fn vector_candidates(files: &[PathBuf]) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|file| {
            ["kml", "kmz", "geojson", "json", "shp"]
                .iter()
                .any(|ext| has_extension(file, ext))
        })
        .cloned()
        .collect()
}
