//! In-memory datasource model and format drivers.
//!
//! A [`Datasource`] is what a driver produces from a file on disk: named
//! layers of features, each feature holding an optional `geo` geometry and
//! a JSON attribute map. The merged result is written by
//! [`OutputDatasource`].

pub mod geojson_driver;
pub mod kml_driver;
pub mod output;
pub mod shapefile_driver;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use geo::Geometry;
use serde_json::{Map, Value};

use crate::error::{NormalizerError, Result};

pub use output::OutputDatasource;

/// EPSG code every output layer is created with
pub const OUTPUT_EPSG: u32 = 4326;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Option<Geometry<f64>>, properties: Map<String, Value>) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    pub fn geometry_type_name(&self) -> Option<&'static str> {
        self.geometry.as_ref().map(geometry_type_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    /// EPSG code, when known
    pub srs: Option<u32>,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(name: impl Into<String>, srs: Option<u32>) -> Self {
        Self {
            name: name.into(),
            srs,
            features: Vec::new(),
        }
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Datasource {
    pub driver: Driver,
    pub layers: Vec<Layer>,
}

impl Datasource {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn has_empty_layer(&self) -> bool {
        self.layers.iter().any(|layer| layer.features.is_empty())
    }
}

/// Format drivers, keyed by their OGR-style names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Kml,
    GeoJson,
    EsriShapefile,
}

impl Driver {
    pub fn name(&self) -> &'static str {
        match self {
            Driver::Kml => "KML",
            Driver::GeoJson => "GeoJson",
            Driver::EsriShapefile => "ESRI Shapefile",
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        [Driver::Kml, Driver::GeoJson, Driver::EsriShapefile]
            .into_iter()
            .find(|driver| driver.name().eq_ignore_ascii_case(name))
    }

    pub fn open(&self, path: &Path) -> Result<Datasource> {
        let layers = match self {
            Driver::Kml => kml_driver::read_layers(path)?,
            Driver::GeoJson => geojson_driver::read_layers(path)?,
            Driver::EsriShapefile => shapefile_driver::read_layers(path)?,
        };
        Ok(Datasource {
            driver: *self,
            layers,
        })
    }
}

/// Pick a driver from the file's leading bytes and open it with that
pub fn open_auto(path: &Path) -> Result<Datasource> {
    let driver = detect_driver(path)?.ok_or_else(|| {
        NormalizerError::source_read(path, "no driver recognizes this file")
    })?;
    driver.open(path)
}

fn detect_driver(path: &Path) -> Result<Option<Driver>> {
    let mut head = Vec::with_capacity(512);
    File::open(path)?.take(512).read_to_end(&mut head)?;

    match head.as_slice() {
        [0x50, 0x4B, 0x03, 0x04, ..] => return Ok(Some(Driver::Kml)),
        [0x00, 0x00, 0x27, 0x0A, ..] => return Ok(Some(Driver::EsriShapefile)),
        _ => {}
    }

    let text = String::from_utf8_lossy(&head);
    let driver = match text.trim_start_matches('\u{feff}').trim_start().chars().next() {
        Some('{') => Some(Driver::GeoJson),
        Some('<') => Some(Driver::Kml),
        _ => None,
    };
    Ok(driver)
}

pub(crate) fn layer_name_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer")
        .to_string()
}

/// OGR geometry type name
pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "POINT",
        Geometry::Line(_) | Geometry::LineString(_) => "LINESTRING",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "POLYGON",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
    }
}
