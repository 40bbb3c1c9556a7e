use std::fs::File;
use std::io::Read;
use std::path::Path;

use geo::{Geometry, GeometryCollection};
use kml::{Kml, KmlReader};
use serde_json::Map;
use tracing::debug;

use super::{layer_name_for, Feature, Layer, OUTPUT_EPSG};
use crate::error::{NormalizerError, Result};

/// Read a KML document, or a KMZ (zip-compressed KML) when the file starts
/// with a zip signature. Every geometry becomes one feature in a single
/// layer named after the file stem.
pub fn read_layers(path: &Path) -> Result<Vec<Layer>> {
    let document = read_document(path)?;
    let collection = GeometryCollection::<f64>::try_from(document)
        .map_err(|e| NormalizerError::source_read(path, e))?;

    let mut layer = Layer::new(layer_name_for(path), Some(OUTPUT_EPSG));
    layer.features = collection
        .into_iter()
        .map(|geometry: Geometry<f64>| Feature::new(Some(geometry), Map::new()))
        .collect();
    debug!(
        "Loaded {} placemark geometries from {}",
        layer.feature_count(),
        path.display()
    );

    Ok(vec![layer])
}

fn read_document(path: &Path) -> Result<Kml<f64>> {
    let document = if is_zip(path)? {
        KmlReader::<_, f64>::from_kmz_path(path).and_then(|mut reader| reader.read())
    } else {
        KmlReader::<_, f64>::from_path(path).and_then(|mut reader| reader.read())
    };
    document.map_err(|e| NormalizerError::source_read(path, e))
}

fn is_zip(path: &Path) -> Result<bool> {
    let mut magic = Vec::with_capacity(4);
    File::open(path)?.take(4).read_to_end(&mut magic)?;
    Ok(magic == [0x50, 0x4B, 0x03, 0x04])
}
