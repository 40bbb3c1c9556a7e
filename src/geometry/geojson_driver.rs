use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo::Geometry;
use geojson::GeoJson;
use serde_json::Map;
use tracing::debug;

use super::{layer_name_for, Feature, Layer, OUTPUT_EPSG};
use crate::error::{NormalizerError, Result};

/// Load a GeoJSON file as a single layer named after the file stem
pub fn read_layers(path: &Path) -> Result<Vec<Layer>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let geojson = GeoJson::from_reader(reader)
        .map_err(|e| NormalizerError::source_read(path, e))?;

    let mut layer = Layer::new(layer_name_for(path), Some(OUTPUT_EPSG));
    let converted = match geojson {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .map(convert_feature)
            .collect::<geojson::Result<Vec<_>>>(),
        GeoJson::Feature(feature) => convert_feature(feature).map(|f| vec![f]),
        GeoJson::Geometry(geometry) => Geometry::<f64>::try_from(geometry.value)
            .map(|g| vec![Feature::new(Some(g), Map::new())]),
    };
    layer.features = converted.map_err(|e| NormalizerError::source_read(path, e))?;
    debug!(
        "Loaded {} features from {}",
        layer.feature_count(),
        path.display()
    );

    Ok(vec![layer])
}

fn convert_feature(feature: geojson::Feature) -> geojson::Result<Feature> {
    let geometry = match feature.geometry {
        Some(geometry) => Some(Geometry::<f64>::try_from(geometry.value)?),
        None => None,
    };
    Ok(Feature::new(geometry, feature.properties.unwrap_or_default()))
}
