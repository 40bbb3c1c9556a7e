use std::fs;
use std::path::{Path, PathBuf};

use geo::Geometry;
use proj::{Proj, Transform};
use serde_json::{Map, Value};
use shapefile::dbase::FieldValue;
use shapefile::Shape;
use tracing::{debug, info};

use super::{layer_name_for, Feature, Layer, OUTPUT_EPSG};
use crate::error::{NormalizerError, Result};

/// Read a `.shp` with its `.shx`/`.dbf` companions into one layer.
///
/// dBASE attributes become feature properties. When the sibling `.prj`
/// describes anything other than geographic WGS 84 the geometries are
/// reprojected to EPSG:4326.
pub fn read_layers(path: &Path) -> Result<Vec<Layer>> {
    let mut reader =
        shapefile::Reader::from_path(path).map_err(|e| NormalizerError::source_read(path, e))?;
    let projection = reprojection_for(path)?;

    let mut layer = Layer::new(layer_name_for(path), Some(OUTPUT_EPSG));
    for shape_record in reader.iter_shapes_and_records() {
        let (shape, record) =
            shape_record.map_err(|e| NormalizerError::source_read(path, e))?;

        let mut geometry = match shape {
            Shape::NullShape => None,
            shape => Some(
                Geometry::<f64>::try_from(shape)
                    .map_err(|e| NormalizerError::source_read(path, format!("{:?}", e)))?,
            ),
        };
        if let (Some(geometry), Some(projection)) = (geometry.as_mut(), projection.as_ref()) {
            geometry
                .transform(projection)
                .map_err(|e| NormalizerError::source_read(path, e))?;
        }

        let properties: Map<String, Value> = record
            .into_iter()
            .map(|(name, value)| (name, field_value_to_json(value)))
            .collect();
        layer.features.push(Feature::new(geometry, properties));
    }
    debug!(
        "Loaded {} shapes from {}",
        layer.feature_count(),
        path.display()
    );

    Ok(vec![layer])
}

fn prj_path(path: &Path) -> Option<PathBuf> {
    ["prj", "PRJ"]
        .iter()
        .map(|ext| path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

fn reprojection_for(path: &Path) -> Result<Option<Proj>> {
    let Some(prj) = prj_path(path) else {
        return Ok(None);
    };
    let wkt = fs::read_to_string(&prj)?;
    if is_geographic_wgs84(&wkt) {
        return Ok(None);
    }

    info!("Reprojecting {} to EPSG:{}", path.display(), OUTPUT_EPSG);
    let projection = Proj::new_known_crs(wkt.trim(), &format!("EPSG:{}", OUTPUT_EPSG), None)
        .map_err(|e| NormalizerError::source_read(&prj, e))?;
    Ok(Some(projection))
}

/// True for an unprojected WGS 84 definition such as `GEOGCS["GCS_WGS_1984", ...]`
fn is_geographic_wgs84(wkt: &str) -> bool {
    let normalized: String = wkt
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '[')
        .collect();
    !normalized.contains("PROJCS")
        && normalized.starts_with("GEOGCS[")
        && (normalized.contains("WGS1984") || normalized.contains("WGS84"))
}

fn field_value_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(text) => text.map(Value::String).unwrap_or(Value::Null),
        FieldValue::Memo(text) => Value::String(text),
        FieldValue::Numeric(number) => number.map(Value::from).unwrap_or(Value::Null),
        FieldValue::Float(number) => number.map(|n| Value::from(n as f64)).unwrap_or(Value::Null),
        FieldValue::Double(number) => Value::from(number),
        FieldValue::Integer(number) => Value::from(number),
        FieldValue::Logical(flag) => flag.map(Value::Bool).unwrap_or(Value::Null),
        other => Value::String(format!("{:?}", other)),
    }
}
