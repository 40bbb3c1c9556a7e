use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use geojson::{Feature as GeoJsonFeature, FeatureCollection, Geometry as GeoJsonGeometry, JsonObject};
use serde_json::{json, Value};
use tracing::debug;

use super::{Feature, Layer};
use crate::error::{NormalizerError, Result};

/// File-backed GeoJSON datasource that accumulates layers in memory.
///
/// The file is created as soon as the datasource is, so it can always be
/// removed on rollback; [`flush`](Self::flush) writes the merged content.
#[derive(Debug)]
pub struct OutputDatasource {
    path: PathBuf,
    layers: Vec<Layer>,
}

impl OutputDatasource {
    pub fn create(path: &Path) -> Result<Self> {
        File::create(path)?;
        debug!("Created output datasource {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            layers: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(Layer::feature_count).sum()
    }

    /// Reuse the layer called `name` or append a new one with `epsg`
    pub fn layer_mut_or_create(&mut self, name: &str, epsg: u32) -> Result<&mut Layer> {
        match self.layers.iter().position(|layer| layer.name == name) {
            Some(index) => {
                let layer = &mut self.layers[index];
                if layer.srs != Some(epsg) {
                    return Err(NormalizerError::Output(format!(
                        "layer {} already exists with SRS {:?}, requested EPSG:{}",
                        name, layer.srs, epsg
                    )));
                }
                Ok(layer)
            }
            None => {
                debug!("Creating output layer {} (EPSG:{})", name, epsg);
                self.layers.push(Layer::new(name, Some(epsg)));
                let last = self.layers.len() - 1;
                Ok(&mut self.layers[last])
            }
        }
    }

    /// Write all layers as one FeatureCollection
    pub fn flush(&self) -> Result<()> {
        let features: Vec<GeoJsonFeature> = self
            .layers
            .iter()
            .flat_map(|layer| {
                layer
                    .features
                    .iter()
                    .map(move |feature| to_geojson_feature(feature, &layer.name))
            })
            .collect();

        let mut foreign_members = JsonObject::new();
        foreign_members.insert(
            "crs".to_string(),
            json!({
                "type": "name",
                "properties": {"name": "urn:ogc:def:crs:EPSG::4326"}
            }),
        );
        foreign_members.insert(
            "layers".to_string(),
            Value::Array(
                self.layers
                    .iter()
                    .map(|layer| Value::String(layer.name.clone()))
                    .collect(),
            ),
        );

        let feature_collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        };

        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(writer, &feature_collection)?;
        debug!(
            "Wrote {} features in {} layers to {}",
            self.feature_count(),
            self.layers.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn to_geojson_feature(feature: &Feature, layer: &str) -> GeoJsonFeature {
    let mut foreign_members = JsonObject::new();
    foreign_members.insert("layer".to_string(), Value::String(layer.to_string()));

    GeoJsonFeature {
        bbox: None,
        geometry: feature
            .geometry
            .as_ref()
            .map(|geometry| GeoJsonGeometry::new(geojson::Value::from(geometry))),
        id: None,
        properties: Some(feature.properties.clone()),
        foreign_members: Some(foreign_members),
    }
}
