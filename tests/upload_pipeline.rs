use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use geojson::{FeatureCollection, GeoJson};
use vector_normalizer::{
    FilterMode, GeometryTypeFilter, NormalizerError, UploadConfig, VectorFileUploader,
};

const THREE_POINTS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"id": 1}, "geometry": {"type": "Point", "coordinates": [10.75, 59.91]}},
    {"type": "Feature", "properties": {"id": 2}, "geometry": {"type": "Point", "coordinates": [5.32, 60.39]}},
    {"type": "Feature", "properties": {"id": 3}, "geometry": {"type": "Point", "coordinates": [10.39, 63.43]}}
  ]
}"#;

const MIXED: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [0, 0]}},
    {"type": "Feature", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}},
    {"type": "Feature", "properties": {"kind": "field"}, "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}},
    {"type": "Feature", "properties": {"kind": "lake"}, "geometry": {"type": "Polygon", "coordinates": [[[2, 2], [3, 2], [3, 3], [2, 2]]]}}
  ]
}"#;

const TWO_POLYGONS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
      <Polygon><outerBoundaryIs><LinearRing>
        <coordinates>0,0 1,0 1,1 0,0</coordinates>
      </LinearRing></outerBoundaryIs></Polygon>
    </Placemark>
    <Placemark>
      <Polygon><outerBoundaryIs><LinearRing>
        <coordinates>2,2 3,2 3,3 2,2</coordinates>
      </LinearRing></outerBoundaryIs></Polygon>
    </Placemark>
  </Document>
</kml>"#;

const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

const BROKEN_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml><Placemark><Point><coordinates>east,north</coordinates></Point></Placemark></kml>"#;

struct Fixture {
    _dir: tempfile::TempDir,
    uploads: PathBuf,
    temp_root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        let temp_root = dir.path().join("aoi");
        fs::create_dir_all(&uploads).unwrap();
        fs::create_dir_all(&temp_root).unwrap();
        Self {
            _dir: dir,
            uploads,
            temp_root,
        }
    }

    fn config(&self) -> UploadConfig {
        UploadConfig::new(10 * 1024 * 1024, &self.temp_root)
    }

    fn upload(&self, name: &str, content: &str) -> PathBuf {
        let path = self.uploads.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn zip(&self, name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let entries: Vec<(String, Vec<u8>)> = entries
            .iter()
            .map(|(entry, content)| (entry.to_string(), content.as_bytes().to_vec()))
            .collect();
        let path = self.uploads.join(name);
        fs::write(&path, zip_bytes(&entries)).unwrap();
        path
    }

    /// Everything left under the temp root
    fn leftovers(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.temp_root)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

fn read_output(path: &Path) -> FeatureCollection {
    match fs::read_to_string(path).unwrap().parse::<GeoJson>().unwrap() {
        GeoJson::FeatureCollection(fc) => fc,
        other => panic!("expected FeatureCollection, got {:?}", other),
    }
}

fn zip_bytes(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (entry, content) in entries {
        writer
            .start_file(entry.as_str(), zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Write `roads.{shp,shx,dbf}` with two named points plus a WGS 84 `.prj`
/// and return every file as a zip entry
fn roads_shapefile_entries(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let shp = dir.join("roads.shp");
    let table = shapefile::dbase::TableWriterBuilder::new()
        .add_character_field("name".try_into().unwrap(), 20);
    let mut writer = shapefile::Writer::from_path(&shp, table).unwrap();
    for (name, x, y) in [("E6", 10.75, 59.91), ("E39", 5.32, 60.39)] {
        let mut record = shapefile::dbase::Record::default();
        record.insert(
            "name".to_string(),
            shapefile::dbase::FieldValue::Character(Some(name.to_string())),
        );
        writer
            .write_shape_and_record(&shapefile::Point::new(x, y), &record)
            .unwrap();
    }
    drop(writer);
    fs::write(shp.with_extension("prj"), WGS84_PRJ).unwrap();

    ["shp", "shx", "dbf", "prj"]
        .iter()
        .map(|ext| {
            (
                format!("roads.{}", ext),
                fs::read(shp.with_extension(ext)).unwrap(),
            )
        })
        .collect()
}

fn append_tar_file<W: Write>(builder: &mut tar::Builder<W>, name: &str, content: &str) {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, name, content.as_bytes())
        .unwrap();
}

#[test]
fn zip_with_geojson_and_kml_is_merged() {
    let fixture = Fixture::new();
    let archive = fixture.zip(
        "upload.zip",
        &[("a.geojson", THREE_POINTS), ("b.kml", TWO_POLYGONS)],
    );

    let uploader = VectorFileUploader::new(&archive, fixture.config()).unwrap();
    assert!(uploader.is_archive());
    let output = uploader
        .create_output_data_source(&GeometryTypeFilter::accept_all())
        .unwrap();

    assert_eq!(output.layers.len(), 2);
    assert_eq!(output.feature_count(), 5);
    assert_eq!(output.layers[0].name, "a");
    assert_eq!(output.layers[0].feature_count, 3);
    assert_eq!(output.layers[1].name, "b");
    assert_eq!(output.layers[1].feature_count, 2);
    assert!(output.unmatched.is_empty());

    let fc = read_output(&output.path);
    assert_eq!(fc.features.len(), 5);
    assert_eq!(
        fc.foreign_members.unwrap()["layers"],
        serde_json::json!(["a", "b"])
    );

    assert!(!archive.exists());
    // only the output file remains; the workspace is gone
    assert_eq!(fixture.leftovers(), vec![output.path.clone()]);
}

#[test]
fn single_geojson_keeps_every_feature() {
    let fixture = Fixture::new();
    let file = fixture.upload("points.geojson", THREE_POINTS);

    let output = VectorFileUploader::new(&file, fixture.config())
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::accept_all())
        .unwrap();

    assert_eq!(output.feature_count(), 3);
    let fc = read_output(&output.path);
    assert_eq!(fc.features[0].properties.as_ref().unwrap()["id"], 1);
    // plain uploads belong to the caller and are left alone
    assert!(file.exists());
}

#[test]
fn single_kml_file() {
    let fixture = Fixture::new();
    let file = fixture.upload("parcels.kml", TWO_POLYGONS);

    let output = VectorFileUploader::new(&file, fixture.config())
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::accept_all())
        .unwrap();

    assert_eq!(output.layers.len(), 1);
    assert_eq!(output.layers[0].name, "parcels");
    assert_eq!(output.feature_count(), 2);
}

#[test]
fn polygon_filter_writes_placeholders_by_default() {
    let fixture = Fixture::new();
    let file = fixture.upload("mixed.geojson", MIXED);

    let output = VectorFileUploader::new(&file, fixture.config())
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::new(["POLYGON"]))
        .unwrap();

    let fc = read_output(&output.path);
    assert_eq!(fc.features.len(), 4);
    let polygons: Vec<_> = fc
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .collect();
    assert_eq!(polygons.len(), 2);
    assert!(polygons
        .iter()
        .all(|g| matches!(g.value, geojson::Value::Polygon(_))));
    let placeholders = fc.features.iter().filter(|f| f.geometry.is_none()).count();
    assert_eq!(placeholders, 2);
}

#[test]
fn polygon_filter_can_skip_rejected_features() {
    let fixture = Fixture::new();
    let file = fixture.upload("mixed.geojson", MIXED);
    let mut config = fixture.config();
    config.filter_mode = FilterMode::Skip;

    let output = VectorFileUploader::new(&file, config)
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::new(["polygon"]))
        .unwrap();

    let fc = read_output(&output.path);
    assert_eq!(fc.features.len(), 2);
    assert!(fc.features.iter().all(|f| f.geometry.is_some()));
}

#[test]
fn shapefile_set_and_kmz_in_zip() {
    let fixture = Fixture::new();
    let scratch = tempfile::tempdir().unwrap();
    let mut entries = roads_shapefile_entries(scratch.path());
    entries.push((
        "pins.kmz".to_string(),
        zip_bytes(&[("doc.kml".to_string(), TWO_POLYGONS.as_bytes().to_vec())]),
    ));
    let archive = fixture.uploads.join("upload.zip");
    fs::write(&archive, zip_bytes(&entries)).unwrap();

    let output = VectorFileUploader::new(&archive, fixture.config())
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::accept_all())
        .unwrap();

    let layers: Vec<_> = output
        .layers
        .iter()
        .map(|layer| (layer.name.as_str(), layer.feature_count))
        .collect();
    assert_eq!(layers, vec![("pins", 2), ("roads", 2)]);
    assert_eq!(output.feature_count(), 4);
    assert!(output.unmatched.is_empty());

    let fc = read_output(&output.path);
    let road_names: Vec<_> = fc
        .features
        .iter()
        .filter(|f| f.foreign_members.as_ref().unwrap()["layer"] == "roads")
        .map(|f| f.properties.as_ref().unwrap()["name"].clone())
        .collect();
    assert_eq!(road_names, vec![serde_json::json!("E6"), serde_json::json!("E39")]);
    assert_eq!(fixture.leftovers(), vec![output.path.clone()]);
}

#[test]
fn tar_bz2_archive_is_extracted() {
    let fixture = Fixture::new();
    let archive = fixture.uploads.join("upload.tar.bz2");
    let encoder = bzip2::write::BzEncoder::new(
        File::create(&archive).unwrap(),
        bzip2::Compression::default(),
    );
    let mut builder = tar::Builder::new(encoder);
    append_tar_file(&mut builder, "data/points.geojson", THREE_POINTS);
    builder.into_inner().unwrap().finish().unwrap();

    let output = VectorFileUploader::new(&archive, fixture.config())
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::accept_all())
        .unwrap();

    assert_eq!(output.feature_count(), 3);
    assert!(!archive.exists());
    assert_eq!(fixture.leftovers(), vec![output.path]);
}

#[test]
fn tar_path_traversal_fails_closed() {
    let fixture = Fixture::new();
    let archive = fixture.uploads.join("evil.tar.gz");
    let encoder = flate2::write::GzEncoder::new(
        File::create(&archive).unwrap(),
        flate2::Compression::default(),
    );
    let mut builder = tar::Builder::new(encoder);
    append_tar_file(&mut builder, "fine.geojson", THREE_POINTS);
    let mut header = tar::Header::new_gnu();
    let name = b"../../etc/evil";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(4);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, &b"evil"[..]).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let err = VectorFileUploader::new(&archive, fixture.config())
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::accept_all())
        .unwrap_err();

    assert!(matches!(err, NormalizerError::PathTraversal { .. }));
    assert!(fixture.leftovers().is_empty());
    assert!(!fixture.temp_root.join("../../etc/evil").exists());
}

#[test]
fn unreadable_source_rolls_back_everything() {
    let fixture = Fixture::new();
    let archive = fixture.zip(
        "upload.zip",
        &[("a.geojson", THREE_POINTS), ("broken.kml", BROKEN_KML)],
    );

    let err = VectorFileUploader::new(&archive, fixture.config())
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::accept_all())
        .unwrap_err();

    match err {
        NormalizerError::SourceRead { path, .. } => {
            assert_eq!(path.file_name().unwrap(), "broken.kml")
        }
        other => panic!("unexpected error: {}", other),
    }
    // neither the workspace nor the partial output survive
    assert!(fixture.leftovers().is_empty());
}

#[test]
fn incomplete_shapefile_set_is_reported_unmatched() {
    let fixture = Fixture::new();
    let archive = fixture.zip(
        "roads.zip",
        &[
            ("roads.shp", "not really a shapefile"),
            ("roads.shx", "index"),
            ("roads.prj", "GEOGCS[\"WGS 84\"]"),
            ("b.kml", TWO_POLYGONS),
        ],
    );

    let output = VectorFileUploader::new(&archive, fixture.config())
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::accept_all())
        .unwrap();

    assert_eq!(output.feature_count(), 2);
    let mut unmatched = output.unmatched.clone();
    unmatched.sort();
    assert_eq!(unmatched, vec!["roads.prj", "roads.shp", "roads.shx"]);
}

#[test]
fn failing_seven_zip_command_is_reported() {
    let fixture = Fixture::new();
    let archive = fixture.uploads.join("upload.7z");
    fs::write(&archive, [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04]).unwrap();
    let mut config = fixture.config();
    config.seven_zip_command = "definitely-not-a-7z-binary".to_string();

    let err = VectorFileUploader::new(&archive, config)
        .unwrap()
        .create_output_data_source(&GeometryTypeFilter::accept_all())
        .unwrap_err();

    assert!(matches!(err, NormalizerError::ExternalToolFailure { .. }));
    assert!(fixture.leftovers().is_empty());
    assert!(archive.exists());
}

#[test]
fn oversized_upload_creates_no_state() {
    let fixture = Fixture::new();
    let file = fixture.upload("points.geojson", THREE_POINTS);

    let err = VectorFileUploader::new(&file, UploadConfig::new(16, &fixture.temp_root))
        .err()
        .unwrap();

    assert!(err.is_validation());
    assert!(fixture.leftovers().is_empty());
}
