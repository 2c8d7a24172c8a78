use super::{DataSink, FeatureRow};
use anyhow::Result;
use geojson::GeoJson;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A single `FeatureCollection` document, streamed feature by feature.
pub struct GeoJsonSink {
    writer: BufWriter<File>,
    first_feature: bool,
}

impl GeoJsonSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{{")?;
        writeln!(writer, "  \"type\": \"FeatureCollection\",")?;
        writeln!(writer, "  \"features\": [")?;

        Ok(Self {
            writer,
            first_feature: true,
        })
    }
}

impl DataSink for GeoJsonSink {
    fn add_feature(&mut self, row: FeatureRow) -> Result<()> {
        if !self.first_feature {
            writeln!(self.writer, ",")?;
        }
        self.first_feature = false;

        let geojson = GeoJson::Feature(row.into_geojson());
        serde_json::to_writer(&mut self.writer, &geojson)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        writeln!(self.writer)?;
        writeln!(self.writer, "  ]")?;
        writeln!(self.writer, "}}")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Geometry, LineString, Point};
    use serde_json::{Map, Value, json};
    use tempfile::NamedTempFile;

    fn point_row(name: &str, lon: f64, lat: f64) -> FeatureRow {
        let mut properties = Map::new();
        properties.insert("text-name".to_string(), json!(name));
        FeatureRow {
            id: Some(name.to_lowercase()),
            geometry: Some(Geometry::Point(Point::new(lon, lat))),
            properties,
        }
    }

    fn read_collection(file: &NamedTempFile) -> Value {
        let content = std::fs::read_to_string(file.path()).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn creates_valid_geojson_structure() {
        let temp_file = NamedTempFile::with_suffix(".geojson").unwrap();
        let mut sink = GeoJsonSink::new(temp_file.path()).unwrap();

        sink.add_feature(point_row("Test", 0.0, 0.0)).unwrap();
        sink.finish().unwrap();

        let parsed = read_collection(&temp_file);
        assert_eq!(parsed["type"], "FeatureCollection");
        assert_eq!(parsed["features"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn writes_multiple_features_with_commas() {
        let temp_file = NamedTempFile::with_suffix(".geojson").unwrap();
        let mut sink = GeoJsonSink::new(temp_file.path()).unwrap();

        sink.add_feature(point_row("First", 0.0, 0.0)).unwrap();
        sink.add_feature(point_row("Second", 1.0, 1.0)).unwrap();
        sink.add_feature(point_row("Third", 2.0, 2.0)).unwrap();
        sink.finish().unwrap();

        let parsed = read_collection(&temp_file);
        assert_eq!(parsed["features"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn writes_empty_feature_collection() {
        let temp_file = NamedTempFile::with_suffix(".geojson").unwrap();
        let mut sink = GeoJsonSink::new(temp_file.path()).unwrap();
        sink.finish().unwrap();

        let parsed = read_collection(&temp_file);
        assert_eq!(parsed["type"], "FeatureCollection");
        assert!(parsed["features"].as_array().unwrap().is_empty());
    }

    #[test]
    fn keeps_id_geometry_and_properties() {
        let temp_file = NamedTempFile::with_suffix(".geojson").unwrap();
        let mut sink = GeoJsonSink::new(temp_file.path()).unwrap();

        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        let mut properties = Map::new();
        properties.insert("line-color".to_string(), json!("#ff0000"));
        properties.insert("line-dasharray".to_string(), json!([3.0, 4.0]));
        sink.add_feature(FeatureRow {
            id: Some("road-1".to_string()),
            geometry: Some(Geometry::LineString(line)),
            properties,
        })
        .unwrap();
        sink.finish().unwrap();

        let parsed = read_collection(&temp_file);
        let feature = &parsed["features"][0];
        assert_eq!(feature["id"], "road-1");
        assert_eq!(feature["geometry"]["type"], "LineString");
        assert_eq!(feature["properties"]["line-color"], "#ff0000");
        assert_eq!(feature["properties"]["line-dasharray"], json!([3.0, 4.0]));
    }
}
