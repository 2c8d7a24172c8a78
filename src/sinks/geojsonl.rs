use super::{DataSink, FeatureRow};
use anyhow::Result;
use geojson::GeoJson;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Newline-delimited features, one `Feature` object per line.
pub struct GeoJsonlSink {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl GeoJsonlSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(Box::new(file)),
        })
    }

    pub fn stdout() -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(Box::new(std::io::stdout())),
        })
    }
}

impl DataSink for GeoJsonlSink {
    fn add_feature(&mut self, row: FeatureRow) -> Result<()> {
        let geojson = GeoJson::Feature(row.into_geojson());
        serde_json::to_writer(&mut self.writer, &geojson)?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Geometry, Point};
    use serde_json::{Map, Value, json};
    use tempfile::NamedTempFile;

    fn styled_row(id: &str, width: i64) -> FeatureRow {
        let mut properties = Map::new();
        properties.insert("line-width".to_string(), json!(width));
        FeatureRow {
            id: Some(id.to_string()),
            geometry: Some(Geometry::Point(Point::new(1.0, 2.0))),
            properties,
        }
    }

    #[test]
    fn writes_one_feature_per_line() {
        let temp_file = NamedTempFile::with_suffix(".geojsonl").unwrap();
        let mut sink = GeoJsonlSink::new(temp_file.path()).unwrap();

        sink.add_feature(styled_row("a", 1)).unwrap();
        sink.add_feature(styled_row("b", 3)).unwrap();
        sink.finish().unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "Feature");
        assert_eq!(second["id"], "b");
        assert_eq!(second["properties"]["line-width"], 3);
        assert_eq!(second["geometry"]["type"], "Point");
    }

    #[test]
    fn writes_null_geometry_when_missing() {
        let temp_file = NamedTempFile::with_suffix(".geojsonl").unwrap();
        let mut sink = GeoJsonlSink::new(temp_file.path()).unwrap();

        sink.add_feature(FeatureRow::default()).unwrap();
        sink.finish().unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let parsed: Value = serde_json::from_str(content.trim()).unwrap();
        assert!(parsed["geometry"].is_null());
        assert!(parsed.get("id").is_none_or(Value::is_null));
    }
}
