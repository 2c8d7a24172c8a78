use anyhow::Result;
use geo_types::Geometry;
use serde_json::{Map, Value};

pub mod geojson;
pub mod geojsonl;

pub use self::geojson::GeoJsonSink;
pub use self::geojsonl::GeoJsonlSink;

/// One output feature: the input's id and geometry plus computed properties.
#[derive(Clone, Debug, Default)]
pub struct FeatureRow {
    pub id: Option<String>,
    pub geometry: Option<Geometry<f64>>,
    pub properties: Map<String, Value>,
}

impl FeatureRow {
    pub fn into_geojson(self) -> ::geojson::Feature {
        ::geojson::Feature {
            bbox: None,
            geometry: self.geometry.as_ref().map(::geojson::Geometry::from),
            id: self.id.map(::geojson::feature::Id::String),
            properties: Some(self.properties),
            foreign_members: None,
        }
    }
}

pub trait DataSink: Send {
    fn add_feature(&mut self, row: FeatureRow) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}
