//! The feature abstraction filters and style rules are evaluated against.

use std::collections::BTreeMap;

use geo_types::Geometry;

use crate::cql::PropertyPath;
use crate::value::Value;

/// Read-only view of a map feature.
pub trait Feature {
    /// Attribute value by name. `None` when the attribute is absent.
    fn get(&self, name: &str) -> Option<Value>;

    /// Default geometry, if any.
    fn geometry(&self) -> Option<&Geometry<f64>>;

    fn id(&self) -> Option<&str> {
        None
    }
}

/// Resolve a dotted path against a feature.
///
/// Never fails: a missing feature, attribute or nested key yields `Value::Null`.
pub fn resolve(feature: Option<&dyn Feature>, path: &PropertyPath) -> Value {
    let Some(feature) = feature else {
        return Value::Null;
    };
    let mut segments = path.segments().iter();
    let Some(first) = segments.next() else {
        return Value::Null;
    };

    let mut current = feature.get(first).unwrap_or(Value::Null);
    for segment in segments {
        current = match current {
            Value::Map(mut map) => map.remove(segment).unwrap_or(Value::Null),
            Value::List(mut items) => match segment.parse::<usize>() {
                Ok(i) if i < items.len() => items.swap_remove(i),
                _ => Value::Null,
            },
            _ => Value::Null,
        };
    }
    current
}

/// Attribute map plus optional geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct MapFeature {
    id: Option<String>,
    attributes: BTreeMap<String, Value>,
    geometry: Option<Geometry<f64>>,
    geometry_name: String,
}

impl Default for MapFeature {
    fn default() -> Self {
        MapFeature {
            id: None,
            attributes: BTreeMap::new(),
            geometry: None,
            geometry_name: "geometry".to_string(),
        }
    }
}

impl MapFeature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Name under which `get` exposes the geometry. Defaults to `geometry`.
    pub fn with_geometry_name(mut self, name: impl Into<String>) -> Self {
        self.geometry_name = name.into();
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Convert a GeoJSON feature. Properties become attributes.
    pub fn from_geojson(feature: geojson::Feature) -> Result<Self, geojson::Error> {
        let id = feature.id.map(|id| match id {
            geojson::feature::Id::String(s) => s,
            geojson::feature::Id::Number(n) => n.to_string(),
        });
        let geometry = feature
            .geometry
            .map(Geometry::<f64>::try_from)
            .transpose()?;
        let attributes = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();

        Ok(MapFeature {
            id,
            attributes,
            geometry,
            ..Default::default()
        })
    }
}

impl Feature for MapFeature {
    fn get(&self, name: &str) -> Option<Value> {
        if name == self.geometry_name {
            if let Some(geometry) = &self.geometry {
                return Some(Value::Geometry(geometry.clone()));
            }
        }
        self.attributes.get(name).cloned()
    }

    fn geometry(&self) -> Option<&Geometry<f64>> {
        self.geometry.as_ref()
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    #[test]
    fn test_resolve_simple_and_missing() {
        let f = MapFeature::new().with_attribute("foo", 3);
        assert_eq!(resolve(Some(&f), &PropertyPath::from("foo")), Value::Int(3));
        assert_eq!(resolve(Some(&f), &PropertyPath::from("bar")), Value::Null);
        assert_eq!(resolve(None, &PropertyPath::from("foo")), Value::Null);
    }

    #[test]
    fn test_resolve_nested() {
        let mut address = BTreeMap::new();
        address.insert("city".to_string(), Value::from("Oslo"));
        let f = MapFeature::new()
            .with_attribute("address", Value::Map(address))
            .with_attribute("tags", Value::List(vec!["a".into(), "b".into()]));

        assert_eq!(
            resolve(Some(&f), &PropertyPath::from("address.city")),
            Value::from("Oslo")
        );
        assert_eq!(resolve(Some(&f), &PropertyPath::from("tags.1")), Value::from("b"));
        assert_eq!(resolve(Some(&f), &PropertyPath::from("tags.9")), Value::Null);
        assert_eq!(
            resolve(Some(&f), &PropertyPath::from("address.city.x")),
            Value::Null
        );
    }

    #[test]
    fn test_geometry_by_name() {
        let f = MapFeature::new().with_geometry(Point::new(1.0, 2.0).into());
        assert!(matches!(f.get("geometry"), Some(Value::Geometry(_))));
        assert!(f.geometry().is_some());
    }

    #[test]
    fn test_from_geojson() {
        let json = r#"{
            "type": "Feature",
            "id": 7,
            "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
            "properties": {"name": "a", "pop": 12}
        }"#;
        let gj: geojson::Feature = json.parse().unwrap();
        let f = MapFeature::from_geojson(gj).unwrap();
        assert_eq!(f.id(), Some("7"));
        assert_eq!(f.get("pop"), Some(Value::Int(12)));
        assert_eq!(
            f.geometry(),
            Some(&Geometry::Point(Point::new(1.0, 2.0)))
        );
    }
}
