use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Knobs shared by the filter and stylesheet parsers.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum nesting of rule blocks, parenthesised filters and function calls.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

/// YAML settings for the `style` command.
///
/// ```yaml
/// max_depth: 32
/// layer: roads
/// properties:
///   - key: line-width
///     type: number
///     default: 1
/// ```
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn parse_options(&self) -> ParseOptions {
        let mut options = ParseOptions::default();
        if let Some(max_depth) = self.max_depth {
            options.max_depth = max_depth;
        }
        options
    }
}

/// One style property to evaluate per feature, and the type to coerce it to.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PropertySpec {
    pub key: String,
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// `key` or `key:type`, as accepted on the command line.
impl FromStr for PropertySpec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (key, value_type) = match value.split_once(':') {
            Some((key, ty)) => (key, ty.parse()?),
            None => (value, ValueType::default()),
        };
        if key.is_empty() {
            return Err(format!("invalid property: {value}"));
        }
        Ok(PropertySpec {
            key: key.to_string(),
            value_type,
            default: None,
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// The evaluated value as-is
    #[default]
    Raw,
    String,
    Integer,
    Number,
    Boolean,
    Color,
    /// Whitespace or comma separated numbers, e.g. dash arrays
    Numbers,
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "raw" => Ok(ValueType::Raw),
            "string" => Ok(ValueType::String),
            "integer" | "int" => Ok(ValueType::Integer),
            "number" | "double" => Ok(ValueType::Number),
            "boolean" | "bool" => Ok(ValueType::Boolean),
            "color" | "colour" => Ok(ValueType::Color),
            "numbers" => Ok(ValueType::Numbers),
            _ => Err(format!("invalid property type: {value}")),
        }
    }
}
