use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use geojson::GeoJson;
use indexmap::IndexSet;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use carto::config::{PropertySpec, Settings, ValueType};
use carto::{
    EvaluationError, Evaluator, Feature, FlatRule, MapFeature, ParseOptions, Rgb, Value,
    parse_filter_with, parse_stylesheet_with, referenced_properties, select,
};

use crate::sinks::{DataSink, FeatureRow, GeoJsonSink, GeoJsonlSink};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Number of threads (default: all cores)
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse a stylesheet and print its flattened rules
    Check(CheckArgs),
    /// Write the input features matching a CQL filter
    Query(QueryArgs),
    /// Evaluate style properties for every feature of a layer
    Style(StyleArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    /// Stylesheet (.mss)
    pub stylesheet: PathBuf,

    /// Settings file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Input GeoJSON or GeoJSONL file
    #[arg(short, long)]
    pub input: PathBuf,

    /// CQL filter text
    #[arg(short, long)]
    pub filter: String,

    /// Output file (.geojson, .geojsonl), or - for stdout
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Output format (auto-detected if omitted)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Settings file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct StyleArgs {
    /// Input GeoJSON or GeoJSONL file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Stylesheet (.mss)
    #[arg(short, long)]
    pub stylesheet: PathBuf,

    /// Layer name or id to select rules for
    #[arg(short, long)]
    pub layer: Option<String>,

    /// Settings file (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Property to evaluate, as key or key:type (repeatable)
    #[arg(short, long = "property")]
    pub properties: Vec<PropertySpec>,

    /// Output file (.geojson, .geojsonl), or - for stdout
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Output format (auto-detected if omitted)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum OutputFormat {
    #[value(name = "geojson")]
    GeoJson,
    #[value(name = "geojsonl", alias = "jsonl")]
    GeoJsonl,
}

pub fn output_format_label(format: &OutputFormat) -> &'static str {
    match format {
        OutputFormat::GeoJson => "geojson",
        OutputFormat::GeoJsonl => "geojsonl",
    }
}

/// Explicit format, else the output extension. Stdout defaults to geojsonl.
pub fn resolve_format(format: Option<OutputFormat>, output: &Path) -> Result<OutputFormat> {
    if let Some(format) = format {
        return Ok(format);
    }
    if output == Path::new("-") {
        return Ok(OutputFormat::GeoJsonl);
    }
    output
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| match ext.to_lowercase().as_str() {
            "geojson" => Some(OutputFormat::GeoJson),
            "geojsonl" | "jsonl" | "json" => Some(OutputFormat::GeoJsonl),
            _ => None,
        })
        .context("CLI: Could not detect output format from extension; use --format")
}

pub fn init_sink(format: &OutputFormat, output: &Path) -> Result<Box<dyn DataSink + Send>> {
    match format {
        OutputFormat::GeoJson => {
            if output == Path::new("-") {
                anyhow::bail!(
                    "CLI: GeoJSON output to stdout is not supported; use geojsonl instead"
                );
            }
            tracing::info!("Sink: {} -> {:?}", output_format_label(format), output);
            Ok(Box::new(GeoJsonSink::new(output)?))
        }
        OutputFormat::GeoJsonl => {
            if output == Path::new("-") {
                tracing::info!("Sink: {} -> stdout", output_format_label(format));
                Ok(Box::new(GeoJsonlSink::stdout()?))
            } else {
                tracing::info!("Sink: {} -> {:?}", output_format_label(format), output);
                Ok(Box::new(GeoJsonlSink::new(output)?))
            }
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Config: Failed to load settings from {:?}", path)),
        None => Ok(Settings::default()),
    }
}

/// Features from a GeoJSON document (collection, feature or bare geometry),
/// falling back to one feature per line.
pub fn read_features(path: &Path) -> Result<Vec<MapFeature>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Input: Failed to read {:?}", path))?;

    let features = match text.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(collection)) => collection
            .features
            .into_iter()
            .map(MapFeature::from_geojson)
            .collect::<Result<Vec<_>, _>>()?,
        Ok(GeoJson::Feature(feature)) => vec![MapFeature::from_geojson(feature)?],
        Ok(GeoJson::Geometry(geometry)) => {
            vec![MapFeature::new().with_geometry(geometry.try_into()?)]
        }
        Err(_) => {
            let mut features = Vec::new();
            for (n, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let feature: geojson::Feature = line
                    .parse()
                    .with_context(|| format!("Input: Invalid GeoJSON on line {}", n + 1))?;
                features.push(MapFeature::from_geojson(feature)?);
            }
            features
        }
    };

    tracing::info!("Input: {} feature(s) from {:?}", features.len(), path);
    Ok(features)
}

fn write_rows(format: Option<OutputFormat>, output: &Path, rows: Vec<FeatureRow>) -> Result<usize> {
    let format = resolve_format(format, output)?;
    let mut sink = init_sink(&format, output)?;
    let count = rows.len();
    for row in rows {
        sink.add_feature(row)?;
    }
    sink.finish().context("Pipeline: Failed to finalize sink")?;
    Ok(count)
}

/// Print the flattened rules and the attributes they read.
pub fn check(args: &CheckArgs) -> Result<usize> {
    let settings = load_settings(args.config.as_deref())?;
    let text = std::fs::read_to_string(&args.stylesheet)
        .with_context(|| format!("Input: Failed to read {:?}", args.stylesheet))?;
    let sheet = parse_stylesheet_with(&text, &settings.parse_options())
        .with_context(|| format!("Style: Failed to parse {:?}", args.stylesheet))?;

    let flat = sheet.flat_rules();
    for rule in flat {
        println!("{}", rule);
    }
    let properties = referenced_properties(flat);
    if !properties.is_empty() {
        let names: Vec<&str> = properties.iter().map(String::as_str).collect();
        println!("properties: {}", names.join(", "));
    }

    tracing::info!(
        "Stylesheet: {} rule(s), {} flattened",
        sheet.rules().len(),
        flat.len()
    );
    Ok(flat.len())
}

/// Write the features the filter accepts, attributes unchanged.
pub fn query(args: &QueryArgs) -> Result<usize> {
    let settings = load_settings(args.config.as_deref())?;
    let filter = parse_filter_with(&args.filter, &settings.parse_options())
        .context("Query: Failed to parse filter")?;
    tracing::info!("Filter: {}", filter);

    let evaluator = Evaluator::default();
    let features = read_features(&args.input)?;
    let rows: Vec<FeatureRow> = features
        .par_iter()
        .filter_map(|feature| {
            match filter.evaluate(Some(feature as &dyn Feature), evaluator.functions()) {
                Ok(true) => Some(passthrough_row(feature)),
                Ok(false) => None,
                Err(err) => {
                    tracing::warn!("Feature {}: filter failed: {}", feature_label(feature), err);
                    None
                }
            }
        })
        .collect();

    write_rows(args.format, &args.output, rows)
}

/// Evaluate the requested style properties for every input feature.
pub fn style(args: &StyleArgs) -> Result<usize> {
    let settings = load_settings(args.config.as_deref())?;
    let options: ParseOptions = settings.parse_options();

    let layer = args
        .layer
        .as_deref()
        .or(settings.layer.as_deref())
        .context("CLI: No layer given; use --layer or set `layer` in the settings file")?;

    let text = std::fs::read_to_string(&args.stylesheet)
        .with_context(|| format!("Input: Failed to read {:?}", args.stylesheet))?;
    let sheet = parse_stylesheet_with(&text, &options)
        .with_context(|| format!("Style: Failed to parse {:?}", args.stylesheet))?;

    let rules = select(sheet.flat_rules(), layer);
    if rules.is_empty() {
        tracing::warn!("Style: No rules select layer {:?}", layer);
    }

    let properties = if !args.properties.is_empty() {
        args.properties.clone()
    } else if !settings.properties.is_empty() {
        settings.properties.clone()
    } else {
        declared_properties(&rules)
    };
    tracing::info!(
        "Style: layer {:?}, {} rule(s), {} propert(ies)",
        layer,
        rules.len(),
        properties.len()
    );

    let evaluator = Evaluator::default();
    let features = read_features(&args.input)?;
    let rows: Vec<FeatureRow> = features
        .par_iter()
        .map(|feature| styled_row(&evaluator, &rules, feature, &properties))
        .collect();

    write_rows(args.format, &args.output, rows)
}

/// Every declared key, in first-seen order, evaluated as-is.
fn declared_properties(rules: &[&FlatRule]) -> Vec<PropertySpec> {
    let keys: IndexSet<&str> = rules
        .iter()
        .flat_map(|rule| rule.declarations().keys().map(String::as_str))
        .collect();
    keys.into_iter()
        .map(|key| PropertySpec {
            key: key.to_string(),
            value_type: ValueType::Raw,
            default: None,
        })
        .collect()
}

fn styled_row(
    evaluator: &Evaluator,
    rules: &[&FlatRule],
    feature: &MapFeature,
    properties: &[PropertySpec],
) -> FeatureRow {
    let mut out = serde_json::Map::new();
    for spec in properties {
        let value = match evaluate_property(evaluator, rules, feature, spec) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    "Feature {}: {} falls back to default: {}",
                    feature_label(feature),
                    spec.key,
                    err
                );
                None
            }
        };
        let value = value
            .or_else(|| spec.default.clone())
            .unwrap_or(serde_json::Value::Null);
        out.insert(spec.key.clone(), value);
    }

    FeatureRow {
        id: feature.id().map(str::to_string),
        geometry: feature.geometry().cloned(),
        properties: out,
    }
}

fn evaluate_property(
    evaluator: &Evaluator,
    rules: &[&FlatRule],
    feature: &MapFeature,
    spec: &PropertySpec,
) -> Result<Option<serde_json::Value>, EvaluationError> {
    let feature = Some(feature as &dyn Feature);
    let key = spec.key.as_str();
    let value = match spec.value_type {
        ValueType::Raw => evaluator
            .eval_as::<Value>(rules, feature, key)?
            .map(|v| serde_json::Value::from(&v)),
        ValueType::String => evaluator
            .eval_as::<String>(rules, feature, key)?
            .map(serde_json::Value::from),
        ValueType::Integer => evaluator
            .eval_as::<i64>(rules, feature, key)?
            .map(serde_json::Value::from),
        ValueType::Number => evaluator
            .eval_as::<f64>(rules, feature, key)?
            .map(serde_json::Value::from),
        ValueType::Boolean => evaluator
            .eval_as::<bool>(rules, feature, key)?
            .map(serde_json::Value::from),
        ValueType::Color => evaluator
            .eval_as::<Rgb>(rules, feature, key)?
            .map(|color| serde_json::Value::String(color.to_string())),
        ValueType::Numbers => evaluator
            .eval_as::<Vec<f64>>(rules, feature, key)?
            .map(serde_json::Value::from),
    };
    Ok(value)
}

fn passthrough_row(feature: &MapFeature) -> FeatureRow {
    FeatureRow {
        id: feature.id().map(str::to_string),
        geometry: feature.geometry().cloned(),
        properties: feature
            .attributes()
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect(),
    }
}

fn feature_label(feature: &MapFeature) -> &str {
    feature.id().unwrap_or("<no id>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolve_format_from_extension() {
        assert_eq!(
            resolve_format(None, Path::new("out.geojson")).unwrap(),
            OutputFormat::GeoJson
        );
        assert_eq!(
            resolve_format(None, Path::new("out.JSONL")).unwrap(),
            OutputFormat::GeoJsonl
        );
        assert_eq!(
            resolve_format(None, Path::new("-")).unwrap(),
            OutputFormat::GeoJsonl
        );
        assert!(resolve_format(None, Path::new("out.csv")).is_err());
        assert_eq!(
            resolve_format(Some(OutputFormat::GeoJson), Path::new("out.csv")).unwrap(),
            OutputFormat::GeoJson
        );
    }

    #[test]
    fn geojson_to_stdout_is_rejected() {
        assert!(init_sink(&OutputFormat::GeoJson, Path::new("-")).is_err());
    }

    #[test]
    fn reads_feature_collection_and_lines() {
        let mut collection = tempfile::Builder::new()
            .suffix(".geojson")
            .tempfile()
            .unwrap();
        write!(
            collection,
            r#"{{"type":"FeatureCollection","features":[
                {{"type":"Feature","id":"a","geometry":{{"type":"Point","coordinates":[1,2]}},"properties":{{"cost":5}}}},
                {{"type":"Feature","geometry":null,"properties":{{"cost":25}}}}
            ]}}"#
        )
        .unwrap();
        let features = read_features(collection.path()).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].id(), Some("a"));
        assert!(features[0].geometry().is_some());
        assert_eq!(features[1].get("cost"), Some(Value::Int(25)));

        let mut lines = tempfile::Builder::new()
            .suffix(".geojsonl")
            .tempfile()
            .unwrap();
        writeln!(
            lines,
            r#"{{"type":"Feature","geometry":null,"properties":{{"name":"x"}}}}"#
        )
        .unwrap();
        writeln!(lines).unwrap();
        writeln!(
            lines,
            r#"{{"type":"Feature","geometry":null,"properties":{{"name":"y"}}}}"#
        )
        .unwrap();
        let features = read_features(lines.path()).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[1].get("name"), Some(Value::from("y")));
    }

    #[test]
    fn styled_row_coerces_and_defaults() {
        let sheet = carto::parse_stylesheet(
            "#roads { line-width: 2px; line-color: red; line-dasharray: 3 4; [lanes > 2] { line-width: 5; } }",
        )
        .unwrap();
        let rules = select(sheet.flat_rules(), "roads");
        let evaluator = Evaluator::default();
        let feature = MapFeature::new()
            .with_id("r1")
            .with_attribute("lanes", 4);

        let properties: Vec<PropertySpec> = vec![
            "line-width:integer".parse().unwrap(),
            "line-color:color".parse().unwrap(),
            "line-dasharray:numbers".parse().unwrap(),
            PropertySpec {
                key: "line-opacity".to_string(),
                value_type: ValueType::Number,
                default: Some(serde_json::json!(0.5)),
            },
        ];
        let row = styled_row(&evaluator, &rules, &feature, &properties);

        assert_eq!(row.id.as_deref(), Some("r1"));
        assert_eq!(row.properties["line-width"], 5);
        assert_eq!(row.properties["line-color"], "#ff0000");
        assert_eq!(row.properties["line-dasharray"], serde_json::json!([3.0, 4.0]));
        assert_eq!(row.properties["line-opacity"], 0.5);

        // a type mismatch falls back to null
        let mismatched = vec!["line-color:integer".parse().unwrap()];
        let row = styled_row(&evaluator, &rules, &feature, &mismatched);
        assert!(row.properties["line-color"].is_null());
    }

    #[test]
    fn declared_properties_in_first_seen_order() {
        let sheet = carto::parse_stylesheet("#a { w: 1; c: red; [x > 1] { w: 2; o: 1; } }").unwrap();
        let rules = select(sheet.flat_rules(), "a");
        let keys: Vec<_> = declared_properties(&rules)
            .into_iter()
            .map(|spec| spec.key)
            .collect();
        assert_eq!(keys, vec!["w", "c", "o"]);
    }
}
