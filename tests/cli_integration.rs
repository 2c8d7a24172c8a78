use std::io::Write;
use std::process::Command;

const WIDGETS: &str = r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","id":"cheap","geometry":{"type":"Point","coordinates":[0,0]},"properties":{"cost":5}},
  {"type":"Feature","id":"mid","geometry":{"type":"Point","coordinates":[1,1]},"properties":{"cost":15}},
  {"type":"Feature","id":"pricey","geometry":{"type":"Point","coordinates":[2,2]},"properties":{"cost":35}}
]}"#;

const STYLE: &str = "/* widgets */
#widgets {
  marker-width: 4;
  [cost > 12] { marker-fill: green; marker-width: 8px; }
  [cost > 30] { marker-fill: red; }
}";

fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::with_suffix(suffix).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn check_prints_flattened_rules() {
    let style = write_temp(".mss", STYLE);

    let output = Command::new(env!("CARGO_BIN_EXE_carto"))
        .arg("check")
        .arg(style.path())
        .output()
        .expect("failed to execute process");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("#widgets {"));
    assert!(lines[2].contains("marker-fill: 'red'"));
    assert_eq!(lines[3], "properties: cost");
}

#[test]
fn check_reports_syntax_errors() {
    let style = write_temp(".mss", "#widgets { marker-width: 4; ");

    let output = Command::new(env!("CARGO_BIN_EXE_carto"))
        .arg("check")
        .arg(style.path())
        .output()
        .expect("failed to execute process");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Failed to parse"));
}

#[test]
fn query_writes_matching_features() {
    let input = write_temp(".geojson", WIDGETS);
    let output_file = tempfile::NamedTempFile::with_suffix(".geojsonl").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_carto"))
        .arg("query")
        .arg("--input")
        .arg(input.path())
        .arg("--filter")
        .arg("cost BETWEEN 10 AND 40 AND NOT cost > 30")
        .arg("--output")
        .arg(output_file.path())
        .arg("--verbose")
        .status()
        .expect("failed to execute process");

    assert!(status.success());
    let features = read_lines(output_file.path());
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["id"], "mid");
    assert_eq!(features[0]["properties"]["cost"], 15);
}

#[test]
fn query_to_stdout_defaults_to_geojsonl() {
    let input = write_temp(".geojson", WIDGETS);

    let output = Command::new(env!("CARGO_BIN_EXE_carto"))
        .arg("query")
        .arg("-i")
        .arg(input.path())
        .arg("-f")
        .arg("INTERSECTS(geometry, POLYGON((0.5 0.5, 3 0.5, 3 3, 0.5 3, 0.5 0.5)))")
        .output()
        .expect("failed to execute process");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let ids: Vec<String> = stdout
        .lines()
        .map(|line| {
            let feature: serde_json::Value = serde_json::from_str(line).unwrap();
            feature["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids, vec!["mid", "pricey"]);
}

#[test]
fn style_evaluates_typed_properties() {
    let input = write_temp(".geojson", WIDGETS);
    let style = write_temp(".mss", STYLE);
    let output_file = tempfile::NamedTempFile::with_suffix(".geojson").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_carto"))
        .arg("style")
        .arg("--input")
        .arg(input.path())
        .arg("--stylesheet")
        .arg(style.path())
        .arg("--layer")
        .arg("widgets")
        .arg("-p")
        .arg("marker-width:integer")
        .arg("-p")
        .arg("marker-fill:color")
        .arg("--output")
        .arg(output_file.path())
        .status()
        .expect("failed to execute process");

    assert!(status.success());
    let content = std::fs::read_to_string(output_file.path()).unwrap();
    let collection: serde_json::Value = serde_json::from_str(&content).unwrap();
    let features = collection["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);

    assert_eq!(features[0]["properties"]["marker-width"], 4);
    assert!(features[0]["properties"]["marker-fill"].is_null());
    assert_eq!(features[1]["properties"]["marker-width"], 8);
    assert_eq!(features[1]["properties"]["marker-fill"], "#008000");
    assert_eq!(features[2]["properties"]["marker-fill"], "#ff0000");
    assert_eq!(features[2]["geometry"]["type"], "Point");
}

#[test]
fn style_reads_layer_and_properties_from_settings() {
    let input = write_temp(".geojson", WIDGETS);
    let style = write_temp(".mss", STYLE);
    let settings = write_temp(
        ".yaml",
        "layer: widgets\nproperties:\n  - key: marker-fill\n    type: color\n    default: \"#000000\"\n",
    );
    let output_file = tempfile::NamedTempFile::with_suffix(".geojsonl").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_carto"))
        .arg("style")
        .arg("-i")
        .arg(input.path())
        .arg("-s")
        .arg(style.path())
        .arg("-c")
        .arg(settings.path())
        .arg("-o")
        .arg(output_file.path())
        .status()
        .expect("failed to execute process");

    assert!(status.success());
    let features = read_lines(output_file.path());
    let fills: Vec<&str> = features
        .iter()
        .map(|f| f["properties"]["marker-fill"].as_str().unwrap())
        .collect();
    assert_eq!(fills, vec!["#000000", "#008000", "#ff0000"]);
    assert!(features[0]["properties"].get("marker-width").is_none());
}

#[test]
fn style_requires_a_layer() {
    let input = write_temp(".geojson", WIDGETS);
    let style = write_temp(".mss", STYLE);

    let status = Command::new(env!("CARGO_BIN_EXE_carto"))
        .arg("style")
        .arg("-i")
        .arg(input.path())
        .arg("-s")
        .arg(style.path())
        .status()
        .expect("failed to execute process");

    assert!(!status.success());
}
