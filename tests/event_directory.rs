//! Event directory round trip: JSON files in, result files out.

use std::fs;
use std::path::Path;

use ghg_recalc::schema::emissions_key;
use ghg_recalc::{DatasetRole, EventDirectory, RecalculationJob};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

fn dataset(sector: &str, quantities: [f64; 2]) -> Value {
    let mut row = Map::new();
    for column in emissions_key::ALL {
        row.insert(column.to_string(), Value::Null);
    }
    row.insert("sector".into(), json!(sector));
    row.insert("sub_category_1".into(), json!("Coal"));
    row.insert("fuel1".into(), json!("Bituminous"));
    row.insert("ghg".into(), json!("CO2"));
    row.insert("ghg_category".into(), json!("CO2"));
    row.insert("gwp".into(), json!("1"));
    row.insert("Y1990".into(), json!(quantities[0]));
    row.insert("Y1991".into(), json!(quantities[1].to_string()));
    json!([Value::Object(row)])
}

fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn event_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_json(
        &dir.path().join("metadata.json"),
        &json!({
            "baselineObjName": "Publication_2024.json",
            "baselineYearLayerKey": "PY2024National",
            "comparatorObjName": "Publication_2023.json",
            "comparatorYearLayerKey": "PY2023National",
            "ghgOption": "ghgCategory",
            "columns": ["sector", "sub_category_fuel_1"],
            "recalculations": {"outputYears": [1990, 1991, 2030], "parameter": "Difference"}
        }),
    );
    write_json(
        &dir.path().join("lookups.json"),
        &json!({"maxTimeSeries": {"2024": 1991, "2023": 1991}}),
    );
    write_json(&dir.path().join("baseline.json"), &dataset("Energy", [12.0, 9.5]));
    write_json(&dir.path().join("comparator.json"), &dataset("Energy", [10.0, 10.0]));
    dir
}

#[test]
fn results_round_trip_through_event_directory() {
    let dir = event_dir();
    let event = EventDirectory::new(dir.path());

    let metadata = event.read_metadata().unwrap();
    let lookup = event.read_lookups(None).unwrap();
    let baseline = event.read_dataset(DatasetRole::Baseline).unwrap();
    let comparator = event.read_dataset(DatasetRole::Comparator).unwrap();

    let report = RecalculationJob::new(&metadata, &lookup)
        .run(&baseline, &comparator)
        .unwrap();
    assert_eq!(
        report.grouping_columns,
        vec!["ghg_category", "sector", "sub_category_1", "fuel1"]
    );
    assert_eq!(report.output_years, vec![1990, 1991]);

    let (aggregate_path, raw_path) = event.write_results(&report).unwrap();
    assert!(aggregate_path.ends_with("recalculations/aggregate_results.json"));
    assert!(raw_path.ends_with("recalculations/raw_results.json"));

    let aggregate: Value =
        serde_json::from_str(&fs::read_to_string(&aggregate_path).unwrap()).unwrap();
    let energy = &aggregate[0]["children"][0];
    assert_eq!(aggregate[0]["key"], "CO2");
    assert_eq!(energy["key"], "CO2/Energy");
    assert_eq!(energy["data"]["recalc_1990"], json!(2.0));
    assert_eq!(energy["data"]["recalc_1991"], json!(-0.5));
    let leaf = &energy["children"][0]["children"][0];
    assert_eq!(leaf["key"], "CO2/Energy/Coal/Bituminous");
    assert!(leaf.get("children").is_none());

    let raw: Value = serde_json::from_str(&fs::read_to_string(&raw_path).unwrap()).unwrap();
    assert_eq!(raw[0]["key"], "CO2/Energy/Coal/Bituminous");
    let row = &raw[0]["data"][0];
    assert_eq!(row["emissions_key"].as_str().unwrap().len(), 32);
    assert_eq!(row["gwp"], json!(1.0));
    assert_eq!(row["geo_ref"], "null");
    assert_eq!(row["Y1991"], json!(9.5));
    assert_eq!(row["recalc_1990"], json!(2.0));
}

#[test]
fn malformed_metadata_is_reported_before_any_work() {
    let dir = event_dir();
    write_json(
        &dir.path().join("metadata.json"),
        &json!({
            "baselineObjName": "Publication_2024.json",
            "baselineYearLayerKey": "PY2024National",
            "ghgOption": "ghg",
            "columns": ["sector"],
            "recalculations": {"outputYears": [1990], "parameter": "mmt"}
        }),
    );
    let event = EventDirectory::new(dir.path());
    let metadata = event.read_metadata().unwrap();
    let lookup = event.read_lookups(None).unwrap();

    let err = RecalculationJob::new(&metadata, &lookup)
        .run(
            &event.read_dataset(DatasetRole::Baseline).unwrap(),
            &event.read_dataset(DatasetRole::Comparator).unwrap(),
        )
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(!dir.path().join("recalculations").exists());
}
