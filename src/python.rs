use pyo3::prelude::*;
use pyo3::types::PyModule;

use crate::config::{EngineConfig, RecalcMetadata};
use crate::error::RecalcError;
use crate::lookup::StaticLookup;
use crate::pipeline::RecalculationJob;
use crate::schema;

/// Run one recalculation event over JSON documents.
///
/// Returns `(aggregate_json, raw_json)`.
#[pyfunction]
#[pyo3(signature = (metadata_json, baseline_json, comparator_json, lookups_json, filter_by=None, raw_data_key_columns=None))]
fn run_recalculation(
    py: Python<'_>,
    metadata_json: &str,
    baseline_json: &str,
    comparator_json: &str,
    lookups_json: &str,
    filter_by: Option<Vec<String>>,
    raw_data_key_columns: Option<Vec<String>>,
) -> PyResult<(String, String)> {
    py.allow_threads(|| -> Result<(String, String), RecalcError> {
        let metadata = RecalcMetadata::from_json(metadata_json)?;
        let lookup = StaticLookup::from_json(lookups_json)?;
        let baseline = serde_json::from_str(baseline_json)?;
        let comparator = serde_json::from_str(comparator_json)?;

        let mut config = EngineConfig::new();
        if let Some(columns) = filter_by {
            config = config.with_filter_by_columns(columns);
        }
        if let Some(columns) = raw_data_key_columns {
            config = config.with_raw_data_key_columns(columns);
        }

        let report = RecalculationJob::new(&metadata, &lookup)
            .with_config(config)
            .run(&baseline, &comparator)?;
        Ok((report.aggregate_json()?, report.raw_json()?))
    })
    .map_err(PyErr::from)
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Emissions key
    let emissions_key = PyModule::new(m.py(), "emissions_key")?;
    emissions_key.add("ALL", schema::emissions_key::ALL.to_vec())?;
    emissions_key.add(
        "DEFAULT_RAW_DATA_KEY",
        schema::emissions_key::DEFAULT_RAW_DATA_KEY.to_vec(),
    )?;
    emissions_key.add(
        "DEFAULT_FILTER_BY",
        schema::emissions_key::DEFAULT_FILTER_BY.to_vec(),
    )?;
    emissions_key.add(
        "SUB_CATEGORY_FUEL_1",
        schema::emissions_key::SUB_CATEGORY_FUEL_1,
    )?;
    m.add_submodule(&emissions_key)?;

    // Time
    let time = PyModule::new(m.py(), "time")?;
    time.add("YEAR_PREFIX", schema::time::YEAR_PREFIX)?;
    time.add("YEAR", schema::time::YEAR)?;
    time.add("WEIGHTED_QUANTITY", schema::time::WEIGHTED_QUANTITY)?;
    time.add(
        "EARLIEST_REPORTING_YEAR",
        schema::time::EARLIEST_REPORTING_YEAR,
    )?;
    m.add_submodule(&time)?;

    // Output
    let output = PyModule::new(m.py(), "output")?;
    output.add("KEY", schema::output::KEY)?;
    output.add("DATA", schema::output::DATA)?;
    output.add("CHILDREN", schema::output::CHILDREN)?;
    output.add("NAME", schema::output::NAME)?;
    output.add("RECALC_PREFIX", schema::output::RECALC_PREFIX)?;
    output.add("EMISSIONS_KEY", schema::output::EMISSIONS_KEY)?;
    output.add("RAW_DATA_KEY", schema::output::RAW_DATA_KEY)?;
    m.add_submodule(&output)?;

    // Dataset
    let dataset = PyModule::new(m.py(), "dataset")?;
    dataset.add(
        "POWER_USER_DATA_FIELD",
        schema::dataset::POWER_USER_DATA_FIELD,
    )?;
    dataset.add("POWER_USER_MARKER", schema::dataset::POWER_USER_MARKER)?;
    dataset.add("NATIONAL_MARKER", schema::dataset::NATIONAL_MARKER)?;
    dataset.add("NULL_SENTINEL", schema::dataset::NULL_SENTINEL)?;
    m.add_submodule(&dataset)?;

    Ok(())
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(run_recalculation, m)?)?;
    add_schema_exports(m)?;
    Ok(())
}
