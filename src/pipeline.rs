//! End-to-end recalculation of one event: datasets in, compared trees out.

use std::collections::BTreeSet;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::aggregation::{AggregateNode, RawGroup};
use crate::config::{EngineConfig, RecalcMetadata};
use crate::dataset::{Dataset, DatasetRole};
use crate::error::{RecalcError, Result};
use crate::lookup::ReferenceLookup;
use crate::recalculation::{RawMatchStats, RecalculationFrame};

/// Results of one recalculation event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecalculationReport {
    pub grouping_columns: Vec<String>,
    pub output_years: Vec<i32>,
    pub aggregate: Vec<AggregateNode>,
    pub raw: Vec<RawGroup>,
    pub raw_stats: RawMatchStats,
}

impl RecalculationReport {
    pub fn aggregate_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.aggregate)?)
    }

    pub fn raw_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.raw)?)
    }
}

/// A configured recalculation over one event's metadata.
pub struct RecalculationJob<'a> {
    metadata: &'a RecalcMetadata,
    lookup: &'a dyn ReferenceLookup,
    config: EngineConfig,
}

impl<'a> RecalculationJob<'a> {
    pub fn new(metadata: &'a RecalcMetadata, lookup: &'a dyn ReferenceLookup) -> Self {
        Self {
            metadata,
            lookup,
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Groom both datasets, build their trees and compare baseline against
    /// comparator.
    ///
    /// Configuration problems are reported before any dataset is touched.
    pub fn run(&self, baseline_data: &Value, comparator_data: &Value) -> Result<RecalculationReport> {
        self.config.validate()?;
        let grouping_columns = self.metadata.grouping_columns()?;
        validate_filter_by_placement(&grouping_columns, &self.config)?;
        let operation = self.metadata.operation()?;
        let requested_years = self.metadata.output_years();
        info!(grouping = ?grouping_columns, ?operation, "recalculation started");

        let mut baseline = Dataset::from_metadata(
            baseline_data,
            self.metadata,
            DatasetRole::Baseline,
            self.lookup,
        )?;
        let mut comparator = Dataset::from_metadata(
            comparator_data,
            self.metadata,
            DatasetRole::Comparator,
            self.lookup,
        )?;

        prepare_dataset_for_comparison(&mut baseline, self.lookup)?;
        prepare_dataset_for_comparison(&mut comparator, self.lookup)?;

        let tracked = self.config.raw_data_key_columns();
        info!("grooming baseline");
        let baseline_unused = baseline.groom_data(tracked)?;
        info!("grooming comparator");
        let comparator_unused = comparator.groom_data(tracked)?;
        reconcile_unused_columns(
            &mut baseline,
            &mut comparator,
            &baseline_unused,
            &comparator_unused,
        )?;

        let max_output_year = baseline.max_time_series().min(comparator.max_time_series());
        let output_years = clamp_output_years(requested_years, max_output_year);

        let baseline_frame = self.build_frame(&mut baseline, &grouping_columns, &output_years)?;
        let comparator_frame =
            self.build_frame(&mut comparator, &grouping_columns, &output_years)?;

        let started = Instant::now();
        let aggregate = baseline_frame.recalculate_aggregate(&comparator_frame, operation)?;
        let raw = baseline_frame.recalculate_raw(&comparator_frame, operation)?;
        info!(elapsed = ?started.elapsed(), "recalculation performed");

        Ok(RecalculationReport {
            grouping_columns,
            output_years,
            aggregate,
            raw: raw.groups,
            raw_stats: raw.stats,
        })
    }

    fn build_frame(
        &self,
        dataset: &mut Dataset,
        grouping_columns: &[String],
        output_years: &[i32],
    ) -> Result<RecalculationFrame> {
        info!(role = %dataset.role(), "constructing recalculation frame");
        let started = Instant::now();
        dataset.convert_data_to_portrait()?;
        dataset.convert_data_to_dataframe()?;
        let frame = RecalculationFrame::new(
            dataset.frame()?,
            grouping_columns,
            dataset.max_time_series(),
            output_years.to_vec(),
            &self.config,
        )?;
        info!(role = %dataset.role(), elapsed = ?started.elapsed(), "recalculation frame constructed");
        Ok(frame)
    }
}

/// Recover every emissions-key column the dataset is missing.
pub fn prepare_dataset_for_comparison(
    dataset: &mut Dataset,
    lookup: &dyn ReferenceLookup,
) -> Result<()> {
    dataset.recover_missing_columns(lookup)
}

/// Clear, on each side, the columns only the other side left unused.
pub fn reconcile_unused_columns(
    baseline: &mut Dataset,
    comparator: &mut Dataset,
    baseline_unused: &[String],
    comparator_unused: &[String],
) -> Result<()> {
    let baseline_unused: BTreeSet<&String> = baseline_unused.iter().collect();
    let comparator_unused: BTreeSet<&String> = comparator_unused.iter().collect();

    let baseline_clears: Vec<String> = comparator_unused
        .difference(&baseline_unused)
        .map(|c| (*c).clone())
        .collect();
    let comparator_clears: Vec<String> = baseline_unused
        .difference(&comparator_unused)
        .map(|c| (*c).clone())
        .collect();

    baseline.clear_unused_columns(&baseline_clears)?;
    comparator.clear_unused_columns(&comparator_clears)
}

/// Output years that both datasets can supply.
pub fn clamp_output_years(requested: &[i32], max_output_year: i32) -> Vec<i32> {
    requested
        .iter()
        .copied()
        .filter(|&year| year <= max_output_year)
        .collect()
}

/// Filter-by columns act as a lens on the top level only.
fn validate_filter_by_placement(grouping_columns: &[String], config: &EngineConfig) -> Result<()> {
    if let Some(column) = grouping_columns
        .iter()
        .skip(1)
        .find(|column| config.is_filter_by(column))
    {
        return Err(RecalcError::Config(format!(
            "filter-by column '{column}' can only be the top grouping level"
        )));
    }
    Ok(())
}
