//! Baseline/comparator datasets and their grooming pipeline.
//!
//! A dataset moves strictly forward through three modes:
//! landscape rows → portrait rows → tabular polars frame.
//! Grooming and column clearing are only legal while in landscape mode.

use std::fmt;

use polars::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RecalcMetadata;
use crate::error::{RecalcError, Result};
use crate::lookup::ReferenceLookup;
use crate::schema::dataset::{NATIONAL_MARKER, POWER_USER_DATA_FIELD, POWER_USER_MARKER};
use crate::schema::emissions_key;
use crate::schema::time::{EARLIEST_REPORTING_YEAR, WEIGHTED_QUANTITY, YEAR};
use crate::transform;
use crate::value::{records_from_json, CellValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetRole {
    Baseline,
    Comparator,
}

impl DatasetRole {
    /// Metadata key prefix, e.g. `baselineObjName`.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Comparator => "comparator",
        }
    }
}

impl fmt::Display for DatasetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Export shape a dataset was produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// `{"Data by UNFCCC-IPCC Sectors": [rows]}`; may lack `geo_ref`.
    PowerUser,
    /// Flat `[rows]`; may lack `gwp` and `ghg_category`.
    Publication,
}

/// Fills in one missing emissions-key column across all rows.
type RecoveryFn = fn(&mut [Record], i32, &dyn ReferenceLookup) -> Result<()>;

impl DatasetKind {
    pub fn detect(obj_name: &str) -> Self {
        if obj_name.contains(POWER_USER_MARKER) {
            Self::PowerUser
        } else {
            Self::Publication
        }
    }

    fn unwrap_rows(self, raw: &Value) -> Result<Vec<Record>> {
        match self {
            Self::PowerUser => {
                let rows = raw.get(POWER_USER_DATA_FIELD).ok_or_else(|| {
                    RecalcError::InvalidData(format!(
                        "power-user dataset has no '{POWER_USER_DATA_FIELD}' field"
                    ))
                })?;
                records_from_json(rows)
            }
            Self::Publication => records_from_json(raw),
        }
    }

    fn recovery(self, column: &str) -> Option<RecoveryFn> {
        match (self, column) {
            (Self::PowerUser, emissions_key::GEO_REF) => {
                Some(insert_missing_geo_ref_column as RecoveryFn)
            }
            (Self::Publication, emissions_key::GWP) => Some(insert_missing_gwp_column as RecoveryFn),
            (Self::Publication, emissions_key::GHG_CATEGORY) => {
                Some(insert_missing_ghg_category_column as RecoveryFn)
            }
            _ => None,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerUser => f.write_str("PowerUserDataset"),
            Self::Publication => f.write_str("PublicationDataset"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    National,
    State,
}

impl Layer {
    pub fn from_year_layer_key(year_layer_key: &str) -> Self {
        if year_layer_key.contains(NATIONAL_MARKER) {
            Self::National
        } else {
            Self::State
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Self::National => 1,
            Self::State => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Landscape,
    Portrait,
    Tabular,
}

impl DataMode {
    fn name(self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Tabular => "tabular",
        }
    }
}

#[derive(Debug, Clone)]
enum DatasetData {
    Landscape(Vec<Record>),
    Portrait(Vec<Record>),
    Tabular(DataFrame),
}

#[derive(Debug, Clone)]
pub struct Dataset {
    kind: DatasetKind,
    role: DatasetRole,
    file_name: String,
    reporting_year: i32,
    layer: Layer,
    max_time_series: i32,
    data: DatasetData,
}

impl Dataset {
    /// Build the dataset for `role`, choosing the variant from its object name.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RecalcError::MissingMetadata`] | `<role>ObjName` or `<role>YearLayerKey` absent |
    /// | [`RecalcError::InvalidYearLayerKey`] | no 4-digit year at offset 2 of the year-layer key |
    /// | [`RecalcError::InvalidData`] | raw data is not in the variant's shape |
    pub fn from_metadata(
        raw: &Value,
        metadata: &RecalcMetadata,
        role: DatasetRole,
        lookup: &dyn ReferenceLookup,
    ) -> Result<Self> {
        let info = metadata.dataset_info(role)?;
        let kind = DatasetKind::detect(info.obj_name);
        let reporting_year = parse_reporting_year(info.year_layer_key)?;
        let rows = kind.unwrap_rows(raw)?;
        let max_time_series = lookup.max_time_series(reporting_year)?;

        debug!(
            role = %role,
            kind = %kind,
            reporting_year,
            rows = rows.len(),
            "dataset constructed"
        );

        Ok(Self {
            kind,
            role,
            file_name: info.obj_name.to_string(),
            reporting_year,
            layer: Layer::from_year_layer_key(info.year_layer_key),
            max_time_series,
            data: DatasetData::Landscape(rows),
        })
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn role(&self) -> DatasetRole {
        self.role
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn reporting_year(&self) -> i32 {
        self.reporting_year
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn max_time_series(&self) -> i32 {
        self.max_time_series
    }

    /// `EARLIEST_REPORTING_YEAR ..= max_time_series`.
    pub fn time_series(&self) -> Vec<i32> {
        (EARLIEST_REPORTING_YEAR..=self.max_time_series).collect()
    }

    pub fn mode(&self) -> DataMode {
        match self.data {
            DatasetData::Landscape(_) => DataMode::Landscape,
            DatasetData::Portrait(_) => DataMode::Portrait,
            DatasetData::Tabular(_) => DataMode::Tabular,
        }
    }

    /// Row view of the data, whatever export shape it arrived in.
    pub fn get_data_array(&self) -> Result<&[Record]> {
        match &self.data {
            DatasetData::Landscape(rows) | DatasetData::Portrait(rows) => Ok(rows),
            DatasetData::Tabular(_) => Err(self.invalid_state("read rows")),
        }
    }

    /// Tabular frame, available once [`Dataset::convert_data_to_dataframe`] ran.
    pub fn frame(&self) -> Result<&DataFrame> {
        match &self.data {
            DatasetData::Tabular(frame) => Ok(frame),
            _ => Err(self.invalid_state("read the frame")),
        }
    }

    /// Emissions-key columns present in the first row, in canonical order.
    pub fn get_emissions_key_column_list(&self) -> Result<Vec<&'static str>> {
        let Some(first) = self.get_data_array()?.first() else {
            return Ok(Vec::new());
        };
        Ok(emissions_key::ALL
            .iter()
            .copied()
            .filter(|column| first.contains_key(*column))
            .collect())
    }

    pub fn missing_emissions_key_columns(&self) -> Result<Vec<&'static str>> {
        let present = self.get_emissions_key_column_list()?;
        Ok(emissions_key::ALL
            .iter()
            .copied()
            .filter(|column| !present.contains(column))
            .collect())
    }

    /// Run this variant's recovery for every missing emissions-key column.
    ///
    /// # Errors
    ///
    /// [`RecalcError::MissingRecovery`] if the variant cannot synthesize one of
    /// the missing columns.
    pub fn recover_missing_columns(&mut self, lookup: &dyn ReferenceLookup) -> Result<()> {
        let reporting_year = self.reporting_year;
        let kind = self.kind;
        let missing = self.missing_emissions_key_columns()?;
        info!(role = %self.role, ?missing, "missing emissions key columns");

        let rows = self.landscape_rows_mut("recover missing columns")?;
        if rows.is_empty() {
            return Ok(());
        }
        for column in missing {
            let recover = kind.recovery(column).ok_or_else(|| RecalcError::MissingRecovery {
                kind: kind.to_string(),
                column: column.to_string(),
            })?;
            recover(rows, reporting_year, lookup)?;
        }

        let still_missing = self.missing_emissions_key_columns()?;
        info!(role = %self.role, missing = ?still_missing, "missing emissions key columns after recovery");
        Ok(())
    }

    /// Normalize rows for matching and report which of `tracked_columns` are
    /// unused (cleared in every row).
    ///
    /// Casts `gwp` to a float and replaces null or empty cells with
    /// [`CellValue::Cleared`]. A dataset without rows reports nothing unused.
    pub fn groom_data(&mut self, tracked_columns: &[String]) -> Result<Vec<String>> {
        let rows = self.landscape_rows_mut("groom the data")?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut unused: Vec<&String> = tracked_columns.iter().collect();

        for (index, row) in rows.iter_mut().enumerate() {
            let gwp = row
                .get_mut(emissions_key::GWP)
                .ok_or_else(|| RecalcError::MissingColumn(format!("gwp (row {index})")))?;
            let numeric = gwp.as_f64().ok_or_else(|| {
                RecalcError::InvalidData(format!("non-numeric gwp {gwp:?} in row {index}"))
            })?;
            *gwp = CellValue::Number(numeric);

            for value in row.values_mut() {
                if value.is_blank() {
                    *value = CellValue::Cleared;
                }
            }

            if !unused.is_empty() {
                let mut still_unused = Vec::with_capacity(unused.len());
                for column in unused {
                    let value = row.get(column.as_str()).ok_or_else(|| {
                        RecalcError::MissingColumn(format!("{column} (row {index})"))
                    })?;
                    if value.is_cleared() {
                        still_unused.push(column);
                    }
                }
                unused = still_unused;
            }
        }

        Ok(unused.into_iter().cloned().collect())
    }

    /// Force `columns` to [`CellValue::Cleared`] in every row.
    pub fn clear_unused_columns(&mut self, columns: &[String]) -> Result<()> {
        let role = self.role;
        let rows = self.landscape_rows_mut("clear columns")?;
        info!(role = %role, ?columns, "clearing unused columns");
        for row in rows.iter_mut() {
            for column in columns {
                row.insert(column.clone(), CellValue::Cleared);
            }
        }
        Ok(())
    }

    /// Landscape → portrait over this dataset's time series, keeping only the
    /// emissions-key columns.
    pub fn convert_data_to_portrait(&mut self) -> Result<()> {
        let DatasetData::Landscape(rows) = &self.data else {
            return Err(self.invalid_state("convert to portrait"));
        };
        let omitted_columns: Vec<String> = rows
            .first()
            .map(|row| {
                row.keys()
                    .filter(|c| !emissions_key::contains(c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let portrait = transform::landscape_to_portrait(rows, &self.time_series(), &omitted_columns)?;
        if let Some(first) = portrait.first() {
            debug!(role = %self.role, row = ?first, "portrait data form");
        }
        self.data = DatasetData::Portrait(portrait);
        Ok(())
    }

    /// Portrait → tabular. Quantities that do not parse as numbers become 0.
    pub fn convert_data_to_dataframe(&mut self) -> Result<()> {
        let DatasetData::Portrait(rows) = &self.data else {
            return Err(self.invalid_state("convert to a dataframe"));
        };

        let mut columns: Vec<Column> = Vec::with_capacity(emissions_key::ALL.len() + 2);
        for name in emissions_key::ALL {
            let values = rows
                .iter()
                .enumerate()
                .map(|(index, row)| {
                    row.get(name)
                        .map(CellValue::to_frame_text)
                        .ok_or_else(|| RecalcError::MissingColumn(format!("{name} (row {index})")))
                })
                .collect::<Result<Vec<Option<String>>>>()?;
            columns.push(Column::new(name.into(), values));
        }

        let years = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                row.get(YEAR)
                    .and_then(CellValue::as_f64)
                    .map(|y| y as i32)
                    .ok_or_else(|| RecalcError::InvalidData(format!("row {index} has no year")))
            })
            .collect::<Result<Vec<i32>>>()?;
        columns.push(Column::new(YEAR.into(), years));

        let quantities: Vec<Option<String>> = rows
            .iter()
            .map(|row| row.get(WEIGHTED_QUANTITY).and_then(CellValue::to_frame_text))
            .collect();
        columns.push(Column::new(WEIGHTED_QUANTITY.into(), quantities));

        let frame = DataFrame::new(columns)?
            .lazy()
            .with_columns([col(WEIGHTED_QUANTITY)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Float64)
                .fill_null(lit(0.0))])
            .collect()?;

        self.data = DatasetData::Tabular(frame);
        Ok(())
    }

    fn landscape_rows_mut(&mut self, operation: &'static str) -> Result<&mut Vec<Record>> {
        let mode = self.mode();
        match &mut self.data {
            DatasetData::Landscape(rows) => Ok(rows),
            _ => Err(RecalcError::InvalidState {
                operation,
                mode: mode.name(),
            }),
        }
    }

    fn invalid_state(&self, operation: &'static str) -> RecalcError {
        RecalcError::InvalidState {
            operation,
            mode: self.mode().name(),
        }
    }
}

/// `PY2024National` → 2024 (characters 2..6).
fn parse_reporting_year(year_layer_key: &str) -> Result<i32> {
    year_layer_key
        .get(2..6)
        .filter(|digits| digits.chars().all(|c| c.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| RecalcError::InvalidYearLayerKey(year_layer_key.to_string()))
}

// ── Column recovery ─────────────────────────────────────────────────────────

fn insert_missing_geo_ref_column(
    rows: &mut [Record],
    _reporting_year: i32,
    _lookup: &dyn ReferenceLookup,
) -> Result<()> {
    if rows.first().is_some_and(|r| r.contains_key(emissions_key::GEO_REF)) {
        info!("geo_ref is already present in this dataset, skipping insert operation");
        return Ok(());
    }
    for row in rows.iter_mut() {
        row.insert(emissions_key::GEO_REF.to_string(), CellValue::Null);
    }
    Ok(())
}

fn insert_missing_gwp_column(
    rows: &mut [Record],
    reporting_year: i32,
    lookup: &dyn ReferenceLookup,
) -> Result<()> {
    if rows.first().is_some_and(|r| r.contains_key(emissions_key::GWP)) {
        info!("gwp is already present in this dataset, skipping insert operation");
        return Ok(());
    }
    for (index, row) in rows.iter_mut().enumerate() {
        let ghg = ghg_name(row, index)?;
        let gwp = match lookup.gwp(reporting_year, &ghg) {
            Some(gwp) => gwp,
            None => {
                warn!(ghg = %ghg, "missing gwp value for chemical, assuming gwp of 1");
                1.0
            }
        };
        row.insert(emissions_key::GWP.to_string(), CellValue::Number(gwp));
    }
    Ok(())
}

fn insert_missing_ghg_category_column(
    rows: &mut [Record],
    _reporting_year: i32,
    lookup: &dyn ReferenceLookup,
) -> Result<()> {
    if rows
        .first()
        .is_some_and(|r| r.contains_key(emissions_key::GHG_CATEGORY))
    {
        info!("ghg_category is already present in this dataset, skipping insert operation");
        return Ok(());
    }
    for (index, row) in rows.iter_mut().enumerate() {
        let ghg = ghg_name(row, index)?;
        let category = match lookup.ghg_category(&ghg) {
            Some(category) => CellValue::Text(category),
            None => {
                warn!(ghg = %ghg, "missing ghg_category value for chemical, assuming its own name");
                CellValue::Text(ghg)
            }
        };
        row.insert(emissions_key::GHG_CATEGORY.to_string(), category);
    }
    Ok(())
}

fn ghg_name(row: &Record, index: usize) -> Result<String> {
    let ghg = row
        .get(emissions_key::GHG)
        .ok_or_else(|| RecalcError::MissingColumn(format!("ghg (row {index})")))?;
    Ok(ghg.to_frame_text().unwrap_or_default())
}
