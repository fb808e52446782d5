//! Recalculation event metadata and engine configuration.

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetRole;
use crate::error::{RecalcError, Result};
use crate::recalculation::Operation;
use crate::schema::emissions_key;

/// Top-level grouping lens chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhgOption {
    Ghg,
    GhgCategory,
}

impl GhgOption {
    /// Front ends send `ghg`, `ghgCategory`, `ghg_category`, ...; anything
    /// mentioning "category" selects the category lens.
    pub fn parse(option: &str) -> Self {
        if option.to_lowercase().contains("category") {
            Self::GhgCategory
        } else {
            Self::Ghg
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Ghg => emissions_key::GHG,
            Self::GhgCategory => emissions_key::GHG_CATEGORY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationSettings {
    pub output_years: Vec<i32>,
    pub parameter: String,
}

/// The `metadata.json` document describing one recalculation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcMetadata {
    #[serde(default)]
    pub baseline_obj_name: Option<String>,
    #[serde(default)]
    pub baseline_year_layer_key: Option<String>,
    #[serde(default)]
    pub comparator_obj_name: Option<String>,
    #[serde(default)]
    pub comparator_year_layer_key: Option<String>,
    pub ghg_option: String,
    #[serde(default)]
    pub columns: Vec<String>,
    pub recalculations: RecalculationSettings,
}

/// Name and year-layer key of one side of the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetInfo<'a> {
    pub obj_name: &'a str,
    pub year_layer_key: &'a str,
}

impl RecalcMetadata {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn dataset_info(&self, role: DatasetRole) -> Result<DatasetInfo<'_>> {
        let (obj_name, year_layer_key) = match role {
            DatasetRole::Baseline => (&self.baseline_obj_name, &self.baseline_year_layer_key),
            DatasetRole::Comparator => {
                (&self.comparator_obj_name, &self.comparator_year_layer_key)
            }
        };
        let prefix = role.prefix();
        Ok(DatasetInfo {
            obj_name: obj_name
                .as_deref()
                .ok_or_else(|| RecalcError::MissingMetadata(format!("{prefix}ObjName")))?,
            year_layer_key: year_layer_key
                .as_deref()
                .ok_or_else(|| RecalcError::MissingMetadata(format!("{prefix}YearLayerKey")))?,
        })
    }

    pub fn ghg_option(&self) -> GhgOption {
        GhgOption::parse(&self.ghg_option)
    }

    /// User-selected columns with `sub_category_fuel_1` split into
    /// `sub_category_1` and `fuel1`.
    pub fn expanded_columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        for column in &self.columns {
            if column == emissions_key::SUB_CATEGORY_FUEL_1 {
                columns.push(emissions_key::SUB_CATEGORY_1.to_string());
                columns.push(emissions_key::FUEL1.to_string());
            } else {
                columns.push(column.clone());
            }
        }
        columns
    }

    /// Ordered tree levels: the ghg lens first, then the expanded columns.
    pub fn grouping_columns(&self) -> Result<Vec<String>> {
        let mut grouping = vec![self.ghg_option().column().to_string()];
        grouping.extend(self.expanded_columns());
        for column in &grouping {
            if !emissions_key::contains(column) {
                return Err(RecalcError::Config(format!(
                    "grouping column '{column}' is not an emissions-key column"
                )));
            }
        }
        Ok(grouping)
    }

    pub fn operation(&self) -> Result<Operation> {
        self.recalculations.parameter.parse()
    }

    pub fn output_years(&self) -> &[i32] {
        &self.recalculations.output_years
    }
}

/// Column sets the engine treats specially.
///
/// # Defaults
///
/// | Parameter              | Default |
/// |------------------------|---------|
/// | `filter_by_columns`    | `ghg`, `ghg_category` |
/// | `raw_data_key_columns` | the twelve identifying emissions-key columns |
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub(crate) filter_by_columns: Vec<String>,
    pub(crate) raw_data_key_columns: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            filter_by_columns: to_strings(&emissions_key::DEFAULT_FILTER_BY),
            raw_data_key_columns: to_strings(&emissions_key::DEFAULT_RAW_DATA_KEY),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the grouping columns that never carry recalculated values.
    #[must_use]
    pub fn with_filter_by_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_by_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the columns hashed into `raw_data_key` for row-level matching.
    #[must_use]
    pub fn with_raw_data_key_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_data_key_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter_by_columns(&self) -> &[String] {
        &self.filter_by_columns
    }

    pub fn raw_data_key_columns(&self) -> &[String] {
        &self.raw_data_key_columns
    }

    pub fn is_filter_by(&self, column: &str) -> bool {
        self.filter_by_columns.iter().any(|c| c == column)
    }

    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RecalcError::Config`] | raw-data-key set is empty or names a non-key column |
    pub fn validate(&self) -> Result<()> {
        if self.raw_data_key_columns.is_empty() {
            return Err(RecalcError::Config(
                "raw data key column set is empty".to_string(),
            ));
        }
        for column in &self.raw_data_key_columns {
            if !emissions_key::contains(column) {
                return Err(RecalcError::Config(format!(
                    "raw data key column '{column}' is not an emissions-key column"
                )));
            }
        }
        Ok(())
    }
}

fn to_strings(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}
