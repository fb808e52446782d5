use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{RecalcError, Result};

/// Reference data the datasets consult while recovering missing columns.
///
/// Implementations are handed to the engine explicitly; nothing in the crate
/// caches reference tables globally.
pub trait ReferenceLookup {
    /// Last year of the published time series for a reporting year.
    fn max_time_series(&self, reporting_year: i32) -> Result<i32>;

    /// Global-warming potential of a GHG under the reporting year's GWP set.
    fn gwp(&self, reporting_year: i32, ghg: &str) -> Option<f64>;

    /// GHG category a GHG belongs to.
    fn ghg_category(&self, ghg: &str) -> Option<String>;
}

/// In-memory lookup tables, typically loaded from a `lookups.json` document:
///
/// ```json
/// {
///   "maxTimeSeries": {"2024": 2022},
///   "gwp": {"2024": {"CH4": 28.0}},
///   "ghgCategories": {"HFC-23": "HFCs"}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticLookup {
    #[serde(default)]
    max_time_series: HashMap<i32, i32>,
    #[serde(default)]
    gwp: HashMap<i32, HashMap<String, f64>>,
    #[serde(default)]
    ghg_categories: HashMap<String, String>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn with_max_time_series(mut self, reporting_year: i32, max_time_series: i32) -> Self {
        self.max_time_series.insert(reporting_year, max_time_series);
        self
    }

    #[must_use]
    pub fn with_gwp(mut self, reporting_year: i32, ghg: impl Into<String>, gwp: f64) -> Self {
        self.gwp
            .entry(reporting_year)
            .or_default()
            .insert(ghg.into(), gwp);
        self
    }

    #[must_use]
    pub fn with_ghg_category(mut self, ghg: impl Into<String>, category: impl Into<String>) -> Self {
        self.ghg_categories.insert(ghg.into(), category.into());
        self
    }
}

impl ReferenceLookup for StaticLookup {
    fn max_time_series(&self, reporting_year: i32) -> Result<i32> {
        self.max_time_series
            .get(&reporting_year)
            .copied()
            .ok_or_else(|| {
                RecalcError::Config(format!(
                    "no max time series known for reporting year {reporting_year}"
                ))
            })
    }

    fn gwp(&self, reporting_year: i32, ghg: &str) -> Option<f64> {
        self.gwp.get(&reporting_year)?.get(ghg).copied()
    }

    fn ghg_category(&self, ghg: &str) -> Option<String> {
        self.ghg_categories.get(ghg).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lookups_document() {
        let lookup = StaticLookup::from_json(
            r#"{
                "maxTimeSeries": {"2024": 2022},
                "gwp": {"2024": {"CH4": 28.0}},
                "ghgCategories": {"HFC-23": "HFCs"}
            }"#,
        )
        .unwrap();

        assert_eq!(lookup.max_time_series(2024).unwrap(), 2022);
        assert_eq!(lookup.gwp(2024, "CH4"), Some(28.0));
        assert_eq!(lookup.gwp(2023, "CH4"), None);
        assert_eq!(lookup.ghg_category("HFC-23").as_deref(), Some("HFCs"));
    }

    #[test]
    fn unknown_reporting_year_is_a_configuration_error() {
        let err = StaticLookup::new().max_time_series(2030).unwrap_err();
        assert!(err.is_configuration());
    }
}
