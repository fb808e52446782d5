//! Baseline-versus-comparator recalculation over aggregation trees and raw rows.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregation::{build_aggregate_tree, build_raw, AggregateNode, RawGroup, RawRow};
use crate::config::EngineConfig;
use crate::error::{RecalcError, Result};
use crate::schema::time::EARLIEST_REPORTING_YEAR;

/// How a baseline value is compared against its comparator value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `baseline - comparator`.
    Difference,
    /// `(baseline - comparator) / comparator`, null when the comparator is zero.
    Percent,
}

impl FromStr for Operation {
    type Err = RecalcError;

    fn from_str(parameter: &str) -> Result<Self> {
        match parameter {
            "mmt" | "Difference" => Ok(Self::Difference),
            "percent" => Ok(Self::Percent),
            other => Err(RecalcError::Config(format!(
                "Invalid recalculation parameter: '{other}'. Must be 'mmt', 'Difference' or 'percent'"
            ))),
        }
    }
}

impl Operation {
    /// A null operand gives a null result.
    pub fn apply(self, baseline: Option<f64>, comparator: Option<f64>) -> Option<f64> {
        let (baseline, comparator) = (baseline?, comparator?);
        match self {
            Self::Difference => Some(baseline - comparator),
            Self::Percent if comparator == 0.0 => None,
            Self::Percent => Some((baseline - comparator) / comparator),
        }
    }
}

/// Aggregate tree and raw rows of one dataset, ready for comparison.
#[derive(Debug, Clone)]
pub struct RecalculationFrame {
    output_years: Vec<i32>,
    aggregate: Vec<AggregateNode>,
    raw: Vec<RawGroup>,
}

impl RecalculationFrame {
    pub fn new(
        frame: &DataFrame,
        grouping_columns: &[String],
        max_time_series: i32,
        output_years: Vec<i32>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let time_series_len =
            usize::try_from(max_time_series - EARLIEST_REPORTING_YEAR + 1).unwrap_or(0);
        let aggregate = build_aggregate_tree(frame, grouping_columns, &output_years, config)?;
        let raw = build_raw(
            frame,
            grouping_columns,
            time_series_len,
            config.raw_data_key_columns(),
        )?;
        Ok(Self {
            output_years,
            aggregate,
            raw,
        })
    }

    /// Compare this (baseline) tree against `comparator`'s.
    pub fn recalculate_aggregate(
        &self,
        comparator: &RecalculationFrame,
        operation: Operation,
    ) -> Result<Vec<AggregateNode>> {
        compare_trees(
            &self.aggregate,
            &comparator.aggregate,
            operation,
            &self.output_years,
        )
    }

    /// Compare this (baseline) frame's raw rows against `comparator`'s.
    pub fn recalculate_raw(
        &self,
        comparator: &RecalculationFrame,
        operation: Operation,
    ) -> Result<RawRecalculation> {
        compare_raw(&self.raw, &comparator.raw, operation, &self.output_years)
    }
}

/// Walk both trees in lockstep, matching siblings by name.
///
/// The result mirrors the baseline tree. Top-level nodes are matched but never
/// receive values. A baseline node without a comparator counterpart, and every
/// descendant of it, gets a null for each output year.
///
/// # Errors
///
/// [`RecalcError::MissingYear`] if a matched node below the top level lacks an
/// output year on either side. Nothing is returned in that case.
pub fn compare_trees(
    baseline: &[AggregateNode],
    comparator: &[AggregateNode],
    operation: Operation,
    output_years: &[i32],
) -> Result<Vec<AggregateNode>> {
    let started = Instant::now();
    let result = compare_level(baseline, comparator, operation, output_years, 0)?;
    debug!(elapsed = ?started.elapsed(), "aggregate trees compared");
    Ok(result)
}

fn compare_level(
    baseline: &[AggregateNode],
    comparator: &[AggregateNode],
    operation: Operation,
    output_years: &[i32],
    depth: usize,
) -> Result<Vec<AggregateNode>> {
    let mut layer = Vec::with_capacity(baseline.len());
    for node in baseline {
        let Some(other) = comparator.iter().find(|c| c.data.name == node.data.name) else {
            let mut unmatched = node.clone();
            clear_subtree(&mut unmatched, output_years, depth);
            layer.push(unmatched);
            continue;
        };

        let mut data = node.data.clone();
        if depth > 0 {
            for &year in output_years {
                let base = node.data.value(year).ok_or_else(|| RecalcError::MissingYear {
                    key: node.key.clone(),
                    year,
                })?;
                let compared = other.data.value(year).ok_or_else(|| RecalcError::MissingYear {
                    key: other.key.clone(),
                    year,
                })?;
                data.recalc.insert(year, operation.apply(base, compared));
            }
        }

        let children = if other.children.is_empty() {
            let mut children = node.children.clone();
            for child in &mut children {
                clear_subtree(child, output_years, depth + 1);
            }
            children
        } else {
            compare_level(
                &node.children,
                &other.children,
                operation,
                output_years,
                depth + 1,
            )?
        };

        layer.push(AggregateNode {
            key: node.key.clone(),
            data,
            children,
        });
    }
    Ok(layer)
}

/// Null every output year of `node` and its descendants; top-level nodes stay bare.
fn clear_subtree(node: &mut AggregateNode, output_years: &[i32], depth: usize) {
    if depth > 0 {
        for &year in output_years {
            node.data.recalc.insert(year, None);
        }
    }
    for child in &mut node.children {
        clear_subtree(child, output_years, depth + 1);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RawMatchStats {
    pub matches: usize,
    pub non_matches: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRecalculation {
    pub groups: Vec<RawGroup>,
    pub stats: RawMatchStats,
}

/// Match baseline raw rows to comparator rows by `raw_data_key`.
///
/// When several comparator rows share a key, the last one wins.
pub fn compare_raw(
    baseline: &[RawGroup],
    comparator: &[RawGroup],
    operation: Operation,
    output_years: &[i32],
) -> Result<RawRecalculation> {
    let by_key: HashMap<&str, &RawRow> = comparator
        .iter()
        .flat_map(|group| &group.data)
        .map(|row| (row.raw_data_key.as_str(), row))
        .collect();
    debug!(raw_data_keys = by_key.len(), "comparator raw key map built");

    let mut stats = RawMatchStats::default();
    let mut groups = Vec::with_capacity(baseline.len());
    for group in baseline {
        let mut rows = Vec::with_capacity(group.data.len());
        for row in &group.data {
            let mut recalculated = row.clone();
            match by_key.get(row.raw_data_key.as_str()) {
                Some(other) => {
                    stats.matches += 1;
                    for &year in output_years {
                        let base = raw_quantity(row, year)?;
                        let compared = raw_quantity(other, year)?;
                        recalculated
                            .recalc
                            .insert(year, operation.apply(Some(base), Some(compared)));
                    }
                }
                None => {
                    stats.non_matches += 1;
                    for &year in output_years {
                        recalculated.recalc.insert(year, None);
                    }
                }
            }
            rows.push(recalculated);
        }
        groups.push(RawGroup {
            key: group.key.clone(),
            data: rows,
        });
    }

    info!(
        matches = stats.matches,
        non_matches = stats.non_matches,
        "raw key matching finished"
    );
    Ok(RawRecalculation { groups, stats })
}

fn raw_quantity(row: &RawRow, year: i32) -> Result<f64> {
    row.quantities
        .get(&year)
        .copied()
        .ok_or_else(|| RecalcError::MissingYear {
            key: row.raw_data_key.clone(),
            year,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{NodeData, YearValues};
    use std::collections::BTreeMap;

    fn node(key: &str, recalc: &[(i32, f64)], children: Vec<AggregateNode>) -> AggregateNode {
        let name = key.rsplit('/').next().unwrap_or(key).to_string();
        AggregateNode {
            key: key.to_string(),
            data: NodeData {
                name,
                recalc: recalc.iter().map(|&(y, v)| (y, Some(v))).collect(),
            },
            children,
        }
    }

    fn raw_row(raw_data_key: &str, quantities: &[(i32, f64)]) -> RawRow {
        RawRow {
            emissions_key: format!("ek-{raw_data_key}"),
            raw_data_key: raw_data_key.to_string(),
            key_values: Vec::new(),
            quantities: quantities.iter().copied().collect::<BTreeMap<_, _>>(),
            recalc: YearValues::new(),
        }
    }

    #[test]
    fn operation_parameters() {
        assert_eq!("mmt".parse::<Operation>().unwrap(), Operation::Difference);
        assert_eq!("Difference".parse::<Operation>().unwrap(), Operation::Difference);
        assert_eq!("percent".parse::<Operation>().unwrap(), Operation::Percent);
        assert!("ratio".parse::<Operation>().is_err());
    }

    #[test]
    fn percent_by_zero_is_null() {
        assert_eq!(Operation::Percent.apply(Some(5.0), Some(0.0)), None);
        assert_eq!(Operation::Difference.apply(Some(5.0), Some(0.0)), Some(5.0));
        assert_eq!(Operation::Percent.apply(Some(15.0), Some(10.0)), Some(0.5));
        assert_eq!(Operation::Difference.apply(None, Some(1.0)), None);
    }

    #[test]
    fn matched_children_are_diffed_and_roots_stay_bare() {
        let baseline = vec![node("CO2", &[], vec![node("CO2/Energy", &[(1990, 100.0)], vec![])])];
        let comparator = vec![node("CO2", &[], vec![node("CO2/Energy", &[(1990, 80.0)], vec![])])];

        let result = compare_trees(&baseline, &comparator, Operation::Difference, &[1990]).unwrap();
        assert!(result[0].data.recalc.is_empty());
        assert_eq!(result[0].children[0].data.value(1990), Some(Some(20.0)));
    }

    #[test]
    fn unmatched_branch_is_nulled_at_every_level() {
        let baseline = vec![node(
            "CO2",
            &[],
            vec![node(
                "CO2/Energy",
                &[(1990, 1.0)],
                vec![node(
                    "CO2/Energy/Coal",
                    &[(1990, 1.0)],
                    vec![node("CO2/Energy/Coal/Lignite", &[(1990, 1.0)], vec![])],
                )],
            )],
        )];
        let comparator = vec![node("CO2", &[], vec![node("CO2/Waste", &[(1990, 1.0)], vec![])])];

        let result = compare_trees(&baseline, &comparator, Operation::Difference, &[1990]).unwrap();
        let energy = &result[0].children[0];
        assert_eq!(energy.data.value(1990), Some(None));
        assert_eq!(energy.children[0].data.value(1990), Some(None));
        assert_eq!(energy.children[0].children[0].data.value(1990), Some(None));
    }

    #[test]
    fn unmatched_root_keeps_no_values() {
        let baseline = vec![node("CH4", &[], vec![node("CH4/Energy", &[(1990, 1.0)], vec![])])];
        let comparator = vec![node("CO2", &[], vec![])];

        let result = compare_trees(&baseline, &comparator, Operation::Percent, &[1990]).unwrap();
        assert!(result[0].data.recalc.is_empty());
        assert_eq!(result[0].children[0].data.value(1990), Some(None));
    }

    #[test]
    fn childless_comparator_nulls_baseline_descendants() {
        let baseline = vec![node(
            "CO2",
            &[],
            vec![node(
                "CO2/Energy",
                &[(1990, 3.0)],
                vec![node("CO2/Energy/Coal", &[(1990, 3.0)], vec![])],
            )],
        )];
        let comparator = vec![node("CO2", &[], vec![node("CO2/Energy", &[(1990, 1.0)], vec![])])];

        let result = compare_trees(&baseline, &comparator, Operation::Difference, &[1990]).unwrap();
        let energy = &result[0].children[0];
        assert_eq!(energy.data.value(1990), Some(Some(2.0)));
        assert_eq!(energy.children[0].data.value(1990), Some(None));
    }

    #[test]
    fn missing_year_aborts_comparison() {
        let baseline = vec![node("CO2", &[], vec![node("CO2/Energy", &[(1990, 1.0)], vec![])])];
        let comparator = vec![node("CO2", &[], vec![node("CO2/Energy", &[(1990, 1.0)], vec![])])];

        match compare_trees(&baseline, &comparator, Operation::Difference, &[1990, 1991]) {
            Err(RecalcError::MissingYear { key, year }) => {
                assert_eq!(key, "CO2/Energy");
                assert_eq!(year, 1991);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn raw_rows_match_by_raw_data_key() {
        let baseline = vec![RawGroup {
            key: "CO2/Energy".into(),
            data: vec![raw_row("a", &[(1990, 10.0)]), raw_row("b", &[(1990, 4.0)])],
        }];
        let comparator = vec![RawGroup {
            key: "CO2/Energy".into(),
            data: vec![raw_row("a", &[(1990, 8.0)])],
        }];

        let result = compare_raw(&baseline, &comparator, Operation::Percent, &[1990]).unwrap();
        assert_eq!(
            result.stats,
            RawMatchStats {
                matches: 1,
                non_matches: 1
            }
        );
        let rows = &result.groups[0].data;
        assert_eq!(rows[0].recalc.get(&1990), Some(&Some(0.25)));
        assert_eq!(rows[1].recalc.get(&1990), Some(&None));
    }

    #[test]
    fn raw_missing_year_is_an_error() {
        let baseline = vec![RawGroup {
            key: "CO2".into(),
            data: vec![raw_row("a", &[(1990, 10.0)])],
        }];
        let comparator = vec![RawGroup {
            key: "CO2".into(),
            data: vec![raw_row("a", &[(1991, 8.0)])],
        }];
        assert!(matches!(
            compare_raw(&baseline, &comparator, Operation::Difference, &[1990]),
            Err(RecalcError::MissingYear { year: 1990, .. })
        ));
    }
}
