use std::collections::BTreeMap;

use indexmap::IndexMap;
use polars::prelude::*;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{RecalcError, Result};
use crate::hashing::{tuple_digest, KeyPart};
use crate::schema::dataset::NULL_SENTINEL;
use crate::schema::emissions_key;
use crate::schema::output::{CHILDREN, DATA, EMISSIONS_KEY, KEY, NAME, RAW_DATA_KEY, RECALC_PREFIX};
use crate::schema::time::{WEIGHTED_QUANTITY, YEAR};
use crate::transform::year_column;

/// Per-year values of one tree node or raw row. `None` means "no comparable value".
pub type YearValues = BTreeMap<i32, Option<f64>>;

/// `data` payload of an aggregation-tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub name: String,
    pub recalc: YearValues,
}

impl NodeData {
    /// `None` when the node carries no entry for `year` at all.
    pub fn value(&self, year: i32) -> Option<Option<f64>> {
        self.recalc.get(&year).copied()
    }
}

impl Serialize for NodeData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.recalc.len()))?;
        map.serialize_entry(NAME, &self.name)?;
        for (year, value) in &self.recalc {
            map.serialize_entry(&format!("{RECALC_PREFIX}{year}"), value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub key: String,
    pub data: NodeData,
    pub children: Vec<AggregateNode>,
}

/// Leaves are written without a `children` entry.
impl Serialize for AggregateNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.children.is_empty() { 2 } else { 3 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(KEY, &self.key)?;
        map.serialize_entry(DATA, &self.data)?;
        if !self.children.is_empty() {
            map.serialize_entry(CHILDREN, &self.children)?;
        }
        map.end()
    }
}

impl AggregateNode {
    /// Depth-first search by slash-joined key.
    pub fn find(&self, key: &str) -> Option<&AggregateNode> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(key))
    }

    /// Longest root-to-leaf path, counting this node.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Self::depth).max().unwrap_or(0)
    }
}

/// Build the aggregation tree, one level per grouping column.
///
/// Nodes on a filter-by level carry only their name. Every other node sums
/// `weighted_quantity` per year, for the output years present in its rows.
pub fn build_aggregate_tree(
    frame: &DataFrame,
    grouping_columns: &[String],
    output_years: &[i32],
    config: &EngineConfig,
) -> Result<Vec<AggregateNode>> {
    build_level(frame, grouping_columns, "", output_years, config)
}

fn build_level(
    frame: &DataFrame,
    grouping_columns: &[String],
    parent_key: &str,
    output_years: &[i32],
    config: &EngineConfig,
) -> Result<Vec<AggregateNode>> {
    let Some((column, rest)) = grouping_columns.split_first() else {
        return Ok(Vec::new());
    };
    if frame.height() == 0 {
        return Ok(Vec::new());
    }

    let groups = frame.partition_by_stable([column.as_str()], true)?;
    let mut nodes = Vec::with_capacity(groups.len());
    for group in &groups {
        let name = first_text(group, column)?;
        let key = format!("{parent_key}/{name}").trim_matches('/').to_string();
        let recalc = if config.is_filter_by(column) {
            YearValues::new()
        } else {
            sum_by_year(group, output_years)?
                .into_iter()
                .map(|(year, total)| (year, Some(total)))
                .collect()
        };
        let children = build_level(group, rest, &key, output_years, config)?;
        nodes.push(AggregateNode {
            key,
            data: NodeData { name, recalc },
            children,
        });
    }
    Ok(nodes)
}

fn sum_by_year(group: &DataFrame, output_years: &[i32]) -> Result<BTreeMap<i32, f64>> {
    let years = group.column(YEAR)?.as_materialized_series().i32()?;
    let quantities = group
        .column(WEIGHTED_QUANTITY)?
        .as_materialized_series()
        .f64()?;

    let mut totals = BTreeMap::new();
    for (year, quantity) in years.into_iter().zip(quantities.into_iter()) {
        let Some(year) = year else { continue };
        if output_years.contains(&year) {
            *totals.entry(year).or_insert(0.0) += quantity.unwrap_or(0.0);
        }
    }
    Ok(totals)
}

/// Name of the group in `column`, taken from its first row.
fn first_text(group: &DataFrame, column: &str) -> Result<String> {
    Ok(group
        .column(column)?
        .as_materialized_series()
        .str()?
        .get(0)
        .unwrap_or(NULL_SENTINEL)
        .to_string())
}

// ── Raw rows ────────────────────────────────────────────────────────────────

/// One emissions-key row with its full time series.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub emissions_key: String,
    pub raw_data_key: String,
    /// Values of the emissions-key columns, aligned with [`emissions_key::ALL`].
    pub key_values: Vec<Option<String>>,
    pub quantities: BTreeMap<i32, f64>,
    pub recalc: YearValues,
}

impl RawRow {
    pub fn key_value(&self, column: &str) -> Option<&str> {
        let index = emissions_key::ALL.iter().position(|c| *c == column)?;
        self.key_values.get(index)?.as_deref()
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(EMISSIONS_KEY, &self.emissions_key)?;
        map.serialize_entry(RAW_DATA_KEY, &self.raw_data_key)?;
        for (column, value) in emissions_key::ALL.iter().zip(&self.key_values) {
            match value.as_deref() {
                Some(gwp) if *column == emissions_key::GWP => match gwp.trim().parse::<f64>() {
                    Ok(number) => map.serialize_entry(column, &number)?,
                    Err(_) => map.serialize_entry(column, gwp)?,
                },
                other => map.serialize_entry(column, &other)?,
            }
        }
        for (year, quantity) in &self.quantities {
            map.serialize_entry(&year_column(*year), quantity)?;
        }
        for (year, value) in &self.recalc {
            map.serialize_entry(&format!("{RECALC_PREFIX}{year}"), value)?;
        }
        map.end()
    }
}

/// Raw rows filed under the aggregation key of their grouping values.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGroup {
    pub key: String,
    pub data: Vec<RawRow>,
}

impl Serialize for RawGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(KEY, &self.key)?;
        map.serialize_entry(DATA, &self.data)?;
        map.end()
    }
}

/// Group the frame by the full emissions key and file each key's row under
/// the slash-joined values of its grouping columns.
///
/// A key with more rows than `time_series_len` came from duplicated landscape
/// rows; its quantities are summed per year.
pub fn build_raw(
    frame: &DataFrame,
    grouping_columns: &[String],
    time_series_len: usize,
    raw_data_key_columns: &[String],
) -> Result<Vec<RawGroup>> {
    if frame.height() == 0 {
        return Ok(Vec::new());
    }

    let groups = frame.partition_by_stable(emissions_key::ALL, true)?;
    let mut filed: IndexMap<String, Vec<RawRow>> = IndexMap::new();
    let mut keys_with_multiple_rows = 0usize;

    for group in &groups {
        let key_values = emissions_key::ALL
            .iter()
            .map(|column| first_value(group, column))
            .collect::<Result<Vec<_>>>()?;

        let collapse = group.height() > time_series_len;
        if collapse {
            keys_with_multiple_rows += 1;
        }
        let quantities = year_quantities(group, collapse)?;

        let emissions_parts = emissions_key::ALL
            .iter()
            .zip(&key_values)
            .map(|(column, value)| key_part(column, value.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        let raw_parts = raw_data_key_columns
            .iter()
            .map(|column| {
                let index = emissions_key::ALL
                    .iter()
                    .position(|c| *c == column.as_str())
                    .ok_or_else(|| RecalcError::MissingColumn(column.clone()))?;
                key_part(column, key_values[index].as_deref())
            })
            .collect::<Result<Vec<_>>>()?;

        let aggregate_key = grouping_columns
            .iter()
            .map(|column| first_text(group, column))
            .collect::<Result<Vec<_>>>()?
            .join("/");

        let emissions_key = tuple_digest(&emissions_parts);
        let raw_data_key = tuple_digest(&raw_parts);
        let row = RawRow {
            emissions_key,
            raw_data_key,
            key_values,
            quantities,
            recalc: YearValues::new(),
        };
        filed.entry(aggregate_key).or_default().push(row);
    }

    info!(
        input_rows = frame.height(),
        keys = groups.len(),
        keys_with_multiple_rows,
        "raw data built"
    );

    Ok(filed
        .into_iter()
        .map(|(key, data)| RawGroup { key, data })
        .collect())
}

fn first_value(group: &DataFrame, column: &str) -> Result<Option<String>> {
    Ok(group
        .column(column)?
        .as_materialized_series()
        .str()?
        .get(0)
        .map(str::to_string))
}

/// Hash element for one key column; `gwp` always hashes as a float.
fn key_part<'a>(column: &str, value: Option<&'a str>) -> Result<KeyPart<'a>> {
    let part = KeyPart::from_frame_text(value);
    if column != emissions_key::GWP {
        return Ok(part);
    }
    match part {
        KeyPart::Text(text) => text
            .trim()
            .parse::<f64>()
            .map(KeyPart::Float)
            .map_err(|_| RecalcError::InvalidData(format!("non-numeric gwp '{text}' in key"))),
        other => Ok(other),
    }
}

fn year_quantities(group: &DataFrame, collapse: bool) -> Result<BTreeMap<i32, f64>> {
    let years = group.column(YEAR)?.as_materialized_series().i32()?;
    let quantities = group
        .column(WEIGHTED_QUANTITY)?
        .as_materialized_series()
        .f64()?;

    let mut by_year = BTreeMap::new();
    for (year, quantity) in years.into_iter().zip(quantities.into_iter()) {
        let Some(year) = year else { continue };
        let quantity = quantity.unwrap_or(0.0);
        if collapse {
            *by_year.entry(year).or_insert(0.0) += quantity;
        } else {
            by_year.insert(year, quantity);
        }
    }
    Ok(by_year)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row<'a> {
        ghg: &'a str,
        sector: &'a str,
        sub_category_5: &'a str,
        year: i32,
        quantity: f64,
    }

    fn row<'a>(ghg: &'a str, sector: &'a str, year: i32, quantity: f64) -> Row<'a> {
        Row {
            ghg,
            sector,
            sub_category_5: "null",
            year,
            quantity,
        }
    }

    fn frame(rows: &[Row<'_>]) -> DataFrame {
        let mut columns = Vec::new();
        for name in emissions_key::ALL {
            let values: Vec<String> = rows
                .iter()
                .map(|r| match name {
                    emissions_key::GHG | emissions_key::GHG_CATEGORY => r.ghg.to_string(),
                    emissions_key::SECTOR => r.sector.to_string(),
                    emissions_key::SUB_CATEGORY_5 => r.sub_category_5.to_string(),
                    emissions_key::GWP => "1".to_string(),
                    _ => NULL_SENTINEL.to_string(),
                })
                .collect();
            columns.push(Column::new(name.into(), values));
        }
        let years: Vec<i32> = rows.iter().map(|r| r.year).collect();
        let quantities: Vec<f64> = rows.iter().map(|r| r.quantity).collect();
        columns.push(Column::new(YEAR.into(), years));
        columns.push(Column::new(WEIGHTED_QUANTITY.into(), quantities));
        DataFrame::new(columns).unwrap()
    }

    fn grouping(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn tree_levels_follow_grouping_columns() {
        let df = frame(&[
            row("CO2", "Energy", 1990, 10.0),
            row("CO2", "Energy", 1991, 11.0),
            row("CO2", "Waste", 1990, 1.0),
            row("CO2", "Waste", 1991, 2.0),
            row("CH4", "Energy", 1990, 5.0),
            row("CH4", "Energy", 1991, 6.0),
        ]);
        let tree = build_aggregate_tree(
            &df,
            &grouping(&["ghg", "sector"]),
            &[1990, 1991],
            &EngineConfig::new(),
        )
        .unwrap();

        let names: Vec<&str> = tree.iter().map(|n| n.data.name.as_str()).collect();
        assert_eq!(names, vec!["CO2", "CH4"]);
        assert!(tree.iter().all(|n| n.data.recalc.is_empty()));
        assert!(tree.iter().all(|n| n.depth() == 2));

        let waste = tree[0].find("CO2/Waste").unwrap();
        assert_eq!(waste.data.value(1990), Some(Some(1.0)));
        assert_eq!(waste.data.value(1991), Some(Some(2.0)));
        assert!(waste.children.is_empty());
    }

    #[test]
    fn only_output_years_are_summed() {
        let df = frame(&[
            row("CO2", "Energy", 1990, 10.0),
            row("CO2", "Energy", 1990, 5.0),
            row("CO2", "Energy", 1991, 11.0),
        ]);
        let tree =
            build_aggregate_tree(&df, &grouping(&["ghg", "sector"]), &[1990], &EngineConfig::new())
                .unwrap();
        let energy = &tree[0].children[0];
        assert_eq!(energy.data.recalc.len(), 1);
        assert_eq!(energy.data.value(1990), Some(Some(15.0)));
    }

    #[test]
    fn filter_by_set_is_configurable() {
        let df = frame(&[row("CO2", "Energy", 1990, 10.0)]);
        let config = EngineConfig::new().with_filter_by_columns(Vec::<String>::new());
        let tree = build_aggregate_tree(&df, &grouping(&["ghg", "sector"]), &[1990], &config).unwrap();
        assert_eq!(tree[0].data.value(1990), Some(Some(10.0)));
    }

    #[test]
    fn serializes_recalc_keys_and_omits_empty_children() {
        let df = frame(&[row("CO2", "Energy", 1990, 10.0)]);
        let tree =
            build_aggregate_tree(&df, &grouping(&["ghg", "sector"]), &[1990], &EngineConfig::new())
                .unwrap();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "key": "CO2",
                "data": {"name": "CO2"},
                "children": [{
                    "key": "CO2/Energy",
                    "data": {"name": "Energy", "recalc_1990": 10.0}
                }]
            }])
        );
    }

    #[test]
    fn raw_rows_are_filed_under_aggregate_key() {
        let df = frame(&[
            row("CO2", "Energy", 1990, 10.0),
            row("CO2", "Energy", 1991, 11.0),
            row("CO2", "Waste", 1990, 1.0),
            row("CO2", "Waste", 1991, 2.0),
        ]);
        let raw = build_raw(
            &df,
            &grouping(&["ghg", "sector"]),
            2,
            &EngineConfig::new().raw_data_key_columns().to_vec(),
        )
        .unwrap();

        let keys: Vec<&str> = raw.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["CO2/Energy", "CO2/Waste"]);
        let energy = &raw[0].data[0];
        assert_eq!(energy.quantities.get(&1991), Some(&11.0));
        assert_eq!(energy.key_value("sector"), Some("Energy"));
        assert_ne!(energy.emissions_key, raw[1].data[0].emissions_key);
    }

    #[test]
    fn duplicated_keys_are_summed_per_year() {
        let df = frame(&[
            row("CO2", "Energy", 1990, 10.0),
            row("CO2", "Energy", 1991, 11.0),
            row("CO2", "Energy", 1990, 1.0),
            row("CO2", "Energy", 1991, 2.0),
        ]);
        let raw = build_raw(&df, &grouping(&["ghg"]), 2, &grouping(&["sector", "ghg"])).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].data.len(), 1);
        let quantities = &raw[0].data[0].quantities;
        assert_eq!(quantities.get(&1990), Some(&11.0));
        assert_eq!(quantities.get(&1991), Some(&13.0));
    }

    #[test]
    fn raw_data_key_ignores_columns_outside_its_set() {
        let mut described = row("CO2", "Energy", 1990, 10.0);
        described.sub_category_5 = "Described";
        let df = frame(&[row("CO2", "Energy", 1990, 10.0), described]);
        let raw = build_raw(
            &df,
            &grouping(&["ghg"]),
            1,
            &EngineConfig::new().raw_data_key_columns().to_vec(),
        )
        .unwrap();

        let rows = &raw[0].data;
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].emissions_key, rows[1].emissions_key);
        assert_eq!(rows[0].raw_data_key, rows[1].raw_data_key);
    }

    #[test]
    fn raw_row_serializes_gwp_as_number() {
        let df = frame(&[row("CO2", "Energy", 1990, 10.0)]);
        let raw = build_raw(&df, &grouping(&["ghg"]), 1, &grouping(&["ghg"])).unwrap();
        let json = serde_json::to_value(&raw[0].data[0]).unwrap();
        assert_eq!(json["gwp"], serde_json::json!(1.0));
        assert_eq!(json["sector"], serde_json::json!("Energy"));
        assert_eq!(json["Y1990"], serde_json::json!(10.0));
        assert_eq!(json["fuel1"], serde_json::json!("null"));
    }

    #[test]
    fn raw_group_serializes_through_output_keys() {
        let df = frame(&[row("CO2", "Energy", 1990, 10.0)]);
        let raw = build_raw(&df, &grouping(&["ghg"]), 1, &grouping(&["ghg"])).unwrap();
        let json = serde_json::to_value(&raw).unwrap();
        let group = json[0].as_object().unwrap();
        assert_eq!(group.keys().collect::<Vec<_>>(), [KEY, DATA]);
        assert_eq!(group[KEY], serde_json::json!("CO2"));
        // ('CO2',)
        assert_eq!(
            group[DATA][0][RAW_DATA_KEY],
            serde_json::json!("df8a28deb211972cbdb96c7ebaacda20")
        );
    }
}
