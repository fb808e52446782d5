//! Landscape (one column per year) and portrait (one row per year) reshaping.
//!
//! Both directions are pure. Asking for the shape the rows are already in
//! only reorders columns.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::error::{RecalcError, Result};
use crate::hashing::{tuple_digest, KeyPart};
use crate::schema::time::{WEIGHTED_QUANTITY, YEAR, YEAR_PREFIX};
use crate::value::{CellValue, Record};

/// `Y<year>` column name.
pub fn year_column(year: i32) -> String {
    format!("{YEAR_PREFIX}{year}")
}

/// Year of a `Y<year>` column name.
pub fn parse_year_column(column: &str) -> Option<i32> {
    let digits = column.strip_prefix(YEAR_PREFIX)?;
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

pub fn is_portrait(rows: &[Record]) -> bool {
    rows.first().is_some_and(|row| row.contains_key(YEAR))
}

pub fn is_landscape(rows: &[Record]) -> bool {
    rows.first()
        .is_some_and(|row| row.keys().any(|c| parse_year_column(c).is_some()))
}

/// Explode each row into one row per year of `time_series`.
///
/// Columns listed in `omitted_columns` are dropped. A row without a given
/// year column gets a null quantity for that year.
pub fn landscape_to_portrait(
    rows: &[Record],
    time_series: &[i32],
    omitted_columns: &[String],
) -> Result<Vec<Record>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    if is_portrait(rows) {
        return Ok(order_portrait_columns(rows));
    }

    let year_columns: Vec<String> = time_series.iter().map(|&y| year_column(y)).collect();
    let key_columns: Vec<&String> = first
        .keys()
        .filter(|c| !year_columns.contains(c) && !omitted_columns.contains(c))
        .collect();

    let mut portrait = Vec::with_capacity(rows.len() * time_series.len());
    for (index, row) in rows.iter().enumerate() {
        let mut base = Record::with_capacity(key_columns.len() + 2);
        for &column in &key_columns {
            let value = row.get(column).ok_or_else(|| {
                RecalcError::MissingColumn(format!("{column} (row {index})"))
            })?;
            base.insert(column.clone(), value.clone());
        }
        for (&year, column) in time_series.iter().zip(&year_columns) {
            let mut current = base.clone();
            current.insert(YEAR.to_string(), CellValue::Number(f64::from(year)));
            current.insert(
                WEIGHTED_QUANTITY.to_string(),
                row.get(column).cloned().unwrap_or(CellValue::Null),
            );
            portrait.push(current);
        }
    }
    Ok(portrait)
}

/// Collapse portrait rows sharing the same non-year content into one row with
/// a `Y<year>` column per year of `time_series`. Output follows first-seen order.
pub fn portrait_to_landscape(rows: &[Record], time_series: &[i32]) -> Result<Vec<Record>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    if !is_portrait(rows) && is_landscape(rows) {
        return Ok(order_landscape_columns(rows, time_series));
    }
    if !first.contains_key(YEAR) || !first.contains_key(WEIGHTED_QUANTITY) {
        return Err(RecalcError::InvalidData(format!(
            "portrait rows need '{YEAR}' and '{WEIGHTED_QUANTITY}' columns"
        )));
    }

    let mut transposed: IndexMap<String, (Record, BTreeMap<i32, CellValue>)> = IndexMap::new();
    for (index, row) in rows.iter().enumerate() {
        let year = row
            .get(YEAR)
            .and_then(CellValue::as_f64)
            .ok_or_else(|| RecalcError::InvalidData(format!("row {index} has no numeric year")))?
            as i32;
        let quantity = row.get(WEIGHTED_QUANTITY).cloned().unwrap_or(CellValue::Null);

        let base: Record = row
            .iter()
            .filter(|(c, _)| c.as_str() != YEAR && c.as_str() != WEIGHTED_QUANTITY)
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect();
        let parts: Vec<KeyPart<'_>> = base.values().map(KeyPart::from_cell).collect();
        let content_key = tuple_digest(&parts);

        transposed
            .entry(content_key)
            .or_insert_with(|| (base, BTreeMap::new()))
            .1
            .insert(year, quantity);
    }

    Ok(transposed
        .into_values()
        .map(|(mut base, years)| {
            for &year in time_series {
                base.insert(
                    year_column(year),
                    years.get(&year).cloned().unwrap_or(CellValue::Null),
                );
            }
            base
        })
        .collect())
}

fn order_portrait_columns(rows: &[Record]) -> Vec<Record> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let mut order: Vec<&String> = first
        .keys()
        .filter(|c| c.as_str() != YEAR && c.as_str() != WEIGHTED_QUANTITY)
        .collect();
    let year = YEAR.to_string();
    let quantity = WEIGHTED_QUANTITY.to_string();
    order.push(&year);
    order.push(&quantity);
    reorder(rows, &order)
}

fn order_landscape_columns(rows: &[Record], time_series: &[i32]) -> Vec<Record> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let year_columns: Vec<String> = time_series.iter().map(|&y| year_column(y)).collect();
    let mut order: Vec<&String> = first
        .keys()
        .filter(|c| parse_year_column(c).is_none())
        .collect();
    order.extend(year_columns.iter());
    reorder(rows, &order)
}

fn reorder(rows: &[Record], order: &[&String]) -> Vec<Record> {
    rows.iter()
        .map(|row| {
            let mut ordered: Record = order
                .iter()
                .map(|&c| (c.clone(), row.get(c).cloned().unwrap_or(CellValue::Null)))
                .collect();
            // Columns outside the first row's layout are kept at the end.
            for (c, v) in row {
                if !ordered.contains_key(c) {
                    ordered.insert(c.clone(), v.clone());
                }
            }
            ordered
        })
        .collect()
}
