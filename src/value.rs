use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{RecalcError, Result};
use crate::schema::dataset::NULL_SENTINEL;

/// A single cell of a landscape or portrait row.
///
/// `Cleared` is the in-band marker grooming writes for "no meaningful value".
/// It is kept apart from `Null` so grouping and hashing see one stable
/// representative for blank cells on both sides of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Cleared,
    Text(String),
    Number(f64),
}

/// One row, in column-declaration order.
pub type Record = IndexMap<String, CellValue>;

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Null or empty text: the cells grooming clears.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self, Self::Cleared)
    }

    /// Numeric view of the cell; text is parsed after trimming.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Rendering used when the row is loaded into a string column.
    pub fn to_frame_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Cleared => Some(NULL_SENTINEL.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Bool(b) => Ok(Self::Text(b.to_string())),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| RecalcError::InvalidData(format!("unrepresentable number {n}"))),
            Value::Array(_) | Value::Object(_) => Err(RecalcError::InvalidData(format!(
                "nested value is not a valid cell: {value}"
            ))),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Cleared => serializer.serialize_str(NULL_SENTINEL),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Number(n) => serializer.serialize_f64(*n),
        }
    }
}

/// Convert a JSON object into a row, keeping field order.
pub fn record_from_json(value: &Value) -> Result<Record> {
    let object = value
        .as_object()
        .ok_or_else(|| RecalcError::InvalidData(format!("row is not an object: {value}")))?;
    object
        .iter()
        .map(|(column, cell)| Ok::<_, RecalcError>((column.clone(), CellValue::from_json(cell)?)))
        .collect()
}

/// Convert a JSON array of objects into rows.
pub fn records_from_json(value: &Value) -> Result<Vec<Record>> {
    let rows = value
        .as_array()
        .ok_or_else(|| RecalcError::InvalidData("expected an array of rows".to_string()))?;
    rows.iter().map(record_from_json).collect()
}
