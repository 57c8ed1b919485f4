//! Dynamically typed cell values for packed tables.
//!
//! Tabular containers (CSV archives, spreadsheets, SQLite) carry cells
//! without Rust-level type information. [`FieldValue`] is the lowest common
//! denominator those adapters read and write; the schema's declared
//! [`FieldType`] drives coercion back to typed entity fields.

use gridex_schema::{FieldDefault, FieldType};
use serde::{Deserialize, Serialize};

/// A single table cell.
///
/// Externally tagged on purpose: the binary codec cannot round-trip
/// untagged enums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view with the coercions tabular sources need:
    /// ints widen, bools map to 0/1, numeric text parses.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Text(s) => crate::convert::parse_flexible_f64(s.trim()),
            FieldValue::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            // Integral floats only; 2.5 is not an int.
            FieldValue::Float(v) => crate::convert::safe_f64_to_i64(*v)
                .ok()
                .filter(|_| v.fract() == 0.0),
            FieldValue::Bool(b) => Some(i64::from(*b)),
            FieldValue::Text(s) => crate::convert::parse_flexible_i64(s.trim()),
            FieldValue::Null => None,
        }
    }

    /// Boolean view. Numbers follow the common tabular convention
    /// (nonzero = true); text accepts true/false/1/0 case-insensitively.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Int(v) => Some(*v != 0),
            FieldValue::Float(v) => Some(*v != 0.0),
            FieldValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            FieldValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Materialize a schema default.
    pub fn from_default(default: &FieldDefault) -> Self {
        match default {
            FieldDefault::Float(v) => FieldValue::Float(*v),
            FieldDefault::Int(v) => FieldValue::Int(*v),
            FieldDefault::Bool(b) => FieldValue::Bool(*b),
            FieldDefault::Text(s) => FieldValue::Text((*s).to_string()),
            FieldDefault::Null => FieldValue::Null,
        }
    }

    /// Render for CSV cells. `Null` becomes the empty string.
    pub fn to_csv_cell(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Float(v) => {
                // Keep integral floats distinguishable from ints on re-read
                if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
                    format!("{:.1}", v)
                } else {
                    v.to_string()
                }
            }
            FieldValue::Text(s) => s.clone(),
        }
    }

    /// Parse a CSV cell back into a value of the declared type.
    /// Empty cells are `Null`; a non-empty cell that does not fit the
    /// declared type is `None` (caller decides whether that is an anomaly).
    pub fn from_csv_cell(cell: &str, ty: FieldType) -> Option<Self> {
        let cell = cell.trim();
        if cell.is_empty() {
            return Some(FieldValue::Null);
        }
        match ty {
            FieldType::Float => crate::convert::parse_flexible_f64(cell).map(FieldValue::Float),
            FieldType::Int => crate::convert::parse_flexible_i64(cell).map(FieldValue::Int),
            FieldType::Bool => FieldValue::Text(cell.to_string())
                .as_bool()
                .map(FieldValue::Bool),
            FieldType::Text | FieldType::Timestamp => Some(FieldValue::Text(cell.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercions() {
        assert_eq!(FieldValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(FieldValue::Text("1,5".into()).as_f64(), Some(1.5));
        assert_eq!(FieldValue::Float(2.0).as_i64(), Some(2));
        assert_eq!(FieldValue::Float(2.5).as_i64(), None);
        assert_eq!(FieldValue::Null.as_f64(), None);
    }

    #[test]
    fn bool_coercions() {
        assert_eq!(FieldValue::Text("TRUE".into()).as_bool(), Some(true));
        assert_eq!(FieldValue::Text("0".into()).as_bool(), Some(false));
        assert_eq!(FieldValue::Int(2).as_bool(), Some(true));
        assert_eq!(FieldValue::Text("maybe".into()).as_bool(), None);
    }

    #[test]
    fn csv_cells_round_trip_by_declared_type() {
        let cases = [
            (FieldValue::Float(1.0), FieldType::Float),
            (FieldValue::Float(-0.0375), FieldType::Float),
            (FieldValue::Int(42), FieldType::Int),
            (FieldValue::Bool(true), FieldType::Bool),
            (FieldValue::Text("Bus A".into()), FieldType::Text),
            (FieldValue::Null, FieldType::Float),
        ];
        for (value, ty) in cases {
            let cell = value.to_csv_cell();
            assert_eq!(FieldValue::from_csv_cell(&cell, ty), Some(value));
        }
    }

    #[test]
    fn unparseable_cell_is_none() {
        assert_eq!(FieldValue::from_csv_cell("abc", FieldType::Float), None);
        assert_eq!(FieldValue::from_csv_cell("", FieldType::Float), Some(FieldValue::Null));
    }
}
