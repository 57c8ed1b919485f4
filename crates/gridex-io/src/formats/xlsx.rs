//! Spreadsheet container (.xlsx): one sheet per packed table.
//!
//! Layout: a `meta` sheet (key/value rows for format_version, name,
//! base_mva, schema_version), one sheet per entity table with the column
//! names in row 0, and a `profiles` sheet with `key`, `millis`, `value`
//! columns. Reading goes through the pack codec, so column drift handling
//! and defaults behave exactly like the other containers.

use std::collections::BTreeMap;
use std::io::Cursor;

use anyhow::{Context, Result};
use calamine::{DataType, Reader, Xlsx};
use gridex_core::{Diagnostics, Grid, GridError};
use gridex_schema::EntityKind;
use rust_xlsxwriter::Workbook;

use crate::pack::value::FieldValue;
use crate::pack::{pack, unpack, PackedGrid, PackedTable};

const META_SHEET: &str = "meta";
const PROFILES_SHEET: &str = "profiles";

fn cell_to_value(cell: &DataType) -> FieldValue {
    match cell {
        DataType::Empty => FieldValue::Null,
        DataType::String(s) => FieldValue::Text(s.clone()),
        DataType::Float(v) => FieldValue::Float(*v),
        DataType::Int(v) => FieldValue::Int(*v),
        DataType::Bool(b) => FieldValue::Bool(*b),
        other => FieldValue::Text(other.to_string()),
    }
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(s)) => s.clone(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Parse workbook bytes into a canonical grid.
pub fn parse(bytes: &[u8]) -> Result<(Grid, Diagnostics)> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| GridError::StructuralParse(format!("not a spreadsheet: {}", e)))?;

    let meta = workbook
        .worksheet_range(META_SHEET)
        .ok_or_else(|| GridError::StructuralParse("missing 'meta' sheet".into()))?
        .context("reading 'meta' sheet")?;

    let mut packed = PackedGrid {
        format_version: String::new(),
        name: String::new(),
        base_mva: Grid::DEFAULT_BASE_MVA,
        schema_version: 0,
        tables: BTreeMap::new(),
        profiles: BTreeMap::new(),
    };
    for row in meta.rows() {
        let key = cell_to_string(row.first());
        let value = row.get(1);
        match key.as_str() {
            "format_version" => packed.format_version = cell_to_string(value),
            "name" => packed.name = cell_to_string(value),
            "base_mva" => {
                packed.base_mva = value
                    .and_then(|c| c.get_float().or_else(|| c.get_int().map(|v| v as f64)))
                    .unwrap_or(Grid::DEFAULT_BASE_MVA)
            }
            "schema_version" => {
                packed.schema_version = value
                    .and_then(|c| c.get_float().map(|v| v as u32).or_else(|| c.get_int().map(|v| v as u32)))
                    .unwrap_or(0)
            }
            _ => {}
        }
    }

    for kind in EntityKind::ALL {
        let range = match workbook.worksheet_range(kind.table_name()) {
            Some(r) => r.with_context(|| format!("reading '{}' sheet", kind.table_name()))?,
            None => continue,
        };
        let mut rows = range.rows();
        let columns: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(|c| cell_to_string(Some(c))).collect(),
            None => continue,
        };
        let data: Vec<Vec<FieldValue>> = rows
            .filter(|r| r.iter().any(|c| !matches!(c, DataType::Empty)))
            .map(|r| {
                let mut cells: Vec<FieldValue> = r.iter().map(cell_to_value).collect();
                cells.resize(columns.len(), FieldValue::Null);
                cells
            })
            .collect();
        packed.tables.insert(
            kind.table_name().to_string(),
            PackedTable {
                columns,
                rows: data,
            },
        );
    }

    if let Some(range) = workbook.worksheet_range(PROFILES_SHEET) {
        let range = range.context("reading 'profiles' sheet")?;
        for row in range.rows().skip(1) {
            let key = cell_to_string(row.first());
            if key.is_empty() {
                continue;
            }
            let millis = row
                .get(1)
                .and_then(|c| c.get_float().map(|v| v as i64).or_else(|| c.get_int()));
            let value = row.get(2).and_then(|c| c.get_float());
            if let (Some(millis), Some(value)) = (millis, value) {
                packed.profiles.entry(key).or_default().push((millis, value));
            }
        }
    }

    unpack(&packed)
}

/// Render a grid as workbook bytes.
pub fn export(grid: &Grid) -> Result<Vec<u8>> {
    let packed = pack(grid);
    let mut workbook = Workbook::new();

    let meta = workbook.add_worksheet();
    meta.set_name(META_SHEET)?;
    meta.write_string(0, 0, "format_version")?;
    meta.write_string(0, 1, &packed.format_version)?;
    meta.write_string(1, 0, "name")?;
    meta.write_string(1, 1, &packed.name)?;
    meta.write_string(2, 0, "base_mva")?;
    meta.write_number(2, 1, packed.base_mva)?;
    meta.write_string(3, 0, "schema_version")?;
    meta.write_number(3, 1, packed.schema_version as f64)?;

    for (table_name, table) in &packed.tables {
        let sheet = workbook.add_worksheet();
        sheet.set_name(table_name)?;
        for (col, name) in table.columns.iter().enumerate() {
            sheet.write_string(0, col as u16, name)?;
        }
        for (row_idx, row) in table.rows.iter().enumerate() {
            let r = (row_idx + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                let c = col as u16;
                match value {
                    FieldValue::Null => {}
                    FieldValue::Bool(b) => {
                        sheet.write_boolean(r, c, *b)?;
                    }
                    FieldValue::Int(v) => {
                        sheet.write_number(r, c, *v as f64)?;
                    }
                    FieldValue::Float(v) => {
                        sheet.write_number(r, c, *v)?;
                    }
                    FieldValue::Text(s) => {
                        sheet.write_string(r, c, s)?;
                    }
                }
            }
        }
    }

    let profiles = workbook.add_worksheet();
    profiles.set_name(PROFILES_SHEET)?;
    profiles.write_string(0, 0, "key")?;
    profiles.write_string(0, 1, "millis")?;
    profiles.write_string(0, 2, "value")?;
    let mut row = 1u32;
    for (key, points) in &packed.profiles {
        for (millis, value) in points {
            profiles.write_string(row, 0, key)?;
            profiles.write_number(row, 1, *millis as f64)?;
            profiles.write_number(row, 2, *value)?;
            row += 1;
        }
    }

    workbook.save_to_buffer().context("writing workbook")
}
