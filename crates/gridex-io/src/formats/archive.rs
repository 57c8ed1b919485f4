//! Zip archive container (.zip / .gmz): one CSV file per entity table.
//!
//! The archive holds `meta.csv` (key/value), one `<table>.csv` per entity
//! kind with the pack column set as its header row, and `profiles.csv`
//! (`key,millis,value`). Cells are typed on re-read from the schema's field
//! declarations; a cell that does not fit its declared type downgrades to a
//! warning and a `Null`.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use anyhow::{Context, Result};
use gridex_core::{Diagnostics, Grid, GridError};
use gridex_schema::{field, EntityKind};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::convert::{parse_flexible_f64, parse_flexible_i64};
use crate::pack::value::FieldValue;
use crate::pack::{pack, unpack, PackedGrid, PackedTable};

const META_FILE: &str = "meta.csv";
const PROFILES_FILE: &str = "profiles.csv";

fn csv_bytes(records: impl IntoIterator<Item = Vec<String>>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.write_record(&record)?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing csv: {e}"))
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| GridError::StructuralParse(format!("bad csv: {e}")))?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }
    Ok(rows)
}

fn file_bytes(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<Vec<u8>>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading '{name}' from archive")),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

fn decode_cell(
    kind: EntityKind,
    column: &str,
    cell: &str,
    lineno: usize,
    diag: &mut Diagnostics,
) -> FieldValue {
    // Columns the schema does not know keep their text; the pack decoder
    // warns about them once per table.
    let Some(def) = field(kind, column) else {
        return FieldValue::Text(cell.to_string());
    };
    match FieldValue::from_csv_cell(cell, def.ty) {
        Some(value) => value,
        None => {
            diag.add_warning_at_line(
                "cell",
                &format!("'{cell}' is not a valid {:?} for '{column}'", def.ty),
                lineno,
            );
            FieldValue::Null
        }
    }
}

/// Parse a zip archive of per-table CSVs.
pub fn parse(bytes: &[u8]) -> Result<(Grid, Diagnostics)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| GridError::StructuralParse(format!("not a zip archive: {e}")))?;

    let meta = file_bytes(&mut archive, META_FILE)?
        .ok_or_else(|| GridError::StructuralParse(format!("missing '{META_FILE}'")))?;

    let mut packed = PackedGrid {
        format_version: String::new(),
        name: String::new(),
        base_mva: Grid::DEFAULT_BASE_MVA,
        schema_version: 0,
        tables: BTreeMap::new(),
        profiles: BTreeMap::new(),
    };
    for row in read_csv(&meta)? {
        let (Some(key), Some(value)) = (row.first(), row.get(1)) else {
            continue;
        };
        match key.as_str() {
            "format_version" => packed.format_version = value.clone(),
            "name" => packed.name = value.clone(),
            "base_mva" => {
                packed.base_mva = parse_flexible_f64(value).ok_or_else(|| {
                    GridError::StructuralParse(format!("bad base_mva '{value}'"))
                })?
            }
            "schema_version" => {
                packed.schema_version = value.parse().map_err(|_| {
                    GridError::StructuralParse(format!("bad schema_version '{value}'"))
                })?
            }
            _ => {}
        }
    }

    let mut cell_diag = Diagnostics::new();
    for kind in EntityKind::ALL {
        let table_name = kind.table_name();
        let Some(bytes) = file_bytes(&mut archive, &format!("{table_name}.csv"))? else {
            continue;
        };
        let mut rows = read_csv(&bytes)?.into_iter();
        let Some(columns) = rows.next() else {
            return Err(
                GridError::StructuralParse(format!("'{table_name}.csv' has no header")).into(),
            );
        };
        let data: Vec<Vec<FieldValue>> = rows
            .enumerate()
            .map(|(i, row)| {
                columns
                    .iter()
                    .zip(&row)
                    .map(|(col, cell)| decode_cell(*kind, col, cell, i + 2, &mut cell_diag))
                    .collect()
            })
            .collect();
        packed.tables.insert(
            table_name.to_string(),
            PackedTable {
                columns,
                rows: data,
            },
        );
    }

    if let Some(bytes) = file_bytes(&mut archive, PROFILES_FILE)? {
        let mut rows = read_csv(&bytes)?.into_iter();
        rows.next(); // header
        for (i, row) in rows.enumerate() {
            let parsed = match (row.first(), row.get(1), row.get(2)) {
                (Some(key), Some(millis), Some(value)) => parse_flexible_i64(millis)
                    .zip(parse_flexible_f64(value))
                    .map(|(m, v)| (key.clone(), m, v)),
                _ => None,
            };
            match parsed {
                Some((key, millis, value)) => {
                    packed.profiles.entry(key).or_default().push((millis, value))
                }
                None => {
                    cell_diag.add_warning_at_line("profile", "malformed profile row skipped", i + 2)
                }
            }
        }
    }

    let (grid, mut diag) = unpack(&packed)?;
    diag.merge(cell_diag);
    Ok((grid, diag))
}

/// Export a grid as a zip archive of per-table CSVs.
pub fn export(grid: &Grid) -> Result<Vec<u8>> {
    let packed = pack(grid);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    writer.start_file(META_FILE, options)?;
    writer.write_all(&csv_bytes([
        vec!["format_version".to_string(), packed.format_version.clone()],
        vec!["name".to_string(), packed.name.clone()],
        vec!["base_mva".to_string(), packed.base_mva.to_string()],
        vec!["schema_version".to_string(), packed.schema_version.to_string()],
    ])?)?;

    for (table_name, table) in &packed.tables {
        writer.start_file(format!("{table_name}.csv"), options)?;
        let records = std::iter::once(table.columns.clone()).chain(
            table
                .rows
                .iter()
                .map(|row| row.iter().map(FieldValue::to_csv_cell).collect()),
        );
        writer.write_all(&csv_bytes(records)?)?;
    }

    writer.start_file(PROFILES_FILE, options)?;
    let records = std::iter::once(vec![
        "key".to_string(),
        "millis".to_string(),
        "value".to_string(),
    ])
    .chain(packed.profiles.iter().flat_map(|(key, points)| {
        points
            .iter()
            .map(move |(millis, value)| vec![key.clone(), millis.to_string(), value.to_string()])
    }));
    writer.write_all(&csv_bytes(records)?)?;

    Ok(writer.finish()?.into_inner())
}
