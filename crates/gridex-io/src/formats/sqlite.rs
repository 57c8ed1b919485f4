//! SQLite container (.sqlite / .db): one table per entity kind.
//!
//! Layout: a `meta` key/value table, one table per entity kind named by its
//! canonical table name, and a `profiles` table (`key`, `millis`, `value`).
//! Table and column names are always double-quoted in generated SQL because
//! `load` is an SQL keyword.
//!
//! SQLite's dynamic typing maps cleanly onto [`FieldValue`]; booleans travel
//! as 0/1 integers and are coerced back by the pack codec's declared types.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use gridex_core::{Diagnostics, Grid, GridError};
use gridex_schema::{fields, EntityKind, FieldType};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;

use crate::pack::value::FieldValue;
use crate::pack::{pack, unpack, PackedGrid, PackedTable};

fn sql_type(ty: FieldType) -> &'static str {
    match ty {
        FieldType::Int | FieldType::Bool => "INTEGER",
        FieldType::Float => "REAL",
        FieldType::Text | FieldType::Timestamp => "TEXT",
    }
}

fn to_sql_value(value: &FieldValue) -> SqlValue {
    match value {
        FieldValue::Null => SqlValue::Null,
        FieldValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        FieldValue::Int(v) => SqlValue::Integer(*v),
        FieldValue::Float(v) => SqlValue::Real(*v),
        FieldValue::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(v) => FieldValue::Int(v),
        ValueRef::Real(v) => FieldValue::Float(v),
        ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(_) => FieldValue::Null,
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .context("querying sqlite_master")?;
    Ok(count > 0)
}

/// Open a database file and rebuild the grid from it.
pub fn load(path: &Path) -> Result<(Grid, Diagnostics)> {
    let conn = Connection::open(path)
        .with_context(|| format!("opening database '{}'", path.display()))?;

    if !table_exists(&conn, "meta")? {
        return Err(GridError::StructuralParse("missing 'meta' table".into()).into());
    }

    let mut packed = PackedGrid {
        format_version: String::new(),
        name: String::new(),
        base_mva: Grid::DEFAULT_BASE_MVA,
        schema_version: 0,
        tables: BTreeMap::new(),
        profiles: BTreeMap::new(),
    };

    {
        let mut stmt = conn.prepare("SELECT \"key\", \"value\" FROM \"meta\"")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            match key.as_str() {
                "format_version" => packed.format_version = row.get(1)?,
                "name" => packed.name = row.get(1)?,
                "base_mva" => packed.base_mva = row.get(1)?,
                "schema_version" => packed.schema_version = row.get::<_, i64>(1)? as u32,
                _ => {}
            }
        }
    }

    for kind in EntityKind::ALL {
        let table_name = kind.table_name();
        if !table_exists(&conn, table_name)? {
            continue;
        }
        let mut stmt = conn.prepare(&format!("SELECT * FROM \"{}\"", table_name))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut data = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                cells.push(from_sql_value(row.get_ref(i)?));
            }
            data.push(cells);
        }
        packed.tables.insert(
            table_name.to_string(),
            PackedTable {
                columns,
                rows: data,
            },
        );
    }

    if table_exists(&conn, "profiles")? {
        let mut stmt =
            conn.prepare("SELECT \"key\", \"millis\", \"value\" FROM \"profiles\" ORDER BY \"key\", \"millis\"")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let millis: i64 = row.get(1)?;
            let value: f64 = row.get(2)?;
            packed.profiles.entry(key).or_default().push((millis, value));
        }
    }

    unpack(&packed)
}

/// Write the grid into a database file, replacing existing contents.
pub fn save(grid: &Grid, path: &Path) -> Result<()> {
    let packed = pack(grid);
    let conn = Connection::open(path)
        .with_context(|| format!("creating database '{}'", path.display()))?;

    conn.execute_batch(
        "DROP TABLE IF EXISTS \"meta\";
         CREATE TABLE \"meta\" (\"key\" TEXT PRIMARY KEY, \"value\");
         DROP TABLE IF EXISTS \"profiles\";
         CREATE TABLE \"profiles\" (\"key\" TEXT NOT NULL, \"millis\" INTEGER NOT NULL, \"value\" REAL NOT NULL);",
    )?;

    conn.execute(
        "INSERT INTO \"meta\" VALUES ('format_version', ?1), ('name', ?2), ('base_mva', ?3), ('schema_version', ?4)",
        rusqlite::params![packed.format_version, packed.name, packed.base_mva, packed.schema_version as i64],
    )?;

    for kind in EntityKind::ALL {
        let table_name = kind.table_name();
        let table = &packed.tables[table_name];
        let defs = fields(*kind);

        let column_sql: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                let ty = defs
                    .iter()
                    .find(|d| d.name == c)
                    .map(|d| sql_type(d.ty))
                    .unwrap_or("TEXT");
                format!("\"{}\" {}", c, ty)
            })
            .collect();
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"{}\"; CREATE TABLE \"{}\" ({});",
            table_name,
            table_name,
            column_sql.join(", ")
        ))?;

        if table.rows.is_empty() {
            continue;
        }
        let placeholders: Vec<String> =
            (1..=table.columns.len()).map(|i| format!("?{}", i)).collect();
        let insert = format!(
            "INSERT INTO \"{}\" VALUES ({})",
            table_name,
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&insert)?;
        for row in &table.rows {
            let values: Vec<SqlValue> = row.iter().map(to_sql_value).collect();
            stmt.execute(rusqlite::params_from_iter(values))?;
        }
    }

    let mut stmt = conn.prepare("INSERT INTO \"profiles\" VALUES (?1, ?2, ?3)")?;
    for (key, points) in &packed.profiles {
        for (millis, value) in points {
            stmt.execute(rusqlite::params![key, millis, value])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gridex_core::{Bus, BusId, Kilovolts, Load, LoadId, Megawatts, Profile};

    fn grid() -> Grid {
        let mut grid = Grid::new("sqlite test");
        grid.add_bus(Bus {
            id: BusId::new(1),
            name: "hub".into(),
            base_kv: Kilovolts(220.0),
            area: Some(3),
            ..Bus::default()
        })
        .unwrap();
        let mut load = Load {
            id: LoadId::new(1),
            bus: BusId::new(1),
            p_mw: Megawatts(33.0),
            ..Load::default()
        };
        load.profiles.insert(
            "p_mw".into(),
            Profile::from_pairs([
                (Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(), 33.0),
                (Utc.with_ymd_and_hms(2025, 2, 1, 1, 0, 0).unwrap(), 31.0),
            ]),
        );
        grid.add_load(load).unwrap();
        grid
    }

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.sqlite");
        let grid = grid();
        save(&grid, &path).unwrap();
        let (back, diag) = load(&path).unwrap();
        assert!(!diag.has_issues(), "{}", diag.summary());
        assert_eq!(back, grid);
    }

    #[test]
    fn save_replaces_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.sqlite");
        save(&grid(), &path).unwrap();

        let mut smaller = Grid::new("second");
        smaller
            .add_bus(Bus {
                id: BusId::new(9),
                base_kv: Kilovolts(20.0),
                ..Bus::default()
            })
            .unwrap();
        save(&smaller, &path).unwrap();

        let (back, _) = load(&path).unwrap();
        assert_eq!(back, smaller);
    }

    #[test]
    fn missing_meta_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.sqlite");
        Connection::open(&path).unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }
}
