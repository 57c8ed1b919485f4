//! The packed wire model shared by the structured containers.
//!
//! [`PackedGrid`] is a self-describing, format-neutral snapshot of a grid:
//! one named table per entity kind (columns declared explicitly, so readers
//! survive column reordering and schema drift) plus a flat profile section.
//! JSON, the binary codec, spreadsheets, SQLite and the CSV archive are all
//! thin transports over this one structure; [`pack`] and [`unpack`] hold the
//! only entity-level logic.
//!
//! Compatibility is semver-gated: readers accept any minor/patch revision of
//! their own major version and refuse the rest.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use gridex_core::{Diagnostics, Grid, GridError, Profile};
use gridex_schema::{fields, EntityKind, FieldDefault};
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod fields;
pub mod value;

use self::fields as row_codec;
use self::value::FieldValue;

/// Version of the packed layout itself, independent of the model's
/// entity-kind schema version.
pub const PACK_FORMAT_VERSION: &str = "1.0.0";

/// One entity table: explicit column names plus value rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

/// The complete packed snapshot.
///
/// Profiles are keyed `kind/id/attr` (e.g. `load/3/p_mw`) with timestamps
/// as epoch milliseconds; sub-millisecond precision does not survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedGrid {
    pub format_version: String,
    pub name: String,
    pub base_mva: f64,
    pub schema_version: u32,
    pub tables: BTreeMap<String, PackedTable>,
    // No skip_serializing_if here: bincode is not self-describing, so an
    // omitted field would desynchronize the binary container.
    #[serde(default)]
    pub profiles: BTreeMap<String, Vec<(i64, f64)>>,
}

fn pack_profiles(
    out: &mut BTreeMap<String, Vec<(i64, f64)>>,
    kind: EntityKind,
    id: usize,
    profiles: &BTreeMap<String, Profile>,
) {
    for (attr, profile) in profiles {
        if profile.is_empty() {
            continue;
        }
        let key = format!("{}/{}/{}", kind.table_name(), id, attr);
        let points = profile
            .iter()
            .map(|(ts, v)| (ts.timestamp_millis(), v))
            .collect();
        out.insert(key, points);
    }
}

/// Snapshot a grid into the packed wire model.
pub fn pack(grid: &Grid) -> PackedGrid {
    let mut tables = BTreeMap::new();
    let mut profiles = BTreeMap::new();

    for kind in EntityKind::ALL {
        let columns: Vec<String> = fields(*kind).iter().map(|f| f.name.to_string()).collect();
        let rows: Vec<Vec<FieldValue>> = match kind {
            EntityKind::Bus => grid.buses().map(row_codec::bus_values).collect(),
            EntityKind::Branch => grid.branches().map(row_codec::branch_values).collect(),
            EntityKind::Gen => grid
                .gens()
                .map(|g| {
                    pack_profiles(&mut profiles, EntityKind::Gen, g.id.value(), &g.profiles);
                    row_codec::gen_values(g)
                })
                .collect(),
            EntityKind::Load => grid
                .loads()
                .map(|l| {
                    pack_profiles(&mut profiles, EntityKind::Load, l.id.value(), &l.profiles);
                    row_codec::load_values(l)
                })
                .collect(),
            EntityKind::Shunt => grid
                .shunts()
                .map(|s| {
                    pack_profiles(&mut profiles, EntityKind::Shunt, s.id.value(), &s.profiles);
                    row_codec::shunt_values(s)
                })
                .collect(),
            EntityKind::Storage => grid
                .storages()
                .map(|s| {
                    pack_profiles(&mut profiles, EntityKind::Storage, s.id.value(), &s.profiles);
                    row_codec::storage_values(s)
                })
                .collect(),
        };
        tables.insert(kind.table_name().to_string(), PackedTable { columns, rows });
    }

    PackedGrid {
        format_version: PACK_FORMAT_VERSION.to_string(),
        name: grid.name.clone(),
        base_mva: grid.base_mva,
        schema_version: grid.schema_version,
        tables,
        profiles,
    }
}

fn check_pack_version(format_version: &str) -> Result<()> {
    let ours = Version::parse(PACK_FORMAT_VERSION).expect("const version parses");
    let theirs = Version::parse(format_version).map_err(|_| GridError::UnsupportedVersion {
        format: "grid pack".into(),
        version: format_version.to_string(),
    })?;
    if theirs.major != ours.major {
        return Err(GridError::UnsupportedVersion {
            format: "grid pack".into(),
            version: format_version.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Decode one table into rows, handling column drift.
///
/// Unknown columns are skipped with a warning; missing optional columns get
/// their schema default (also warned, once per column); a missing required
/// column aborts the parse.
fn decode_table(
    kind: EntityKind,
    table: &PackedTable,
    diag: &mut Diagnostics,
) -> Result<Vec<row_codec::Row>> {
    let defs = fields(kind);
    let table_name = kind.table_name();

    // column name -> position in the source rows, for known columns only
    let mut known: Vec<(usize, &str)> = Vec::new();
    for (pos, col) in table.columns.iter().enumerate() {
        if defs.iter().any(|d| d.name == col) {
            known.push((pos, col.as_str()));
        } else {
            diag.add_warning(
                "column",
                &format!("table '{}': unknown column '{}' skipped", table_name, col),
            );
        }
    }

    let mut defaulted: Vec<(&str, FieldValue)> = Vec::new();
    for def in defs {
        if table.columns.iter().any(|c| c == def.name) {
            continue;
        }
        if def.required {
            return Err(GridError::StructuralParse(format!(
                "table '{}' is missing required column '{}'",
                table_name, def.name
            ))
            .into());
        }
        diag.add_warning(
            "field",
            &format!(
                "table '{}': column '{}' absent, default substituted",
                table_name, def.name
            ),
        );
        if !matches!(def.default, FieldDefault::Null) {
            defaulted.push((def.name, FieldValue::from_default(&def.default)));
        }
    }

    let mut rows = Vec::with_capacity(table.rows.len());
    for (line, cells) in table.rows.iter().enumerate() {
        let mut row = row_codec::Row::new();
        for &(pos, name) in &known {
            let value = cells.get(pos).cloned().unwrap_or(FieldValue::Null);
            row.insert(name, value);
        }
        for (name, value) in &defaulted {
            row.insert(*name, value.clone());
        }
        if cells.len() != table.columns.len() {
            diag.add_warning_at_line(
                "row",
                &format!(
                    "table '{}': row has {} cells, header declares {}",
                    table_name,
                    cells.len(),
                    table.columns.len()
                ),
                line + 1,
            );
        }
        rows.push(row);
    }
    Ok(rows)
}

fn structural(e: GridError) -> GridError {
    GridError::StructuralParse(e.to_string())
}

/// Rebuild a grid from the packed wire model.
pub fn unpack(packed: &PackedGrid) -> Result<(Grid, Diagnostics)> {
    check_pack_version(&packed.format_version)?;

    let mut diag = Diagnostics::new();
    let mut grid = Grid::new(packed.name.clone());
    grid.base_mva = packed.base_mva;
    grid.schema_version = packed.schema_version;

    for name in packed.tables.keys() {
        if EntityKind::from_table_name(name).is_none() {
            diag.add_warning("table", &format!("unknown table '{}' skipped", name));
        }
    }

    // Buses first so reference checks can run as the other kinds land.
    for kind in EntityKind::ALL {
        let table = match packed.tables.get(kind.table_name()) {
            Some(t) => t,
            None => continue,
        };
        debug!(table = kind.table_name(), rows = table.rows.len(), "unpacking table");
        for row in decode_table(*kind, table, &mut diag)? {
            match kind {
                EntityKind::Bus => {
                    grid.add_bus(row_codec::bus_from_row(&row)?).map_err(structural)?;
                }
                EntityKind::Branch => {
                    grid.add_branch(row_codec::branch_from_row(&row)?)
                        .map_err(structural)?;
                }
                EntityKind::Gen => {
                    grid.add_gen(row_codec::gen_from_row(&row)?).map_err(structural)?;
                }
                EntityKind::Load => {
                    grid.add_load(row_codec::load_from_row(&row)?)
                        .map_err(structural)?;
                }
                EntityKind::Shunt => {
                    grid.add_shunt(row_codec::shunt_from_row(&row)?)
                        .map_err(structural)?;
                }
                EntityKind::Storage => {
                    grid.add_storage(row_codec::storage_from_row(&row)?)
                        .map_err(structural)?;
                }
            }
        }
    }

    for (key, points) in &packed.profiles {
        attach_profile(&mut grid, key, points, &mut diag);
    }

    Ok((grid, diag))
}

fn attach_profile(grid: &mut Grid, key: &str, points: &[(i64, f64)], diag: &mut Diagnostics) {
    let mut parts = key.splitn(3, '/');
    let parsed = (|| {
        let kind = EntityKind::from_table_name(parts.next()?)?;
        let id: usize = parts.next()?.parse().ok()?;
        let attr = parts.next()?;
        Some((kind, id, attr))
    })();
    let (kind, id, attr) = match parsed {
        Some(p) => p,
        None => {
            diag.add_warning("profile", &format!("malformed profile key '{}'", key));
            return;
        }
    };

    let profile = Profile::from_pairs(points.iter().filter_map(|&(ms, v)| {
        Utc.timestamp_millis_opt(ms).single().map(|ts| (ts, v))
    }));

    let attached = match kind {
        EntityKind::Gen => grid.gen(gridex_core::GenId::new(id)).cloned().map(|mut g| {
            g.profiles.insert(attr.to_string(), profile);
            grid.replace_gen(g).is_ok()
        }),
        EntityKind::Load => grid.load(gridex_core::LoadId::new(id)).cloned().map(|mut l| {
            l.profiles.insert(attr.to_string(), profile);
            grid.replace_load(l).is_ok()
        }),
        EntityKind::Shunt => grid.shunt(gridex_core::ShuntId::new(id)).cloned().map(|mut s| {
            s.profiles.insert(attr.to_string(), profile);
            grid.replace_shunt(s).is_ok()
        }),
        EntityKind::Storage => grid
            .storage(gridex_core::StorageId::new(id))
            .cloned()
            .map(|mut s| {
                s.profiles.insert(attr.to_string(), profile);
                grid.replace_storage(s).is_ok()
            }),
        EntityKind::Bus | EntityKind::Branch => {
            diag.add_warning(
                "profile",
                &format!("profile '{}' targets a kind without profiles", key),
            );
            return;
        }
    };

    if attached != Some(true) {
        diag.add_warning(
            "profile",
            &format!("profile '{}' targets a nonexistent device, dropped", key),
        );
    }
}
