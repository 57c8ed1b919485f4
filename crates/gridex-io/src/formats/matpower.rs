//! MATPOWER case format (.m), import and export.
//!
//! Supports case format versions 1 (bare `bus = [...]` assignments) and 2
//! (`mpc.bus = [...]`). Column meaning comes from
//! [`gridex_schema::matpower_columns`], so the matrices are decoded by table
//! lookup rather than hard-coded offsets.
//!
//! MATPOWER folds demand and shunt admittance into bus columns (PD/QD and
//! GS/BS); the importer lifts nonzero entries into Load and Shunt devices,
//! and the exporter folds them back.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use gridex_core::{Diagnostics, Grid, GridError};
use gridex_schema::{matpower_columns, ColumnSpec, EntityKind};
use tracing::debug;

use crate::builder::{BranchSpec, BusSpec, GenSpec, GridBuilder, LoadSpec, ShuntSpec};
use crate::convert::safe_f64_to_usize;

/// Raw numeric matrices of a case file, before model construction.
#[derive(Debug, Default)]
struct RawCase {
    version: String,
    name: String,
    base_mva: f64,
    bus: Vec<(usize, Vec<f64>)>,
    gen: Vec<(usize, Vec<f64>)>,
    branch: Vec<(usize, Vec<f64>)>,
}

fn extract_inline_string(line: &str) -> String {
    line.split('=')
        .nth(1)
        .map(|v| {
            v.trim()
                .trim_matches(|c| c == '\'' || c == '"' || c == ';')
                .to_string()
        })
        .unwrap_or_default()
}

fn extract_inline_scalar(line: &str) -> Option<f64> {
    line.split('=')
        .nth(1)
        .and_then(|v| v.trim().trim_end_matches(';').parse().ok())
}

fn parse_row(line: &str) -> Vec<f64> {
    line.split(|c: char| c.is_whitespace() || c == ';')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<f64>().ok())
        .collect()
}

fn is_matrix_end(line: &str) -> bool {
    line.trim().ends_with("];")
}

/// Consume a matrix section, keeping the 1-based source line of each row.
fn parse_matrix<'a>(
    header: &str,
    header_line: usize,
    lines: &mut std::iter::Peekable<impl Iterator<Item = (usize, &'a str)>>,
) -> Vec<(usize, Vec<f64>)> {
    let mut rows = Vec::new();

    if let Some(after_bracket) = header.split('[').nth(1) {
        let data_part = after_bracket.trim_end_matches("];").trim();
        if !data_part.is_empty() && !data_part.starts_with('%') {
            let values = parse_row(data_part);
            if !values.is_empty() {
                rows.push((header_line, values));
            }
        }
        if header.contains("];") {
            return rows;
        }
    }

    for (lineno, line) in lines.by_ref() {
        if is_matrix_end(line) {
            // A closing line may still carry a final data row
            let data_part = line.trim().trim_end_matches("];").trim();
            if !data_part.is_empty() && !data_part.starts_with('%') {
                let values = parse_row(data_part);
                if !values.is_empty() {
                    rows.push((lineno, values));
                }
            }
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        let values = parse_row(trimmed);
        if !values.is_empty() {
            rows.push((lineno, values));
        }
    }
    rows
}

/// Single-pass scan of the case text into raw matrices.
///
/// Accepts both the `mpc.`-prefixed v2 style and the bare v1 style; the
/// version is resolved afterwards.
fn parse_raw(content: &str) -> Result<RawCase> {
    let mut case = RawCase {
        base_mva: Grid::DEFAULT_BASE_MVA,
        ..RawCase::default()
    };
    let mut saw_mpc_prefix = false;

    let mut lines = content.lines().enumerate().map(|(i, l)| (i + 1, l)).peekable();

    while let Some((lineno, line)) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }

        let stmt = match trimmed.strip_prefix("mpc.") {
            Some(rest) => {
                saw_mpc_prefix = true;
                rest
            }
            None => trimmed,
        };

        if let Some(name) = trimmed.strip_prefix("function") {
            // "function mpc = case14" or "function [baseMVA, bus, ...] = case9"
            case.name = name
                .rsplit('=')
                .next()
                .unwrap_or("")
                .trim()
                .trim_end_matches(';')
                .to_string();
        } else if stmt.starts_with("version") && stmt.contains('=') {
            case.version = extract_inline_string(stmt);
        } else if stmt.starts_with("baseMVA") && stmt.contains('=') {
            if let Some(v) = extract_inline_scalar(stmt) {
                case.base_mva = v;
            }
        } else if stmt.starts_with("bus") && stmt.contains('[') {
            case.bus = parse_matrix(stmt, lineno, &mut lines);
        } else if stmt.starts_with("gencost") && stmt.contains('[') {
            // consumed and dropped; cost curves are out of model
            parse_matrix(stmt, lineno, &mut lines);
        } else if stmt.starts_with("gen") && stmt.contains('[') {
            case.gen = parse_matrix(stmt, lineno, &mut lines);
        } else if stmt.starts_with("branch") && stmt.contains('[') {
            case.branch = parse_matrix(stmt, lineno, &mut lines);
        }
    }

    if case.version.is_empty() {
        // v1 files predate the version string and the mpc struct
        case.version = if saw_mpc_prefix { "2".into() } else { "1".into() };
    }

    if case.bus.is_empty() {
        return Err(GridError::StructuralParse("bus matrix not found".into()).into());
    }
    Ok(case)
}

fn col(cols: &[ColumnSpec], source_name: &str) -> usize {
    cols.iter()
        .find(|c| c.source_name == source_name)
        .map(|c| c.index)
        .unwrap_or(usize::MAX)
}

fn required_width(cols: &[ColumnSpec]) -> usize {
    cols.iter()
        .filter(|c| c.required)
        .map(|c| c.index + 1)
        .max()
        .unwrap_or(0)
}

fn get(row: &[f64], index: usize) -> Option<f64> {
    row.get(index).copied()
}

fn check_width(row: &[f64], width: usize, what: &str, line: usize) -> Result<()> {
    if row.len() < width {
        return Err(GridError::StructuralParse(format!(
            "{} row at line {} has {} columns, {} required",
            what,
            line,
            row.len(),
            width
        ))
        .into());
    }
    Ok(())
}

/// Parse MATPOWER case text into a canonical grid.
pub fn parse(content: &str) -> Result<(Grid, Diagnostics)> {
    let case = parse_raw(content)?;

    match case.version.as_str() {
        "1" | "2" => {}
        other => {
            return Err(GridError::UnsupportedVersion {
                format: "matpower".into(),
                version: other.to_string(),
            }
            .into())
        }
    }
    debug!(
        version = %case.version,
        buses = case.bus.len(),
        gens = case.gen.len(),
        branches = case.branch.len(),
        "matpower case scanned"
    );

    let name = if case.name.is_empty() {
        "matpower case".to_string()
    } else {
        case.name.clone()
    };
    let mut b = GridBuilder::new(name);
    b.set_base_mva(case.base_mva);
    let base_mva = case.base_mva;

    let bus_cols = matpower_columns(EntityKind::Bus).expect("bus columns defined");
    let bus_width = required_width(bus_cols);
    for (line, row) in &case.bus {
        check_width(row, bus_width, "bus", *line)?;
        let number = safe_f64_to_usize(row[col(bus_cols, "BUS_I")])
            .with_context(|| format!("invalid bus number at line {}", line))?;
        let bus_type = row[col(bus_cols, "BUS_TYPE")] as i64;
        let key = number.to_string();

        b.add_bus_numbered(
            &key,
            number,
            BusSpec {
                base_kv: row[col(bus_cols, "BASE_KV")],
                vmin_pu: get(row, col(bus_cols, "VMIN")),
                vmax_pu: get(row, col(bus_cols, "VMAX")),
                area: Some(row[col(bus_cols, "BUS_AREA")] as i64),
                zone: Some(row[col(bus_cols, "ZONE")] as i64),
                // bus type 4 marks an isolated (out of service) bus
                in_service: bus_type != 4,
                ..BusSpec::default()
            },
        )?;

        let pd = row[col(bus_cols, "PD")];
        let qd = row[col(bus_cols, "QD")];
        if pd != 0.0 || qd != 0.0 {
            b.add_load(
                &key,
                LoadSpec {
                    name: Some(format!("load {}", number)),
                    p_mw: pd,
                    q_mvar: qd,
                    ..LoadSpec::default()
                },
            )?;
        }

        // GS/BS are MW/Mvar injected at V = 1.0 pu; per-unit on the system base
        let gs = row[col(bus_cols, "GS")];
        let bs = row[col(bus_cols, "BS")];
        if gs != 0.0 || bs != 0.0 {
            b.add_shunt(
                &key,
                ShuntSpec {
                    name: Some(format!("shunt {}", number)),
                    g_pu: gs / base_mva,
                    b_pu: bs / base_mva,
                    ..ShuntSpec::default()
                },
            )?;
        }
    }

    let gen_cols = matpower_columns(EntityKind::Gen).expect("gen columns defined");
    let gen_width = required_width(gen_cols);
    for (line, row) in &case.gen {
        check_width(row, gen_width, "gen", *line)?;
        let bus = safe_f64_to_usize(row[col(gen_cols, "GEN_BUS")])
            .with_context(|| format!("invalid gen bus at line {}", line))?;
        b.add_gen(
            &bus.to_string(),
            GenSpec {
                p_mw: row[col(gen_cols, "PG")],
                q_mvar: row[col(gen_cols, "QG")],
                qmax_mvar: get(row, col(gen_cols, "QMAX")),
                qmin_mvar: get(row, col(gen_cols, "QMIN")),
                vset_pu: get(row, col(gen_cols, "VG")),
                pmax_mw: get(row, col(gen_cols, "PMAX")),
                pmin_mw: get(row, col(gen_cols, "PMIN")),
                in_service: get(row, col(gen_cols, "GEN_STATUS")).map_or(true, |s| s > 0.0),
                ..GenSpec::default()
            },
        )?;
    }

    let branch_cols = matpower_columns(EntityKind::Branch).expect("branch columns defined");
    let branch_width = required_width(branch_cols);
    for (line, row) in &case.branch {
        check_width(row, branch_width, "branch", *line)?;
        let from = safe_f64_to_usize(row[col(branch_cols, "F_BUS")])
            .with_context(|| format!("invalid from bus at line {}", line))?;
        let to = safe_f64_to_usize(row[col(branch_cols, "T_BUS")])
            .with_context(|| format!("invalid to bus at line {}", line))?;

        // tap == 0 is MATPOWER's marker for a plain line
        let tap = get(row, col(branch_cols, "TAP")).unwrap_or(0.0);
        let shift = get(row, col(branch_cols, "SHIFT")).unwrap_or(0.0);
        let rate_a = get(row, col(branch_cols, "RATE_A")).filter(|r| *r > 0.0);

        b.add_branch(
            &from.to_string(),
            &to.to_string(),
            BranchSpec {
                r_pu: row[col(branch_cols, "BR_R")],
                x_pu: row[col(branch_cols, "BR_X")],
                b_pu: row[col(branch_cols, "BR_B")],
                tap_ratio: if tap == 0.0 { 1.0 } else { tap },
                shift_deg: shift,
                rate_mva: rate_a,
                is_transformer: (tap != 0.0 && tap != 1.0) || shift != 0.0,
                in_service: get(row, col(branch_cols, "BR_STATUS")).map_or(true, |s| s > 0.0),
                ..BranchSpec::default()
            },
        )?;
    }

    Ok(b.finish())
}

/// Render a grid as a version 2 case file.
///
/// Loads and shunts fold back into the PD/QD and GS/BS bus columns; device
/// identity and profiles do not survive, which the caller reports as a lossy
/// export.
pub fn export(grid: &Grid) -> String {
    let mut out = String::new();
    let fn_name: String = grid
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let fn_name = if fn_name.is_empty() { "case".into() } else { fn_name };

    writeln!(out, "function mpc = {}", fn_name).unwrap();
    writeln!(out, "mpc.version = '2';").unwrap();
    writeln!(out, "mpc.baseMVA = {};", grid.base_mva).unwrap();

    writeln!(out, "\n%% bus data").unwrap();
    writeln!(out, "mpc.bus = [").unwrap();
    for bus in grid.buses() {
        let pd: f64 = grid
            .loads()
            .filter(|l| l.bus == bus.id && l.in_service)
            .map(|l| l.p_mw.0)
            .sum();
        let qd: f64 = grid
            .loads()
            .filter(|l| l.bus == bus.id && l.in_service)
            .map(|l| l.q_mvar.0)
            .sum();
        let gs: f64 = grid
            .shunts()
            .filter(|s| s.bus == bus.id && s.in_service)
            .map(|s| s.g_pu.0 * grid.base_mva)
            .sum();
        let bs: f64 = grid
            .shunts()
            .filter(|s| s.bus == bus.id && s.in_service)
            .map(|s| s.b_pu.0 * grid.base_mva)
            .sum();
        let bus_type = if bus.in_service { 1 } else { 4 };
        writeln!(
            out,
            "\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t1\t0\t{}\t{}\t{}\t{};",
            bus.id,
            bus_type,
            pd,
            qd,
            gs,
            bs,
            bus.area.unwrap_or(1),
            bus.base_kv.0,
            bus.zone.unwrap_or(1),
            bus.vmax_pu.map_or(1.1, |v| v.0),
            bus.vmin_pu.map_or(0.9, |v| v.0),
        )
        .unwrap();
    }
    writeln!(out, "];").unwrap();

    writeln!(out, "\n%% generator data").unwrap();
    writeln!(out, "mpc.gen = [").unwrap();
    for gen in grid.gens() {
        writeln!(
            out,
            "\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{};",
            gen.bus,
            gen.p_mw.0,
            gen.q_mvar.0,
            gen.qmax_mvar.map_or(9999.0, |v| v.0),
            gen.qmin_mvar.map_or(-9999.0, |v| v.0),
            gen.vset_pu.map_or(1.0, |v| v.0),
            grid.base_mva,
            i32::from(gen.in_service),
            gen.pmax_mw.map_or(9999.0, |v| v.0),
            gen.pmin_mw.map_or(0.0, |v| v.0),
        )
        .unwrap();
    }
    writeln!(out, "];").unwrap();

    writeln!(out, "\n%% branch data").unwrap();
    writeln!(out, "mpc.branch = [").unwrap();
    for branch in grid.branches() {
        let tap = if branch.is_transformer { branch.tap_ratio } else { 0.0 };
        writeln!(
            out,
            "\t{}\t{}\t{}\t{}\t{}\t{}\t0\t0\t{}\t{}\t{}\t-360\t360;",
            branch.from_bus,
            branch.to_bus,
            branch.r_pu.0,
            branch.x_pu.0,
            branch.b_pu.0,
            branch.rate_mva.map_or(0.0, |v| v.0),
            tap,
            branch.shift.0,
            i32::from(branch.in_service),
        )
        .unwrap();
    }
    writeln!(out, "];").unwrap();
    out
}
