//! PSS/E RAW format (.raw), import and export.
//!
//! Revisions 29 through 35 are accepted; anything else is refused up front.
//! The revision changes both the section order (fixed shunts split out of
//! the bus record at rev 31) and the bus record layout, so the parser walks
//! a per-revision section sequence instead of sniffing headers.
//!
//! Records are comma separated with single-quoted text fields; every
//! section ends with a lone `0` record. Two-winding transformers are
//! imported from the four-line transformer records; three-winding
//! transformers are skipped with a warning.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use gridex_core::{Diagnostics, Grid, GridError};
use tracing::debug;

use crate::builder::{BranchSpec, BusSpec, GenSpec, GridBuilder, LoadSpec, ShuntSpec};

const MIN_REVISION: u32 = 29;
const MAX_REVISION: u32 = 35;
const EXPORT_REVISION: u32 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Bus,
    Load,
    FixedShunt,
    Generator,
    Branch,
    Transformer,
}

fn section_order(revision: u32) -> &'static [Section] {
    if revision < 31 {
        &[
            Section::Bus,
            Section::Load,
            Section::Generator,
            Section::Branch,
            Section::Transformer,
        ]
    } else {
        &[
            Section::Bus,
            Section::Load,
            Section::FixedShunt,
            Section::Generator,
            Section::Branch,
            Section::Transformer,
        ]
    }
}

/// Split a RAW record on commas, honoring single-quoted fields.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for c in line.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            ',' if !in_quote => {
                fields.push(current.trim().to_string());
                current = String::new();
            }
            '/' if !in_quote => break, // trailing comment
            _ => current.push(c),
        }
    }
    let last = current.trim();
    if !last.is_empty() || !fields.is_empty() {
        fields.push(last.to_string());
    }
    fields
}

fn f(fields: &[String], idx: usize) -> Option<f64> {
    fields.get(idx).and_then(|s| s.parse().ok())
}

fn u(fields: &[String], idx: usize) -> Option<usize> {
    fields.get(idx).and_then(|s| s.parse().ok())
}

fn is_terminator(fields: &[String]) -> bool {
    fields.first().map(|s| s.as_str()) == Some("0")
}

struct Ctx<'a> {
    builder: &'a mut GridBuilder,
    revision: u32,
}

/// Parse PSS/E RAW text into a canonical grid.
pub fn parse(content: &str) -> Result<(Grid, Diagnostics)> {
    let mut lines = content.lines().enumerate().map(|(i, l)| (i + 1, l));

    // Header: IC, SBASE, REV, ...
    let (_, header) = lines
        .next()
        .ok_or_else(|| GridError::StructuralParse("empty RAW file".into()))?;
    let header_fields = split_record(header);
    let base_mva = f(&header_fields, 1).unwrap_or(Grid::DEFAULT_BASE_MVA);
    let revision = header_fields
        .get(2)
        .and_then(|s| s.parse::<f64>().ok())
        .map(|v| v as u32)
        .unwrap_or(MIN_REVISION);

    if !(MIN_REVISION..=MAX_REVISION).contains(&revision) {
        return Err(GridError::UnsupportedVersion {
            format: "psse".into(),
            version: revision.to_string(),
        }
        .into());
    }
    debug!(revision, base_mva, "psse header read");

    // Two case title lines follow the header
    lines.next();
    lines.next();

    let mut builder = GridBuilder::new("psse case");
    builder.set_base_mva(base_mva);
    let order = section_order(revision);
    let mut section_idx = 0;

    let mut ctx = Ctx {
        builder: &mut builder,
        revision,
    };

    let mut pending_transformer: Vec<(usize, Vec<String>)> = Vec::new();
    let mut transformer_lines_left = 0usize;

    while let Some((lineno, raw_line)) = lines.next() {
        if section_idx >= order.len() {
            break;
        }
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = split_record(line);
        if fields.is_empty() {
            continue;
        }

        let section = order[section_idx];

        if transformer_lines_left == 0 && is_terminator(&fields) {
            section_idx += 1;
            continue;
        }

        match section {
            Section::Bus => parse_bus(&mut ctx, &fields, lineno)?,
            Section::Load => parse_load(&mut ctx, &fields, lineno)?,
            Section::FixedShunt => parse_fixed_shunt(&mut ctx, &fields, lineno)?,
            Section::Generator => parse_gen(&mut ctx, &fields, lineno)?,
            Section::Branch => parse_branch(&mut ctx, &fields, lineno)?,
            Section::Transformer => {
                if transformer_lines_left == 0 {
                    // First record line; K != 0 marks a three-winding unit
                    // (five lines instead of four)
                    let three_winding = u(&fields, 2).map_or(false, |k| k != 0);
                    transformer_lines_left = if three_winding { 4 } else { 3 };
                    pending_transformer.clear();
                    pending_transformer.push((lineno, fields));
                } else {
                    pending_transformer.push((lineno, fields));
                    transformer_lines_left -= 1;
                    if transformer_lines_left == 0 {
                        parse_transformer(&mut ctx, &pending_transformer)?;
                        pending_transformer.clear();
                    }
                }
            }
        }
    }

    Ok(builder.finish())
}

fn parse_bus(ctx: &mut Ctx, fields: &[String], lineno: usize) -> Result<()> {
    let number = u(fields, 0)
        .with_context(|| format!("invalid bus number at line {}", lineno))?;
    let name = fields.get(1).cloned().filter(|s| !s.is_empty());
    let base_kv = f(fields, 2).unwrap_or(0.0);

    // rev < 31 bus records carry GL/BL at 4/5 and shift the area/zone columns
    let (ide_idx, area_idx, zone_idx) = if ctx.revision < 31 { (3, 6, 7) } else { (3, 4, 5) };
    let ide = f(fields, ide_idx).unwrap_or(1.0) as i64;

    let key = number.to_string();
    ctx.builder.add_bus_numbered(
        &key,
        number,
        BusSpec {
            name,
            base_kv,
            area: f(fields, area_idx).map(|v| v as i64),
            zone: f(fields, zone_idx).map(|v| v as i64),
            in_service: ide != 4,
            ..BusSpec::default()
        },
    )?;

    if ctx.revision < 31 {
        let gl = f(fields, 4).unwrap_or(0.0);
        let bl = f(fields, 5).unwrap_or(0.0);
        if gl != 0.0 || bl != 0.0 {
            let base = ctx.builder.base_mva();
            ctx.builder.add_shunt(
                &key,
                ShuntSpec {
                    name: Some(format!("shunt {}", number)),
                    g_pu: gl / base,
                    b_pu: bl / base,
                    ..ShuntSpec::default()
                },
            )?;
        }
    }
    Ok(())
}

fn parse_load(ctx: &mut Ctx, fields: &[String], lineno: usize) -> Result<()> {
    let bus = u(fields, 0)
        .with_context(|| format!("invalid load bus at line {}", lineno))?;
    let status = f(fields, 2).map_or(true, |s| s != 0.0);
    ctx.builder.add_load(
        &bus.to_string(),
        LoadSpec {
            name: fields.get(1).cloned().filter(|s| !s.is_empty()),
            p_mw: f(fields, 5).unwrap_or(0.0),
            q_mvar: f(fields, 6).unwrap_or(0.0),
            in_service: status,
        },
    )?;
    Ok(())
}

fn parse_fixed_shunt(ctx: &mut Ctx, fields: &[String], lineno: usize) -> Result<()> {
    let bus = u(fields, 0)
        .with_context(|| format!("invalid shunt bus at line {}", lineno))?;
    let base = ctx.builder.base_mva();
    ctx.builder.add_shunt(
        &bus.to_string(),
        ShuntSpec {
            name: fields.get(1).cloned().filter(|s| !s.is_empty()),
            g_pu: f(fields, 3).unwrap_or(0.0) / base,
            b_pu: f(fields, 4).unwrap_or(0.0) / base,
            in_service: f(fields, 2).map_or(true, |s| s != 0.0),
        },
    )?;
    Ok(())
}

fn parse_gen(ctx: &mut Ctx, fields: &[String], lineno: usize) -> Result<()> {
    let bus = u(fields, 0)
        .with_context(|| format!("invalid generator bus at line {}", lineno))?;
    ctx.builder.add_gen(
        &bus.to_string(),
        GenSpec {
            name: fields.get(1).cloned().filter(|s| !s.is_empty()),
            p_mw: f(fields, 2).unwrap_or(0.0),
            q_mvar: f(fields, 3).unwrap_or(0.0),
            qmax_mvar: f(fields, 4),
            qmin_mvar: f(fields, 5),
            vset_pu: f(fields, 6),
            in_service: f(fields, 14).map_or(true, |s| s != 0.0),
            pmax_mw: f(fields, 16),
            pmin_mw: f(fields, 17),
        },
    )?;
    Ok(())
}

fn parse_branch(ctx: &mut Ctx, fields: &[String], lineno: usize) -> Result<()> {
    let from = u(fields, 0)
        .with_context(|| format!("invalid branch from bus at line {}", lineno))?;
    let to = fields
        .get(1)
        .and_then(|s| s.trim_start_matches('-').parse::<usize>().ok())
        .with_context(|| format!("invalid branch to bus at line {}", lineno))?;
    ctx.builder.add_branch(
        &from.to_string(),
        &to.to_string(),
        BranchSpec {
            r_pu: f(fields, 3).unwrap_or(0.0),
            x_pu: f(fields, 4).unwrap_or(0.0),
            b_pu: f(fields, 5).unwrap_or(0.0),
            rate_mva: f(fields, 6).filter(|r| *r > 0.0),
            in_service: f(fields, 13).map_or(true, |s| s != 0.0),
            ..BranchSpec::default()
        },
    )?;
    Ok(())
}

fn parse_transformer(ctx: &mut Ctx, record: &[(usize, Vec<String>)]) -> Result<()> {
    let (lineno, line1) = &record[0];
    let from = u(line1, 0)
        .with_context(|| format!("invalid transformer from bus at line {}", lineno))?;
    let to = u(line1, 1)
        .with_context(|| format!("invalid transformer to bus at line {}", lineno))?;

    if u(line1, 2).map_or(false, |k| k != 0) {
        ctx.builder.diagnostics_mut().add_warning_at_line(
            "transformer",
            "three-winding transformer skipped",
            *lineno,
        );
        return Ok(());
    }

    let name = line1.get(10).cloned().filter(|s| !s.trim().is_empty());
    let in_service = f(line1, 11).map_or(true, |s| s != 0.0);

    let (_, line2) = &record[1];
    let r = f(line2, 0).unwrap_or(0.0);
    let x = f(line2, 1).unwrap_or(0.0);

    let (_, line3) = &record[2];
    let windv1 = f(line3, 0).unwrap_or(1.0);
    let shift = f(line3, 2).unwrap_or(0.0);
    let rate = f(line3, 3).filter(|v| *v > 0.0);

    let (_, line4) = &record[3];
    let windv2 = f(line4, 0).unwrap_or(1.0);
    let tap = if windv2 != 0.0 { windv1 / windv2 } else { windv1 };

    ctx.builder.add_branch(
        &from.to_string(),
        &to.to_string(),
        BranchSpec {
            name: name.map(|n| n.trim().to_string()),
            r_pu: r,
            x_pu: x,
            tap_ratio: tap,
            shift_deg: shift,
            rate_mva: rate,
            is_transformer: true,
            in_service,
            ..BranchSpec::default()
        },
    )?;
    Ok(())
}

/// Render a grid as a revision 33 RAW file.
pub fn export(grid: &Grid) -> String {
    let mut out = String::new();
    writeln!(out, "0, {}, {}, 0, 0, 60.00 / written by gridex", grid.base_mva, EXPORT_REVISION)
        .unwrap();
    writeln!(out, "{}", grid.name).unwrap();
    writeln!(out).unwrap();

    for bus in grid.buses() {
        let ide = if bus.in_service { 1 } else { 4 };
        writeln!(
            out,
            "{}, '{}', {}, {}, {}, {}, 1, 1.0, 0.0",
            bus.id,
            bus.name,
            bus.base_kv.0,
            ide,
            bus.area.unwrap_or(1),
            bus.zone.unwrap_or(1),
        )
        .unwrap();
    }
    writeln!(out, "0 / END OF BUS DATA, BEGIN LOAD DATA").unwrap();

    for load in grid.loads() {
        writeln!(
            out,
            "{}, '{}', {}, 1, 1, {}, {}, 0.0, 0.0, 0.0, 0.0, 1",
            load.bus,
            load.name,
            i32::from(load.in_service),
            load.p_mw.0,
            load.q_mvar.0,
        )
        .unwrap();
    }
    writeln!(out, "0 / END OF LOAD DATA, BEGIN FIXED SHUNT DATA").unwrap();

    for shunt in grid.shunts() {
        writeln!(
            out,
            "{}, '{}', {}, {}, {}",
            shunt.bus,
            shunt.name,
            i32::from(shunt.in_service),
            shunt.g_pu.0 * grid.base_mva,
            shunt.b_pu.0 * grid.base_mva,
        )
        .unwrap();
    }
    writeln!(out, "0 / END OF FIXED SHUNT DATA, BEGIN GENERATOR DATA").unwrap();

    for gen in grid.gens() {
        writeln!(
            out,
            "{}, '{}', {}, {}, {}, {}, {}, 0, {}, 0.0, 1.0, 0.0, 0.0, 1.0, {}, 100.0, {}, {}",
            gen.bus,
            gen.name,
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
    writeln!(out, "0 / END OF GENERATOR DATA, BEGIN BRANCH DATA").unwrap();

    for branch in grid.branches().filter(|b| !b.is_transformer) {
        writeln!(
            out,
            "{}, {}, '1', {}, {}, {}, {}, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, {}",
            branch.from_bus,
            branch.to_bus,
            branch.r_pu.0,
            branch.x_pu.0,
            branch.b_pu.0,
            branch.rate_mva.map_or(0.0, |v| v.0),
            i32::from(branch.in_service),
        )
        .unwrap();
    }
    writeln!(out, "0 / END OF BRANCH DATA, BEGIN TRANSFORMER DATA").unwrap();

    for branch in grid.branches().filter(|b| b.is_transformer) {
        writeln!(
            out,
            "{}, {}, 0, '1', 1, 1, 1, 0.0, 0.0, 2, '{}', {}",
            branch.from_bus,
            branch.to_bus,
            branch.name,
            i32::from(branch.in_service),
        )
        .unwrap();
        writeln!(out, "{}, {}, {}", branch.r_pu.0, branch.x_pu.0, grid.base_mva).unwrap();
        writeln!(
            out,
            "{}, 0.0, {}, {}",
            branch.tap_ratio,
            branch.shift.0,
            branch.rate_mva.map_or(0.0, |v| v.0),
        )
        .unwrap();
        writeln!(out, "1.0, 0.0").unwrap();
    }
    writeln!(out, "0 / END OF TRANSFORMER DATA").unwrap();
    writeln!(out, "Q").unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridex_core::BusId;

    const CASE_V33: &str = "\
0, 100.0, 33, 0, 0, 60.00 / PSS(R)E 33 RAW\n\
test case\n\
\n\
1, 'NORTH', 230.0, 3, 1, 1, 1, 1.0, 0.0\n\
2, 'SOUTH', 230.0, 1, 1, 1, 1, 1.0, 0.0\n\
0 / END OF BUS DATA, BEGIN LOAD DATA\n\
2, '1', 1, 1, 1, 120.0, 45.0, 0.0, 0.0, 0.0, 0.0, 1\n\
0 / END OF LOAD DATA, BEGIN FIXED SHUNT DATA\n\
2, '1', 1, 0.0, 25.0\n\
0 / END OF FIXED SHUNT DATA, BEGIN GENERATOR DATA\n\
1, '1', 150.0, 30.0, 90.0, -90.0, 1.02, 0, 100.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1, 100.0, 250.0, 20.0\n\
0 / END OF GENERATOR DATA, BEGIN BRANCH DATA\n\
1, 2, '1', 0.012, 0.092, 0.064, 200.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1\n\
0 / END OF BRANCH DATA, BEGIN TRANSFORMER DATA\n\
1, 2, 0, '1', 1, 1, 1, 0.0, 0.0, 2, 'T1', 1\n\
0.005, 0.11, 100.0\n\
0.98, 0.0, 2.5, 180.0\n\
1.0, 0.0\n\
0 / END OF TRANSFORMER DATA\n\
Q\n";

    #[test]
    fn v33_case_parses() {
        let (grid, diag) = parse(CASE_V33).unwrap();
        assert!(!diag.has_errors());
        assert_eq!(grid.base_mva, 100.0);
        assert_eq!(grid.bus_count(), 2);
        assert_eq!(grid.load_count(), 1);
        assert_eq!(grid.shunt_count(), 1);
        assert_eq!(grid.gen_count(), 1);
        assert_eq!(grid.branch_count(), 2);

        assert_eq!(grid.bus(BusId::new(1)).unwrap().name, "NORTH");
        let shunt = grid.shunts().next().unwrap();
        assert_eq!(shunt.b_pu.0, 0.25);
    }

    #[test]
    fn transformer_record_imported() {
        let (grid, _) = parse(CASE_V33).unwrap();
        let tx = grid.branches().find(|b| b.is_transformer).unwrap();
        assert_eq!(tx.name, "T1");
        assert_eq!(tx.tap_ratio, 0.98);
        assert_eq!(tx.shift.0, 2.5);
        assert_eq!(tx.rate_mva.unwrap().0, 180.0);
        assert_eq!(tx.x_pu.0, 0.11);
    }

    #[test]
    fn old_revision_bus_shunt_columns() {
        let case = "\
0, 100.0, 29\n\
old case\n\
\n\
1, 'A', 132.0, 1, 0.0, 30.0, 2, 5, 1.0, 0.0, 1\n\
0 / END OF BUS DATA\n\
0 / END OF LOAD DATA\n\
0 / END OF GENERATOR DATA\n\
0 / END OF BRANCH DATA\n\
0 / END OF TRANSFORMER DATA\n\
Q\n";
        let (grid, _) = parse(case).unwrap();
        assert_eq!(grid.bus_count(), 1);
        assert_eq!(grid.shunt_count(), 1);
        assert_eq!(grid.shunts().next().unwrap().b_pu.0, 0.3);
        let bus = grid.bus(BusId::new(1)).unwrap();
        assert_eq!(bus.area, Some(2));
        assert_eq!(bus.zone, Some(5));
    }

    #[test]
    fn out_of_range_revision_refused() {
        let case = "0, 100.0, 36\ntitle\n\n0 /\n";
        let err = parse(case).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn dangling_load_bus_is_structural() {
        let case = "\
0, 100.0, 33\n\
t\n\
\n\
1, 'A', 230.0, 1, 1, 1, 1, 1.0, 0.0\n\
0 / END OF BUS DATA\n\
9, '1', 1, 1, 1, 10.0, 5.0\n\
0 /\n";
        let err = parse(case).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }

    #[test]
    fn quoted_fields_survive_commas() {
        let fields = split_record("1, 'NAME, WITH COMMA', 230.0 / trailing");
        assert_eq!(fields[1], "NAME, WITH COMMA");
        assert_eq!(fields[2], "230.0");
    }

    #[test]
    fn export_round_trips_semantics() {
        let (grid, _) = parse(CASE_V33).unwrap();
        let text = export(&grid);
        let (back, _) = parse(&text).unwrap();
        assert_eq!(back.bus_count(), grid.bus_count());
        assert_eq!(back.branch_count(), grid.branch_count());
        assert_eq!(back.gen_count(), grid.gen_count());
        assert_eq!(back.load_count(), grid.load_count());
        assert_eq!(back.shunt_count(), grid.shunt_count());
        let tx = back.branches().find(|b| b.is_transformer).unwrap();
        assert_eq!(tx.tap_ratio, 0.98);
    }
}
