//! DIgSILENT DGS tables (.dgs), import only.
//!
//! DGS is a sectioned text dump: each section opens with a `$$ClassName`
//! header declaring attribute names (`$$ElmTerm;ID(a:40);loc_name(a:40);
//! uknom(r)`) followed by one semicolon-separated row per object. Attribute
//! positions come from the header, so reordered exports still parse.
//!
//! Line impedances are ohms (`rline`/`xline`) and get converted to per-unit
//! on the from-terminal's nominal voltage. There is no DGS exporter; the
//! format is a one-way bridge out of PowerFactory.

use std::collections::HashMap;

use anyhow::Result;
use gridex_core::{ohms_to_per_unit, Diagnostics, Grid, GridError, Kilovolts};
use tracing::debug;

use crate::builder::{BranchSpec, BusSpec, GenSpec, GridBuilder, LoadSpec, ShuntSpec};
use crate::convert::parse_flexible_f64;

/// One section: attribute name -> column index, plus raw rows.
#[derive(Debug, Default)]
struct Section {
    columns: HashMap<String, usize>,
    rows: Vec<(usize, Vec<String>)>,
}

impl Section {
    fn get<'a>(&self, row: &'a [String], attr: &str) -> Option<&'a str> {
        self.columns
            .get(attr)
            .and_then(|&i| row.get(i))
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    fn num(&self, row: &[String], attr: &str) -> Option<f64> {
        self.get(row, attr).and_then(parse_flexible_f64)
    }

    fn in_service(&self, row: &[String]) -> bool {
        // outserv is the out-of-service flag
        self.num(row, "outserv").map_or(true, |v| v == 0.0)
    }
}

/// Strip the type suffix of a header attribute ("uknom(r)" -> "uknom").
fn attr_name(decl: &str) -> &str {
    decl.split('(').next().unwrap_or(decl).trim()
}

fn split_sections(content: &str) -> HashMap<String, Section> {
    let mut sections: HashMap<String, Section> = HashMap::new();
    let mut current: Option<String> = None;

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('*') {
            continue;
        }
        if let Some(header) = line.strip_prefix("$$") {
            let mut parts = header.split(';');
            let class = parts.next().unwrap_or("").trim().to_string();
            let mut section = Section::default();
            for (idx, decl) in parts.enumerate() {
                section.columns.insert(attr_name(decl).to_string(), idx);
            }
            sections.insert(class.clone(), section);
            current = Some(class);
        } else if let Some(class) = &current {
            let row: Vec<String> = line.split(';').map(|s| s.trim().to_string()).collect();
            if let Some(section) = sections.get_mut(class) {
                section.rows.push((lineno + 1, row));
            }
        }
    }
    sections
}

fn require<'a>(
    section: &Section,
    row: &'a [String],
    attr: &str,
    class: &str,
    lineno: usize,
) -> Result<&'a str> {
    section.get(row, attr).ok_or_else(|| {
        GridError::StructuralParse(format!(
            "{} row at line {} is missing '{}'",
            class, lineno, attr
        ))
        .into()
    })
}

/// Parse DGS text into a canonical grid.
pub fn parse(content: &str) -> Result<(Grid, Diagnostics)> {
    let sections = split_sections(content);
    if !sections.contains_key("ElmTerm") {
        return Err(GridError::StructuralParse("no ElmTerm section".into()).into());
    }
    debug!(sections = sections.len(), "dgs sections split");

    let mut builder = GridBuilder::new("dgs model");
    let base_mva = builder.base_mva();

    // nominal kV per terminal key, needed for ohm conversion later
    let mut terminal_kv: HashMap<String, f64> = HashMap::new();

    let terms = &sections["ElmTerm"];
    for (lineno, row) in &terms.rows {
        let id = require(terms, row, "ID", "ElmTerm", *lineno)?;
        let kv = terms.num(row, "uknom").unwrap_or(0.0);
        terminal_kv.insert(id.to_string(), kv);
        builder.add_bus(
            id,
            BusSpec {
                name: terms.get(row, "loc_name").map(|s| s.to_string()),
                base_kv: kv,
                in_service: terms.in_service(row),
                ..BusSpec::default()
            },
        )?;
    }

    if let Some(lines) = sections.get("ElmLne") {
        for (lineno, row) in &lines.rows {
            let bus1 = require(lines, row, "bus1", "ElmLne", *lineno)?;
            let bus2 = require(lines, row, "bus2", "ElmLne", *lineno)?;
            let kv = terminal_kv.get(bus1).copied().unwrap_or(0.0);
            if kv <= 0.0 {
                return Err(GridError::StructuralParse(format!(
                    "ElmLne row at line {}: terminal '{}' has no nominal voltage",
                    lineno, bus1
                ))
                .into());
            }
            builder.add_branch(
                bus1,
                bus2,
                BranchSpec {
                    name: lines.get(row, "loc_name").map(|s| s.to_string()),
                    r_pu: ohms_to_per_unit(lines.num(row, "rline").unwrap_or(0.0), Kilovolts(kv), base_mva).0,
                    x_pu: ohms_to_per_unit(lines.num(row, "xline").unwrap_or(0.0), Kilovolts(kv), base_mva).0,
                    in_service: lines.in_service(row),
                    ..BranchSpec::default()
                },
            )?;
        }
    }

    if let Some(trafos) = sections.get("ElmTr2") {
        for (lineno, row) in &trafos.rows {
            let bus1 = require(trafos, row, "bus1", "ElmTr2", *lineno)?;
            let bus2 = require(trafos, row, "bus2", "ElmTr2", *lineno)?;
            builder.add_branch(
                bus1,
                bus2,
                BranchSpec {
                    name: trafos.get(row, "loc_name").map(|s| s.to_string()),
                    // uk is the short-circuit voltage in percent on the
                    // transformer rating; snom converts to the system base
                    x_pu: trafos.num(row, "uktr").unwrap_or(0.0) / 100.0
                        * (base_mva / trafos.num(row, "strn").unwrap_or(base_mva)),
                    tap_ratio: 1.0 + trafos.num(row, "nntap").unwrap_or(0.0)
                        * trafos.num(row, "dutap").unwrap_or(0.0) / 100.0,
                    rate_mva: trafos.num(row, "strn"),
                    is_transformer: true,
                    in_service: trafos.in_service(row),
                    ..BranchSpec::default()
                },
            )?;
        }
    }

    if let Some(loads) = sections.get("ElmLod") {
        for (lineno, row) in &loads.rows {
            let bus = require(loads, row, "bus1", "ElmLod", *lineno)?;
            builder.add_load(
                bus,
                LoadSpec {
                    name: loads.get(row, "loc_name").map(|s| s.to_string()),
                    p_mw: loads.num(row, "plini").unwrap_or(0.0),
                    q_mvar: loads.num(row, "qlini").unwrap_or(0.0),
                    in_service: loads.in_service(row),
                },
            )?;
        }
    }

    if let Some(syms) = sections.get("ElmSym") {
        for (lineno, row) in &syms.rows {
            let bus = require(syms, row, "bus1", "ElmSym", *lineno)?;
            builder.add_gen(
                bus,
                GenSpec {
                    name: syms.get(row, "loc_name").map(|s| s.to_string()),
                    p_mw: syms.num(row, "pgini").unwrap_or(0.0),
                    q_mvar: syms.num(row, "qgini").unwrap_or(0.0),
                    pmin_mw: syms.num(row, "Pmin_uc"),
                    pmax_mw: syms.num(row, "Pmax_uc"),
                    vset_pu: syms.num(row, "usetp"),
                    in_service: syms.in_service(row),
                    ..GenSpec::default()
                },
            )?;
        }
    }

    if let Some(shunts) = sections.get("ElmShnt") {
        for (lineno, row) in &shunts.rows {
            let bus = require(shunts, row, "bus1", "ElmShnt", *lineno)?;
            // qcapn is the reactive rating in Mvar at nominal voltage
            let q = shunts.num(row, "qcapn").unwrap_or(0.0);
            builder.add_shunt(
                bus,
                ShuntSpec {
                    name: shunts.get(row, "loc_name").map(|s| s.to_string()),
                    b_pu: q / base_mva,
                    in_service: shunts.in_service(row),
                    ..ShuntSpec::default()
                },
            )?;
        }
    }

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_DGS: &str = "\
* exported table dump\n\
$$ElmTerm;ID(a:40);loc_name(a:40);uknom(r);outserv(i)\n\
1;Station A;110;0\n\
2;Station B;110;0\n\
$$ElmLne;ID(a:40);loc_name(a:40);bus1(p);bus2(p);rline(r);xline(r);outserv(i)\n\
10;A-B;1;2;2,42;12,1;0\n\
$$ElmLod;ID(a:40);loc_name(a:40);bus1(p);plini(r);qlini(r);outserv(i)\n\
20;City;2;54;17;0\n\
$$ElmSym;ID(a:40);loc_name(a:40);bus1(p);pgini(r);qgini(r);usetp(r);outserv(i)\n\
30;Unit 1;1;60;5;1,02;0\n\
";

    #[test]
    fn sections_parse_by_header_position() {
        let (grid, diag) = parse(SMALL_DGS).unwrap();
        assert!(!diag.has_errors());
        assert_eq!(grid.bus_count(), 2);
        assert_eq!(grid.branch_count(), 1);
        assert_eq!(grid.load_count(), 1);
        assert_eq!(grid.gen_count(), 1);
        assert_eq!(grid.buses().next().unwrap().name, "Station A");
    }

    #[test]
    fn ohms_and_decimal_commas_converted() {
        let (grid, _) = parse(SMALL_DGS).unwrap();
        let branch = grid.branches().next().unwrap();
        // 2.42 ohm on 110 kV / 100 MVA = 0.02 pu
        assert!((branch.r_pu.0 - 0.02).abs() < 1e-12);
        assert!((branch.x_pu.0 - 0.1).abs() < 1e-12);
        let gen = grid.gens().next().unwrap();
        assert_eq!(gen.vset_pu.unwrap().0, 1.02);
    }

    #[test]
    fn reordered_columns_still_parse() {
        let reordered = "\
$$ElmTerm;loc_name(a:40);uknom(r);ID(a:40)\n\
Station A;110;1\n\
$$ElmLod;bus1(p);qlini(r);plini(r);ID(a:40)\n\
1;17;54;20\n\
";
        let (grid, _) = parse(reordered).unwrap();
        assert_eq!(grid.bus_count(), 1);
        assert_eq!(grid.loads().next().unwrap().p_mw.0, 54.0);
    }

    #[test]
    fn missing_terminal_section_is_structural() {
        let err = parse("$$ElmLod;ID(a:40);bus1(p);plini(r)\n20;1;5\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }

    #[test]
    fn dangling_device_reference_is_structural() {
        let dgs = "\
$$ElmTerm;ID(a:40);uknom(r)\n\
1;110\n\
$$ElmLod;ID(a:40);bus1(p);plini(r)\n\
20;9;5\n\
";
        let err = parse(dgs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }

    #[test]
    fn out_of_service_flag_respected() {
        let dgs = "\
$$ElmTerm;ID(a:40);uknom(r);outserv(i)\n\
1;110;1\n\
";
        let (grid, _) = parse(dgs).unwrap();
        assert!(!grid.buses().next().unwrap().in_service);
    }
}
