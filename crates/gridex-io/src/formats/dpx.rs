//! DPX block text (.dpx), import only.
//!
//! A DPX file opens with a `DPX` magic line and groups records into
//! `BEGIN <BLOCK>` / `END <BLOCK>` sections with fixed positional columns
//! and double-quoted names:
//!
//! ```text
//! DPX 1
//! BEGIN NODES
//!   1 "North" 110.0 1
//! END NODES
//! ```
//!
//! Impedances are already per-unit. Blocks other than the known six are
//! skipped with a warning. There is no exporter.

use anyhow::Result;
use gridex_core::{Diagnostics, Grid, GridError};

use crate::builder::{BranchSpec, BusSpec, GenSpec, GridBuilder, LoadSpec, ShuntSpec};
use crate::convert::parse_flexible_f64;

const KNOWN_BLOCKS: &[&str] = &["NODES", "LINKS", "TRAFOS", "LOADS", "GENS", "SHUNTS"];

/// Split a record on whitespace, keeping double-quoted fields intact.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for c in line.chars() {
        match c {
            '"' => {
                in_quote = !in_quote;
                if !in_quote {
                    fields.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !in_quote => {
                if !current.is_empty() {
                    fields.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}

struct Record<'a> {
    block: &'a str,
    lineno: usize,
    fields: Vec<String>,
}

impl Record<'_> {
    fn text(&self, idx: usize, what: &str) -> Result<&str> {
        self.fields.get(idx).map(|s| s.as_str()).ok_or_else(|| {
            GridError::StructuralParse(format!(
                "{} record at line {} is missing {}",
                self.block, self.lineno, what
            ))
            .into()
        })
    }

    fn num(&self, idx: usize, what: &str) -> Result<f64> {
        let raw = self.text(idx, what)?;
        parse_flexible_f64(raw).ok_or_else(|| {
            GridError::StructuralParse(format!(
                "{} record at line {}: {} is not numeric",
                self.block, self.lineno, what
            ))
            .into()
        })
    }

    fn opt_num(&self, idx: usize) -> Option<f64> {
        self.fields.get(idx).and_then(|s| parse_flexible_f64(s))
    }

    fn status(&self, idx: usize) -> bool {
        self.opt_num(idx).map_or(true, |v| v != 0.0)
    }

    fn name(&self, idx: usize) -> Option<String> {
        self.fields.get(idx).cloned().filter(|s| !s.is_empty())
    }
}

/// Parse DPX text into a canonical grid.
pub fn parse(content: &str) -> Result<(Grid, Diagnostics)> {
    let mut lines = content.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

    match lines.next() {
        Some((_, first)) if first.starts_with("DPX") => {}
        _ => return Err(GridError::StructuralParse("missing DPX magic line".into()).into()),
    }

    let mut builder = GridBuilder::new("dpx model");
    let mut block: Option<String> = None;
    let mut saw_nodes = false;

    for (lineno, line) in lines {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("BEGIN ") {
            let name = rest.trim().to_uppercase();
            if !KNOWN_BLOCKS.contains(&name.as_str()) {
                builder
                    .diagnostics_mut()
                    .add_warning_at_line("block", &format!("unknown block '{}' skipped", name), lineno);
            }
            block = Some(name);
            continue;
        }
        if line.starts_with("END") {
            block = None;
            continue;
        }
        let current = match &block {
            Some(b) if KNOWN_BLOCKS.contains(&b.as_str()) => b.clone(),
            _ => continue,
        };

        let rec = Record {
            block: &current,
            lineno,
            fields: split_fields(line),
        };

        match current.as_str() {
            "NODES" => {
                saw_nodes = true;
                let id = rec.text(0, "node id")?.to_string();
                builder.add_bus(
                    &id,
                    BusSpec {
                        name: rec.name(1),
                        base_kv: rec.num(2, "nominal kV")?,
                        in_service: rec.status(3),
                        ..BusSpec::default()
                    },
                )?;
            }
            "LINKS" => {
                let from = rec.text(2, "from node")?.to_string();
                let to = rec.text(3, "to node")?.to_string();
                builder.add_branch(
                    &from,
                    &to,
                    BranchSpec {
                        name: rec.name(1),
                        r_pu: rec.num(4, "resistance")?,
                        x_pu: rec.num(5, "reactance")?,
                        b_pu: rec.opt_num(6).unwrap_or(0.0),
                        in_service: rec.status(7),
                        ..BranchSpec::default()
                    },
                )?;
            }
            "TRAFOS" => {
                let from = rec.text(2, "from node")?.to_string();
                let to = rec.text(3, "to node")?.to_string();
                builder.add_branch(
                    &from,
                    &to,
                    BranchSpec {
                        name: rec.name(1),
                        r_pu: rec.num(4, "resistance")?,
                        x_pu: rec.num(5, "reactance")?,
                        tap_ratio: rec.opt_num(6).unwrap_or(1.0),
                        shift_deg: rec.opt_num(7).unwrap_or(0.0),
                        rate_mva: rec.opt_num(8).filter(|v| *v > 0.0),
                        is_transformer: true,
                        in_service: rec.status(9),
                        ..BranchSpec::default()
                    },
                )?;
            }
            "LOADS" => {
                let bus = rec.text(2, "node")?.to_string();
                builder.add_load(
                    &bus,
                    LoadSpec {
                        name: rec.name(1),
                        p_mw: rec.num(3, "active power")?,
                        q_mvar: rec.opt_num(4).unwrap_or(0.0),
                        in_service: rec.status(5),
                    },
                )?;
            }
            "GENS" => {
                let bus = rec.text(2, "node")?.to_string();
                builder.add_gen(
                    &bus,
                    GenSpec {
                        name: rec.name(1),
                        p_mw: rec.num(3, "active power")?,
                        q_mvar: rec.opt_num(4).unwrap_or(0.0),
                        vset_pu: rec.opt_num(5),
                        in_service: rec.status(6),
                        ..GenSpec::default()
                    },
                )?;
            }
            "SHUNTS" => {
                let bus = rec.text(2, "node")?.to_string();
                builder.add_shunt(
                    &bus,
                    ShuntSpec {
                        name: rec.name(1),
                        g_pu: rec.opt_num(3).unwrap_or(0.0),
                        b_pu: rec.opt_num(4).unwrap_or(0.0),
                        in_service: rec.status(5),
                    },
                )?;
            }
            _ => unreachable!("filtered above"),
        }
    }

    if !saw_nodes {
        return Err(GridError::StructuralParse("no NODES block".into()).into());
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_DPX: &str = "\
DPX 1\n\
# two-node example\n\
BEGIN NODES\n\
  N1 \"North Station\" 110.0 1\n\
  N2 \"South Station\" 110.0 1\n\
END NODES\n\
BEGIN LINKS\n\
  L1 \"North-South\" N1 N2 0.02 0.14 0.03 1\n\
END LINKS\n\
BEGIN LOADS\n\
  D1 \"City\" N2 48.0 15.0 1\n\
END LOADS\n\
BEGIN GENS\n\
  G1 \"Plant\" N1 55.0 8.0 1.01 1\n\
END GENS\n\
";

    #[test]
    fn blocks_parse() {
        let (grid, diag) = parse(SMALL_DPX).unwrap();
        assert!(!diag.has_errors());
        assert_eq!(grid.bus_count(), 2);
        assert_eq!(grid.branch_count(), 1);
        assert_eq!(grid.load_count(), 1);
        assert_eq!(grid.gen_count(), 1);

        assert_eq!(grid.buses().next().unwrap().name, "North Station");
        let branch = grid.branches().next().unwrap();
        assert_eq!(branch.x_pu.0, 0.14);
        assert!(!branch.is_transformer);
    }

    #[test]
    fn quoted_names_keep_spaces() {
        let fields = split_fields("N1 \"North Station\" 110.0 1");
        assert_eq!(fields, vec!["N1", "North Station", "110.0", "1"]);
    }

    #[test]
    fn missing_magic_is_structural() {
        let err = parse("BEGIN NODES\n1 \"A\" 110 1\nEND NODES\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }

    #[test]
    fn missing_nodes_block_is_structural() {
        let err = parse("DPX 1\nBEGIN LOADS\nEND LOADS\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }

    #[test]
    fn unknown_block_warns_and_skips() {
        let dpx = "\
DPX 1\n\
BEGIN NODES\n\
  N1 \"A\" 110 1\n\
END NODES\n\
BEGIN FEEDERS\n\
  junk here\n\
END FEEDERS\n\
";
        let (grid, diag) = parse(dpx).unwrap();
        assert_eq!(grid.bus_count(), 1);
        assert!(diag.warnings().any(|w| w.message.contains("FEEDERS")));
    }

    #[test]
    fn dangling_link_is_structural() {
        let dpx = "\
DPX 1\n\
BEGIN NODES\n\
  N1 \"A\" 110 1\n\
END NODES\n\
BEGIN LINKS\n\
  L1 \"bad\" N1 N9 0.01 0.1 0 1\n\
END LINKS\n\
";
        let err = parse(dpx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }
}
