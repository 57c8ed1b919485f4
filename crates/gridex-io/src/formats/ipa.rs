//! IPA JSON dialect (.ipa), import only.
//!
//! A flat JSON document with a numeric `version` and top-level entity
//! arrays. Only dialect version 1 is accepted. Buses carry string ids and
//! every device names its bus by that string; impedances are per-unit.
//!
//! The dialect is distinguishable from the packed JSON container by its
//! `buses` array (the container has `tables`/`format_version` instead),
//! which content sniffing relies on.

use anyhow::{Context, Result};
use gridex_core::{Diagnostics, Grid, GridError};
use serde::Deserialize;

use crate::builder::{BranchSpec, BusSpec, GenSpec, GridBuilder, LoadSpec, ShuntSpec};

const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpaDocument {
    version: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    base_mva: Option<f64>,
    buses: Vec<IpaBus>,
    #[serde(default)]
    branches: Vec<IpaBranch>,
    #[serde(default)]
    generators: Vec<IpaGen>,
    #[serde(default)]
    loads: Vec<IpaLoad>,
    #[serde(default)]
    shunts: Vec<IpaShunt>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpaBus {
    id: String,
    #[serde(default)]
    name: Option<String>,
    kv: f64,
    #[serde(default)]
    vmin: Option<f64>,
    #[serde(default)]
    vmax: Option<f64>,
    #[serde(default = "default_true")]
    in_service: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpaBranch {
    #[serde(default)]
    name: Option<String>,
    from: String,
    to: String,
    r: f64,
    x: f64,
    #[serde(default)]
    b: f64,
    #[serde(default)]
    tap: Option<f64>,
    #[serde(default)]
    shift: Option<f64>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default = "default_true")]
    in_service: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpaGen {
    #[serde(default)]
    name: Option<String>,
    bus: String,
    p: f64,
    #[serde(default)]
    q: f64,
    #[serde(default)]
    p_min: Option<f64>,
    #[serde(default)]
    p_max: Option<f64>,
    #[serde(default)]
    vset: Option<f64>,
    #[serde(default = "default_true")]
    in_service: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpaLoad {
    #[serde(default)]
    name: Option<String>,
    bus: String,
    p: f64,
    #[serde(default)]
    q: f64,
    #[serde(default = "default_true")]
    in_service: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpaShunt {
    #[serde(default)]
    name: Option<String>,
    bus: String,
    #[serde(default)]
    g: f64,
    #[serde(default)]
    b: f64,
    #[serde(default = "default_true")]
    in_service: bool,
}

fn default_true() -> bool {
    true
}

/// Parse IPA JSON text into a canonical grid.
pub fn parse(content: &str) -> Result<(Grid, Diagnostics)> {
    let doc: IpaDocument = serde_json::from_str(content)
        .map_err(|e| GridError::StructuralParse(format!("malformed IPA document: {}", e)))?;

    if doc.version != SUPPORTED_VERSION {
        return Err(GridError::UnsupportedVersion {
            format: "ipa".into(),
            version: doc.version.to_string(),
        }
        .into());
    }

    let mut builder = GridBuilder::new(doc.name.unwrap_or_else(|| "ipa model".into()));
    if let Some(base) = doc.base_mva {
        builder.set_base_mva(base);
    }

    for bus in &doc.buses {
        builder
            .add_bus(
                &bus.id,
                BusSpec {
                    name: bus.name.clone(),
                    base_kv: bus.kv,
                    vmin_pu: bus.vmin,
                    vmax_pu: bus.vmax,
                    in_service: bus.in_service,
                    ..BusSpec::default()
                },
            )
            .with_context(|| format!("bus '{}'", bus.id))?;
    }

    for branch in &doc.branches {
        let tap = branch.tap.unwrap_or(1.0);
        let shift = branch.shift.unwrap_or(0.0);
        builder.add_branch(
            &branch.from,
            &branch.to,
            BranchSpec {
                name: branch.name.clone(),
                r_pu: branch.r,
                x_pu: branch.x,
                b_pu: branch.b,
                tap_ratio: tap,
                shift_deg: shift,
                rate_mva: branch.rating.filter(|v| *v > 0.0),
                is_transformer: tap != 1.0 || shift != 0.0,
                in_service: branch.in_service,
            },
        )?;
    }

    for gen in &doc.generators {
        builder.add_gen(
            &gen.bus,
            GenSpec {
                name: gen.name.clone(),
                p_mw: gen.p,
                q_mvar: gen.q,
                pmin_mw: gen.p_min,
                pmax_mw: gen.p_max,
                vset_pu: gen.vset,
                in_service: gen.in_service,
                ..GenSpec::default()
            },
        )?;
    }

    for load in &doc.loads {
        builder.add_load(
            &load.bus,
            LoadSpec {
                name: load.name.clone(),
                p_mw: load.p,
                q_mvar: load.q,
                in_service: load.in_service,
            },
        )?;
    }

    for shunt in &doc.shunts {
        builder.add_shunt(
            &shunt.bus,
            ShuntSpec {
                name: shunt.name.clone(),
                g_pu: shunt.g,
                b_pu: shunt.b,
                in_service: shunt.in_service,
            },
        )?;
    }

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_IPA: &str = r#"{
        "version": 1,
        "name": "two bus",
        "baseMva": 100.0,
        "buses": [
            {"id": "a", "name": "Bus A", "kv": 220.0},
            {"id": "b", "name": "Bus B", "kv": 220.0, "inService": false}
        ],
        "branches": [
            {"from": "a", "to": "b", "r": 0.01, "x": 0.08, "b": 0.02, "rating": 120.0}
        ],
        "generators": [
            {"bus": "a", "p": 75.0, "q": 12.0, "vset": 1.03}
        ],
        "loads": [
            {"bus": "b", "p": 70.0, "q": 20.0}
        ]
    }"#;

    #[test]
    fn document_parses() {
        let (grid, diag) = parse(SMALL_IPA).unwrap();
        assert!(!diag.has_errors());
        assert_eq!(grid.name, "two bus");
        assert_eq!(grid.bus_count(), 2);
        assert_eq!(grid.branch_count(), 1);
        assert_eq!(grid.gen_count(), 1);
        assert_eq!(grid.load_count(), 1);

        let buses: Vec<_> = grid.buses().collect();
        assert_eq!(buses[0].name, "Bus A");
        assert!(!buses[1].in_service);
        let branch = grid.branches().next().unwrap();
        assert_eq!(branch.rate_mva.unwrap().0, 120.0);
        assert!(!branch.is_transformer);
    }

    #[test]
    fn unsupported_version_refused() {
        let doc = SMALL_IPA.replace("\"version\": 1", "\"version\": 2");
        let err = parse(&doc).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn malformed_json_is_structural() {
        let err = parse("{\"version\": 1, \"buses\": [").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }

    #[test]
    fn dangling_reference_is_structural() {
        let doc = SMALL_IPA.replace("\"bus\": \"b\"", "\"bus\": \"zzz\"");
        let err = parse(&doc).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }

    #[test]
    fn tap_marks_transformer() {
        let doc = SMALL_IPA.replace("\"rating\": 120.0", "\"rating\": 120.0, \"tap\": 0.95");
        let (grid, _) = parse(&doc).unwrap();
        assert!(grid.branches().next().unwrap().is_transformer);
    }
}
