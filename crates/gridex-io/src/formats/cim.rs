//! CIM RDF/XML (.xml / .rdf), import and export.
//!
//! Accepts the CIM 14 and CIM 16 profile namespaces and refuses others.
//! Parsing is two-phase: a single pass flattens the document into an object
//! table (rdf:ID / rdf:about keyed, class plus property text plus resource
//! references), then model construction resolves references against that
//! table. Equipment endpoints come from `Terminal` objects linking
//! `ConductingEquipment` to `TopologicalNode`, as the profiles define them.
//!
//! Impedances are ohms in CIM; they are converted to per-unit on the from
//! bus's base voltage at import and converted back at export.

use std::collections::HashMap;
use std::fmt::Write as _;

use anyhow::Result;
use gridex_core::{ohms_to_per_unit, per_unit_to_ohms, Diagnostics, Grid, GridError, Kilovolts};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::builder::{BranchSpec, BusSpec, GenSpec, GridBuilder, LoadSpec, ShuntSpec};

const CIM14_NS: &str = "CIM-schema-cim14";
const CIM16_NS: &str = "CIM-schema-cim16";
const EXPORT_NS: &str = "http://iec.ch/TC57/2013/CIM-schema-cim16#";

/// One flattened RDF object: class name, text properties, resource refs.
#[derive(Debug, Default)]
struct CimObject {
    class: String,
    props: HashMap<String, String>,
    refs: HashMap<String, String>,
}

fn attribute(e: &BytesStart<'_>, wanted: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        // match both "rdf:ID" and bare "ID" spellings
        if key == wanted || key.ends_with(&format!(":{}", wanted.rsplit(':').next().unwrap())) {
            return Ok(Some(String::from_utf8_lossy(&attr.value).to_string()));
        }
    }
    Ok(None)
}

fn local(tag: &[u8]) -> String {
    let s = String::from_utf8_lossy(tag);
    s.rsplit(':').next().unwrap_or(&s).to_string()
}

/// Strip the class prefix of a property tag ("ACLineSegment.r" -> "r").
fn prop_name(tag: &str) -> String {
    tag.rsplit('.').next().unwrap_or(tag).to_string()
}

fn resolve_ref(value: &str) -> String {
    value.trim_start_matches('#').to_string()
}

/// Flatten one document into (profile namespace, object table).
fn parse_document(xml: &str) -> Result<(String, HashMap<String, CimObject>)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut namespace = String::new();
    let mut objects: HashMap<String, CimObject> = HashMap::new();
    let mut current: Option<(String, CimObject)> = None;
    let mut active_prop: Option<String> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                let tag = local(e.name().as_ref());
                if depth == 1 {
                    // rdf:RDF root carries the profile namespace
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        if key == "xmlns:cim" || key == "xmlns" {
                            namespace = String::from_utf8_lossy(&attr.value).to_string();
                        }
                    }
                } else if depth == 2 {
                    let id = attribute(e, "rdf:ID")?
                        .or(attribute(e, "rdf:about")?)
                        .map(|v| resolve_ref(&v));
                    if let Some(id) = id {
                        current = Some((
                            id,
                            CimObject {
                                class: tag,
                                ..CimObject::default()
                            },
                        ));
                    }
                } else if depth == 3 {
                    active_prop = Some(prop_name(&tag));
                }
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 2 {
                    if let Some((_, obj)) = current.as_mut() {
                        let tag = local(e.name().as_ref());
                        if let Some(resource) = attribute(e, "rdf:resource")? {
                            obj.refs.insert(prop_name(&tag), resolve_ref(&resource));
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some((_, obj)), Some(prop)) = (current.as_mut(), active_prop.as_ref()) {
                    obj.props
                        .insert(prop.clone(), e.unescape()?.trim().to_string());
                }
            }
            Ok(Event::End(_)) => {
                if depth == 3 {
                    active_prop = None;
                } else if depth == 2 {
                    if let Some((id, obj)) = current.take() {
                        objects.insert(id, obj);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(
                    GridError::StructuralParse(format!("malformed RDF/XML: {}", e)).into(),
                )
            }
            _ => {}
        }
    }
    Ok((namespace, objects))
}

fn check_namespace(namespace: &str) -> Result<u32> {
    if namespace.contains(CIM14_NS) {
        Ok(14)
    } else if namespace.contains(CIM16_NS) {
        Ok(16)
    } else {
        Err(GridError::UnsupportedVersion {
            format: "cim".into(),
            version: if namespace.is_empty() {
                "missing namespace".into()
            } else {
                namespace.to_string()
            },
        }
        .into())
    }
}

fn prop_f64(obj: &CimObject, name: &str) -> Option<f64> {
    obj.props.get(name).and_then(|s| s.parse().ok())
}

fn in_service(obj: &CimObject) -> bool {
    obj.props
        .get("inService")
        .map_or(true, |s| s.trim() != "false")
}

/// Parse CIM RDF/XML text into a canonical grid.
pub fn parse(xml: &str) -> Result<(Grid, Diagnostics)> {
    let (namespace, objects) = parse_document(xml)?;
    let profile = check_namespace(&namespace)?;
    debug!(profile, objects = objects.len(), "cim document flattened");

    let mut builder = GridBuilder::new("cim model");
    let base_mva = builder.base_mva();

    // equipment id -> topological nodes, in terminal sequence order
    let mut endpoints: HashMap<&str, Vec<&str>> = HashMap::new();
    for obj in objects.values() {
        if obj.class == "Terminal" {
            if let (Some(eq), Some(node)) = (
                obj.refs.get("ConductingEquipment"),
                obj.refs
                    .get("TopologicalNode")
                    .or_else(|| obj.refs.get("ConnectivityNode")),
            ) {
                endpoints.entry(eq.as_str()).or_default().push(node.as_str());
            }
        }
    }

    // nominal voltages for TopologicalNode.BaseVoltage references
    let mut base_voltages: HashMap<&str, f64> = HashMap::new();
    for (id, obj) in &objects {
        if obj.class == "BaseVoltage" {
            if let Some(kv) = prop_f64(obj, "nominalVoltage") {
                base_voltages.insert(id, kv);
            }
        }
    }

    let node_classes = ["TopologicalNode", "BusbarSection", "ConnectivityNode"];
    let mut node_ids: Vec<&String> = objects
        .iter()
        .filter(|(_, o)| node_classes.contains(&o.class.as_str()))
        .map(|(id, _)| id)
        .collect();
    node_ids.sort(); // GUID keys; sorted for deterministic id assignment

    for id in &node_ids {
        let obj = &objects[*id];
        let base_kv = obj
            .refs
            .get("BaseVoltage")
            .and_then(|r| base_voltages.get(r.as_str()).copied())
            .unwrap_or(0.0);
        builder.add_bus(
            id.as_str(),
            BusSpec {
                name: obj.props.get("name").cloned(),
                base_kv,
                ..BusSpec::new(base_kv)
            },
        )?;
    }

    let bus_kv = |builder: &GridBuilder, key: &str, grid_default: f64| -> f64 {
        // impedance base comes from the from-side bus voltage
        builder
            .resolve_bus(key)
            .ok()
            .and_then(|_| {
                let obj = &objects[key];
                obj.refs
                    .get("BaseVoltage")
                    .and_then(|r| base_voltages.get(r.as_str()).copied())
            })
            .unwrap_or(grid_default)
    };

    let mut ids: Vec<&String> = objects.keys().collect();
    ids.sort();
    for id in ids {
        let obj = &objects[id];
        match obj.class.as_str() {
            "ACLineSegment" => {
                let ends = endpoints.get(id.as_str()).cloned().unwrap_or_default();
                if ends.len() != 2 {
                    return Err(GridError::StructuralParse(format!(
                        "ACLineSegment '{}' has {} terminals, expected 2",
                        id,
                        ends.len()
                    ))
                    .into());
                }
                let kv = bus_kv(&builder, ends[0], 0.0);
                if kv <= 0.0 {
                    return Err(GridError::StructuralParse(format!(
                        "ACLineSegment '{}': no base voltage for impedance conversion",
                        id
                    ))
                    .into());
                }
                builder.add_branch(
                    ends[0],
                    ends[1],
                    BranchSpec {
                        name: obj.props.get("name").cloned(),
                        r_pu: ohms_to_per_unit(prop_f64(obj, "r").unwrap_or(0.0), Kilovolts(kv), base_mva).0,
                        x_pu: ohms_to_per_unit(prop_f64(obj, "x").unwrap_or(0.0), Kilovolts(kv), base_mva).0,
                        b_pu: prop_f64(obj, "bch").unwrap_or(0.0) * kv * kv / base_mva,
                        in_service: in_service(obj),
                        ..BranchSpec::default()
                    },
                )?;
            }
            "PowerTransformer" => {
                let ends = endpoints.get(id.as_str()).cloned().unwrap_or_default();
                if ends.len() != 2 {
                    builder.diagnostics_mut().add_warning_with_entity(
                        "transformer",
                        &format!("{} terminals, expected 2; skipped", ends.len()),
                        id,
                    );
                    continue;
                }
                // impedance lives on the PowerTransformerEnd objects
                let (mut r_ohm, mut x_ohm, mut rated) = (0.0, 0.0, None);
                for end in objects.values() {
                    if end.class == "PowerTransformerEnd"
                        && end.refs.get("PowerTransformer") == Some(id)
                    {
                        r_ohm += prop_f64(end, "r").unwrap_or(0.0);
                        x_ohm += prop_f64(end, "x").unwrap_or(0.0);
                        if rated.is_none() {
                            rated = prop_f64(end, "ratedS");
                        }
                    }
                }
                let kv = bus_kv(&builder, ends[0], 0.0);
                if kv <= 0.0 {
                    return Err(GridError::StructuralParse(format!(
                        "PowerTransformer '{}': no base voltage for impedance conversion",
                        id
                    ))
                    .into());
                }
                builder.add_branch(
                    ends[0],
                    ends[1],
                    BranchSpec {
                        name: obj.props.get("name").cloned(),
                        r_pu: ohms_to_per_unit(r_ohm, Kilovolts(kv), base_mva).0,
                        x_pu: ohms_to_per_unit(x_ohm, Kilovolts(kv), base_mva).0,
                        rate_mva: rated,
                        is_transformer: true,
                        in_service: in_service(obj),
                        ..BranchSpec::default()
                    },
                )?;
            }
            "EnergyConsumer" | "ConformLoad" | "NonConformLoad" => {
                let bus = single_endpoint(&endpoints, id, "load")?;
                builder.add_load(
                    bus,
                    LoadSpec {
                        name: obj.props.get("name").cloned(),
                        p_mw: prop_f64(obj, "p").unwrap_or(0.0),
                        q_mvar: prop_f64(obj, "q").unwrap_or(0.0),
                        in_service: in_service(obj),
                    },
                )?;
            }
            "SynchronousMachine" => {
                let bus = single_endpoint(&endpoints, id, "machine")?;
                builder.add_gen(
                    bus,
                    GenSpec {
                        name: obj.props.get("name").cloned(),
                        p_mw: prop_f64(obj, "p").unwrap_or(0.0),
                        q_mvar: prop_f64(obj, "q").unwrap_or(0.0),
                        qmin_mvar: prop_f64(obj, "minQ"),
                        qmax_mvar: prop_f64(obj, "maxQ"),
                        in_service: in_service(obj),
                        ..GenSpec::default()
                    },
                )?;
            }
            "LinearShuntCompensator" | "ShuntCompensator" => {
                let bus = single_endpoint(&endpoints, id, "shunt")?;
                let kv = bus_kv(&builder, bus, 1.0);
                let sections = prop_f64(obj, "sections").unwrap_or(1.0);
                // bPerSection/gPerSection are siemens
                let b_s = prop_f64(obj, "bPerSection").unwrap_or(0.0) * sections;
                let g_s = prop_f64(obj, "gPerSection").unwrap_or(0.0) * sections;
                builder.add_shunt(
                    bus,
                    ShuntSpec {
                        name: obj.props.get("name").cloned(),
                        g_pu: g_s * kv * kv / base_mva,
                        b_pu: b_s * kv * kv / base_mva,
                        in_service: in_service(obj),
                    },
                )?;
            }
            _ => {}
        }
    }

    Ok(builder.finish())
}

fn single_endpoint<'a>(
    endpoints: &'a HashMap<&str, Vec<&'a str>>,
    id: &str,
    what: &str,
) -> Result<&'a str> {
    endpoints
        .get(id)
        .and_then(|ends| ends.first())
        .copied()
        .ok_or_else(|| {
            GridError::StructuralParse(format!("{} '{}' has no terminal", what, id)).into()
        })
}

fn write_terminal(out: &mut String, id: &str, equipment: &str, node: &str) {
    writeln!(out, "  <cim:Terminal rdf:ID=\"{}\">", id).unwrap();
    writeln!(
        out,
        "    <cim:Terminal.ConductingEquipment rdf:resource=\"#{}\"/>",
        equipment
    )
    .unwrap();
    writeln!(
        out,
        "    <cim:Terminal.TopologicalNode rdf:resource=\"#{}\"/>",
        node
    )
    .unwrap();
    writeln!(out, "  </cim:Terminal>").unwrap();
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Render a grid as a CIM 16 RDF/XML document.
///
/// Profiles do not survive; the caller reports the export as lossy when the
/// grid carries any.
pub fn export(grid: &Grid) -> String {
    let mut out = String::new();
    writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>").unwrap();
    writeln!(
        out,
        "<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\" xmlns:cim=\"{}\">",
        EXPORT_NS
    )
    .unwrap();

    // one BaseVoltage object per distinct nominal voltage
    let mut kvs: Vec<u64> = grid.buses().map(|b| b.base_kv.0.to_bits()).collect();
    kvs.sort_unstable();
    kvs.dedup();
    for bits in &kvs {
        let kv = f64::from_bits(*bits);
        writeln!(out, "  <cim:BaseVoltage rdf:ID=\"bv_{}\">", bits).unwrap();
        writeln!(out, "    <cim:BaseVoltage.nominalVoltage>{}</cim:BaseVoltage.nominalVoltage>", kv)
            .unwrap();
        writeln!(out, "  </cim:BaseVoltage>").unwrap();
    }

    for bus in grid.buses() {
        writeln!(out, "  <cim:TopologicalNode rdf:ID=\"bus_{}\">", bus.id).unwrap();
        writeln!(
            out,
            "    <cim:IdentifiedObject.name>{}</cim:IdentifiedObject.name>",
            xml_escape(&bus.name)
        )
        .unwrap();
        writeln!(
            out,
            "    <cim:TopologicalNode.BaseVoltage rdf:resource=\"#bv_{}\"/>",
            bus.base_kv.0.to_bits()
        )
        .unwrap();
        writeln!(out, "  </cim:TopologicalNode>").unwrap();
    }

    let mut terminal_seq = 0usize;
    let mut next_terminal = || {
        terminal_seq += 1;
        format!("term_{}", terminal_seq)
    };

    for branch in grid.branches() {
        let kv = grid
            .bus(branch.from_bus)
            .map(|b| b.base_kv.0)
            .unwrap_or(1.0);
        let (class, id) = if branch.is_transformer {
            ("PowerTransformer", format!("tx_{}", branch.id))
        } else {
            ("ACLineSegment", format!("line_{}", branch.id))
        };
        writeln!(out, "  <cim:{} rdf:ID=\"{}\">", class, id).unwrap();
        writeln!(
            out,
            "    <cim:IdentifiedObject.name>{}</cim:IdentifiedObject.name>",
            xml_escape(&branch.name)
        )
        .unwrap();
        writeln!(
            out,
            "    <cim:Equipment.inService>{}</cim:Equipment.inService>",
            branch.in_service
        )
        .unwrap();
        if !branch.is_transformer {
            writeln!(
                out,
                "    <cim:ACLineSegment.r>{}</cim:ACLineSegment.r>",
                per_unit_to_ohms(branch.r_pu, Kilovolts(kv), grid.base_mva)
            )
            .unwrap();
            writeln!(
                out,
                "    <cim:ACLineSegment.x>{}</cim:ACLineSegment.x>",
                per_unit_to_ohms(branch.x_pu, Kilovolts(kv), grid.base_mva)
            )
            .unwrap();
            writeln!(
                out,
                "    <cim:ACLineSegment.bch>{}</cim:ACLineSegment.bch>",
                branch.b_pu.0 * grid.base_mva / (kv * kv)
            )
            .unwrap();
        }
        writeln!(out, "  </cim:{}>", class).unwrap();

        if branch.is_transformer {
            writeln!(out, "  <cim:PowerTransformerEnd rdf:ID=\"{}_end1\">", id).unwrap();
            writeln!(
                out,
                "    <cim:PowerTransformerEnd.PowerTransformer rdf:resource=\"#{}\"/>",
                id
            )
            .unwrap();
            writeln!(
                out,
                "    <cim:PowerTransformerEnd.r>{}</cim:PowerTransformerEnd.r>",
                per_unit_to_ohms(branch.r_pu, Kilovolts(kv), grid.base_mva)
            )
            .unwrap();
            writeln!(
                out,
                "    <cim:PowerTransformerEnd.x>{}</cim:PowerTransformerEnd.x>",
                per_unit_to_ohms(branch.x_pu, Kilovolts(kv), grid.base_mva)
            )
            .unwrap();
            if let Some(rate) = branch.rate_mva {
                writeln!(
                    out,
                    "    <cim:PowerTransformerEnd.ratedS>{}</cim:PowerTransformerEnd.ratedS>",
                    rate.0
                )
                .unwrap();
            }
            writeln!(out, "  </cim:PowerTransformerEnd>").unwrap();
        }

        write_terminal(&mut out, &next_terminal(), &id, &format!("bus_{}", branch.from_bus));
        write_terminal(&mut out, &next_terminal(), &id, &format!("bus_{}", branch.to_bus));
    }

    for load in grid.loads() {
        let id = format!("load_{}", load.id);
        writeln!(out, "  <cim:EnergyConsumer rdf:ID=\"{}\">", id).unwrap();
        writeln!(
            out,
            "    <cim:IdentifiedObject.name>{}</cim:IdentifiedObject.name>",
            xml_escape(&load.name)
        )
        .unwrap();
        writeln!(
            out,
            "    <cim:Equipment.inService>{}</cim:Equipment.inService>",
            load.in_service
        )
        .unwrap();
        writeln!(out, "    <cim:EnergyConsumer.p>{}</cim:EnergyConsumer.p>", load.p_mw.0).unwrap();
        writeln!(out, "    <cim:EnergyConsumer.q>{}</cim:EnergyConsumer.q>", load.q_mvar.0)
            .unwrap();
        writeln!(out, "  </cim:EnergyConsumer>").unwrap();
        write_terminal(&mut out, &next_terminal(), &id, &format!("bus_{}", load.bus));
    }

    for gen in grid.gens() {
        let id = format!("gen_{}", gen.id);
        writeln!(out, "  <cim:SynchronousMachine rdf:ID=\"{}\">", id).unwrap();
        writeln!(
            out,
            "    <cim:IdentifiedObject.name>{}</cim:IdentifiedObject.name>",
            xml_escape(&gen.name)
        )
        .unwrap();
        writeln!(
            out,
            "    <cim:Equipment.inService>{}</cim:Equipment.inService>",
            gen.in_service
        )
        .unwrap();
        writeln!(out, "    <cim:RotatingMachine.p>{}</cim:RotatingMachine.p>", gen.p_mw.0).unwrap();
        writeln!(out, "    <cim:RotatingMachine.q>{}</cim:RotatingMachine.q>", gen.q_mvar.0)
            .unwrap();
        if let Some(q) = gen.qmin_mvar {
            writeln!(
                out,
                "    <cim:SynchronousMachine.minQ>{}</cim:SynchronousMachine.minQ>",
                q.0
            )
            .unwrap();
        }
        if let Some(q) = gen.qmax_mvar {
            writeln!(
                out,
                "    <cim:SynchronousMachine.maxQ>{}</cim:SynchronousMachine.maxQ>",
                q.0
            )
            .unwrap();
        }
        writeln!(out, "  </cim:SynchronousMachine>").unwrap();
        write_terminal(&mut out, &next_terminal(), &id, &format!("bus_{}", gen.bus));
    }

    for shunt in grid.shunts() {
        let kv = grid.bus(shunt.bus).map(|b| b.base_kv.0).unwrap_or(1.0);
        let id = format!("shunt_{}", shunt.id);
        writeln!(out, "  <cim:LinearShuntCompensator rdf:ID=\"{}\">", id).unwrap();
        writeln!(
            out,
            "    <cim:IdentifiedObject.name>{}</cim:IdentifiedObject.name>",
            xml_escape(&shunt.name)
        )
        .unwrap();
        writeln!(
            out,
            "    <cim:Equipment.inService>{}</cim:Equipment.inService>",
            shunt.in_service
        )
        .unwrap();
        writeln!(
            out,
            "    <cim:LinearShuntCompensator.bPerSection>{}</cim:LinearShuntCompensator.bPerSection>",
            shunt.b_pu.0 * grid.base_mva / (kv * kv)
        )
        .unwrap();
        writeln!(
            out,
            "    <cim:LinearShuntCompensator.gPerSection>{}</cim:LinearShuntCompensator.gPerSection>",
            shunt.g_pu.0 * grid.base_mva / (kv * kv)
        )
        .unwrap();
        writeln!(
            out,
            "    <cim:LinearShuntCompensator.sections>1</cim:LinearShuntCompensator.sections>"
        )
        .unwrap();
        writeln!(out, "  </cim:LinearShuntCompensator>").unwrap();
        write_terminal(&mut out, &next_terminal(), &id, &format!("bus_{}", shunt.bus));
    }

    writeln!(out, "</rdf:RDF>").unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridex_core::BusId;

    const SMALL_CIM16: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:cim="http://iec.ch/TC57/2013/CIM-schema-cim16#">
  <cim:BaseVoltage rdf:ID="bv1">
    <cim:BaseVoltage.nominalVoltage>110</cim:BaseVoltage.nominalVoltage>
  </cim:BaseVoltage>
  <cim:TopologicalNode rdf:ID="n1">
    <cim:IdentifiedObject.name>Node One</cim:IdentifiedObject.name>
    <cim:TopologicalNode.BaseVoltage rdf:resource="#bv1"/>
  </cim:TopologicalNode>
  <cim:TopologicalNode rdf:ID="n2">
    <cim:IdentifiedObject.name>Node Two</cim:IdentifiedObject.name>
    <cim:TopologicalNode.BaseVoltage rdf:resource="#bv1"/>
  </cim:TopologicalNode>
  <cim:ACLineSegment rdf:ID="l1">
    <cim:IdentifiedObject.name>Line</cim:IdentifiedObject.name>
    <cim:ACLineSegment.r>1.21</cim:ACLineSegment.r>
    <cim:ACLineSegment.x>12.1</cim:ACLineSegment.x>
  </cim:ACLineSegment>
  <cim:Terminal rdf:ID="t1">
    <cim:Terminal.ConductingEquipment rdf:resource="#l1"/>
    <cim:Terminal.TopologicalNode rdf:resource="#n1"/>
  </cim:Terminal>
  <cim:Terminal rdf:ID="t2">
    <cim:Terminal.ConductingEquipment rdf:resource="#l1"/>
    <cim:Terminal.TopologicalNode rdf:resource="#n2"/>
  </cim:Terminal>
  <cim:EnergyConsumer rdf:ID="c1">
    <cim:IdentifiedObject.name>Town</cim:IdentifiedObject.name>
    <cim:EnergyConsumer.p>35.0</cim:EnergyConsumer.p>
    <cim:EnergyConsumer.q>12.0</cim:EnergyConsumer.q>
  </cim:EnergyConsumer>
  <cim:Terminal rdf:ID="t3">
    <cim:Terminal.ConductingEquipment rdf:resource="#c1"/>
    <cim:Terminal.TopologicalNode rdf:resource="#n2"/>
  </cim:Terminal>
  <cim:SynchronousMachine rdf:ID="m1">
    <cim:IdentifiedObject.name>Plant</cim:IdentifiedObject.name>
    <cim:RotatingMachine.p>40.0</cim:RotatingMachine.p>
    <cim:RotatingMachine.q>10.0</cim:RotatingMachine.q>
  </cim:SynchronousMachine>
  <cim:Terminal rdf:ID="t4">
    <cim:Terminal.ConductingEquipment rdf:resource="#m1"/>
    <cim:Terminal.TopologicalNode rdf:resource="#n1"/>
  </cim:Terminal>
</rdf:RDF>
"##;

    #[test]
    fn cim16_document_parses() {
        let (grid, diag) = parse(SMALL_CIM16).unwrap();
        assert!(!diag.has_errors());
        assert_eq!(grid.bus_count(), 2);
        assert_eq!(grid.branch_count(), 1);
        assert_eq!(grid.load_count(), 1);
        assert_eq!(grid.gen_count(), 1);

        // GUID-keyed nodes get sequential canonical ids in sorted key order
        assert_eq!(grid.bus(BusId::new(1)).unwrap().name, "Node One");
        assert_eq!(grid.bus(BusId::new(1)).unwrap().base_kv.0, 110.0);
    }

    #[test]
    fn ohmic_impedance_converted_to_per_unit() {
        let (grid, _) = parse(SMALL_CIM16).unwrap();
        let branch = grid.branches().next().unwrap();
        // 1.21 ohm on 110 kV, 100 MVA base: 1.21 * 100 / 110^2 = 0.01
        assert!((branch.r_pu.0 - 0.01).abs() < 1e-12);
        assert!((branch.x_pu.0 - 0.1).abs() < 1e-12);
    }

    #[test]
    fn unknown_namespace_refused() {
        let doc = SMALL_CIM16.replace("CIM-schema-cim16", "CIM-schema-cim17");
        let err = parse(&doc).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn cim14_namespace_accepted() {
        let doc = SMALL_CIM16.replace(
            "http://iec.ch/TC57/2013/CIM-schema-cim16#",
            "http://iec.ch/TC57/2009/CIM-schema-cim14#",
        );
        assert!(parse(&doc).is_ok());
    }

    #[test]
    fn line_with_one_terminal_is_structural() {
        // drop the second line terminal
        let doc = SMALL_CIM16.replace(
            "  <cim:Terminal rdf:ID=\"t2\">\n    <cim:Terminal.ConductingEquipment rdf:resource=\"#l1\"/>\n    <cim:Terminal.TopologicalNode rdf:resource=\"#n2\"/>\n  </cim:Terminal>\n",
            "",
        );
        let err = parse(&doc).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }

    #[test]
    fn export_round_trips_semantics() {
        let (grid, _) = parse(SMALL_CIM16).unwrap();
        let xml = export(&grid);
        let (back, diag) = parse(&xml).unwrap();
        assert!(!diag.has_errors());
        assert_eq!(back.bus_count(), grid.bus_count());
        assert_eq!(back.branch_count(), grid.branch_count());
        assert_eq!(back.load_count(), grid.load_count());
        assert_eq!(back.gen_count(), grid.gen_count());

        let branch = back.branches().next().unwrap();
        assert!((branch.r_pu.0 - 0.01).abs() < 1e-9);
        let load = back.loads().find(|l| l.name == "Town").unwrap();
        assert_eq!(load.p_mw.0, 35.0);
    }
}
