//! PLEXOS workbook export (.xlsx, export only).
//!
//! Produces the three-sheet object model PLEXOS imports: `Objects` lists
//! every device by class and name, `Memberships` wires devices to their
//! nodes, and `Properties` carries the numeric attributes. The mapping is
//! lossy; anything without a PLEXOS counterpart is dropped with a warning.

use anyhow::{Context, Result};
use gridex_core::{Diagnostics, Grid};
use rust_xlsxwriter::{Workbook, Worksheet};

fn header(sheet: &mut Worksheet, columns: &[&str]) -> Result<()> {
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    Ok(())
}

struct PropertySheet<'a> {
    sheet: &'a mut Worksheet,
    row: u32,
}

impl PropertySheet<'_> {
    fn write(&mut self, class: &str, object: &str, property: &str, value: f64) -> Result<()> {
        self.sheet.write_string(self.row, 0, class)?;
        self.sheet.write_string(self.row, 1, object)?;
        self.sheet.write_string(self.row, 2, property)?;
        self.sheet.write_number(self.row, 3, value)?;
        self.row += 1;
        Ok(())
    }
}

fn object_name(prefix: &str, id: usize, name: &str) -> String {
    if name.is_empty() {
        format!("{prefix}_{id}")
    } else {
        name.to_string()
    }
}

/// Export a grid as a PLEXOS import workbook.
pub fn export(grid: &Grid, diag: &mut Diagnostics) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    let mut objects: Vec<(String, String)> = Vec::new();
    let mut memberships: Vec<(String, String, String, String)> = Vec::new();

    let mut properties_sheet = Worksheet::new();
    properties_sheet.set_name("Properties")?;
    header(
        &mut properties_sheet,
        &["Class", "Object", "Property", "Value"],
    )?;
    let mut props = PropertySheet {
        sheet: &mut properties_sheet,
        row: 1,
    };

    let mut bus_names = std::collections::BTreeMap::new();
    for bus in grid.buses() {
        let name = object_name("node", bus.id.value(), &bus.name);
        props.write("Node", &name, "Voltage", bus.base_kv.0)?;
        objects.push(("Node".to_string(), name.clone()));
        bus_names.insert(bus.id, name);
    }

    for branch in grid.branches() {
        let class = if branch.is_transformer {
            "Transformer"
        } else {
            "Line"
        };
        let name = object_name("branch", branch.id.value(), &branch.name);
        props.write(class, &name, "Resistance", branch.r_pu.0)?;
        props.write(class, &name, "Reactance", branch.x_pu.0)?;
        if let Some(rate) = branch.rate_mva {
            props.write(class, &name, "Max Flow", rate.0)?;
            props.write(class, &name, "Min Flow", -rate.0)?;
        }
        memberships.push((
            class.to_string(),
            name.clone(),
            "Node From".to_string(),
            bus_names[&branch.from_bus].clone(),
        ));
        memberships.push((
            class.to_string(),
            name.clone(),
            "Node To".to_string(),
            bus_names[&branch.to_bus].clone(),
        ));
        objects.push((class.to_string(), name));
    }

    for gen in grid.gens() {
        let name = object_name("gen", gen.id.value(), &gen.name);
        if let Some(pmax) = gen.pmax_mw {
            props.write("Generator", &name, "Max Capacity", pmax.0)?;
        }
        if let Some(pmin) = gen.pmin_mw {
            props.write("Generator", &name, "Min Stable Level", pmin.0)?;
        }
        props.write("Generator", &name, "Units", f64::from(u8::from(gen.in_service)))?;
        memberships.push((
            "Generator".to_string(),
            name.clone(),
            "Nodes".to_string(),
            bus_names[&gen.bus].clone(),
        ));
        objects.push(("Generator".to_string(), name));
    }

    for load in grid.loads() {
        let name = object_name("load", load.id.value(), &load.name);
        props.write("Load", &name, "Fixed Load", load.p_mw.0)?;
        memberships.push((
            "Load".to_string(),
            name.clone(),
            "Nodes".to_string(),
            bus_names[&load.bus].clone(),
        ));
        objects.push(("Load".to_string(), name));
    }

    if grid.shunt_count() > 0 {
        diag.add_warning(
            "export",
            &format!(
                "{} shunt(s) have no PLEXOS counterpart, dropped",
                grid.shunt_count()
            ),
        );
    }
    for storage in grid.storages() {
        let name = object_name("storage", storage.id.value(), &storage.name);
        props.write("Storage", &name, "Max Volume", storage.energy_mwh.0)?;
        props.write("Storage", &name, "Max Power", storage.p_mw.0.abs())?;
        memberships.push((
            "Storage".to_string(),
            name.clone(),
            "Nodes".to_string(),
            bus_names[&storage.bus].clone(),
        ));
        objects.push(("Storage".to_string(), name));
    }

    let objects_sheet = workbook.add_worksheet();
    objects_sheet.set_name("Objects")?;
    header(objects_sheet, &["Class", "Object"])?;
    for (row, (class, object)) in objects.iter().enumerate() {
        let row = row as u32 + 1;
        objects_sheet.write_string(row, 0, class)?;
        objects_sheet.write_string(row, 1, object)?;
    }

    let memberships_sheet = workbook.add_worksheet();
    memberships_sheet.set_name("Memberships")?;
    header(
        memberships_sheet,
        &["Parent Class", "Parent Object", "Collection", "Child Object"],
    )?;
    for (row, (class, object, collection, child)) in memberships.iter().enumerate() {
        let row = row as u32 + 1;
        memberships_sheet.write_string(row, 0, class)?;
        memberships_sheet.write_string(row, 1, object)?;
        memberships_sheet.write_string(row, 2, collection)?;
        memberships_sheet.write_string(row, 3, child)?;
    }

    workbook.push_worksheet(properties_sheet);
    workbook
        .save_to_buffer()
        .context("serialising PLEXOS workbook")
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Reader, Xlsx};
    use gridex_core::{
        Branch, BranchId, Bus, BusId, Gen, GenId, Kilovolts, Megawatts, PerUnit, Shunt, ShuntId,
    };
    use std::io::Cursor;

    fn grid() -> Grid {
        let mut grid = Grid::new("plexos test");
        for id in [1, 2] {
            grid.add_bus(Bus {
                id: BusId::new(id),
                name: format!("node{id}"),
                base_kv: Kilovolts(132.0),
                ..Bus::default()
            })
            .unwrap();
        }
        grid.add_branch(Branch {
            id: BranchId::new(1),
            name: "tie".into(),
            from_bus: BusId::new(1),
            to_bus: BusId::new(2),
            r_pu: PerUnit(0.02),
            x_pu: PerUnit(0.2),
            rate_mva: Some(gridex_core::MegavoltAmperes(120.0)),
            ..Branch::default()
        })
        .unwrap();
        grid.add_gen(Gen {
            id: GenId::new(1),
            name: "g1".into(),
            bus: BusId::new(1),
            p_mw: Megawatts(80.0),
            pmax_mw: Some(Megawatts(100.0)),
            ..Gen::default()
        })
        .unwrap();
        grid.add_shunt(Shunt {
            id: ShuntId::new(1),
            bus: BusId::new(2),
            b_pu: PerUnit(0.05),
            ..Shunt::default()
        })
        .unwrap();
        grid
    }

    #[test]
    fn writes_three_sheets() {
        let mut diag = Diagnostics::new();
        let bytes = export(&grid(), &mut diag).unwrap();
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
        for sheet in ["Objects", "Memberships", "Properties"] {
            assert!(workbook.worksheet_range(sheet).is_some(), "missing {sheet}");
        }
    }

    #[test]
    fn shunts_warn_as_dropped() {
        let mut diag = Diagnostics::new();
        export(&grid(), &mut diag).unwrap();
        assert!(diag
            .warnings()
            .any(|w| w.category == "export" && w.message.contains("shunt")));
    }

    #[test]
    fn branches_are_wired_to_both_nodes() {
        let mut diag = Diagnostics::new();
        let bytes = export(&grid(), &mut diag).unwrap();
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range("Memberships").unwrap().unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        assert!(rows
            .iter()
            .any(|r| r[1] == "tie" && r[2] == "Node From" && r[3] == "node1"));
        assert!(rows
            .iter()
            .any(|r| r[1] == "tie" && r[2] == "Node To" && r[3] == "node2"));
    }
}
