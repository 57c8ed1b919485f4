//! Post-import validation that runs for all formats.
//!
//! Catches structural oddities the individual parsers cannot see on their
//! own rows; results are reported through the Diagnostics infrastructure
//! from gridex-core. Reference integrity needs no pass here: the builder
//! and the pack decoder already fail hard on dangling references.

use gridex_core::{topology::BusGraph, Diagnostics, Grid};

/// Validate an imported grid and append any findings as warnings.
pub fn validate_grid(grid: &Grid, diag: &mut Diagnostics) {
    validate_structure(grid, diag);
    validate_topology(grid, diag);
    validate_physical_sanity(grid, diag);
}

fn validate_structure(grid: &Grid, diag: &mut Diagnostics) {
    if grid.bus_count() == 0 {
        diag.add_warning("structure", "grid has no buses");
        return;
    }
    if grid.gen_count() == 0 {
        diag.add_warning("structure", "grid has no generators");
    }
    if grid.load_count() == 0 {
        diag.add_warning("structure", "grid has no loads");
    }
    if grid.bus_count() > 1 && grid.branch_count() == 0 {
        diag.add_warning("structure", "multi-bus grid has no branches");
    }
}

fn validate_topology(grid: &Grid, diag: &mut Diagnostics) {
    if grid.bus_count() < 2 {
        return;
    }
    let graph = BusGraph::from_grid(grid);
    for bus in graph.isolated_buses() {
        diag.add_warning_with_entity(
            "topology",
            "bus is not connected to any branch",
            &format!("bus {}", bus.value()),
        );
    }
    let islands = graph.island_count();
    if islands > 1 {
        diag.add_warning("topology", &format!("grid splits into {islands} islands"));
    }
}

fn validate_physical_sanity(grid: &Grid, diag: &mut Diagnostics) {
    for bus in grid.buses() {
        if bus.base_kv.0 <= 0.0 {
            diag.add_warning_with_entity(
                "sanity",
                &format!("non-positive base voltage {} kV", bus.base_kv.0),
                &format!("bus {}", bus.id.value()),
            );
        }
    }
    for branch in grid.branches() {
        if branch.r_pu.0 == 0.0 && branch.x_pu.0 == 0.0 {
            diag.add_warning_with_entity(
                "sanity",
                "zero impedance",
                &format!("branch {}", branch.id.value()),
            );
        }
        if branch.x_pu.0 < 0.0 {
            diag.add_warning_with_entity(
                "sanity",
                &format!("negative reactance {}", branch.x_pu.0),
                &format!("branch {}", branch.id.value()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridex_core::{Branch, BranchId, Bus, BusId, Kilovolts, PerUnit};

    fn two_bus_grid() -> Grid {
        let mut grid = Grid::new("validate test");
        for id in [1, 2] {
            grid.add_bus(Bus {
                id: BusId::new(id),
                base_kv: Kilovolts(110.0),
                ..Bus::default()
            })
            .unwrap();
        }
        grid.add_branch(Branch {
            id: BranchId::new(1),
            from_bus: BusId::new(1),
            to_bus: BusId::new(2),
            r_pu: PerUnit(0.01),
            x_pu: PerUnit(0.1),
            ..Branch::default()
        })
        .unwrap();
        grid
    }

    #[test]
    fn empty_grid_warns_once() {
        let grid = Grid::new("empty");
        let mut diag = Diagnostics::new();
        validate_grid(&grid, &mut diag);
        assert_eq!(diag.warning_count(), 1);
        assert!(diag.warnings().any(|w| w.message.contains("no buses")));
    }

    #[test]
    fn isolated_bus_is_flagged() {
        let mut grid = two_bus_grid();
        grid.add_bus(Bus {
            id: BusId::new(3),
            base_kv: Kilovolts(110.0),
            ..Bus::default()
        })
        .unwrap();
        let mut diag = Diagnostics::new();
        validate_grid(&grid, &mut diag);
        assert!(diag
            .warnings()
            .any(|w| w.category == "topology" && w.message.contains("not connected")));
    }

    #[test]
    fn zero_impedance_is_flagged() {
        let mut grid = two_bus_grid();
        let mut branch = grid.branches().next().unwrap().clone();
        branch.r_pu = PerUnit(0.0);
        branch.x_pu = PerUnit(0.0);
        grid.replace_branch(branch).unwrap();
        let mut diag = Diagnostics::new();
        validate_grid(&grid, &mut diag);
        assert!(diag
            .warnings()
            .any(|w| w.category == "sanity" && w.message.contains("zero impedance")));
    }

    #[test]
    fn clean_grid_with_no_devices_only_warns_structure() {
        let mut diag = Diagnostics::new();
        validate_grid(&two_bus_grid(), &mut diag);
        assert!(diag.warnings().all(|w| w.category == "structure"));
    }
}
