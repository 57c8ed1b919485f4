//! Connectivity view over the bus/branch graph.
//!
//! Consumers of the canonical model (and the post-import validator) need
//! cheap topological queries without owning the entities, so this module
//! builds a transient petgraph view keyed back to [`BusId`].

use std::collections::HashMap;

use petgraph::algo::connected_components;
use petgraph::graph::NodeIndex;
use petgraph::{Graph, Undirected};

use crate::{BusId, Grid};

/// Transient undirected bus/branch graph for topological queries.
pub struct BusGraph {
    graph: Graph<BusId, (), Undirected>,
    index: HashMap<BusId, NodeIndex>,
}

impl BusGraph {
    /// Build the connectivity view. Out-of-service branches are excluded;
    /// out-of-service buses still appear as nodes.
    pub fn from_grid(grid: &Grid) -> Self {
        let mut graph = Graph::new_undirected();
        let mut index = HashMap::with_capacity(grid.bus_count());
        for bus in grid.buses() {
            index.insert(bus.id, graph.add_node(bus.id));
        }
        for branch in grid.branches().filter(|b| b.in_service) {
            // buses are guaranteed present by Grid's reference checks
            if let (Some(&a), Some(&b)) = (index.get(&branch.from_bus), index.get(&branch.to_bus)) {
                graph.add_edge(a, b, ());
            }
        }
        Self { graph, index }
    }

    /// Number of connected components (electrical islands).
    pub fn island_count(&self) -> usize {
        connected_components(&self.graph)
    }

    /// Buses with no in-service branch attached.
    pub fn isolated_buses(&self) -> Vec<BusId> {
        let mut isolated: Vec<BusId> = self
            .index
            .iter()
            .filter(|(_, &idx)| self.graph.neighbors(idx).count() == 0)
            .map(|(&id, _)| id)
            .collect();
        isolated.sort();
        isolated
    }

    /// Degree (in-service branch count) of one bus.
    pub fn degree(&self, bus: BusId) -> Option<usize> {
        self.index
            .get(&bus)
            .map(|&idx| self.graph.neighbors(idx).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Branch, BranchId, Bus, Kilovolts};

    fn grid_with_buses(n: usize) -> Grid {
        let mut grid = Grid::new("topo");
        for i in 1..=n {
            grid.add_bus(Bus {
                id: BusId::new(i),
                base_kv: Kilovolts(110.0),
                ..Bus::default()
            })
            .unwrap();
        }
        grid
    }

    #[test]
    fn islands_and_isolation() {
        let mut grid = grid_with_buses(3);
        grid.add_branch(Branch {
            id: BranchId::new(1),
            from_bus: BusId::new(1),
            to_bus: BusId::new(2),
            ..Branch::default()
        })
        .unwrap();

        let view = BusGraph::from_grid(&grid);
        assert_eq!(view.island_count(), 2);
        assert_eq!(view.isolated_buses(), vec![BusId::new(3)]);
        assert_eq!(view.degree(BusId::new(1)), Some(1));
    }

    #[test]
    fn out_of_service_branch_ignored() {
        let mut grid = grid_with_buses(2);
        grid.add_branch(Branch {
            id: BranchId::new(1),
            from_bus: BusId::new(1),
            to_bus: BusId::new(2),
            in_service: false,
            ..Branch::default()
        })
        .unwrap();

        let view = BusGraph::from_grid(&grid);
        assert_eq!(view.island_count(), 2);
        assert_eq!(view.isolated_buses().len(), 2);
    }
}
