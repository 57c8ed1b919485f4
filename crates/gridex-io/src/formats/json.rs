//! JSON container (.json): the packed wire model serialized with serde_json.
//!
//! Pretty-printed on export for diffability. Everything entity-level lives
//! in the pack codec; this file is transport only.

use anyhow::{Context, Result};
use gridex_core::{Diagnostics, Grid, GridError};

use crate::pack::{pack, unpack, PackedGrid};

pub fn parse(content: &str) -> Result<(Grid, Diagnostics)> {
    let packed: PackedGrid = serde_json::from_str(content)
        .map_err(|e| GridError::StructuralParse(format!("malformed grid JSON: {}", e)))?;
    unpack(&packed)
}

pub fn export(grid: &Grid) -> Result<String> {
    serde_json::to_string_pretty(&pack(grid)).context("serializing grid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridex_core::{Bus, BusId, Kilovolts};

    #[test]
    fn round_trip() {
        let mut grid = Grid::new("json test");
        grid.add_bus(Bus {
            id: BusId::new(1),
            base_kv: Kilovolts(400.0),
            ..Bus::default()
        })
        .unwrap();

        let text = export(&grid).unwrap();
        let (back, diag) = parse(&text).unwrap();
        assert!(!diag.has_issues());
        assert_eq!(back, grid);
    }

    #[test]
    fn garbage_is_structural() {
        let err = parse("not json at all").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }
}
