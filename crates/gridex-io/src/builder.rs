//! Format-agnostic construction of canonical grids.
//!
//! Parsers translate their source rows into the small `*Spec` input structs
//! and let [`GridBuilder`] handle the shared concerns: the parser-local
//! mapping from source identifiers (integer bus numbers, names, GUIDs) to
//! canonical ids, sequential id assignment, and diagnostics tracking.
//!
//! An unresolvable bus reference is a *structural* failure: the builder
//! returns [`GridError::StructuralParse`] and the caller is expected to
//! abort the parse and discard the partial grid.

use std::collections::HashMap;

use anyhow::Result;
use gridex_core::{
    Branch, BranchId, Bus, BusId, Degrees, Diagnostics, Gen, GenId, Grid, GridError, Kilovolts,
    Load, LoadId, MegavoltAmperes, MegawattHours, Megavars, Megawatts, PerUnit, Shunt, ShuntId,
    Storage, StorageId,
};

/// Bus input in format-native-free form (already converted to canonical units)
#[derive(Debug, Clone, Default)]
pub struct BusSpec {
    pub name: Option<String>,
    pub base_kv: f64,
    pub vmin_pu: Option<f64>,
    pub vmax_pu: Option<f64>,
    pub area: Option<i64>,
    pub zone: Option<i64>,
    pub in_service: bool,
}

impl BusSpec {
    pub fn new(base_kv: f64) -> Self {
        Self {
            base_kv,
            in_service: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct BranchSpec {
    pub name: Option<String>,
    pub r_pu: f64,
    pub x_pu: f64,
    pub b_pu: f64,
    pub tap_ratio: f64,
    pub shift_deg: f64,
    pub rate_mva: Option<f64>,
    pub is_transformer: bool,
    pub in_service: bool,
}

impl Default for BranchSpec {
    fn default() -> Self {
        Self {
            name: None,
            r_pu: 0.0,
            x_pu: 0.0,
            b_pu: 0.0,
            tap_ratio: 1.0,
            shift_deg: 0.0,
            rate_mva: None,
            is_transformer: false,
            in_service: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenSpec {
    pub name: Option<String>,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub pmin_mw: Option<f64>,
    pub pmax_mw: Option<f64>,
    pub qmin_mvar: Option<f64>,
    pub qmax_mvar: Option<f64>,
    pub vset_pu: Option<f64>,
    pub in_service: bool,
}

impl Default for GenSpec {
    fn default() -> Self {
        Self {
            name: None,
            p_mw: 0.0,
            q_mvar: 0.0,
            pmin_mw: None,
            pmax_mw: None,
            qmin_mvar: None,
            qmax_mvar: None,
            vset_pu: None,
            in_service: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub name: Option<String>,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub in_service: bool,
}

impl Default for LoadSpec {
    fn default() -> Self {
        Self {
            name: None,
            p_mw: 0.0,
            q_mvar: 0.0,
            in_service: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShuntSpec {
    pub name: Option<String>,
    pub g_pu: f64,
    pub b_pu: f64,
    pub in_service: bool,
}

impl Default for ShuntSpec {
    fn default() -> Self {
        Self {
            name: None,
            g_pu: 0.0,
            b_pu: 0.0,
            in_service: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageSpec {
    pub name: Option<String>,
    pub p_mw: f64,
    pub pmin_mw: Option<f64>,
    pub pmax_mw: Option<f64>,
    pub energy_mwh: f64,
    pub soc: f64,
    pub in_service: bool,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            name: None,
            p_mw: 0.0,
            pmin_mw: None,
            pmax_mw: None,
            energy_mwh: 0.0,
            soc: 0.0,
            in_service: true,
        }
    }
}

/// Builder holding the in-progress grid plus the parser-local source-id map.
pub struct GridBuilder {
    grid: Grid,
    diag: Diagnostics,
    bus_keys: HashMap<String, BusId>,
}

impl GridBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            grid: Grid::new(name),
            diag: Diagnostics::new(),
            bus_keys: HashMap::new(),
        }
    }

    pub fn set_base_mva(&mut self, base_mva: f64) {
        self.grid.base_mva = base_mva;
    }

    pub fn base_mva(&self) -> f64 {
        self.grid.base_mva
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diag
    }

    /// Resolve a source bus key to its canonical id, failing structurally
    /// when the key was never registered.
    pub fn resolve_bus(&self, key: &str) -> Result<BusId> {
        self.bus_keys.get(key).copied().ok_or_else(|| {
            GridError::StructuralParse(format!("reference to unknown bus '{}'", key)).into()
        })
    }

    /// Add a bus keeping the explicit source number as canonical id
    /// (formats with stable integer bus ids: MATPOWER, PSS/E).
    pub fn add_bus_numbered(
        &mut self,
        key: impl Into<String>,
        number: usize,
        spec: BusSpec,
    ) -> Result<BusId> {
        let key = key.into();
        if self.bus_keys.contains_key(&key) {
            return Err(GridError::StructuralParse(format!("duplicate bus '{}'", key)).into());
        }
        let id = BusId::new(number);
        self.grid
            .add_bus(self.make_bus(id, &key, spec))
            .map_err(|e| GridError::StructuralParse(e.to_string()))?;
        self.bus_keys.insert(key, id);
        Ok(id)
    }

    /// Add a bus with a sequentially assigned canonical id (formats keyed by
    /// GUIDs or names: CIM, DGS, DPX).
    pub fn add_bus(&mut self, key: impl Into<String>, spec: BusSpec) -> Result<BusId> {
        let number = self.grid.next_bus_id().value();
        self.add_bus_numbered(key, number, spec)
    }

    fn make_bus(&self, id: BusId, key: &str, spec: BusSpec) -> Bus {
        Bus {
            id,
            name: spec.name.unwrap_or_else(|| key.to_string()),
            base_kv: Kilovolts(spec.base_kv),
            vmin_pu: spec.vmin_pu.map(PerUnit),
            vmax_pu: spec.vmax_pu.map(PerUnit),
            area: spec.area,
            zone: spec.zone,
            in_service: spec.in_service,
            modified: None,
        }
    }

    pub fn add_branch(&mut self, from_key: &str, to_key: &str, spec: BranchSpec) -> Result<BranchId> {
        let from_bus = self.resolve_bus(from_key)?;
        let to_bus = self.resolve_bus(to_key)?;
        let id = self.grid.next_branch_id();
        let branch = Branch {
            id,
            name: spec
                .name
                .unwrap_or_else(|| format!("{}-{}", from_key, to_key)),
            from_bus,
            to_bus,
            r_pu: PerUnit(spec.r_pu),
            x_pu: PerUnit(spec.x_pu),
            b_pu: PerUnit(spec.b_pu),
            tap_ratio: spec.tap_ratio,
            shift: Degrees(spec.shift_deg),
            rate_mva: spec.rate_mva.map(MegavoltAmperes),
            is_transformer: spec.is_transformer,
            in_service: spec.in_service,
            modified: None,
        };
        self.grid
            .add_branch(branch)
            .map_err(|e| GridError::StructuralParse(e.to_string()))?;
        Ok(id)
    }

    pub fn add_gen(&mut self, bus_key: &str, spec: GenSpec) -> Result<GenId> {
        let bus = self.resolve_bus(bus_key)?;
        let id = self.grid.next_gen_id();
        let gen = Gen {
            id,
            name: spec.name.unwrap_or_else(|| format!("gen {}", id)),
            bus,
            p_mw: Megawatts(spec.p_mw),
            q_mvar: Megavars(spec.q_mvar),
            pmin_mw: spec.pmin_mw.map(Megawatts),
            pmax_mw: spec.pmax_mw.map(Megawatts),
            qmin_mvar: spec.qmin_mvar.map(Megavars),
            qmax_mvar: spec.qmax_mvar.map(Megavars),
            vset_pu: spec.vset_pu.map(PerUnit),
            in_service: spec.in_service,
            ..Gen::default()
        };
        self.grid
            .add_gen(gen)
            .map_err(|e| GridError::StructuralParse(e.to_string()))?;
        Ok(id)
    }

    pub fn add_load(&mut self, bus_key: &str, spec: LoadSpec) -> Result<LoadId> {
        let bus = self.resolve_bus(bus_key)?;
        let id = self.grid.next_load_id();
        let load = Load {
            id,
            name: spec.name.unwrap_or_else(|| format!("load {}", id)),
            bus,
            p_mw: Megawatts(spec.p_mw),
            q_mvar: Megavars(spec.q_mvar),
            in_service: spec.in_service,
            ..Load::default()
        };
        self.grid
            .add_load(load)
            .map_err(|e| GridError::StructuralParse(e.to_string()))?;
        Ok(id)
    }

    pub fn add_shunt(&mut self, bus_key: &str, spec: ShuntSpec) -> Result<ShuntId> {
        let bus = self.resolve_bus(bus_key)?;
        let id = self.grid.next_shunt_id();
        let shunt = Shunt {
            id,
            name: spec.name.unwrap_or_else(|| format!("shunt {}", id)),
            bus,
            g_pu: PerUnit(spec.g_pu),
            b_pu: PerUnit(spec.b_pu),
            in_service: spec.in_service,
            ..Shunt::default()
        };
        self.grid
            .add_shunt(shunt)
            .map_err(|e| GridError::StructuralParse(e.to_string()))?;
        Ok(id)
    }

    pub fn add_storage(&mut self, bus_key: &str, spec: StorageSpec) -> Result<StorageId> {
        let bus = self.resolve_bus(bus_key)?;
        let id = self.grid.next_storage_id();
        let storage = Storage {
            id,
            name: spec.name.unwrap_or_else(|| format!("storage {}", id)),
            bus,
            p_mw: Megawatts(spec.p_mw),
            pmin_mw: spec.pmin_mw.map(Megawatts),
            pmax_mw: spec.pmax_mw.map(Megawatts),
            energy_mwh: MegawattHours(spec.energy_mwh),
            soc: spec.soc,
            in_service: spec.in_service,
            ..Storage::default()
        };
        self.grid
            .add_storage(storage)
            .map_err(|e| GridError::StructuralParse(e.to_string()))?;
        Ok(id)
    }

    /// Direct mutable access for parsers that attach profiles after insert.
    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn finish(self) -> (Grid, Diagnostics) {
        (self.grid, self.diag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_buses_keep_source_ids() {
        let mut b = GridBuilder::new("t");
        b.add_bus_numbered("14", 14, BusSpec::new(132.0)).unwrap();
        b.add_bus_numbered("3", 3, BusSpec::new(132.0)).unwrap();
        let (grid, _) = b.finish();
        assert!(grid.bus(BusId::new(14)).is_some());
        assert!(grid.bus(BusId::new(3)).is_some());
    }

    #[test]
    fn sequential_buses_for_guid_sources() {
        let mut b = GridBuilder::new("t");
        let id1 = b.add_bus("urn:uuid:aaa", BusSpec::new(110.0)).unwrap();
        let id2 = b.add_bus("urn:uuid:bbb", BusSpec::new(110.0)).unwrap();
        assert_eq!(id1, BusId::new(1));
        assert_eq!(id2, BusId::new(2));
        assert_eq!(b.resolve_bus("urn:uuid:bbb").unwrap(), id2);
    }

    #[test]
    fn dangling_reference_is_structural() {
        let mut b = GridBuilder::new("t");
        b.add_bus_numbered("1", 1, BusSpec::new(230.0)).unwrap();
        let err = b
            .add_branch("1", "2", BranchSpec::default())
            .unwrap_err();
        let grid_err = err.downcast_ref::<GridError>().unwrap();
        assert!(matches!(grid_err, GridError::StructuralParse(_)));
    }

    #[test]
    fn duplicate_source_bus_is_structural() {
        let mut b = GridBuilder::new("t");
        b.add_bus_numbered("1", 1, BusSpec::new(230.0)).unwrap();
        let err = b.add_bus_numbered("1", 1, BusSpec::new(230.0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::StructuralParse(_))
        ));
    }

    #[test]
    fn devices_resolve_through_key_map() {
        let mut b = GridBuilder::new("t");
        b.add_bus("slack", BusSpec::new(400.0)).unwrap();
        b.add_gen(
            "slack",
            GenSpec {
                p_mw: 100.0,
                ..GenSpec::default()
            },
        )
        .unwrap();
        b.add_load(
            "slack",
            LoadSpec {
                p_mw: 20.0,
                ..LoadSpec::default()
            },
        )
        .unwrap();
        let (grid, _) = b.finish();
        assert_eq!(grid.gen_count(), 1);
        assert_eq!(grid.load_count(), 1);
    }
}
