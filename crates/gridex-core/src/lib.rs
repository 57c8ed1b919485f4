//! # gridex-core: Canonical Grid Model
//!
//! The single in-memory representation every file format converts to and
//! from. A [`Grid`] owns all entities in per-kind arenas keyed by typed ids;
//! branches and devices hold lookup keys ([`BusId`]), never ownership, so the
//! object graph stays acyclic and cross-references are resolved by lookup.
//!
//! ## Design
//!
//! - **Arena storage**: `BTreeMap<Id, Entity>` per kind gives deterministic
//!   iteration order, which serializers rely on for stable output.
//! - **Checked mutation**: every insert re-validates id uniqueness and bus
//!   reference integrity; the same checks apply after parse handoff, so an
//!   editor cannot corrupt a model the parser built.
//! - **Bus deletion policy**: removing a bus is *rejected* while any branch
//!   or device still references it. Dependents must be detached first.
//!
//! ## Quick start
//!
//! ```
//! use gridex_core::*;
//!
//! let mut grid = Grid::new("demo");
//! grid.add_bus(Bus { id: BusId::new(1), base_kv: Kilovolts(138.0), ..Bus::default() })?;
//! grid.add_bus(Bus { id: BusId::new(2), base_kv: Kilovolts(138.0), ..Bus::default() })?;
//! grid.add_branch(Branch {
//!     id: BranchId::new(1),
//!     from_bus: BusId::new(1),
//!     to_bus: BusId::new(2),
//!     r_pu: PerUnit(0.01),
//!     x_pu: PerUnit(0.1),
//!     ..Branch::default()
//! })?;
//! assert_eq!(grid.bus_count(), 2);
//! # Ok::<(), gridex_core::GridError>(())
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod error;
pub mod merge;
pub mod profile;
pub mod topology;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{GridError, GridResult};
pub use gridex_schema::EntityKind;
pub use merge::{merge, ConflictRecord, ConflictReport};
pub use profile::Profile;
pub use units::{
    ohms_to_per_unit, per_unit_to_ohms, siemens_to_per_unit, Degrees, Kilovolts, MegavoltAmperes,
    MegawattHours, Megavars, Megawatts, PerUnit, Radians,
};

macro_rules! impl_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub const fn new(value: usize) -> Self {
                $name(value)
            }
            #[inline]
            pub const fn value(&self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_id!(
    /// Canonical bus identifier
    BusId
);
impl_id!(
    /// Canonical branch identifier
    BranchId
);
impl_id!(
    /// Canonical generator identifier
    GenId
);
impl_id!(
    /// Canonical load identifier
    LoadId
);
impl_id!(
    /// Canonical shunt identifier
    ShuntId
);
impl_id!(
    /// Canonical storage-unit identifier
    StorageId
);

/// A node of the electrical network graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Base voltage in kilovolts (per-unit base for attached equipment)
    pub base_kv: Kilovolts,
    pub vmin_pu: Option<PerUnit>,
    pub vmax_pu: Option<PerUnit>,
    pub area: Option<i64>,
    pub zone: Option<i64>,
    pub in_service: bool,
    /// Last-modified stamp used by the merge driver
    pub modified: Option<DateTime<Utc>>,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId(0),
            name: String::new(),
            base_kv: Kilovolts(0.0),
            vmin_pu: None,
            vmax_pu: None,
            area: None,
            zone: None,
            in_service: true,
            modified: None,
        }
    }
}

/// An edge of the network graph: transmission line or two-winding
/// transformer, connecting an ordered pair of buses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance, per-unit on the system base
    pub r_pu: PerUnit,
    /// Series reactance, per-unit on the system base
    pub x_pu: PerUnit,
    /// Total line charging susceptance, per-unit
    pub b_pu: PerUnit,
    /// Off-nominal tap ratio applied at the from side (1.0 for lines)
    pub tap_ratio: f64,
    /// Phase shift applied from from_bus to to_bus
    pub shift: Degrees,
    pub rate_mva: Option<MegavoltAmperes>,
    pub is_transformer: bool,
    pub in_service: bool,
    pub modified: Option<DateTime<Utc>>,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: BranchId(0),
            name: String::new(),
            from_bus: BusId(0),
            to_bus: BusId(0),
            r_pu: PerUnit(0.0),
            x_pu: PerUnit(0.0),
            b_pu: PerUnit(0.0),
            tap_ratio: 1.0,
            shift: Degrees(0.0),
            rate_mva: None,
            is_transformer: false,
            in_service: true,
            modified: None,
        }
    }
}

/// Generating unit attached to a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gen {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    pub p_mw: Megawatts,
    pub q_mvar: Megavars,
    pub pmin_mw: Option<Megawatts>,
    pub pmax_mw: Option<Megawatts>,
    pub qmin_mvar: Option<Megavars>,
    pub qmax_mvar: Option<Megavars>,
    /// Voltage setpoint for voltage-controlled buses
    pub vset_pu: Option<PerUnit>,
    pub in_service: bool,
    pub modified: Option<DateTime<Utc>>,
    /// Time-varying attribute profiles keyed by field name (e.g. "p_mw")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            id: GenId(0),
            name: String::new(),
            bus: BusId(0),
            p_mw: Megawatts(0.0),
            q_mvar: Megavars(0.0),
            pmin_mw: None,
            pmax_mw: None,
            qmin_mvar: None,
            qmax_mvar: None,
            vset_pu: None,
            in_service: true,
            modified: None,
            profiles: BTreeMap::new(),
        }
    }
}

impl Gen {
    pub fn new(id: GenId, name: impl Into<String>, bus: BusId) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            ..Self::default()
        }
    }

    /// Set active power limits in MW
    pub fn with_p_limits(mut self, pmin: f64, pmax: f64) -> Self {
        self.pmin_mw = Some(Megawatts(pmin));
        self.pmax_mw = Some(Megawatts(pmax));
        self
    }

    /// Set reactive power limits in Mvar
    pub fn with_q_limits(mut self, qmin: f64, qmax: f64) -> Self {
        self.qmin_mvar = Some(Megavars(qmin));
        self.qmax_mvar = Some(Megavars(qmax));
        self
    }
}

/// Consuming load attached to a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    pub p_mw: Megawatts,
    pub q_mvar: Megavars,
    pub in_service: bool,
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            id: LoadId(0),
            name: String::new(),
            bus: BusId(0),
            p_mw: Megawatts(0.0),
            q_mvar: Megavars(0.0),
            in_service: true,
            modified: None,
            profiles: BTreeMap::new(),
        }
    }
}

/// Shunt element (capacitor or reactor) attached to a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shunt {
    pub id: ShuntId,
    pub name: String,
    pub bus: BusId,
    /// Shunt conductance, per-unit
    pub g_pu: PerUnit,
    /// Shunt susceptance, per-unit (positive = capacitor)
    pub b_pu: PerUnit,
    pub in_service: bool,
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Shunt {
    fn default() -> Self {
        Self {
            id: ShuntId(0),
            name: String::new(),
            bus: BusId(0),
            g_pu: PerUnit(0.0),
            b_pu: PerUnit(0.0),
            in_service: true,
            modified: None,
            profiles: BTreeMap::new(),
        }
    }
}

/// Storage unit attached to a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    pub id: StorageId,
    pub name: String,
    pub bus: BusId,
    /// Current charge (+) / discharge (-) setpoint
    pub p_mw: Megawatts,
    pub pmin_mw: Option<Megawatts>,
    pub pmax_mw: Option<Megawatts>,
    /// Energy capacity
    pub energy_mwh: MegawattHours,
    /// State of charge, fraction of capacity in [0, 1]
    pub soc: f64,
    pub in_service: bool,
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            id: StorageId(0),
            name: String::new(),
            bus: BusId(0),
            p_mw: Megawatts(0.0),
            pmin_mw: None,
            pmax_mw: None,
            energy_mwh: MegawattHours(0.0),
            soc: 0.0,
            in_service: true,
            modified: None,
            profiles: BTreeMap::new(),
        }
    }
}

/// The canonical model container.
///
/// Created empty, populated incrementally by exactly one parser invocation,
/// then handed off immutably-by-convention to consumers. Mutation after
/// handoff goes through the same checked methods as initial construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub name: String,
    /// System power base in MVA; the per-unit base for impedances
    pub base_mva: f64,
    /// Entity-kind schema revision; merge inputs must agree on this
    pub schema_version: u32,
    buses: BTreeMap<BusId, Bus>,
    branches: BTreeMap<BranchId, Branch>,
    gens: BTreeMap<GenId, Gen>,
    loads: BTreeMap<LoadId, Load>,
    shunts: BTreeMap<ShuntId, Shunt>,
    storages: BTreeMap<StorageId, Storage>,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new("")
    }
}

impl Grid {
    /// Current entity-kind schema revision. Bumped on incompatible changes
    /// to the set of kinds or their identity semantics.
    pub const SCHEMA_VERSION: u32 = 1;

    /// Default system power base in MVA
    pub const DEFAULT_BASE_MVA: f64 = 100.0;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_mva: Self::DEFAULT_BASE_MVA,
            schema_version: Self::SCHEMA_VERSION,
            buses: BTreeMap::new(),
            branches: BTreeMap::new(),
            gens: BTreeMap::new(),
            loads: BTreeMap::new(),
            shunts: BTreeMap::new(),
            storages: BTreeMap::new(),
        }
    }

    fn ensure_bus_exists(&self, bus: BusId, referrer: &str) -> GridResult<()> {
        if self.buses.contains_key(&bus) {
            Ok(())
        } else {
            Err(GridError::Validation(format!(
                "{} references nonexistent bus {}",
                referrer, bus
            )))
        }
    }

    // -- insertion (uniqueness + reference integrity checked) --

    pub fn add_bus(&mut self, bus: Bus) -> GridResult<BusId> {
        let id = bus.id;
        if self.buses.contains_key(&id) {
            return Err(GridError::Validation(format!("duplicate bus id {}", id)));
        }
        self.buses.insert(id, bus);
        Ok(id)
    }

    pub fn add_branch(&mut self, branch: Branch) -> GridResult<BranchId> {
        let id = branch.id;
        if self.branches.contains_key(&id) {
            return Err(GridError::Validation(format!("duplicate branch id {}", id)));
        }
        self.ensure_bus_exists(branch.from_bus, &format!("branch {}", id))?;
        self.ensure_bus_exists(branch.to_bus, &format!("branch {}", id))?;
        self.branches.insert(id, branch);
        Ok(id)
    }

    pub fn add_gen(&mut self, gen: Gen) -> GridResult<GenId> {
        let id = gen.id;
        if self.gens.contains_key(&id) {
            return Err(GridError::Validation(format!("duplicate gen id {}", id)));
        }
        self.ensure_bus_exists(gen.bus, &format!("gen {}", id))?;
        self.gens.insert(id, gen);
        Ok(id)
    }

    pub fn add_load(&mut self, load: Load) -> GridResult<LoadId> {
        let id = load.id;
        if self.loads.contains_key(&id) {
            return Err(GridError::Validation(format!("duplicate load id {}", id)));
        }
        self.ensure_bus_exists(load.bus, &format!("load {}", id))?;
        self.loads.insert(id, load);
        Ok(id)
    }

    pub fn add_shunt(&mut self, shunt: Shunt) -> GridResult<ShuntId> {
        let id = shunt.id;
        if self.shunts.contains_key(&id) {
            return Err(GridError::Validation(format!("duplicate shunt id {}", id)));
        }
        self.ensure_bus_exists(shunt.bus, &format!("shunt {}", id))?;
        self.shunts.insert(id, shunt);
        Ok(id)
    }

    pub fn add_storage(&mut self, storage: Storage) -> GridResult<StorageId> {
        let id = storage.id;
        if self.storages.contains_key(&id) {
            return Err(GridError::Validation(format!(
                "duplicate storage id {}",
                id
            )));
        }
        self.ensure_bus_exists(storage.bus, &format!("storage {}", id))?;
        self.storages.insert(id, storage);
        Ok(id)
    }

    // -- replacement (post-handoff mutation path, same checks) --

    /// Replace an existing bus in full. The id must already exist.
    pub fn replace_bus(&mut self, bus: Bus) -> GridResult<()> {
        if !self.buses.contains_key(&bus.id) {
            return Err(GridError::Validation(format!("no bus with id {}", bus.id)));
        }
        self.buses.insert(bus.id, bus);
        Ok(())
    }

    pub fn replace_branch(&mut self, branch: Branch) -> GridResult<()> {
        if !self.branches.contains_key(&branch.id) {
            return Err(GridError::Validation(format!(
                "no branch with id {}",
                branch.id
            )));
        }
        self.ensure_bus_exists(branch.from_bus, &format!("branch {}", branch.id))?;
        self.ensure_bus_exists(branch.to_bus, &format!("branch {}", branch.id))?;
        self.branches.insert(branch.id, branch);
        Ok(())
    }

    pub fn replace_gen(&mut self, gen: Gen) -> GridResult<()> {
        if !self.gens.contains_key(&gen.id) {
            return Err(GridError::Validation(format!("no gen with id {}", gen.id)));
        }
        self.ensure_bus_exists(gen.bus, &format!("gen {}", gen.id))?;
        self.gens.insert(gen.id, gen);
        Ok(())
    }

    pub fn replace_load(&mut self, load: Load) -> GridResult<()> {
        if !self.loads.contains_key(&load.id) {
            return Err(GridError::Validation(format!("no load with id {}", load.id)));
        }
        self.ensure_bus_exists(load.bus, &format!("load {}", load.id))?;
        self.loads.insert(load.id, load);
        Ok(())
    }

    pub fn replace_shunt(&mut self, shunt: Shunt) -> GridResult<()> {
        if !self.shunts.contains_key(&shunt.id) {
            return Err(GridError::Validation(format!(
                "no shunt with id {}",
                shunt.id
            )));
        }
        self.ensure_bus_exists(shunt.bus, &format!("shunt {}", shunt.id))?;
        self.shunts.insert(shunt.id, shunt);
        Ok(())
    }

    pub fn replace_storage(&mut self, storage: Storage) -> GridResult<()> {
        if !self.storages.contains_key(&storage.id) {
            return Err(GridError::Validation(format!(
                "no storage with id {}",
                storage.id
            )));
        }
        self.ensure_bus_exists(storage.bus, &format!("storage {}", storage.id))?;
        self.storages.insert(storage.id, storage);
        Ok(())
    }

    // -- removal --

    /// Remove a bus. Rejected while any branch or device still references
    /// it; dependents must be removed or re-homed first.
    pub fn remove_bus(&mut self, id: BusId) -> GridResult<Bus> {
        let dependents: Vec<String> = self
            .branches
            .values()
            .filter(|b| b.from_bus == id || b.to_bus == id)
            .map(|b| format!("branch {}", b.id))
            .chain(
                self.gens
                    .values()
                    .filter(|g| g.bus == id)
                    .map(|g| format!("gen {}", g.id)),
            )
            .chain(
                self.loads
                    .values()
                    .filter(|l| l.bus == id)
                    .map(|l| format!("load {}", l.id)),
            )
            .chain(
                self.shunts
                    .values()
                    .filter(|s| s.bus == id)
                    .map(|s| format!("shunt {}", s.id)),
            )
            .chain(
                self.storages
                    .values()
                    .filter(|s| s.bus == id)
                    .map(|s| format!("storage {}", s.id)),
            )
            .collect();

        if !dependents.is_empty() {
            return Err(GridError::Validation(format!(
                "cannot remove bus {}: still referenced by {}",
                id,
                dependents.join(", ")
            )));
        }

        self.buses
            .remove(&id)
            .ok_or_else(|| GridError::Validation(format!("no bus with id {}", id)))
    }

    pub fn remove_branch(&mut self, id: BranchId) -> Option<Branch> {
        self.branches.remove(&id)
    }

    pub fn remove_gen(&mut self, id: GenId) -> Option<Gen> {
        self.gens.remove(&id)
    }

    pub fn remove_load(&mut self, id: LoadId) -> Option<Load> {
        self.loads.remove(&id)
    }

    pub fn remove_shunt(&mut self, id: ShuntId) -> Option<Shunt> {
        self.shunts.remove(&id)
    }

    pub fn remove_storage(&mut self, id: StorageId) -> Option<Storage> {
        self.storages.remove(&id)
    }

    // -- read access --

    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.buses.get(&id)
    }

    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.branches.get(&id)
    }

    pub fn gen(&self, id: GenId) -> Option<&Gen> {
        self.gens.get(&id)
    }

    pub fn load(&self, id: LoadId) -> Option<&Load> {
        self.loads.get(&id)
    }

    pub fn shunt(&self, id: ShuntId) -> Option<&Shunt> {
        self.shunts.get(&id)
    }

    pub fn storage(&self, id: StorageId) -> Option<&Storage> {
        self.storages.get(&id)
    }

    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.buses.values()
    }

    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.branches.values()
    }

    pub fn gens(&self) -> impl Iterator<Item = &Gen> {
        self.gens.values()
    }

    pub fn loads(&self) -> impl Iterator<Item = &Load> {
        self.loads.values()
    }

    pub fn shunts(&self) -> impl Iterator<Item = &Shunt> {
        self.shunts.values()
    }

    pub fn storages(&self) -> impl Iterator<Item = &Storage> {
        self.storages.values()
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn gen_count(&self) -> usize {
        self.gens.len()
    }

    pub fn load_count(&self) -> usize {
        self.loads.len()
    }

    pub fn shunt_count(&self) -> usize {
        self.shunts.len()
    }

    pub fn storage_count(&self) -> usize {
        self.storages.len()
    }

    /// Total entity count across all kinds
    pub fn entity_count(&self) -> usize {
        self.buses.len()
            + self.branches.len()
            + self.gens.len()
            + self.loads.len()
            + self.shunts.len()
            + self.storages.len()
    }

    // -- id allocation --

    pub fn next_bus_id(&self) -> BusId {
        BusId(self.buses.keys().last().map_or(1, |id| id.0 + 1))
    }

    pub fn next_branch_id(&self) -> BranchId {
        BranchId(self.branches.keys().last().map_or(1, |id| id.0 + 1))
    }

    pub fn next_gen_id(&self) -> GenId {
        GenId(self.gens.keys().last().map_or(1, |id| id.0 + 1))
    }

    pub fn next_load_id(&self) -> LoadId {
        LoadId(self.loads.keys().last().map_or(1, |id| id.0 + 1))
    }

    pub fn next_shunt_id(&self) -> ShuntId {
        ShuntId(self.shunts.keys().last().map_or(1, |id| id.0 + 1))
    }

    pub fn next_storage_id(&self) -> StorageId {
        StorageId(self.storages.keys().last().map_or(1, |id| id.0 + 1))
    }

    /// Lazy, restartable profile query for a device attribute.
    ///
    /// Returns `None` when the device does not exist or carries no profile
    /// for the attribute (i.e. the attribute is static).
    pub fn profile(
        &self,
        kind: EntityKind,
        id: usize,
        attr: &str,
    ) -> Option<impl Iterator<Item = (DateTime<Utc>, f64)> + '_> {
        let profiles = match kind {
            EntityKind::Gen => &self.gens.get(&GenId(id))?.profiles,
            EntityKind::Load => &self.loads.get(&LoadId(id))?.profiles,
            EntityKind::Shunt => &self.shunts.get(&ShuntId(id))?.profiles,
            EntityKind::Storage => &self.storages.get(&StorageId(id))?.profiles,
            EntityKind::Bus | EntityKind::Branch => return None,
        };
        profiles.get(attr).map(|p| p.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus_grid() -> Grid {
        let mut grid = Grid::new("test");
        grid.add_bus(Bus {
            id: BusId::new(1),
            base_kv: Kilovolts(230.0),
            ..Bus::default()
        })
        .unwrap();
        grid.add_bus(Bus {
            id: BusId::new(2),
            base_kv: Kilovolts(230.0),
            ..Bus::default()
        })
        .unwrap();
        grid
    }

    #[test]
    fn duplicate_bus_id_rejected() {
        let mut grid = two_bus_grid();
        let err = grid.add_bus(Bus {
            id: BusId::new(1),
            ..Bus::default()
        });
        assert!(matches!(err, Err(GridError::Validation(_))));
    }

    #[test]
    fn branch_requires_existing_buses() {
        let mut grid = two_bus_grid();
        let err = grid.add_branch(Branch {
            id: BranchId::new(1),
            from_bus: BusId::new(1),
            to_bus: BusId::new(99),
            ..Branch::default()
        });
        assert!(err.is_err());
        assert_eq!(grid.branch_count(), 0);
    }

    #[test]
    fn device_requires_existing_bus() {
        let mut grid = two_bus_grid();
        let err = grid.add_gen(Gen::new(GenId::new(1), "g", BusId::new(7)));
        assert!(err.is_err());
        assert!(grid
            .add_load(Load {
                id: LoadId::new(1),
                bus: BusId::new(2),
                p_mw: Megawatts(10.0),
                ..Load::default()
            })
            .is_ok());
    }

    #[test]
    fn bus_removal_rejected_while_referenced() {
        let mut grid = two_bus_grid();
        grid.add_branch(Branch {
            id: BranchId::new(1),
            from_bus: BusId::new(1),
            to_bus: BusId::new(2),
            ..Branch::default()
        })
        .unwrap();

        let err = grid.remove_bus(BusId::new(1));
        assert!(matches!(err, Err(GridError::Validation(_))));

        grid.remove_branch(BranchId::new(1)).unwrap();
        assert!(grid.remove_bus(BusId::new(1)).is_ok());
        assert_eq!(grid.bus_count(), 1);
    }

    #[test]
    fn replace_revalidates_references() {
        let mut grid = two_bus_grid();
        grid.add_gen(Gen::new(GenId::new(1), "g", BusId::new(1)))
            .unwrap();

        let mut moved = grid.gen(GenId::new(1)).unwrap().clone();
        moved.bus = BusId::new(42);
        assert!(grid.replace_gen(moved).is_err());

        let mut renamed = grid.gen(GenId::new(1)).unwrap().clone();
        renamed.name = "unit 1".into();
        grid.replace_gen(renamed).unwrap();
        assert_eq!(grid.gen(GenId::new(1)).unwrap().name, "unit 1");
    }

    #[test]
    fn next_ids_are_sequential() {
        let grid = two_bus_grid();
        assert_eq!(grid.next_bus_id(), BusId::new(3));
        assert_eq!(grid.next_gen_id(), GenId::new(1));
    }

    #[test]
    fn profile_query_is_restartable() {
        use chrono::TimeZone;
        let mut grid = two_bus_grid();
        let mut gen = Gen::new(GenId::new(1), "g", BusId::new(1));
        let mut prof = Profile::new();
        prof.push(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), 5.0)
            .unwrap();
        gen.profiles.insert("p_mw".into(), prof);
        grid.add_gen(gen).unwrap();

        let first: Vec<_> = grid
            .profile(EntityKind::Gen, 1, "p_mw")
            .unwrap()
            .collect();
        let second: Vec<_> = grid
            .profile(EntityKind::Gen, 1, "p_mw")
            .unwrap()
            .collect();
        assert_eq!(first, second);
        assert!(grid.profile(EntityKind::Gen, 1, "q_mvar").is_none());
        assert!(grid.profile(EntityKind::Bus, 1, "p_mw").is_none());
    }

    #[test]
    fn grid_equality_is_entity_level() {
        let a = two_bus_grid();
        let mut b = two_bus_grid();
        assert_eq!(a, b);
        b.replace_bus(Bus {
            id: BusId::new(2),
            base_kv: Kilovolts(110.0),
            ..Bus::default()
        })
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn serde_round_trip() {
        let grid = two_bus_grid();
        let json = serde_json::to_string(&grid).unwrap();
        let back: Grid = serde_json::from_str(&json).unwrap();
        assert_eq!(grid, back);
    }
}
