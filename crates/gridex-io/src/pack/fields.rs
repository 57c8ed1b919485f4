//! Entity-level row encoding and decoding.
//!
//! One function pair per entity kind, aligned with the field order declared
//! in `gridex_schema::fields`. The codec and the tabular adapters all go
//! through here, so column meaning lives in exactly one place.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use gridex_core::{
    Branch, BranchId, Bus, BusId, Degrees, Gen, GenId, GridError, Kilovolts, Load, LoadId,
    MegavoltAmperes, MegawattHours, Megavars, Megawatts, PerUnit, Shunt, ShuntId, Storage,
    StorageId,
};

use super::value::FieldValue;

fn stamp(modified: &Option<DateTime<Utc>>) -> FieldValue {
    match modified {
        Some(t) => FieldValue::Text(t.to_rfc3339()),
        None => FieldValue::Null,
    }
}

fn opt_f(v: Option<f64>) -> FieldValue {
    v.map(FieldValue::Float).unwrap_or(FieldValue::Null)
}

fn opt_i(v: Option<i64>) -> FieldValue {
    v.map(FieldValue::Int).unwrap_or(FieldValue::Null)
}

/// A decoded table row: field name to value, defaults already substituted.
#[derive(Debug, Default)]
pub struct Row {
    values: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.values.insert(field.into(), value);
    }

    fn get(&self, field: &str) -> &FieldValue {
        self.values.get(field).unwrap_or(&FieldValue::Null)
    }

    fn require_usize(&self, field: &str) -> Result<usize> {
        let v = self.get(field).as_i64().ok_or_else(|| {
            GridError::StructuralParse(format!("field '{}' is not an integer", field))
        })?;
        usize::try_from(v).map_err(|_| {
            GridError::StructuralParse(format!("field '{}' is negative", field)).into()
        })
    }

    fn opt_f64(&self, field: &str) -> Option<f64> {
        self.get(field).as_f64()
    }

    fn opt_i64(&self, field: &str) -> Option<i64> {
        self.get(field).as_i64()
    }

    fn name(&self, field: &str) -> String {
        self.get(field).as_str().unwrap_or("").to_string()
    }

    fn in_service(&self) -> bool {
        self.get("in_service").as_bool().unwrap_or(true)
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        let text = self.get("modified").as_str()?;
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

// -- encode: entity to values in schema field order --

pub fn bus_values(bus: &Bus) -> Vec<FieldValue> {
    vec![
        FieldValue::Int(bus.id.value() as i64),
        FieldValue::Text(bus.name.clone()),
        FieldValue::Float(bus.base_kv.0),
        opt_f(bus.vmin_pu.map(|v| v.0)),
        opt_f(bus.vmax_pu.map(|v| v.0)),
        opt_i(bus.area),
        opt_i(bus.zone),
        FieldValue::Bool(bus.in_service),
        stamp(&bus.modified),
    ]
}

pub fn branch_values(branch: &Branch) -> Vec<FieldValue> {
    vec![
        FieldValue::Int(branch.id.value() as i64),
        FieldValue::Text(branch.name.clone()),
        FieldValue::Int(branch.from_bus.value() as i64),
        FieldValue::Int(branch.to_bus.value() as i64),
        FieldValue::Float(branch.r_pu.0),
        FieldValue::Float(branch.x_pu.0),
        FieldValue::Float(branch.b_pu.0),
        FieldValue::Float(branch.tap_ratio),
        FieldValue::Float(branch.shift.0),
        opt_f(branch.rate_mva.map(|v| v.0)),
        FieldValue::Bool(branch.is_transformer),
        FieldValue::Bool(branch.in_service),
        stamp(&branch.modified),
    ]
}

pub fn gen_values(gen: &Gen) -> Vec<FieldValue> {
    vec![
        FieldValue::Int(gen.id.value() as i64),
        FieldValue::Text(gen.name.clone()),
        FieldValue::Int(gen.bus.value() as i64),
        FieldValue::Float(gen.p_mw.0),
        FieldValue::Float(gen.q_mvar.0),
        opt_f(gen.pmin_mw.map(|v| v.0)),
        opt_f(gen.pmax_mw.map(|v| v.0)),
        opt_f(gen.qmin_mvar.map(|v| v.0)),
        opt_f(gen.qmax_mvar.map(|v| v.0)),
        opt_f(gen.vset_pu.map(|v| v.0)),
        FieldValue::Bool(gen.in_service),
        stamp(&gen.modified),
    ]
}

pub fn load_values(load: &Load) -> Vec<FieldValue> {
    vec![
        FieldValue::Int(load.id.value() as i64),
        FieldValue::Text(load.name.clone()),
        FieldValue::Int(load.bus.value() as i64),
        FieldValue::Float(load.p_mw.0),
        FieldValue::Float(load.q_mvar.0),
        FieldValue::Bool(load.in_service),
        stamp(&load.modified),
    ]
}

pub fn shunt_values(shunt: &Shunt) -> Vec<FieldValue> {
    vec![
        FieldValue::Int(shunt.id.value() as i64),
        FieldValue::Text(shunt.name.clone()),
        FieldValue::Int(shunt.bus.value() as i64),
        FieldValue::Float(shunt.g_pu.0),
        FieldValue::Float(shunt.b_pu.0),
        FieldValue::Bool(shunt.in_service),
        stamp(&shunt.modified),
    ]
}

pub fn storage_values(storage: &Storage) -> Vec<FieldValue> {
    vec![
        FieldValue::Int(storage.id.value() as i64),
        FieldValue::Text(storage.name.clone()),
        FieldValue::Int(storage.bus.value() as i64),
        FieldValue::Float(storage.p_mw.0),
        opt_f(storage.pmin_mw.map(|v| v.0)),
        opt_f(storage.pmax_mw.map(|v| v.0)),
        FieldValue::Float(storage.energy_mwh.0),
        FieldValue::Float(storage.soc),
        FieldValue::Bool(storage.in_service),
        stamp(&storage.modified),
    ]
}

// -- decode: row to entity --

pub fn bus_from_row(row: &Row) -> Result<Bus> {
    Ok(Bus {
        id: BusId::new(row.require_usize("id")?),
        name: row.name("name"),
        base_kv: Kilovolts(row.opt_f64("base_kv").unwrap_or(0.0)),
        vmin_pu: row.opt_f64("vmin_pu").map(PerUnit),
        vmax_pu: row.opt_f64("vmax_pu").map(PerUnit),
        area: row.opt_i64("area"),
        zone: row.opt_i64("zone"),
        in_service: row.in_service(),
        modified: row.modified(),
    })
}

pub fn branch_from_row(row: &Row) -> Result<Branch> {
    Ok(Branch {
        id: BranchId::new(row.require_usize("id")?),
        name: row.name("name"),
        from_bus: BusId::new(row.require_usize("from_bus")?),
        to_bus: BusId::new(row.require_usize("to_bus")?),
        r_pu: PerUnit(row.opt_f64("r_pu").unwrap_or(0.0)),
        x_pu: PerUnit(row.opt_f64("x_pu").unwrap_or(0.0)),
        b_pu: PerUnit(row.opt_f64("b_pu").unwrap_or(0.0)),
        tap_ratio: row.opt_f64("tap_ratio").unwrap_or(1.0),
        shift: Degrees(row.opt_f64("shift_deg").unwrap_or(0.0)),
        rate_mva: row.opt_f64("rate_mva").map(MegavoltAmperes),
        is_transformer: row.get("is_transformer").as_bool().unwrap_or(false),
        in_service: row.in_service(),
        modified: row.modified(),
    })
}

pub fn gen_from_row(row: &Row) -> Result<Gen> {
    Ok(Gen {
        id: GenId::new(row.require_usize("id")?),
        name: row.name("name"),
        bus: BusId::new(row.require_usize("bus")?),
        p_mw: Megawatts(row.opt_f64("p_mw").unwrap_or(0.0)),
        q_mvar: Megavars(row.opt_f64("q_mvar").unwrap_or(0.0)),
        pmin_mw: row.opt_f64("pmin_mw").map(Megawatts),
        pmax_mw: row.opt_f64("pmax_mw").map(Megawatts),
        qmin_mvar: row.opt_f64("qmin_mvar").map(Megavars),
        qmax_mvar: row.opt_f64("qmax_mvar").map(Megavars),
        vset_pu: row.opt_f64("vset_pu").map(PerUnit),
        in_service: row.in_service(),
        modified: row.modified(),
        profiles: BTreeMap::new(),
    })
}

pub fn load_from_row(row: &Row) -> Result<Load> {
    Ok(Load {
        id: LoadId::new(row.require_usize("id")?),
        name: row.name("name"),
        bus: BusId::new(row.require_usize("bus")?),
        p_mw: Megawatts(row.opt_f64("p_mw").unwrap_or(0.0)),
        q_mvar: Megavars(row.opt_f64("q_mvar").unwrap_or(0.0)),
        in_service: row.in_service(),
        modified: row.modified(),
        profiles: BTreeMap::new(),
    })
}

pub fn shunt_from_row(row: &Row) -> Result<Shunt> {
    Ok(Shunt {
        id: ShuntId::new(row.require_usize("id")?),
        name: row.name("name"),
        bus: BusId::new(row.require_usize("bus")?),
        g_pu: PerUnit(row.opt_f64("g_pu").unwrap_or(0.0)),
        b_pu: PerUnit(row.opt_f64("b_pu").unwrap_or(0.0)),
        in_service: row.in_service(),
        modified: row.modified(),
        profiles: BTreeMap::new(),
    })
}

pub fn storage_from_row(row: &Row) -> Result<Storage> {
    Ok(Storage {
        id: StorageId::new(row.require_usize("id")?),
        name: row.name("name"),
        bus: BusId::new(row.require_usize("bus")?),
        p_mw: Megawatts(row.opt_f64("p_mw").unwrap_or(0.0)),
        pmin_mw: row.opt_f64("pmin_mw").map(Megawatts),
        pmax_mw: row.opt_f64("pmax_mw").map(Megawatts),
        energy_mwh: MegawattHours(row.opt_f64("energy_mwh").unwrap_or(0.0)),
        soc: row.opt_f64("soc").unwrap_or(0.0),
        in_service: row.in_service(),
        modified: row.modified(),
        profiles: BTreeMap::new(),
    })
}
