//! # gridex-schema: Field Definition Tables
//!
//! Static, shared-read-only schema describing every field of the canonical
//! grid model: name, canonical unit, default value, and per-format column
//! mappings for strictly positional formats (MATPOWER).
//!
//! Parsers and the pack/unpack codec consult these tables instead of
//! hard-coding column lists; adding a format variant means editing a table
//! here, never a parser's control flow.
//!
//! ```
//! use gridex_schema::{fields, field, EntityKind};
//!
//! let bus_fields = fields(EntityKind::Bus);
//! assert!(bus_fields.iter().any(|f| f.name == "base_kv"));
//! assert!(field(EntityKind::Gen, "p_mw").is_some());
//! ```

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// The entity kinds of the canonical model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Bus,
    Branch,
    Gen,
    Load,
    Shunt,
    Storage,
}

impl EntityKind {
    /// All entity kinds in canonical table order.
    pub const ALL: &'static [EntityKind] = &[
        EntityKind::Bus,
        EntityKind::Branch,
        EntityKind::Gen,
        EntityKind::Load,
        EntityKind::Shunt,
        EntityKind::Storage,
    ];

    /// Table name used by tabular wire formats (CSV, spreadsheet, SQL).
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Bus => "bus",
            EntityKind::Branch => "branch",
            EntityKind::Gen => "gen",
            EntityKind::Load => "load",
            EntityKind::Shunt => "shunt",
            EntityKind::Storage => "storage",
        }
    }

    /// Reverse lookup from a table name.
    pub fn from_table_name(name: &str) -> Option<EntityKind> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|k| k.table_name() == name)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// Canonical physical unit of a field.
///
/// Parsers convert from format-native units at the boundary; everything past
/// the parser carries these units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Dimensionless or identifier field
    None,
    Kilovolt,
    PerUnit,
    Megawatt,
    Megavar,
    MegavoltAmpere,
    MegawattHour,
    Degree,
}

/// Declared value type of a field, used by untyped tabular wire formats
/// (CSV, spreadsheet cells, SQL columns) to rebuild typed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Float,
    Bool,
    Text,
    /// RFC 3339 timestamp carried as text
    Timestamp,
}

/// Default applied when a tabular source omits an optional column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(&'static str),
    /// Field is genuinely optional in the model (maps to `Option::None`)
    Null,
}

/// One field of one entity kind. Immutable after load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDef {
    pub name: &'static str,
    pub unit: Unit,
    pub ty: FieldType,
    pub default: FieldDefault,
    /// A source missing this field is structurally unparsable
    pub required: bool,
}

const fn req(name: &'static str, unit: Unit, ty: FieldType) -> FieldDef {
    FieldDef {
        name,
        unit,
        ty,
        default: FieldDefault::Null,
        required: true,
    }
}

const fn opt(name: &'static str, unit: Unit, ty: FieldType, default: FieldDefault) -> FieldDef {
    FieldDef {
        name,
        unit,
        ty,
        default,
        required: false,
    }
}

static BUS_FIELDS: &[FieldDef] = &[
    req("id", Unit::None, FieldType::Int),
    opt("name", Unit::None, FieldType::Text, FieldDefault::Text("")),
    opt("base_kv", Unit::Kilovolt, FieldType::Float, FieldDefault::Float(0.0)),
    opt("vmin_pu", Unit::PerUnit, FieldType::Float, FieldDefault::Null),
    opt("vmax_pu", Unit::PerUnit, FieldType::Float, FieldDefault::Null),
    opt("area", Unit::None, FieldType::Int, FieldDefault::Null),
    opt("zone", Unit::None, FieldType::Int, FieldDefault::Null),
    opt("in_service", Unit::None, FieldType::Bool, FieldDefault::Bool(true)),
    opt("modified", Unit::None, FieldType::Timestamp, FieldDefault::Null),
];

static BRANCH_FIELDS: &[FieldDef] = &[
    req("id", Unit::None, FieldType::Int),
    opt("name", Unit::None, FieldType::Text, FieldDefault::Text("")),
    req("from_bus", Unit::None, FieldType::Int),
    req("to_bus", Unit::None, FieldType::Int),
    opt("r_pu", Unit::PerUnit, FieldType::Float, FieldDefault::Float(0.0)),
    opt("x_pu", Unit::PerUnit, FieldType::Float, FieldDefault::Float(0.0)),
    opt("b_pu", Unit::PerUnit, FieldType::Float, FieldDefault::Float(0.0)),
    opt("tap_ratio", Unit::None, FieldType::Float, FieldDefault::Float(1.0)),
    opt("shift_deg", Unit::Degree, FieldType::Float, FieldDefault::Float(0.0)),
    opt("rate_mva", Unit::MegavoltAmpere, FieldType::Float, FieldDefault::Null),
    opt("is_transformer", Unit::None, FieldType::Bool, FieldDefault::Bool(false)),
    opt("in_service", Unit::None, FieldType::Bool, FieldDefault::Bool(true)),
    opt("modified", Unit::None, FieldType::Timestamp, FieldDefault::Null),
];

static GEN_FIELDS: &[FieldDef] = &[
    req("id", Unit::None, FieldType::Int),
    opt("name", Unit::None, FieldType::Text, FieldDefault::Text("")),
    req("bus", Unit::None, FieldType::Int),
    opt("p_mw", Unit::Megawatt, FieldType::Float, FieldDefault::Float(0.0)),
    opt("q_mvar", Unit::Megavar, FieldType::Float, FieldDefault::Float(0.0)),
    opt("pmin_mw", Unit::Megawatt, FieldType::Float, FieldDefault::Null),
    opt("pmax_mw", Unit::Megawatt, FieldType::Float, FieldDefault::Null),
    opt("qmin_mvar", Unit::Megavar, FieldType::Float, FieldDefault::Null),
    opt("qmax_mvar", Unit::Megavar, FieldType::Float, FieldDefault::Null),
    opt("vset_pu", Unit::PerUnit, FieldType::Float, FieldDefault::Null),
    opt("in_service", Unit::None, FieldType::Bool, FieldDefault::Bool(true)),
    opt("modified", Unit::None, FieldType::Timestamp, FieldDefault::Null),
];

static LOAD_FIELDS: &[FieldDef] = &[
    req("id", Unit::None, FieldType::Int),
    opt("name", Unit::None, FieldType::Text, FieldDefault::Text("")),
    req("bus", Unit::None, FieldType::Int),
    opt("p_mw", Unit::Megawatt, FieldType::Float, FieldDefault::Float(0.0)),
    opt("q_mvar", Unit::Megavar, FieldType::Float, FieldDefault::Float(0.0)),
    opt("in_service", Unit::None, FieldType::Bool, FieldDefault::Bool(true)),
    opt("modified", Unit::None, FieldType::Timestamp, FieldDefault::Null),
];

static SHUNT_FIELDS: &[FieldDef] = &[
    req("id", Unit::None, FieldType::Int),
    opt("name", Unit::None, FieldType::Text, FieldDefault::Text("")),
    req("bus", Unit::None, FieldType::Int),
    opt("g_pu", Unit::PerUnit, FieldType::Float, FieldDefault::Float(0.0)),
    opt("b_pu", Unit::PerUnit, FieldType::Float, FieldDefault::Float(0.0)),
    opt("in_service", Unit::None, FieldType::Bool, FieldDefault::Bool(true)),
    opt("modified", Unit::None, FieldType::Timestamp, FieldDefault::Null),
];

static STORAGE_FIELDS: &[FieldDef] = &[
    req("id", Unit::None, FieldType::Int),
    opt("name", Unit::None, FieldType::Text, FieldDefault::Text("")),
    req("bus", Unit::None, FieldType::Int),
    opt("p_mw", Unit::Megawatt, FieldType::Float, FieldDefault::Float(0.0)),
    opt("pmin_mw", Unit::Megawatt, FieldType::Float, FieldDefault::Null),
    opt("pmax_mw", Unit::Megawatt, FieldType::Float, FieldDefault::Null),
    opt("energy_mwh", Unit::MegawattHour, FieldType::Float, FieldDefault::Float(0.0)),
    opt("soc", Unit::None, FieldType::Float, FieldDefault::Float(0.0)),
    opt("in_service", Unit::None, FieldType::Bool, FieldDefault::Bool(true)),
    opt("modified", Unit::None, FieldType::Timestamp, FieldDefault::Null),
];

/// Ordered field definitions for one entity kind.
pub fn fields(kind: EntityKind) -> &'static [FieldDef] {
    match kind {
        EntityKind::Bus => BUS_FIELDS,
        EntityKind::Branch => BRANCH_FIELDS,
        EntityKind::Gen => GEN_FIELDS,
        EntityKind::Load => LOAD_FIELDS,
        EntityKind::Shunt => SHUNT_FIELDS,
        EntityKind::Storage => STORAGE_FIELDS,
    }
}

static FIELD_INDEX: Lazy<HashMap<(EntityKind, &'static str), &'static FieldDef>> =
    Lazy::new(|| {
        let mut map = HashMap::new();
        for kind in EntityKind::ALL {
            for def in fields(*kind) {
                map.insert((*kind, def.name), def);
            }
        }
        map
    });

/// Look up a single field definition by entity kind and field name.
pub fn field(kind: EntityKind, name: &str) -> Option<&'static FieldDef> {
    FIELD_INDEX.get(&(kind, name)).copied()
}

/// One positional column of a strictly ordered tabular format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Zero-based column index in the source row
    pub index: usize,
    /// Column name in the source format's own vocabulary
    pub source_name: &'static str,
    /// Canonical field this column feeds, when it maps one-to-one.
    /// `None` means the parser consumes the value itself (e.g. MATPOWER
    /// PD/QD become Load devices rather than bus fields).
    pub field: Option<&'static str>,
    /// Rows shorter than this column are structurally unparsable
    pub required: bool,
}

const fn col(
    index: usize,
    source_name: &'static str,
    field: Option<&'static str>,
    required: bool,
) -> ColumnSpec {
    ColumnSpec {
        index,
        source_name,
        field,
        required,
    }
}

/// MATPOWER `mpc.bus` matrix columns (shared by case versions 1 and 2).
static MATPOWER_BUS: &[ColumnSpec] = &[
    col(0, "BUS_I", Some("id"), true),
    col(1, "BUS_TYPE", None, true),
    col(2, "PD", None, true),
    col(3, "QD", None, true),
    col(4, "GS", None, true),
    col(5, "BS", None, true),
    col(6, "BUS_AREA", Some("area"), true),
    col(7, "VM", None, true),
    col(8, "VA", None, true),
    col(9, "BASE_KV", Some("base_kv"), true),
    col(10, "ZONE", Some("zone"), true),
    col(11, "VMAX", Some("vmax_pu"), false),
    col(12, "VMIN", Some("vmin_pu"), false),
];

/// MATPOWER `mpc.gen` matrix columns (first ten are common to all versions).
static MATPOWER_GEN: &[ColumnSpec] = &[
    col(0, "GEN_BUS", Some("bus"), true),
    col(1, "PG", Some("p_mw"), true),
    col(2, "QG", Some("q_mvar"), true),
    col(3, "QMAX", Some("qmax_mvar"), false),
    col(4, "QMIN", Some("qmin_mvar"), false),
    col(5, "VG", Some("vset_pu"), false),
    col(6, "MBASE", None, false),
    col(7, "GEN_STATUS", Some("in_service"), false),
    col(8, "PMAX", Some("pmax_mw"), false),
    col(9, "PMIN", Some("pmin_mw"), false),
];

/// MATPOWER `mpc.branch` matrix columns.
static MATPOWER_BRANCH: &[ColumnSpec] = &[
    col(0, "F_BUS", Some("from_bus"), true),
    col(1, "T_BUS", Some("to_bus"), true),
    col(2, "BR_R", Some("r_pu"), true),
    col(3, "BR_X", Some("x_pu"), true),
    col(4, "BR_B", Some("b_pu"), true),
    col(5, "RATE_A", Some("rate_mva"), false),
    col(6, "RATE_B", None, false),
    col(7, "RATE_C", None, false),
    col(8, "TAP", Some("tap_ratio"), false),
    col(9, "SHIFT", Some("shift_deg"), false),
    col(10, "BR_STATUS", Some("in_service"), false),
    col(11, "ANGMIN", None, false),
    col(12, "ANGMAX", None, false),
];

/// Positional column specs for the MATPOWER case format.
///
/// Returns `None` for kinds MATPOWER does not represent as matrices
/// (loads and shunts are folded into bus columns, storage is absent).
pub fn matpower_columns(kind: EntityKind) -> Option<&'static [ColumnSpec]> {
    match kind {
        EntityKind::Bus => Some(MATPOWER_BUS),
        EntityKind::Gen => Some(MATPOWER_GEN),
        EntityKind::Branch => Some(MATPOWER_BRANCH),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_id_first() {
        for kind in EntityKind::ALL {
            let defs = fields(*kind);
            assert_eq!(defs[0].name, "id", "{kind} table must start with id");
            assert!(defs[0].required);
        }
    }

    #[test]
    fn field_index_lookup() {
        let def = field(EntityKind::Branch, "tap_ratio").unwrap();
        assert_eq!(def.default, FieldDefault::Float(1.0));
        assert!(field(EntityKind::Load, "tap_ratio").is_none());
    }

    #[test]
    fn field_names_unique_per_kind() {
        for kind in EntityKind::ALL {
            let defs = fields(*kind);
            for (i, a) in defs.iter().enumerate() {
                for b in &defs[i + 1..] {
                    assert_ne!(a.name, b.name, "duplicate field in {kind}");
                }
            }
        }
    }

    #[test]
    fn matpower_columns_are_contiguous() {
        for kind in [EntityKind::Bus, EntityKind::Gen, EntityKind::Branch] {
            let cols = matpower_columns(kind).unwrap();
            for (i, c) in cols.iter().enumerate() {
                assert_eq!(c.index, i, "column index gap in {kind}");
            }
        }
        assert!(matpower_columns(EntityKind::Storage).is_none());
    }

    #[test]
    fn matpower_mapped_fields_exist() {
        for kind in [EntityKind::Bus, EntityKind::Gen, EntityKind::Branch] {
            for c in matpower_columns(kind).unwrap() {
                if let Some(name) = c.field {
                    assert!(
                        field(kind, name).is_some(),
                        "{kind} column {} maps to unknown field {name}",
                        c.source_name
                    );
                }
            }
        }
    }

    #[test]
    fn defaults_agree_with_declared_types() {
        for kind in EntityKind::ALL {
            for def in fields(*kind) {
                let ok = match def.default {
                    FieldDefault::Float(_) => def.ty == FieldType::Float,
                    FieldDefault::Int(_) => def.ty == FieldType::Int,
                    FieldDefault::Bool(_) => def.ty == FieldType::Bool,
                    FieldDefault::Text(_) => def.ty == FieldType::Text,
                    FieldDefault::Null => true,
                };
                assert!(ok, "{kind}.{} default/type mismatch", def.name);
            }
        }
    }

    #[test]
    fn table_name_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_table_name(kind.table_name()), Some(*kind));
        }
        assert_eq!(EntityKind::from_table_name("nope"), None);
    }

    #[test]
    fn kind_serde_names() {
        let json = serde_json::to_string(&EntityKind::Storage).unwrap();
        assert_eq!(json, "\"storage\"");
    }
}
