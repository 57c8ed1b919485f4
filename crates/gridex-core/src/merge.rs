//! Snapshot reconciliation: merge two canonical models into a third.
//!
//! [`merge`] never mutates its inputs and never fails on conflicting data;
//! conflicts are resolved by a single documented policy and reported, not
//! raised. The only failure mode is [`GridError::StructuralMismatch`] when
//! the inputs disagree on the entity-kind schema revision.
//!
//! ## Precedence policy
//!
//! For an entity present in both snapshots:
//! - if both carry a `modified` stamp, the entity with the *newer* stamp wins
//!   every conflicting field (last writer wins);
//! - ties and missing stamps resolve in favor of `incoming`.
//!
//! Every differing field is recorded in the [`ConflictReport`] together with
//! which side won. Profiles are merged by timestamp union regardless of the
//! field winner, with `incoming` values winning on timestamp collision.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Branch, Bus, Gen, Grid, GridError, GridResult, Load, Shunt, Storage};

/// Which snapshot supplied the surviving value for a conflicting field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictWinner {
    Base,
    Incoming,
}

/// One field that differed between the two snapshots of the same entity.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictRecord {
    /// Entity kind table name ("bus", "gen", ...) or "grid" for container
    /// metadata
    pub kind: String,
    pub id: usize,
    pub field: String,
    pub base: String,
    pub incoming: String,
    pub winner: ConflictWinner,
}

/// Outcome summary of a merge: per-field conflicts plus entity counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<ConflictRecord>,
    /// Entities present only in `incoming`, added to the result
    pub added: usize,
    /// Entities present only in `base`, kept unchanged
    pub kept: usize,
    /// Entities present in both and merged field-by-field
    pub merged: usize,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

fn incoming_wins(base: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> bool {
    match (base, incoming) {
        (Some(b), Some(i)) => i >= b,
        _ => true,
    }
}

macro_rules! diff_fields {
    ($report:expr, $kind:expr, $id:expr, $winner:expr, $base:expr, $inc:expr, $($field:ident),+ $(,)?) => {
        $(
            if $base.$field != $inc.$field {
                $report.conflicts.push(ConflictRecord {
                    kind: $kind.to_string(),
                    id: $id,
                    field: stringify!($field).to_string(),
                    base: format!("{:?}", $base.$field),
                    incoming: format!("{:?}", $inc.$field),
                    winner: $winner,
                });
            }
        )+
    };
}

fn winner_of(base: Option<DateTime<Utc>>, inc: Option<DateTime<Utc>>) -> ConflictWinner {
    if incoming_wins(base, inc) {
        ConflictWinner::Incoming
    } else {
        ConflictWinner::Base
    }
}

fn merge_bus(base: &Bus, inc: &Bus, report: &mut ConflictReport) -> Bus {
    let winner = winner_of(base.modified, inc.modified);
    diff_fields!(
        report, "bus", base.id.value(), winner, base, inc,
        name, base_kv, vmin_pu, vmax_pu, area, zone, in_service
    );
    match winner {
        ConflictWinner::Incoming => inc.clone(),
        ConflictWinner::Base => base.clone(),
    }
}

fn merge_branch(base: &Branch, inc: &Branch, report: &mut ConflictReport) -> Branch {
    let winner = winner_of(base.modified, inc.modified);
    diff_fields!(
        report, "branch", base.id.value(), winner, base, inc,
        name, from_bus, to_bus, r_pu, x_pu, b_pu, tap_ratio, shift, rate_mva,
        is_transformer, in_service
    );
    match winner {
        ConflictWinner::Incoming => inc.clone(),
        ConflictWinner::Base => base.clone(),
    }
}

fn union_profiles(
    base: &std::collections::BTreeMap<String, crate::Profile>,
    inc: &std::collections::BTreeMap<String, crate::Profile>,
) -> std::collections::BTreeMap<String, crate::Profile> {
    let mut out = base.clone();
    for (attr, profile) in inc {
        match out.get(attr) {
            Some(existing) => {
                let merged = existing.merge_union(profile);
                out.insert(attr.clone(), merged);
            }
            None => {
                out.insert(attr.clone(), profile.clone());
            }
        }
    }
    out
}

fn merge_gen(base: &Gen, inc: &Gen, report: &mut ConflictReport) -> Gen {
    let winner = winner_of(base.modified, inc.modified);
    diff_fields!(
        report, "gen", base.id.value(), winner, base, inc,
        name, bus, p_mw, q_mvar, pmin_mw, pmax_mw, qmin_mvar, qmax_mvar,
        vset_pu, in_service
    );
    let mut merged = match winner {
        ConflictWinner::Incoming => inc.clone(),
        ConflictWinner::Base => base.clone(),
    };
    merged.profiles = union_profiles(&base.profiles, &inc.profiles);
    merged
}

fn merge_load(base: &Load, inc: &Load, report: &mut ConflictReport) -> Load {
    let winner = winner_of(base.modified, inc.modified);
    diff_fields!(
        report, "load", base.id.value(), winner, base, inc,
        name, bus, p_mw, q_mvar, in_service
    );
    let mut merged = match winner {
        ConflictWinner::Incoming => inc.clone(),
        ConflictWinner::Base => base.clone(),
    };
    merged.profiles = union_profiles(&base.profiles, &inc.profiles);
    merged
}

fn merge_shunt(base: &Shunt, inc: &Shunt, report: &mut ConflictReport) -> Shunt {
    let winner = winner_of(base.modified, inc.modified);
    diff_fields!(
        report, "shunt", base.id.value(), winner, base, inc,
        name, bus, g_pu, b_pu, in_service
    );
    let mut merged = match winner {
        ConflictWinner::Incoming => inc.clone(),
        ConflictWinner::Base => base.clone(),
    };
    merged.profiles = union_profiles(&base.profiles, &inc.profiles);
    merged
}

fn merge_storage(base: &Storage, inc: &Storage, report: &mut ConflictReport) -> Storage {
    let winner = winner_of(base.modified, inc.modified);
    diff_fields!(
        report, "storage", base.id.value(), winner, base, inc,
        name, bus, p_mw, pmin_mw, pmax_mw, energy_mwh, soc, in_service
    );
    let mut merged = match winner {
        ConflictWinner::Incoming => inc.clone(),
        ConflictWinner::Base => base.clone(),
    };
    merged.profiles = union_profiles(&base.profiles, &inc.profiles);
    merged
}

/// Reconcile two snapshots into a new merged model.
///
/// Entities present only in `incoming` are added; entities present only in
/// `base` are kept; entities present in both are merged field-by-field under
/// the module-level precedence policy. Neither input is mutated.
pub fn merge(base: &Grid, incoming: &Grid) -> GridResult<(Grid, ConflictReport)> {
    if base.schema_version != incoming.schema_version {
        return Err(GridError::StructuralMismatch(format!(
            "schema version {} vs {}",
            base.schema_version, incoming.schema_version
        )));
    }

    let mut report = ConflictReport::default();
    let mut out = Grid::new(if incoming.name.is_empty() {
        base.name.clone()
    } else {
        incoming.name.clone()
    });

    out.base_mva = incoming.base_mva;
    if (base.base_mva - incoming.base_mva).abs() > f64::EPSILON {
        report.conflicts.push(ConflictRecord {
            kind: "grid".to_string(),
            id: 0,
            field: "base_mva".to_string(),
            base: format!("{:?}", base.base_mva),
            incoming: format!("{:?}", incoming.base_mva),
            winner: ConflictWinner::Incoming,
        });
    }

    // Buses first so branch/device reference checks pass on insert.
    for bus in base.buses() {
        let merged = match incoming.bus(bus.id) {
            Some(inc) => {
                report.merged += 1;
                merge_bus(bus, inc, &mut report)
            }
            None => {
                report.kept += 1;
                bus.clone()
            }
        };
        out.add_bus(merged)?;
    }
    for bus in incoming.buses() {
        if base.bus(bus.id).is_none() {
            report.added += 1;
            out.add_bus(bus.clone())?;
        }
    }

    for branch in base.branches() {
        let merged = match incoming.branch(branch.id) {
            Some(inc) => {
                report.merged += 1;
                merge_branch(branch, inc, &mut report)
            }
            None => {
                report.kept += 1;
                branch.clone()
            }
        };
        out.add_branch(merged)?;
    }
    for branch in incoming.branches() {
        if base.branch(branch.id).is_none() {
            report.added += 1;
            out.add_branch(branch.clone())?;
        }
    }

    for gen in base.gens() {
        let merged = match incoming.gen(gen.id) {
            Some(inc) => {
                report.merged += 1;
                merge_gen(gen, inc, &mut report)
            }
            None => {
                report.kept += 1;
                gen.clone()
            }
        };
        out.add_gen(merged)?;
    }
    for gen in incoming.gens() {
        if base.gen(gen.id).is_none() {
            report.added += 1;
            out.add_gen(gen.clone())?;
        }
    }

    for load in base.loads() {
        let merged = match incoming.load(load.id) {
            Some(inc) => {
                report.merged += 1;
                merge_load(load, inc, &mut report)
            }
            None => {
                report.kept += 1;
                load.clone()
            }
        };
        out.add_load(merged)?;
    }
    for load in incoming.loads() {
        if base.load(load.id).is_none() {
            report.added += 1;
            out.add_load(load.clone())?;
        }
    }

    for shunt in base.shunts() {
        let merged = match incoming.shunt(shunt.id) {
            Some(inc) => {
                report.merged += 1;
                merge_shunt(shunt, inc, &mut report)
            }
            None => {
                report.kept += 1;
                shunt.clone()
            }
        };
        out.add_shunt(merged)?;
    }
    for shunt in incoming.shunts() {
        if base.shunt(shunt.id).is_none() {
            report.added += 1;
            out.add_shunt(shunt.clone())?;
        }
    }

    for storage in base.storages() {
        let merged = match incoming.storage(storage.id) {
            Some(inc) => {
                report.merged += 1;
                merge_storage(storage, inc, &mut report)
            }
            None => {
                report.kept += 1;
                storage.clone()
            }
        };
        out.add_storage(merged)?;
    }
    for storage in incoming.storages() {
        if base.storage(storage.id).is_none() {
            report.added += 1;
            out.add_storage(storage.clone())?;
        }
    }

    Ok((out, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BranchId, BusId, GenId, Kilovolts, Megawatts, Profile};
    use chrono::TimeZone;

    fn stamp(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn base_grid() -> Grid {
        let mut grid = Grid::new("base");
        grid.add_bus(Bus {
            id: BusId::new(1),
            name: "north".into(),
            base_kv: Kilovolts(230.0),
            modified: Some(stamp(1)),
            ..Bus::default()
        })
        .unwrap();
        grid.add_bus(Bus {
            id: BusId::new(2),
            name: "south".into(),
            base_kv: Kilovolts(230.0),
            ..Bus::default()
        })
        .unwrap();
        grid.add_branch(Branch {
            id: BranchId::new(1),
            from_bus: BusId::new(1),
            to_bus: BusId::new(2),
            ..Branch::default()
        })
        .unwrap();
        let mut gen = Gen::new(GenId::new(1), "g1", BusId::new(1));
        gen.p_mw = Megawatts(50.0);
        gen.modified = Some(stamp(1));
        grid.add_gen(gen).unwrap();
        grid
    }

    #[test]
    fn merge_with_self_is_identity() {
        let grid = base_grid();
        let (merged, report) = merge(&grid, &grid).unwrap();
        assert_eq!(merged, grid);
        assert!(report.is_empty());
        assert_eq!(report.added, 0);
    }

    #[test]
    fn newer_incoming_wins_and_is_recorded() {
        let base = base_grid();
        let mut incoming = base.clone();
        let mut gen = incoming.gen(GenId::new(1)).unwrap().clone();
        gen.p_mw = Megawatts(80.0);
        gen.modified = Some(stamp(2));
        incoming.replace_gen(gen).unwrap();

        let (merged, report) = merge(&base, &incoming).unwrap();
        assert_eq!(merged.gen(GenId::new(1)).unwrap().p_mw, Megawatts(80.0));

        let conflict = report
            .conflicts
            .iter()
            .find(|c| c.kind == "gen" && c.field == "p_mw")
            .expect("p_mw overwrite recorded");
        assert_eq!(conflict.winner, ConflictWinner::Incoming);
    }

    #[test]
    fn older_incoming_loses() {
        let mut base = base_grid();
        let mut gen = base.gen(GenId::new(1)).unwrap().clone();
        gen.modified = Some(stamp(5));
        base.replace_gen(gen).unwrap();

        let mut incoming = base.clone();
        let mut gen = incoming.gen(GenId::new(1)).unwrap().clone();
        gen.p_mw = Megawatts(10.0);
        gen.modified = Some(stamp(2));
        incoming.replace_gen(gen).unwrap();

        let (merged, report) = merge(&base, &incoming).unwrap();
        assert_eq!(merged.gen(GenId::new(1)).unwrap().p_mw, Megawatts(50.0));
        assert_eq!(report.conflicts[0].winner, ConflictWinner::Base);
    }

    #[test]
    fn missing_stamps_resolve_to_incoming() {
        let base = base_grid();
        let mut incoming = base.clone();
        let mut bus = incoming.bus(BusId::new(2)).unwrap().clone();
        bus.name = "south-renamed".into();
        incoming.replace_bus(bus).unwrap();

        let (merged, _) = merge(&base, &incoming).unwrap();
        assert_eq!(merged.bus(BusId::new(2)).unwrap().name, "south-renamed");
    }

    #[test]
    fn disjoint_entities_are_added_and_kept() {
        let base = base_grid();
        let mut incoming = base.clone();
        incoming
            .add_bus(Bus {
                id: BusId::new(3),
                name: "east".into(),
                ..Bus::default()
            })
            .unwrap();

        let (merged, report) = merge(&base, &incoming).unwrap();
        assert_eq!(merged.bus_count(), 3);
        assert_eq!(report.added, 1);
    }

    #[test]
    fn profiles_union_with_incoming_collision_wins() {
        let base = base_grid();
        let mut incoming = base.clone();

        let mut base2 = base.clone();
        let mut gen = base2.gen(GenId::new(1)).unwrap().clone();
        let mut prof = Profile::new();
        prof.push(stamp(1), 1.0).unwrap();
        prof.push(stamp(2), 2.0).unwrap();
        gen.profiles.insert("p_mw".into(), prof);
        base2.replace_gen(gen).unwrap();

        let mut gen = incoming.gen(GenId::new(1)).unwrap().clone();
        let mut prof = Profile::new();
        prof.push(stamp(2), 20.0).unwrap();
        prof.push(stamp(3), 30.0).unwrap();
        gen.profiles.insert("p_mw".into(), prof);
        incoming.replace_gen(gen).unwrap();

        let (merged, _) = merge(&base2, &incoming).unwrap();
        let points: Vec<_> = merged
            .profile(crate::EntityKind::Gen, 1, "p_mw")
            .unwrap()
            .collect();
        assert_eq!(
            points,
            vec![(stamp(1), 1.0), (stamp(2), 20.0), (stamp(3), 30.0)]
        );
    }

    #[test]
    fn schema_mismatch_is_fatal() {
        let base = base_grid();
        let mut incoming = base.clone();
        incoming.schema_version = 999;
        assert!(matches!(
            merge(&base, &incoming),
            Err(GridError::StructuralMismatch(_))
        ));
    }
}
