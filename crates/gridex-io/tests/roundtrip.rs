//! End-to-end round trips through the public open/save interface.

use std::io::Write;

use chrono::{TimeZone, Utc};
use gridex_core::{
    Branch, BranchId, Bus, BusId, Gen, GenId, Grid, GridError, Kilovolts, Load, LoadId, Megawatts,
    MegavoltAmperes, Megavars, PerUnit, Profile, Shunt, ShuntId, Storage, StorageId,
};
use gridex_io::{open_grid, pack, save_grid, CancelToken, Format};

/// A grid exercising every entity kind, optional fields and profiles.
fn fixture() -> Grid {
    let mut grid = Grid::new("fixture");
    grid.base_mva = 100.0;

    for (id, kv, area) in [(1, 380.0, Some(1)), (2, 380.0, Some(1)), (3, 110.0, None)] {
        grid.add_bus(Bus {
            id: BusId::new(id),
            name: format!("bus {id}"),
            base_kv: Kilovolts(kv),
            area,
            ..Bus::default()
        })
        .unwrap();
    }

    grid.add_branch(Branch {
        id: BranchId::new(1),
        name: "line 1-2".into(),
        from_bus: BusId::new(1),
        to_bus: BusId::new(2),
        r_pu: PerUnit(0.01),
        x_pu: PerUnit(0.1),
        b_pu: PerUnit(0.02),
        rate_mva: Some(MegavoltAmperes(400.0)),
        ..Branch::default()
    })
    .unwrap();
    grid.add_branch(Branch {
        id: BranchId::new(2),
        name: "trafo 2-3".into(),
        from_bus: BusId::new(2),
        to_bus: BusId::new(3),
        r_pu: PerUnit(0.002),
        x_pu: PerUnit(0.08),
        tap_ratio: 0.98,
        is_transformer: true,
        ..Branch::default()
    })
    .unwrap();

    let mut gen = Gen {
        id: GenId::new(1),
        name: "g1".into(),
        bus: BusId::new(1),
        p_mw: Megawatts(300.0),
        q_mvar: Megavars(40.0),
        pmax_mw: Some(Megawatts(500.0)),
        ..Gen::default()
    };
    gen.profiles.insert(
        "p_mw".into(),
        Profile::from_pairs([
            (Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(), 300.0),
            (Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap(), 280.0),
        ]),
    );
    grid.add_gen(gen).unwrap();

    grid.add_load(Load {
        id: LoadId::new(1),
        bus: BusId::new(3),
        p_mw: Megawatts(250.0),
        q_mvar: Megavars(60.0),
        ..Load::default()
    })
    .unwrap();
    grid.add_shunt(Shunt {
        id: ShuntId::new(1),
        bus: BusId::new(3),
        b_pu: PerUnit(0.3),
        ..Shunt::default()
    })
    .unwrap();
    grid.add_storage(Storage {
        id: StorageId::new(1),
        bus: BusId::new(2),
        p_mw: Megawatts(-50.0),
        energy_mwh: gridex_core::MegawattHours(200.0),
        soc: 0.6,
        ..Storage::default()
    })
    .unwrap();
    grid
}

#[test]
fn codec_containers_round_trip_losslessly() {
    let grid = fixture();
    let dir = tempfile::tempdir().unwrap();
    for name in ["g.json", "g.gxb", "g.xlsx", "g.sqlite", "g.zip"] {
        let path = dir.path().join(name);
        save_grid(&grid, &path, None).unwrap();
        let outcome = open_grid(&path, None, &CancelToken::new()).unwrap();
        assert_eq!(outcome.grid, grid, "{name} round trip changed the grid");
    }
}

#[test]
fn identifiers_survive_pack_unpack() {
    let grid = fixture();
    let (back, _) = gridex_io::unpack(&pack(&grid)).unwrap();
    let ids: Vec<usize> = back.buses().map(|b| b.id.value()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(back.branches().map(|b| b.id.value()).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn matpower_round_trip_preserves_network() {
    let grid = fixture();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("case.m");
    save_grid(&grid, &path, None).unwrap();
    let outcome = open_grid(&path, None, &CancelToken::new()).unwrap();

    assert_eq!(outcome.provenance.source_format, Format::Matpower);
    let back = &outcome.grid;
    assert_eq!(back.bus_count(), grid.bus_count());
    assert_eq!(back.branch_count(), grid.branch_count());
    assert_eq!(back.gen_count(), grid.gen_count());

    // MATPOWER folds loads and shunts into bus columns; values survive.
    let load = back.loads().next().unwrap();
    assert!((load.p_mw.0 - 250.0).abs() < 1e-9);
    let shunt = back.shunts().next().unwrap();
    assert!((shunt.b_pu.0 - 0.3).abs() < 1e-9);
    let trafo = back.branches().find(|b| b.is_transformer).unwrap();
    assert!((trafo.tap_ratio - 0.98).abs() < 1e-9);
}

#[test]
fn dangling_reference_aborts_the_parse() {
    let grid = fixture();
    let mut packed = pack(&grid);
    // Retarget the first branch at a bus that does not exist.
    let branch_table = packed.tables.get_mut("branch").unwrap();
    let to = branch_table
        .columns
        .iter()
        .position(|c| c == "to_bus")
        .unwrap();
    branch_table.rows[0][to] = gridex_io::pack::value::FieldValue::Int(99);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, serde_json::to_string(&packed).unwrap()).unwrap();
    let err = open_grid(&path, None, &CancelToken::new()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GridError>(),
        Some(GridError::StructuralParse(_))
    ));
}

#[test]
fn missing_optional_column_warns_and_defaults() {
    let grid = fixture();
    let mut packed = pack(&grid);
    let bus_table = packed.tables.get_mut("bus").unwrap();
    let idx = bus_table.columns.iter().position(|c| c == "vmax_pu").unwrap();
    bus_table.columns.remove(idx);
    for row in &mut bus_table.rows {
        row.remove(idx);
    }

    let (back, diag) = gridex_io::unpack(&packed).unwrap();
    assert!(diag
        .warnings()
        .any(|w| w.category == "field" && w.message.contains("vmax_pu")));
    // Schema default for vmax_pu is null, so the bound stays unset.
    assert_eq!(back.buses().next().unwrap().vmax_pu, None);
}

#[test]
fn archive_with_single_foreign_payload_is_unwrapped() {
    let grid = fixture();
    let dir = tempfile::tempdir().unwrap();

    let case_path = dir.path().join("case.m");
    save_grid(&grid, &case_path, None).unwrap();
    let direct = open_grid(&case_path, None, &CancelToken::new()).unwrap();

    let zip_path = dir.path().join("wrapped.zip");
    let file = std::fs::File::create(&zip_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("case.m", zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(&std::fs::read(&case_path).unwrap()).unwrap();
    writer.finish().unwrap();

    let wrapped = open_grid(&zip_path, None, &CancelToken::new()).unwrap();
    assert_eq!(wrapped.grid, direct.grid);
    assert_eq!(wrapped.provenance.source_format, Format::Archive);
}

#[test]
fn archive_extraction_leaves_no_temp_artifacts() {
    // The handler extracts foreign payloads into the system temp dir under
    // a scoped directory; after open_grid returns, no directory may still
    // hold the payload, on the success or the failure path.
    const SENTINEL: &str = "sentinel_case.m";
    let leftovers = || {
        std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().join(SENTINEL).exists())
            .count()
    };

    let dir = tempfile::tempdir().unwrap();
    let wrap = |content: &str, name: &str| {
        let path = dir.path().join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(SENTINEL, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
        writer.finish().unwrap();
        path
    };

    let good = wrap(
        &gridex_io::formats::matpower::export(&fixture()),
        "good.zip",
    );
    open_grid(&good, None, &CancelToken::new()).unwrap();
    assert_eq!(leftovers(), 0, "extraction dir survived a successful parse");

    let bad = wrap(
        "function mpc = broken\nmpc.version = '2';\nmpc.baseMVA = 100;\n",
        "bad.zip",
    );
    let err = open_grid(&bad, None, &CancelToken::new()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GridError>(),
        Some(GridError::StructuralParse(_))
    ));
    assert_eq!(leftovers(), 0, "extraction dir survived a failed parse");
}

#[test]
fn zip_with_many_foreign_files_is_structural() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("many.zip");
    let file = std::fs::File::create(&zip_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for name in ["a.txt", "b.txt"] {
        writer
            .start_file(name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"not a grid").unwrap();
    }
    writer.finish().unwrap();

    let err = open_grid(&zip_path, None, &CancelToken::new()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GridError>(),
        Some(GridError::StructuralParse(_))
    ));
}

#[test]
fn cancellation_interrupts_an_open() {
    let grid = fixture();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("g.json");
    save_grid(&grid, &path, None).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let err = open_grid(&path, None, &token).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GridError>(),
        Some(GridError::Cancelled)
    ));
}

#[test]
fn merge_with_self_is_idempotent() {
    let grid = fixture();
    let (merged, report) = gridex_core::merge(&grid, &grid).unwrap();
    assert_eq!(merged, grid);
    assert!(report.is_empty());
}

#[test]
fn provenance_records_format_and_path() {
    let grid = fixture();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("g.gxb");
    save_grid(&grid, &path, None).unwrap();
    let outcome = open_grid(&path, None, &CancelToken::new()).unwrap();
    assert_eq!(outcome.provenance.source_format, Format::Binary);
    assert_eq!(outcome.provenance.source_path, path);
}
