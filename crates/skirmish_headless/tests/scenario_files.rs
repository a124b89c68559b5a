//! Scenario files on disk driven through the runner and file store.

use std::path::PathBuf;

use skirmish_core::snapshot::SnapshotPort;
use skirmish_headless::{
    resume, verify_determinism, FileSnapshotStore, MatchRunner, Scenario, ScenarioError,
    SnapshotFormat,
};

fn three_way_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios/three_way.ron")
}

#[test]
fn bundled_scenario_loads() {
    let scenario = Scenario::load(three_way_path()).unwrap();
    assert_eq!(scenario.name, "three_way");
    assert_eq!(scenario.players.len(), 3);
    assert_eq!(scenario.max_ticks, 12_000);
    assert_eq!(scenario.config.starting_resources.gas, 100);

    let sim = scenario.build(1).unwrap();
    assert_eq!(sim.world().players.len(), 3);
    assert_eq!(sim.world().resources.len(), 9);
}

#[test]
fn resolve_accepts_names_and_paths() {
    assert_eq!(Scenario::resolve("mirror").unwrap().name, "mirror");
    let path = three_way_path();
    assert_eq!(
        Scenario::resolve(path.to_str().unwrap()).unwrap().name,
        "three_way"
    );
}

#[test]
fn malformed_file_reports_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.ron");
    std::fs::write(&path, "(name: \"bad\", players: [").unwrap();

    assert!(matches!(Scenario::load(&path), Err(ScenarioError::ParseError(_))));
}

#[test]
fn snapshots_on_disk_resume_the_match() {
    let scenario = Scenario::load(three_way_path()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut store = FileSnapshotStore::open(dir.path(), SnapshotFormat::Json).unwrap();

    let first = MatchRunner::new(scenario.clone(), 6)
        .with_max_ticks(300)
        .with_snapshot_every(150)
        .run_with_store(&mut store)
        .unwrap();
    assert_eq!(first.duration_ticks, 300);
    assert_eq!(
        store.list().unwrap(),
        vec!["final", "tick_00000150", "tick_00000300"]
    );

    let snapshot = store.load("tick_00000150").unwrap();
    assert_eq!(snapshot.tick, 150);
    let resumed = resume(&scenario, 6, &snapshot, 150).unwrap();
    assert_eq!(resumed.duration_ticks, 300);
    assert_eq!(resumed.players.len(), 3);
}

#[test]
fn bundled_scenario_is_deterministic() {
    let scenario = Scenario::load(three_way_path()).unwrap();
    let report = verify_determinism(&scenario, 99, 2, 600).unwrap();
    assert!(report.deterministic, "hashes diverged: {:?}", report.hashes);
}
