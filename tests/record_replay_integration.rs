//! End-to-end record/replay runs against the simulated vehicle
//!
//! These tests drive the whole run through [`SessionOrchestrator`]:
//! - Complete run producing a readable artifact
//! - A refused command still persists and disconnects
//! - A stationary vehicle produces only idle pauses

#![cfg(feature = "sim-link")]

mod common;

use common::mock_helpers::{
    create_drifting_connector, create_hovering_connector, scripted_run, sim_run_config,
};
use kinreplay::link::{SimCommand, SimConfig};
use kinreplay::persistence::{load_metadata, metadata_path, read_artifact};
use kinreplay::replay::{RecordingPacer, SkipReason};
use kinreplay::session::StopReason;
use kinreplay::{ReplayError, RunOutcome, SessionOrchestrator};
use std::time::Duration;

#[test]
fn test_full_run_writes_both_trajectories() {
    let dir = tempfile::tempdir().unwrap();
    let connector = create_drifting_connector(SimConfig::default());
    let mut config = sim_run_config(dir.path());
    config.persistence.write_metadata = true;
    let orchestrator = SessionOrchestrator::new(&connector, config);

    let mut signals = scripted_run(Duration::from_millis(200));
    let pacer = RecordingPacer::new();
    let report = orchestrator.run(&mut signals, pacer.clone()).unwrap();

    assert!(report.outcome.is_completed(), "{}", report.outcome);
    assert_eq!(report.stop_reason, Some(StopReason::Operator));
    assert_eq!(signals.remaining(), 0);

    let dispatch = report.dispatch.as_ref().unwrap();
    assert_eq!(dispatch.moves + dispatch.skips, report.recorded.len() - 1);
    assert_eq!(pacer.holds().len(), report.recorded.len() - 1);

    let artifact_path = report.artifact.as_ref().unwrap();
    let name = artifact_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("kinematics_log_") && name.ends_with(".csv"), "{}", name);

    let artifact = read_artifact(artifact_path).unwrap();
    assert_eq!(artifact.recorded.len(), report.recorded.len());
    for (read, kept) in artifact.recorded.iter().zip(report.recorded.iter()) {
        assert_eq!(read.timestamp(), kept.timestamp());
        assert!(read.position().approx_eq(&kept.position(), 1e-9));
    }
    assert_eq!(artifact.replayed.len(), report.replayed.len());

    let metadata = load_metadata(&metadata_path(artifact_path)).unwrap();
    assert_eq!(metadata.uri, "sim://integration");
    assert_eq!(metadata.recorded_samples, report.recorded.len());
    assert_eq!(metadata.moves, dispatch.moves);
    assert_eq!(metadata.outcome, "completed");

    let log = connector.log();
    assert_eq!((log.connects, log.disconnects), (1, 1));
}

#[test]
fn test_refused_command_persists_and_disconnects() {
    let dir = tempfile::tempdir().unwrap();
    let connector = create_drifting_connector(SimConfig::default().rejecting_command(2));
    let orchestrator = SessionOrchestrator::new(&connector, sim_run_config(dir.path()));

    let mut signals = scripted_run(Duration::from_millis(150));
    let report = orchestrator.run(&mut signals, RecordingPacer::new()).unwrap();

    assert_eq!(report.outcome.error().and_then(ReplayError::failed_step), Some(2));
    let log = connector.log();
    assert_eq!(log.commands.len(), 1);
    assert_eq!(log.disconnects, 1);

    let artifact = read_artifact(report.artifact.as_ref().unwrap()).unwrap();
    assert_eq!(artifact.recorded.len(), report.recorded.len());
}

#[test]
fn test_hovering_vehicle_only_pauses() {
    let dir = tempfile::tempdir().unwrap();
    let connector = create_hovering_connector();
    let orchestrator = SessionOrchestrator::new(&connector, sim_run_config(dir.path()));

    let mut signals = scripted_run(Duration::from_millis(100));
    let pacer = RecordingPacer::new();
    let report = orchestrator.run(&mut signals, pacer.clone()).unwrap();

    assert!(matches!(report.outcome, RunOutcome::Completed));
    let dispatch = report.dispatch.as_ref().unwrap();
    assert_eq!(dispatch.moves, 0);
    assert_eq!(dispatch.skips, report.recorded.len() - 1);
    assert!(!connector
        .log()
        .commands
        .iter()
        .any(|c| matches!(c, SimCommand::MoveBy { .. } | SimCommand::GoTo { .. })));

    let planner = kinreplay::replay::ReplayPlanner::new();
    assert!(planner
        .plan(report.recorded.as_slice())
        .all(|step| step.kind == kinreplay::replay::StepKind::Skip(SkipReason::Stationary)));
}

#[test]
fn test_unreachable_vehicle_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let connector = create_drifting_connector(SimConfig::default().refusing_connections());
    let orchestrator = SessionOrchestrator::new(&connector, sim_run_config(dir.path()));

    let mut signals = scripted_run(Duration::ZERO);
    let result = orchestrator.run(&mut signals, RecordingPacer::new());

    assert!(matches!(result, Err(ReplayError::Connection(_))));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
