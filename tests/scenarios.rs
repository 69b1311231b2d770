//! End-to-end runs of the measurement pipeline against the simulated engine.

use driftmeasure::config::CaptureSettings;
use driftmeasure::engine::{
    EventSource, LifecycleState, NodeId, NodeKind, PropertyValue, SimulatedEngine, StatusEvent,
};
use driftmeasure::pipeline::topology::{props, roles};
use driftmeasure::pipeline::{LoopExit, Orchestrator, RunOptions, ShutdownSignal};
use driftmeasure::{CaptureConfig, DriftError};
use std::path::PathBuf;

fn settings() -> CaptureSettings {
    CaptureSettings {
        source_name: Some("mic0".to_string()),
        output_csv_path: Some(PathBuf::from("/tmp/out.csv")),
        ..Default::default()
    }
}

fn no_signals() -> RunOptions {
    RunOptions {
        dump_dir: None,
        handle_signals: false,
    }
}

fn build(config: &CaptureConfig, engine: SimulatedEngine) -> Orchestrator<SimulatedEngine> {
    Orchestrator::new(config, engine, no_signals()).unwrap()
}

#[tokio::test]
async fn csv_only_run_builds_single_branch_with_native_units() {
    let config = settings().validate().unwrap();
    let engine = SimulatedEngine::new();
    let journal = engine.journal();
    let orchestrator = build(&config, engine);

    assert!(orchestrator.controller().topology().recording.is_none());
    assert_eq!(orchestrator.controller().topology().branch_count(), 1);

    orchestrator.control_handle().request_drain(ShutdownSignal::Interrupt);
    let exit = orchestrator.run().await.unwrap();
    assert_eq!(exit, LoopExit::EndOfStream);
    assert_eq!(exit.exit_code(), 0);

    let journal = journal.lock().unwrap();
    assert!(journal.nodes_of_kind(NodeKind::ContainerEncoder).is_empty());
    assert_eq!(journal.links_from(roles::SPLITTER).len(), 1);
    assert_eq!(
        journal.property(roles::CSV_ANALYSIS, props::PULSE_LENGTH),
        Some(&PropertyValue::U64(2_000_000))
    );
    assert_eq!(
        journal.property(roles::CSV_ANALYSIS, props::WINDOW_SIZE),
        Some(&PropertyValue::U64(500_000_000))
    );
    assert_eq!(
        journal.property(roles::CAPTURE, props::DEVICE),
        Some(&PropertyValue::Str("mic0".to_string()))
    );
}

#[tokio::test]
async fn recording_run_drains_once_and_finalizes_both_sinks() {
    let config = CaptureSettings {
        output_wav_path: Some(PathBuf::from("/tmp/out.wav")),
        ..settings()
    }
    .validate()
    .unwrap();
    let engine = SimulatedEngine::new();
    let journal = engine.journal();
    let orchestrator = build(&config, engine);

    let handle = orchestrator.control_handle();
    handle.request_drain(ShutdownSignal::Terminate);
    handle.request_drain(ShutdownSignal::Terminate);
    handle.request_drain(ShutdownSignal::Hangup);

    let exit = orchestrator.run().await.unwrap();
    assert_eq!(exit.exit_code(), 0);

    let journal = journal.lock().unwrap();
    let splits = journal.links_from(roles::SPLITTER);
    assert_eq!(splits.len(), 2);
    assert!(splits.iter().all(|link| link.filter.is_none()));
    assert_eq!(journal.eos_sent, 1);
    assert!(journal.finalized_sinks.contains(&NodeId::new(roles::CSV_SINK)));
    assert!(journal.finalized_sinks.contains(&NodeId::new(roles::WAV_SINK)));
    assert_eq!(journal.null_requests(), 1);
    assert_eq!(journal.state, LifecycleState::Null);
}

#[test]
fn reference_channel_out_of_range_is_rejected_before_building() {
    let result = CaptureSettings {
        reference_channel: 2,
        num_channels: 2,
        ..settings()
    }
    .validate();
    match result {
        Err(DriftError::ConfigInvalidValue { key, .. }) => assert_eq!(key, "reference_channel"),
        other => panic!("Expected ConfigInvalidValue, got {other:?}"),
    }
}

#[tokio::test]
async fn error_while_playing_stops_loop_with_single_teardown() {
    let config = settings().validate().unwrap();
    let engine = SimulatedEngine::new().with_events_on_playing(vec![
        StatusEvent::Error {
            message: "Error from pulsesrc: stream disconnected".to_string(),
            detail: None,
        },
        StatusEvent::Warning {
            message: "late".to_string(),
            detail: None,
        },
        StatusEvent::Latency,
        StatusEvent::EndOfStream,
    ]);
    let journal = engine.journal();
    let orchestrator = build(&config, engine);

    let exit = orchestrator.run().await.unwrap();
    assert_eq!(exit.exit_code(), 1);
    assert!(matches!(exit, LoopExit::Fatal { ref message } if message.contains("disconnected")));

    let journal = journal.lock().unwrap();
    assert_eq!(journal.null_requests(), 1);
    assert_eq!(journal.latency_recalculations, 0);
}

#[test]
fn missing_analysis_plugin_fails_before_anything_runs() {
    let config = settings().validate().unwrap();
    let engine = SimulatedEngine::new().without_kind(NodeKind::AnalysisNode);
    let journal = engine.journal();

    let err = Orchestrator::new(&config, engine, no_signals())
        .err()
        .unwrap();
    assert_eq!(
        err.to_string(),
        "Could not create csv_driftmeasure node: element factory \"driftmeasure\" is unavailable"
    );
    let journal = journal.lock().unwrap();
    assert!(journal.nodes.is_empty());
    assert!(journal.state_requests.is_empty());
}

#[tokio::test]
async fn snapshots_written_for_every_graph_state_change() {
    let dir = tempfile::tempdir().unwrap();
    let config = settings().validate().unwrap();
    let orchestrator = Orchestrator::new(
        &config,
        SimulatedEngine::new(),
        RunOptions {
            dump_dir: Some(dir.path().to_path_buf()),
            handle_signals: false,
        },
    )
    .unwrap();
    orchestrator.control_handle().request_drain(ShutdownSignal::Interrupt);
    orchestrator.run().await.unwrap();

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    let labels: Vec<&str> = names
        .iter()
        .filter_map(|name| name.split_once('-').map(|(_, label)| label))
        .collect();
    assert_eq!(labels.len(), 3);
    assert!(labels.contains(&"statechange_old-NULL_new-READY_pending-PLAYING.dot"));
    assert!(labels.contains(&"statechange_old-READY_new-PAUSED_pending-PLAYING.dot"));
    assert!(labels.contains(&"statechange_old-PAUSED_new-PLAYING_pending-VOID_PENDING.dot"));
}

#[tokio::test]
async fn device_is_bound_only_by_capture_node_ready() {
    let config = settings().validate().unwrap();
    let engine = SimulatedEngine::new().with_events_on_playing(vec![
        StatusEvent::StateChanged(driftmeasure::engine::StateChange {
            old: LifecycleState::Null,
            new: LifecycleState::Ready,
            pending: None,
            source: EventSource::Node(NodeId::new(roles::CSV_SINK)),
        }),
        StatusEvent::EndOfStream,
    ]);
    let journal = engine.journal();
    let orchestrator = build(&config, engine);
    orchestrator.run().await.unwrap();

    let journal = journal.lock().unwrap();
    assert_eq!(
        journal.property(roles::CAPTURE, props::DEVICE),
        Some(&PropertyValue::Str("mic0".to_string()))
    );
    assert_eq!(journal.property(roles::CSV_SINK, props::DEVICE), None);
}
