//! Real termination signals reach the control loop as drain requests.
//!
//! Kept as the only test in this binary: the signals are delivered to the
//! whole test process.

#![cfg(unix)]

use driftmeasure::config::CaptureSettings;
use driftmeasure::engine::{LifecycleState, SimulatedEngine};
use driftmeasure::pipeline::{LoopExit, Orchestrator, RunOptions};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::test]
async fn hangup_and_terminate_drain_exactly_once() {
    let config = CaptureSettings {
        source_name: Some("mic0".to_string()),
        output_csv_path: Some(PathBuf::from("/tmp/out.csv")),
        output_wav_path: Some(PathBuf::from("/tmp/out.wav")),
        ..Default::default()
    }
    .validate()
    .unwrap();
    let engine = SimulatedEngine::new();
    let journal = engine.journal();
    let orchestrator = Orchestrator::new(
        &config,
        engine,
        RunOptions {
            dump_dir: None,
            handle_signals: true,
        },
    )
    .unwrap();

    // Handlers are registered when the loop starts; fire once it is idle.
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        unsafe {
            libc::raise(libc::SIGHUP);
            libc::raise(libc::SIGTERM);
        }
    });

    let exit = tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .expect("control loop did not finish after signals")
        .unwrap();
    assert_eq!(exit, LoopExit::EndOfStream);

    let journal = journal.lock().unwrap();
    assert_eq!(journal.eos_sent, 1);
    assert_eq!(journal.finalized_sinks.len(), 2);
    assert_eq!(journal.null_requests(), 1);
    assert_eq!(journal.state, LifecycleState::Null);
}
