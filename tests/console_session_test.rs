//! Integration tests for the operator console.
//!
//! Drives a `ConsoleSession` over the simulated instruments and inspects the
//! text it prints.

use spr_daq::config::SprConfig;
use spr_daq::console::{ConsoleCommand, ConsoleSession, Flow};
use spr_daq::hardware::{ConnectionMode, InstrumentSet, MockPowerMeter, MockStage};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

struct Harness {
    session: ConsoleSession<Vec<u8>>,
    stage: Arc<MockStage>,
}

fn harness(output_dir: &Path) -> Harness {
    let mut config = SprConfig::default();
    config.sweep.output_dir = output_dir.to_path_buf();
    config.sweep.start_deg = 40.0;
    config.sweep.stop_deg = 41.0;
    config.sweep.step_deg = 0.5;

    let stage = Arc::new(MockStage::new());
    let instruments = InstrumentSet::new(
        stage.clone(),
        Arc::new(MockPowerMeter::default()),
        ConnectionMode::Dummy,
    );
    Harness {
        session: ConsoleSession::new(config, instruments, Vec::new()),
        stage,
    }
}

fn output(session: &ConsoleSession<Vec<u8>>) -> String {
    String::from_utf8_lossy(session.view().get_ref()).into_owned()
}

#[tokio::test]
async fn test_move_and_run_refused_before_homing() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    h.session.execute_line("move 45").await;
    h.session.execute_line("sweep").await;
    h.session.execute_line("run").await;

    assert!(h.stage.moves().await.is_empty());
    assert_eq!(h.session.queue().len(), 1);
    assert_eq!(output(&h.session).matches("Home the stage first.").count(), 2);
    assert_eq!(h.session.position(), None);
}

#[tokio::test]
async fn test_home_then_move_updates_position() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    h.session.execute_line("home").await;
    assert!(h.session.is_homed());
    assert_eq!(h.session.position(), Some(90.0));

    h.session.execute_line("move 45").await;
    assert_eq!(h.stage.moves().await, vec![45.0]);
    assert_eq!(h.session.position(), Some(45.0));
    assert!(output(&h.session).contains("Position: [45]"));
}

#[tokio::test]
async fn test_move_is_clamped_to_limits() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());
    h.session.execute_line("home").await;

    h.session.execute_line("move 10").await;
    h.session.execute_line("move 120").await;

    // Relative 30 and 90 deg
    assert_eq!(h.stage.moves().await, vec![60.0, 0.0]);
    assert!(output(&h.session).contains("moving to 30"));
}

#[tokio::test]
async fn test_sweep_form_remembers_last_values() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    h.session.execute_line("sweep --start 35 --stop 36 --step 0.25").await;
    h.session.execute_line("sweep --file gold").await;

    let names: Vec<String> = h.session.queue().iter().map(|j| j.name.clone()).collect();
    assert_eq!(
        names,
        vec![
            "Range: [35.0, 36.0], Step: 0.25",
            "Range: [35.0, 36.0], Step: 0.25",
        ]
    );
    assert_eq!(h.session.form().base_name, "gold");
    assert!(output(&h.session).contains("Total Time Remaining->"));
}

#[tokio::test]
async fn test_invalid_sweep_is_rejected_and_form_kept() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    h.session.execute_line("sweep --start 50 --stop 40").await;

    assert!(h.session.queue().is_empty());
    assert_eq!(h.session.form().start_deg, 40.0);
    assert!(output(&h.session).contains("Error: Invalid sweep"));
}

#[tokio::test]
async fn test_sweep_with_vanishing_step_is_rejected() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    assert_eq!(h.session.execute_line("sweep --step 1e-300").await, Flow::Continue);
    h.session.execute_line("sweep --step 1e-9").await;

    assert!(h.session.queue().is_empty());
    assert_eq!(h.session.form().step_deg, 0.5);
    assert_eq!(output(&h.session).matches("Error: Invalid sweep").count(), 2);
}

#[tokio::test]
async fn test_queue_editing_commands() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    h.session.execute_line("wait 60").await;
    h.session.execute_line("wait").await;
    assert_eq!(h.session.queue().get(1).unwrap().name, "Wait: 60 seconds");

    h.session.execute_line("copy 0").await;
    assert_eq!(h.session.queue().len(), 3);

    h.session.execute_line("copy 3").await;
    h.session.execute_line("delete 9").await;
    assert_eq!(h.session.queue().len(), 3);
    assert_eq!(output(&h.session).matches("Index too high.").count(), 2);

    h.session.execute_line("delete 0").await;
    assert_eq!(h.session.queue().len(), 2);

    h.session.execute_line("clear").await;
    assert!(h.session.queue().is_empty());
}

#[tokio::test]
async fn test_run_executes_queue_and_prints_progress() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    h.session.execute_line("home").await;
    h.session.execute_line("sweep").await;
    h.session.execute_line("wait 0").await;
    h.session.execute_line("run").await;

    assert!(h.session.queue().is_empty());
    assert!(dir.path().join("experiment_1.csv").exists());
    let text = output(&h.session);
    assert!(text.contains("Running: Range: [40.0, 41.0], Step: 0.5."));
    assert!(text.contains("Saved 3 points to"));
    assert!(text.contains("Running: Wait: 0 seconds."));
    assert!(text.contains("Queue finished!"));
}

#[tokio::test]
async fn test_run_on_empty_queue_prompts() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    h.session.execute_line("home").await;
    h.session.execute_line("run").await;

    assert!(output(&h.session).contains("[!] The queue is empty. First add some jobs!"));
    assert!(!output(&h.session).contains("Queue finished!"));
}

#[tokio::test]
async fn test_meter_commands() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    h.session.execute_line("wavelength 785").await;
    h.session.execute_line("wavelength 5000").await;
    h.session.execute_line("power").await;
    h.session.execute_line("status").await;

    let text = output(&h.session);
    assert!(text.contains("Wavelength set to 785 nm"));
    assert!(text.contains("outside detector range"));
    assert!(text.contains("at 785 nm"));
    assert!(text.contains("Mode: dummy"));
    assert!(text.contains("Position: [NaN]"));
}

#[tokio::test]
async fn test_unknown_command_prints_usage_and_continues() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    assert_eq!(h.session.execute_line("jump 3").await, Flow::Continue);
    assert!(output(&h.session).contains("jump"));
    assert_eq!(h.session.execute(ConsoleCommand::Quit).await, Flow::Quit);
}

#[tokio::test]
async fn test_run_loop_reads_until_quit() {
    let dir = tempdir().unwrap();
    let mut h = harness(dir.path());

    let script: &[u8] = b"wait 1\nshow\nquit\nwait 2\n";
    h.session.run(script).await.unwrap();

    assert_eq!(h.session.queue().len(), 1);
    assert!(output(&h.session).contains("spr> "));
}
