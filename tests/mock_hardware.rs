//! Integration tests for the instrument drivers over simulated wires.
//!
//! The XPS and Newport 2936 drivers talk to responder-backed `MockTransport`s
//! that emulate the controllers, so sweeps exercise the real command strings.

use spr_daq::error::DaqError;
use spr_daq::experiment::{
    DurationEstimator, Job, JobQueue, LogObserver, QueueRunner, StageGeometry, SweepParams,
};
use spr_daq::hardware::mock_transport::{DeviceReply, MockTransport, TransportLog};
use spr_daq::hardware::{
    ConnectionMode, InstrumentSet, Movable, Newport2936Driver, PowerReadout, XpsDriver,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// XPS emulation: tracks one shared position for both positioners
fn xps_device() -> (XpsDriver<MockTransport>, TransportLog) {
    let position = Arc::new(Mutex::new(0.0_f64));
    let (socket, log) = MockTransport::with_responder(move |cmd| {
        let mut pos = position.lock().unwrap();
        if let Some(args) = cmd
            .strip_prefix("GroupMoveAbsolute(XY,")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let first = args.split(',').next().unwrap_or_default();
            match first.parse::<f64>() {
                Ok(target) if (-5.0..=95.0).contains(&target) => {
                    *pos = target;
                    DeviceReply::text("0,EndOfAPI")
                }
                _ => DeviceReply::text("-17,EndOfAPI"),
            }
        } else if cmd == "GroupHomeSearch(XY)" {
            *pos = 0.0;
            DeviceReply::text("0,EndOfAPI")
        } else if cmd.starts_with("GroupPositionCurrentGet(XY,") {
            DeviceReply::text(format!("0,{p},{p},EndOfAPI", p = *pos))
        } else if cmd.starts_with("ErrorStringGet(") {
            DeviceReply::text("0,Parameter out of range or incorrect,EndOfAPI")
        } else {
            DeviceReply::text("-3,EndOfAPI")
        }
    });
    let driver = XpsDriver::with_transport(
        socket,
        "XY",
        vec!["XY.X".to_string(), "XY.Y".to_string()],
        Duration::from_millis(200),
    );
    (driver, log)
}

/// Newport 2936 emulation; disconnects after `reads_before_failure` statistics reads
fn meter_device(reads_before_failure: Option<usize>) -> (Newport2936Driver<MockTransport>, TransportLog) {
    let mut reads = 0usize;
    let (port, log) = MockTransport::with_responder(move |cmd| match cmd {
        "PM:STAT:MEAN?;PM:STAT:SDEV?" => {
            if reads_before_failure.is_some_and(|limit| reads >= limit) {
                return DeviceReply::Disconnect;
            }
            reads += 1;
            DeviceReply::text("1.250E-03,4.000E-06\r\n")
        }
        "PM:Lambda?" => DeviceReply::text("633\r\n"),
        "PM:Power?" => DeviceReply::text("1.3E-03\r\n"),
        _ => DeviceReply::Silent,
    });
    let driver = Newport2936Driver::with_transport(port, Duration::from_millis(200))
        .with_command_delay(Duration::ZERO);
    (driver, log)
}

fn sweep_job(dir: &std::path::Path, start: f64, stop: f64, step: f64) -> Job {
    Job::sweep(
        SweepParams {
            start_deg: start,
            stop_deg: stop,
            step_deg: step,
            directory: dir.to_path_buf(),
            base_name: "experiment".into(),
        },
        &DurationEstimator::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_sweep_over_wire_protocols() {
    let dir = tempdir().unwrap();
    let (xps, xps_log) = xps_device();
    let (meter, meter_log) = meter_device(None);
    let instruments = InstrumentSet::new(Arc::new(xps), Arc::new(meter), ConnectionMode::Hardware);

    instruments.stage.home().await.unwrap();
    let runner = QueueRunner::new(instruments.clone(), StageGeometry::default());
    let mut queue = JobQueue::new();
    queue.append(sweep_job(dir.path(), 40.0, 41.0, 0.5));

    let summary = runner.run(&mut queue, &mut LogObserver).await.unwrap();

    assert_eq!(
        xps_log.commands(),
        vec![
            "GroupHomeSearch(XY)",
            "GroupMoveAbsolute(XY,50.000000,50.000000)",
            "GroupMoveAbsolute(XY,49.500000,49.500000)",
            "GroupMoveAbsolute(XY,49.000000,49.000000)",
        ]
    );
    assert_eq!(meter_log.count_prefix("PM:STAT:MEAN?"), 3);

    let rows = &summary.sweeps[0].rows;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.mean_power == 1.25e-3 && r.std_power == 4.0e-6));
    assert_eq!(instruments.stage.position().await.unwrap(), 49.0);
}

#[tokio::test]
async fn test_meter_disconnect_aborts_run() {
    let dir = tempdir().unwrap();
    let (xps, _) = xps_device();
    let (meter, _) = meter_device(Some(1));
    let instruments = InstrumentSet::new(Arc::new(xps), Arc::new(meter), ConnectionMode::Hardware);
    let runner = QueueRunner::new(instruments, StageGeometry::default());

    let mut queue = JobQueue::new();
    queue.append(sweep_job(dir.path(), 40.0, 41.0, 0.5));

    let err = runner.run(&mut queue, &mut LogObserver).await.unwrap_err();

    assert!(matches!(err, DaqError::Communication(_)));
    assert!(err.to_string().contains("PM:STAT:MEAN?"));
    assert_eq!(queue.len(), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_rejected_move_reports_controller_text() {
    let (xps, log) = xps_device();

    let err = xps.move_abs(f64::NAN).await.unwrap_err();

    assert!(err.to_string().contains("code -17"));
    assert!(err.to_string().contains("Parameter out of range"));
    assert_eq!(log.count_prefix("ErrorStringGet(-17"), 1);
}

#[tokio::test]
async fn test_instant_power_over_wire() {
    let (meter, log) = meter_device(None);

    let reading = meter.read_instant_power().await.unwrap();

    assert_eq!(reading.wavelength_nm, 633.0);
    assert_eq!(reading.power, 1.3e-3);
    assert_eq!(log.commands(), vec!["PM:Lambda?", "PM:Power?"]);
}

#[tokio::test]
async fn test_mock_stage_move_delay() {
    let stage = spr_daq::hardware::MockStage::new().with_move_delay(Duration::from_millis(50));

    let start = Instant::now();
    stage.move_abs(45.0).await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(stage.position().await.unwrap(), 45.0);
}
