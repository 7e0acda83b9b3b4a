//! End-to-end runs of the acquisition engine against the mock driver,
//! asserting on the emitted frames and the recorded driver-call sequence.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use probeplan_backend::config::*;
use probeplan_backend::frame::SampleFrame;
use probectrl_backend::engine::{Engine, StreamError};
use probectrl_backend::hardware::{ExportedSignal, HardwareSurface};
use probectrl_backend::mock::{AnalogPattern, MockCall, MockSurface};

/// Two analog columns (3 + 2 lines), one row station of 8 lines, two event
/// lines and a start generator.
fn probe_config() -> SystemConfig {
    SystemConfig {
        columns: vec![
            ColumnConfig {
                module: "PXI1Slot2".to_string(),
                lines: vec!["ai0".into(), "ai1".into(), "ai2".into()],
            },
            ColumnConfig {
                module: "PXI1Slot3".to_string(),
                lines: vec!["ai0".into(), "ai1".into()],
            },
        ],
        rows: vec![RowConfig {
            module: "PXI1Slot4".to_string(),
            port: "port0".to_string(),
        }],
        num_rows: 8,
        events: vec![
            EventInputConfig {
                module: "PXI1Slot5".to_string(),
                line: "line0".to_string(),
                event_label: 0,
            },
            EventInputConfig {
                module: "PXI1Slot5".to_string(),
                line: "line1".to_string(),
                event_label: 1,
            },
        ],
        start: StartOutputConfig {
            module: "PXI1Slot5".to_string(),
            line: "line8".to_string(),
            start_time: 1.0,
            nbr_pulse: 2,
            pulse_duration: 0.5,
        },
        voltage_range: 5.0,
    }
}

fn engine_on(hw: &Arc<MockSurface>) -> Engine {
    let mut engine = Engine::new(&probe_config(), Arc::clone(hw) as Arc<dyn HardwareSurface>);
    engine.set_block_frames(16);
    engine
}

fn recv(source: &Receiver<SampleFrame>) -> SampleFrame {
    source
        .recv_timeout(Duration::from_secs(5))
        .expect("worker produces frames")
}

/// Stops the engine and drains whatever the worker had in flight so the
/// join cannot block on a full sink.
fn shut_down(engine: &mut Engine, source: Receiver<SampleFrame>) -> Result<(), StreamError> {
    engine.request_stop();
    loop {
        match source.recv_timeout(Duration::from_millis(200)) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    engine.wait()
}

#[test]
fn frames_are_indexed_from_one_without_gaps() {
    let hw = Arc::new(MockSurface::new());
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();

    for expected in 1..=40u64 {
        let frame = recv(&source);
        assert_eq!(frame.index, expected);
        assert_eq!(frame.row.len(), 40);
        assert_eq!(frame.event_mask, 0);
    }
    shut_down(&mut engine, source).unwrap();
}

#[test]
fn rows_interleave_station_major_line_minor() {
    let hw = Arc::new(MockSurface::new());
    hw.set_analog_pattern(AnalogPattern::ChannelOrdinal);
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();

    let frame = recv(&source);
    // 5 lines * 8 rows; each line's 8 values carry its global channel
    // ordinal, lines in station-then-line order.
    assert_eq!(frame.row.len(), 40);
    for line in 0..5 {
        for row in 0..8 {
            assert_eq!(frame.row[line * 8 + row], line as f64);
        }
    }
    shut_down(&mut engine, source).unwrap();
}

#[test]
fn timestamps_follow_the_shared_clock() {
    let hw = Arc::new(MockSurface::new());
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();

    // Rate is 500 kS/s / 3 lines; each frame spans 8 rows of that clock.
    let frame_period = 8.0 / (500_000.0 / 3.0);
    let first = recv(&source);
    let second = recv(&source);
    assert_eq!(first.timestamp, 0.0);
    assert!((second.timestamp - frame_period).abs() < 1e-12);
    shut_down(&mut engine, source).unwrap();
}

#[test]
fn event_bits_follow_configured_labels() {
    let hw = Arc::new(MockSurface::new());
    hw.set_digital_fill(1);
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();

    let frame = recv(&source);
    // Both event lines active, labels 0 and 1
    assert_eq!(frame.event_mask, 0b11);
    shut_down(&mut engine, source).unwrap();
}

#[test]
fn clock_exports_precede_peer_bindings() {
    let hw = Arc::new(MockSurface::new());
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();
    recv(&source);
    let calls = hw.calls();
    shut_down(&mut engine, source).unwrap();

    let export_idx = calls
        .iter()
        .position(|c| {
            matches!(c, MockCall::ExportSignal { signal, .. }
                if *signal == ExportedSignal::SampleClock)
        })
        .expect("master exports its sample clock");
    let first_binding = calls
        .iter()
        .position(|c| {
            matches!(c, MockCall::CfgSampClk { src, .. } if src == "/PXI1Slot2/PXI_Trig0")
        })
        .expect("a peer binds to the exported clock");
    assert!(export_idx < first_binding);
}

#[test]
fn every_station_commits_before_any_starts() {
    let hw = Arc::new(MockSurface::new());
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();
    recv(&source);
    let calls = hw.calls();
    shut_down(&mut engine, source).unwrap();

    let last_commit = calls
        .iter()
        .rposition(|c| matches!(c, MockCall::Commit { .. }))
        .unwrap();
    let first_start = calls
        .iter()
        .position(|c| matches!(c, MockCall::Start { .. }))
        .unwrap();
    assert!(last_commit < first_start);
    // One commit per task: 6 primary + the master's counter
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, MockCall::Commit { .. }))
            .count(),
        7
    );
}

#[test]
fn master_analog_task_starts_last() {
    let hw = Arc::new(MockSurface::new());
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();
    recv(&source);
    let calls = hw.calls();
    let started: Vec<String> = calls
        .iter()
        .filter_map(|c| match c {
            MockCall::Start { task } => hw.task_name(*task),
            _ => None,
        })
        .collect();
    shut_down(&mut engine, source).unwrap();

    assert_eq!(started.len(), 7);
    // Triggered tasks arm first: row mux, events, start marker, peer analog.
    // The master's counter precedes its primary task, which fires last.
    assert_eq!(started[0], "DITask_PXI1Slot4");
    assert_eq!(started[1], "EventTask_PXI1Slot5");
    assert_eq!(started[2], "EventTask_PXI1Slot5");
    assert_eq!(started[3], "StartPulseTask");
    assert_eq!(started[4], "AITask_PXI1Slot3");
    assert_eq!(started[5], "CounterClockTaskPXI1Slot2");
    assert_eq!(started[6], "AITask_PXI1Slot2");
}

#[test]
fn commit_failure_aborts_and_tears_down_everything() {
    let hw = Arc::new(MockSurface::new());
    hw.fail_on("commit");
    let mut engine = engine_on(&hw);
    let _source = engine.start().unwrap();
    let err = engine.wait().unwrap_err();
    assert!(matches!(err, StreamError::Setup { .. }));

    let calls = hw.calls();
    assert!(!calls.iter().any(|c| matches!(c, MockCall::Start { .. })));
    let created = calls
        .iter()
        .filter(|c| matches!(c, MockCall::CreateTask { .. }))
        .count();
    let cleared = calls
        .iter()
        .filter(|c| matches!(c, MockCall::Clear { .. }))
        .count();
    assert_eq!(created, cleared);
    // The roster survives a failed run and a fresh start is possible
    assert!(engine.roster().is_some());
    let source = engine.start().unwrap();
    recv(&source);
    shut_down(&mut engine, source).unwrap();
}

#[test]
fn setup_failure_names_the_station() {
    let hw = Arc::new(MockSurface::new());
    hw.fail_on("create_co_pulse_chan");
    let mut engine = engine_on(&hw);
    let _source = engine.start().unwrap();
    match engine.wait().unwrap_err() {
        StreamError::Setup { station, .. } => assert_eq!(station, "PXI1Slot2"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn read_failure_stops_the_run() {
    let hw = Arc::new(MockSurface::new());
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();
    recv(&source);
    hw.fail_on("read_analog_f64");

    let result = shut_down_expecting_error(&mut engine, source);
    assert!(matches!(result, Err(StreamError::Acquisition { .. })));
    let calls = hw.calls();
    let created = calls
        .iter()
        .filter(|c| matches!(c, MockCall::CreateTask { .. }))
        .count();
    let cleared = calls
        .iter()
        .filter(|c| matches!(c, MockCall::Clear { .. }))
        .count();
    assert_eq!(created, cleared);
}

fn shut_down_expecting_error(
    engine: &mut Engine,
    source: Receiver<SampleFrame>,
) -> Result<(), StreamError> {
    // Drain until the worker drops the sink, then join
    loop {
        match source.recv_timeout(Duration::from_secs(5)) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => panic!("worker did not terminate"),
        }
    }
    engine.wait()
}

#[test]
fn stop_is_clean_and_repeatable() {
    let hw = Arc::new(MockSurface::new());
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();
    recv(&source);
    shut_down(&mut engine, source).unwrap();
    let clears = hw
        .calls()
        .iter()
        .filter(|c| matches!(c, MockCall::Clear { .. }))
        .count();
    assert_eq!(clears, 7);

    // A second stop with no run in progress is a no-op
    engine.stop().unwrap();
    assert_eq!(
        hw.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Clear { .. }))
            .count(),
        7
    );
}

#[test]
fn degenerate_configuration_short_circuits() {
    let hw = Arc::new(MockSurface::new());
    let mut engine = Engine::new(
        &SystemConfig::default(),
        Arc::clone(&hw) as Arc<dyn HardwareSurface>,
    );
    let source = engine.start().unwrap();
    // The worker exits immediately without touching the driver
    assert!(matches!(
        source.recv_timeout(Duration::from_secs(5)),
        Err(RecvTimeoutError::Disconnected)
    ));
    engine.wait().unwrap();
    assert!(hw.calls().is_empty());
}

#[test]
fn dropping_the_receiver_stops_the_run() {
    let hw = Arc::new(MockSurface::new());
    let mut engine = engine_on(&hw);
    let source = engine.start().unwrap();
    recv(&source);
    drop(source);
    engine.wait().unwrap();
    assert!(engine.roster().is_some());
}
