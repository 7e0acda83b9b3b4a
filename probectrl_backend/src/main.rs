//! Demo: run a two-column, one-row probe configuration against the mock
//! driver and print the first few frames.

use std::sync::Arc;

use probeplan_backend::config::*;
use probectrl_backend::engine::Engine;
use probectrl_backend::mock::{AnalogPattern, MockSurface};

fn main() {
    env_logger::init();

    let cfg = SystemConfig {
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
    };

    let hw = Arc::new(MockSurface::new());
    hw.set_analog_pattern(AnalogPattern::ChannelOrdinal);

    let mut engine = Engine::new(&cfg, hw);
    engine.set_block_frames(16);
    let roster = engine.roster().expect("roster is available before start");
    println!(
        "roster: {} stations, {} S/s, row width {}",
        roster.stations().len(),
        roster.sample_rate().unwrap_or(0.0),
        roster.row_width()
    );

    let source = engine.start().expect("fresh engine starts");
    for frame in source.iter().take(4) {
        println!(
            "frame {:>3}  t={:.6}s  events={:#018x}  row[..6]={:?}",
            frame.index,
            frame.timestamp,
            frame.event_mask,
            &frame.row[..6]
        );
    }
    engine.stop().expect("clean shutdown");
    println!("stopped cleanly");
}
