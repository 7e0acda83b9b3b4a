//! Builds the per-run device roster from a configuration snapshot.
//!
//! The roster is the single owned collection every other layer works from:
//! one [`Station`] per configured column, row, event line and start marker,
//! each carrying an ascending device index. It also fixes the two quantities
//! that must be decided exactly once per run: which analog station is the
//! clock master, and the shared sample rate every station runs at.
//!
//! ## Sample-rate policy
//!
//! The chassis grants each analog station a fixed aggregate bandwidth of
//! [`SAMPLE_BANDWIDTH`] samples per second, shared by all of its lines. The
//! common rate is therefore `SAMPLE_BANDWIDTH / max(lines per station)`: the
//! widest station bounds the rate for everyone, and narrower stations simply
//! run below their ceiling. A roster with no analog lines has no defined
//! rate ([`DeviceRoster::sample_rate`] is `None`) and downstream operations
//! short-circuit instead of failing.

use log::debug;

use crate::config::SystemConfig;
use crate::station::*;

/// Aggregate per-station analog bandwidth budget, in samples per second.
pub const SAMPLE_BANDWIDTH: f64 = 500_000.0;
/// Fallback symmetric voltage range when the snapshot supplies none.
pub const FULL_SCALE_VOLTS: f64 = 10.0;

/// Locates one value of an interleaved row: which analog station, which of
/// its lines, and which multiplexed row the value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellAddress {
    /// Ordinal of the analog station in roster order.
    pub station: usize,
    /// Line index within that station.
    pub line: usize,
    /// Multiplexed row index within that line.
    pub row: usize,
}

/// All stations of one run, constructed together from one immutable
/// configuration snapshot and torn down together.
#[derive(Clone, Debug)]
pub struct DeviceRoster {
    stations: Vec<Station>,
    master: Option<usize>,
    sample_rate: Option<f64>,
    total_lines: usize,
    total_rows: usize,
}

impl DeviceRoster {
    pub fn from_config(cfg: &SystemConfig) -> Self {
        let mut stations: Vec<Station> = Vec::new();
        let voltage_range = if cfg.voltage_range > 0.0 {
            cfg.voltage_range
        } else {
            FULL_SCALE_VOLTS
        };

        let mut master = None;
        let mut total_lines = 0;
        let mut max_lines = 0;
        for col in &cfg.columns {
            if col.lines.is_empty() {
                debug!("skipping column {} with no analog lines", col.module);
                continue;
            }
            total_lines += col.lines.len();
            max_lines = max_lines.max(col.lines.len());
            if master.is_none() {
                master = Some(stations.len());
            }
            stations.push(Station::Analog(AnalogStation {
                name: col.module.clone(),
                lines: col.lines.clone(),
                voltage_range,
                device_index: stations.len(),
                is_master: master == Some(stations.len()),
            }));
        }
        let sample_rate = (max_lines > 0).then(|| SAMPLE_BANDWIDTH / max_lines as f64);

        let mut total_rows = 0;
        for (mux_slot, row) in cfg.rows.iter().enumerate() {
            total_rows += cfg.num_rows;
            stations.push(Station::DigitalOutput(DigitalOutputStation {
                name: row.module.clone(),
                port: row.port.clone(),
                num_lines: cfg.num_rows,
                mux_slot,
                device_index: stations.len(),
            }));
        }

        for evt in &cfg.events {
            stations.push(Station::EventInput(EventInputLine {
                name: evt.module.clone(),
                line: evt.line.clone(),
                event_label: evt.event_label,
                device_index: stations.len(),
            }));
        }

        if !cfg.start.module.is_empty() {
            stations.push(Station::Start(StartGenerator {
                name: cfg.start.module.clone(),
                line: cfg.start.line.clone(),
                start_time: cfg.start.start_time,
                nbr_pulse: cfg.start.nbr_pulse,
                pulse_duration: cfg.start.pulse_duration,
                device_index: stations.len(),
            }));
        }

        Self {
            stations,
            master,
            sample_rate,
            total_lines,
            total_rows,
        }
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Arena index of the clock-master analog station.
    pub fn master_index(&self) -> Option<usize> {
        self.master
    }

    pub fn master(&self) -> Option<&AnalogStation> {
        match self.master.map(|i| &self.stations[i]) {
            Some(Station::Analog(st)) => Some(st),
            _ => None,
        }
    }

    /// Shared rate applied to every station; `None` for a degenerate roster
    /// with no analog lines.
    pub fn sample_rate(&self) -> Option<f64> {
        self.sample_rate
    }

    /// A degenerate roster has nothing to acquire; engine operations on it
    /// are well-defined no-ops.
    pub fn is_degenerate(&self) -> bool {
        self.master.is_none()
    }

    /// Total analog line count across all stations.
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    /// Total multiplexer rows across all digital-output stations.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Row-multiplexed values each analog line contributes per frame. Without
    /// any digital-output station every line contributes a single value.
    pub fn rows_per_frame(&self) -> usize {
        self.total_rows.max(1)
    }

    /// Width of one emitted sample row.
    pub fn row_width(&self) -> usize {
        self.total_lines * self.rows_per_frame()
    }

    pub fn analog_stations(&self) -> impl Iterator<Item = &AnalogStation> {
        self.stations.iter().filter_map(|st| match st {
            Station::Analog(st) => Some(st),
            _ => None,
        })
    }

    pub fn digital_stations(&self) -> impl Iterator<Item = &DigitalOutputStation> {
        self.stations.iter().filter_map(|st| match st {
            Station::DigitalOutput(st) => Some(st),
            _ => None,
        })
    }

    pub fn event_lines(&self) -> impl Iterator<Item = &EventInputLine> {
        self.stations.iter().filter_map(|st| match st {
            Station::EventInput(st) => Some(st),
            _ => None,
        })
    }

    pub fn start_generator(&self) -> Option<&StartGenerator> {
        self.stations.iter().find_map(|st| match st {
            Station::Start(st) => Some(st),
            _ => None,
        })
    }

    pub fn num_digital_stations(&self) -> usize {
        self.digital_stations().count()
    }

    /// Recovers the (station, line, row) address of a flat row index. The
    /// mapping is constant for the whole run.
    pub fn locate(&self, flat_index: usize) -> Option<CellAddress> {
        if flat_index >= self.row_width() {
            return None;
        }
        let rows = self.rows_per_frame();
        let mut line = flat_index / rows;
        let row = flat_index % rows;
        for (station, st) in self.analog_stations().enumerate() {
            if line < st.num_lines() {
                return Some(CellAddress { station, line, row });
            }
            line -= st.num_lines();
        }
        None
    }
}
