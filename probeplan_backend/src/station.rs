//! Implements the station types making up a device roster.
//!
//! Every physical module on the chassis performs exactly one role, and the
//! four roles form a closed set: analog front-ends (columns), digital
//! multiplexer outputs (rows), discrete event inputs, and the single
//! start-marker generator. Rather than a class hierarchy dispatched through
//! virtual calls, the roles are tagged variants of [`Station`] held in one
//! arena and matched on statically wherever behavior differs.
//!
//! Station values are pure descriptions: they carry no hardware handles and
//! are never mutated after the roster is built. The live-task layer binds
//! them to hardware resources for the duration of one run.

/// One analog input station. Its ordered `lines` define a contiguous slice of
/// the interleaved output row.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalogStation {
    pub name: String,
    pub lines: Vec<String>,
    /// Symmetric input range in volts (channels are created as +/- this value).
    pub voltage_range: f64,
    pub device_index: usize,
    /// Exactly one analog station per roster owns the physical clock origin.
    /// Assigned once at roster-build time, never inferred from iteration
    /// order downstream.
    pub is_master: bool,
}

impl AnalogStation {
    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }
}

/// One digital multiplexer output station driving probe row addressing.
#[derive(Clone, Debug, PartialEq)]
pub struct DigitalOutputStation {
    pub name: String,
    pub port: String,
    /// Lines driven on `port`; equals the configured `num_rows`.
    pub num_lines: usize,
    /// Ordinal among digital-output stations. Offsets this station's segment
    /// within the shared multiplexer waveform written once at setup.
    pub mux_slot: usize,
    pub device_index: usize,
}

/// One discrete digital event input line.
#[derive(Clone, Debug, PartialEq)]
pub struct EventInputLine {
    pub name: String,
    pub line: String,
    /// Bit position in the per-frame event mask; checked at encode time.
    pub event_label: u32,
    pub device_index: usize,
}

/// The start-marker generator: emits one finite pulse train when acquisition
/// begins so external equipment can align to the first sample.
#[derive(Clone, Debug, PartialEq)]
pub struct StartGenerator {
    pub name: String,
    pub line: String,
    pub start_time: f64,
    pub nbr_pulse: usize,
    pub pulse_duration: f64,
    pub device_index: usize,
}

/// The closed set of device roles a roster entry can take.
#[derive(Clone, Debug, PartialEq)]
pub enum Station {
    Analog(AnalogStation),
    DigitalOutput(DigitalOutputStation),
    EventInput(EventInputLine),
    Start(StartGenerator),
}

impl Station {
    pub fn name(&self) -> &str {
        match self {
            Station::Analog(st) => &st.name,
            Station::DigitalOutput(st) => &st.name,
            Station::EventInput(st) => &st.name,
            Station::Start(st) => &st.name,
        }
    }

    pub fn device_index(&self) -> usize {
        match self {
            Station::Analog(st) => st.device_index,
            Station::DigitalOutput(st) => st.device_index,
            Station::EventInput(st) => st.device_index,
            Station::Start(st) => st.device_index,
        }
    }

    /// Short role tag used in logs and error reports.
    pub fn role(&self) -> &'static str {
        match self {
            Station::Analog(_) => "analog",
            Station::DigitalOutput(_) => "digital-output",
            Station::EventInput(_) => "event-input",
            Station::Start(_) => "start-generator",
        }
    }
}
