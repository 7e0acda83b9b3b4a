//! In-memory configuration snapshot handed over by the host.
//!
//! Parsing the host's textual configuration is not this crate's concern: the
//! host constructs a [`SystemConfig`] (directly, or through the serde derives
//! from whatever format it stores) and the roster treats it as immutable from
//! then on. Every field is lenient: missing or malformed entries degrade to
//! zero/empty values, so a partial snapshot still yields a well-defined
//! (possibly degenerate) roster instead of an error.

use serde::{Deserialize, Serialize};

/// One analog front-end station ("column"): a chassis module plus the ordered
/// list of analog input lines wired to it.
///
/// Line order is significant: it is the source of the interleaving order of
/// the emitted sample rows and must match the channel metadata the host
/// declares.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub module: String,
    pub lines: Vec<String>,
}

/// One digital multiplexer output station ("row"): a chassis module plus the
/// digital port driving the probe row-address lines.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowConfig {
    pub module: String,
    pub port: String,
}

/// One discrete digital event input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventInputConfig {
    pub module: String,
    pub line: String,
    /// Bit position this line occupies in the per-frame event mask.
    /// Values >= 64 are tolerated here and dropped at encode time.
    pub event_label: u32,
}

/// The start-marker generator: one finite pulse train emitted on a digital
/// line when acquisition begins, for synchronization with external gear.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartOutputConfig {
    pub module: String,
    pub line: String,
    /// Leading all-zero delay before the first pulse, in seconds.
    pub start_time: f64,
    pub nbr_pulse: usize,
    /// Duration of each pulse (and of the gap following it), in seconds.
    pub pulse_duration: f64,
}

/// Immutable snapshot describing the whole station topology for one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub columns: Vec<ColumnConfig>,
    pub rows: Vec<RowConfig>,
    /// Number of lines driven on every row station's port; sizes the
    /// row-multiplexed portion of each emitted sample row.
    pub num_rows: usize,
    pub events: Vec<EventInputConfig>,
    pub start: StartOutputConfig,
    /// Symmetric analog input range in volts. Non-positive values fall back
    /// to [`crate::roster::FULL_SCALE_VOLTS`].
    pub voltage_range: f64,
}
