//! Sample frames and the pure transforms that fill them.
//!
//! ## Overview
//!
//! The streaming worker reads one raw block per station and turns it into a
//! sequence of [`SampleFrame`] values, each carrying one interleaved row of
//! analog values plus the frame's event mask. The two transforms involved are
//! pure functions over the raw blocks so they can be tested without any
//! hardware in the loop:
//!
//! - [`SampleInterleaver`] flattens the per-station channel-major blocks into
//!   the station-major, line-minor, row-innermost layout the host consumes.
//! - [`EventEncoder`] folds a window of raw digital reads per event line into
//!   a 64-bit mask, one bit per configured event label.

use log::warn;
use ndarray::Array2;

use crate::roster::DeviceRoster;

/// Raw digital samples folded into each frame's event mask, per event line.
pub const EVENT_WINDOW_SAMPLES: usize = 32;
/// Index assigned to the first frame of a run.
pub const FIRST_FRAME_INDEX: u64 = 1;

/// One emitted acquisition frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleFrame {
    /// Monotonically increasing, gap-free, starting at [`FIRST_FRAME_INDEX`].
    pub index: u64,
    /// Interleaved analog values; length is the roster's row width.
    pub row: Vec<f64>,
    /// One bit per event line active anywhere in this frame's window.
    pub event_mask: u64,
    /// Seconds since the first frame, on the shared sample clock.
    pub timestamp: f64,
}

/// Flattens per-station analog blocks into interleaved frame rows.
///
/// Layout is fixed at construction from the roster: stations in roster order,
/// each contributing `num_lines * rows_per_frame` consecutive values, lines
/// in configured order, the multiplexed rows of one line adjacent.
pub struct SampleInterleaver {
    line_offsets: Vec<usize>,
    lines: Vec<usize>,
    rows: usize,
    width: usize,
}

impl SampleInterleaver {
    pub fn new(roster: &DeviceRoster) -> Self {
        let mut line_offsets = Vec::new();
        let mut lines = Vec::new();
        let mut offset = 0;
        for st in roster.analog_stations() {
            line_offsets.push(offset);
            lines.push(st.num_lines());
            offset += st.num_lines();
        }
        Self {
            line_offsets,
            lines,
            rows: roster.rows_per_frame(),
            width: offset * roster.rows_per_frame(),
        }
    }

    pub fn row_width(&self) -> usize {
        self.width
    }

    /// Fills `out` with frame `frame` of the given blocks. `blocks[s]` holds
    /// station `s`'s raw read with shape `(lines, block_frames * rows)`,
    /// samples grouped by channel. `out` must be `row_width()` long and
    /// `frame` must lie within the block.
    pub fn interleave(&self, frame: usize, blocks: &[Array2<f64>], out: &mut [f64]) {
        debug_assert_eq!(blocks.len(), self.lines.len());
        debug_assert_eq!(out.len(), self.row_width());
        for (s, block) in blocks.iter().enumerate() {
            for line in 0..self.lines[s] {
                for r in 0..self.rows {
                    out[(self.line_offsets[s] + line) * self.rows + r] =
                        block[(line, frame * self.rows + r)];
                }
            }
        }
    }
}

/// Folds raw event-line reads into per-frame 64-bit masks.
///
/// A line with any nonzero sample in the frame's window sets the bit at its
/// configured event label. Labels outside the mask are dropped, with one
/// warning per line per block.
pub struct EventEncoder {
    labels: Vec<u32>,
    warned: Vec<bool>,
}

impl EventEncoder {
    pub fn new(roster: &DeviceRoster) -> Self {
        let labels: Vec<u32> = roster.event_lines().map(|evt| evt.event_label).collect();
        let warned = vec![false; labels.len()];
        Self { labels, warned }
    }

    /// Re-arms the out-of-range warnings; called once per raw block.
    pub fn reset_warnings(&mut self) {
        self.warned.fill(false);
    }

    /// Encodes frame `frame` of the given windows. `windows[i]` holds event
    /// line `i`'s raw block of `block_frames * EVENT_WINDOW_SAMPLES` samples.
    pub fn encode(&mut self, frame: usize, windows: &[Vec<u32>]) -> u64 {
        debug_assert_eq!(windows.len(), self.labels.len());
        let mut mask = 0u64;
        for (i, window) in windows.iter().enumerate() {
            let label = self.labels[i];
            if label >= u64::BITS {
                if !self.warned[i] {
                    warn!("event label {} exceeds the 64-bit mask, dropped", label);
                    self.warned[i] = true;
                }
                continue;
            }
            let start = frame * EVENT_WINDOW_SAMPLES;
            if window[start..start + EVENT_WINDOW_SAMPLES]
                .iter()
                .any(|&v| v != 0)
            {
                mask |= 1u64 << label;
            }
        }
        mask
    }
}
