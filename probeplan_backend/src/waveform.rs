//! Precomputed digital waveforms written to output stations at setup time.
//!
//! ## Overview
//!
//! Two output roles need sample-exact digital patterns:
//!
//! 1. Every digital-output (row) station regenerates one shared multiplexer
//!    waveform forever. The waveform walks all row lines of all stations in
//!    turn so that at any instant exactly one row line across the whole
//!    system is asserted.
//! 2. The start-marker generator plays a single finite pulse train when
//!    acquisition begins, then goes quiet.
//!
//! Both are plain `Vec<u32>` port masks, one element per output sample, built
//! here from the station descriptions and written verbatim by the streaming
//! layer.

use crate::station::{DigitalOutputStation, StartGenerator};
use crate::utils::line_number;

/// Output samples each row line stays asserted per multiplexer step.
pub const MUX_PULSE_SAMPLES: usize = 3;
/// Upper bound on a single digital write, in samples per channel.
pub const WRITE_CHUNK_SAMPLES: usize = 62_500;

/// Builds the multiplexer segment regenerated by one row station.
///
/// The full multiplexer period covers `num_stations` segments of
/// `num_lines * MUX_PULSE_SAMPLES` samples each. Within its own segment
/// (selected by `mux_slot`) the station asserts each of its lines for the
/// first sample of the line's pulse window; everywhere else the port is zero,
/// so stations never overlap.
pub fn mux_waveform(station: &DigitalOutputStation, num_stations: usize) -> Vec<u32> {
    let segment = station.num_lines * MUX_PULSE_SAMPLES;
    let mut waveform = vec![0u32; segment * num_stations.max(1)];
    let base = station.mux_slot * segment;
    for line in 0..station.num_lines {
        waveform[base + line * MUX_PULSE_SAMPLES] = 1u32 << (line as u32).min(31);
    }
    waveform
}

/// Builds the finite start-marker pulse train at the given sample rate.
///
/// The waveform is `lead` zero samples followed by `nbr_pulse` pulses, each
/// `pulse_duration` high then `pulse_duration` low, with nothing after the
/// final gap. Durations are rounded to whole samples.
pub fn start_waveform(spec: &StartGenerator, samp_rate: f64) -> Vec<u32> {
    let lead = (spec.start_time * samp_rate).round() as usize;
    let pulse_len = (spec.pulse_duration * samp_rate).round() as usize;
    let high = 1u32 << line_number(&spec.line).unwrap_or(0).min(31);

    let mut waveform = vec![0u32; lead + 2 * spec.nbr_pulse * pulse_len];
    for i in 0..spec.nbr_pulse {
        let start = lead + 2 * i * pulse_len;
        waveform[start..start + pulse_len].fill(high);
    }
    waveform
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mux_segments_do_not_overlap() {
        let first = DigitalOutputStation {
            name: "PXI1Slot4".to_string(),
            port: "port0".to_string(),
            num_lines: 8,
            mux_slot: 0,
            device_index: 2,
        };
        let second = DigitalOutputStation {
            mux_slot: 1,
            device_index: 3,
            ..first.clone()
        };

        let wf0 = mux_waveform(&first, 2);
        let wf1 = mux_waveform(&second, 2);
        assert_eq!(wf0.len(), 48);
        assert_eq!(wf1.len(), 48);
        // First station pulses in the first segment, second in the second
        for line in 0..8 {
            assert_eq!(wf0[line * 3], 1 << line);
            assert_eq!(wf1[24 + line * 3], 1 << line);
        }
        // No sample is asserted by both stations
        assert!(wf0.iter().zip(&wf1).all(|(a, b)| a & b == 0));
    }

    #[test]
    fn mux_pulse_spacing() {
        let station = DigitalOutputStation {
            name: "PXI1Slot4".to_string(),
            port: "port0".to_string(),
            num_lines: 2,
            mux_slot: 0,
            device_index: 0,
        };
        let wf = mux_waveform(&station, 1);
        assert_eq!(wf, vec![1, 0, 0, 2, 0, 0]);
    }

    #[test]
    fn start_train_shape() {
        let spec = StartGenerator {
            name: "PXI1Slot5".to_string(),
            line: "line8".to_string(),
            start_time: 1.0,
            nbr_pulse: 2,
            pulse_duration: 0.5,
            device_index: 4,
        };
        let wf = start_waveform(&spec, 1000.0);
        // 1000 lead + 2 pulses of (500 high + 500 low)
        assert_eq!(wf.len(), 3000);
        assert!(wf[..1000].iter().all(|&v| v == 0));
        assert!(wf[1000..1500].iter().all(|&v| v == 1 << 8));
        assert!(wf[1500..2000].iter().all(|&v| v == 0));
        assert!(wf[2000..2500].iter().all(|&v| v == 1 << 8));
        assert!(wf[2500..].iter().all(|&v| v == 0));
    }

    #[test]
    fn start_train_unparseable_line_uses_bit_zero() {
        let spec = StartGenerator {
            name: "PXI1Slot5".to_string(),
            line: "port1".to_string(),
            start_time: 0.0,
            nbr_pulse: 1,
            pulse_duration: 0.002,
            device_index: 4,
        };
        let wf = start_waveform(&spec, 1000.0);
        assert_eq!(wf, vec![1, 1, 0, 0]);
    }
}
