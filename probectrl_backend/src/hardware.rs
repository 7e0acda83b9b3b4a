//! Thin, typed surface over the DAQ driver's task API.
//!
//! ## Overview
//!
//! Everything the streaming layer needs from the driver is collected in one
//! trait, [`HardwareSurface`]: task creation, channel creation, timing and
//! trigger configuration, signal export, buffered reads/writes and the
//! commit/start/stop/clear lifecycle. The production implementation wraps
//! the vendor C API; tests and the demo binary use the in-memory
//! [`crate::mock::MockSurface`]. Keeping the seam at driver-call granularity
//! means ordering-sensitive setup logic upstream is exercised identically
//! against both.
//!
//! Driver calls either succeed or fail with a [`DriverError`] naming the
//! call; they never panic. Handles are opaque tokens minted by the surface
//! and are only meaningful to the surface that created them.

use ndarray::Array2;
use thiserror::Error;

/// Opaque token for one driver task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

/// Sample timing mode of a buffered task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleMode {
    /// Acquire or generate until stopped.
    Continuous,
    /// Exactly the configured number of samples, then done.
    Finite,
}

/// Signals a task can drive onto a chassis trigger terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportedSignal {
    SampleClock,
    CounterOutputEvent,
    StartTrigger,
}

/// Failure of a single driver call.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("driver call {call} failed: {message}")]
    Call { call: &'static str, message: String },
    #[error("driver call {call} timed out after {timeout}s")]
    Timeout { call: &'static str, timeout: f64 },
    #[error("operation on an invalid or cleared task handle")]
    InvalidHandle,
}

pub type DriverResult<T> = Result<T, DriverError>;

/// The full set of driver operations the streaming layer performs.
///
/// Physical channel arguments are full driver names (`"PXI1Slot2/ai0"`);
/// clock and trigger sources are terminal paths (`"/PXI1Slot2/PXI_Trig0"`),
/// with the empty string meaning the task's own on-board clock.
pub trait HardwareSurface: Send + Sync {
    fn create_task(&self, name: &str) -> DriverResult<TaskHandle>;

    fn create_ai_voltage_chan(
        &self,
        task: TaskHandle,
        physical: &str,
        v_min: f64,
        v_max: f64,
    ) -> DriverResult<()>;
    fn create_di_chan(&self, task: TaskHandle, physical: &str) -> DriverResult<()>;
    fn create_do_chan(&self, task: TaskHandle, physical: &str) -> DriverResult<()>;
    /// Creates a counter-output pulse channel specified by frequency, duty
    /// cycle and initial idle delay in seconds.
    fn create_co_pulse_chan(
        &self,
        task: TaskHandle,
        counter: &str,
        idle_delay: f64,
        freq: f64,
        duty_cycle: f64,
    ) -> DriverResult<()>;

    fn cfg_samp_clk(
        &self,
        task: TaskHandle,
        src: &str,
        rate: f64,
        mode: SampleMode,
        buf_size: usize,
    ) -> DriverResult<()>;
    /// Timing for counter-output tasks, which pace themselves.
    fn cfg_implicit_timing(
        &self,
        task: TaskHandle,
        mode: SampleMode,
        buf_size: usize,
    ) -> DriverResult<()>;
    fn cfg_dig_edge_start_trig(&self, task: TaskHandle, src: &str) -> DriverResult<()>;
    fn export_signal(
        &self,
        task: TaskHandle,
        signal: ExportedSignal,
        terminal: &str,
    ) -> DriverResult<()>;
    fn set_allow_regen(&self, task: TaskHandle, allow: bool) -> DriverResult<()>;
    fn cfg_output_buffer(&self, task: TaskHandle, size: usize) -> DriverResult<()>;

    /// Writes one chunk of port masks; returns samples written per channel.
    fn write_digital_u32(
        &self,
        task: TaskHandle,
        samples: &[u32],
        timeout: f64,
    ) -> DriverResult<usize>;
    /// Blocking grouped-by-channel read; the result has shape
    /// `(num_chans, samps_per_chan)`.
    fn read_analog_f64(
        &self,
        task: TaskHandle,
        num_chans: usize,
        samps_per_chan: usize,
        timeout: f64,
    ) -> DriverResult<Array2<f64>>;
    fn read_digital_u32(
        &self,
        task: TaskHandle,
        samps_per_chan: usize,
        timeout: f64,
    ) -> DriverResult<Vec<u32>>;

    fn commit(&self, task: TaskHandle) -> DriverResult<()>;
    fn start(&self, task: TaskHandle) -> DriverResult<()>;
    fn stop(&self, task: TaskHandle) -> DriverResult<()>;
    fn clear(&self, task: TaskHandle) -> DriverResult<()>;
}
