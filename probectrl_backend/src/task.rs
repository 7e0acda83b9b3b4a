//! Per-station hardware task configuration and lifecycle.
//!
//! ## Overview
//!
//! Each roster station is bound to at most two driver tasks for the duration
//! of a run: every station owns one primary task, and the clock master
//! additionally owns the counter task generating the doubled-rate row clock.
//! [`TaskFactory`] performs the role-specific setup calls; [`LiveTask`]
//! tracks the resulting handles through the commit/start/stop lifecycle.
//!
//! Setup ordering matters and is enforced by the engine, not here: the
//! master must be configured before any peer binds to its exported
//! terminals, every task must be committed before any task starts, and the
//! master's primary task starts last because its start trigger releases
//! everyone else.

use log::debug;

use probeplan_backend::station::*;
use probeplan_backend::utils::ChunkCursor;
use probeplan_backend::waveform::{mux_waveform, start_waveform, WRITE_CHUNK_SAMPLES};
use probeplan_backend::{DeviceRoster, EVENT_WINDOW_SAMPLES};

use crate::clock::ClockRoutes;
use crate::hardware::{DriverResult, ExportedSignal, HardwareSurface, SampleMode, TaskHandle};

/// Blocking analog read timeout, seconds.
pub const ANALOG_READ_TIMEOUT: f64 = 5.0;
/// Blocking event-line read timeout, seconds. Event windows span more wall
/// time than one analog block, so the bound is looser.
pub const EVENT_READ_TIMEOUT: f64 = 10.0;
/// Multiplexer waveform write timeout, seconds.
pub const MUX_WRITE_TIMEOUT: f64 = 10.0;
/// Start-marker waveform write timeout, seconds per chunk.
pub const START_WRITE_TIMEOUT: f64 = 5.0;
/// Input buffers hold this many raw blocks of headroom.
pub const BUFFER_BLOCKS: usize = 10;

/// Lifecycle phase of one station's task pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Configured,
    Committed,
    Running,
    Stopped,
}

/// Live handles of one configured station.
#[derive(Debug)]
pub struct LiveTask {
    /// Index of the owning station in the roster arena.
    pub station: usize,
    pub state: TaskState,
    task: Option<TaskHandle>,
    /// Clock master only: the doubled-rate counter task.
    counter: Option<TaskHandle>,
}

impl LiveTask {
    pub fn handle(&self) -> Option<TaskHandle> {
        self.task
    }

    pub fn commit(&mut self, hw: &dyn HardwareSurface) -> DriverResult<()> {
        if let Some(task) = self.task {
            hw.commit(task)?;
        }
        if let Some(counter) = self.counter {
            hw.commit(counter)?;
        }
        self.state = TaskState::Committed;
        Ok(())
    }

    /// Starts the counter before the primary task so the row clock is live
    /// by the time the master's start trigger fires.
    pub fn start(&mut self, hw: &dyn HardwareSurface) -> DriverResult<()> {
        if let Some(counter) = self.counter {
            hw.start(counter)?;
        }
        if let Some(task) = self.task {
            hw.start(task)?;
        }
        self.state = TaskState::Running;
        Ok(())
    }

    /// Stops and clears both handles. Teardown never propagates errors and
    /// is idempotent: handles are taken out on first call.
    pub fn stop(&mut self, hw: &dyn HardwareSurface) {
        for handle in [self.task.take(), self.counter.take()].into_iter().flatten() {
            if let Err(e) = hw.stop(handle) {
                debug!("stop of task {:?} failed during teardown: {}", handle, e);
            }
            if let Err(e) = hw.clear(handle) {
                debug!("clear of task {:?} failed during teardown: {}", handle, e);
            }
        }
        self.state = TaskState::Stopped;
    }
}

/// Builds the driver task(s) for each station role.
pub struct TaskFactory<'a> {
    hw: &'a dyn HardwareSurface,
    routes: ClockRoutes,
    samp_rate: f64,
    block_frames: usize,
    rows_per_frame: usize,
    num_digital_stations: usize,
}

impl<'a> TaskFactory<'a> {
    pub fn new(
        hw: &'a dyn HardwareSurface,
        routes: ClockRoutes,
        roster: &DeviceRoster,
        samp_rate: f64,
        block_frames: usize,
    ) -> Self {
        Self {
            hw,
            routes,
            samp_rate,
            block_frames,
            rows_per_frame: roster.rows_per_frame(),
            num_digital_stations: roster.num_digital_stations(),
        }
    }

    /// Rows of the shared timebase one raw block spans.
    fn block_rows(&self) -> usize {
        self.block_frames * self.rows_per_frame
    }

    pub fn configure(&self, index: usize, station: &Station) -> DriverResult<LiveTask> {
        match station {
            Station::Analog(st) if st.is_master => self.configure_master(index, st),
            Station::Analog(st) => self.configure_peer_analog(index, st),
            Station::DigitalOutput(st) => self.configure_digital_out(index, st),
            Station::EventInput(st) => self.configure_event_line(index, st),
            Station::Start(st) => self.configure_start_generator(index, st),
        }
    }

    /// The master samples on its own on-board clock and exports the three
    /// timebase signals everyone else binds to.
    fn configure_master(&self, index: usize, st: &AnalogStation) -> DriverResult<LiveTask> {
        let task = self.hw.create_task(&format!("AITask_{}", st.name))?;
        for line in &st.lines {
            self.hw.create_ai_voltage_chan(
                task,
                &format!("{}/{}", st.name, line),
                -st.voltage_range,
                st.voltage_range,
            )?;
        }
        self.hw.cfg_samp_clk(
            task,
            "",
            self.samp_rate,
            SampleMode::Continuous,
            self.block_rows() * BUFFER_BLOCKS,
        )?;
        self.hw
            .export_signal(task, ExportedSignal::SampleClock, &self.routes.samp_clk)?;
        self.hw
            .export_signal(task, ExportedSignal::StartTrigger, &self.routes.start_trig)?;

        // Counter pulse at twice the sample rate, 50% duty, delayed by three
        // quarters of a sample so row transitions land between conversions.
        let counter = self
            .hw
            .create_task(&format!("CounterClockTask{}", st.name))?;
        self.hw.create_co_pulse_chan(
            counter,
            &format!("{}/ctr0", st.name),
            3.0 / (4.0 * self.samp_rate),
            2.0 * self.samp_rate,
            0.5,
        )?;
        self.hw
            .cfg_implicit_timing(counter, SampleMode::Continuous, 1000)?;
        self.hw.export_signal(
            counter,
            ExportedSignal::CounterOutputEvent,
            &self.routes.counter_clk,
        )?;
        self.hw
            .cfg_dig_edge_start_trig(counter, &self.routes.start_trig)?;

        Ok(LiveTask {
            station: index,
            state: TaskState::Configured,
            task: Some(task),
            counter: Some(counter),
        })
    }

    fn configure_peer_analog(&self, index: usize, st: &AnalogStation) -> DriverResult<LiveTask> {
        let task = self.hw.create_task(&format!("AITask_{}", st.name))?;
        for line in &st.lines {
            self.hw.create_ai_voltage_chan(
                task,
                &format!("{}/{}", st.name, line),
                -st.voltage_range,
                st.voltage_range,
            )?;
        }
        self.hw.cfg_samp_clk(
            task,
            &self.routes.samp_clk,
            self.samp_rate,
            SampleMode::Continuous,
            self.block_rows() * BUFFER_BLOCKS,
        )?;
        self.hw
            .cfg_dig_edge_start_trig(task, &self.routes.start_trig)?;
        Ok(LiveTask {
            station: index,
            state: TaskState::Configured,
            task: Some(task),
            counter: None,
        })
    }

    /// Row stations regenerate their multiplexer segment forever, paced by
    /// the doubled-rate counter clock. The waveform is written once here.
    fn configure_digital_out(
        &self,
        index: usize,
        st: &DigitalOutputStation,
    ) -> DriverResult<LiveTask> {
        let task = self.hw.create_task(&format!("DITask_{}", st.name))?;
        self.hw
            .create_do_chan(task, &format!("{}/{}", st.name, st.port))?;
        self.hw.cfg_samp_clk(
            task,
            &self.routes.counter_clk,
            2.0 * self.samp_rate,
            SampleMode::Continuous,
            self.block_rows() * 2,
        )?;
        self.hw
            .cfg_dig_edge_start_trig(task, &self.routes.start_trig)?;
        self.hw.set_allow_regen(task, true)?;
        let waveform = mux_waveform(st, self.num_digital_stations);
        self.hw
            .write_digital_u32(task, &waveform, MUX_WRITE_TIMEOUT)?;
        Ok(LiveTask {
            station: index,
            state: TaskState::Configured,
            task: Some(task),
            counter: None,
        })
    }

    fn configure_event_line(&self, index: usize, st: &EventInputLine) -> DriverResult<LiveTask> {
        let task = self.hw.create_task(&format!("EventTask_{}", st.name))?;
        self.hw
            .create_di_chan(task, &format!("{}/{}", st.name, st.line))?;
        self.hw.cfg_samp_clk(
            task,
            &self.routes.samp_clk,
            self.samp_rate,
            SampleMode::Continuous,
            self.block_frames * EVENT_WINDOW_SAMPLES * BUFFER_BLOCKS,
        )?;
        self.hw
            .cfg_dig_edge_start_trig(task, &self.routes.start_trig)?;
        Ok(LiveTask {
            station: index,
            state: TaskState::Configured,
            task: Some(task),
            counter: None,
        })
    }

    /// The start generator plays a finite waveform once, released by the
    /// same trigger as everything else. Long trains are written in bounded
    /// chunks.
    fn configure_start_generator(
        &self,
        index: usize,
        st: &StartGenerator,
    ) -> DriverResult<LiveTask> {
        let task = self.hw.create_task("StartPulseTask")?;
        self.hw
            .create_do_chan(task, &format!("{}/{}", st.name, st.line))?;
        let waveform = start_waveform(st, self.samp_rate);
        self.hw.cfg_samp_clk(
            task,
            &self.routes.samp_clk,
            self.samp_rate,
            SampleMode::Finite,
            waveform.len(),
        )?;
        self.hw
            .cfg_dig_edge_start_trig(task, &self.routes.start_trig)?;
        self.hw.cfg_output_buffer(task, waveform.len())?;
        for (lo, hi) in ChunkCursor::new(waveform.len(), WRITE_CHUNK_SAMPLES) {
            self.hw
                .write_digital_u32(task, &waveform[lo..hi], START_WRITE_TIMEOUT)?;
        }
        Ok(LiveTask {
            station: index,
            state: TaskState::Configured,
            task: Some(task),
            counter: None,
        })
    }
}
