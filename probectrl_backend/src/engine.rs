//! Acquisition engine: owns the roster, the worker thread and the frame sink.
//!
//! ## Overview
//!
//! [`Engine`] is the crate's entry point. It builds a
//! [`DeviceRoster`] from a configuration snapshot and, on
//! [`Engine::start`], moves the roster into a dedicated worker thread that
//! performs the whole run: per-station task setup, the synchronized
//! commit/start sequence, the blocking read loop producing [`SampleFrame`]s,
//! and unconditional teardown. The worker exclusively owns the hardware for
//! the duration of the run; the engine keeps only a cancellation flag and
//! the join handle, and gets the roster back when the worker finishes.
//!
//! ## Error policy
//!
//! Any driver failure aborts the run: every live task is stopped and
//! cleared, and the error surfaces from [`Engine::wait`] naming the station
//! that failed. There is no retry or partial-degradation path; a chassis
//! where one station misbehaves produces no data rather than unsynchronized
//! data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, SendTimeoutError, Sender};
use log::{info, warn};
use thiserror::Error;

use probeplan_backend::config::SystemConfig;
use probeplan_backend::frame::{EventEncoder, SampleFrame, SampleInterleaver};
use probeplan_backend::station::Station;
use probeplan_backend::{DeviceRoster, EVENT_WINDOW_SAMPLES, FIRST_FRAME_INDEX};

use crate::clock::ClockRoutes;
use crate::hardware::{DriverError, HardwareSurface, TaskHandle};
use crate::task::{
    LiveTask, TaskFactory, ANALOG_READ_TIMEOUT, EVENT_READ_TIMEOUT,
};

/// Frames per raw hardware block.
pub const DEFAULT_BLOCK_FRAMES: usize = 3200;
/// Bounded frame-channel capacity.
pub const DEFAULT_SINK_DEPTH: usize = 4096;

/// How long a blocked frame send waits before rechecking cancellation.
const SINK_POLL: Duration = Duration::from_millis(50);

/// A failed acquisition run, attributed to the station that caused it.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to set up station {station}")]
    Setup {
        station: String,
        #[source]
        source: DriverError,
    },
    #[error("failed to start station {station}")]
    Start {
        station: String,
        #[source]
        source: DriverError,
    },
    #[error("acquisition failed on station {station}")]
    Acquisition {
        station: String,
        #[source]
        source: DriverError,
    },
    #[error("an acquisition run is already in progress")]
    AlreadyRunning,
    #[error("the acquisition worker terminated abnormally")]
    WorkerLost,
}

/// Synchronized multi-station acquisition engine.
pub struct Engine {
    hw: Arc<dyn HardwareSurface>,
    roster: Option<DeviceRoster>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<(DeviceRoster, Result<(), StreamError>)>>,
    block_frames: usize,
    sink_depth: usize,
}

impl Engine {
    pub fn new(cfg: &SystemConfig, hw: Arc<dyn HardwareSurface>) -> Self {
        Self {
            hw,
            roster: Some(DeviceRoster::from_config(cfg)),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            block_frames: DEFAULT_BLOCK_FRAMES,
            sink_depth: DEFAULT_SINK_DEPTH,
        }
    }

    /// The roster; `None` while a run is in progress (the worker owns it).
    pub fn roster(&self) -> Option<&DeviceRoster> {
        self.roster.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Frames per raw block. Smaller blocks lower latency, larger blocks
    /// lower per-read overhead. Takes effect on the next start.
    pub fn set_block_frames(&mut self, block_frames: usize) {
        self.block_frames = block_frames.max(1);
    }

    pub fn set_sink_depth(&mut self, sink_depth: usize) {
        self.sink_depth = sink_depth.max(1);
    }

    /// Launches the acquisition worker and returns the frame source.
    ///
    /// Frames arrive in index order with no gaps. Dropping the receiver is
    /// equivalent to requesting a stop.
    pub fn start(&mut self) -> Result<Receiver<SampleFrame>, StreamError> {
        if self.worker.is_some() {
            return Err(StreamError::AlreadyRunning);
        }
        let roster = self.roster.take().ok_or(StreamError::AlreadyRunning)?;
        self.cancel.store(false, Ordering::Relaxed);

        let (sink, source) = bounded(self.sink_depth);
        let hw = Arc::clone(&self.hw);
        let cancel = Arc::clone(&self.cancel);
        let block_frames = self.block_frames;
        self.worker = Some(thread::spawn(move || {
            run_acquisition(roster, hw, cancel, sink, block_frames)
        }));
        Ok(source)
    }

    /// Signals the worker to finish its current block and tear down. Returns
    /// immediately; pair with [`Engine::wait`] to observe the outcome.
    pub fn request_stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Joins the worker and reports how the run ended. A run that was only
    /// cancelled (or never started) is `Ok`.
    pub fn wait(&mut self) -> Result<(), StreamError> {
        match self.worker.take() {
            Some(handle) => match handle.join() {
                Ok((roster, result)) => {
                    self.roster = Some(roster);
                    result
                }
                Err(_) => Err(StreamError::WorkerLost),
            },
            None => Ok(()),
        }
    }

    pub fn stop(&mut self) -> Result<(), StreamError> {
        self.request_stop();
        self.wait()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.request_stop();
        let _ = self.wait();
    }
}

fn role_rank(station: &Station) -> usize {
    match station {
        Station::Analog(_) => 0,
        Station::DigitalOutput(_) => 1,
        Station::EventInput(_) => 2,
        Station::Start(_) => 3,
    }
}

fn teardown(tasks: &mut [LiveTask], hw: &dyn HardwareSurface) {
    for live in tasks.iter_mut() {
        live.stop(hw);
    }
}

/// The whole run, executed on the worker thread. Owns the roster and every
/// hardware handle until it returns.
fn run_acquisition(
    roster: DeviceRoster,
    hw: Arc<dyn HardwareSurface>,
    cancel: Arc<AtomicBool>,
    sink: Sender<SampleFrame>,
    block_frames: usize,
) -> (DeviceRoster, Result<(), StreamError>) {
    let (Some(samp_rate), Some(master_index)) = (roster.sample_rate(), roster.master_index())
    else {
        warn!("no analog stations configured, nothing to acquire");
        return (roster, Ok(()));
    };
    let master_name = roster.stations()[master_index].name();
    info!(
        "starting acquisition: {} stations, master {}, {} S/s",
        roster.stations().len(),
        master_name,
        samp_rate
    );
    let routes = ClockRoutes::for_master(master_name);

    // Setup pass. The master goes first so its exported terminals exist
    // before any peer binds to them.
    let factory = TaskFactory::new(hw.as_ref(), routes, &roster, samp_rate, block_frames);
    let mut tasks: Vec<LiveTask> = Vec::new();
    let mut setup_order = vec![master_index];
    setup_order.extend((0..roster.stations().len()).filter(|&i| i != master_index));
    for i in setup_order {
        match factory.configure(i, &roster.stations()[i]) {
            Ok(live) => tasks.push(live),
            Err(source) => {
                let station = roster.stations()[i].name().to_string();
                teardown(&mut tasks, hw.as_ref());
                return (roster, Err(StreamError::Setup { station, source }));
            }
        }
    }

    // Commit pass: every station reserves its resources before any of them
    // starts, so a doomed run fails before the first trigger. Analog first,
    // then rows, events and the start generator.
    let mut commit_order: Vec<usize> = (0..tasks.len()).collect();
    commit_order.sort_by_key(|&t| role_rank(&roster.stations()[tasks[t].station]));
    for t in commit_order {
        if let Err(source) = tasks[t].commit(hw.as_ref()) {
            let station = roster.stations()[tasks[t].station].name().to_string();
            teardown(&mut tasks, hw.as_ref());
            return (roster, Err(StreamError::Setup { station, source }));
        }
    }

    // Start pass: every triggered task arms first, the master's primary task
    // goes last because starting it fires the shared start trigger.
    let is_analog = |t: usize| matches!(roster.stations()[tasks[t].station], Station::Analog(_));
    let mut start_order: Vec<usize> = (1..tasks.len()).filter(|&t| !is_analog(t)).collect();
    start_order.extend((1..tasks.len()).filter(|&t| is_analog(t)));
    start_order.push(0);
    for t in start_order {
        if let Err(source) = tasks[t].start(hw.as_ref()) {
            let station = roster.stations()[tasks[t].station].name().to_string();
            teardown(&mut tasks, hw.as_ref());
            return (roster, Err(StreamError::Start { station, source }));
        }
    }

    let result = stream_frames(
        &roster, &tasks, hw.as_ref(), &cancel, &sink, block_frames, samp_rate,
    );
    teardown(&mut tasks, hw.as_ref());
    match &result {
        Ok(()) => info!("acquisition finished"),
        Err(e) => warn!("acquisition aborted: {}", e),
    }
    (roster, result)
}

/// The blocking read loop: one analog block per analog station and one event
/// window block per event line, sliced into frames and pushed to the sink.
fn stream_frames(
    roster: &DeviceRoster,
    tasks: &[LiveTask],
    hw: &dyn HardwareSurface,
    cancel: &AtomicBool,
    sink: &Sender<SampleFrame>,
    block_frames: usize,
    samp_rate: f64,
) -> Result<(), StreamError> {
    let interleaver = SampleInterleaver::new(roster);
    let mut encoder = EventEncoder::new(roster);
    let rows_per_frame = roster.rows_per_frame();
    let block_rows = block_frames * rows_per_frame;

    // Read order matches the interleaver's station order: the master is the
    // first analog station and was configured first.
    let analog: Vec<(TaskHandle, usize, String)> = tasks
        .iter()
        .filter_map(|live| match &roster.stations()[live.station] {
            Station::Analog(st) => live.handle().map(|h| (h, st.num_lines(), st.name.clone())),
            _ => None,
        })
        .collect();
    let events: Vec<(TaskHandle, String)> = tasks
        .iter()
        .filter_map(|live| match &roster.stations()[live.station] {
            Station::EventInput(st) => live.handle().map(|h| (h, st.name.clone())),
            _ => None,
        })
        .collect();

    let mut index = FIRST_FRAME_INDEX;
    'run: loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        let mut blocks = Vec::with_capacity(analog.len());
        for (handle, lines, name) in &analog {
            match hw.read_analog_f64(*handle, *lines, block_rows, ANALOG_READ_TIMEOUT) {
                Ok(block) => blocks.push(block),
                Err(source) => {
                    return Err(StreamError::Acquisition {
                        station: name.clone(),
                        source,
                    })
                }
            }
        }
        let mut windows = Vec::with_capacity(events.len());
        for (handle, name) in &events {
            match hw.read_digital_u32(
                *handle,
                block_frames * EVENT_WINDOW_SAMPLES,
                EVENT_READ_TIMEOUT,
            ) {
                Ok(window) => windows.push(window),
                Err(source) => {
                    return Err(StreamError::Acquisition {
                        station: name.clone(),
                        source,
                    })
                }
            }
        }

        encoder.reset_warnings();
        for frame in 0..block_frames {
            let mut row = vec![0.0; interleaver.row_width()];
            interleaver.interleave(frame, &blocks, &mut row);
            let event_mask = encoder.encode(frame, &windows);
            let mut pending = SampleFrame {
                index,
                row,
                event_mask,
                timestamp: (index - FIRST_FRAME_INDEX) as f64 * rows_per_frame as f64
                    / samp_rate,
            };
            // A full sink must not wedge teardown; keep rechecking
            // cancellation while the consumer catches up.
            loop {
                match sink.send_timeout(pending, SINK_POLL) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(frame_back)) => {
                        if cancel.load(Ordering::Relaxed) {
                            break 'run;
                        }
                        pending = frame_back;
                    }
                    // Receiver dropped: the consumer is gone, stop cleanly
                    Err(SendTimeoutError::Disconnected(_)) => break 'run,
                }
            }
            index += 1;
        }
    }
    Ok(())
}
