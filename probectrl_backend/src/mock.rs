//! In-memory [`HardwareSurface`] for tests and the demo binary.
//!
//! The mock records every driver call in order, mints ascending task handles
//! and synthesizes read data on demand. Tests drive the full engine against
//! it and then assert on the recorded call sequence, which is where all the
//! ordering guarantees of the setup and teardown paths live.

use indexmap::IndexMap;
use ndarray::Array2;
use parking_lot::Mutex;

use crate::hardware::*;

/// One recorded driver call. Variants keep just the arguments the ordering
/// assertions care about.
#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    CreateTask { task: TaskHandle, name: String },
    CreateChan { task: TaskHandle, physical: String },
    CfgSampClk { task: TaskHandle, src: String, rate: f64, mode: SampleMode },
    CfgImplicitTiming { task: TaskHandle },
    CfgStartTrig { task: TaskHandle, src: String },
    ExportSignal { task: TaskHandle, signal: ExportedSignal, terminal: String },
    SetAllowRegen { task: TaskHandle },
    CfgOutputBuffer { task: TaskHandle, size: usize },
    WriteDigital { task: TaskHandle, nsamps: usize },
    ReadAnalog { task: TaskHandle },
    ReadDigital { task: TaskHandle },
    Commit { task: TaskHandle },
    Start { task: TaskHandle },
    Stop { task: TaskHandle },
    Clear { task: TaskHandle },
}

/// What analog reads return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalogPattern {
    /// All zeros.
    Zero,
    /// Every sample of a channel equals the channel's global creation
    /// ordinal, making the interleaved layout observable end to end.
    ChannelOrdinal,
}

#[derive(Debug)]
struct MockTask {
    name: String,
    ai_ordinals: Vec<u64>,
    cleared: bool,
}

#[derive(Debug)]
struct MockState {
    next_handle: u64,
    next_ordinal: u64,
    tasks: IndexMap<TaskHandle, MockTask>,
    calls: Vec<MockCall>,
    analog_pattern: AnalogPattern,
    digital_fill: u32,
    fail_on: Option<&'static str>,
}

/// Scriptable in-memory driver.
pub struct MockSurface {
    state: Mutex<MockState>,
}

impl Default for MockSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSurface {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_handle: 1,
                next_ordinal: 0,
                tasks: IndexMap::new(),
                calls: Vec::new(),
                analog_pattern: AnalogPattern::Zero,
                digital_fill: 0,
                fail_on: None,
            }),
        }
    }

    /// Snapshot of all calls recorded so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn task_name(&self, task: TaskHandle) -> Option<String> {
        self.state.lock().tasks.get(&task).map(|t| t.name.clone())
    }

    pub fn set_analog_pattern(&self, pattern: AnalogPattern) {
        self.state.lock().analog_pattern = pattern;
    }

    /// Value returned for every digital input sample.
    pub fn set_digital_fill(&self, value: u32) {
        self.state.lock().digital_fill = value;
    }

    /// Arms a one-shot failure: the next driver call whose name matches
    /// fails, subsequent calls succeed again.
    pub fn fail_on(&self, call: &'static str) {
        self.state.lock().fail_on = Some(call);
    }
}

impl MockState {
    fn enter(&mut self, call: &'static str) -> DriverResult<()> {
        if self.fail_on == Some(call) {
            self.fail_on = None;
            return Err(DriverError::Call {
                call,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn live_task(&mut self, task: TaskHandle) -> DriverResult<&mut MockTask> {
        match self.tasks.get_mut(&task) {
            Some(t) if !t.cleared => Ok(t),
            _ => Err(DriverError::InvalidHandle),
        }
    }
}

impl HardwareSurface for MockSurface {
    fn create_task(&self, name: &str) -> DriverResult<TaskHandle> {
        let mut st = self.state.lock();
        st.enter("create_task")?;
        let task = TaskHandle(st.next_handle);
        st.next_handle += 1;
        st.tasks.insert(
            task,
            MockTask {
                name: name.to_string(),
                ai_ordinals: Vec::new(),
                cleared: false,
            },
        );
        st.calls.push(MockCall::CreateTask {
            task,
            name: name.to_string(),
        });
        Ok(task)
    }

    fn create_ai_voltage_chan(
        &self,
        task: TaskHandle,
        physical: &str,
        _v_min: f64,
        _v_max: f64,
    ) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("create_ai_voltage_chan")?;
        let ordinal = st.next_ordinal;
        st.next_ordinal += 1;
        st.live_task(task)?.ai_ordinals.push(ordinal);
        st.calls.push(MockCall::CreateChan {
            task,
            physical: physical.to_string(),
        });
        Ok(())
    }

    fn create_di_chan(&self, task: TaskHandle, physical: &str) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("create_di_chan")?;
        st.live_task(task)?;
        st.calls.push(MockCall::CreateChan {
            task,
            physical: physical.to_string(),
        });
        Ok(())
    }

    fn create_do_chan(&self, task: TaskHandle, physical: &str) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("create_do_chan")?;
        st.live_task(task)?;
        st.calls.push(MockCall::CreateChan {
            task,
            physical: physical.to_string(),
        });
        Ok(())
    }

    fn create_co_pulse_chan(
        &self,
        task: TaskHandle,
        counter: &str,
        _idle_delay: f64,
        _freq: f64,
        _duty_cycle: f64,
    ) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("create_co_pulse_chan")?;
        st.live_task(task)?;
        st.calls.push(MockCall::CreateChan {
            task,
            physical: counter.to_string(),
        });
        Ok(())
    }

    fn cfg_samp_clk(
        &self,
        task: TaskHandle,
        src: &str,
        rate: f64,
        mode: SampleMode,
        _buf_size: usize,
    ) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("cfg_samp_clk")?;
        st.live_task(task)?;
        st.calls.push(MockCall::CfgSampClk {
            task,
            src: src.to_string(),
            rate,
            mode,
        });
        Ok(())
    }

    fn cfg_implicit_timing(
        &self,
        task: TaskHandle,
        _mode: SampleMode,
        _buf_size: usize,
    ) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("cfg_implicit_timing")?;
        st.live_task(task)?;
        st.calls.push(MockCall::CfgImplicitTiming { task });
        Ok(())
    }

    fn cfg_dig_edge_start_trig(&self, task: TaskHandle, src: &str) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("cfg_dig_edge_start_trig")?;
        st.live_task(task)?;
        st.calls.push(MockCall::CfgStartTrig {
            task,
            src: src.to_string(),
        });
        Ok(())
    }

    fn export_signal(
        &self,
        task: TaskHandle,
        signal: ExportedSignal,
        terminal: &str,
    ) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("export_signal")?;
        st.live_task(task)?;
        st.calls.push(MockCall::ExportSignal {
            task,
            signal,
            terminal: terminal.to_string(),
        });
        Ok(())
    }

    fn set_allow_regen(&self, task: TaskHandle, _allow: bool) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("set_allow_regen")?;
        st.live_task(task)?;
        st.calls.push(MockCall::SetAllowRegen { task });
        Ok(())
    }

    fn cfg_output_buffer(&self, task: TaskHandle, size: usize) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("cfg_output_buffer")?;
        st.live_task(task)?;
        st.calls.push(MockCall::CfgOutputBuffer { task, size });
        Ok(())
    }

    fn write_digital_u32(
        &self,
        task: TaskHandle,
        samples: &[u32],
        _timeout: f64,
    ) -> DriverResult<usize> {
        let mut st = self.state.lock();
        st.enter("write_digital_u32")?;
        st.live_task(task)?;
        st.calls.push(MockCall::WriteDigital {
            task,
            nsamps: samples.len(),
        });
        Ok(samples.len())
    }

    fn read_analog_f64(
        &self,
        task: TaskHandle,
        num_chans: usize,
        samps_per_chan: usize,
        _timeout: f64,
    ) -> DriverResult<Array2<f64>> {
        let mut st = self.state.lock();
        st.enter("read_analog_f64")?;
        let ordinals = st.live_task(task)?.ai_ordinals.clone();
        st.calls.push(MockCall::ReadAnalog { task });
        let pattern = st.analog_pattern;
        Ok(Array2::from_shape_fn(
            (num_chans, samps_per_chan),
            |(chan, _)| match pattern {
                AnalogPattern::Zero => 0.0,
                AnalogPattern::ChannelOrdinal => {
                    ordinals.get(chan).copied().unwrap_or(0) as f64
                }
            },
        ))
    }

    fn read_digital_u32(
        &self,
        task: TaskHandle,
        samps_per_chan: usize,
        _timeout: f64,
    ) -> DriverResult<Vec<u32>> {
        let mut st = self.state.lock();
        st.enter("read_digital_u32")?;
        st.live_task(task)?;
        st.calls.push(MockCall::ReadDigital { task });
        Ok(vec![st.digital_fill; samps_per_chan])
    }

    fn commit(&self, task: TaskHandle) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("commit")?;
        st.live_task(task)?;
        st.calls.push(MockCall::Commit { task });
        Ok(())
    }

    fn start(&self, task: TaskHandle) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("start")?;
        st.live_task(task)?;
        st.calls.push(MockCall::Start { task });
        Ok(())
    }

    fn stop(&self, task: TaskHandle) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("stop")?;
        st.live_task(task)?;
        st.calls.push(MockCall::Stop { task });
        Ok(())
    }

    fn clear(&self, task: TaskHandle) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.enter("clear")?;
        let t = st.live_task(task)?;
        t.cleared = true;
        st.calls.push(MockCall::Clear { task });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handles_ascend_and_names_are_kept() {
        let hw = MockSurface::new();
        let a = hw.create_task("AITask_PXI1Slot2").unwrap();
        let b = hw.create_task("DITask_PXI1Slot4").unwrap();
        assert!(a.0 < b.0);
        assert_eq!(hw.task_name(a).as_deref(), Some("AITask_PXI1Slot2"));
    }

    #[test]
    fn cleared_handle_is_rejected() {
        let hw = MockSurface::new();
        let task = hw.create_task("t").unwrap();
        hw.clear(task).unwrap();
        assert!(matches!(hw.start(task), Err(DriverError::InvalidHandle)));
        assert!(matches!(hw.clear(task), Err(DriverError::InvalidHandle)));
    }

    #[test]
    fn injected_failure_is_one_shot() {
        let hw = MockSurface::new();
        let task = hw.create_task("t").unwrap();
        hw.fail_on("commit");
        assert!(hw.commit(task).is_err());
        assert!(hw.commit(task).is_ok());
    }

    #[test]
    fn channel_ordinal_pattern_tracks_creation_order() {
        let hw = MockSurface::new();
        hw.set_analog_pattern(AnalogPattern::ChannelOrdinal);
        let first = hw.create_task("a").unwrap();
        hw.create_ai_voltage_chan(first, "PXI1Slot2/ai0", -10.0, 10.0)
            .unwrap();
        hw.create_ai_voltage_chan(first, "PXI1Slot2/ai1", -10.0, 10.0)
            .unwrap();
        let second = hw.create_task("b").unwrap();
        hw.create_ai_voltage_chan(second, "PXI1Slot3/ai0", -10.0, 10.0)
            .unwrap();

        let block = hw.read_analog_f64(second, 1, 4, 5.0).unwrap();
        assert!(block.iter().all(|&v| v == 2.0));
        let block = hw.read_analog_f64(first, 2, 4, 5.0).unwrap();
        assert_eq!(block[(0, 0)], 0.0);
        assert_eq!(block[(1, 3)], 1.0);
    }
}
