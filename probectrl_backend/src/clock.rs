//! Chassis trigger-bus routing for the shared timebase.
//!
//! The clock-master station exports three signals onto fixed backplane
//! trigger lines; every other station imports from those terminals. Terminal
//! paths are derived once from the master's name and handed to every task
//! configuration, so master and peers can never disagree on the routing.

/// The three backplane terminals carrying the master's exported signals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockRoutes {
    /// Master AI sample clock; paces peer analog and event-input tasks.
    pub samp_clk: String,
    /// Counter pulse at twice the sample rate; paces digital-output tasks.
    pub counter_clk: String,
    /// Master AI start trigger; arms every other task.
    pub start_trig: String,
}

impl ClockRoutes {
    pub fn for_master(master_name: &str) -> Self {
        Self {
            samp_clk: format!("/{}/PXI_Trig0", master_name),
            counter_clk: format!("/{}/PXI_Trig1", master_name),
            start_trig: format!("/{}/PXI_Trig2", master_name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn routes_derive_from_master_name() {
        let routes = ClockRoutes::for_master("PXI1Slot2");
        assert_eq!(routes.samp_clk, "/PXI1Slot2/PXI_Trig0");
        assert_eq!(routes.counter_clk, "/PXI1Slot2/PXI_Trig1");
        assert_eq!(routes.start_trig, "/PXI1Slot2/PXI_Trig2");
    }
}
