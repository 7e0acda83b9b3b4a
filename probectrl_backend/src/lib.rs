//! Streaming companion to `probeplan_backend`: binds a planned device roster
//! to real (or mock) DAQ hardware and runs synchronized multi-station
//! acquisition.
//!
//! ## Layout
//!
//! - [`hardware`] defines the driver-call trait the rest of the crate is
//!   written against.
//! - [`mock`] is the in-memory driver used by tests and the demo binary.
//! - [`clock`] derives the backplane terminal routing from the clock master.
//! - [`task`] configures per-station driver tasks and tracks their lifecycle.
//! - [`engine`] owns the worker thread and streams [`SampleFrame`]s.
//!
//! [`SampleFrame`]: probeplan_backend::frame::SampleFrame

pub mod clock;
pub mod engine;
pub mod hardware;
pub mod mock;
pub mod task;

pub use clock::*;
pub use engine::*;
pub use hardware::*;
pub use mock::*;
pub use task::*;
