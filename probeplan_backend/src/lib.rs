pub mod config;
pub mod frame;
pub mod roster;
pub mod station;
pub mod utils;
pub mod waveform;

pub use config::*;
pub use frame::*;
pub use roster::*;
pub use station::*;
pub use utils::*;
pub use waveform::*;
