//! Time subsystem.
//!
//! - [`Clock`] supplies timestamps; [`SystemClock`] for real loops, [`ManualClock`]
//!   for deterministic tests and offline drivers.
//! - [`FrameClock`] turns timestamps into per-frame [`FrameTime`] snapshots and
//!   applies the fixed-timestep override.

mod clock;
mod frame_clock;

pub use clock::{Clock, ManualClock, SystemClock};
pub use frame_clock::{FrameClock, FrameTime, FIRST_FRAME_DT};
