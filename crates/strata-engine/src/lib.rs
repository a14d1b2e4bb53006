//! Strata engine crate.
//!
//! This crate owns the texture lifecycle of a retained 2D scene: logical texture
//! descriptors, the pool of shared texture sources they resolve to, the per-frame
//! update queue, and the stage that drives frames and evicts unused sources under
//! a memory budget.

pub mod device;
pub mod error;
pub mod logging;
pub mod scene;
pub mod source;
pub mod stage;
pub mod text;
pub mod texture;
pub mod time;

pub use error::{Error, Result};
