//! Frame driver and memory-pressure eviction.
//!
//! Responsibilities:
//! - tick the frame clock and run the per-frame texture pipeline
//! - render through a [`RenderBackend`] only when the scene changed
//! - keep GPU memory under [`StageOptions::gpu_memory_budget`] with gentle and
//!   aggressive eviction passes

mod backend;
mod driver;
mod gc;
mod options;

pub use backend::{HeadlessRenderer, QuadInstance, RenderBackend, RenderTargetCache, RenderTargetId};
pub use driver::{FrameCtx, FrameStats, Stage, StageHooks};
pub use gc::GcReport;
pub use options::StageOptions;
