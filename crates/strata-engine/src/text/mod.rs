//! Font registry and text rasterization for text textures.

mod font_system;
mod raster;

pub use font_system::{FontId, FontLoadError, FontSystem};
pub use raster::rasterize;
