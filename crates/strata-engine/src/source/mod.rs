//! Texture sources: the shared, lazily loaded payloads that texture descriptors
//! resolve to.
//!
//! Responsibilities:
//! - materialize sources from loaders and deduplicate them by lookup key
//! - track how many used descriptors need each source, loading on first use and
//!   cancelling in-flight loads when the last one goes away
//! - account uploaded bytes and sweep unused sources on request

mod loader;
mod manager;
mod manual;
mod texture_source;

pub use loader::{CancelLoad, LoadCompletion, LoadError, SourceLoader, SourceOptions, SourcePixels};
pub use manager::{Sweep, TextureManager};
pub use manual::ManualLoader;
pub use texture_source::{LoadState, TextureSource};

pub(crate) use loader::LoadMessage;

slotmap::new_key_type! {
    /// Handle to a [`TextureSource`] owned by a [`TextureManager`].
    pub struct SourceId;
}
