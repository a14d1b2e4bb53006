//! Texture descriptors and their per-frame update queue.
//!
//! A [`Texture`] describes *how* to produce pixels (its [`TextureKind`], clip
//! rectangle and precision). The [`TextureContext`] binds each descriptor to a
//! shared [`TextureSource`](crate::source::TextureSource), tracks which scene
//! elements consume it and coalesces regeneration requests to once per frame.

mod clip;
mod context;
mod descriptor;
mod event;
mod key;
mod kind;
mod queue;

pub use clip::ClipRect;
pub use context::TextureContext;
pub use descriptor::Texture;
pub use event::{TextureEvent, TextureEventKind};
pub use key::{KeyValue, LookupKey};
pub use kind::{ImageTexture, StaticTexture, TextSettings, TextureKind};
pub use queue::UpdateQueue;

slotmap::new_key_type! {
    /// Handle to a [`Texture`] owned by a [`TextureContext`].
    pub struct TextureId;
}
