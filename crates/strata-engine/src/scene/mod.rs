//! Minimal retained element tree consuming textures.
//!
//! An element is *enabled* while it is attached under the root, and *active*
//! while it is enabled and it and all its ancestors are visible. Enabled elements
//! are consumers of their texture; the active flag is what keeps a texture used.

mod element;
mod tree;

pub use element::Element;
pub use tree::SceneTree;

slotmap::new_key_type! {
    /// Handle to an [`Element`] owned by a [`SceneTree`].
    pub struct ElementId;
}
