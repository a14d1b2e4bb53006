use crate::scene::ElementId;
use crate::source::LoadError;

use super::TextureId;

/// Notification for one consumer of a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureEvent {
    pub element: ElementId,
    pub texture: TextureId,
    pub kind: TextureEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextureEventKind {
    /// The bound source is loaded; the element may display the texture.
    Loaded,
    /// The bound source failed to load.
    LoadError(LoadError),
    /// No source could be produced from the texture's parameters.
    Cleared,
    /// Only relevant to elements currently displaying the texture.
    ClippingChanged,
    /// Only relevant to elements currently displaying the texture.
    PrecisionChanged,
}
