use crate::source::LoadError;
use crate::texture::TextureId;

use super::ElementId;

/// A node of the scene tree.
#[derive(Debug, Clone)]
pub struct Element {
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
    pub(crate) visible: bool,
    pub(crate) enabled: bool,
    pub(crate) active: bool,
    pub(crate) texture: Option<TextureId>,
    /// Texture whose source is loaded and currently drawn.
    pub(crate) displayed: Option<TextureId>,
    pub(crate) load_error: Option<LoadError>,
}

impl Element {
    pub(crate) fn new() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            visible: true,
            enabled: false,
            active: false,
            texture: None,
            displayed: None,
            load_error: None,
        }
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn displayed_texture(&self) -> Option<TextureId> {
        self.displayed
    }

    pub fn load_error(&self) -> Option<&LoadError> {
        self.load_error.as_ref()
    }
}
