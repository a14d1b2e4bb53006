use crate::scene::ElementId;
use crate::texture::TextureId;

/// Errors raised by texture, scene and stage operations.
///
/// Load failures are not represented here: they are data carried by an errored
/// source (see [`crate::source::LoadError`]) and never abort a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("unknown element {0:?}")]
    UnknownElement(ElementId),

    /// The texture has no loader for its kind. This is a configuration error and
    /// is never retried.
    #[error("texture {0:?} has no source loader")]
    MissingLoader(TextureId),

    #[error("texture {texture:?} is still referenced by {consumers} element(s)")]
    TextureInUse { texture: TextureId, consumers: usize },

    #[error("element {element:?} is not a consumer of texture {texture:?}")]
    NotAConsumer { texture: TextureId, element: ElementId },

    #[error("cannot attach {child:?} under {parent:?}")]
    InvalidHierarchy { parent: ElementId, child: ElementId },

    #[error("stage has been destroyed")]
    Destroyed,
}

pub type Result<T> = std::result::Result<T, Error>;
