use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::device::NativeTexture;
use crate::texture::{LookupKey, TextureId};

use super::{CancelLoad, LoadError, SourceLoader};

/// Coarse load state of a [`TextureSource`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Errored,
}

pub(crate) enum SourceState {
    Unloaded,
    Loading {
        ticket: u64,
        cancel: Option<CancelLoad>,
    },
    Loaded(NativeTexture),
    Errored(LoadError),
}

/// A shared, lazily loaded texture payload.
///
/// Sources are owned by the [`TextureManager`](super::TextureManager); texture
/// descriptors bind to them by [`SourceId`](super::SourceId). Several descriptors
/// with the same lookup key share one source.
pub struct TextureSource {
    pub(crate) lookup_key: Option<LookupKey>,
    pub(crate) loader: Rc<dyn SourceLoader>,
    pub(crate) state: SourceState,

    /// Descriptors with at least one consumer that are bound to this source.
    pub(crate) textures: IndexSet<TextureId>,

    /// Descriptors bound to this source, with or without consumers.
    pub(crate) bindings: usize,

    /// Number of *used* descriptors bound to this source.
    pub(crate) active_count: usize,

    pub(crate) permanent: bool,
    pub(crate) has_alpha: bool,
}

impl TextureSource {
    pub(crate) fn new(loader: Rc<dyn SourceLoader>, lookup_key: Option<LookupKey>) -> Self {
        Self {
            lookup_key,
            loader,
            state: SourceState::Unloaded,
            textures: IndexSet::new(),
            bindings: 0,
            active_count: 0,
            permanent: false,
            has_alpha: true,
        }
    }

    pub fn load_state(&self) -> LoadState {
        match self.state {
            SourceState::Unloaded => LoadState::Unloaded,
            SourceState::Loading { .. } => LoadState::Loading,
            SourceState::Loaded(_) => LoadState::Loaded,
            SourceState::Errored(_) => LoadState::Errored,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, SourceState::Loaded(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SourceState::Loading { .. })
    }

    pub fn load_error(&self) -> Option<&LoadError> {
        match &self.state {
            SourceState::Errored(err) => Some(err),
            _ => None,
        }
    }

    pub fn native(&self) -> Option<&NativeTexture> {
        match &self.state {
            SourceState::Loaded(native) => Some(native),
            _ => None,
        }
    }

    /// Width in texels; `0` unless loaded.
    pub fn width(&self) -> u32 {
        self.native().map_or(0, NativeTexture::width)
    }

    /// Height in texels; `0` unless loaded.
    pub fn height(&self) -> u32 {
        self.native().map_or(0, NativeTexture::height)
    }

    /// Bytes currently accounted for this source.
    pub fn byte_size(&self) -> u64 {
        self.native().map_or(0, NativeTexture::byte_size)
    }

    pub fn lookup_key(&self) -> Option<&LookupKey> {
        self.lookup_key.as_ref()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Used sources (or permanent ones) are never evicted.
    pub fn is_used(&self) -> bool {
        self.permanent || self.active_count > 0
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Descriptors with consumers that are bound to this source.
    pub fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.textures.iter().copied()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings
    }

    pub(crate) fn loading_ticket(&self) -> Option<u64> {
        match self.state {
            SourceState::Loading { ticket, .. } => Some(ticket),
            _ => None,
        }
    }
}

impl fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureSource")
            .field("lookup_key", &self.lookup_key)
            .field("state", &self.load_state())
            .field("width", &self.width())
            .field("height", &self.height())
            .field("active_count", &self.active_count)
            .field("bindings", &self.bindings)
            .field("permanent", &self.permanent)
            .finish()
    }
}
