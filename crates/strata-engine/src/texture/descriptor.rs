use indexmap::IndexMap;

use crate::scene::ElementId;
use crate::source::SourceId;

use super::{ClipRect, TextureKind};

/// Logical texture descriptor.
///
/// Holds the parameters that produce a source plus the bookkeeping that ties it
/// to its consumers. Mutated only through [`TextureContext`](super::TextureContext).
#[derive(Debug)]
pub struct Texture {
    pub(crate) kind: TextureKind,
    /// Consumers and their active flag.
    pub(crate) consumers: IndexMap<ElementId, bool>,
    pub(crate) active_count: usize,
    pub(crate) source: Option<SourceId>,
    pub(crate) clip: ClipRect,
    pub(crate) pixel_ratio: f32,
    pub(crate) clipping: bool,
    /// The bound source is stale.
    pub(crate) must_update: bool,
    pub(crate) max_width: f32,
    pub(crate) max_height: f32,
    pub(crate) resolutions: u64,
}

impl Texture {
    pub(crate) fn new(kind: TextureKind) -> Self {
        Self {
            kind,
            consumers: IndexMap::new(),
            active_count: 0,
            source: None,
            clip: ClipRect::NONE,
            pixel_ratio: 1.0,
            clipping: false,
            must_update: true,
            max_width: 0.0,
            max_height: 0.0,
            resolutions: 0,
        }
    }

    pub fn kind(&self) -> &TextureKind {
        &self.kind
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn is_used(&self) -> bool {
        self.active_count > 0
    }

    pub fn must_update(&self) -> bool {
        self.must_update
    }

    pub fn consumers(&self) -> impl Iterator<Item = (ElementId, bool)> + '_ {
        self.consumers.iter().map(|(el, active)| (*el, *active))
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn clip(&self) -> ClipRect {
        self.clip
    }

    pub fn has_clipping(&self) -> bool {
        self.clipping
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn x(&self) -> f32 {
        self.clip.x
    }

    pub fn y(&self) -> f32 {
        self.clip.y
    }

    pub fn w(&self) -> f32 {
        self.clip.w
    }

    pub fn h(&self) -> f32 {
        self.clip.h
    }

    // Precision coordinates: the clip rectangle in source texels.

    pub fn px(&self) -> f32 {
        self.clip.x * self.pixel_ratio
    }

    pub fn py(&self) -> f32 {
        self.clip.y * self.pixel_ratio
    }

    pub fn pw(&self) -> f32 {
        self.clip.w * self.pixel_ratio
    }

    pub fn ph(&self) -> f32 {
        self.clip.h * self.pixel_ratio
    }

    /// Expected maximum source width, for bounds checks before loading. `0` if unknown.
    pub fn mw(&self) -> f32 {
        self.max_width
    }

    /// Expected maximum source height. `0` if unknown.
    pub fn mh(&self) -> f32 {
        self.max_height
    }

    /// Number of times a source was resolved for this texture.
    pub fn resolutions(&self) -> u64 {
        self.resolutions
    }
}
