use std::collections::HashSet;

use indexmap::IndexSet;

use super::TextureId;

/// Textures waiting for their source to be regenerated.
///
/// Enqueueing is idempotent and keeps first-enqueue order. The queue also
/// remembers which textures were resolved during the current frame, so a texture
/// that changes again after its resolution is carried over to the next frame
/// instead of being resolved twice.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    pending: IndexSet<TextureId>,
    resolved: HashSet<TextureId>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the texture was already queued.
    pub fn enqueue(&mut self, id: TextureId) -> bool {
        self.pending.insert(id)
    }

    pub fn dequeue(&mut self, id: TextureId) -> bool {
        self.pending.shift_remove(&id)
    }

    pub fn is_queued(&self, id: TextureId) -> bool {
        self.pending.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Empties the queue, returning its contents in enqueue order.
    pub fn take(&mut self) -> Vec<TextureId> {
        self.pending.drain(..).collect()
    }

    pub fn begin_frame(&mut self) {
        self.resolved.clear();
    }

    pub fn mark_resolved(&mut self, id: TextureId) {
        self.resolved.insert(id);
    }

    pub fn resolved_this_frame(&self, id: TextureId) -> bool {
        self.resolved.contains(&id)
    }

    pub(crate) fn forget(&mut self, id: TextureId) {
        self.pending.shift_remove(&id);
        self.resolved.remove(&id);
    }
}
