use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use crossbeam_channel::{Receiver, Sender};
use slotmap::SlotMap;

use crate::device::TextureUploader;
use crate::texture::{LookupKey, TextureId};

use super::texture_source::SourceState;
use super::{LoadCompletion, LoadError, LoadMessage, SourceId, SourceLoader, TextureSource};

/// Result of a sweep over unused sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Freed sources, in sweep order (ascending [`SourceId`]).
    pub freed: Vec<SourceId>,
    pub freed_bytes: u64,
}

/// Pool of texture sources for one stage.
///
/// The manager is the only writer of source active counts; descriptors request
/// increments and decrements through it. It guarantees at most one live source
/// per lookup key.
pub struct TextureManager {
    sources: SlotMap<SourceId, TextureSource>,
    lookup: HashMap<LookupKey, SourceId>,
    used_memory: u64,
    next_ticket: u64,
    tx: Sender<LoadMessage>,
    rx: Receiver<LoadMessage>,
    uploader: Box<dyn TextureUploader>,
}

impl TextureManager {
    pub fn new(uploader: Box<dyn TextureUploader>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            sources: SlotMap::with_key(),
            lookup: HashMap::new(),
            used_memory: 0,
            next_ticket: 1,
            tx,
            rx,
            uploader,
        }
    }

    pub fn source(&self, id: SourceId) -> Option<&TextureSource> {
        self.sources.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &TextureSource)> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Bytes held by loaded sources.
    pub fn used_memory(&self) -> u64 {
        self.used_memory
    }

    /// Returns the live source registered for `key`, if any.
    pub fn find_reusable(&self, key: &LookupKey) -> Option<SourceId> {
        self.lookup.get(key).copied()
    }

    /// Returns the source for `key`, creating an unloaded one from `loader` if the
    /// key is unknown. Keyless requests always create a new source.
    pub fn materialize(&mut self, loader: Rc<dyn SourceLoader>, key: Option<LookupKey>) -> SourceId {
        if let Some(existing) = key.as_ref().and_then(|k| self.find_reusable(k)) {
            return existing;
        }

        let id = self.sources.insert(TextureSource::new(loader, key.clone()));
        match key {
            Some(key) => {
                log::debug!("source {id:?} materialized for {key}");
                self.lookup.insert(key, id);
            }
            None => log::debug!("source {id:?} materialized (not reusable)"),
        }
        id
    }

    // ── bindings ──────────────────────────────────────────────────────────

    pub(crate) fn bind(&mut self, id: SourceId) {
        if let Some(source) = self.sources.get_mut(id) {
            source.bindings += 1;
        }
    }

    pub(crate) fn unbind(&mut self, id: SourceId) {
        let Some(source) = self.sources.get_mut(id) else {
            return;
        };
        debug_assert!(source.bindings > 0, "unbinding a source with no bindings");
        source.bindings = source.bindings.saturating_sub(1);
        if source.bindings == 0 {
            self.drop_if_unreachable(id);
        }
    }

    pub(crate) fn add_texture(&mut self, id: SourceId, texture: TextureId) {
        if let Some(source) = self.sources.get_mut(id) {
            source.textures.insert(texture);
        }
    }

    pub(crate) fn remove_texture(&mut self, id: SourceId, texture: TextureId) {
        if let Some(source) = self.sources.get_mut(id) {
            source.textures.shift_remove(&texture);
        }
    }

    /// Drops a source nobody is bound to, unless it stays reusable through the
    /// lookup map with a loaded payload.
    fn drop_if_unreachable(&mut self, id: SourceId) {
        let Some(source) = self.sources.get(id) else {
            return;
        };
        if source.bindings > 0 || source.is_used() {
            return;
        }
        let reusable = source
            .lookup_key
            .as_ref()
            .is_some_and(|key| self.lookup.get(key) == Some(&id));
        if reusable && source.is_loaded() {
            return;
        }
        self.remove_source(id);
    }

    fn remove_source(&mut self, id: SourceId) {
        let Some(mut source) = self.sources.remove(id) else {
            return;
        };
        if let Some(key) = &source.lookup_key {
            if self.lookup.get(key) == Some(&id) {
                self.lookup.remove(key);
            }
        }
        match mem::replace(&mut source.state, SourceState::Unloaded) {
            SourceState::Loaded(native) => {
                self.used_memory = self.used_memory.saturating_sub(native.byte_size());
                self.uploader.release(native);
            }
            SourceState::Loading { cancel, .. } => {
                if let Some(cancel) = cancel {
                    cancel();
                }
            }
            _ => {}
        }
        log::debug!("source {id:?} dropped");
    }

    // ── active counts ─────────────────────────────────────────────────────

    pub(crate) fn inc_active(&mut self, id: SourceId) {
        let Some(source) = self.sources.get_mut(id) else {
            return;
        };
        source.active_count += 1;
        if source.active_count == 1 {
            self.becomes_used(id);
        }
    }

    pub(crate) fn dec_active(&mut self, id: SourceId) {
        let Some(source) = self.sources.get_mut(id) else {
            return;
        };
        debug_assert!(source.active_count > 0, "active count underflow on {id:?}");
        source.active_count = source.active_count.saturating_sub(1);
        if source.active_count == 0 && cancel_load(source) {
            log::debug!("source {id:?} became unused while loading; load cancelled");
        }
    }

    fn becomes_used(&mut self, id: SourceId) {
        let Some(source) = self.sources.get(id) else {
            return;
        };

        // A source that was swept out of the lookup map and is being brought back
        // reclaims its key, unless another source took it over meanwhile.
        if let Some(key) = &source.lookup_key {
            if !self.lookup.contains_key(key) {
                self.lookup.insert(key.clone(), id);
            }
        }

        if !source.is_loaded() && !source.is_loading() {
            self.start_load(id);
        }
    }

    // ── loading ───────────────────────────────────────────────────────────

    /// Starts loading the source now, even if no used descriptor needs it.
    pub fn load(&mut self, id: SourceId) {
        if let Some(source) = self.sources.get(id) {
            if !source.is_loaded() && !source.is_loading() {
                self.start_load(id);
            }
        }
    }

    fn start_load(&mut self, id: SourceId) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let Some(source) = self.sources.get_mut(id) else {
            return;
        };
        source.state = SourceState::Loading {
            ticket,
            cancel: None,
        };
        let loader = Rc::clone(&source.loader);

        log::debug!("source {id:?} loading (ticket {ticket})");
        let cancel = loader.load(LoadCompletion::new(id, ticket, self.tx.clone()));

        if let Some(source) = self.sources.get_mut(id) {
            if let SourceState::Loading {
                ticket: current,
                cancel: slot,
            } = &mut source.state
            {
                if *current == ticket {
                    *slot = cancel;
                }
            }
        }
    }

    /// Applies completed loads. Returns the sources whose state changed, in
    /// completion order.
    pub(crate) fn pump_loads(&mut self) -> Vec<SourceId> {
        let mut changed = Vec::new();

        while let Ok(msg) = self.rx.try_recv() {
            let Some(source) = self.sources.get_mut(msg.source) else {
                log::debug!("completion for dropped source {:?} ignored", msg.source);
                continue;
            };
            if source.loading_ticket() != Some(msg.ticket) {
                log::debug!("stale completion for source {:?} ignored", msg.source);
                continue;
            }

            match msg.result {
                Ok(options) => match self.uploader.upload(&options.pixels) {
                    Ok(native) => {
                        self.used_memory += native.byte_size();
                        source.permanent |= options.permanent;
                        source.has_alpha = options.has_alpha;
                        source.state = SourceState::Loaded(native);
                        log::debug!(
                            "source {:?} loaded ({}x{})",
                            msg.source,
                            source.width(),
                            source.height()
                        );
                    }
                    Err(err) => {
                        log::error!("source {:?} upload failed: {err}", msg.source);
                        source.state = SourceState::Errored(LoadError::new(err));
                    }
                },
                Err(err) => {
                    log::warn!("source {:?} failed to load: {err}", msg.source);
                    source.state = SourceState::Errored(err);
                }
            }
            changed.push(msg.source);
        }

        changed
    }

    // ── eviction ──────────────────────────────────────────────────────────

    /// Releases the payload of a source, returning the bytes reclaimed.
    ///
    /// A loading source has its load cancelled instead.
    pub fn free_source(&mut self, id: SourceId) -> u64 {
        let Some(source) = self.sources.get_mut(id) else {
            return 0;
        };
        match mem::replace(&mut source.state, SourceState::Unloaded) {
            SourceState::Loaded(native) => {
                let bytes = native.byte_size();
                self.used_memory = self.used_memory.saturating_sub(bytes);
                self.uploader.release(native);
                bytes
            }
            SourceState::Loading { cancel, .. } => {
                if let Some(cancel) = cancel {
                    cancel();
                }
                0
            }
            other => {
                source.state = other;
                0
            }
        }
    }

    /// Frees every loaded source that is neither used nor permanent, then forgets
    /// lookup entries and sources that no longer hold anything.
    ///
    /// Sources are visited in ascending [`SourceId`] order.
    pub fn gc(&mut self) -> Sweep {
        let mut ids: Vec<SourceId> = self.sources.keys().collect();
        ids.sort_unstable();

        let mut sweep = Sweep::default();
        for &id in &ids {
            let evictable = self
                .sources
                .get(id)
                .is_some_and(|s| s.is_loaded() && !s.is_used());
            if evictable {
                sweep.freed_bytes += self.free_source(id);
                sweep.freed.push(id);
            }
        }

        let sources = &self.sources;
        self.lookup
            .retain(|_, id| sources.get(*id).is_some_and(|s| s.is_loaded() || s.is_loading()));

        for id in ids {
            let orphan = self
                .sources
                .get(id)
                .is_some_and(|s| s.bindings == 0 && !s.is_used() && !s.is_loaded());
            if orphan {
                self.remove_source(id);
            }
        }

        sweep
    }

    /// Releases every source. The manager stays usable but empty.
    pub fn destroy(&mut self) {
        let ids: Vec<SourceId> = self.sources.keys().collect();
        for id in ids {
            self.free_source(id);
        }
        self.sources.clear();
        self.lookup.clear();
        self.used_memory = 0;
        // Drain completions that raced the teardown.
        while self.rx.try_recv().is_ok() {}
    }
}

fn cancel_load(source: &mut TextureSource) -> bool {
    match mem::replace(&mut source.state, SourceState::Unloaded) {
        SourceState::Loading { cancel, .. } => {
            if let Some(cancel) = cancel {
                cancel();
            }
            true
        }
        other => {
            source.state = other;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareUploader;
    use crate::source::ManualLoader;

    fn manager() -> TextureManager {
        TextureManager::new(Box::new(SoftwareUploader::new()))
    }

    fn key(s: &str) -> LookupKey {
        LookupKey::from_raw(s)
    }

    // ── materialize ───────────────────────────────────────────────────────

    #[test]
    fn keyed_requests_share_a_source() {
        let mut m = manager();
        let loader = ManualLoader::immediate(2, 2);
        let a = m.materialize(Rc::new(loader.clone()), Some(key("k1")));
        let b = m.materialize(Rc::new(loader.clone()), Some(key("k1")));
        assert_eq!(a, b);
        assert_eq!(m.len(), 1);
        assert_eq!(m.find_reusable(&key("k1")), Some(a));
    }

    #[test]
    fn keyless_requests_are_unique() {
        let mut m = manager();
        let loader = ManualLoader::immediate(2, 2);
        let a = m.materialize(Rc::new(loader.clone()), None);
        let b = m.materialize(Rc::new(loader), None);
        assert_ne!(a, b);
    }

    // ── loading ───────────────────────────────────────────────────────────

    #[test]
    fn first_use_starts_loading_and_accounts_memory() {
        let mut m = manager();
        let loader = ManualLoader::immediate(4, 4);
        let id = m.materialize(Rc::new(loader.clone()), None);
        m.bind(id);
        m.inc_active(id);
        assert_eq!(loader.loads(), 1);
        assert_eq!(m.pump_loads(), vec![id]);
        assert!(m.source(id).unwrap().is_loaded());
        assert_eq!(m.used_memory(), 64);

        m.inc_active(id);
        assert_eq!(loader.loads(), 1, "second user must not reload");
    }

    #[test]
    fn becoming_unused_cancels_a_pending_load() {
        let mut m = manager();
        let loader = ManualLoader::deferred(4, 4);
        let id = m.materialize(Rc::new(loader.clone()), None);
        m.bind(id);
        m.inc_active(id);
        m.dec_active(id);
        assert_eq!(loader.cancellations(), 1);

        // The parked completion is now stale.
        assert!(loader.complete_next());
        assert!(m.pump_loads().is_empty());
        assert!(!m.source(id).unwrap().is_loaded());
    }

    #[test]
    fn failed_load_is_recorded() {
        let mut m = manager();
        let loader = ManualLoader::deferred(4, 4);
        let id = m.materialize(Rc::new(loader.clone()), None);
        m.bind(id);
        m.inc_active(id);
        loader.fail_next(LoadError::new("decode"));
        m.pump_loads();
        let source = m.source(id).unwrap();
        assert_eq!(source.load_error().map(LoadError::message), Some("decode"));
        assert_eq!(m.used_memory(), 0);
    }

    // ── gc ────────────────────────────────────────────────────────────────

    #[test]
    fn gc_keeps_used_and_frees_unused_in_id_order() {
        let mut m = manager();
        let loader = ManualLoader::immediate(2, 2);
        let ids: Vec<SourceId> = (0..3)
            .map(|i| {
                let id = m.materialize(Rc::new(loader.clone()), Some(key(&format!("k{i}"))));
                m.bind(id);
                m.inc_active(id);
                id
            })
            .collect();
        m.pump_loads();
        assert_eq!(m.used_memory(), 48);

        // Only the middle one stays in use.
        m.dec_active(ids[2]);
        m.dec_active(ids[0]);

        let sweep = m.gc();
        assert_eq!(sweep.freed, vec![ids[0], ids[2]]);
        assert_eq!(sweep.freed_bytes, 32);
        assert_eq!(m.used_memory(), 16);
        assert!(m.source(ids[1]).unwrap().is_loaded());

        // Swept sources leave the lookup map but stay bound.
        assert_eq!(m.find_reusable(&key("k0")), None);
        assert!(m.source(ids[0]).is_some());
    }

    #[test]
    fn unbound_keyless_source_is_dropped_with_its_memory() {
        let mut m = manager();
        let loader = ManualLoader::immediate(2, 2);
        let id = m.materialize(Rc::new(loader), None);
        m.bind(id);
        m.inc_active(id);
        m.pump_loads();
        m.dec_active(id);
        m.unbind(id);
        assert!(m.source(id).is_none());
        assert_eq!(m.used_memory(), 0);
    }

    #[test]
    fn unbound_keyed_source_stays_reusable_until_gc() {
        let mut m = manager();
        let loader = ManualLoader::immediate(2, 2);
        let id = m.materialize(Rc::new(loader), Some(key("k")));
        m.bind(id);
        m.inc_active(id);
        m.pump_loads();
        m.dec_active(id);
        m.unbind(id);
        assert_eq!(m.find_reusable(&key("k")), Some(id));

        m.gc();
        assert!(m.source(id).is_none());
        assert_eq!(m.find_reusable(&key("k")), None);
    }

    #[test]
    fn destroy_releases_everything() {
        let mut m = manager();
        let loader = ManualLoader::immediate(2, 2);
        let id = m.materialize(Rc::new(loader), Some(key("k")));
        m.bind(id);
        m.inc_active(id);
        m.pump_loads();
        m.destroy();
        assert!(m.is_empty());
        assert_eq!(m.used_memory(), 0);
    }
}
