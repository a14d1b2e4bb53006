use slotmap::SlotMap;

use crate::device::{SoftwareUploader, TextureUploader};
use crate::error::{Error, Result};
use crate::scene::ElementId;
use crate::source::{LoadError, SourceId, Sweep, TextureManager, TextureSource};
use crate::text::FontSystem;

use super::{ClipRect, KeyValue, Texture, TextureEvent, TextureEventKind, TextureId, TextureKind, UpdateQueue};

/// Owns every texture descriptor of a stage together with the source pool they
/// resolve to.
///
/// Consumers (scene elements) register with a texture and flag themselves active
/// when they need it drawn. A texture is *used* while at least one consumer is
/// active; only used textures keep their source alive and loading.
///
/// Notifications for consumers are queued as [`TextureEvent`]s and collected with
/// [`take_events`](Self::take_events).
pub struct TextureContext {
    textures: SlotMap<TextureId, Texture>,
    manager: TextureManager,
    queue: UpdateQueue,
    events: Vec<TextureEvent>,
    fonts: FontSystem,
}

impl TextureContext {
    pub fn new(uploader: Box<dyn TextureUploader>) -> Self {
        Self {
            textures: SlotMap::with_key(),
            manager: TextureManager::new(uploader),
            queue: UpdateQueue::new(),
            events: Vec::new(),
            fonts: FontSystem::new(),
        }
    }

    /// Context that keeps source pixels in system memory.
    pub fn software() -> Self {
        Self::new(Box::new(SoftwareUploader::new()))
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn get(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    pub fn texture(&self, id: TextureId) -> Result<&Texture> {
        self.textures.get(id).ok_or(Error::UnknownTexture(id))
    }

    fn texture_mut(&mut self, id: TextureId) -> Result<&mut Texture> {
        self.textures.get_mut(id).ok_or(Error::UnknownTexture(id))
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureId, &Texture)> {
        self.textures.iter()
    }

    pub fn manager(&self) -> &TextureManager {
        &self.manager
    }

    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    pub fn fonts(&self) -> &FontSystem {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut FontSystem {
        &mut self.fonts
    }

    /// The source currently bound to `id`, without resolving pending updates.
    pub fn bound_source(&self, id: TextureId) -> Option<&TextureSource> {
        self.textures
            .get(id)
            .and_then(|tex| tex.source)
            .and_then(|src| self.manager.source(src))
    }

    /// Bytes held by loaded sources.
    pub fn used_memory(&self) -> u64 {
        self.manager.used_memory()
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    pub fn create(&mut self, kind: TextureKind) -> TextureId {
        let id = self.textures.insert(Texture::new(kind));
        log::debug!("texture {id:?} created ({})", self.textures[id].kind.type_name());
        id
    }

    /// Destroys a texture nobody consumes anymore.
    pub fn destroy(&mut self, id: TextureId) -> Result<()> {
        let tex = self.texture(id)?;
        if !tex.consumers.is_empty() {
            return Err(Error::TextureInUse {
                texture: id,
                consumers: tex.consumers.len(),
            });
        }

        self.queue.forget(id);
        if let Some(tex) = self.textures.remove(id) {
            if let Some(src) = tex.source {
                self.manager.unbind(src);
            }
        }
        log::debug!("texture {id:?} destroyed");
        Ok(())
    }

    // ── consumers ─────────────────────────────────────────────────────────

    /// Registers `element` as a consumer. Registering twice is a no-op.
    pub fn add_consumer(&mut self, id: TextureId, element: ElementId, active: bool) -> Result<()> {
        let tex = self.texture_mut(id)?;
        if tex.consumers.contains_key(&element) {
            return Ok(());
        }

        tex.consumers.insert(element, false);
        if tex.consumers.len() == 1 {
            if let Some(src) = tex.source {
                self.manager.add_texture(src, id);
            }
        }

        let result = if active { self.activate(id, element) } else { Ok(()) };
        self.pump_loads();
        result
    }

    /// Unregisters `element`. No-op if it is not a consumer.
    pub fn remove_consumer(&mut self, id: TextureId, element: ElementId) -> Result<()> {
        let tex = self.texture_mut(id)?;
        let Some(active) = tex.consumers.shift_remove(&element) else {
            return Ok(());
        };

        if tex.consumers.is_empty() {
            if let Some(src) = tex.source {
                self.manager.remove_texture(src, id);
            }
        }
        if active {
            self.dec_active_count(id);
        }
        Ok(())
    }

    /// Records an active transition of a registered consumer.
    pub fn set_consumer_active(&mut self, id: TextureId, element: ElementId, active: bool) -> Result<()> {
        let tex = self.texture_mut(id)?;
        let Some(&current) = tex.consumers.get(&element) else {
            return Err(Error::NotAConsumer { texture: id, element });
        };
        if current == active {
            return Ok(());
        }

        if active {
            let result = self.activate(id, element);
            self.pump_loads();
            result
        } else {
            if let Some(flag) = self.texture_mut(id)?.consumers.get_mut(&element) {
                *flag = false;
            }
            self.dec_active_count(id);
            Ok(())
        }
    }

    fn activate(&mut self, id: TextureId, element: ElementId) -> Result<()> {
        let result = self.inc_active_count(id);
        if let Some(flag) = self.textures.get_mut(id).and_then(|t| t.consumers.get_mut(&element)) {
            *flag = true;
        }
        self.sync_consumer(id, element);
        result
    }

    /// Tells a freshly activated consumer about a source that settled before it
    /// was listening.
    fn sync_consumer(&mut self, id: TextureId, element: ElementId) {
        let Some(source) = self.bound_source(id) else {
            return;
        };
        let kind = if source.is_loaded() {
            TextureEventKind::Loaded
        } else if let Some(err) = source.load_error() {
            TextureEventKind::LoadError(err.clone())
        } else {
            return;
        };
        self.events.push(TextureEvent {
            element,
            texture: id,
            kind,
        });
    }

    // ── active count ──────────────────────────────────────────────────────

    fn inc_active_count(&mut self, id: TextureId) -> Result<()> {
        // The active use must land on the up-to-date source.
        let resolved = self.updated_source(id);
        if resolved.is_ok() {
            self.check_for_newer_reusable(id);
        }

        let tex = self.texture_mut(id)?;
        tex.active_count += 1;
        if tex.active_count == 1 {
            if let Some(src) = tex.source {
                self.manager.inc_active(src);
            }
        }
        resolved.map(|_| ())
    }

    fn dec_active_count(&mut self, id: TextureId) {
        let Some(tex) = self.textures.get_mut(id) else {
            return;
        };
        debug_assert!(tex.active_count > 0, "active count underflow on {id:?}");
        tex.active_count = tex.active_count.saturating_sub(1);
        if tex.active_count > 0 {
            return;
        }

        // A pending regeneration waits until the texture is used again.
        if self.queue.dequeue(id) {
            tex.must_update = true;
        }
        if let Some(src) = tex.source {
            self.manager.dec_active(src);
        }
    }

    /// After an eviction, a texture still bound to an unloaded source may find
    /// that another texture already loaded a source under the same key. It then
    /// moves over so a key keeps a single live source.
    fn check_for_newer_reusable(&mut self, id: TextureId) {
        let Some(tex) = self.textures.get(id) else {
            return;
        };
        let Some(current) = tex.source else {
            return;
        };
        if self.manager.source(current).is_some_and(TextureSource::is_loaded) || !tex.kind.is_valid() {
            return;
        }
        let Some(key) = tex.kind.lookup_key() else {
            return;
        };

        if let Some(reusable) = self.manager.find_reusable(&key) {
            let loaded = self.manager.source(reusable).is_some_and(TextureSource::is_loaded);
            if reusable != current && loaded {
                log::debug!("texture {id:?} moves to reloaded source {reusable:?}");
                self.replace_source(id, Some(reusable));
            }
        }
    }

    // ── resolution ────────────────────────────────────────────────────────

    /// Requests regeneration of the texture's source.
    ///
    /// Used textures are queued for the next flush; unused ones are only marked
    /// stale and resolve when they become used.
    pub fn mark_changed(&mut self, id: TextureId) -> Result<()> {
        let tex = self.textures.get_mut(id).ok_or(Error::UnknownTexture(id))?;
        if tex.is_used() {
            self.queue.enqueue(id);
        } else {
            tex.must_update = true;
        }
        Ok(())
    }

    /// Resolves a pending update now, out of band, and returns the bound source.
    ///
    /// Unlike [`flush_updates`](Self::flush_updates) this ignores the per-frame
    /// limit: callers asking for the source need the current one.
    pub fn updated_source(&mut self, id: TextureId) -> Result<Option<SourceId>> {
        let tex = self.texture(id)?;
        if tex.must_update || self.queue.is_queued(id) {
            self.queue.dequeue(id);
            self.resolve_now(id, true)?;
        }
        Ok(self.texture(id)?.source)
    }

    /// Derives the texture's source from its current parameters and binds it.
    ///
    /// Without `force`, an unused texture is only marked stale. Invalid
    /// parameters unbind the source and clear active consumers.
    pub fn resolve_now(&mut self, id: TextureId, force: bool) -> Result<()> {
        let tex = self.texture_mut(id)?;
        if !force && !tex.is_used() {
            tex.must_update = true;
            return Ok(());
        }
        tex.must_update = false;
        tex.resolutions += 1;
        self.queue.mark_resolved(id);

        let source = self.texture_source(id)?;
        self.replace_source(id, source);
        Ok(())
    }

    fn texture_source(&mut self, id: TextureId) -> Result<Option<SourceId>> {
        let tex = self.textures.get(id).ok_or(Error::UnknownTexture(id))?;
        if !tex.kind.is_valid() {
            return Ok(None);
        }

        let key = tex.kind.lookup_key();
        if let Some(existing) = key.as_ref().and_then(|k| self.manager.find_reusable(k)) {
            return Ok(Some(existing));
        }

        let loader = tex.kind.loader(&self.fonts).ok_or(Error::MissingLoader(id))?;
        Ok(Some(self.manager.materialize(loader, key)))
    }

    fn replace_source(&mut self, id: TextureId, new: Option<SourceId>) {
        let Some(tex) = self.textures.get_mut(id) else {
            return;
        };
        let old = tex.source;
        let used = tex.active_count > 0;
        let registered = !tex.consumers.is_empty();

        if old != new {
            tex.source = new;

            if let Some(old) = old {
                if used {
                    self.manager.dec_active(old);
                }
                if registered {
                    self.manager.remove_texture(old, id);
                }
            }
            if let Some(new) = new {
                self.manager.bind(new);
                if registered {
                    self.manager.add_texture(new, id);
                }
                if used {
                    self.manager.inc_active(new);
                }
            }
            if let Some(old) = old {
                self.manager.unbind(old);
            }
        }

        if !used {
            return;
        }
        let kind = match new.and_then(|src| self.manager.source(src)) {
            Some(source) if source.is_loaded() => TextureEventKind::Loaded,
            Some(source) => match source.load_error() {
                Some(err) => TextureEventKind::LoadError(err.clone()),
                None => return,
            },
            None => TextureEventKind::Cleared,
        };
        self.notify(id, kind);
    }

    /// Resolves every queued texture once, repeating until the queue settles.
    /// Textures already resolved this frame stay queued for the next one.
    ///
    /// A configuration error stops the flush and keeps the rest of the batch
    /// queued; the failing texture is not retried.
    pub fn flush_updates(&mut self) -> Result<usize> {
        let mut resolved = 0;
        let mut deferred = Vec::new();

        loop {
            let batch = self.queue.take();
            if batch.is_empty() {
                break;
            }
            for (i, &id) in batch.iter().enumerate() {
                if !self.textures.contains_key(id) {
                    continue;
                }
                if self.queue.resolved_this_frame(id) {
                    deferred.push(id);
                    continue;
                }
                if let Err(err) = self.resolve_now(id, true) {
                    for &rest in deferred.iter().chain(&batch[i + 1..]) {
                        self.queue.enqueue(rest);
                    }
                    self.pump_loads();
                    return Err(err);
                }
                resolved += 1;
            }
        }

        for id in deferred {
            self.queue.enqueue(id);
        }
        self.pump_loads();
        Ok(resolved)
    }

    /// Applies completed loads and notifies the active consumers of the affected
    /// textures. Returns the number of sources that settled.
    pub fn pump_loads(&mut self) -> usize {
        let settled = self.manager.pump_loads();
        for &src in &settled {
            let Some(source) = self.manager.source(src) else {
                continue;
            };
            let kind = match source.load_error() {
                Some(err) => TextureEventKind::LoadError(err.clone()),
                None if source.is_loaded() => TextureEventKind::Loaded,
                None => continue,
            };
            for texture in source.textures() {
                if let Some(tex) = self.textures.get(texture) {
                    push_events(&mut self.events, texture, tex, &kind);
                }
            }
        }
        settled.len()
    }

    /// Resets the per-frame resolution record. Called by the stage at the start
    /// of every frame.
    pub fn begin_frame(&mut self) {
        self.queue.begin_frame();
    }

    // ── parameters ────────────────────────────────────────────────────────

    pub fn set_kind(&mut self, id: TextureId, kind: TextureKind) -> Result<()> {
        let tex = self.texture_mut(id)?;
        if tex.kind == kind {
            return Ok(());
        }
        tex.kind = kind;
        self.mark_changed(id)
    }

    pub fn set_clip(&mut self, id: TextureId, clip: ClipRect) -> Result<()> {
        let tex = self.texture_mut(id)?;
        if tex.clip == clip {
            return Ok(());
        }
        tex.clip = clip;
        tex.clipping = clip.is_clipping();
        self.notify(id, TextureEventKind::ClippingChanged);
        Ok(())
    }

    pub fn set_x(&mut self, id: TextureId, x: f32) -> Result<()> {
        let clip = ClipRect { x, ..self.texture(id)?.clip };
        self.set_clip(id, clip)
    }

    pub fn set_y(&mut self, id: TextureId, y: f32) -> Result<()> {
        let clip = ClipRect { y, ..self.texture(id)?.clip };
        self.set_clip(id, clip)
    }

    pub fn set_w(&mut self, id: TextureId, w: f32) -> Result<()> {
        let clip = ClipRect { w, ..self.texture(id)?.clip };
        self.set_clip(id, clip)
    }

    pub fn set_h(&mut self, id: TextureId, h: f32) -> Result<()> {
        let clip = ClipRect { h, ..self.texture(id)?.clip };
        self.set_clip(id, clip)
    }

    pub fn set_pixel_ratio(&mut self, id: TextureId, pixel_ratio: f32) -> Result<()> {
        let tex = self.texture_mut(id)?;
        if tex.pixel_ratio == pixel_ratio {
            return Ok(());
        }
        tex.pixel_ratio = pixel_ratio;
        self.notify(id, TextureEventKind::PrecisionChanged);
        Ok(())
    }

    /// Sets the expected maximum source size used before the source is loaded.
    pub fn set_max_size(&mut self, id: TextureId, mw: f32, mh: f32) -> Result<()> {
        let tex = self.texture_mut(id)?;
        tex.max_width = mw;
        tex.max_height = mh;
        Ok(())
    }

    // ── source control ────────────────────────────────────────────────────

    /// Starts loading the texture's source even if the texture is unused.
    pub fn load(&mut self, id: TextureId) -> Result<()> {
        if let Some(src) = self.updated_source(id)? {
            self.manager.load(src);
        }
        self.pump_loads();
        Ok(())
    }

    /// Releases the payload of the bound source. It stays unloaded until it is
    /// loaded again explicitly or becomes used after an unused period.
    pub fn free(&mut self, id: TextureId) -> Result<u64> {
        match self.texture(id)?.source {
            Some(src) => Ok(self.manager.free_source(src)),
            None => Ok(0),
        }
    }

    pub fn is_loaded(&self, id: TextureId) -> bool {
        self.bound_source(id).is_some_and(TextureSource::is_loaded)
    }

    pub fn load_error(&self, id: TextureId) -> Option<LoadError> {
        self.bound_source(id).and_then(|s| s.load_error().cloned())
    }

    /// Width the texture renders at in logical pixels, honoring clipping.
    /// `0` until a source is loaded, and always `0` for rectangles.
    pub fn render_width(&self, id: TextureId) -> f32 {
        self.render_extent(id, |s| s.width(), |c| (c.x, c.w))
    }

    /// See [`render_width`](Self::render_width).
    pub fn render_height(&self, id: TextureId) -> f32 {
        self.render_extent(id, |s| s.height(), |c| (c.y, c.h))
    }

    fn render_extent(
        &self,
        id: TextureId,
        source_size: impl Fn(&TextureSource) -> u32,
        axis: impl Fn(&ClipRect) -> (f32, f32),
    ) -> f32 {
        let Some(tex) = self.textures.get(id) else {
            return 0.0;
        };
        if !tex.kind.is_autosize() {
            return 0.0;
        }
        let Some(source) = self.bound_source(id) else {
            return 0.0;
        };

        let (offset, size) = axis(&tex.clip);
        let full = source_size(source) as f32 / tex.pixel_ratio;
        let extent = if size != 0.0 { full.min(size) } else { full };
        (extent - offset).max(0.0)
    }

    /// Parameters that differ from their defaults, for debugging.
    pub fn non_defaults(&self, id: TextureId) -> Result<KeyValue> {
        let tex = self.texture(id)?;
        let mut out = KeyValue::typed(tex.kind.type_name());
        for (name, value) in [("x", tex.clip.x), ("y", tex.clip.y), ("w", tex.clip.w), ("h", tex.clip.h)] {
            if value != 0.0 {
                out = out.with(name, value);
            }
        }
        if tex.pixel_ratio != 1.0 {
            out = out.with("pixelRatio", tex.pixel_ratio);
        }
        Ok(out)
    }

    // ── events and memory ─────────────────────────────────────────────────

    pub fn take_events(&mut self) -> Vec<TextureEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Frees every unused source. See [`TextureManager::gc`].
    pub fn gc(&mut self) -> Sweep {
        self.manager.gc()
    }

    /// Drops every texture and source.
    pub fn clear(&mut self) {
        self.textures.clear();
        self.queue = UpdateQueue::new();
        self.events.clear();
        self.manager.destroy();
    }

    fn notify(&mut self, id: TextureId, kind: TextureEventKind) {
        if let Some(tex) = self.textures.get(id) {
            push_events(&mut self.events, id, tex, &kind);
        }
    }
}

/// Queues `kind` for every active consumer of `tex`.
fn push_events(events: &mut Vec<TextureEvent>, id: TextureId, tex: &Texture, kind: &TextureEventKind) {
    for (element, active) in tex.consumers() {
        if active {
            events.push(TextureEvent {
                element,
                texture: id,
                kind: kind.clone(),
            });
        }
    }
}
