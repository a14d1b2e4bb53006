use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::texture::{TextureContext, TextureEvent, TextureEventKind, TextureId};

use super::{Element, ElementId};

/// Element tree rooted at a single, always-enabled root.
///
/// Structural and visibility changes keep the texture consumer registrations in
/// the [`TextureContext`] in step with each element's enabled and active state.
pub struct SceneTree {
    elements: SlotMap<ElementId, Element>,
    root: ElementId,
    render_updates: bool,
}

impl SceneTree {
    pub fn new() -> Self {
        let mut elements = SlotMap::with_key();
        let mut root = Element::new();
        root.enabled = true;
        root.active = true;
        let root = elements.insert(root);
        Self {
            elements,
            root,
            render_updates: true,
        }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn element(&self, id: ElementId) -> Result<&Element> {
        self.elements.get(id).ok_or(Error::UnknownElement(id))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_active(&self, id: ElementId) -> bool {
        self.elements.get(id).is_some_and(|e| e.active)
    }

    pub fn root_visible(&self) -> bool {
        self.elements[self.root].visible
    }

    pub fn active_elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements.iter().filter(|(_, e)| e.active)
    }

    /// Creates a detached element.
    pub fn create_element(&mut self) -> ElementId {
        self.elements.insert(Element::new())
    }

    // ── structure ─────────────────────────────────────────────────────────

    /// Attaches `child` as the last child of `parent`, detaching it first if
    /// needed.
    pub fn append_child(&mut self, textures: &mut TextureContext, parent: ElementId, child: ElementId) -> Result<()> {
        self.element(parent)?;
        self.element(child)?;
        if child == self.root || self.is_ancestor_or_self(child, parent) {
            return Err(Error::InvalidHierarchy { parent, child });
        }

        self.detach(textures, child)?;

        self.elements[child].parent = Some(parent);
        self.elements[parent].children.push(child);
        self.render_updates = true;

        let (enabled, active) = {
            let p = &self.elements[parent];
            (p.enabled, p.active)
        };
        if enabled {
            self.enable_subtree(textures, child, active)?;
        }
        Ok(())
    }

    /// Detaches `id` from its parent. The element and its subtree stay alive but
    /// stop consuming textures.
    pub fn detach(&mut self, textures: &mut TextureContext, id: ElementId) -> Result<()> {
        let Some(parent) = self.element(id)?.parent else {
            return Ok(());
        };
        if let Some(p) = self.elements.get_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        self.elements[id].parent = None;
        self.render_updates = true;

        if self.elements[id].enabled {
            self.disable_subtree(textures, id)?;
        }
        Ok(())
    }

    /// Detaches and drops `id` with its whole subtree.
    pub fn remove(&mut self, textures: &mut TextureContext, id: ElementId) -> Result<()> {
        if id == self.root {
            return Err(Error::InvalidHierarchy { parent: id, child: id });
        }
        self.detach(textures, id)?;

        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(el) = self.elements.remove(next) {
                stack.extend(el.children);
            }
        }
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: ElementId, mut id: ElementId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.elements.get(id).and_then(|e| e.parent) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    // ── properties ────────────────────────────────────────────────────────

    pub fn set_visible(&mut self, textures: &mut TextureContext, id: ElementId, visible: bool) -> Result<()> {
        let el = self.elements.get_mut(id).ok_or(Error::UnknownElement(id))?;
        if el.visible == visible {
            return Ok(());
        }
        el.visible = visible;
        let parent = el.parent;
        self.render_updates = true;

        let parent_active = match parent {
            Some(parent) => self.elements[parent].active,
            None => id == self.root,
        };
        self.update_activity(textures, id, parent_active)
    }

    /// Sets the texture drawn by `id`. The previously displayed texture stays on
    /// screen until the new one is loaded.
    pub fn set_texture(&mut self, textures: &mut TextureContext, id: ElementId, texture: Option<TextureId>) -> Result<()> {
        let el = self.elements.get_mut(id).ok_or(Error::UnknownElement(id))?;
        if el.texture == texture {
            return Ok(());
        }
        let previous = std::mem::replace(&mut el.texture, texture);
        let (enabled, active) = (el.enabled, el.active);
        el.load_error = None;
        if texture.is_none() {
            el.displayed = None;
        }
        self.render_updates = true;

        if enabled {
            if let Some(previous) = previous {
                textures.remove_consumer(previous, id)?;
            }
            if let Some(texture) = texture {
                textures.add_consumer(texture, id, active)?;
            }
        }
        Ok(())
    }

    // ── activity ──────────────────────────────────────────────────────────

    fn enable_subtree(&mut self, textures: &mut TextureContext, id: ElementId, parent_active: bool) -> Result<()> {
        let mut result = Ok(());
        let mut stack = vec![(id, parent_active)];

        while let Some((next, parent_active)) = stack.pop() {
            let el = &mut self.elements[next];
            el.enabled = true;
            el.active = parent_active && el.visible;
            let active = el.active;
            if let Some(texture) = el.texture {
                keep_first(&mut result, textures.add_consumer(texture, next, active));
            }
            stack.extend(self.elements[next].children.iter().map(|c| (*c, active)));
        }
        result
    }

    fn disable_subtree(&mut self, textures: &mut TextureContext, id: ElementId) -> Result<()> {
        let mut result = Ok(());
        let mut stack = vec![id];

        while let Some(next) = stack.pop() {
            let el = &mut self.elements[next];
            el.enabled = false;
            el.active = false;
            if let Some(texture) = el.texture {
                keep_first(&mut result, textures.remove_consumer(texture, next));
            }
            stack.extend(self.elements[next].children.iter().copied());
        }
        result
    }

    fn update_activity(&mut self, textures: &mut TextureContext, id: ElementId, parent_active: bool) -> Result<()> {
        let mut result = Ok(());
        let mut stack = vec![(id, parent_active)];

        while let Some((next, parent_active)) = stack.pop() {
            let el = &mut self.elements[next];
            let active = el.enabled && el.visible && parent_active;
            if active == el.active {
                continue;
            }
            el.active = active;
            if let Some(texture) = el.texture {
                keep_first(&mut result, textures.set_consumer_active(texture, next, active));
            }
            stack.extend(self.elements[next].children.iter().map(|c| (*c, active)));
        }
        result
    }

    // ── texture events ────────────────────────────────────────────────────

    /// Applies texture notifications. Events for a texture the element no longer
    /// uses are ignored.
    pub fn apply_texture_events(&mut self, events: impl IntoIterator<Item = TextureEvent>) {
        for event in events {
            let Some(el) = self.elements.get_mut(event.element) else {
                continue;
            };
            if el.texture != Some(event.texture) {
                continue;
            }

            match event.kind {
                TextureEventKind::Loaded => {
                    el.displayed = Some(event.texture);
                    el.load_error = None;
                    self.render_updates = true;
                }
                TextureEventKind::LoadError(err) => {
                    log::debug!("element {:?}: texture failed to load: {err}", event.element);
                    el.load_error = Some(err);
                }
                TextureEventKind::Cleared => {
                    el.displayed = None;
                    self.render_updates = true;
                }
                TextureEventKind::ClippingChanged | TextureEventKind::PrecisionChanged => {
                    if el.displayed == Some(event.texture) {
                        self.render_updates = true;
                    }
                }
            }
        }
    }

    pub fn has_render_updates(&self) -> bool {
        self.render_updates
    }

    pub fn set_render_updates(&mut self) {
        self.render_updates = true;
    }

    pub fn clear_render_updates(&mut self) {
        self.render_updates = false;
    }

    /// Drops every element but the root, unregistering their textures.
    pub fn clear(&mut self, textures: &mut TextureContext) -> Result<()> {
        let children = self.elements[self.root].children.clone();
        let mut result = Ok(());
        for child in children {
            keep_first(&mut result, self.remove(textures, child));
        }
        result
    }
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

fn keep_first(result: &mut Result<()>, next: Result<()>) {
    if result.is_ok() {
        *result = next;
    }
}
