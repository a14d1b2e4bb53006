use bytemuck::{Pod, Zeroable};
use slotmap::SlotMap;

use crate::scene::SceneTree;
use crate::texture::TextureContext;

/// Renderer seam driven by the stage.
///
/// Besides drawing, a backend reports the memory it holds so the stage can
/// account it against the budget and reclaim it during eviction.
pub trait RenderBackend {
    /// Draws the active elements of `scene`.
    fn render(&mut self, scene: &SceneTree, textures: &TextureContext);

    /// Bytes held by cached render targets.
    fn render_target_memory(&self) -> u64 {
        0
    }

    /// Frees render targets no element currently uses. Returns the bytes freed.
    fn free_unused_render_targets(&mut self) -> u64 {
        0
    }

    /// Bytes held by renderer-internal caches (instance buffers, glyph atlases).
    fn cache_memory(&self) -> u64 {
        0
    }

    /// Shrinks renderer caches. Returns the bytes freed.
    fn gc(&mut self, aggressive: bool) -> u64 {
        let _ = aggressive;
        0
    }
}

slotmap::new_key_type! {
    pub struct RenderTargetId;
}

#[derive(Debug, Clone)]
struct RenderTarget {
    width: u32,
    height: u32,
    in_use: bool,
}

impl RenderTarget {
    fn byte_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }
}

/// Pool of offscreen render targets, reused by size.
#[derive(Debug, Default)]
pub struct RenderTargetCache {
    targets: SlotMap<RenderTargetId, RenderTarget>,
}

impl RenderTargetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a free target of the requested size, allocating one if needed.
    pub fn allocate(&mut self, width: u32, height: u32) -> RenderTargetId {
        let free = self
            .targets
            .iter_mut()
            .find(|(_, t)| !t.in_use && t.width == width && t.height == height);
        if let Some((id, target)) = free {
            target.in_use = true;
            return id;
        }
        self.targets.insert(RenderTarget {
            width,
            height,
            in_use: true,
        })
    }

    /// Returns a target to the pool. Its memory stays allocated until
    /// [`free_unused`](Self::free_unused).
    pub fn release(&mut self, id: RenderTargetId) {
        if let Some(target) = self.targets.get_mut(id) {
            target.in_use = false;
        }
    }

    pub fn memory(&self) -> u64 {
        self.targets.values().map(RenderTarget::byte_size).sum()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn free_unused(&mut self) -> u64 {
        let mut freed = 0;
        self.targets.retain(|_, t| {
            if t.in_use {
                true
            } else {
                freed += t.byte_size();
                false
            }
        });
        freed
    }
}

/// Per-quad instance data (48 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct QuadInstance {
    pub dst_min: [f32; 2],
    pub dst_max: [f32; 2],
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
    pub color: [f32; 4],
}

/// Backend that builds quad instance data without a GPU.
///
/// Used by the studio driver and by tests; the instance buffer stands in for a
/// renderer cache that eviction can shrink. Clipped elements are drawn through
/// an offscreen target of their render size, held until the next render.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    targets: RenderTargetCache,
    held: Vec<RenderTargetId>,
    instances: Vec<QuadInstance>,
    frames: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_targets(&self) -> &RenderTargetCache {
        &self.targets
    }

    pub fn render_targets_mut(&mut self) -> &mut RenderTargetCache {
        &mut self.targets
    }

    /// Quads emitted by the last render.
    pub fn instances(&self) -> &[QuadInstance] {
        &self.instances
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderBackend for HeadlessRenderer {
    fn render(&mut self, scene: &SceneTree, textures: &TextureContext) {
        self.instances.clear();
        self.frames += 1;
        for id in self.held.drain(..) {
            self.targets.release(id);
        }

        for (_, element) in scene.active_elements() {
            let Some(id) = element.displayed_texture() else {
                continue;
            };
            let (Some(tex), Some(source)) = (textures.get(id), textures.bound_source(id)) else {
                continue;
            };
            if !source.is_loaded() {
                continue;
            }

            let (sw, sh) = (source.width() as f32, source.height() as f32);
            let (width, height) = (textures.render_width(id), textures.render_height(id));
            let (uv_min, uv_max) = if tex.has_clipping() {
                if width > 0.0 && height > 0.0 {
                    let target = self.targets.allocate(width.ceil() as u32, height.ceil() as u32);
                    self.held.push(target);
                }
                let pw = if tex.pw() != 0.0 { tex.pw() } else { sw - tex.px() };
                let ph = if tex.ph() != 0.0 { tex.ph() } else { sh - tex.py() };
                (
                    [tex.px() / sw, tex.py() / sh],
                    [(tex.px() + pw) / sw, (tex.py() + ph) / sh],
                )
            } else {
                ([0.0, 0.0], [1.0, 1.0])
            };

            self.instances.push(QuadInstance {
                dst_min: [0.0, 0.0],
                dst_max: [width, height],
                uv_min,
                uv_max,
                color: [1.0, 1.0, 1.0, 1.0],
            });
        }

        log::trace!(
            "headless frame {}: {} quads, {} render targets",
            self.frames,
            self.instances.len(),
            self.held.len()
        );
    }

    fn render_target_memory(&self) -> u64 {
        self.targets.memory()
    }

    fn free_unused_render_targets(&mut self) -> u64 {
        self.targets.free_unused()
    }

    fn cache_memory(&self) -> u64 {
        (self.instances.capacity() * std::mem::size_of::<QuadInstance>()) as u64
    }

    fn gc(&mut self, aggressive: bool) -> u64 {
        let before = self.cache_memory();
        if aggressive {
            self.instances = Vec::new();
        } else {
            self.instances.shrink_to_fit();
        }
        before - self.cache_memory()
    }
}
