use std::collections::HashMap;

use crate::device::{SoftwareUploader, TextureUploader};
use crate::error::{Error, Result};
use crate::scene::SceneTree;
use crate::source::{SourceId, TextureSource};
use crate::texture::{TextureContext, TextureId, TextureKind};
use crate::time::{Clock, FrameClock, FrameTime, SystemClock};

use super::{GcReport, HeadlessRenderer, RenderBackend, StageOptions};

/// Mutable view of the stage handed to frame hooks.
pub struct FrameCtx<'a> {
    pub scene: &'a mut SceneTree,
    pub textures: &'a mut TextureContext,
    pub time: FrameTime,
}

/// Callbacks invoked by [`Stage::draw_frame_with`].
pub trait StageHooks {
    fn on_frame_start(&mut self, ctx: &mut FrameCtx<'_>) {
        let _ = ctx;
    }

    /// Runs between the two update flushes. Changes made here are resolved by
    /// the second flush, except for textures the first flush already resolved:
    /// those stay queued and resolve in the next frame.
    fn on_update(&mut self, ctx: &mut FrameCtx<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn on_frame_end(&mut self, ctx: &mut FrameCtx<'_>) {
        let _ = ctx;
    }
}

impl StageHooks for () {}

/// What happened during one frame.
#[derive(Debug, Clone)]
pub struct FrameStats {
    pub frame: u64,
    pub dt: f32,
    /// Textures whose source was resolved by the update flushes.
    pub resolved: usize,
    /// Loads applied at the start of the frame.
    pub loads_settled: usize,
    pub rendered: bool,
    pub used_memory: u64,
    pub gc: Vec<GcReport>,
}

const GENTLE: usize = 0;
const AGGRESSIVE: usize = 1;

/// Frame driver owning the scene, the textures and the render backend.
pub struct Stage {
    options: StageOptions,
    scene: SceneTree,
    textures: TextureContext,
    backend: Box<dyn RenderBackend>,
    clock: Box<dyn Clock>,
    frame_clock: FrameClock,
    time: Option<FrameTime>,
    elapsed: f64,
    frame_counter: u64,
    external_memory: u64,
    last_gc: [Option<u64>; 2],
    /// Set when an aggressive pass freed nothing that stayed freed. Accounting
    /// stops escalating until usage changes shape.
    aggressive_futile: bool,
    rectangle: TextureId,
    running: bool,
    destroyed: bool,
}

impl Stage {
    pub fn new(
        options: StageOptions,
        uploader: Box<dyn TextureUploader>,
        backend: Box<dyn RenderBackend>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let mut textures = TextureContext::new(uploader);
        let rectangle = textures.create(TextureKind::Rectangle);
        let frame_clock = FrameClock::with_clamps(options.fixed_timestep, options.min_dt, options.max_dt);

        log::info!(
            "stage created: budget {:.2}MB, headroom {:.2}MB, fixed timestep {:?}",
            options.gpu_memory_budget as f64 / 1e6,
            options.gc_headroom as f64 / 1e6,
            options.fixed_timestep,
        );

        Self {
            options,
            scene: SceneTree::new(),
            textures,
            backend,
            clock,
            frame_clock,
            time: None,
            elapsed: 0.0,
            frame_counter: 0,
            external_memory: 0,
            last_gc: [None; 2],
            aggressive_futile: false,
            rectangle,
            running: true,
            destroyed: false,
        }
    }

    /// Stage with software uploads, the headless renderer and the system clock.
    pub fn headless(options: StageOptions) -> Self {
        Self::new(
            options,
            Box::new(SoftwareUploader::new()),
            Box::new(HeadlessRenderer::new()),
            Box::new(SystemClock),
        )
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // ── accessors ─────────────────────────────────────────────────────────

    pub fn options(&self) -> &StageOptions {
        &self.options
    }

    pub fn scene(&self) -> &SceneTree {
        &self.scene
    }

    pub fn textures(&self) -> &TextureContext {
        &self.textures
    }

    pub fn textures_mut(&mut self) -> &mut TextureContext {
        &mut self.textures
    }

    /// Scene and textures together, for scene operations that update consumer
    /// registrations.
    pub fn parts_mut(&mut self) -> (&mut SceneTree, &mut TextureContext) {
        (&mut self.scene, &mut self.textures)
    }

    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn RenderBackend {
        self.backend.as_mut()
    }

    /// Shared 1x1 white texture for solid rectangles.
    pub fn rectangle_texture(&self) -> TextureId {
        self.rectangle
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Step of the last frame, in seconds. `0` before the first frame.
    pub fn dt(&self) -> f32 {
        self.time.map_or(0.0, |t| t.dt)
    }

    /// Sum of all frame steps, in seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn last_frame_time(&self) -> Option<FrameTime> {
        self.time
    }

    pub fn is_running(&self) -> bool {
        self.running && !self.destroyed
    }

    /// Asks drivers to stop calling [`draw_frame`](Self::draw_frame).
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        if !self.running {
            // The pause must not show up as one huge step.
            self.frame_clock.reset();
            self.running = true;
        }
    }

    pub fn force_render_update(&mut self) {
        self.scene.set_render_updates();
    }

    // ── frame ─────────────────────────────────────────────────────────────

    pub fn draw_frame(&mut self) -> Result<FrameStats> {
        self.draw_frame_with(&mut ())
    }

    /// Runs one frame: applies completed loads, flushes texture updates, runs
    /// the update hook, renders if the scene changed and enforces the memory
    /// budget.
    pub fn draw_frame_with(&mut self, hooks: &mut dyn StageHooks) -> Result<FrameStats> {
        if self.destroyed {
            return Err(Error::Destroyed);
        }

        let time = self.frame_clock.tick(self.clock.now());
        self.time = Some(time);
        self.elapsed += f64::from(time.dt);

        hooks.on_frame_start(&mut self.frame_ctx(time));

        self.textures.begin_frame();
        let loads_settled = self.textures.pump_loads();
        let mut resolved = self.textures.flush_updates()?;
        self.deliver_events();

        hooks.on_update(&mut self.frame_ctx(time))?;

        resolved += self.textures.flush_updates()?;
        self.deliver_events();

        let rendered = self.scene.has_render_updates();
        if rendered {
            self.backend.render(&self.scene, &self.textures);
            self.scene.clear_render_updates();
        }

        let gc = self.account_memory()?;
        self.deliver_events();

        hooks.on_frame_end(&mut self.frame_ctx(time));

        let stats = FrameStats {
            frame: self.frame_counter,
            dt: time.dt,
            resolved,
            loads_settled,
            rendered,
            used_memory: self.used_memory(),
            gc,
        };
        self.frame_counter += 1;
        Ok(stats)
    }

    fn frame_ctx(&mut self, time: FrameTime) -> FrameCtx<'_> {
        FrameCtx {
            scene: &mut self.scene,
            textures: &mut self.textures,
            time,
        }
    }

    fn deliver_events(&mut self) {
        if self.textures.has_events() {
            let events = self.textures.take_events();
            self.scene.apply_texture_events(events);
        }
    }

    // ── memory ────────────────────────────────────────────────────────────

    /// Sources, render targets, renderer caches and externally reported usage.
    pub fn used_memory(&self) -> u64 {
        self.textures.used_memory()
            + self.backend.render_target_memory()
            + self.backend.cache_memory()
            + self.external_memory
    }

    /// Reports memory held outside the stage's own accounting, e.g. a host
    /// renderer's caches. May trigger eviction.
    pub fn add_memory_usage(&mut self, delta: i64) -> Result<Vec<GcReport>> {
        self.external_memory = self.external_memory.saturating_add_signed(delta);
        self.account_memory()
    }

    fn account_memory(&mut self) -> Result<Vec<GcReport>> {
        let mut reports = Vec::new();
        let budget = self.options.gpu_memory_budget;
        if self.used_memory() <= budget {
            self.aggressive_futile = false;
            return Ok(reports);
        }

        if let Some(report) = self.gc(false)? {
            if report.durable_texture_bytes() > 0 {
                self.aggressive_futile = false;
            }
            reports.push(report);
        }
        if self.used_memory() > self.options.aggressive_threshold() && !self.aggressive_futile {
            // Too little could be recovered.
            if let Some(report) = self.gc(true)? {
                self.aggressive_futile = report.durable_texture_bytes() == 0;
                reports.push(report);
            }
        }

        let used = self.used_memory();
        if used > budget {
            log::warn!(
                "GPU memory {:.2}MB still over budget {:.2}MB after eviction",
                used as f64 / 1e6,
                budget as f64 / 1e6,
            );
        }
        Ok(reports)
    }

    /// Evicts unused sources and render targets and shrinks renderer caches.
    ///
    /// An aggressive pass hides the root while sweeping, so every source is
    /// released and only what is visible afterwards is loaded again. Each mode
    /// runs at most once per frame; a repeated call returns `None`.
    pub fn gc(&mut self, aggressive: bool) -> Result<Option<GcReport>> {
        if self.destroyed {
            return Err(Error::Destroyed);
        }
        let slot = if aggressive { AGGRESSIVE } else { GENTLE };
        if self.last_gc[slot] == Some(self.frame_counter) {
            return Ok(None);
        }
        self.last_gc[slot] = Some(self.frame_counter);

        let root = self.scene.root();
        let hide_root = aggressive && self.scene.root_visible();
        let sizes: HashMap<SourceId, u64> = if hide_root {
            self.textures
                .manager()
                .iter()
                .filter(|(_, s)| s.is_loaded())
                .map(|(id, s)| (id, s.byte_size()))
                .collect()
        } else {
            HashMap::new()
        };
        if hide_root {
            self.scene.set_visible(&mut self.textures, root, false)?;
        }

        let sweep = self.textures.gc();
        let render_target_bytes_freed = self.backend.free_unused_render_targets();

        let restored = if hide_root {
            self.scene.set_visible(&mut self.textures, root, true)
        } else {
            Ok(())
        };
        let manager = self.textures.manager();
        let texture_bytes_reloaded = sweep
            .freed
            .iter()
            .filter(|id| manager.source(**id).is_some_and(TextureSource::is_used))
            .map(|id| sizes.get(id).copied().unwrap_or(0))
            .sum();
        let renderer_bytes_freed = self.backend.gc(aggressive);

        let report = GcReport {
            frame: self.frame_counter,
            aggressive,
            sources_freed: sweep.freed.len(),
            texture_bytes_freed: sweep.freed_bytes,
            texture_bytes_reloaded,
            render_target_bytes_freed,
            renderer_bytes_freed,
            remaining: self.used_memory(),
            texture_memory: self.textures.used_memory(),
            render_target_memory: self.backend.render_target_memory(),
        };
        log::info!("{report}");
        restored?;
        Ok(Some(report))
    }

    /// Tears down the scene, every texture and every source. The stage refuses
    /// to draw afterwards.
    pub fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        let cleared = self.scene.clear(&mut self.textures);
        self.textures.clear();
        self.backend.free_unused_render_targets();
        self.backend.gc(true);
        self.destroyed = true;
        self.running = false;
        log::info!("stage destroyed after {} frames", self.frame_counter);
        cleared
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        if !self.destroyed {
            self.textures.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::time::ManualClock;

    fn stage() -> Stage {
        Stage::headless(StageOptions::default().with_fixed_timestep(Duration::from_millis(16)))
    }

    #[test]
    fn each_gc_mode_runs_once_per_frame() {
        let mut stage = stage();
        assert!(stage.gc(false).unwrap().is_some());
        assert!(stage.gc(false).unwrap().is_none());
        assert!(stage.gc(true).unwrap().is_some());
        assert!(stage.gc(true).unwrap().is_none());

        stage.draw_frame().unwrap();
        assert!(stage.gc(false).unwrap().is_some());
    }

    #[test]
    fn aggressive_gc_restores_root_visibility() {
        let mut stage = stage();
        stage.gc(true).unwrap();
        assert!(stage.scene().root_visible());
    }

    #[test]
    fn first_frame_uses_fixed_step_and_counts() {
        let mut stage = stage();
        let stats = stage.draw_frame().unwrap();
        assert_eq!(stats.frame, 0);
        assert!((stats.dt - 0.016).abs() < 1e-6);
        assert!(stats.rendered, "a new scene renders once");
        assert!(!stage.draw_frame().unwrap().rendered);
        assert_eq!(stage.frame_counter(), 2);
        assert!((stage.elapsed() - 0.032).abs() < 1e-6);
    }

    #[test]
    fn variable_step_follows_the_clock() {
        let clock = ManualClock::new();
        let mut stage = Stage::headless(StageOptions::default()).with_clock(clock.clone());
        assert!((stage.draw_frame().unwrap().dt - crate::time::FIRST_FRAME_DT).abs() < 1e-6);
        clock.advance(Duration::from_millis(40));
        assert!((stage.draw_frame().unwrap().dt - 0.04).abs() < 1e-6);
    }

    #[test]
    fn hooks_run_in_order() {
        #[derive(Default)]
        struct Recorder(Vec<&'static str>);

        impl StageHooks for Recorder {
            fn on_frame_start(&mut self, _: &mut FrameCtx<'_>) {
                self.0.push("start");
            }
            fn on_update(&mut self, _: &mut FrameCtx<'_>) -> Result<()> {
                self.0.push("update");
                Ok(())
            }
            fn on_frame_end(&mut self, _: &mut FrameCtx<'_>) {
                self.0.push("end");
            }
        }

        let mut stage = stage();
        let mut hooks = Recorder::default();
        stage.draw_frame_with(&mut hooks).unwrap();
        assert_eq!(hooks.0, vec!["start", "update", "end"]);
    }

    #[test]
    fn destroyed_stage_refuses_frames() {
        let mut stage = stage();
        stage.destroy().unwrap();
        assert!(!stage.is_running());
        assert_eq!(stage.draw_frame().unwrap_err(), Error::Destroyed);
    }

    #[test]
    fn external_usage_triggers_eviction() {
        let mut stage = Stage::headless(StageOptions::default().with_budget(1_000));
        let reports = stage.add_memory_usage(5_000).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].aggressive);
        assert!(reports[1].aggressive);
        assert_eq!(stage.used_memory(), 5_000);
        stage.add_memory_usage(-5_000).unwrap();
        assert_eq!(stage.used_memory(), 0);
    }
}
