use std::time::{Duration, Instant};

use strata_engine::Error;
use strata_engine::scene::ElementId;
use strata_engine::source::ManualLoader;
use strata_engine::stage::{FrameCtx, Stage, StageHooks, StageOptions};
use strata_engine::texture::{StaticTexture, TextureId, TextureKind};

const MB: u64 = 1_000_000;

fn stage(budget: u64) -> Stage {
    Stage::headless(
        StageOptions::default()
            .with_budget(budget)
            .with_fixed_timestep(Duration::from_millis(16)),
    )
}

fn keyed(loader: &ManualLoader, key: &str) -> TextureKind {
    TextureKind::Static(StaticTexture::keyed(loader.clone(), key))
}

/// Creates an element under the root showing `texture`.
fn show(stage: &mut Stage, texture: TextureId) -> ElementId {
    let (scene, textures) = stage.parts_mut();
    let el = scene.create_element();
    scene.set_texture(textures, el, Some(texture)).unwrap();
    let root = scene.root();
    scene.append_child(textures, root, el).unwrap();
    el
}

fn set_visible(stage: &mut Stage, el: ElementId, visible: bool) {
    let (scene, textures) = stage.parts_mut();
    scene.set_visible(textures, el, visible).unwrap();
}

/// Tiny deterministic generator for operation sequences.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

// ── reference counting ────────────────────────────────────────────────────

#[test]
fn active_counts_match_active_consumers_through_random_edits() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(4, 4);
    let textures: Vec<TextureId> = (0..4)
        .map(|i| stage.textures_mut().create(keyed(&loader, &format!("t{}", i % 3))))
        .collect();

    let (scene, _) = stage.parts_mut();
    let mut elements: Vec<ElementId> = (0..8).map(|_| scene.create_element()).collect();
    elements.insert(0, scene.root());

    let mut rng = Lcg(7);
    for step in 0..400 {
        let (scene, ctx) = stage.parts_mut();
        let el = elements[1 + rng.next(8) as usize];
        match rng.next(5) {
            0 => {
                let parent = elements[rng.next(9) as usize];
                // Cycles are rejected and leave the tree untouched.
                let _ = scene.append_child(ctx, parent, el);
            }
            1 => scene.detach(ctx, el).unwrap(),
            2 => scene.set_visible(ctx, el, rng.next(2) == 0).unwrap(),
            3 => {
                let texture = match rng.next(5) {
                    4 => None,
                    i => Some(textures[i as usize]),
                };
                scene.set_texture(ctx, el, texture).unwrap();
            }
            _ => {
                if step % 25 == 0 {
                    stage.draw_frame().unwrap();
                }
                continue;
            }
        }

        let (scene, ctx) = stage.parts_mut();
        for &id in &textures {
            let tex = ctx.texture(id).unwrap();
            let active_consumers = tex.consumers().filter(|(_, active)| *active).count();
            let active_elements = scene
                .active_elements()
                .filter(|(_, e)| e.texture() == Some(id))
                .count();
            assert_eq!(tex.active_count(), active_consumers, "step {step}");
            assert_eq!(tex.active_count(), active_elements, "step {step}");
        }
        for (src, source) in ctx.manager().iter() {
            let used_bound = ctx
                .iter()
                .filter(|(_, t)| t.source() == Some(src) && t.is_used())
                .count();
            assert_eq!(source.active_count(), used_bound, "step {step}");
        }
    }
}

// ── coalescing ────────────────────────────────────────────────────────────

#[test]
fn parameter_bursts_resolve_once_per_frame() {
    struct Burst {
        texture: TextureId,
        loader: ManualLoader,
    }

    impl StageHooks for Burst {
        fn on_update(&mut self, ctx: &mut FrameCtx<'_>) -> strata_engine::Result<()> {
            for i in 0..5 {
                let kind = keyed(&self.loader, &format!("v{i}"));
                ctx.textures.set_kind(self.texture, kind)?;
            }
            Ok(())
        }
    }

    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(2, 2);
    let texture = stage.textures_mut().create(keyed(&loader, "v"));
    show(&mut stage, texture);
    stage.draw_frame().unwrap();
    let before = stage.textures().texture(texture).unwrap().resolutions();

    let mut hooks = Burst {
        texture,
        loader: loader.clone(),
    };
    let stats = stage.draw_frame_with(&mut hooks).unwrap();
    assert_eq!(stats.resolved, 1);
    assert_eq!(stage.textures().texture(texture).unwrap().resolutions(), before + 1);
    assert!(stage.textures().is_loaded(texture));
}

#[test]
fn change_after_resolution_waits_one_frame() {
    struct LateChange {
        texture: TextureId,
        loader: ManualLoader,
    }

    impl StageHooks for LateChange {
        fn on_update(&mut self, ctx: &mut FrameCtx<'_>) -> strata_engine::Result<()> {
            ctx.textures.set_kind(self.texture, keyed(&self.loader, "c"))
        }
    }

    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(2, 2);
    let texture = stage.textures_mut().create(keyed(&loader, "a"));
    show(&mut stage, texture);

    // "b" is resolved by the first flush, so "c" is carried over.
    stage.textures_mut().set_kind(texture, keyed(&loader, "b")).unwrap();
    let mut hooks = LateChange {
        texture,
        loader: loader.clone(),
    };
    assert_eq!(stage.draw_frame_with(&mut hooks).unwrap().resolved, 1);
    assert!(stage.textures().queue().is_queued(texture));
    let key = stage.textures().bound_source(texture).unwrap().lookup_key().unwrap().to_string();
    assert_eq!(key, "type=static|key=b");

    assert_eq!(stage.draw_frame().unwrap().resolved, 1);
    let key = stage.textures().bound_source(texture).unwrap().lookup_key().unwrap().to_string();
    assert_eq!(key, "type=static|key=c");
}

// ── reuse ─────────────────────────────────────────────────────────────────

#[test]
fn equal_keys_share_and_changed_keys_split() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(2, 2);
    let d = stage.textures_mut().create(keyed(&loader, "img"));
    let e = stage.textures_mut().create(keyed(&loader, "img"));
    show(&mut stage, d);
    stage.draw_frame().unwrap();
    assert!(stage.textures().is_loaded(d));

    show(&mut stage, e);
    assert_eq!(loader.loads(), 1);
    let shared = stage.textures().texture(d).unwrap().source();
    assert_eq!(shared, stage.textures().texture(e).unwrap().source());

    stage.textures_mut().set_kind(e, keyed(&loader, "other")).unwrap();
    stage.draw_frame().unwrap();
    assert_ne!(stage.textures().texture(e).unwrap().source(), shared);
    assert_eq!(loader.loads(), 2);
}

#[test]
fn keyless_textures_never_share() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(2, 2);
    let a = stage.textures_mut().create(TextureKind::Static(StaticTexture::new(loader.clone())));
    let b = stage.textures_mut().create(TextureKind::Static(StaticTexture::new(loader.clone())));
    show(&mut stage, a);
    show(&mut stage, b);
    assert_ne!(stage.textures().texture(a).unwrap().source(), stage.textures().texture(b).unwrap().source());
    assert_eq!(loader.loads(), 2);
}

#[test]
fn reactivation_without_eviction_reuses_the_source() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(2, 2);
    let texture = stage.textures_mut().create(keyed(&loader, "a"));
    let el = show(&mut stage, texture);
    stage.draw_frame().unwrap();
    let source = stage.textures().texture(texture).unwrap().source();

    set_visible(&mut stage, el, false);
    stage.draw_frame().unwrap();
    set_visible(&mut stage, el, true);
    stage.draw_frame().unwrap();

    assert_eq!(stage.textures().texture(texture).unwrap().source(), source);
    assert_eq!(loader.loads(), 1);
    assert_eq!(stage.scene().element(el).unwrap().displayed_texture(), Some(texture));
}

#[test]
fn reactivated_texture_moves_to_a_newer_source_with_its_key() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(2, 2);
    let a = stage.textures_mut().create(keyed(&loader, "k"));
    let el_a = show(&mut stage, a);
    stage.draw_frame().unwrap();
    let old = stage.textures().texture(a).unwrap().source().unwrap();

    set_visible(&mut stage, el_a, false);
    stage.draw_frame().unwrap();
    stage.gc(false).unwrap();
    assert!(!stage.textures().is_loaded(a));

    let b = stage.textures_mut().create(keyed(&loader, "k"));
    show(&mut stage, b);
    let newer = stage.textures().texture(b).unwrap().source().unwrap();
    assert_ne!(old, newer);
    assert!(stage.textures().is_loaded(b));

    set_visible(&mut stage, el_a, true);
    assert_eq!(stage.textures().texture(a).unwrap().source(), Some(newer));
    assert!(stage.textures().manager().source(old).is_none());
    assert_eq!(stage.textures().manager().source(newer).unwrap().active_count(), 2);
    assert_eq!(loader.loads(), 2);
}

// ── cancellation and errors ───────────────────────────────────────────────

#[test]
fn abandoned_load_is_cancelled_exactly_once() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::deferred(2, 2);
    let texture = stage.textures_mut().create(keyed(&loader, "slow"));
    let el = show(&mut stage, texture);
    assert_eq!(loader.pending(), 1);

    set_visible(&mut stage, el, false);
    let (scene, textures) = stage.parts_mut();
    scene.remove(textures, el).unwrap();
    stage.textures_mut().destroy(texture).unwrap();
    stage.draw_frame().unwrap();
    assert_eq!(loader.cancellations(), 1);

    // The late result is discarded.
    loader.complete_next();
    stage.draw_frame().unwrap();
    assert_eq!(stage.textures().used_memory(), 0);
}

#[test]
fn load_errors_reach_the_element() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::deferred(2, 2);
    let texture = stage.textures_mut().create(keyed(&loader, "broken"));
    let el = show(&mut stage, texture);

    loader.fail_next(strata_engine::source::LoadError::new("404"));
    stage.draw_frame().unwrap();

    let element = stage.scene().element(el).unwrap();
    assert_eq!(element.load_error().map(|e| e.message()), Some("404"));
    assert_eq!(element.displayed_texture(), None);
    assert_eq!(stage.textures().load_error(texture).unwrap().message(), "404");
}

#[test]
fn missing_loader_aborts_the_frame_and_keeps_the_queue() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(2, 2);
    let bad = stage.textures_mut().create(keyed(&loader, "bad"));
    let good = stage.textures_mut().create(keyed(&loader, "good"));
    show(&mut stage, bad);
    show(&mut stage, good);
    stage.draw_frame().unwrap();

    stage.textures_mut().set_kind(bad, TextureKind::Unset).unwrap();
    stage.textures_mut().set_kind(good, keyed(&loader, "good2")).unwrap();
    assert_eq!(stage.draw_frame().unwrap_err(), Error::MissingLoader(bad));

    let stats = stage.draw_frame().unwrap();
    assert_eq!(stats.resolved, 1);
    let key = stage.textures().bound_source(good).unwrap().lookup_key().unwrap().to_string();
    assert_eq!(key, "type=static|key=good2");
}

#[test]
fn invalid_parameters_clear_the_element() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(2, 2);
    let texture = stage.textures_mut().create(keyed(&loader, "a"));
    let el = show(&mut stage, texture);
    stage.draw_frame().unwrap();
    assert_eq!(stage.scene().element(el).unwrap().displayed_texture(), Some(texture));

    stage.textures_mut().set_kind(texture, TextureKind::text("")).unwrap();
    stage.draw_frame().unwrap();
    assert_eq!(stage.scene().element(el).unwrap().displayed_texture(), None);
}

#[test]
fn text_without_fonts_reports_a_load_error() {
    let mut stage = stage(u64::MAX);
    let texture = stage.textures_mut().create(TextureKind::text("hello"));
    let el = show(&mut stage, texture);
    stage.draw_frame().unwrap();
    let err = stage.scene().element(el).unwrap().load_error().cloned();
    assert_eq!(err.map(|e| e.message().to_owned()), Some("no font available for text texture".to_owned()));
}

// ── eviction ──────────────────────────────────────────────────────────────

#[test]
fn gentle_eviction_spares_active_sources() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(10, 10);
    let visible = stage.textures_mut().create(keyed(&loader, "visible"));
    let hidden = stage.textures_mut().create(keyed(&loader, "hidden"));
    show(&mut stage, visible);
    let el = show(&mut stage, hidden);
    stage.draw_frame().unwrap();
    set_visible(&mut stage, el, false);

    let report = stage.gc(false).unwrap().unwrap();
    assert_eq!(report.sources_freed, 1);
    assert_eq!(report.texture_bytes_freed, 400);
    assert!(stage.textures().is_loaded(visible));
    assert!(!stage.textures().is_loaded(hidden));
}

#[test]
fn aggressive_eviction_reloads_what_is_visible() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(10, 10);
    let visible = stage.textures_mut().create(keyed(&loader, "visible"));
    let hidden = stage.textures_mut().create(keyed(&loader, "hidden"));
    let el_visible = show(&mut stage, visible);
    let el_hidden = show(&mut stage, hidden);
    stage.draw_frame().unwrap();
    set_visible(&mut stage, el_hidden, false);

    let report = stage.gc(true).unwrap().unwrap();
    assert_eq!(report.sources_freed, 2);
    assert!(stage.scene().root_visible());
    assert!(stage.scene().is_active(el_visible));
    assert!(stage.textures().is_loaded(visible));
    assert!(!stage.textures().is_loaded(hidden));
    assert_eq!(stage.textures().used_memory(), 400);
}

#[test]
fn budget_overshoot_with_everything_in_use_is_tolerated() {
    let mut stage = stage(10 * MB);
    // 1000 x 750 RGBA = 3 MB each.
    let loaders: Vec<ManualLoader> = (0..5).map(|_| ManualLoader::immediate(1000, 750)).collect();
    for (i, loader) in loaders.iter().enumerate() {
        let texture = stage.textures_mut().create(keyed(loader, &format!("big{i}")));
        show(&mut stage, texture);
    }

    let stats = stage.draw_frame().unwrap();
    assert_eq!(stats.gc.len(), 2);
    assert!(!stats.gc[0].aggressive);
    assert_eq!(stats.gc[0].texture_bytes_freed, 0);
    assert!(stats.gc[1].aggressive);
    assert_eq!(stage.textures().used_memory(), 15 * MB);
    assert!(stage.used_memory() >= 15 * MB);

    // Every element still displays its texture.
    let displayed = stage
        .scene()
        .active_elements()
        .filter(|(_, e)| e.displayed_texture().is_some())
        .count();
    assert_eq!(displayed, 5);

    // The aggressive pass reclaimed nothing durable, so later frames stop
    // escalating and nothing is reloaded again.
    let loads: usize = loaders.iter().map(ManualLoader::loads).sum();
    let stats = stage.draw_frame().unwrap();
    assert_eq!(stats.gc.len(), 1);
    assert!(!stats.gc[0].aggressive);
    assert_eq!(loaders.iter().map(ManualLoader::loads).sum::<usize>(), loads);
}

#[test]
fn sustained_overshoot_with_async_loads_settles() {
    let mut stage = stage(10 * MB);
    let loader = ManualLoader::deferred(1000, 750);
    let textures: Vec<TextureId> = (0..5)
        .map(|i| stage.textures_mut().create(keyed(&loader, &format!("big{i}"))))
        .collect();
    for &texture in &textures {
        show(&mut stage, texture);
    }
    assert_eq!(loader.loads(), 5);

    // First frame: the aggressive pass frees everything and the visible
    // textures start loading again.
    while loader.complete_next() {}
    let stats = stage.draw_frame().unwrap();
    assert_eq!(stats.gc.len(), 2);
    assert_eq!(stats.gc[1].durable_texture_bytes(), 0);
    assert_eq!(loader.loads(), 10);

    for _ in 0..4 {
        while loader.complete_next() {}
        let stats = stage.draw_frame().unwrap();
        assert_eq!(stats.gc.len(), 1);
        assert!(!stats.gc[0].aggressive);
        assert_eq!(stage.textures().used_memory(), 15 * MB);
        assert_eq!(loader.loads(), 10);
    }
    assert!(textures.iter().all(|&t| stage.textures().is_loaded(t)));
}

#[test]
fn asking_for_the_source_resolves_pending_changes_between_frames() {
    let mut stage = stage(u64::MAX);
    let loader = ManualLoader::immediate(2, 2);
    let texture = stage.textures_mut().create(keyed(&loader, "a"));
    show(&mut stage, texture);

    stage.textures_mut().set_kind(texture, keyed(&loader, "b")).unwrap();
    assert_eq!(stage.draw_frame().unwrap().resolved, 1);

    stage.textures_mut().set_kind(texture, keyed(&loader, "c")).unwrap();
    let src = stage.textures_mut().updated_source(texture).unwrap().unwrap();
    let key = stage.textures().manager().source(src).unwrap().lookup_key().unwrap().to_string();
    assert_eq!(key, "type=static|key=c");

    // Nothing is left for the next frame.
    assert_eq!(stage.draw_frame().unwrap().resolved, 0);
}

// ── image decoding ────────────────────────────────────────────────────────

fn wait_until(stage: &mut Stage, mut done: impl FnMut(&Stage) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        stage.draw_frame().unwrap();
        if done(stage) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn image_textures_decode_off_thread() {
    let path = std::env::temp_dir().join(format!("strata-scenario-{}.png", std::process::id()));
    image::RgbaImage::from_pixel(6, 3, image::Rgba([10, 20, 30, 255]))
        .save(&path)
        .unwrap();

    let mut stage = stage(u64::MAX);
    let texture = stage
        .textures_mut()
        .create(TextureKind::image(path.to_string_lossy().into_owned()));
    let el = show(&mut stage, texture);

    let loaded = wait_until(&mut stage, |s| s.textures().is_loaded(texture));
    let _ = std::fs::remove_file(&path);
    assert!(loaded, "image did not load in time");
    assert_eq!(stage.textures().render_width(texture), 6.0);
    assert_eq!(stage.textures().render_height(texture), 3.0);
    assert_eq!(stage.scene().element(el).unwrap().displayed_texture(), Some(texture));
}

#[test]
fn missing_image_reports_a_load_error() {
    let mut stage = stage(u64::MAX);
    let texture = stage
        .textures_mut()
        .create(TextureKind::image("/definitely/not/here.png"));
    let el = show(&mut stage, texture);

    let failed = wait_until(&mut stage, |s| {
        s.scene().element(el).unwrap().load_error().is_some()
    });
    assert!(failed);
    assert!(!stage.textures().is_loaded(texture));
}
