use anyhow::{Context, Result};
use strata_engine::device::{DeviceInit, SoftwareUploader, TextureUploader, WgpuUploader};
use strata_engine::logging::{init_logging, LoggingConfig};
use strata_engine::scene::ElementId;
use strata_engine::source::{CancelLoad, LoadCompletion, SourceOptions, SourcePixels};
use strata_engine::stage::{HeadlessRenderer, Stage, StageOptions};
use strata_engine::texture::{StaticTexture, TextureId, TextureKind};
use strata_engine::time::SystemClock;

const FRAMES: u64 = 240;
const TILES: usize = 12;
const TILE_SIZE: u32 = 256;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let mut options = StageOptions::from_env();
    if std::env::var_os("STRATA_GPU_MEMORY").is_none() {
        // Room for roughly half the tiles, so scrolling forces eviction.
        options = options.with_budget(u64::from(TILE_SIZE * TILE_SIZE * 4) * (TILES as u64 / 2));
    }

    let mut stage = Stage::new(
        options,
        uploader(),
        Box::new(HeadlessRenderer::new()),
        Box::new(SystemClock),
    );

    load_fonts(&mut stage);
    let tiles = build_scene(&mut stage)?;

    let mut reports = 0;
    for frame in 0..FRAMES {
        scroll(&mut stage, &tiles, frame)?;
        let stats = stage.draw_frame().context("frame failed")?;
        for report in &stats.gc {
            println!("  {report}");
        }
        reports += stats.gc.len();
        if frame % 60 == 0 {
            println!(
                "  frame {:>4}  resolved {:>2}  settled {:>2}  memory {:.2}MB",
                stats.frame,
                stats.resolved,
                stats.loads_settled,
                stats.used_memory as f64 / 1e6,
            );
        }
    }

    println!();
    println!("  {FRAMES} frames, {reports} eviction passes");
    println!("  {} sources alive, {:.2}MB in use", stage.textures().manager().len(), stage.used_memory() as f64 / 1e6);

    stage.destroy().context("failed to tear down stage")?;
    Ok(())
}

/// Device uploads when an adapter is available, system memory otherwise.
fn uploader() -> Box<dyn TextureUploader> {
    match WgpuUploader::headless(DeviceInit::default()) {
        Ok(uploader) => Box::new(uploader),
        Err(err) => {
            log::warn!("{err:#}; falling back to software uploads");
            Box::new(SoftwareUploader::new())
        }
    }
}

fn load_fonts(stage: &mut Stage) {
    let font = [
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/noto/NotoSans-Regular.ttf",
        "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    ]
    .iter()
    .find_map(|p| std::fs::read(p).ok());

    let Some(bytes) = font else {
        log::warn!("no system font found; text textures will report load errors");
        return;
    };
    if let Err(err) = stage.textures_mut().fonts_mut().load_font("body", &bytes) {
        log::warn!("{err}");
    }
}

/// A row of procedurally filled tiles with a caption, all initially hidden.
fn build_scene(stage: &mut Stage) -> Result<Vec<ElementId>> {
    let rectangle = stage.rectangle_texture();
    let (scene, textures) = stage.parts_mut();
    let root = scene.root();

    let background = scene.create_element();
    scene.set_texture(textures, background, Some(rectangle))?;
    scene.append_child(textures, root, background)?;

    let caption: TextureId = textures.create(TextureKind::text("strata studio"));
    let label = scene.create_element();
    scene.set_texture(textures, label, Some(caption))?;
    scene.append_child(textures, root, label)?;

    let mut tiles = Vec::with_capacity(TILES);
    for i in 0..TILES {
        let shade = (i * 255 / TILES) as u8;
        let loader = move |completion: LoadCompletion| -> Option<CancelLoad> {
            let pixels = SourcePixels::filled(TILE_SIZE, TILE_SIZE, [shade, 128, 255 - shade, 255]);
            completion.succeed(SourceOptions::new(pixels));
            None
        };
        let texture = textures.create(TextureKind::Static(StaticTexture::keyed(loader, format!("tile-{i}"))));

        let el = scene.create_element();
        scene.set_visible(textures, el, false)?;
        scene.set_texture(textures, el, Some(texture))?;
        scene.append_child(textures, root, el)?;
        tiles.push(el);
    }
    Ok(tiles)
}

/// Shows a sliding window of four tiles.
fn scroll(stage: &mut Stage, tiles: &[ElementId], frame: u64) -> Result<()> {
    let first = (frame / 10) as usize % tiles.len();
    let (scene, textures) = stage.parts_mut();
    for (i, &el) in tiles.iter().enumerate() {
        let offset = (i + tiles.len() - first) % tiles.len();
        scene.set_visible(textures, el, offset < 4)?;
    }
    Ok(())
}
