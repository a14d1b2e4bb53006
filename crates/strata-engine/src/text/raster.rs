use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};

use crate::source::{LoadError, SourcePixels};
use crate::texture::TextSettings;

/// Lays out and rasterizes `settings.text` into an RGBA8 image.
///
/// Glyph coverage modulates the alpha of `settings.color`; the image is sized to
/// the laid-out text (at least 1x1).
pub fn rasterize(font: &fontdue::Font, settings: &TextSettings) -> Result<SourcePixels, LoadError> {
    let size = settings.font_size;
    if size.is_nan() || size <= 0.0 {
        return Err(LoadError::new(format_args!("invalid font size {size}")));
    }

    let mut layout: Layout<()> = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&LayoutSettings {
        max_width: settings.wrap_width,
        line_height: settings.line_height,
        ..LayoutSettings::default()
    });
    layout.append(&[font], &TextStyle::new(&settings.text, size, 0));

    let glyphs = layout.glyphs();
    let width = glyphs
        .iter()
        .map(|g| g.x + g.width as f32)
        .fold(0.0f32, f32::max)
        .ceil()
        .max(1.0) as u32;
    let height = layout.height().ceil().max(1.0) as u32;

    let [a, r, g, b] = settings.color.to_be_bytes();
    let mut texels = vec![[0u8; 4]; width as usize * height as usize];

    for glyph in glyphs.iter().filter(|g| g.char_data.rasterize() && g.width > 0 && g.height > 0) {
        let (_, bitmap) = font.rasterize_config(glyph.key);
        let ox = glyph.x.round() as i64;
        let oy = glyph.y.round() as i64;
        for row in 0..glyph.height {
            let ty = oy + row as i64;
            if ty < 0 || ty >= i64::from(height) {
                continue;
            }
            for col in 0..glyph.width {
                let tx = ox + col as i64;
                if tx < 0 || tx >= i64::from(width) {
                    continue;
                }
                let coverage = u16::from(bitmap[row * glyph.width + col]);
                let alpha = (coverage * u16::from(a) / 255) as u8;
                let texel = &mut texels[ty as usize * width as usize + tx as usize];
                if alpha > texel[3] {
                    *texel = [r, g, b, alpha];
                }
            }
        }
    }

    SourcePixels::new(width, height, bytemuck::cast_slice::<[u8; 4], u8>(&texels).to_vec())
}
