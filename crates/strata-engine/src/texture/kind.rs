use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use image::GenericImageView;

use crate::source::{CancelLoad, LoadCompletion, LoadError, SourceLoader, SourceOptions, SourcePixels};
use crate::text::{self, FontSystem};

use super::key::{KeyValue, LookupKey};

/// Image file decoded on a worker thread.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageTexture {
    pub src: String,
    /// Overrides alpha detection from the decoded color type.
    pub has_alpha: Option<bool>,
}

/// Parameters of a rasterized text texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSettings {
    pub text: String,
    /// Face names in fallback order; the font system's default face is used when
    /// none is registered.
    pub font_face: Vec<String>,
    pub font_size: f32,
    /// ARGB.
    pub color: u32,
    pub wrap_width: Option<f32>,
    /// Line height multiplier.
    pub line_height: f32,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_face: Vec::new(),
            font_size: 40.0,
            color: 0xFFFF_FFFF,
            wrap_width: None,
            line_height: 1.0,
        }
    }
}

impl TextSettings {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Caller-provided loader, optionally shareable under a key.
#[derive(Clone)]
pub struct StaticTexture {
    pub loader: Rc<dyn SourceLoader>,
    /// Without a key every descriptor gets its own source.
    pub key: Option<KeyValue>,
}

impl StaticTexture {
    pub fn new(loader: impl SourceLoader + 'static) -> Self {
        Self {
            loader: Rc::new(loader),
            key: None,
        }
    }

    pub fn keyed(loader: impl SourceLoader + 'static, key: impl Into<KeyValue>) -> Self {
        Self {
            loader: Rc::new(loader),
            key: Some(key.into()),
        }
    }
}

/// What a texture descriptor produces.
#[derive(Clone, Default)]
pub enum TextureKind {
    /// No loader. Resolving an unset texture is a configuration error.
    #[default]
    Unset,
    /// 1x1 white texel shared by every rectangle.
    Rectangle,
    Image(ImageTexture),
    Text(TextSettings),
    Static(StaticTexture),
}

impl TextureKind {
    pub fn image(src: impl Into<String>) -> Self {
        TextureKind::Image(ImageTexture {
            src: src.into(),
            has_alpha: None,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        TextureKind::Text(TextSettings::new(text))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TextureKind::Unset => "unset",
            TextureKind::Rectangle => "rectangle",
            TextureKind::Image(_) => "image",
            TextureKind::Text(_) => "text",
            TextureKind::Static(_) => "static",
        }
    }

    /// Whether a source can be produced from the current parameters.
    pub fn is_valid(&self) -> bool {
        match self {
            TextureKind::Image(img) => !img.src.is_empty(),
            TextureKind::Text(settings) => !settings.text.is_empty(),
            _ => true,
        }
    }

    /// Whether the texture's render size follows its source.
    pub fn is_autosize(&self) -> bool {
        !matches!(self, TextureKind::Rectangle)
    }

    /// Structured reuse key. `None` means never share.
    pub fn key_value(&self) -> Option<KeyValue> {
        let key = KeyValue::typed(self.type_name());
        match self {
            TextureKind::Unset => None,
            TextureKind::Rectangle => Some(key),
            TextureKind::Image(img) => Some(key.with("src", img.src.as_str()).with("hasAlpha", img.has_alpha)),
            TextureKind::Text(s) => Some(
                key.with("text", s.text.as_str())
                    .with("fontFace", s.font_face.clone())
                    .with("fontSize", s.font_size)
                    .with("color", i64::from(s.color))
                    .with("wordWrapWidth", s.wrap_width)
                    .with("lineHeight", s.line_height),
            ),
            TextureKind::Static(st) => st.key.clone().map(|k| key.with("key", k)),
        }
    }

    pub fn lookup_key(&self) -> Option<LookupKey> {
        self.key_value().map(|k| LookupKey::from(&k))
    }

    /// Builds the loader for the current parameters. `None` for [`TextureKind::Unset`].
    pub fn loader(&self, fonts: &FontSystem) -> Option<Rc<dyn SourceLoader>> {
        let loader: Rc<dyn SourceLoader> = match self {
            TextureKind::Unset => return None,
            TextureKind::Rectangle => Rc::new(load_rectangle),
            TextureKind::Image(img) => Rc::new(ImageLoader { texture: img.clone() }),
            TextureKind::Text(settings) => Rc::new(TextLoader {
                font: fonts.resolve(&settings.font_face),
                settings: settings.clone(),
            }),
            TextureKind::Static(st) => Rc::clone(&st.loader),
        };
        Some(loader)
    }
}

impl PartialEq for TextureKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TextureKind::Unset, TextureKind::Unset) => true,
            (TextureKind::Rectangle, TextureKind::Rectangle) => true,
            (TextureKind::Image(a), TextureKind::Image(b)) => a == b,
            (TextureKind::Text(a), TextureKind::Text(b)) => a == b,
            (TextureKind::Static(a), TextureKind::Static(b)) => {
                Rc::ptr_eq(&a.loader, &b.loader) && a.key == b.key
            }
            _ => false,
        }
    }
}

impl fmt::Debug for TextureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureKind::Unset => f.write_str("Unset"),
            TextureKind::Rectangle => f.write_str("Rectangle"),
            TextureKind::Image(img) => f.debug_tuple("Image").field(img).finish(),
            TextureKind::Text(settings) => f.debug_tuple("Text").field(settings).finish(),
            TextureKind::Static(st) => f.debug_struct("Static").field("key", &st.key).finish_non_exhaustive(),
        }
    }
}

// ── loaders ───────────────────────────────────────────────────────────────

fn load_rectangle(completion: LoadCompletion) -> Option<CancelLoad> {
    let pixels = SourcePixels::filled(1, 1, [255, 255, 255, 255]);
    completion.succeed(SourceOptions::new(pixels).permanent());
    None
}

struct ImageLoader {
    texture: ImageTexture,
}

impl SourceLoader for ImageLoader {
    fn load(&self, completion: LoadCompletion) -> Option<CancelLoad> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let texture = self.texture.clone();

        let spawned = thread::Builder::new()
            .name("strata-image".into())
            .spawn(move || {
                let result = decode_image(&texture);
                if flag.load(Ordering::Acquire) {
                    completion.abandon();
                } else {
                    completion.finish(result);
                }
            });

        // A failed spawn drops the completion, which reports the load as failed.
        if let Err(err) = spawned {
            log::error!("failed to spawn image decoder for '{}': {err}", self.texture.src);
            return None;
        }

        Some(Box::new(move || cancelled.store(true, Ordering::Release)))
    }
}

fn decode_image(texture: &ImageTexture) -> Result<SourceOptions, LoadError> {
    let img = image::open(&texture.src)?;
    let has_alpha = texture.has_alpha.unwrap_or_else(|| img.color().has_alpha());
    let (width, height) = img.dimensions();
    let pixels = SourcePixels::new(width, height, img.to_rgba8().into_raw())?;
    let options = SourceOptions::new(pixels);
    Ok(if has_alpha { options } else { options.opaque() })
}

struct TextLoader {
    font: Option<Arc<fontdue::Font>>,
    settings: TextSettings,
}

impl SourceLoader for TextLoader {
    fn load(&self, completion: LoadCompletion) -> Option<CancelLoad> {
        let result = match &self.font {
            Some(font) => text::rasterize(font, &self.settings).map(SourceOptions::new),
            None => Err(LoadError::new("no font available for text texture")),
        };
        completion.finish(result);
        None
    }
}
