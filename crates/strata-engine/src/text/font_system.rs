use std::sync::Arc;

use indexmap::IndexMap;

/// Error returned by [`FontSystem::load_font`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("font load error: {0}")]
pub struct FontLoadError(pub String);

/// Opaque handle to a font loaded into a [`FontSystem`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FontId(pub(crate) usize);

/// Owns the fonts available to text textures.
///
/// Fonts are immutable after loading and shared by reference with in-flight text
/// loads. Each font is registered under a face name; text settings list face
/// names in fallback order. The first loaded font is the default face.
#[derive(Default)]
pub struct FontSystem {
    fonts: Vec<Arc<fontdue::Font>>,
    faces: IndexMap<String, FontId>,
}

impl FontSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TrueType or OpenType font and registers it under `face`.
    ///
    /// Registering a face name again points it at the new font.
    pub fn load_font(&mut self, face: &str, bytes: &[u8]) -> Result<FontId, FontLoadError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| FontLoadError(e.to_string()))?;
        let id = FontId(self.fonts.len());
        self.fonts.push(Arc::new(font));
        self.faces.insert(face.to_owned(), id);
        log::debug!("font face '{face}' loaded as {id:?}");
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn face(&self, name: &str) -> Option<FontId> {
        self.faces.get(name).copied()
    }

    pub(crate) fn get(&self, id: FontId) -> Option<&Arc<fontdue::Font>> {
        self.fonts.get(id.0)
    }

    /// Picks the first registered face of `faces`, falling back to the default.
    pub fn resolve(&self, faces: &[String]) -> Option<Arc<fontdue::Font>> {
        faces
            .iter()
            .find_map(|name| self.face(name))
            .or_else(|| (!self.fonts.is_empty()).then_some(FontId(0)))
            .and_then(|id| self.get(id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_system_resolves_nothing() {
        let fonts = FontSystem::new();
        assert!(fonts.is_empty());
        assert!(fonts.resolve(&["Sans".to_owned()]).is_none());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let mut fonts = FontSystem::new();
        assert!(fonts.load_font("Broken", b"not a font").is_err());
        assert!(fonts.face("Broken").is_none());
    }
}
