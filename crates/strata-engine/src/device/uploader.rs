use std::fmt;

use crate::source::SourcePixels;

use super::UploadError;

/// Drawable payload of a loaded texture source.
pub enum NativeTexture {
    /// Pixels kept in system memory.
    Software(SourcePixels),
    /// Texture resident on a wgpu device.
    Device {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
    },
}

impl NativeTexture {
    pub fn width(&self) -> u32 {
        match self {
            NativeTexture::Software(pixels) => pixels.width(),
            NativeTexture::Device { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            NativeTexture::Software(pixels) => pixels.height(),
            NativeTexture::Device { height, .. } => *height,
        }
    }

    /// Bytes accounted against the memory budget (RGBA8).
    pub fn byte_size(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height()) * 4
    }
}

impl fmt::Debug for NativeTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            NativeTexture::Software(_) => "Software",
            NativeTexture::Device { .. } => "Device",
        };
        f.debug_struct("NativeTexture")
            .field("kind", &kind)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Backend hook that materializes loaded pixels.
pub trait TextureUploader {
    fn upload(&mut self, pixels: &SourcePixels) -> Result<NativeTexture, UploadError>;

    /// Releases a texture previously returned by [`upload`](Self::upload).
    fn release(&mut self, texture: NativeTexture);
}

/// Uploader that keeps the decoded pixels as-is.
#[derive(Debug, Default)]
pub struct SoftwareUploader {
    live: usize,
}

impl SoftwareUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures uploaded and not yet released.
    pub fn live(&self) -> usize {
        self.live
    }
}

impl TextureUploader for SoftwareUploader {
    fn upload(&mut self, pixels: &SourcePixels) -> Result<NativeTexture, UploadError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(UploadError::Empty {
                width: pixels.width(),
                height: pixels.height(),
            });
        }
        self.live += 1;
        Ok(NativeTexture::Software(pixels.clone()))
    }

    fn release(&mut self, texture: NativeTexture) {
        self.live = self.live.saturating_sub(1);
        drop(texture);
    }
}
