use anyhow::{Context, Result};

use crate::source::SourcePixels;

use super::{NativeTexture, TextureUploader, UploadError};

/// Parameters for creating a headless device.
///
/// Keep this minimal; texture sources only need sampling and copy-in.
#[derive(Debug, Clone)]
pub struct DeviceInit {
    pub power_preference: wgpu::PowerPreference,

    /// Format of uploaded textures. Loaders always produce RGBA8.
    pub format: wgpu::TextureFormat,

    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,
}

impl Default for DeviceInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
        }
    }
}

/// Uploads texture sources to a wgpu device.
pub struct WgpuUploader {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    max_dimension: u32,
    live: usize,
}

impl WgpuUploader {
    /// Wraps an existing device, e.g. the one owned by the presenting renderer.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let max_dimension = device.limits().max_texture_dimension_2d;
        Self {
            device,
            queue,
            format,
            max_dimension,
            live: 0,
        }
    }

    /// Creates a device without a surface.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu; this blocks on it.
    pub fn headless(init: DeviceInit) -> Result<Self> {
        pollster::block_on(Self::request(init))
    }

    async fn request(init: DeviceInit) -> Result<Self> {
        let DeviceInit {
            power_preference,
            format,
            required_features,
            required_limits,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a GPU adapter for texture uploads")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("strata texture device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        log::info!("texture uploads go to {:?}", adapter.get_info().name);

        Ok(Self::new(device, queue, format))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Number of device textures uploaded and not yet released.
    pub fn live(&self) -> usize {
        self.live
    }
}

impl TextureUploader for WgpuUploader {
    fn upload(&mut self, pixels: &SourcePixels) -> Result<NativeTexture, UploadError> {
        let (width, height) = (pixels.width(), pixels.height());
        if width == 0 || height == 0 {
            return Err(UploadError::Empty { width, height });
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(UploadError::TooLarge {
                width,
                height,
                max: self.max_dimension,
            });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("strata texture source"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels.bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.live += 1;

        Ok(NativeTexture::Device {
            texture,
            view,
            width,
            height,
        })
    }

    fn release(&mut self, texture: NativeTexture) {
        if let NativeTexture::Device { texture, .. } = texture {
            texture.destroy();
            self.live = self.live.saturating_sub(1);
        }
    }
}
