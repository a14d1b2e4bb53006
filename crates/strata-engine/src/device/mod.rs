//! Upload seam between the texture pool and a rendering backend.
//!
//! The pool hands decoded pixels to a [`TextureUploader`] once a source finishes
//! loading, and hands the resulting [`NativeTexture`] back when the source is
//! evicted. Two uploaders are provided:
//! - [`SoftwareUploader`] keeps pixels in system memory (canvas-style backends, tests)
//! - [`WgpuUploader`] creates device textures through wgpu

mod error;
mod uploader;
mod wgpu_uploader;

pub use error::UploadError;
pub use uploader::{NativeTexture, SoftwareUploader, TextureUploader};
pub use wgpu_uploader::{DeviceInit, WgpuUploader};
