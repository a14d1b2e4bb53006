/// Failure to turn loaded pixels into a native texture.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("cannot upload an empty {width}x{height} texture")]
    Empty { width: u32, height: u32 },

    #[error("{width}x{height} exceeds the device limit of {max} texels per side")]
    TooLarge { width: u32, height: u32, max: u32 },
}
