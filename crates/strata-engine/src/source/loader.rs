use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;

use super::SourceId;

/// Decoded RGBA8 pixels, row-major, no padding.
#[derive(Clone)]
pub struct SourcePixels {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl SourcePixels {
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Result<Self, LoadError> {
        let data = data.into();
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(LoadError::new(format!(
                "{width}x{height} RGBA needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// A `width` x `height` image filled with a single RGBA color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let texels = vec![rgba; width as usize * height as usize];
        Self {
            width,
            height,
            data: Arc::from(bytemuck::cast_slice::<[u8; 4], u8>(&texels)),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl fmt::Debug for SourcePixels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePixels")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// What a loader reports on success.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub pixels: SourcePixels,
    /// Permanent sources are never evicted.
    pub permanent: bool,
    pub has_alpha: bool,
}

impl SourceOptions {
    pub fn new(pixels: SourcePixels) -> Self {
        Self {
            pixels,
            permanent: false,
            has_alpha: true,
        }
    }

    pub fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }

    pub fn opaque(mut self) -> Self {
        self.has_alpha = false;
        self
    }
}

/// Why a source failed to load. Cheap to clone; carried by errored sources and
/// delivered to consumers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct LoadError {
    message: Arc<str>,
}

impl LoadError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: Arc::from(message.to_string()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<image::ImageError> for LoadError {
    fn from(err: image::ImageError) -> Self {
        Self::new(format_args!("image decode failed: {err}"))
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::new(format_args!("i/o error: {err}"))
    }
}

impl From<anyhow::Error> for LoadError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format_args!("{err:#}"))
    }
}

/// Called when a load is abandoned (the source became unused, was evicted or
/// dropped while loading). Invoked at most once.
pub type CancelLoad = Box<dyn FnOnce()>;

pub(crate) struct LoadMessage {
    pub source: SourceId,
    pub ticket: u64,
    pub result: Result<SourceOptions, LoadError>,
}

/// One-shot completion handle given to a loader.
///
/// It is `Send`, so a loader may move it to a worker thread. Results are applied
/// on the stage thread the next time the pool pumps completed loads. Dropping the
/// handle without finishing reports a load error.
pub struct LoadCompletion {
    source: SourceId,
    ticket: u64,
    tx: Option<Sender<LoadMessage>>,
}

impl LoadCompletion {
    pub(crate) fn new(source: SourceId, ticket: u64, tx: Sender<LoadMessage>) -> Self {
        Self {
            source,
            ticket,
            tx: Some(tx),
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn finish(mut self, result: Result<SourceOptions, LoadError>) {
        self.send(result);
    }

    pub fn succeed(self, options: SourceOptions) {
        self.finish(Ok(options));
    }

    pub fn fail(self, error: LoadError) {
        self.finish(Err(error));
    }

    /// Drops the handle without reporting anything. Used by loaders that observed
    /// their own cancellation.
    pub fn abandon(mut self) {
        self.tx = None;
    }

    fn send(&mut self, result: Result<SourceOptions, LoadError>) {
        if let Some(tx) = self.tx.take() {
            // The receiver is gone once the pool is destroyed; nothing to report to.
            let _ = tx.send(LoadMessage {
                source: self.source,
                ticket: self.ticket,
                result,
            });
        }
    }
}

impl Drop for LoadCompletion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.send(Err(LoadError::new("loader dropped its completion without a result")));
        }
    }
}

impl fmt::Debug for LoadCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCompletion")
            .field("source", &self.source)
            .field("ticket", &self.ticket)
            .finish()
    }
}

/// Produces the pixels of a texture source.
///
/// A loader may finish synchronously inside `load` or hand the completion to
/// other work and finish later. The returned [`CancelLoad`] is invoked if the
/// pool abandons the load before it finishes.
pub trait SourceLoader {
    fn load(&self, completion: LoadCompletion) -> Option<CancelLoad>;
}

impl<F> SourceLoader for F
where
    F: Fn(LoadCompletion) -> Option<CancelLoad>,
{
    fn load(&self, completion: LoadCompletion) -> Option<CancelLoad> {
        self(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixels_validate_length() {
        assert!(SourcePixels::new(2, 2, vec![0u8; 16]).is_ok());
        let err = SourcePixels::new(2, 2, vec![0u8; 15]).unwrap_err();
        assert!(err.message().contains("needs 16 bytes"));
    }

    #[test]
    fn filled_pixels_repeat_color() {
        let px = SourcePixels::filled(2, 1, [9, 8, 7, 6]);
        assert_eq!(px.bytes(), &[9, 8, 7, 6, 9, 8, 7, 6]);
        assert_eq!(px.byte_size(), 8);
    }

    #[test]
    fn dropped_completion_reports_error() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let completion = LoadCompletion::new(SourceId::default(), 7, tx);
        drop(completion);
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.ticket, 7);
        assert!(msg.result.is_err());
    }

    #[test]
    fn abandoned_completion_is_silent() {
        let (tx, rx) = crossbeam_channel::unbounded();
        LoadCompletion::new(SourceId::default(), 1, tx).abandon();
        assert!(rx.try_recv().is_err());
    }
}
