//! Boundary traits for the media element, the rasterization surface and their events.
//!
//! The crate never decodes video itself. A [`MediaElement`] owns decoding and
//! emits [`MediaEvent`]s on a broadcast channel; holding a receiver from
//! [`MediaElement::subscribe`] is a registered listener and dropping it
//! detaches the listener. A [`Surface`] grabs the element's current frame and
//! encodes it off the control flow.

pub mod session;

use tokio::sync::broadcast;

use crate::error::ThumbnailError;
use crate::scale::Size;

pub use session::{LoadState, MediaSession};

/// Native media error code space (HTML `MediaError`).
pub const MEDIA_ERR_ABORTED: u16 = 1;
pub const MEDIA_ERR_NETWORK: u16 = 2;
pub const MEDIA_ERR_DECODE: u16 = 3;
pub const MEDIA_ERR_SRC_NOT_SUPPORTED: u16 = 4;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MediaErrorInfo {
    pub code: u16,
    pub message: String,
}

impl MediaErrorInfo {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_name(&self) -> &'static str {
        match self.code {
            MEDIA_ERR_ABORTED => "aborted",
            MEDIA_ERR_NETWORK => "network",
            MEDIA_ERR_DECODE => "decode",
            MEDIA_ERR_SRC_NOT_SUPPORTED => "src_not_supported",
            _ => "unknown",
        }
    }
}

/// Signals emitted by a media element.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Duration and natural dimensions are known.
    LoadedMetadata,
    /// The element finished positioning after a seek request.
    Seeked,
    Error(MediaErrorInfo),
}

/// Width/height hints applied to the element at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeHints {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A decoding/rendering engine for one video resource.
pub trait MediaElement: Send + Sync + 'static {
    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;

    fn apply_size_hints(&self, hints: SizeHints);

    /// Assigns the source locator; loading starts and ends with
    /// `LoadedMetadata` or `Error`.
    fn set_source(&self, url: &str);

    fn clear_source(&self);

    /// Forces the element to re-run its load algorithm, releasing decoded data
    /// when no source is set.
    fn load(&self);

    /// Duration in seconds. Meaningful after `LoadedMetadata`.
    fn duration(&self) -> f64;

    /// True once duration and natural size are known (ready state at least
    /// `HAVE_METADATA`).
    fn has_metadata(&self) -> bool;

    /// True while a seek is outstanding.
    fn seeking(&self) -> bool;

    fn video_width(&self) -> u32;

    fn video_height(&self) -> u32;

    fn current_time(&self) -> f64;

    /// Generic seek; ends with `Seeked`.
    fn set_current_time(&self, time: f64);

    fn supports_fast_seek(&self) -> bool {
        false
    }

    /// Keyframe-oriented seek; ends with `Seeked`. Only called when
    /// [`MediaElement::supports_fast_seek`] returns true.
    fn fast_seek(&self, time: f64) {
        self.set_current_time(time);
    }

    fn error(&self) -> Option<MediaErrorInfo>;
}

/// Encoded raster image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// Off-screen pixel buffer of a fixed size.
#[async_trait::async_trait]
pub trait Surface: Send + Sync {
    fn size(&self) -> Size;

    /// Draws the element's current frame at (0, 0), scaled to [`Surface::size`].
    fn draw_frame(&mut self, media: &dyn MediaElement) -> Result<(), ThumbnailError>;

    async fn encode(&self) -> Result<EncodedImage, ThumbnailError>;
}

pub trait SurfaceFactory: Send + Sync + 'static {
    fn create_surface(&self, size: Size) -> Result<Box<dyn Surface>, ThumbnailError>;
}
