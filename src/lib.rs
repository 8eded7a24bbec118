pub mod blob;
pub mod capture;
pub mod error;
pub mod logging;
pub mod media;
pub mod scale;
pub mod single_flight;
#[cfg(any(test, feature = "integration-test-api"))]
pub mod test_support;
mod thumbnails;

pub use blob::{BlobRegistry, MemoryBlobRegistry, TempDirBlobRegistry};
pub use capture::{
    CaptureProgressPayload, CaptureStage, ResultHandle, ThumbnailJob, ThumbnailOptions,
    ThumbnailRecord,
};
pub use error::ThumbnailError;
pub use media::{
    EncodedImage, LoadState, MediaElement, MediaErrorInfo, MediaEvent, MediaSession, SizeHints,
    Surface, SurfaceFactory,
};
pub use scale::{Size, scale};
pub use single_flight::SingleFlight;
pub use thumbnails::{MediaBackend, VideoThumbnails, create_video_thumbnails};
