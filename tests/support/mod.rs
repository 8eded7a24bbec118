#![allow(dead_code)]

use std::sync::Arc;

use video_thumbnails::test_support::{ScriptedSurfaces, ScriptedVideo};
use video_thumbnails::{
    BlobRegistry, MediaBackend, ThumbnailOptions, VideoThumbnails, create_video_thumbnails,
};

pub struct Fixture {
    pub thumbs: VideoThumbnails,
    pub video: Arc<ScriptedVideo>,
    pub surfaces: ScriptedSurfaces,
}

pub fn fixture(
    video: ScriptedVideo,
    surfaces: ScriptedSurfaces,
    registry: Arc<dyn BlobRegistry>,
    options: ThumbnailOptions,
) -> Fixture {
    let _ = video_thumbnails::logging::init_logger();
    let video = Arc::new(video);
    let backend = MediaBackend {
        media: video.clone(),
        surfaces: Arc::new(surfaces.clone()),
        registry,
    };
    let thumbs = create_video_thumbnails("https://cdn.example.com/trailer.mp4", options, backend)
        .expect("create thumbnails");
    Fixture {
        thumbs,
        video,
        surfaces,
    }
}

pub fn times(records: &[video_thumbnails::ThumbnailRecord]) -> Vec<f64> {
    records.iter().map(|r| r.time).collect()
}

/// Lets spawned tasks on the current-thread test runtime run to their next await.
pub async fn settle() {
    video_thumbnails::test_support::drain_tasks().await;
}
