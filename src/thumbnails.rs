//! Public entry point: one video source, any number of capture requests.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::blob::BlobRegistry;
use crate::capture::pipeline::{CaptureRequest, ProgressEmit, spawn_capture};
use crate::capture::{
    CaptureProgressPayload, ResultHandle, ThumbnailJob, ThumbnailOptions, ThumbnailRecord,
};
use crate::error::ThumbnailError;
use crate::media::{LoadState, MediaElement, MediaSession, SurfaceFactory};

/// The external collaborators a capture needs.
#[derive(Clone)]
pub struct MediaBackend {
    pub media: Arc<dyn MediaElement>,
    pub surfaces: Arc<dyn SurfaceFactory>,
    pub registry: Arc<dyn BlobRegistry>,
}

/// Creates a thumbnail source for `source_url`. The source is not loaded until
/// the first capture request.
///
/// Must be called from within a Tokio runtime.
pub fn create_video_thumbnails(
    source_url: impl Into<String>,
    options: ThumbnailOptions,
    backend: MediaBackend,
) -> Result<VideoThumbnails, ThumbnailError> {
    let session = MediaSession::create(source_url, options.size_hints(), backend.media)?;
    Ok(VideoThumbnails {
        session,
        surfaces: backend.surfaces,
        registry: backend.registry,
        options,
    })
}

/// Thumbnail source bound to one media session.
///
/// Captures on the same source run one after another. Dropping the value
/// destroys the session if [`VideoThumbnails::destroy`] was not called.
pub struct VideoThumbnails {
    session: MediaSession,
    surfaces: Arc<dyn SurfaceFactory>,
    registry: Arc<dyn BlobRegistry>,
    options: ThumbnailOptions,
}

impl VideoThumbnails {
    /// Callback form of [`VideoThumbnails::capture`].
    ///
    /// `callback` runs exactly once with the records or an error, except after
    /// [`VideoThumbnails::destroy`]: then nothing runs and an empty handle is
    /// returned. A zero `count` reports `InvalidCount` before returning.
    pub fn make<F>(&self, count: usize, callback: F) -> ResultHandle
    where
        F: FnOnce(Result<Vec<ThumbnailRecord>, ThumbnailError>) + Send + 'static,
    {
        if self.session.is_destroyed() {
            log::warn!(
                target: "video_thumbnails::pipeline",
                "make({}) ignored: session for {} is destroyed",
                count,
                self.session.source_url()
            );
            return ResultHandle::new(Arc::clone(&self.registry));
        }
        if count == 0 {
            callback(Err(ThumbnailError::InvalidCount(count)));
            return ResultHandle::new(Arc::clone(&self.registry));
        }
        let (results, _cancel) = spawn_capture(
            &self.session,
            Arc::clone(&self.surfaces),
            Arc::clone(&self.registry),
            self.request(count, None),
            callback,
        );
        results
    }

    /// Starts capturing `count` evenly spaced thumbnails.
    pub fn capture(&self, count: usize) -> Result<ThumbnailJob, ThumbnailError> {
        self.start_job(count, None)
    }

    /// Like [`VideoThumbnails::capture`], calling `emit` after each recorded thumbnail.
    pub fn capture_with_progress(
        &self,
        count: usize,
        emit: impl Fn(CaptureProgressPayload) + Send + Sync + 'static,
    ) -> Result<ThumbnailJob, ThumbnailError> {
        self.start_job(count, Some(Arc::new(emit)))
    }

    /// Unloads the media and aborts running captures. Fails if already destroyed.
    pub fn destroy(&self) -> Result<(), ThumbnailError> {
        self.session.destroy()
    }

    pub fn is_destroyed(&self) -> bool {
        self.session.is_destroyed()
    }

    pub fn load_state(&self) -> LoadState {
        self.session.load_state()
    }

    pub fn duration(&self) -> f64 {
        self.session.duration()
    }

    pub fn source_url(&self) -> &str {
        self.session.source_url()
    }

    pub fn options(&self) -> &ThumbnailOptions {
        &self.options
    }

    pub fn session(&self) -> &MediaSession {
        &self.session
    }

    fn start_job(
        &self,
        count: usize,
        progress: Option<ProgressEmit>,
    ) -> Result<ThumbnailJob, ThumbnailError> {
        if self.session.is_destroyed() {
            return Err(ThumbnailError::SessionDestroyed);
        }
        if count == 0 {
            return Err(ThumbnailError::InvalidCount(count));
        }
        let (tx, rx) = oneshot::channel();
        let (results, cancel) = spawn_capture(
            &self.session,
            Arc::clone(&self.surfaces),
            Arc::clone(&self.registry),
            self.request(count, progress),
            move |outcome| {
                let _ = tx.send(outcome);
            },
        );
        Ok(ThumbnailJob::new(results, rx, cancel))
    }

    fn request(&self, count: usize, progress: Option<ProgressEmit>) -> CaptureRequest {
        CaptureRequest {
            count,
            options: self.options.clone(),
            progress,
        }
    }
}

impl Drop for VideoThumbnails {
    fn drop(&mut self) {
        if !self.session.is_destroyed() {
            let _ = self.session.destroy();
        }
    }
}

impl std::fmt::Debug for VideoThumbnails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoThumbnails")
            .field("session", &self.session)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    use super::{MediaBackend, VideoThumbnails, create_video_thumbnails};
    use crate::blob::MemoryBlobRegistry;
    use crate::capture::ThumbnailOptions;
    use crate::error::ThumbnailError;
    use crate::media::{LoadState, MediaErrorInfo};
    use crate::test_support::{EncodeScript, ScriptedSurfaces, ScriptedVideo, drain_tasks};

    fn thumbnails(
        video: ScriptedVideo,
        surfaces: ScriptedSurfaces,
        options: ThumbnailOptions,
    ) -> (VideoThumbnails, Arc<ScriptedVideo>, Arc<MemoryBlobRegistry>) {
        let video = Arc::new(video);
        let registry = Arc::new(MemoryBlobRegistry::new());
        let backend = MediaBackend {
            media: video.clone(),
            surfaces: Arc::new(surfaces),
            registry: registry.clone(),
        };
        let thumbs = create_video_thumbnails("movie.webm", options, backend).expect("create");
        (thumbs, video, registry)
    }

    #[tokio::test]
    async fn make_invokes_callback_once_with_records() {
        let (thumbs, video, _registry) = thumbnails(
            ScriptedVideo::new(12.0, 640, 360),
            ScriptedSurfaces::default(),
            ThumbnailOptions::default(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (tx, rx) = oneshot::channel();

        let handle = thumbs.make(3, move |outcome| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(outcome);
        });
        let records = rx.await.expect("callback").expect("records");
        drain_tasks().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(records.iter().map(|r| r.time).collect::<Vec<_>>(), vec![0.0, 4.0, 8.0]);
        assert_eq!(handle.records(), records);
        assert_eq!(video.source_assignments(), 1);
        assert_eq!(thumbs.load_state(), LoadState::Loaded);
        assert_eq!(thumbs.duration(), 12.0);
    }

    #[tokio::test]
    async fn make_after_destroy_never_calls_back() {
        let (thumbs, video, _registry) = thumbnails(
            ScriptedVideo::new(12.0, 640, 360),
            ScriptedSurfaces::default(),
            ThumbnailOptions::default(),
        );
        thumbs.destroy().expect("destroy");
        let called = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&called);

        let handle = thumbs.make(3, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drain_tasks().await;

        assert!(handle.is_empty());
        assert_eq!(handle.release(), 0);
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(video.source_assignments(), 0);
    }

    #[tokio::test]
    async fn make_with_zero_count_reports_invalid_count() {
        let (thumbs, video, _registry) = thumbnails(
            ScriptedVideo::new(12.0, 640, 360),
            ScriptedSurfaces::default(),
            ThumbnailOptions::default(),
        );
        let seen: Arc<Mutex<Option<ThumbnailError>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        thumbs.make(0, move |outcome| {
            *sink.lock() = outcome.err();
        });

        assert!(matches!(
            *seen.lock(),
            Some(ThumbnailError::InvalidCount(0))
        ));
        assert_eq!(video.source_assignments(), 0);
    }

    #[tokio::test]
    async fn capture_rejects_misuse() {
        let (thumbs, _video, _registry) = thumbnails(
            ScriptedVideo::new(12.0, 640, 360),
            ScriptedSurfaces::default(),
            ThumbnailOptions::default(),
        );
        assert!(matches!(
            thumbs.capture(0),
            Err(ThumbnailError::InvalidCount(0))
        ));
        thumbs.destroy().expect("destroy");
        assert!(matches!(
            thumbs.capture(2),
            Err(ThumbnailError::SessionDestroyed)
        ));
        assert!(matches!(
            thumbs.destroy(),
            Err(ThumbnailError::SessionDestroyed)
        ));
    }

    #[tokio::test]
    async fn load_error_before_make_fails_without_seeking() {
        let (thumbs, video, _registry) = thumbnails(
            ScriptedVideo::new(12.0, 640, 360).manual_load(),
            ScriptedSurfaces::default(),
            ThumbnailOptions::default(),
        );
        video.emit_error(MediaErrorInfo::new(2, "network down"));
        drain_tasks().await;
        assert_eq!(thumbs.load_state(), LoadState::Failed);

        let (tx, rx) = oneshot::channel();
        let handle = thumbs.make(4, move |outcome| {
            let _ = tx.send(outcome);
        });
        let err = rx.await.expect("callback").expect_err("load error");

        assert!(matches!(err, ThumbnailError::MediaLoad { code: 2, .. }));
        assert!(handle.is_empty());
        assert!(video.seeks().is_empty());
        assert_eq!(video.source_assignments(), 0);
    }

    #[tokio::test]
    async fn concurrent_makes_are_serialized() {
        let (thumbs, video, _registry) = thumbnails(
            ScriptedVideo::new(6.0, 640, 360),
            ScriptedSurfaces::new(EncodeScript::Delayed(std::time::Duration::from_millis(2))),
            ThumbnailOptions::default(),
        );
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        thumbs.make(3, move |outcome| {
            let _ = tx_a.send(outcome);
        });
        thumbs.make(2, move |outcome| {
            let _ = tx_b.send(outcome);
        });

        let a = rx_a.await.expect("callback a").expect("records a");
        let b = rx_b.await.expect("callback b").expect("records b");

        assert_eq!(a.iter().map(|r| r.time).collect::<Vec<_>>(), vec![0.0, 2.0, 4.0]);
        assert_eq!(b.iter().map(|r| r.time).collect::<Vec<_>>(), vec![0.0, 3.0]);
        let seek_times: Vec<f64> = video.seeks().iter().map(|s| s.time).collect();
        assert_eq!(seek_times, vec![0.0, 2.0, 4.0, 0.0, 3.0]);
        assert_eq!(video.source_assignments(), 1);
    }

    #[tokio::test]
    async fn job_cancel_aborts_only_that_job() {
        let (thumbs, _video, _registry) = thumbnails(
            ScriptedVideo::new(6.0, 640, 360),
            ScriptedSurfaces::new(EncodeScript::Delayed(std::time::Duration::from_millis(20))),
            ThumbnailOptions::default(),
        );
        let first = thumbs.capture(3).expect("first");
        let second = thumbs.capture(2).expect("second");
        first.cancel();

        let err = first.await.expect_err("cancelled");
        assert!(err.is_aborted());
        let records = second.await.expect("second completes");
        assert_eq!(records.len(), 2);
        assert!(!thumbs.is_destroyed());
    }

    #[tokio::test]
    async fn drop_destroys_session() {
        let (thumbs, video, _registry) = thumbnails(
            ScriptedVideo::new(6.0, 640, 360),
            ScriptedSurfaces::default(),
            ThumbnailOptions::default(),
        );
        thumbs.capture(2).expect("job").await.expect("records");
        drop(thumbs);
        drain_tasks().await;

        assert_eq!(video.clear_count(), 1);
        assert_eq!(video.listener_count(), 0);
    }
}
