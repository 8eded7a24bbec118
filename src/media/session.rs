//! One media element plus its load/duration/error status.
//!
//! A background task listens for `LoadedMetadata` and `Error` from the moment
//! the session is created, so a load outcome is never missed even when no
//! capture is running. The source itself is assigned lazily by the first
//! capture request.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{OwnedMutexGuard, broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::{MediaElement, MediaErrorInfo, MediaEvent, SizeHints};
use crate::error::ThumbnailError;

/// Load status of a session. Leaves `Pending` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Pending,
    Loaded,
    Failed,
}

#[derive(Debug)]
struct SessionState {
    duration: f64,
    load_state: LoadState,
    last_error: Option<MediaErrorInfo>,
    destroyed: bool,
    source_assigned: bool,
}

struct SessionInner {
    media: Arc<dyn MediaElement>,
    source_url: String,
    runtime: Handle,
    state: Mutex<SessionState>,
    load_tx: watch::Sender<LoadState>,
    cancel: CancellationToken,
    capture_slot: Arc<tokio::sync::Mutex<()>>,
}

impl SessionInner {
    fn settle_loaded(&self) {
        let duration = self.media.duration();
        {
            let mut state = self.state.lock();
            if state.load_state != LoadState::Pending {
                return;
            }
            state.duration = duration;
            state.load_state = LoadState::Loaded;
        }
        log::info!(
            target: "video_thumbnails::session",
            "metadata loaded: source={}, duration={}, natural_size={}x{}",
            self.source_url,
            duration,
            self.media.video_width(),
            self.media.video_height()
        );
        self.load_tx.send_replace(LoadState::Loaded);
    }

    fn settle_failed(&self, info: MediaErrorInfo) {
        let settled = {
            let mut state = self.state.lock();
            state.last_error = Some(info.clone());
            if state.load_state == LoadState::Pending {
                state.load_state = LoadState::Failed;
                true
            } else {
                false
            }
        };
        log::error!(
            target: "video_thumbnails::session",
            "media error: source={}, code={} ({}), message={}",
            self.source_url,
            info.code,
            info.code_name(),
            info.message
        );
        if settled {
            self.load_tx.send_replace(LoadState::Failed);
        }
    }
}

impl SessionInner {
    /// Settles a pending load from the element's own state, for when the
    /// signal itself was dropped.
    fn recheck_load(&self) {
        if self.state.lock().load_state != LoadState::Pending {
            return;
        }
        if let Some(info) = self.media.error() {
            self.settle_failed(info);
        } else if self.media.has_metadata() {
            self.settle_loaded();
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn track_load(
    inner: Weak<SessionInner>,
    mut events: broadcast::Receiver<MediaEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(session) = inner.upgrade() else {
            break;
        };
        match event {
            Ok(MediaEvent::LoadedMetadata) => session.settle_loaded(),
            Ok(MediaEvent::Error(info)) => session.settle_failed(info),
            Ok(MediaEvent::Seeked) => {}
            Err(RecvError::Lagged(skipped)) => {
                log::warn!(
                    target: "video_thumbnails::session",
                    "load tracker lagged, skipped {} media events",
                    skipped
                );
                session.recheck_load();
            }
            Err(RecvError::Closed) => break,
        }
    }
    log::debug!(
        target: "video_thumbnails::session",
        "load tracker stopped"
    );
}

/// Shared handle to one media element. Clones refer to the same session.
#[derive(Clone)]
pub struct MediaSession {
    inner: Arc<SessionInner>,
}

impl MediaSession {
    /// Applies the size hints and starts listening for load signals. The source
    /// is not assigned until [`MediaSession::begin_load`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(
        source_url: impl Into<String>,
        hints: SizeHints,
        media: Arc<dyn MediaElement>,
    ) -> Result<Self, ThumbnailError> {
        let runtime = Handle::try_current().map_err(|e| ThumbnailError::NoRuntime(e.to_string()))?;
        media.apply_size_hints(hints);
        let events = media.subscribe();
        let (load_tx, _) = watch::channel(LoadState::Pending);
        let inner = Arc::new(SessionInner {
            media,
            source_url: source_url.into(),
            runtime,
            state: Mutex::new(SessionState {
                duration: 0.0,
                load_state: LoadState::Pending,
                last_error: None,
                destroyed: false,
                source_assigned: false,
            }),
            load_tx,
            cancel: CancellationToken::new(),
            capture_slot: Arc::new(tokio::sync::Mutex::new(())),
        });
        inner.runtime.spawn(track_load(
            Arc::downgrade(&inner),
            events,
            inner.cancel.clone(),
        ));
        log::debug!(
            target: "video_thumbnails::session",
            "session created: source={}, hints={:?}",
            inner.source_url,
            hints
        );
        Ok(Self { inner })
    }

    pub fn source_url(&self) -> &str {
        &self.inner.source_url
    }

    pub fn media(&self) -> &Arc<dyn MediaElement> {
        &self.inner.media
    }

    pub fn load_state(&self) -> LoadState {
        self.inner.state.lock().load_state
    }

    /// Duration captured when metadata loaded; 0 before that.
    pub fn duration(&self) -> f64 {
        self.inner.state.lock().duration
    }

    pub fn last_error(&self) -> Option<MediaErrorInfo> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Assigns the source on first call. Returns whether this call assigned it.
    pub fn begin_load(&self) -> Result<bool, ThumbnailError> {
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return Err(ThumbnailError::SessionDestroyed);
            }
            if state.source_assigned {
                return Ok(false);
            }
            state.source_assigned = true;
        }
        log::info!(
            target: "video_thumbnails::session",
            "assigning source: {}",
            self.inner.source_url
        );
        self.inner.media.set_source(&self.inner.source_url);
        Ok(true)
    }

    /// Resolves once the load state leaves `Pending`.
    pub async fn wait_settled(&self) -> Result<LoadState, ThumbnailError> {
        let mut rx = self.inner.load_tx.subscribe();
        let state = rx
            .wait_for(|s| *s != LoadState::Pending)
            .await
            .map_err(|_| ThumbnailError::MediaClosed)?;
        Ok(*state)
    }

    /// Error for a failed load, preferring the signalled error over the
    /// element's current one.
    pub fn load_error(&self) -> ThumbnailError {
        let info = self
            .last_error()
            .or_else(|| self.inner.media.error())
            .unwrap_or_else(|| MediaErrorInfo::new(0, "unknown media error"));
        ThumbnailError::media_load(&info)
    }

    /// Requests the frame nearest `time`. Completion is signalled by
    /// `MediaEvent::Seeked`.
    pub fn seek(&self, time: f64) -> Result<(), ThumbnailError> {
        if !time.is_finite() || time < 0.0 {
            return Err(ThumbnailError::InvalidOffset(time));
        }
        if self.is_destroyed() {
            return Err(ThumbnailError::SessionDestroyed);
        }
        let media = &self.inner.media;
        if media.supports_fast_seek() {
            log::debug!(target: "video_thumbnails::session", "fast seek to {}", time);
            media.fast_seek(time);
        } else {
            log::debug!(target: "video_thumbnails::session", "seek to {}", time);
            media.set_current_time(time);
        }
        Ok(())
    }

    /// Stops listening, clears the source and forces an unload. Every capture
    /// still running on this session resolves with `Aborted`.
    ///
    /// A second call returns `SessionDestroyed` and does nothing.
    pub fn destroy(&self) -> Result<(), ThumbnailError> {
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return Err(ThumbnailError::SessionDestroyed);
            }
            state.destroyed = true;
        }
        self.inner.cancel.cancel();
        self.inner.media.clear_source();
        self.inner.media.load();
        log::info!(
            target: "video_thumbnails::session",
            "session destroyed: source={}",
            self.inner.source_url
        );
        Ok(())
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Token cancelled by [`MediaSession::destroy`] or by cancelling the child itself.
    pub(crate) fn child_token(&self) -> CancellationToken {
        self.inner.cancel.child_token()
    }

    /// Waits for exclusive use of the element's playback position.
    pub(crate) async fn acquire_capture_slot(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.inner.capture_slot).lock_owned().await
    }
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("source_url", &self.inner.source_url)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}
