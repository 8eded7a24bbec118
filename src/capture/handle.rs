use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::ThumbnailRecord;
use super::pipeline::CaptureOutcome;
use crate::blob::BlobRegistry;
use crate::error::ThumbnailError;

struct ResultInner {
    records: Mutex<Vec<ThumbnailRecord>>,
    registry: Arc<dyn BlobRegistry>,
}

/// Records accumulated by one capture, in increasing time order.
///
/// Filled while the capture runs; [`ResultHandle::release`] revokes every
/// handle recorded so far, including partial results of a failed capture.
#[derive(Clone)]
pub struct ResultHandle {
    inner: Arc<ResultInner>,
}

impl ResultHandle {
    pub(crate) fn new(registry: Arc<dyn BlobRegistry>) -> Self {
        Self {
            inner: Arc::new(ResultInner {
                records: Mutex::new(Vec::new()),
                registry,
            }),
        }
    }

    pub(crate) fn push(&self, record: ThumbnailRecord) {
        self.inner.records.lock().push(record);
    }

    pub fn records(&self) -> Vec<ThumbnailRecord> {
        self.inner.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.lock().is_empty()
    }

    /// Revokes every recorded handle and forgets the records. Returns how many
    /// were released; releasing again only covers records added since.
    pub fn release(&self) -> usize {
        let released = std::mem::take(&mut *self.inner.records.lock());
        for record in &released {
            self.inner.registry.revoke_object_url(&record.url);
        }
        if !released.is_empty() {
            log::debug!(
                target: "video_thumbnails::pipeline",
                "released {} thumbnails",
                released.len()
            );
        }
        released.len()
    }
}

impl std::fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle")
            .field("records", &*self.inner.records.lock())
            .finish()
    }
}

/// A running capture that resolves exactly once.
///
/// Await it (or call [`ThumbnailJob::wait`]) for the ordered records.
/// Clone [`ThumbnailJob::results`] first if the handles need releasing later.
pub struct ThumbnailJob {
    results: ResultHandle,
    outcome: oneshot::Receiver<CaptureOutcome>,
    cancel: CancellationToken,
}

impl ThumbnailJob {
    pub(crate) fn new(
        results: ResultHandle,
        outcome: oneshot::Receiver<CaptureOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            results,
            outcome,
            cancel,
        }
    }

    pub fn results(&self) -> &ResultHandle {
        &self.results
    }

    /// Stops this capture at its next step; it resolves with `Aborted`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<Vec<ThumbnailRecord>, ThumbnailError> {
        self.outcome
            .await
            .unwrap_or_else(|_| Err(ThumbnailError::aborted()))
    }
}

impl IntoFuture for ThumbnailJob {
    type Output = Result<Vec<ThumbnailRecord>, ThumbnailError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl std::fmt::Debug for ThumbnailJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailJob")
            .field("results", &self.results)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
