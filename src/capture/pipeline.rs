//! The seek/capture state machine.
//!
//! One capture runs as one task and walks
//! `AwaitingMetadata -> AwaitingSeek(0) -> Encoding(0) -> AwaitingSeek(1) -> ... -> Done`.
//! Every step is a single awaited future, so at most one seek or encode is
//! outstanding and records are appended in seek order. Captures on the same
//! session queue on its capture slot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::{CaptureProgressPayload, CaptureStage, ResultHandle, ThumbnailOptions, ThumbnailRecord};
use crate::blob::BlobRegistry;
use crate::error::ThumbnailError;
use crate::media::{LoadState, MediaElement, MediaEvent, MediaSession, Surface, SurfaceFactory};
use crate::scale::{Size, scale};
use crate::single_flight::SingleFlight;

pub(crate) type CaptureOutcome = Result<Vec<ThumbnailRecord>, ThumbnailError>;

pub(crate) type ProgressEmit = Arc<dyn Fn(CaptureProgressPayload) + Send + Sync>;

pub(crate) struct CaptureRequest {
    pub count: usize,
    pub options: ThumbnailOptions,
    pub progress: Option<ProgressEmit>,
}

struct CaptureContext {
    session: MediaSession,
    surfaces: Arc<dyn SurfaceFactory>,
    registry: Arc<dyn BlobRegistry>,
    results: ResultHandle,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl CaptureContext {
    /// Runs one step, bounded by the optional timeout and aborted by cancellation.
    async fn step<T>(
        &self,
        stage: CaptureStage,
        fut: impl Future<Output = Result<T, ThumbnailError>>,
    ) -> Result<T, ThumbnailError> {
        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => {
                        log::warn!(
                            target: "video_thumbnails::pipeline",
                            "timed out after {:?} while {}",
                            limit,
                            stage
                        );
                        Err(ThumbnailError::Timeout {
                            stage,
                            after: limit,
                        })
                    }
                },
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ThumbnailError::aborted()),
            result = bounded => result,
        }
    }
}

/// Per-capture state fixed once metadata is known.
struct CaptureJob {
    planned_count: usize,
    step_seconds: f64,
    output_size: Size,
    surface: Box<dyn Surface>,
}

impl CaptureJob {
    fn prepare(
        ctx: &CaptureContext,
        request: &CaptureRequest,
        duration: f64,
    ) -> Result<Self, ThumbnailError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(ThumbnailError::InvalidDuration(duration));
        }
        let media = ctx.session.media();
        let output_size = scale(
            media.video_width(),
            media.video_height(),
            request.options.effective_width(),
            request.options.effective_height(),
        );
        if output_size.is_empty() {
            return Err(ThumbnailError::InvalidSize {
                width: output_size.width,
                height: output_size.height,
            });
        }
        let surface = ctx.surfaces.create_surface(output_size)?;
        let step_seconds = duration / request.count as f64;
        log::info!(
            target: "video_thumbnails::pipeline",
            "capture prepared: count={}, duration={}, step={}, output={}x{}",
            request.count,
            duration,
            step_seconds,
            output_size.width,
            output_size.height
        );
        // Offsets are `i * D / n` for `i < n`, all inside the media when `D > 0`.
        let planned_count = if duration > 0.0 { request.count } else { 1 };
        Ok(Self {
            planned_count,
            step_seconds,
            output_size,
            surface,
        })
    }

    fn offset(&self, index: usize) -> f64 {
        index as f64 * self.step_seconds
    }

    fn next_index(&self, index: usize) -> Option<usize> {
        let next = index + 1;
        (next < self.planned_count).then_some(next)
    }
}

async fn wait_for_metadata(session: &MediaSession) -> Result<f64, ThumbnailError> {
    match session.load_state() {
        LoadState::Failed => return Err(session.load_error()),
        LoadState::Loaded => return Ok(session.duration()),
        LoadState::Pending => {
            session.begin_load()?;
        }
    }
    match session.wait_settled().await? {
        LoadState::Loaded => Ok(session.duration()),
        _ => Err(session.load_error()),
    }
}

async fn next_seeked(
    events: &mut broadcast::Receiver<MediaEvent>,
    media: &dyn MediaElement,
) -> Result<(), ThumbnailError> {
    loop {
        match events.recv().await {
            Ok(MediaEvent::Seeked) => return Ok(()),
            Ok(MediaEvent::Error(info)) => return Err(ThumbnailError::media_load(&info)),
            Ok(MediaEvent::LoadedMetadata) => continue,
            Err(RecvError::Lagged(skipped)) => {
                log::warn!(
                    target: "video_thumbnails::pipeline",
                    "capture lagged, skipped {} media events",
                    skipped
                );
                // The settle signal may have been among them.
                if let Some(info) = media.error() {
                    return Err(ThumbnailError::media_load(&info));
                }
                if !media.seeking() {
                    return Ok(());
                }
            }
            Err(RecvError::Closed) => return Err(ThumbnailError::MediaClosed),
        }
    }
}

async fn run_capture(
    ctx: &CaptureContext,
    request: &CaptureRequest,
) -> Result<Vec<ThumbnailRecord>, ThumbnailError> {
    let _slot = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(ThumbnailError::aborted()),
        slot = ctx.session.acquire_capture_slot() => slot,
    };
    // Listen before the source is assigned or the first seek issued so no
    // settle event is missed.
    let mut events = ctx.session.media().subscribe();

    let duration = ctx
        .step(CaptureStage::AwaitingMetadata, wait_for_metadata(&ctx.session))
        .await?;
    let mut job = CaptureJob::prepare(ctx, request, duration)?;
    let planned = job.planned_count;
    let mut captured = Vec::new();

    ctx.session.seek(0.0)?;
    let mut stage = CaptureStage::AwaitingSeek(0);
    loop {
        stage = match stage {
            CaptureStage::AwaitingSeek(index) => {
                ctx.step(stage, next_seeked(&mut events, ctx.session.media().as_ref()))
                    .await?;
                job.surface.draw_frame(ctx.session.media().as_ref())?;
                log::debug!(
                    target: "video_thumbnails::pipeline",
                    "frame {} drawn at {}x{}",
                    index,
                    job.output_size.width,
                    job.output_size.height
                );
                CaptureStage::Encoding(index)
            }
            CaptureStage::Encoding(index) => {
                let image = ctx.step(stage, job.surface.encode()).await?;
                let url = ctx.registry.create_object_url(image)?;
                let record = ThumbnailRecord {
                    time: job.offset(index),
                    url,
                };
                log::debug!(
                    target: "video_thumbnails::pipeline",
                    "frame {} recorded: time={}, url={}",
                    index,
                    record.time,
                    record.url
                );
                ctx.results.push(record.clone());
                captured.push(record);
                if let Some(emit) = &request.progress {
                    emit(CaptureProgressPayload {
                        progress: captured.len() as f64 / planned as f64,
                        captured: captured.len(),
                        total: planned,
                        time: job.offset(index),
                    });
                }
                match job.next_index(index) {
                    Some(next) => {
                        ctx.session.seek(job.offset(next))?;
                        CaptureStage::AwaitingSeek(next)
                    }
                    None => CaptureStage::Done,
                }
            }
            CaptureStage::AwaitingMetadata | CaptureStage::Done => break,
        };
    }
    Ok(captured)
}

/// Fires `Aborted` through the completion guard if the capture task is dropped
/// before it reports, e.g. on runtime shutdown or panic.
struct CompletionGuard {
    finish: SingleFlight<CaptureOutcome, ()>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.finish.call(Err(ThumbnailError::aborted()));
    }
}

/// Spawns a capture on the session's runtime. `complete` runs exactly once.
pub(crate) fn spawn_capture(
    session: &MediaSession,
    surfaces: Arc<dyn SurfaceFactory>,
    registry: Arc<dyn BlobRegistry>,
    request: CaptureRequest,
    complete: impl FnOnce(CaptureOutcome) + Send + 'static,
) -> (ResultHandle, CancellationToken) {
    let results = ResultHandle::new(Arc::clone(&registry));
    let cancel = session.child_token();
    let ctx = CaptureContext {
        session: session.clone(),
        surfaces,
        registry,
        results: results.clone(),
        cancel: cancel.clone(),
        timeout: request.options.effective_timeout(),
    };
    let guard = CompletionGuard {
        finish: SingleFlight::new(complete),
    };
    log::info!(
        target: "video_thumbnails::pipeline",
        "capture requested: source={}, count={}",
        session.source_url(),
        request.count
    );
    session.runtime().spawn(async move {
        let outcome = match run_capture(&ctx, &request).await {
            // A destroy can land between steps; report it the same way as one
            // that interrupts a step.
            Err(_) if ctx.cancel.is_cancelled() => Err(ThumbnailError::aborted()),
            outcome => outcome,
        };
        match &outcome {
            Ok(records) => log::info!(
                target: "video_thumbnails::pipeline",
                "capture complete: {} thumbnails",
                records.len()
            ),
            Err(e) if e.is_aborted() => log::info!(
                target: "video_thumbnails::pipeline",
                "capture aborted after {} thumbnails",
                ctx.results.len()
            ),
            Err(e) => log::error!(
                target: "video_thumbnails::pipeline",
                "capture failed after {} thumbnails: {}",
                ctx.results.len(),
                e
            ),
        }
        guard.finish.call(outcome);
    });
    (results, cancel)
}
