//! Scripted media backend for unit and integration tests.
//!
//! `ScriptedVideo` plays the role of a media element: it emits metadata,
//! seek and error events according to its script and records every call.
//! `ScriptedSurfaces` hands out surfaces that "encode" the drawn frame's
//! time and size as text, and tracks encode concurrency.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::ThumbnailError;
use crate::media::{
    EncodedImage, MediaElement, MediaErrorInfo, MediaEvent, SizeHints, Surface, SurfaceFactory,
};
use crate::scale::Size;

const EVENT_CAPACITY: usize = 64;

/// Lets spawned tasks on the current-thread test runtime run to their next await.
pub async fn drain_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadScript {
    /// `set_source` emits `LoadedMetadata`.
    Metadata,
    /// `set_source` emits `Error`.
    Fail(MediaErrorInfo),
    /// Nothing is emitted; the test calls `emit_loaded`.
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeekScript {
    Settle,
    Stall,
    /// Seek number `n` (0-based) emits `Error` instead of `Seeked`.
    FailAt(usize, MediaErrorInfo),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekCall {
    pub time: f64,
    pub fast: bool,
}

#[derive(Debug)]
struct VideoState {
    duration: f64,
    width: u32,
    height: u32,
    current_time: f64,
    source: Option<String>,
    source_assignments: usize,
    clear_count: usize,
    load_count: usize,
    hints: Option<SizeHints>,
    seeks: Vec<SeekCall>,
    fast_seek: bool,
    load_script: LoadScript,
    seek_script: SeekScript,
    error: Option<MediaErrorInfo>,
    has_metadata: bool,
    seeking: bool,
}

pub struct ScriptedVideo {
    events: broadcast::Sender<MediaEvent>,
    state: Mutex<VideoState>,
}

impl ScriptedVideo {
    pub fn new(duration: f64, width: u32, height: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            state: Mutex::new(VideoState {
                duration,
                width,
                height,
                current_time: 0.0,
                source: None,
                source_assignments: 0,
                clear_count: 0,
                load_count: 0,
                hints: None,
                seeks: Vec::new(),
                fast_seek: false,
                load_script: LoadScript::Metadata,
                seek_script: SeekScript::Settle,
                error: None,
                has_metadata: false,
                seeking: false,
            }),
        }
    }

    pub fn with_fast_seek(self) -> Self {
        self.state.lock().fast_seek = true;
        self
    }

    pub fn failing_load(self, info: MediaErrorInfo) -> Self {
        self.state.lock().load_script = LoadScript::Fail(info);
        self
    }

    pub fn manual_load(self) -> Self {
        self.state.lock().load_script = LoadScript::Manual;
        self
    }

    pub fn stalling_seeks(self) -> Self {
        self.state.lock().seek_script = SeekScript::Stall;
        self
    }

    pub fn failing_seek_at(self, index: usize, info: MediaErrorInfo) -> Self {
        self.state.lock().seek_script = SeekScript::FailAt(index, info);
        self
    }

    /// Updates the element state the event implies, then broadcasts it.
    pub fn emit(&self, event: MediaEvent) {
        {
            let mut state = self.state.lock();
            match &event {
                MediaEvent::LoadedMetadata => state.has_metadata = true,
                MediaEvent::Seeked => state.seeking = false,
                MediaEvent::Error(info) => {
                    state.error = Some(info.clone());
                    state.seeking = false;
                }
            }
        }
        let _ = self.events.send(event);
    }

    /// Broadcasts `event` `times` times without touching element state, so
    /// slow listeners overflow.
    pub fn flood(&self, event: MediaEvent, times: usize) {
        for _ in 0..times {
            let _ = self.events.send(event.clone());
        }
    }

    /// Marks metadata as loaded without emitting `LoadedMetadata`.
    pub fn load_metadata_silently(&self) {
        self.state.lock().has_metadata = true;
    }

    /// Finishes the outstanding seek without emitting `Seeked`.
    pub fn settle_seek_silently(&self) {
        self.state.lock().seeking = false;
    }

    pub fn emit_loaded(&self) {
        self.emit(MediaEvent::LoadedMetadata);
    }

    pub fn emit_error(&self, info: MediaErrorInfo) {
        self.emit(MediaEvent::Error(info));
    }

    pub fn seeks(&self) -> Vec<SeekCall> {
        self.state.lock().seeks.clone()
    }

    pub fn source(&self) -> Option<String> {
        self.state.lock().source.clone()
    }

    pub fn source_assignments(&self) -> usize {
        self.state.lock().source_assignments
    }

    pub fn clear_count(&self) -> usize {
        self.state.lock().clear_count
    }

    pub fn load_count(&self) -> usize {
        self.state.lock().load_count
    }

    pub fn hints(&self) -> Option<SizeHints> {
        self.state.lock().hints
    }

    pub fn current_time_value(&self) -> f64 {
        self.state.lock().current_time
    }

    /// Number of live event receivers, i.e. attached listeners.
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn record_seek(&self, time: f64, fast: bool) {
        let event = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let index = state.seeks.len();
            state.seeks.push(SeekCall { time, fast });
            state.current_time = time;
            state.seeking = true;
            match &state.seek_script {
                SeekScript::Settle => Some(MediaEvent::Seeked),
                SeekScript::Stall => None,
                SeekScript::FailAt(at, info) if *at == index => {
                    state.error = Some(info.clone());
                    Some(MediaEvent::Error(info.clone()))
                }
                SeekScript::FailAt(..) => Some(MediaEvent::Seeked),
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }
}

impl MediaElement for ScriptedVideo {
    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }

    fn apply_size_hints(&self, hints: SizeHints) {
        self.state.lock().hints = Some(hints);
    }

    fn set_source(&self, url: &str) {
        let event = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.source = Some(url.to_string());
            state.source_assignments += 1;
            match &state.load_script {
                LoadScript::Metadata => Some(MediaEvent::LoadedMetadata),
                LoadScript::Fail(info) => {
                    state.error = Some(info.clone());
                    Some(MediaEvent::Error(info.clone()))
                }
                LoadScript::Manual => None,
            }
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }

    fn clear_source(&self) {
        let mut state = self.state.lock();
        state.source = None;
        state.clear_count += 1;
    }

    fn load(&self) {
        self.state.lock().load_count += 1;
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn has_metadata(&self) -> bool {
        self.state.lock().has_metadata
    }

    fn seeking(&self) -> bool {
        self.state.lock().seeking
    }

    fn video_width(&self) -> u32 {
        self.state.lock().width
    }

    fn video_height(&self) -> u32 {
        self.state.lock().height
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, time: f64) {
        self.record_seek(time, false);
    }

    fn supports_fast_seek(&self) -> bool {
        self.state.lock().fast_seek
    }

    fn fast_seek(&self, time: f64) {
        self.record_seek(time, true);
    }

    fn error(&self) -> Option<MediaErrorInfo> {
        self.state.lock().error.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EncodeScript {
    Immediate,
    Delayed(Duration),
    Stall,
    /// Encode number `n` (0-based) fails.
    FailAt(usize),
}

#[derive(Debug)]
struct SurfaceLog {
    created: Mutex<Vec<Size>>,
    draws: Mutex<Vec<f64>>,
    encodes_started: AtomicUsize,
    encodes_finished: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    script: Mutex<EncodeScript>,
}

/// Surface factory whose surfaces record every draw and encode.
#[derive(Debug, Clone)]
pub struct ScriptedSurfaces {
    log: Arc<SurfaceLog>,
}

impl Default for ScriptedSurfaces {
    fn default() -> Self {
        Self::new(EncodeScript::Immediate)
    }
}

impl ScriptedSurfaces {
    pub fn new(script: EncodeScript) -> Self {
        Self {
            log: Arc::new(SurfaceLog {
                created: Mutex::new(Vec::new()),
                draws: Mutex::new(Vec::new()),
                encodes_started: AtomicUsize::new(0),
                encodes_finished: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                script: Mutex::new(script),
            }),
        }
    }

    pub fn created(&self) -> Vec<Size> {
        self.log.created.lock().clone()
    }

    /// Media times at which frames were drawn, in order.
    pub fn draws(&self) -> Vec<f64> {
        self.log.draws.lock().clone()
    }

    pub fn encodes_started(&self) -> usize {
        self.log.encodes_started.load(Ordering::SeqCst)
    }

    pub fn encodes_finished(&self) -> usize {
        self.log.encodes_finished.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_encodes(&self) -> usize {
        self.log.max_in_flight.load(Ordering::SeqCst)
    }
}

impl SurfaceFactory for ScriptedSurfaces {
    fn create_surface(&self, size: Size) -> Result<Box<dyn Surface>, ThumbnailError> {
        self.log.created.lock().push(size);
        Ok(Box::new(ScriptedSurface {
            size,
            frame_time: None,
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedSurface {
    size: Size,
    frame_time: Option<f64>,
    log: Arc<SurfaceLog>,
}

#[async_trait::async_trait]
impl Surface for ScriptedSurface {
    fn size(&self) -> Size {
        self.size
    }

    fn draw_frame(&mut self, media: &dyn MediaElement) -> Result<(), ThumbnailError> {
        let time = media.current_time();
        self.frame_time = Some(time);
        self.log.draws.lock().push(time);
        Ok(())
    }

    async fn encode(&self) -> Result<EncodedImage, ThumbnailError> {
        let Some(time) = self.frame_time else {
            return Err(ThumbnailError::Encode("nothing drawn".into()));
        };
        let index = self.log.encodes_started.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let script = self.log.script.lock().clone();
        let result = match script {
            EncodeScript::Immediate => Ok(()),
            EncodeScript::Delayed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            EncodeScript::Stall => std::future::pending().await,
            EncodeScript::FailAt(at) if at == index => {
                Err(ThumbnailError::Encode(format!("encoder rejected frame {}", index)))
            }
            EncodeScript::FailAt(_) => Ok(()),
        };

        self.log.in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;
        self.log.encodes_finished.fetch_add(1, Ordering::SeqCst);
        let text = format!("{}x{}@{:.3}", self.size.width, self.size.height, time);
        Ok(EncodedImage::new(text.into_bytes(), "image/png"))
    }
}
