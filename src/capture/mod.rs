//! Thumbnail capture: options, records and the seek/capture pipeline.

mod handle;
pub(crate) mod pipeline;

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::media::SizeHints;

pub use handle::{ResultHandle, ThumbnailJob};

/// One captured frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailRecord {
    /// Seek offset in seconds.
    pub time: f64,
    /// Handle issued by the blob registry.
    pub url: String,
}

/// Progress payload emitted after each recorded thumbnail.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureProgressPayload {
    /// Fraction of planned captures recorded, in [0, 1].
    pub progress: f64,
    pub captured: usize,
    pub total: usize,
    /// Time of the thumbnail just recorded.
    pub time: f64,
}

/// Where a capture is in its lifecycle. Used in logs and timeout errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    AwaitingMetadata,
    AwaitingSeek(usize),
    Encoding(usize),
    Done,
}

impl fmt::Display for CaptureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStage::AwaitingMetadata => write!(f, "waiting for metadata"),
            CaptureStage::AwaitingSeek(i) => write!(f, "waiting for seek #{}", i),
            CaptureStage::Encoding(i) => write!(f, "encoding frame #{}", i),
            CaptureStage::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailOptions {
    /// Desired output width; also applied to the media element as a size hint.
    pub width: Option<u32>,
    /// Desired output height; also applied to the media element as a size hint.
    pub height: Option<u32>,
    /// Per-step stall limit in milliseconds (metadata, each seek, each encode).
    /// Unset waits forever.
    pub timeout_ms: Option<u64>,
}

impl ThumbnailOptions {
    pub fn effective_width(&self) -> Option<u32> {
        self.width.filter(|&w| w > 0)
    }

    pub fn effective_height(&self) -> Option<u32> {
        self.height.filter(|&h| h > 0)
    }

    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }

    pub fn size_hints(&self) -> SizeHints {
        SizeHints {
            width: self.effective_width(),
            height: self.effective_height(),
        }
    }
}
