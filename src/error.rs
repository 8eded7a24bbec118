//! Error type for thumbnail capture. Implements Display and Serialize for callers that
//! forward failures to a frontend.

use std::time::Duration;

use crate::capture::CaptureStage;
use crate::media::MediaErrorInfo;

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Media failed to load (code {code}): {message}")]
    MediaLoad { code: u16, message: String },

    #[error("Thumbnail count must be positive, got {0}")]
    InvalidCount(usize),

    #[error("Media reported an unusable duration: {0}")]
    InvalidDuration(f64),

    #[error("Seek offset must be finite and non-negative, got {0}")]
    InvalidOffset(f64),

    #[error("Output size {width}x{height} has an empty dimension")]
    InvalidSize { width: u32, height: u32 },

    #[error("Video session has been destroyed")]
    SessionDestroyed,

    #[error("Timed out after {after:?} while {stage}")]
    Timeout { stage: CaptureStage, after: Duration },

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("Frame encode failed: {0}")]
    Encode(String),

    #[error("Media event stream closed")]
    MediaClosed,

    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Aborted")]
    Aborted,
}

impl ThumbnailError {
    pub fn aborted() -> Self {
        Self::Aborted
    }

    pub fn media_load(info: &MediaErrorInfo) -> Self {
        Self::MediaLoad {
            code: info.code,
            message: info.message.clone(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl serde::Serialize for ThumbnailError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ThumbnailError::MediaLoad { code, message } => {
                let json = serde_json::json!({ "code": code, "message": message });
                serializer.serialize_str(&json.to_string())
            }
            _ => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl From<String> for ThumbnailError {
    fn from(s: String) -> Self {
        if s == "Aborted" {
            ThumbnailError::Aborted
        } else {
            ThumbnailError::Capture(s)
        }
    }
}

impl From<&str> for ThumbnailError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
