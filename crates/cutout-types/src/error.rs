use std::time::Duration;

use thiserror::Error;

/// Errors produced by the background removal pipeline and its result store.
///
/// The messages carry internal detail for logs. User-facing text is chosen
/// by the chat front end from [`CutoutError::kind`], never from `Display`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CutoutError {
    /// Input bytes are not a valid image in a recognized format.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// The shared segmentation model failed to load.
    #[error("segmentation model failed to load: {0}")]
    ResourceInit(String),

    /// Segmentation failed on a valid image.
    #[error("segmentation failed: {0}")]
    Segmentation(String),

    /// No stored result for this owner (never created, consumed, or evicted).
    #[error("result not found")]
    NotFound,

    /// The job queue is saturated.
    #[error("worker queue full ({limit} jobs waiting)")]
    Busy { limit: usize },

    /// The job exceeded its time budget.
    #[error("segmentation timed out after {0:?}")]
    Timeout(Duration),

    /// A newer request from the same owner replaced this job.
    #[error("superseded by a newer request")]
    Superseded,

    /// Input exceeds the configured size limit.
    #[error("input of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// The worker pool is shutting down.
    #[error("worker pool is shut down")]
    Shutdown,
}

/// Stable category code for a [`CutoutError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Decode,
    ResourceInit,
    Segmentation,
    NotFound,
    Busy,
    Timeout,
    Superseded,
    TooLarge,
    Shutdown,
}

impl CutoutError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CutoutError::Decode(_) => ErrorKind::Decode,
            CutoutError::ResourceInit(_) => ErrorKind::ResourceInit,
            CutoutError::Segmentation(_) => ErrorKind::Segmentation,
            CutoutError::NotFound => ErrorKind::NotFound,
            CutoutError::Busy { .. } => ErrorKind::Busy,
            CutoutError::Timeout(_) => ErrorKind::Timeout,
            CutoutError::Superseded => ErrorKind::Superseded,
            CutoutError::TooLarge { .. } => ErrorKind::TooLarge,
            CutoutError::Shutdown => ErrorKind::Shutdown,
        }
    }

    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CutoutError::ResourceInit(_)
                | CutoutError::Busy { .. }
                | CutoutError::Timeout(_)
                | CutoutError::Shutdown
        )
    }
}
