//! Segmenter trait and the lazily initialized shared model handle.
//!
//! A [`Segmenter`] performs foreground/background separation. Loading one
//! is expensive (model weights, runtime sessions), so the process holds a
//! single instance behind a [`SegmenterHandle`] that loads it on first use.
//! Concurrent first callers wait for the one in-flight load instead of
//! loading twice; a failed load leaves the handle empty so the next caller
//! retries.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use cutout_types::error::CutoutError;
use image::{RgbImage, RgbaImage};
use once_cell::sync::OnceCell;
use tracing::{error, info};

/// Foreground/background separation on a single image.
///
/// Calls are blocking and CPU-heavy; run them on the worker pool, never on
/// the async event loop. Implementations must be safe to share across
/// worker threads. Backends that are not reentrant serialize internally.
pub trait Segmenter: Send + Sync {
    /// Short backend name for logs (e.g., "matte", "u2netp").
    fn name(&self) -> &str;

    /// Produce an RGBA image of the same dimensions with the background
    /// made transparent.
    fn segment(&self, image: &RgbImage) -> Result<RgbaImage, CutoutError>;
}

/// Constructs the shared [`Segmenter`].
///
/// Any `Fn() -> Result<Arc<dyn Segmenter>, CutoutError>` closure is a loader.
pub trait SegmenterLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn Segmenter>, CutoutError>;
}

impl<F> SegmenterLoader for F
where
    F: Fn() -> Result<Arc<dyn Segmenter>, CutoutError> + Send + Sync,
{
    fn load(&self) -> Result<Arc<dyn Segmenter>, CutoutError> {
        self()
    }
}

/// Process-wide handle to the one expensive segmentation model.
pub struct SegmenterHandle {
    loader: Box<dyn SegmenterLoader>,
    cell: OnceCell<Arc<dyn Segmenter>>,
}

impl SegmenterHandle {
    pub fn new(loader: impl SegmenterLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            cell: OnceCell::new(),
        }
    }

    /// Wrap an already-constructed segmenter (no lazy load).
    pub fn preloaded(segmenter: Arc<dyn Segmenter>) -> Self {
        let handle = Self::new(|| -> Result<Arc<dyn Segmenter>, CutoutError> {
            Err(CutoutError::ResourceInit("preloaded handle has no loader".to_string()))
        });
        let _ = handle.cell.set(segmenter);
        handle
    }

    /// Return the shared segmenter, loading it if this is the first call.
    ///
    /// Blocks while another thread is loading. On load failure the error is
    /// returned to this caller and the handle stays uninitialized.
    pub fn acquire(&self) -> Result<Arc<dyn Segmenter>, CutoutError> {
        if let Some(segmenter) = self.cell.get() {
            return Ok(Arc::clone(segmenter));
        }

        let segmenter = self.cell.get_or_try_init(|| {
            info!("loading segmentation model");
            let started = Instant::now();
            match self.loader.load() {
                Ok(segmenter) => {
                    info!(
                        backend = segmenter.name(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "segmentation model loaded"
                    );
                    Ok(segmenter)
                }
                Err(e) => {
                    error!(error = %e, "segmentation model failed to load");
                    Err(match e {
                        CutoutError::ResourceInit(_) => e,
                        other => CutoutError::ResourceInit(other.to_string()),
                    })
                }
            }
        })?;

        Ok(Arc::clone(segmenter))
    }

    /// Whether the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Load the model now, off the async runtime threads.
    pub async fn warm_up(self: &Arc<Self>) -> Result<(), CutoutError> {
        let handle = Arc::clone(self);
        tokio::task::spawn_blocking(move || handle.acquire().map(|_| ()))
            .await
            .map_err(|e| CutoutError::ResourceInit(format!("model load task failed: {e}")))?
    }
}

impl fmt::Debug for SegmenterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmenterHandle")
            .field("loaded", &self.is_loaded())
            .field("backend", &self.cell.get().map(|s| s.name().to_string()))
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    use super::testing::ThresholdSegmenter;
    use super::*;

    #[test]
    fn concurrent_acquire_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let handle = Arc::new(SegmenterHandle::new(
            move || -> Result<Arc<dyn Segmenter>, CutoutError> {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                Ok(Arc::new(ThresholdSegmenter))
            },
        ));

        let barrier = Arc::new(Barrier::new(8));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    handle.acquire().map(|s| s.name().to_string())
                })
            })
            .collect();

        for t in threads {
            assert_eq!(t.join().unwrap().unwrap(), "threshold");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(handle.is_loaded());
    }

    #[test]
    fn failed_load_is_retried_on_next_acquire() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let handle = SegmenterHandle::new(move || -> Result<Arc<dyn Segmenter>, CutoutError> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CutoutError::ResourceInit("weights missing".to_string()))
            } else {
                Ok(Arc::new(ThresholdSegmenter))
            }
        });

        let err = handle.acquire().err().unwrap();
        assert!(matches!(err, CutoutError::ResourceInit(_)));
        assert!(!handle.is_loaded());

        assert!(handle.acquire().is_ok());
        assert!(handle.is_loaded());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn loader_errors_are_reported_as_resource_init() {
        let handle = SegmenterHandle::new(|| -> Result<Arc<dyn Segmenter>, CutoutError> {
            Err(CutoutError::Segmentation("bad graph".to_string()))
        });
        let err = handle.acquire().err().unwrap();
        assert!(matches!(err, CutoutError::ResourceInit(msg) if msg.contains("bad graph")));
    }

    #[test]
    fn acquire_after_load_returns_same_instance() {
        let handle = SegmenterHandle::preloaded(Arc::new(ThresholdSegmenter));
        let a = handle.acquire().unwrap();
        let b = handle.acquire().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn warm_up_loads_eagerly() {
        let handle = Arc::new(SegmenterHandle::new(
            || -> Result<Arc<dyn Segmenter>, CutoutError> { Ok(Arc::new(ThresholdSegmenter)) },
        ));
        assert!(!handle.is_loaded());
        handle.warm_up().await.unwrap();
        assert!(handle.is_loaded());
    }
}
