//! Bounded blocking worker pool for segmentation jobs.
//!
//! `WorkOffloader` keeps CPU-heavy work off the async event loop. Each job
//! runs on tokio's blocking pool, gated by a semaphore so at most `workers`
//! jobs execute at once. Jobs waiting for a worker count against
//! `max_queue`; beyond that, [`WorkOffloader::submit`] fails fast with
//! `Busy` instead of growing memory without bound.
//!
//! Submitting never waits: the caller gets a [`JobTicket`] future back
//! immediately and awaits it when it wants the outcome.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use cutout_types::config::WorkerConfig;
use cutout_types::error::CutoutError;
use cutout_types::owner::OwnerId;
use image::{RgbImage, RgbaImage};
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinError;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::segmenter::SegmenterHandle;

/// Pending outcome of a submitted job.
///
/// Resolves to the job's result, or to `Shutdown` if the pool went away
/// before the job could report back.
#[derive(Debug)]
pub struct JobTicket<T> {
    job_id: Uuid,
    owner_id: OwnerId,
    rx: oneshot::Receiver<Result<T, CutoutError>>,
}

impl<T> JobTicket<T> {
    pub(crate) fn new(
        job_id: Uuid,
        owner_id: OwnerId,
        rx: oneshot::Receiver<Result<T, CutoutError>>,
    ) -> Self {
        Self {
            job_id,
            owner_id,
            rx,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }
}

impl<T> Future for JobTicket<T> {
    type Output = Result<T, CutoutError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(CutoutError::Shutdown)))
    }
}

/// Decrements the in-flight counter when the job is really finished,
/// including when an abandoned (timed out) blocking call finally returns.
struct InflightSlot {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InflightSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs blocking segmentation jobs on a bounded pool.
#[derive(Debug)]
pub struct WorkOffloader {
    handle: Arc<SegmenterHandle>,
    permits: Arc<Semaphore>,
    workers: usize,
    /// Running plus waiting jobs.
    in_flight: Arc<AtomicUsize>,
    queue_limit: Option<usize>,
    job_timeout: Option<Duration>,
}

impl WorkOffloader {
    pub fn new(handle: Arc<SegmenterHandle>, config: &WorkerConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            in_flight: Arc::new(AtomicUsize::new(0)),
            queue_limit: config.queue_limit(),
            job_timeout: config.job_timeout(),
        }
    }

    pub fn handle(&self) -> &Arc<SegmenterHandle> {
        &self.handle
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs currently running or waiting for a worker.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Segment an already-decoded RGB image.
    pub fn submit(
        &self,
        owner_id: OwnerId,
        input: RgbImage,
    ) -> Result<JobTicket<RgbaImage>, CutoutError> {
        self.run(owner_id, move |handle| {
            let segmenter = handle.acquire()?;
            segmenter.segment(&input)
        })
    }

    /// Run an arbitrary blocking job with access to the shared model handle.
    ///
    /// Must be called from within a tokio runtime. Returns immediately.
    pub fn run<T, F>(&self, owner_id: OwnerId, job: F) -> Result<JobTicket<T>, CutoutError>
    where
        T: Send + 'static,
        F: FnOnce(&SegmenterHandle) -> Result<T, CutoutError> + Send + 'static,
    {
        if self.permits.is_closed() {
            return Err(CutoutError::Shutdown);
        }
        let slot = self.reserve_slot()?;

        let job_id = Uuid::now_v7();
        let (tx, rx) = oneshot::channel();
        let permits = Arc::clone(&self.permits);
        let handle = Arc::clone(&self.handle);
        let job_timeout = self.job_timeout;
        let span = info_span!("segment_job", %job_id, %owner_id);

        tokio::spawn(
            async move {
                let queued_at = Instant::now();
                let permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let _ = tx.send(Err(CutoutError::Shutdown));
                        return;
                    }
                };
                debug!(
                    queued_ms = queued_at.elapsed().as_millis() as u64,
                    "job started"
                );

                let started = Instant::now();
                let blocking = tokio::task::spawn_blocking(move || {
                    // Worker slot and permit are released only when the
                    // blocking call returns, even if the caller gave up.
                    let _permit = permit;
                    let _slot = slot;
                    job(&handle)
                });

                let outcome = match job_timeout {
                    Some(limit) => match tokio::time::timeout(limit, blocking).await {
                        Ok(joined) => flatten(joined),
                        Err(_) => {
                            warn!(timeout_ms = limit.as_millis() as u64, "job timed out, abandoning worker");
                            Err(CutoutError::Timeout(limit))
                        }
                    },
                    None => flatten(blocking.await),
                };

                match &outcome {
                    Ok(_) => debug!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "job finished"
                    ),
                    Err(e) => warn!(error = %e, "job failed"),
                }

                if tx.send(outcome).is_err() {
                    debug!("job result dropped, ticket no longer awaited");
                }
            }
            .instrument(span),
        );

        Ok(JobTicket::new(job_id, owner_id, rx))
    }

    /// Stop accepting jobs; queued jobs resolve to `Shutdown`.
    pub fn close(&self) {
        self.permits.close();
    }

    fn reserve_slot(&self) -> Result<InflightSlot, CutoutError> {
        match self.queue_limit {
            None => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
            }
            Some(limit) => {
                let capacity = self.workers + limit;
                self.in_flight
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < capacity).then_some(n + 1)
                    })
                    .map_err(|_| CutoutError::Busy { limit })?;
            }
        }
        Ok(InflightSlot {
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

fn flatten<T>(joined: Result<Result<T, CutoutError>, JoinError>) -> Result<T, CutoutError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(CutoutError::Segmentation("worker panicked".to_string())),
        Err(_) => Err(CutoutError::Shutdown),
    }
}
