//! Background removal service, the facade the chat front end calls.
//!
//! `CutoutService` ties the worker pool, the model handle and the result
//! store together:
//!
//! - `submit` decodes and segments an upload on a worker and stores the
//!   result under the owner; the returned ticket resolves once the result
//!   is visible (ready) or the job failed.
//! - `download` consumes the result (single use) as a fast lossless PNG.
//! - `preview` encodes the result without consuming it.
//!
//! Each submission gets a per-owner generation. When an older job finishes
//! after a newer one was submitted for the same owner (in either completion
//! order), its result is discarded so the store always reflects the owner's
//! latest request. A queued job that is already stale when a worker picks it
//! up is skipped without touching the model. Submissions rejected with
//! `Busy` or `Shutdown` never count as newer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cutout_types::error::CutoutError;
use cutout_types::owner::OwnerId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::cutout::{Cutout, PngProfile, decode_image};
use crate::offload::{JobTicket, WorkOffloader};
use crate::segmenter::SegmenterHandle;
use crate::store::ResultStore;

/// Shared result store type used by the service and the reaper.
pub type CutoutStore = ResultStore<Cutout>;

pub struct CutoutService {
    store: Arc<CutoutStore>,
    offloader: WorkOffloader,
    /// Owners with at least one job in flight.
    jobs: Arc<DashMap<OwnerId, OwnerJobs>>,
    next_generation: AtomicU64,
}

/// Per-owner bookkeeping for in-flight jobs.
#[derive(Debug, Clone, Copy)]
struct OwnerJobs {
    latest: u64,
    in_flight: usize,
}

impl CutoutService {
    pub fn new(store: Arc<CutoutStore>, offloader: WorkOffloader) -> Self {
        Self {
            store,
            offloader,
            jobs: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<CutoutStore> {
        &self.store
    }

    pub fn handle(&self) -> &Arc<SegmenterHandle> {
        self.offloader.handle()
    }

    pub fn offloader(&self) -> &WorkOffloader {
        &self.offloader
    }

    pub fn has_result(&self, owner_id: OwnerId) -> bool {
        self.store.contains(owner_id)
    }

    /// Queue background removal for an uploaded image.
    ///
    /// Returns immediately. Fails fast with `Busy` or `Shutdown` if the job
    /// cannot be queued. The ticket resolves to `Ok(())` once the result
    /// is stored, or to the job's error; no entry is written on failure.
    pub fn submit(&self, owner_id: OwnerId, raw: Vec<u8>) -> Result<JobTicket<()>, CutoutError> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let stale_check = Arc::clone(&self.jobs);
        let job = self.offloader.run(owner_id, move |handle| {
            if is_stale(&stale_check, owner_id, generation) {
                return Err(CutoutError::Superseded);
            }
            segment_upload(handle, &raw)
        })?;

        // Only accepted jobs count; a rejected submission never supersedes.
        {
            let mut jobs = self.jobs.entry(owner_id).or_insert(OwnerJobs {
                latest: 0,
                in_flight: 0,
            });
            jobs.latest = jobs.latest.max(generation);
            jobs.in_flight += 1;
        }

        let job_id = job.job_id();
        debug!(%owner_id, %job_id, generation, "image submitted");

        let (tx, rx) = oneshot::channel();
        let store = Arc::clone(&self.store);
        let jobs = Arc::clone(&self.jobs);

        tokio::spawn(async move {
            let result = match job.await {
                Ok(cutout) => {
                    let mut replaced = false;
                    let current = finish_job(&jobs, owner_id, generation, || {
                        replaced = store.put(owner_id, cutout);
                    });
                    if current {
                        info!(%owner_id, %job_id, replaced, "result ready");
                        Ok(())
                    } else {
                        debug!(%owner_id, %job_id, generation, "discarding superseded result");
                        Err(CutoutError::Superseded)
                    }
                }
                Err(e) => {
                    finish_job(&jobs, owner_id, generation, || {});
                    if e == CutoutError::Superseded {
                        debug!(%owner_id, %job_id, generation, "skipped superseded job");
                    }
                    Err(e)
                }
            };
            let _ = tx.send(result);
        });

        Ok(JobTicket::new(job_id, owner_id, rx))
    }

    /// Consume the owner's result as a lossless PNG.
    ///
    /// After this returns (successfully or not) the result is gone; a
    /// second call yields `NotFound`.
    pub async fn download(&self, owner_id: OwnerId) -> Result<Vec<u8>, CutoutError> {
        let cutout = self.store.take(owner_id).ok_or(CutoutError::NotFound)?;
        info!(%owner_id, "result consumed for download");
        encode_off_loop(cutout, PngProfile::Document).await
    }

    /// Encode the owner's result for preview, leaving it stored.
    pub async fn preview(&self, owner_id: OwnerId) -> Result<Vec<u8>, CutoutError> {
        let cutout = self.store.get(owner_id).ok_or(CutoutError::NotFound)?;
        encode_off_loop(cutout, PngProfile::Preview).await
    }
}

impl std::fmt::Debug for CutoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CutoutService")
            .field("stored", &self.store.len())
            .field("in_flight", &self.offloader.in_flight())
            .field("workers", &self.offloader.workers())
            .finish()
    }
}

/// Decode, segment, and wrap one upload. Runs on a worker thread.
///
/// Decoding happens before the model is touched so garbage input never
/// triggers a model load. The decoded and RGB buffers are dropped before
/// returning.
fn segment_upload(handle: &SegmenterHandle, raw: &[u8]) -> Result<Cutout, CutoutError> {
    let rgb = decode_image(raw)?.into_rgb8();
    let dimensions = rgb.dimensions();

    let segmenter = handle.acquire()?;
    let matte = segmenter.segment(&rgb)?;
    drop(rgb);

    if matte.dimensions() != dimensions {
        return Err(CutoutError::Segmentation(format!(
            "{} returned {:?} for a {:?} input",
            segmenter.name(),
            matte.dimensions(),
            dimensions
        )));
    }

    Ok(Cutout::new(matte))
}

/// Whether a newer submission for the owner has been accepted.
fn is_stale(jobs: &DashMap<OwnerId, OwnerJobs>, owner_id: OwnerId, generation: u64) -> bool {
    jobs.get(&owner_id).is_some_and(|entry| entry.latest > generation)
}

/// Retire one finished job for the owner.
///
/// `publish` runs only if this job is still the owner's latest submission,
/// and it runs with the owner's entry locked so a newer submission cannot
/// slip in between the check and the store write. Returns whether the job
/// was current.
fn finish_job(
    jobs: &DashMap<OwnerId, OwnerJobs>,
    owner_id: OwnerId,
    generation: u64,
    publish: impl FnOnce(),
) -> bool {
    match jobs.entry(owner_id) {
        Entry::Occupied(mut entry) => {
            let current = entry.get().latest == generation;
            if current {
                publish();
            }
            let state = entry.get_mut();
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.in_flight == 0 {
                entry.remove();
            }
            current
        }
        Entry::Vacant(_) => {
            publish();
            true
        }
    }
}

async fn encode_off_loop(cutout: Cutout, profile: PngProfile) -> Result<Vec<u8>, CutoutError> {
    tokio::task::spawn_blocking(move || cutout.encode_png(profile))
        .await
        .map_err(|e| CutoutError::Segmentation(format!("encode task failed: {e}")))?
}
