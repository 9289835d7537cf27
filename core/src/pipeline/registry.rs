//! Book-keeping for in-flight page renders.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::cache::ThumbnailEntry;
use crate::error::LoadError;
use crate::types::{JobId, PageKey};

use super::Result;
use super::cancel::CancellationToken;
use super::pool::WorkerPool;
use super::slot::DisplaySlot;

/// Callback receiving a finished thumbnail.
///
/// Invoked on a render worker thread for asynchronous results; implementations that drive a
/// single-threaded UI must redispatch themselves.
pub type ResultHandler = Arc<dyn Fn(&PageKey, Arc<ThumbnailEntry>) + Send + Sync>;

/// A requester waiting for a render: where it displays, and how to hand the result over.
pub struct Subscriber {
    slot: DisplaySlot,
    handler: ResultHandler,
}

impl Subscriber {
    pub fn new(slot: DisplaySlot, handler: ResultHandler) -> Self {
        Self { slot, handler }
    }

    /// Whether the subscriber's slot still shows `key`.
    pub fn wants(&self, key: &PageKey) -> bool {
        self.slot.is_bound_to(key)
    }

    pub fn is_for(&self, slot: &DisplaySlot) -> bool {
        self.slot.same_slot(slot)
    }

    pub fn deliver(&self, key: &PageKey, entry: Arc<ThumbnailEntry>) {
        (self.handler)(key, entry);
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("slot", &self.slot).finish_non_exhaustive()
    }
}

/// Handle to one scheduled render of a page.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    key: PageKey,
    token: CancellationToken,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn key(&self) -> &PageKey {
        &self.key
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Result of [`RenderTaskRegistry::try_submit`].
#[derive(Debug, Clone)]
pub enum Submission {
    /// A new job was registered and queued on the pool.
    Scheduled(JobHandle),
    /// A job for the key was already in flight; the subscriber was attached to it.
    Joined(JobHandle),
}

impl Submission {
    pub fn handle(&self) -> &JobHandle {
        match self {
            Submission::Scheduled(handle) | Submission::Joined(handle) => handle,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, Submission::Scheduled(_))
    }
}

#[derive(Debug)]
struct RenderJob {
    handle: JobHandle,
    subscribers: Vec<Subscriber>,
}

/// Tracks at most one in-flight render per page and schedules renders on the worker pool.
#[derive(Debug)]
pub struct RenderTaskRegistry {
    jobs: Mutex<HashMap<PageKey, RenderJob>>,
    pool: WorkerPool,
    next_id: AtomicU64,
}

impl RenderTaskRegistry {
    /// Create a registry backed by a pool of `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        let pool = WorkerPool::new(workers, "thumb-render")?;
        Ok(Self { jobs: Mutex::new(HashMap::new()), pool, next_id: AtomicU64::new(1) })
    }

    /// Join the in-flight job for `key`, or register a new one and queue `work` for it.
    ///
    /// The check and the registration happen under one lock, so concurrent submissions for
    /// the same key schedule exactly one job. `work` is dropped unrun when joining.
    pub fn try_submit<F>(
        &self,
        key: PageKey,
        subscriber: Subscriber,
        work: F,
    ) -> std::result::Result<Submission, LoadError>
    where
        F: FnOnce(JobHandle) + Send + 'static,
    {
        let handle = {
            let mut jobs = self.jobs.lock();
            if let Some(job) = jobs.get_mut(&key) {
                // A slot that left and came back while the render ran is already waiting.
                if job.subscribers.iter().any(|waiting| waiting.is_for(&subscriber.slot)) {
                    debug!(target: "pipeline::registry", page = %key, "slot already waiting");
                } else {
                    job.subscribers.push(subscriber);
                    debug!(target: "pipeline::registry", page = %key, "joined in-flight render");
                }
                return Ok(Submission::Joined(job.handle.clone()));
            }
            if self.pool.is_shut_down() {
                return Err(LoadError::Shutdown);
            }

            let handle = JobHandle {
                id: JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed)),
                key: key.clone(),
                token: CancellationToken::new(),
            };
            jobs.insert(key, RenderJob { handle: handle.clone(), subscribers: vec![subscriber] });
            handle
        };

        let job_handle = handle.clone();
        if let Err(err) = self.pool.execute(move || work(job_handle)) {
            self.forget(&handle);
            return Err(err);
        }

        info!(
            target: "pipeline::registry",
            page = %handle.key,
            job = handle.id.as_u64(),
            "render scheduled"
        );
        Ok(Submission::Scheduled(handle))
    }

    /// Flag the job for `key` as cancelled and drop its registration and subscribers.
    ///
    /// Returns `false` when nothing was in flight for the key.
    pub fn cancel(&self, key: &PageKey) -> bool {
        let removed = self.jobs.lock().remove(key);
        match removed {
            Some(job) => {
                job.handle.token.cancel();
                debug!(
                    target: "pipeline::registry",
                    page = %key,
                    job = job.handle.id.as_u64(),
                    "render cancelled"
                );
                true
            }
            None => false,
        }
    }

    /// Drop `slot`'s interest in the job for `key`.
    ///
    /// The job is cancelled only when no remaining subscriber's slot is still bound to `key`;
    /// otherwise it keeps running for them. Returns whether the job was cancelled.
    pub fn detach(&self, key: &PageKey, slot: &DisplaySlot) -> bool {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(key) else {
            return false;
        };
        job.subscribers.retain(|waiting| !waiting.is_for(slot));
        if job.subscribers.iter().any(|waiting| waiting.wants(key)) {
            debug!(target: "pipeline::registry", page = %key, "slot detached, render still wanted");
            return false;
        }

        match jobs.remove(key) {
            Some(job) => {
                job.handle.token.cancel();
                debug!(
                    target: "pipeline::registry",
                    page = %key,
                    job = job.handle.id.as_u64(),
                    "last interested slot detached, render cancelled"
                );
                true
            }
            None => false,
        }
    }

    /// Cancel every registered job, returning how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.jobs.lock().drain().collect();
        for (_, job) in &drained {
            job.handle.token.cancel();
        }
        drained.len()
    }

    /// Unregister a finished job and take its subscribers for delivery.
    ///
    /// Called by the job on every exit path. Yields nothing if the job was cancelled, since
    /// the key may already belong to a newer job.
    pub fn complete(&self, handle: &JobHandle) -> Vec<Subscriber> {
        self.forget(handle).map(|job| job.subscribers).unwrap_or_default()
    }

    pub fn is_in_flight(&self, key: &PageKey) -> bool {
        self.jobs.lock().contains_key(key)
    }

    /// Number of registered jobs.
    pub fn in_flight(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Jobs queued on the pool that no worker has picked up yet.
    pub fn queued(&self) -> usize {
        self.pool.queued()
    }

    /// Stop accepting work and join the worker threads.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn forget(&self, handle: &JobHandle) -> Option<RenderJob> {
        let mut jobs = self.jobs.lock();
        match jobs.get(&handle.key) {
            Some(job) if job.handle.id == handle.id => jobs.remove(&handle.key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;
    use crossbeam_channel::bounded;

    fn key(index: u32) -> PageKey {
        PageKey::new(DocumentId::new("doc"), index)
    }

    fn subscriber() -> Subscriber {
        Subscriber::new(DisplaySlot::new(), Arc::new(|_: &PageKey, _: Arc<ThumbnailEntry>| {}))
    }

    #[test]
    fn duplicate_submission_joins_existing_job() {
        let registry = RenderTaskRegistry::new(2).unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);

        let first = registry
            .try_submit(key(1), subscriber(), move |_| {
                let _ = release_rx.recv();
            })
            .unwrap();
        let second = registry.try_submit(key(1), subscriber(), |_| unreachable!()).unwrap();

        assert!(first.is_scheduled());
        assert!(!second.is_scheduled());
        assert_eq!(first.handle().id(), second.handle().id());
        assert_eq!(registry.in_flight(), 1);

        let subscribers = registry.complete(first.handle());
        assert_eq!(subscribers.len(), 2);
        assert!(!registry.is_in_flight(&key(1)));
        drop(release_tx);
        registry.shutdown();
    }

    #[test]
    fn cancel_flags_job_and_unregisters() {
        let registry = RenderTaskRegistry::new(1).unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        let submission = registry
            .try_submit(key(2), subscriber(), move |_| {
                let _ = release_rx.recv();
            })
            .unwrap();

        assert!(registry.cancel(&key(2)));
        assert!(submission.handle().is_cancelled());
        assert!(!registry.cancel(&key(2)));
        assert!(registry.complete(submission.handle()).is_empty());
        drop(release_tx);
        registry.shutdown();
    }

    #[test]
    fn stale_completion_leaves_newer_job_registered() {
        let registry = RenderTaskRegistry::new(1).unwrap();
        let old = registry.try_submit(key(3), subscriber(), |_| {}).unwrap();
        registry.cancel(&key(3));
        let new = registry.try_submit(key(3), subscriber(), |_| {}).unwrap();
        assert!(new.is_scheduled());

        assert!(registry.complete(old.handle()).is_empty());
        assert!(registry.is_in_flight(&key(3)));
        assert_eq!(registry.complete(new.handle()).len(), 1);
        registry.shutdown();
    }

    #[test]
    fn submission_after_shutdown_is_rejected() {
        let registry = RenderTaskRegistry::new(1).unwrap();
        registry.shutdown();
        let err = registry.try_submit(key(4), subscriber(), |_| {}).unwrap_err();
        assert!(matches!(err, LoadError::Shutdown));
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn returning_slot_is_not_subscribed_twice() {
        let registry = RenderTaskRegistry::new(1).unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        let slot = DisplaySlot::new();
        let handler: ResultHandler = Arc::new(|_: &PageKey, _: Arc<ThumbnailEntry>| {});

        let first = registry
            .try_submit(key(6), Subscriber::new(slot.clone(), Arc::clone(&handler)), move |_| {
                let _ = release_rx.recv();
            })
            .unwrap();
        let again = registry
            .try_submit(key(6), Subscriber::new(slot.clone(), handler), |_| unreachable!())
            .unwrap();
        assert!(!again.is_scheduled());

        assert_eq!(registry.complete(first.handle()).len(), 1);
        drop(release_tx);
        registry.shutdown();
    }

    #[test]
    fn detach_keeps_job_for_remaining_bound_slot() {
        let registry = RenderTaskRegistry::new(1).unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        let (left, stays) = (DisplaySlot::new(), DisplaySlot::new());
        left.bind(key(7));
        stays.bind(key(7));
        let handler: ResultHandler = Arc::new(|_: &PageKey, _: Arc<ThumbnailEntry>| {});

        let submission = registry
            .try_submit(key(7), Subscriber::new(left.clone(), Arc::clone(&handler)), move |_| {
                let _ = release_rx.recv();
            })
            .unwrap();
        registry
            .try_submit(key(7), Subscriber::new(stays.clone(), handler), |_| unreachable!())
            .unwrap();

        left.unbind();
        assert!(!registry.detach(&key(7), &left));
        assert!(!submission.handle().is_cancelled());
        assert!(registry.is_in_flight(&key(7)));

        stays.unbind();
        assert!(registry.detach(&key(7), &stays));
        assert!(submission.handle().is_cancelled());
        assert!(!registry.is_in_flight(&key(7)));
        assert!(!registry.detach(&key(7), &stays));
        drop(release_tx);
        registry.shutdown();
    }

    #[test]
    fn queued_counts_jobs_waiting_for_a_worker() {
        let registry = RenderTaskRegistry::new(1).unwrap();
        let (started_tx, started_rx) = bounded::<()>(1);
        let (release_tx, release_rx) = bounded::<()>(0);
        registry
            .try_submit(key(8), subscriber(), move |_| {
                let _ = started_tx.send(());
                let _ = release_rx.recv();
            })
            .unwrap();
        started_rx.recv().unwrap();
        registry.try_submit(key(9), subscriber(), |_| {}).unwrap();

        assert_eq!(registry.queued(), 1);
        assert_eq!(registry.in_flight(), 2);
        drop(release_tx);
        registry.shutdown();
        assert_eq!(registry.queued(), 0);
    }

    #[test]
    fn work_receives_its_handle() {
        let registry = RenderTaskRegistry::new(1).unwrap();
        let (tx, rx) = bounded(1);
        let submission = registry
            .try_submit(key(5), subscriber(), move |handle| {
                tx.send(handle.id()).unwrap();
            })
            .unwrap();

        assert_eq!(rx.recv().unwrap(), submission.handle().id());
        registry.shutdown();
    }
}
