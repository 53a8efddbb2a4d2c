//! Fault-injecting [`EntityStore`] wrapper for exercising failure paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::domain::store::{
    ContinuationToken, EntityStore, IndexScan, Record, RecordKey, ScanPage, WriteBatch,
};
use crate::error::StoreError;

/// Delegates to an inner store, failing or pausing on request
pub struct FaultyStore {
    inner: Arc<dyn EntityStore>,
    fail_commits: AtomicBool,
    /// Scans allowed before every further scan fails; `usize::MAX` disables
    scans_before_failure: AtomicUsize,
    scans: AtomicUsize,
    commits: AtomicUsize,
    gate: Arc<Semaphore>,
    commit_entered: Notify,
    /// One-shot: the next `get` of this key waits on `read_gate`
    paused_read: Mutex<Option<RecordKey>>,
    read_gate: Arc<Semaphore>,
    read_entered: Notify,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn EntityStore>) -> Self {
        Self {
            inner,
            fail_commits: AtomicBool::new(false),
            scans_before_failure: AtomicUsize::new(usize::MAX),
            scans: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            gate: Arc::new(Semaphore::new(1)),
            commit_entered: Notify::new(),
            paused_read: Mutex::new(None),
            read_gate: Arc::new(Semaphore::new(1)),
            read_entered: Notify::new(),
        }
    }

    /// Make every commit fail with [`StoreError::Unavailable`]
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Let `n` more scans through, then fail every scan
    pub fn fail_scans_after(&self, n: usize) {
        let done = self.scans.load(Ordering::SeqCst);
        self.scans_before_failure
            .store(done.saturating_add(n), Ordering::SeqCst);
    }

    pub fn reset_faults(&self) {
        self.fail_commits(false);
        self.scans_before_failure.store(usize::MAX, Ordering::SeqCst);
    }

    /// Block commits until the returned permit is dropped
    pub fn hold_commits(&self) -> Option<OwnedSemaphorePermit> {
        self.gate.clone().try_acquire_owned().ok()
    }

    /// Resolves once a commit is blocked behind [`hold_commits`](Self::hold_commits)
    pub async fn wait_for_commit(&self) {
        self.commit_entered.notified().await;
    }

    /// Block the next read of `key` until the returned permit is dropped
    pub fn pause_next_read(&self, key: RecordKey) -> Option<OwnedSemaphorePermit> {
        let permit = self.read_gate.clone().try_acquire_owned().ok()?;
        *self.paused_read.lock() = Some(key);
        Some(permit)
    }

    /// Resolves once a read is blocked behind [`pause_next_read`](Self::pause_next_read)
    pub async fn wait_for_read(&self) {
        self.read_entered.notified().await;
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityStore for FaultyStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let paused = {
            let mut target = self.paused_read.lock();
            if target.as_ref() == Some(key) {
                target.take()
            } else {
                None
            }
        };
        if paused.is_some() {
            self.read_entered.notify_one();
            let _permit = self
                .read_gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        self.inner.get(key).await
    }

    async fn scan(
        &self,
        scan: &IndexScan,
        after: Option<&ContinuationToken>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        let n = self.scans.fetch_add(1, Ordering::SeqCst);
        if n >= self.scans_before_failure.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "injected scan failure on {:?}",
                scan.index()
            )));
        }
        self.inner.scan(scan, after, limit).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.gate.available_permits() == 0 {
            self.commit_entered.notify_one();
        }
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "injected commit failure ({} ops)",
                batch.len()
            )));
        }
        self.inner.commit(batch).await
    }
}
