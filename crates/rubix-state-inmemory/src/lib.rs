//! In-memory entity store for the Rubix graph store
//!
//! This crate provides an in-memory implementation of the
//! [`EntityStore`](rubix_core::EntityStore) interface defined in rubix-core.
//! It is primarily useful for development, testing, and embedded deployments
//! where persistence is not required.
//!
//! Commits take the table write lock for their whole duration and apply ops
//! against an undo log, so readers never observe a half-applied batch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use rubix_core::{
    ContinuationToken, EntityStore, IndexScan, Record, RecordKey, ScanPage, StoreError,
    WriteBatch,
};

mod tables;

use tables::Tables;

/// In-memory implementation of [`EntityStore`]
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryEntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored row, keyed by primary key
    pub async fn snapshot(&self) -> HashMap<RecordKey, Record> {
        self.tables.read().await.records().clone()
    }

    /// Number of stored rows across all entity kinds
    pub async fn len(&self) -> usize {
        self.tables.read().await.records().len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(key).cloned())
    }

    async fn scan(
        &self,
        scan: &IndexScan,
        after: Option<&ContinuationToken>,
        limit: usize,
    ) -> Result<ScanPage, StoreError> {
        let tables = self.tables.read().await;
        tables.scan(scan, after, limit)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let ops = batch.len();
        let mut tables = self.tables.write().await;
        match tables.apply(batch.into_ops()) {
            Ok(rows) => {
                debug!(ops, rows, "Batch committed");
                Ok(())
            }
            Err(err) => {
                debug!(ops, error = %err, "Batch rolled back");
                Err(err)
            }
        }
    }
}
