//! In-process advisory locks for overlapping subtree mutations.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::domain::entities::NodeId;
use crate::error::CoreError;

/// Registry of in-flight cascades keyed by cascade root.
///
/// Each entry stores the root's ancestor path so that a new cascade can be
/// checked against every running one without touching the store. Two cascades
/// overlap when their roots are equal or one root is an ancestor of the other.
#[derive(Debug, Default)]
pub struct CascadeLockTable {
    active: Mutex<HashMap<NodeId, Vec<NodeId>>>,
}

impl CascadeLockTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a cascade rooted at `root` whose ancestors are `ancestors`.
    ///
    /// Fails fast with [`CoreError::Conflict`] when an overlapping cascade is
    /// already running. The lock is released when the guard is dropped.
    pub fn try_acquire(
        self: &Arc<Self>,
        root: &NodeId,
        ancestors: Vec<NodeId>,
    ) -> Result<CascadeGuard, CoreError> {
        self.try_acquire_all(vec![(root.clone(), ancestors)])
    }

    /// Register several roots under one guard, all or none.
    ///
    /// Roots of the same request never conflict with each other; a repeated
    /// root is registered once.
    pub fn try_acquire_all(
        self: &Arc<Self>,
        mut entries: Vec<(NodeId, Vec<NodeId>)>,
    ) -> Result<CascadeGuard, CoreError> {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);

        let mut active = self.active.lock();

        for (root, ancestors) in &entries {
            let overlapping = active.iter().find(|(running, running_path)| {
                *running == root || ancestors.contains(*running) || running_path.contains(root)
            });
            if let Some((running, _)) = overlapping {
                warn!(
                    root = %root,
                    running = %running,
                    "Cascade rejected: overlapping cascade in flight"
                );
                return Err(CoreError::Conflict(format!(
                    "cascade at node {} overlaps in-flight cascade at node {}",
                    root, running
                )));
            }
        }

        let mut roots = Vec::with_capacity(entries.len());
        for (root, ancestors) in entries {
            active.insert(root.clone(), ancestors);
            roots.push(root);
        }
        Ok(CascadeGuard {
            table: Arc::clone(self),
            roots,
        })
    }

    /// Whether a cascade rooted at `root` is currently registered
    pub fn is_locked(&self, root: &NodeId) -> bool {
        self.active.lock().contains_key(root)
    }

    /// Number of in-flight cascades
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

/// Releases its roots on drop
#[derive(Debug)]
pub struct CascadeGuard {
    table: Arc<CascadeLockTable>,
    roots: Vec<NodeId>,
}

impl CascadeGuard {
    /// Registered roots, sorted by id
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }
}

impl Drop for CascadeGuard {
    fn drop(&mut self) {
        let mut active = self.table.active.lock();
        for root in &self.roots {
            active.remove(root);
        }
    }
}
