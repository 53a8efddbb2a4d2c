//! Hierarchy Query Engine: bounded-depth subtree retrieval.

use futures::TryStreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::application::ancestry::load_node;
use crate::config::EngineConfig;
use crate::domain::entities::{NodeAtLevel, NodeId};
use crate::domain::store::{scan_stream, EntityStore, IndexScan, Record};
use crate::error::CoreError;

/// Breadth-first walk over the `(parent_id, alive)` index
pub struct HierarchyQueryEngine {
    store: Arc<dyn EntityStore>,
    config: EngineConfig,
}

impl HierarchyQueryEngine {
    pub fn new(store: Arc<dyn EntityStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Alive nodes at most `max_depth` levels below `root_id`, root included
    /// at level 0, ordered by level then discovery order.
    ///
    /// An unknown or dead root yields an empty result.
    #[instrument(skip(self), fields(root_id = %root_id))]
    pub async fn get_subtree(
        &self,
        root_id: &NodeId,
        max_depth: i32,
    ) -> Result<Vec<NodeAtLevel>, CoreError> {
        if max_depth < 0 {
            return Err(CoreError::InvalidArgument(format!(
                "max_depth must be >= 0, got {}",
                max_depth
            )));
        }

        let store = self.store.as_ref();
        let root = match load_node(store, root_id).await? {
            Some(root) if root.alive => root,
            _ => {
                debug!(root_id = %root_id, "Subtree root missing or dead");
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::from([root.id.clone()]);
        let mut frontier = vec![root.id.clone()];
        let mut result = vec![NodeAtLevel::from_node(root, 0)];

        // max_depth is non-negative here
        for level in 1..=max_depth as u32 {
            let mut next = Vec::new();

            for parent_id in &frontier {
                let mut children = scan_stream(
                    store,
                    IndexScan::NodesByParent {
                        parent_id: Some(parent_id.clone()),
                        alive: Some(true),
                    },
                    self.config.scan_page_size,
                );
                while let Some(record) = children.try_next().await? {
                    if let Record::Node(child) = record {
                        if !seen.insert(child.id.clone()) {
                            return Err(CoreError::InvariantViolation(format!(
                                "node {} appears twice below {}",
                                child.id, root_id
                            )));
                        }
                        next.push(child.id.clone());
                        result.push(NodeAtLevel::from_node(child, level));
                    }
                }
            }

            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        debug!(root_id = %root_id, max_depth, found = result.len(), "Subtree loaded");
        Ok(result)
    }
}
