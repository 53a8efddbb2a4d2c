use std::collections::HashSet;
use std::sync::Arc;

use crate::application::ancestry::load_node;
use crate::application::cancel::CancelToken;
use crate::application::cascade::{CascadeEngine, CascadeReport};
use crate::application::hierarchy::HierarchyQueryEngine;
use crate::application::locks::CascadeLockTable;
use crate::application::tags::TagQueryEngine;
use crate::application::writer::GraphWriter;
use crate::config::EngineConfig;
use crate::domain::entities::{Node, NodeAtLevel, NodeId, TagPredicate};
use crate::domain::store::EntityStore;
use crate::error::CoreError;

/// Facade wiring every engine over one store and one lock table
pub struct GraphService {
    store: Arc<dyn EntityStore>,
    cascade: CascadeEngine,
    hierarchy: HierarchyQueryEngine,
    tags: TagQueryEngine,
    writer: GraphWriter,
}

impl GraphService {
    pub fn new(store: Arc<dyn EntityStore>, config: EngineConfig) -> Self {
        let locks = CascadeLockTable::new();
        Self {
            cascade: CascadeEngine::new(store.clone(), locks.clone(), config.clone()),
            hierarchy: HierarchyQueryEngine::new(store.clone(), config.clone()),
            tags: TagQueryEngine::new(store.clone(), config),
            writer: GraphWriter::new(store.clone(), locks),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn cascade(&self) -> &CascadeEngine {
        &self.cascade
    }

    pub fn hierarchy(&self) -> &HierarchyQueryEngine {
        &self.hierarchy
    }

    pub fn tags(&self) -> &TagQueryEngine {
        &self.tags
    }

    pub fn writer(&self) -> &GraphWriter {
        &self.writer
    }

    pub async fn get_node(&self, id: &NodeId) -> Result<Option<Node>, CoreError> {
        load_node(self.store.as_ref(), id).await
    }

    pub async fn set_alive(&self, id: &NodeId, target: bool) -> Result<CascadeReport, CoreError> {
        self.cascade.set_alive(id, target).await
    }

    pub async fn set_alive_cancellable(
        &self,
        id: &NodeId,
        target: bool,
        cancel: &CancelToken,
    ) -> Result<CascadeReport, CoreError> {
        self.cascade.set_alive_cancellable(id, target, cancel).await
    }

    pub async fn get_subtree(
        &self,
        root_id: &NodeId,
        max_depth: i32,
    ) -> Result<Vec<NodeAtLevel>, CoreError> {
        self.hierarchy.get_subtree(root_id, max_depth).await
    }

    pub async fn find_by_tags(
        &self,
        predicates: &[TagPredicate],
        key_only: Option<&str>,
    ) -> Result<HashSet<NodeId>, CoreError> {
        self.tags.find_by_tags(predicates, key_only).await
    }

    /// Like [`find_by_tags`](Self::find_by_tags), joined back to full node
    /// records sorted by id
    pub async fn find_nodes_by_tags(
        &self,
        predicates: &[TagPredicate],
        key_only: Option<&str>,
    ) -> Result<Vec<Node>, CoreError> {
        let mut ids: Vec<NodeId> = self
            .tags
            .find_by_tags(predicates, key_only)
            .await?
            .into_iter()
            .collect();
        ids.sort();

        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            // A node hard-deleted since the search simply drops out
            if let Some(node) = load_node(self.store.as_ref(), &id).await? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }
}
