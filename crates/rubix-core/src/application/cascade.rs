//! Cascade Consistency Engine
//!
//! Propagates a soft-delete or restore from a node to everything it owns:
//! ports, their values and incident edges, tags, and descendant nodes. The
//! whole subtree is read first and then committed as a single
//! [`WriteBatch`], so a cascade is either fully visible or not at all.

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::application::ancestry::{ancestor_path, ensure_path_unchanged, load_node};
use crate::application::cancel::CancelToken;
use crate::application::locks::CascadeLockTable;
use crate::config::EngineConfig;
use crate::domain::entities::{EdgeId, NodeId, Port, PortId};
use crate::domain::store::{scan_stream, EntityStore, IndexScan, Record, RecordKey, WriteBatch};
use crate::error::CoreError;

/// Number of records flipped by one cascade, per entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub nodes: usize,
    pub ports: usize,
    pub values: usize,
    pub edges: usize,
    pub tags: usize,
}

impl CascadeReport {
    /// Whether anything was written
    pub fn changed(&self) -> bool {
        self.total() > 0
    }

    pub fn total(&self) -> usize {
        self.nodes + self.ports + self.values + self.edges + self.tags
    }
}

/// Accumulates the write set of one cascade
#[derive(Default)]
struct CascadePlan {
    batch: WriteBatch,
    report: CascadeReport,
    edges_seen: HashSet<EdgeId>,
}

impl CascadePlan {
    fn flip(&mut self, key: RecordKey, target: bool) {
        match &key {
            RecordKey::Node(_) => self.report.nodes += 1,
            RecordKey::Port(_) => self.report.ports += 1,
            RecordKey::Value(_) => self.report.values += 1,
            RecordKey::Edge(_) => self.report.edges += 1,
            RecordKey::Tag(_) => self.report.tags += 1,
        }
        self.batch.set_alive(key, target);
    }

    /// Flip an edge unless this cascade already did
    fn flip_edge(&mut self, id: EdgeId, target: bool) {
        if self.edges_seen.insert(id.clone()) {
            self.flip(RecordKey::Edge(id), target);
        }
    }
}

/// Engine that owns every alive-flag transition
pub struct CascadeEngine {
    store: Arc<dyn EntityStore>,
    locks: Arc<CascadeLockTable>,
    config: EngineConfig,
}

impl CascadeEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        locks: Arc<CascadeLockTable>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    /// Lock table shared with the writer
    pub fn locks(&self) -> &Arc<CascadeLockTable> {
        &self.locks
    }

    /// Soft-delete (`target = false`) or restore (`target = true`) a node and
    /// its whole subtree.
    pub async fn set_alive(
        &self,
        node_id: &NodeId,
        target: bool,
    ) -> Result<CascadeReport, CoreError> {
        self.set_alive_cancellable(node_id, target, &CancelToken::new())
            .await
    }

    /// Same as [`set_alive`](Self::set_alive), polling `cancel` between
    /// per-node steps. A cancelled cascade commits nothing.
    #[instrument(skip(self, cancel), fields(node_id = %node_id))]
    pub async fn set_alive_cancellable(
        &self,
        node_id: &NodeId,
        target: bool,
        cancel: &CancelToken,
    ) -> Result<CascadeReport, CoreError> {
        let store = self.store.as_ref();

        let root = load_node(store, node_id)
            .await?
            .ok_or_else(|| CoreError::node_not_found(node_id))?;
        let ancestors = ancestor_path(store, &root).await?;
        let _guard = self.locks.try_acquire(node_id, ancestors.clone())?;

        // Re-read under the lock; another cascade may have finished in between
        let root = load_node(store, node_id)
            .await?
            .ok_or_else(|| CoreError::node_not_found(node_id))?;
        ensure_path_unchanged(store, &root, &ancestors).await?;
        if root.alive == target {
            debug!(node_id = %node_id, target, "Node already in target state");
            return Ok(CascadeReport::default());
        }

        let mut plan = CascadePlan::default();
        let mut visited = HashSet::from([root.id.clone()]);
        let mut queue = VecDeque::from([root.id]);

        while let Some(current) = queue.pop_front() {
            cancel.check("set_alive")?;
            plan.flip(RecordKey::Node(current.clone()), target);

            self.plan_ports(&current, target, &mut plan).await?;
            self.plan_tags(&current, target, &mut plan).await?;

            let mut children = scan_stream(
                store,
                IndexScan::NodesByParent {
                    parent_id: Some(current.clone()),
                    alive: Some(!target),
                },
                self.config.scan_page_size,
            );
            while let Some(record) = children.try_next().await? {
                if let Record::Node(child) = record {
                    if !visited.insert(child.id.clone()) {
                        return Err(CoreError::InvariantViolation(format!(
                            "node {} reached twice below {}",
                            child.id, node_id
                        )));
                    }
                    queue.push_back(child.id);
                }
            }
        }

        cancel.check("set_alive")?;
        let report = plan.report;
        self.store.commit(plan.batch).await?;

        info!(
            node_id = %node_id,
            target,
            nodes = report.nodes,
            ports = report.ports,
            values = report.values,
            edges = report.edges,
            tags = report.tags,
            "Cascade committed"
        );

        Ok(report)
    }

    /// Soft-delete or restore one port together with its values and
    /// incident edges. Sibling ports are untouched.
    #[instrument(skip(self), fields(port_id = %port_id))]
    pub async fn set_port_alive(
        &self,
        port_id: &PortId,
        target: bool,
    ) -> Result<CascadeReport, CoreError> {
        let store = self.store.as_ref();
        let port = self.load_port(port_id).await?;
        let owner = load_node(store, &port.node_id).await?.ok_or_else(|| {
            CoreError::InvariantViolation(format!(
                "port {} references missing node {}",
                port_id, port.node_id
            ))
        })?;

        // Lock the owning node so a subtree cascade cannot interleave
        let ancestors = ancestor_path(store, &owner).await?;
        let _guard = self.locks.try_acquire(&owner.id, ancestors.clone())?;
        ensure_path_unchanged(store, &owner, &ancestors).await?;

        let port = self.load_port(port_id).await?;
        if port.alive == target {
            return Ok(CascadeReport::default());
        }

        let mut plan = CascadePlan::default();
        plan.flip(RecordKey::Port(port.id.clone()), target);
        self.plan_port_dependents(&port.id, target, &mut plan).await?;

        let report = plan.report;
        self.store.commit(plan.batch).await?;

        info!(
            port_id = %port_id,
            target,
            values = report.values,
            edges = report.edges,
            "Port cascade committed"
        );

        Ok(report)
    }

    /// Soft-delete or restore a single edge
    #[instrument(skip(self), fields(edge_id = %edge_id))]
    pub async fn set_edge_alive(
        &self,
        edge_id: &EdgeId,
        target: bool,
    ) -> Result<CascadeReport, CoreError> {
        let key = RecordKey::Edge(edge_id.clone());
        let edge = self
            .store
            .get(&key)
            .await?
            .and_then(Record::into_edge)
            .ok_or_else(|| CoreError::NotFound(format!("edge {}", edge_id)))?;

        if edge.alive == target {
            return Ok(CascadeReport::default());
        }

        let mut plan = CascadePlan::default();
        plan.flip_edge(edge.id, target);
        let report = plan.report;
        self.store.commit(plan.batch).await?;

        debug!(edge_id = %edge_id, target, "Edge flipped");
        Ok(report)
    }

    async fn load_port(&self, port_id: &PortId) -> Result<Port, CoreError> {
        self.store
            .get(&RecordKey::Port(port_id.clone()))
            .await?
            .and_then(Record::into_port)
            .ok_or_else(|| CoreError::NotFound(format!("port {}", port_id)))
    }

    /// Every port of `node_id`; values and edges are visited even for ports
    /// that already hold the target state.
    async fn plan_ports(
        &self,
        node_id: &NodeId,
        target: bool,
        plan: &mut CascadePlan,
    ) -> Result<(), CoreError> {
        let mut ports = scan_stream(
            self.store.as_ref(),
            IndexScan::PortsByNode {
                node_id: node_id.clone(),
                alive: None,
            },
            self.config.scan_page_size,
        );

        while let Some(record) = ports.try_next().await? {
            if let Record::Port(port) = record {
                if port.alive != target {
                    plan.flip(RecordKey::Port(port.id.clone()), target);
                }
                self.plan_port_dependents(&port.id, target, plan).await?;
            }
        }

        Ok(())
    }

    async fn plan_port_dependents(
        &self,
        port_id: &PortId,
        target: bool,
        plan: &mut CascadePlan,
    ) -> Result<(), CoreError> {
        let store = self.store.as_ref();
        let page_size = self.config.scan_page_size;

        let mut values = scan_stream(
            store,
            IndexScan::ValuesByPort {
                port_id: port_id.clone(),
                alive: Some(!target),
            },
            page_size,
        );
        while let Some(record) = values.try_next().await? {
            if let Record::Value(value) = record {
                plan.flip(RecordKey::Value(value.id), target);
            }
        }

        let edge_scans = [
            IndexScan::EdgesByFromPort {
                port_id: port_id.clone(),
                alive: Some(!target),
            },
            IndexScan::EdgesByToPort {
                port_id: port_id.clone(),
                alive: Some(!target),
            },
        ];
        for scan in edge_scans {
            let mut edges = scan_stream(store, scan, page_size);
            while let Some(record) = edges.try_next().await? {
                if let Record::Edge(edge) = record {
                    plan.flip_edge(edge.id, target);
                }
            }
        }

        Ok(())
    }

    async fn plan_tags(
        &self,
        node_id: &NodeId,
        target: bool,
        plan: &mut CascadePlan,
    ) -> Result<(), CoreError> {
        let mut tags = scan_stream(
            self.store.as_ref(),
            IndexScan::TagsByNode {
                node_id: node_id.clone(),
                alive: Some(!target),
            },
            self.config.scan_page_size,
        );
        while let Some(record) = tags.try_next().await? {
            if let Record::Tag(tag) = record {
                plan.flip(RecordKey::Tag(tag.key()), target);
            }
        }
        Ok(())
    }
}
